//! Core library for the drowse scheduling tool.
//!
//! The crate wires a deterministic rule-naming scheme and an idempotent
//! reconciler over the remote scheduler: rules map a cron expression to a
//! function invocation that starts or stops one compute instance. The
//! scheduler itself is the sole source of truth; nothing is cached between
//! invocations.

pub mod account;
pub mod aws;
pub mod bootstrap;
pub mod config;
pub mod directory;
pub mod reconciler;
pub mod rules;
pub mod test_support;

pub use account::{AccountCache, AccountCacheError, CACHE_ENV_VAR, select_alias};
pub use aws::{AwsApiError, Ec2Directory, EventBridgeRuleStore, IamLambdaProvisioner};
pub use bootstrap::{
    BootstrapConfig, BootstrapError, BootstrapReport, Bootstrapper, PackageError, PackageSummary,
    Provisioned, Provisioner, SetupConfigError,
};
pub use config::{ACCOUNT_ENV_VAR, AccountProfile, AccountsFile, AccountsLoader, ConfigError};
pub use directory::{DirectoryError, InstanceDirectory, InstanceRef};
pub use reconciler::{CreatedRule, ListFilter, ReconcileError, RuleReconciler, RuleRow, RuleTable};
pub use rules::{
    GrantOutcome, RevokeOutcome, RuleName, RuleStatus, RuleStore, ScheduleAction, TargetPayload,
};
