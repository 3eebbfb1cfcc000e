//! Provisions the scheduler function and its execution role.
//!
//! Setup is idempotent: every resource is looked up before it is created,
//! and a creation race reported by the provider is treated as the resource
//! existing. Policies are only written alongside a role this run created;
//! an existing role is left exactly as found.

use std::future::Future;
use std::pin::Pin;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

mod package;

pub use package::{PackageError, PackageSummary, package_sources};

/// Runtime identifier the function is published under.
pub const FUNCTION_RUNTIME: &str = "provided.al2023";
/// Entry point name custom runtimes expect inside the archive.
pub const FUNCTION_HANDLER: &str = "bootstrap";
/// Description attached to the published function.
pub const FUNCTION_DESCRIPTION: &str = "Lambda function to start and stop EC2 instances";
/// Managed policy granting the function log delivery.
pub const EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// Setup configuration derived from environment variables, configuration
/// files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "DROWSE_SETUP")]
pub struct BootstrapConfig {
    /// Name the scheduler function is published under.
    #[ortho_config(default = "drowse-ec2-scheduler".to_owned())]
    pub function_name: String,
    /// Name of the execution role the function assumes.
    #[ortho_config(default = "drowse-ec2-scheduler".to_owned())]
    pub role_name: String,
    /// Name of the inline policy granting instance control.
    #[ortho_config(default = "Ec2ControlPolicy".to_owned())]
    pub policy_name: String,
    /// Directory holding the function sources to package.
    #[ortho_config(default = "lambda".to_owned())]
    pub source_dir: String,
    /// Path the deployment archive is written to.
    #[ortho_config(default = "drowse-function.zip".to_owned())]
    pub package_file: String,
    /// Invocation timeout in seconds. Defaults to 30.
    #[ortho_config(default = 30)]
    pub timeout_seconds: i32,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }
}

impl BootstrapConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), SetupConfigError> {
        if value.trim().is_empty() {
            return Err(SetupConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [{}] in drowse.toml",
                metadata.description, metadata.env_var, metadata.toml_key, metadata.section
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags
    /// in that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`SetupConfigError::Parse`] when the loader fails to merge
    /// sources.
    pub fn load_from_sources() -> Result<Self, SetupConfigError> {
        Self::load().map_err(|err| SetupConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`SetupConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, SetupConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("drowse")])
            .map_err(|err| SetupConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on the configured names and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SetupConfigError::MissingField`] when a required field is
    /// empty and [`SetupConfigError::InvalidField`] when the timeout is out
    /// of range.
    pub fn validate(&self) -> Result<(), SetupConfigError> {
        Self::require_field(
            &self.function_name,
            &FieldMetadata::new(
                "function name",
                "DROWSE_SETUP_FUNCTION_NAME",
                "function_name",
                "setup",
            ),
        )?;
        Self::require_field(
            &self.role_name,
            &FieldMetadata::new(
                "execution role name",
                "DROWSE_SETUP_ROLE_NAME",
                "role_name",
                "setup",
            ),
        )?;
        Self::require_field(
            &self.policy_name,
            &FieldMetadata::new(
                "inline policy name",
                "DROWSE_SETUP_POLICY_NAME",
                "policy_name",
                "setup",
            ),
        )?;
        Self::require_field(
            &self.source_dir,
            &FieldMetadata::new(
                "function source directory",
                "DROWSE_SETUP_SOURCE_DIR",
                "source_dir",
                "setup",
            ),
        )?;
        Self::require_field(
            &self.package_file,
            &FieldMetadata::new(
                "package file path",
                "DROWSE_SETUP_PACKAGE_FILE",
                "package_file",
                "setup",
            ),
        )?;
        if !(1..=900).contains(&self.timeout_seconds) {
            return Err(SetupConfigError::InvalidField(format!(
                "function timeout must be between 1 and 900 seconds, got {}",
                self.timeout_seconds
            )));
        }
        Ok(())
    }
}

/// Errors raised while loading or validating setup configuration.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SetupConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration field outside its accepted range.
    #[error("invalid configuration field: {0}")]
    InvalidField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for SetupConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Outcome of one idempotent provisioning step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Provisioned {
    /// The resource was created by this run.
    Created,
    /// The resource already existed and was left as found.
    AlreadyExists,
}

/// Specification for publishing the scheduler function.
#[derive(Clone, Eq, PartialEq)]
pub struct FunctionSpec {
    /// Function name.
    pub function_name: String,
    /// Execution role ARN the function assumes.
    pub role_arn: String,
    /// Invocation timeout in seconds.
    pub timeout_seconds: i32,
    /// Zipped function code.
    pub archive: Vec<u8>,
}

impl std::fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("function_name", &self.function_name)
            .field("role_arn", &self.role_arn)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("archive", &format_args!("{} bytes", self.archive.len()))
            .finish()
    }
}

/// Boxed future type returned by provisioner operations.
pub type ProvisionFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Control-plane operations needed to provision the scheduler function.
///
/// Lookups return `None` for absent resources. Creations report whether the
/// resource was written or already present, so callers never match on
/// provider-specific conflict errors.
pub trait Provisioner {
    /// Provider-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Looks up the execution role, returning its ARN when it exists.
    fn find_role<'a>(
        &'a self,
        role_name: &'a str,
    ) -> ProvisionFuture<'a, Option<String>, Self::Error>;

    /// Creates the execution role with the given trust policy.
    fn create_role<'a>(
        &'a self,
        role_name: &'a str,
        trust_policy: &'a str,
    ) -> ProvisionFuture<'a, Provisioned, Self::Error>;

    /// Writes an inline policy document on the role.
    fn put_role_policy<'a>(
        &'a self,
        role_name: &'a str,
        policy_name: &'a str,
        document: &'a str,
    ) -> ProvisionFuture<'a, (), Self::Error>;

    /// Attaches a managed policy to the role by ARN.
    fn attach_role_policy<'a>(
        &'a self,
        role_name: &'a str,
        policy_arn: &'a str,
    ) -> ProvisionFuture<'a, (), Self::Error>;

    /// Looks up the function, returning its ARN when it exists.
    fn find_function<'a>(
        &'a self,
        function_name: &'a str,
    ) -> ProvisionFuture<'a, Option<String>, Self::Error>;

    /// Publishes the function from a packaged archive.
    fn create_function<'a>(
        &'a self,
        spec: &'a FunctionSpec,
    ) -> ProvisionFuture<'a, Provisioned, Self::Error>;
}

/// Errors raised while provisioning the scheduler function.
#[derive(Debug, Error)]
pub enum BootstrapError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when setup configuration is invalid.
    #[error("setup configuration error: {0}")]
    Config(#[from] SetupConfigError),
    /// Raised when building the deployment archive fails.
    #[error(transparent)]
    Package(#[from] PackageError),
    /// Raised when reading the built archive back fails.
    #[error("cannot read archive '{path}': {message}")]
    ReadArchive {
        /// Archive that was being read.
        path: Utf8PathBuf,
        /// Human-readable description of the failure.
        message: String,
    },
    /// Raised when a role call fails.
    #[error("failed to provision the execution role: {0}")]
    Role(#[source] E),
    /// Raised when a function call fails.
    #[error("failed to provision the function: {0}")]
    Function(#[source] E),
    /// Raised when a resource that reported existing cannot then be fetched.
    #[error("{resource} '{name}' exists according to the provider but could not be fetched")]
    Inconsistent {
        /// Kind of resource, `role` or `function`.
        resource: &'static str,
        /// Name of the resource.
        name: String,
    },
}

/// Report of one bootstrap run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootstrapReport {
    /// Summary of the built archive.
    pub package: PackageSummary,
    /// ARN of the execution role.
    pub role_arn: String,
    /// Whether the role was created or found.
    pub role: Provisioned,
    /// ARN of the scheduler function.
    pub function_arn: String,
    /// Whether the function was created or found.
    pub function: Provisioned,
}

/// Provisions the scheduler function and its execution role.
#[derive(Debug)]
pub struct Bootstrapper<P> {
    provisioner: P,
    config: BootstrapConfig,
}

impl<P> Bootstrapper<P>
where
    P: Provisioner,
{
    /// Creates a bootstrapper over the given provisioner and configuration.
    #[must_use]
    pub const fn new(provisioner: P, config: BootstrapConfig) -> Self {
        Self {
            provisioner,
            config,
        }
    }

    /// Packages the function sources and provisions the role and function.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Config`] for invalid configuration,
    /// [`BootstrapError::Package`] and [`BootstrapError::ReadArchive`] for
    /// archive failures, and [`BootstrapError::Role`] or
    /// [`BootstrapError::Function`] when provider calls fail.
    pub async fn run(&self) -> Result<BootstrapReport, BootstrapError<P::Error>> {
        self.config.validate()?;
        let package = package_sources(
            Utf8Path::new(&self.config.source_dir),
            Utf8Path::new(&self.config.package_file),
        )?;
        let (role_arn, role) = self.ensure_role().await?;
        let (function_arn, function) = self.ensure_function(&role_arn, &package).await?;
        Ok(BootstrapReport {
            package,
            role_arn,
            role,
            function_arn,
            function,
        })
    }

    async fn ensure_role(&self) -> Result<(String, Provisioned), BootstrapError<P::Error>> {
        let name = &self.config.role_name;
        if let Some(arn) = self
            .provisioner
            .find_role(name)
            .await
            .map_err(BootstrapError::Role)?
        {
            info!(role = %name, "execution role already exists");
            return Ok((arn, Provisioned::AlreadyExists));
        }

        let outcome = self
            .provisioner
            .create_role(name, &trust_policy())
            .await
            .map_err(BootstrapError::Role)?;
        if outcome == Provisioned::Created {
            self.provisioner
                .put_role_policy(name, &self.config.policy_name, &control_policy())
                .await
                .map_err(BootstrapError::Role)?;
            self.provisioner
                .attach_role_policy(name, EXECUTION_POLICY_ARN)
                .await
                .map_err(BootstrapError::Role)?;
            info!(role = %name, "created execution role and attached policies");
        } else {
            info!(role = %name, "execution role appeared concurrently; leaving as found");
        }

        let arn = self
            .provisioner
            .find_role(name)
            .await
            .map_err(BootstrapError::Role)?
            .ok_or_else(|| BootstrapError::Inconsistent {
                resource: "role",
                name: name.clone(),
            })?;
        Ok((arn, outcome))
    }

    async fn ensure_function(
        &self,
        role_arn: &str,
        package: &PackageSummary,
    ) -> Result<(String, Provisioned), BootstrapError<P::Error>> {
        let name = &self.config.function_name;
        if let Some(arn) = self
            .provisioner
            .find_function(name)
            .await
            .map_err(BootstrapError::Function)?
        {
            info!(function = %name, "function already exists");
            return Ok((arn, Provisioned::AlreadyExists));
        }

        let archive =
            std::fs::read(package.path.as_std_path()).map_err(|err| BootstrapError::ReadArchive {
                path: package.path.clone(),
                message: err.to_string(),
            })?;
        let spec = FunctionSpec {
            function_name: name.clone(),
            role_arn: role_arn.to_owned(),
            timeout_seconds: self.config.timeout_seconds,
            archive,
        };
        let outcome = self
            .provisioner
            .create_function(&spec)
            .await
            .map_err(BootstrapError::Function)?;
        match outcome {
            Provisioned::Created => info!(function = %name, "published function"),
            Provisioned::AlreadyExists => {
                info!(function = %name, "function appeared concurrently; leaving as found");
            }
        }

        let arn = self
            .provisioner
            .find_function(name)
            .await
            .map_err(BootstrapError::Function)?
            .ok_or_else(|| BootstrapError::Inconsistent {
                resource: "function",
                name: name.clone(),
            })?;
        Ok((arn, outcome))
    }
}

/// Trust policy allowing the function service to assume the role.
fn trust_policy() -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": "lambda.amazonaws.com" },
            "Action": "sts:AssumeRole"
        }]
    })
    .to_string()
}

/// Inline policy granting exactly the instance control the handler needs.
fn control_policy() -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": [
                "ec2:DescribeInstances",
                "ec2:StartInstances",
                "ec2:StopInstances"
            ],
            "Resource": "*"
        }]
    })
    .to_string()
}
