//! Binary entry point for the drowse CLI.

use std::env;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use drowse::{
    ACCOUNT_ENV_VAR, AccountCache, AccountProfile, AccountsLoader, AwsApiError, BootstrapConfig,
    BootstrapError, Bootstrapper, CACHE_ENV_VAR, Ec2Directory, EventBridgeRuleStore,
    IamLambdaProvisioner, ListFilter, Provisioned, ReconcileError, RuleReconciler, RuleStatus,
    RuleTable, ScheduleAction, aws, select_alias,
};

mod cli;

use cli::{Cli, CreateCommand, ListCommand, RemoveCommand, RuleCommand, RuleStateArg, UpdateCommand};

/// Reconciler wired to the AWS control planes.
type AwsReconciler = RuleReconciler<EventBridgeRuleStore, Ec2Directory>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("rule operation failed: {0}")]
    Reconcile(#[from] ReconcileError<AwsApiError>),
    #[error("setup failed: {0}")]
    Setup(#[from] BootstrapError<AwsApiError>),
    #[error("failed to write output: {0}")]
    Output(String),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Rule(command) => {
            let reconciler = reconciler_from_environment()?;
            rule_command(&reconciler, command).await
        }
        Cli::Setup => setup().await,
    }
}

async fn rule_command(reconciler: &AwsReconciler, command: RuleCommand) -> Result<(), CliError> {
    match command {
        RuleCommand::Create(args) => create(reconciler, &args).await,
        RuleCommand::List(args) => list(reconciler, &args).await,
        RuleCommand::Update(args) => update(reconciler, &args).await,
        RuleCommand::Remove(args) => remove(reconciler, &args).await,
    }
}

async fn create(reconciler: &AwsReconciler, args: &CreateCommand) -> Result<(), CliError> {
    let created = reconciler
        .create_schedules(
            &args.instance_name,
            args.start.as_deref(),
            args.stop.as_deref(),
        )
        .await?;
    let mut stdout = io::stdout();
    for rule in &created {
        writeln!(stdout, "created {} rule {}", rule.action, rule.name).map_err(output_error)?;
    }
    Ok(())
}

async fn list(reconciler: &AwsReconciler, args: &ListCommand) -> Result<(), CliError> {
    let mut filter = ListFilter {
        instance_id: None,
        action: ListFilter::action_from_flags(args.start, args.stop),
    };
    if let Some(name) = &args.instance_name {
        filter.instance_id = Some(reconciler.lookup_instance(name).await?.id);
    }
    let rows = reconciler.list(&filter).await?;
    write!(io::stdout(), "{}", RuleTable::new(&rows)).map_err(output_error)
}

async fn update(reconciler: &AwsReconciler, args: &UpdateCommand) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    let mut rule_name = args.rule.clone();
    if let Some((action, cron)) = schedule_change(args) {
        let created = reconciler.reschedule(&args.rule, action, cron).await?;
        writeln!(stdout, "rule {} now fires at cron({cron})", created.name)
            .map_err(output_error)?;
        rule_name = created.name;
    }
    if let Some(state) = args.state {
        let status = rule_status(state);
        reconciler.set_state(&rule_name, status).await?;
        writeln!(stdout, "rule {rule_name} is now {status}").map_err(output_error)?;
    }
    Ok(())
}

async fn remove(reconciler: &AwsReconciler, args: &RemoveCommand) -> Result<(), CliError> {
    reconciler.remove(&args.rule).await?;
    writeln!(io::stdout(), "removed rule {}", args.rule).map_err(output_error)
}

async fn setup() -> Result<(), CliError> {
    let profile = resolve_profile()?;
    let config = BootstrapConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let shared = aws::shared_config(&profile);
    let provisioner = IamLambdaProvisioner::new(
        aws_sdk_iam::Client::new(&shared),
        aws_sdk_lambda::Client::new(&shared),
    );
    let report = Bootstrapper::new(provisioner, config).run().await?;

    let mut stdout = io::stdout();
    writeln!(
        stdout,
        "packaged {} files into {}",
        report.package.files, report.package.path
    )
    .map_err(output_error)?;
    writeln!(
        stdout,
        "{} role {}",
        provisioned_verb(report.role),
        report.role_arn
    )
    .map_err(output_error)?;
    writeln!(
        stdout,
        "{} function {}",
        provisioned_verb(report.function),
        report.function_arn
    )
    .map_err(output_error)?;
    Ok(())
}

/// Builds a reconciler from the resolved account and setup configuration.
///
/// The function name the rules are bound to comes from the setup
/// configuration, so rule commands and `setup` always agree on it.
fn reconciler_from_environment() -> Result<AwsReconciler, CliError> {
    let profile = resolve_profile()?;
    let function_name = BootstrapConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?
        .function_name;
    let shared = aws::shared_config(&profile);
    let store = EventBridgeRuleStore::new(
        aws_sdk_eventbridge::Client::new(&shared),
        aws_sdk_lambda::Client::new(&shared),
        aws::function_arn(&profile, &function_name),
    );
    let directory = Ec2Directory::new(aws_sdk_ec2::Client::new(&shared));
    Ok(RuleReconciler::new(store, directory))
}

fn resolve_profile() -> Result<AccountProfile, CliError> {
    let cache = account_cache()?;
    let supplied = env::var(ACCOUNT_ENV_VAR)
        .ok()
        .filter(|alias| !alias.trim().is_empty());
    let alias = select_alias(&cache, supplied);
    AccountsLoader::new()
        .resolve(alias.as_deref())
        .map_err(|err| CliError::Config(err.to_string()))
}

fn account_cache() -> Result<AccountCache, CliError> {
    match env::var(CACHE_ENV_VAR) {
        Ok(path) if !path.trim().is_empty() => Ok(AccountCache::at(path)),
        _ => AccountCache::from_home().map_err(|err| CliError::Config(err.to_string())),
    }
}

fn schedule_change(args: &UpdateCommand) -> Option<(ScheduleAction, &str)> {
    args.start
        .as_deref()
        .map(|cron| (ScheduleAction::Start, cron))
        .or_else(|| args.stop.as_deref().map(|cron| (ScheduleAction::Stop, cron)))
}

const fn rule_status(state: RuleStateArg) -> RuleStatus {
    match state {
        RuleStateArg::Enable => RuleStatus::Enabled,
        RuleStateArg::Disable => RuleStatus::Disabled,
    }
}

const fn provisioned_verb(outcome: Provisioned) -> &'static str {
    match outcome {
        Provisioned::Created => "created",
        Provisioned::AlreadyExists => "found existing",
    }
}

fn output_error(err: io::Error) -> CliError {
    CliError::Output(err.to_string())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
