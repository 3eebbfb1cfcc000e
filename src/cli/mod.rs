//! Command-line interface definitions for the `drowse` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI for the `drowse` binary.
#[derive(Debug, Parser)]
#[command(
    name = "drowse",
    about = "Schedule automatic start and stop times for EC2 instances",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Manage scheduling rules.
    #[command(subcommand, name = "rule", about = "Manage scheduling rules")]
    Rule(RuleCommand),
    /// Package the function sources and provision the scheduler.
    #[command(
        name = "setup",
        about = "Package the function sources and provision the scheduler"
    )]
    Setup,
}

/// Subcommands of `drowse rule`.
#[derive(Debug, Subcommand)]
pub(crate) enum RuleCommand {
    /// Create start and/or stop rules for a named instance.
    Create(CreateCommand),
    /// List the rules bound to the scheduler function.
    List(ListCommand),
    /// Replace a rule's schedule or toggle its state.
    Update(UpdateCommand),
    /// Remove a rule together with its target and grant.
    Remove(RemoveCommand),
}

/// Arguments for `drowse rule create`.
#[derive(Args, Debug)]
#[command(group = ArgGroup::new("schedule").required(true).multiple(true).args(["start", "stop"]))]
pub(crate) struct CreateCommand {
    /// Name tag of the instance to schedule.
    #[arg(long, value_name = "NAME")]
    pub(crate) instance_name: String,
    /// Cron expression for starting the instance, e.g. "0 9 * * ? *".
    #[arg(long, value_name = "CRON")]
    pub(crate) start: Option<String>,
    /// Cron expression for stopping the instance, e.g. "0 19 * * ? *".
    #[arg(long, value_name = "CRON")]
    pub(crate) stop: Option<String>,
}

/// Arguments for `drowse rule list`.
#[derive(Args, Debug)]
pub(crate) struct ListCommand {
    /// Show only rules for the instance with this Name tag.
    #[arg(long, value_name = "NAME")]
    pub(crate) instance_name: Option<String>,
    /// Show only start rules.
    #[arg(long)]
    pub(crate) start: bool,
    /// Show only stop rules.
    #[arg(long)]
    pub(crate) stop: bool,
}

/// Arguments for `drowse rule update`.
#[derive(Args, Debug)]
#[command(group = ArgGroup::new("change").required(true).multiple(true).args([
    "start", "stop", "state"
]))]
pub(crate) struct UpdateCommand {
    /// Name of the rule to update.
    #[arg(long, value_name = "NAME")]
    pub(crate) rule: String,
    /// New cron expression for a start rule.
    #[arg(long, value_name = "CRON", conflicts_with = "stop")]
    pub(crate) start: Option<String>,
    /// New cron expression for a stop rule.
    #[arg(long, value_name = "CRON")]
    pub(crate) stop: Option<String>,
    /// Enable or disable the rule, keeping its schedule.
    #[arg(long, value_name = "STATE", value_enum)]
    pub(crate) state: Option<RuleStateArg>,
}

/// Arguments for `drowse rule remove`.
#[derive(Args, Debug)]
pub(crate) struct RemoveCommand {
    /// Name of the rule to remove.
    #[arg(long, value_name = "NAME")]
    pub(crate) rule: String,
}

/// Desired rule state for `drowse rule update --state`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum RuleStateArg {
    /// The rule fires on its schedule.
    Enable,
    /// The rule is retained but does not fire.
    Disable,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(args)
    }

    #[test]
    fn create_accepts_one_or_both_schedule_flags() {
        let cli = parse(&[
            "drowse",
            "rule",
            "create",
            "--instance-name",
            "web-1",
            "--start",
            "0 9 * * ? *",
        ])
        .expect("one schedule flag is enough");
        let Cli::Rule(RuleCommand::Create(args)) = cli else {
            panic!("expected a create command");
        };
        assert_eq!(args.instance_name, "web-1");
        assert_eq!(args.start.as_deref(), Some("0 9 * * ? *"));
        assert_eq!(args.stop, None);

        parse(&[
            "drowse",
            "rule",
            "create",
            "--instance-name",
            "web-1",
            "--start",
            "0 9 * * ? *",
            "--stop",
            "0 19 * * ? *",
        ])
        .expect("both schedule flags are allowed");
    }

    #[rstest]
    #[case::no_schedule(&["drowse", "rule", "create", "--instance-name", "web-1"])]
    #[case::no_instance(&["drowse", "rule", "create", "--start", "0 9 * * ? *"])]
    fn create_rejects_incomplete_invocations(#[case] args: &[&str]) {
        let err = parse(args).expect_err("missing required flags should fail");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn update_requires_a_change_flag() {
        let err = parse(&[
            "drowse",
            "rule",
            "update",
            "--rule",
            "StartInstanceRule-i-1-f6cd1a03",
        ])
        .expect_err("a change flag is required");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn update_rejects_both_schedule_flags() {
        let err = parse(&[
            "drowse",
            "rule",
            "update",
            "--rule",
            "StartInstanceRule-i-1-f6cd1a03",
            "--start",
            "0 8 * * ? *",
            "--stop",
            "0 20 * * ? *",
        ])
        .expect_err("start and stop conflict");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn update_combines_a_schedule_with_a_state() {
        let cli = parse(&[
            "drowse",
            "rule",
            "update",
            "--rule",
            "StopInstanceRule-i-1-c5dc5ffc",
            "--stop",
            "0 20 * * ? *",
            "--state",
            "disable",
        ])
        .expect("schedule and state together are allowed");
        let Cli::Rule(RuleCommand::Update(args)) = cli else {
            panic!("expected an update command");
        };
        assert_eq!(args.stop.as_deref(), Some("0 20 * * ? *"));
        assert_eq!(args.state, Some(RuleStateArg::Disable));
    }

    #[rstest]
    #[case("enable", RuleStateArg::Enable)]
    #[case("disable", RuleStateArg::Disable)]
    fn update_parses_both_states(#[case] value: &str, #[case] expected: RuleStateArg) {
        let cli = parse(&[
            "drowse",
            "rule",
            "update",
            "--rule",
            "StartInstanceRule-i-1-f6cd1a03",
            "--state",
            value,
        ])
        .expect("state value should parse");
        let Cli::Rule(RuleCommand::Update(args)) = cli else {
            panic!("expected an update command");
        };
        assert_eq!(args.state, Some(expected));
    }

    #[test]
    fn list_flags_are_all_optional() {
        let cli = parse(&["drowse", "rule", "list"]).expect("bare list is valid");
        let Cli::Rule(RuleCommand::List(args)) = cli else {
            panic!("expected a list command");
        };
        assert_eq!(args.instance_name, None);
        assert!(!args.start);
        assert!(!args.stop);
    }

    #[test]
    fn remove_requires_the_rule_name() {
        let err = parse(&["drowse", "rule", "remove"]).expect_err("--rule is required");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn bare_invocation_prints_help() {
        let err = parse(&["drowse"]).expect_err("bare invocation shows help");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }
}
