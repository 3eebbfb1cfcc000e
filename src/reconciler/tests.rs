//! Unit tests for the rule reconciler.

use super::*;
use crate::test_support::{FUNCTION_ARN, ScriptedDirectory, ScriptedRuleStore};
use rstest::rstest;

const START_CRON: &str = "0 9 * * ? *";
const STOP_CRON: &str = "0 19 * * ? *";
const INSTANCE_ID: &str = "i-0123456789abcdef0";
const INSTANCE_NAME: &str = "web-1";

fn scripted() -> (
    RuleReconciler<ScriptedRuleStore, ScriptedDirectory>,
    ScriptedRuleStore,
    ScriptedDirectory,
) {
    let store = ScriptedRuleStore::new();
    let directory = ScriptedDirectory::new();
    let reconciler = RuleReconciler::new(store.clone(), directory.clone());
    (reconciler, store, directory)
}

fn derived(action: ScheduleAction, instance_id: &str, cron: &str) -> String {
    RuleName::derive(action, instance_id, cron).to_string()
}

#[tokio::test]
async fn create_schedules_writes_rule_grant_and_target_in_order() {
    let (reconciler, store, directory) = scripted();
    directory.insert_instance(INSTANCE_NAME, INSTANCE_ID);

    let created = reconciler
        .create_schedules(INSTANCE_NAME, Some(START_CRON), Some(STOP_CRON))
        .await
        .expect("creation should succeed");

    let start_name = derived(ScheduleAction::Start, INSTANCE_ID, START_CRON);
    let stop_name = derived(ScheduleAction::Stop, INSTANCE_ID, STOP_CRON);
    assert_eq!(created.len(), 2);
    let Some(first) = created.first() else {
        panic!("expected a start rule");
    };
    assert_eq!(first.name, start_name);
    assert_eq!(first.action, ScheduleAction::Start);
    assert_eq!(first.grant, GrantOutcome::Granted);
    assert!(first.rule_arn.ends_with(&format!("rule/{start_name}")));

    let calls = store.calls();
    assert_eq!(
        calls,
        vec![
            format!("put_rule {start_name}"),
            format!("grant_invocation {start_name}"),
            format!("bind_target {start_name}"),
            format!("put_rule {stop_name}"),
            format!("grant_invocation {stop_name}"),
            format!("bind_target {stop_name}"),
        ]
    );

    let stored = store
        .snapshot(&start_name)
        .expect("start rule should be stored");
    assert_eq!(
        stored.expression,
        Some(RuleExpression::Schedule(format!("cron({START_CRON})")))
    );
    assert_eq!(stored.status, Some(RuleStatus::Enabled));
    assert_eq!(
        stored.description.as_deref(),
        Some(
            "Rule to start EC2 instance i-0123456789abcdef0 (Name: web-1) \
             at specified time: cron(0 9 * * ? *)"
        )
    );
    let target = stored.target.expect("target should be bound");
    assert_eq!(target.arn, FUNCTION_ARN);
    assert_eq!(
        target.payload,
        Some(TargetPayload::new(
            INSTANCE_ID.to_owned(),
            ScheduleAction::Start
        ))
    );
    assert!(store.has_grant(&start_name));
    assert!(store.has_grant(&stop_name));
}

#[tokio::test]
async fn create_describes_untagged_instances_by_id() {
    let (reconciler, store, _directory) = scripted();
    let instance = InstanceRef {
        id: INSTANCE_ID.to_owned(),
        name: None,
    };

    let created = reconciler
        .create(&instance, ScheduleAction::Stop, STOP_CRON)
        .await
        .expect("creation should succeed");

    let stored = store.snapshot(&created.name).expect("rule should be stored");
    let description = stored.description.expect("description should be set");
    assert!(
        description.contains("(Name: i-0123456789abcdef0)"),
        "expected the id as the display name, got: {description}"
    );
}

#[tokio::test]
async fn create_reports_duplicate_grant_as_benign() {
    let (reconciler, store, directory) = scripted();
    directory.insert_instance(INSTANCE_NAME, INSTANCE_ID);
    let name = derived(ScheduleAction::Start, INSTANCE_ID, START_CRON);
    store.seed_grant(&name);

    let created = reconciler
        .create_schedules(INSTANCE_NAME, Some(START_CRON), None)
        .await
        .expect("creation should succeed");

    let Some(rule) = created.first() else {
        panic!("expected one created rule");
    };
    assert_eq!(rule.grant, GrantOutcome::AlreadyGranted);
    let stored = store.snapshot(&name).expect("rule should be stored");
    assert!(stored.target.is_some(), "target should still be bound");
}

#[tokio::test]
async fn create_rolls_back_rule_when_grant_fails() {
    let (reconciler, store, directory) = scripted();
    directory.insert_instance(INSTANCE_NAME, INSTANCE_ID);
    store.fail_on("grant_invocation");

    let err = reconciler
        .create_schedules(INSTANCE_NAME, Some(START_CRON), None)
        .await
        .expect_err("creation should fail");

    let ReconcileError::Grant { message, .. } = err else {
        panic!("expected Grant error, got {err:?}");
    };
    assert_eq!(message, "scripted failure in grant_invocation");
    assert!(store.rule_names().is_empty(), "rule should be rolled back");
    assert_eq!(store.grant_count(), 0);

    let name = derived(ScheduleAction::Start, INSTANCE_ID, START_CRON);
    assert_eq!(
        store.calls(),
        vec![
            format!("put_rule {name}"),
            format!("grant_invocation {name}"),
            format!("delete_rule {name}"),
        ]
    );
}

#[tokio::test]
async fn create_appends_rollback_failure_to_grant_error() {
    let (reconciler, store, directory) = scripted();
    directory.insert_instance(INSTANCE_NAME, INSTANCE_ID);
    store.fail_on("grant_invocation");
    store.fail_on("delete_rule");

    let err = reconciler
        .create_schedules(INSTANCE_NAME, Some(START_CRON), None)
        .await
        .expect_err("creation should fail");

    let ReconcileError::Grant { message, .. } = err else {
        panic!("expected Grant error, got {err:?}");
    };
    assert_eq!(
        message,
        "scripted failure in grant_invocation \
         (rollback of rule also failed: scripted failure in delete_rule)"
    );
    assert_eq!(
        store.rule_names(),
        vec![derived(ScheduleAction::Start, INSTANCE_ID, START_CRON)],
        "rule should remain when rollback fails"
    );
}

#[tokio::test]
async fn create_rolls_back_rule_and_grant_when_bind_fails() {
    let (reconciler, store, directory) = scripted();
    directory.insert_instance(INSTANCE_NAME, INSTANCE_ID);
    store.fail_on("bind_target");

    let err = reconciler
        .create_schedules(INSTANCE_NAME, Some(START_CRON), None)
        .await
        .expect_err("creation should fail");

    let ReconcileError::Bind { message, .. } = err else {
        panic!("expected Bind error, got {err:?}");
    };
    assert_eq!(message, "scripted failure in bind_target");
    assert!(store.rule_names().is_empty(), "rule should be rolled back");
    assert_eq!(store.grant_count(), 0, "grant should be rolled back");

    let name = derived(ScheduleAction::Start, INSTANCE_ID, START_CRON);
    assert_eq!(
        store.calls(),
        vec![
            format!("put_rule {name}"),
            format!("grant_invocation {name}"),
            format!("bind_target {name}"),
            format!("delete_rule {name}"),
            format!("revoke_invocation {name}"),
        ]
    );
}

#[tokio::test]
async fn create_schedules_errors_for_unknown_instance() {
    let (reconciler, store, _directory) = scripted();

    let err = reconciler
        .create_schedules(INSTANCE_NAME, Some(START_CRON), None)
        .await
        .expect_err("creation should fail");

    let ReconcileError::InstanceNotFound { name } = err else {
        panic!("expected InstanceNotFound, got {err:?}");
    };
    assert_eq!(name, INSTANCE_NAME);
    assert!(store.calls().is_empty(), "no scheduler call should be made");
}

#[tokio::test]
async fn create_schedules_surfaces_directory_failures() {
    let (reconciler, _store, directory) = scripted();
    directory.fail_lookups();

    let err = reconciler
        .create_schedules(INSTANCE_NAME, Some(START_CRON), None)
        .await
        .expect_err("creation should fail");
    assert!(matches!(err, ReconcileError::Directory(_)));
}

#[tokio::test]
async fn created_rules_exist_and_resolve_until_removed() {
    let (reconciler, _store, directory) = scripted();
    directory.insert_instance(INSTANCE_NAME, INSTANCE_ID);

    let created = reconciler
        .create_schedules(INSTANCE_NAME, Some(START_CRON), None)
        .await
        .expect("creation should succeed");
    let Some(rule) = created.first() else {
        panic!("expected one created rule");
    };

    assert!(reconciler.exists(&rule.name).await.expect("exists"));
    let payload = reconciler
        .resolve(&rule.name)
        .await
        .expect("resolve")
        .expect("payload should be bound");
    assert_eq!(payload.instance_id, INSTANCE_ID);
    assert_eq!(payload.action, ScheduleAction::Start);

    reconciler.remove(&rule.name).await.expect("removal");
    assert!(!reconciler.exists(&rule.name).await.expect("exists"));
    assert_eq!(reconciler.resolve(&rule.name).await.expect("resolve"), None);
}

#[tokio::test]
async fn remove_unbinds_deletes_and_revokes_in_order() {
    let (reconciler, store, _directory) = scripted();
    let name = derived(ScheduleAction::Stop, INSTANCE_ID, STOP_CRON);
    store.seed_rule(
        &name,
        Some(RuleExpression::Schedule(format!("cron({STOP_CRON})"))),
        Some(RuleStatus::Enabled),
    );
    store.seed_target(
        &name,
        FUNCTION_ARN,
        Some(TargetPayload::new(
            INSTANCE_ID.to_owned(),
            ScheduleAction::Stop,
        )),
    );
    store.seed_grant(&name);

    reconciler.remove(&name).await.expect("removal");

    assert!(store.rule_names().is_empty());
    assert!(!store.has_grant(&name));
    assert_eq!(
        store.calls(),
        vec![
            format!("describe_rule {name}"),
            format!("unbind_target {name}"),
            format!("delete_rule {name}"),
            format!("revoke_invocation {name}"),
        ]
    );
}

#[tokio::test]
async fn remove_treats_missing_grant_as_benign() {
    let (reconciler, store, _directory) = scripted();
    let name = derived(ScheduleAction::Stop, INSTANCE_ID, STOP_CRON);
    store.seed_rule(
        &name,
        Some(RuleExpression::Schedule(format!("cron({STOP_CRON})"))),
        Some(RuleStatus::Enabled),
    );

    reconciler.remove(&name).await.expect("removal");
    assert!(store.rule_names().is_empty());
}

#[tokio::test]
async fn remove_errors_for_unknown_rule() {
    let (reconciler, _store, _directory) = scripted();

    let err = reconciler
        .remove("StartInstanceRule-i-0abc-12345678")
        .await
        .expect_err("removal should fail");

    let ReconcileError::RuleNotFound { name } = err else {
        panic!("expected RuleNotFound, got {err:?}");
    };
    assert_eq!(name, "StartInstanceRule-i-0abc-12345678");
}

#[tokio::test]
async fn set_state_preserves_trigger_description_and_target() {
    let (reconciler, store, directory) = scripted();
    directory.insert_instance(INSTANCE_NAME, INSTANCE_ID);
    let created = reconciler
        .create_schedules(INSTANCE_NAME, Some(START_CRON), None)
        .await
        .expect("creation should succeed");
    let Some(rule) = created.first() else {
        panic!("expected one created rule");
    };
    let before = store.snapshot(&rule.name).expect("rule should be stored");

    reconciler
        .set_state(&rule.name, RuleStatus::Disabled)
        .await
        .expect("state change");

    let after = store.snapshot(&rule.name).expect("rule should be stored");
    assert_eq!(after.status, Some(RuleStatus::Disabled));
    assert_eq!(after.expression, before.expression);
    assert_eq!(after.description, before.description);
    assert_eq!(after.target, before.target, "target should be untouched");
}

#[tokio::test]
async fn set_state_is_idempotent_for_the_current_state() {
    let (reconciler, store, directory) = scripted();
    directory.insert_instance(INSTANCE_NAME, INSTANCE_ID);
    let created = reconciler
        .create_schedules(INSTANCE_NAME, Some(START_CRON), None)
        .await
        .expect("creation should succeed");
    let Some(rule) = created.first() else {
        panic!("expected one created rule");
    };
    let before = store.snapshot(&rule.name).expect("rule should be stored");

    reconciler
        .set_state(&rule.name, RuleStatus::Enabled)
        .await
        .expect("state change");

    let after = store.snapshot(&rule.name).expect("rule should be stored");
    assert_eq!(after, before, "re-enabling should change nothing");
}

#[tokio::test]
async fn set_state_preserves_event_patterns() {
    let (reconciler, store, _directory) = scripted();
    let pattern = r#"{"source":["aws.ec2"]}"#;
    store.seed_rule(
        "pattern-rule",
        Some(RuleExpression::Pattern(pattern.to_owned())),
        Some(RuleStatus::Enabled),
    );

    reconciler
        .set_state("pattern-rule", RuleStatus::Disabled)
        .await
        .expect("state change");

    let stored = store.snapshot("pattern-rule").expect("rule should remain");
    assert_eq!(
        stored.expression,
        Some(RuleExpression::Pattern(pattern.to_owned()))
    );
    assert_eq!(stored.status, Some(RuleStatus::Disabled));
}

#[tokio::test]
async fn set_state_errors_when_rule_has_no_trigger() {
    let (reconciler, store, _directory) = scripted();
    store.seed_rule("bare-rule", None, Some(RuleStatus::Enabled));

    let err = reconciler
        .set_state("bare-rule", RuleStatus::Disabled)
        .await
        .expect_err("state change should fail");
    assert!(matches!(err, ReconcileError::RuleIncomplete { .. }));
}

#[tokio::test]
async fn set_state_errors_for_unknown_rule() {
    let (reconciler, _store, _directory) = scripted();

    let err = reconciler
        .set_state("StartInstanceRule-i-0abc-12345678", RuleStatus::Disabled)
        .await
        .expect_err("state change should fail");
    assert!(matches!(err, ReconcileError::RuleNotFound { .. }));
}

#[tokio::test]
async fn reschedule_replaces_the_rule_under_the_new_name() {
    let (reconciler, store, directory) = scripted();
    directory.insert_instance(INSTANCE_NAME, INSTANCE_ID);
    let old_name = derived(ScheduleAction::Start, INSTANCE_ID, START_CRON);
    store.seed_rule(
        &old_name,
        Some(RuleExpression::Schedule(format!("cron({START_CRON})"))),
        Some(RuleStatus::Enabled),
    );
    store.seed_target(
        &old_name,
        FUNCTION_ARN,
        Some(TargetPayload::new(
            INSTANCE_ID.to_owned(),
            ScheduleAction::Start,
        )),
    );
    store.seed_grant(&old_name);

    let new_cron = "30 7 * * ? *";
    let created = reconciler
        .reschedule(&old_name, ScheduleAction::Start, new_cron)
        .await
        .expect("reschedule should succeed");

    let new_name = derived(ScheduleAction::Start, INSTANCE_ID, new_cron);
    assert_eq!(created.name, new_name);
    assert_eq!(created.action, ScheduleAction::Start);
    assert_eq!(store.rule_names(), vec![new_name.clone()]);
    assert!(!store.has_grant(&old_name));
    assert!(store.has_grant(&new_name));

    let stored = store.snapshot(&new_name).expect("new rule should be stored");
    assert_eq!(
        stored.expression,
        Some(RuleExpression::Schedule(format!("cron({new_cron})")))
    );
    let description = stored.description.expect("description should be set");
    assert!(
        description.contains("(Name: web-1)"),
        "expected the resolved name tag, got: {description}"
    );
    let target = stored.target.expect("target should be bound");
    assert_eq!(
        target.payload,
        Some(TargetPayload::new(
            INSTANCE_ID.to_owned(),
            ScheduleAction::Start
        ))
    );
}

#[tokio::test]
async fn reschedule_with_an_unchanged_cron_rewrites_the_rule() {
    let (reconciler, store, directory) = scripted();
    directory.insert_instance(INSTANCE_NAME, INSTANCE_ID);
    let name = derived(ScheduleAction::Stop, INSTANCE_ID, STOP_CRON);
    store.seed_rule(
        &name,
        Some(RuleExpression::Schedule(format!("cron({STOP_CRON})"))),
        Some(RuleStatus::Enabled),
    );
    store.seed_target(
        &name,
        FUNCTION_ARN,
        Some(TargetPayload::new(
            INSTANCE_ID.to_owned(),
            ScheduleAction::Stop,
        )),
    );
    store.seed_grant(&name);

    let created = reconciler
        .reschedule(&name, ScheduleAction::Stop, STOP_CRON)
        .await
        .expect("reschedule should succeed");

    assert_eq!(created.name, name);
    let stored = store.snapshot(&name).expect("rule should be stored");
    assert!(stored.target.is_some(), "target should be rebound");
    assert!(store.has_grant(&name), "grant should be rewritten");
}

#[tokio::test]
async fn reschedule_falls_back_to_the_instance_id_in_the_name() {
    let (reconciler, store, _directory) = scripted();
    let old_name = derived(ScheduleAction::Start, "i-0abc-def", START_CRON);
    store.seed_rule(
        &old_name,
        Some(RuleExpression::Schedule(format!("cron({START_CRON})"))),
        Some(RuleStatus::Enabled),
    );

    let new_cron = "30 7 * * ? *";
    let created = reconciler
        .reschedule(&old_name, ScheduleAction::Start, new_cron)
        .await
        .expect("reschedule should succeed");

    assert_eq!(
        created.name,
        derived(ScheduleAction::Start, "i-0abc-def", new_cron)
    );
    let stored = store.snapshot(&created.name).expect("rule should be stored");
    let description = stored.description.expect("description should be set");
    assert!(
        description.contains("(Name: i-0abc-def)"),
        "expected the id as the display name, got: {description}"
    );
}

#[tokio::test]
async fn reschedule_rejects_unmanaged_rule_names() {
    let (reconciler, _store, _directory) = scripted();

    let err = reconciler
        .reschedule("backup-nightly", ScheduleAction::Start, START_CRON)
        .await
        .expect_err("reschedule should fail");
    assert!(matches!(err, ReconcileError::UnrecognisedRule { .. }));
}

#[tokio::test]
async fn reschedule_rejects_a_mismatched_action_flag() {
    let (reconciler, _store, _directory) = scripted();
    let name = derived(ScheduleAction::Stop, INSTANCE_ID, STOP_CRON);

    let err = reconciler
        .reschedule(&name, ScheduleAction::Start, START_CRON)
        .await
        .expect_err("reschedule should fail");

    let ReconcileError::ActionMismatch { actual, .. } = &err else {
        panic!("expected ActionMismatch, got {err:?}");
    };
    assert_eq!(*actual, ScheduleAction::Stop);
    assert_eq!(
        err.to_string(),
        format!("rule '{name}' is a stop rule; pass the new cron via --stop")
    );
}

#[tokio::test]
async fn reschedule_errors_for_unknown_rule() {
    let (reconciler, _store, _directory) = scripted();
    let name = derived(ScheduleAction::Start, INSTANCE_ID, START_CRON);

    let err = reconciler
        .reschedule(&name, ScheduleAction::Start, "30 7 * * ? *")
        .await
        .expect_err("reschedule should fail");
    assert!(matches!(err, ReconcileError::RuleNotFound { .. }));
}

#[tokio::test]
async fn list_joins_names_filters_foreign_rules_and_paginates() {
    let (reconciler, store, directory) = scripted();
    directory.insert_instance(INSTANCE_NAME, "i-1");

    let start_name = derived(ScheduleAction::Start, "i-1", START_CRON);
    store.seed_rule(
        &start_name,
        Some(RuleExpression::Schedule(format!("cron({START_CRON})"))),
        Some(RuleStatus::Enabled),
    );
    store.seed_target(
        &start_name,
        FUNCTION_ARN,
        Some(TargetPayload::new("i-1".to_owned(), ScheduleAction::Start)),
    );
    let stop_name = derived(ScheduleAction::Stop, "i-1", STOP_CRON);
    store.seed_rule(
        &stop_name,
        Some(RuleExpression::Schedule(format!("cron({STOP_CRON})"))),
        Some(RuleStatus::Disabled),
    );
    store.seed_target(
        &stop_name,
        FUNCTION_ARN,
        Some(TargetPayload::new("i-1".to_owned(), ScheduleAction::Stop)),
    );
    // Same function name under another account: not ours.
    store.seed_rule("foreign-rule", None, Some(RuleStatus::Enabled));
    store.seed_target(
        "foreign-rule",
        "arn:aws:lambda:eu-west-1:222222222222:function:drowse-ec2-scheduler",
        Some(TargetPayload::new("i-2".to_owned(), ScheduleAction::Start)),
    );
    store.seed_rule("untargeted-rule", None, Some(RuleStatus::Enabled));
    store.seed_rule("opaque-rule", None, Some(RuleStatus::Enabled));
    store.seed_target("opaque-rule", FUNCTION_ARN, None);

    store.set_page_size(2);

    let rows = reconciler
        .list(&ListFilter::default())
        .await
        .expect("listing should succeed");

    assert_eq!(
        rows.iter().map(|row| row.name.as_str()).collect::<Vec<_>>(),
        vec![start_name.as_str(), stop_name.as_str()]
    );
    let Some(start_row) = rows.first() else {
        panic!("expected a start row");
    };
    assert_eq!(start_row.instance_id, "i-1");
    assert_eq!(start_row.instance_name.as_deref(), Some(INSTANCE_NAME));
    assert_eq!(start_row.action, ScheduleAction::Start);
    assert_eq!(
        start_row.schedule.as_deref(),
        Some("cron(0 9 * * ? *)")
    );
    assert_eq!(start_row.status, Some(RuleStatus::Enabled));
    assert_eq!(
        directory.id_lookups(),
        1,
        "the name join should be memoised per listing"
    );

    let pages = store
        .calls()
        .iter()
        .filter(|call| call.starts_with("list_rules"))
        .count();
    assert_eq!(pages, 3, "five rules at page size two need three pages");

    let only_start = reconciler
        .list(&ListFilter {
            action: Some(ScheduleAction::Start),
            ..ListFilter::default()
        })
        .await
        .expect("listing should succeed");
    assert_eq!(only_start.len(), 1);

    let by_instance = reconciler
        .list(&ListFilter {
            instance_id: Some("i-1".to_owned()),
            ..ListFilter::default()
        })
        .await
        .expect("listing should succeed");
    assert_eq!(by_instance.len(), 2);

    let unmatched = reconciler
        .list(&ListFilter {
            instance_id: Some("i-9".to_owned()),
            ..ListFilter::default()
        })
        .await
        .expect("listing should succeed");
    assert!(unmatched.is_empty());
}

#[tokio::test]
async fn list_surfaces_name_join_failures() {
    let (reconciler, store, directory) = scripted();
    let name = derived(ScheduleAction::Start, "i-1", START_CRON);
    store.seed_rule(
        &name,
        Some(RuleExpression::Schedule(format!("cron({START_CRON})"))),
        Some(RuleStatus::Enabled),
    );
    store.seed_target(
        &name,
        FUNCTION_ARN,
        Some(TargetPayload::new("i-1".to_owned(), ScheduleAction::Start)),
    );
    directory.fail_lookups();

    let err = reconciler
        .list(&ListFilter::default())
        .await
        .expect_err("listing should fail");
    assert!(matches!(err, ReconcileError::Directory(_)));
}

#[rstest]
#[case::start_only(true, false, Some(ScheduleAction::Start))]
#[case::stop_only(false, true, Some(ScheduleAction::Stop))]
#[case::both(true, true, None)]
#[case::neither(false, false, None)]
fn action_filter_follows_the_listing_flags(
    #[case] start: bool,
    #[case] stop: bool,
    #[case] expected: Option<ScheduleAction>,
) {
    assert_eq!(ListFilter::action_from_flags(start, stop), expected);
}

#[rstest]
fn rule_table_renders_aligned_columns() {
    let rows = vec![
        RuleRow {
            name: "StartInstanceRule-i-1-aabbccdd".to_owned(),
            instance_id: "i-1".to_owned(),
            instance_name: Some("web".to_owned()),
            action: ScheduleAction::Start,
            schedule: Some("cron(0 9 * * ? *)".to_owned()),
            status: Some(RuleStatus::Enabled),
        },
        RuleRow {
            name: "StopInstanceRule-i-1-aabbccdd".to_owned(),
            instance_id: "i-1".to_owned(),
            instance_name: None,
            action: ScheduleAction::Stop,
            schedule: None,
            status: None,
        },
    ];

    let rendered = RuleTable::new(&rows).to_string();
    assert!(rendered.ends_with('\n'));

    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines.len(), 4, "header, separator, and two rows");
    let Some(header) = lines.first() else {
        panic!("expected a header line");
    };
    assert!(header.starts_with("RULE"));
    assert!(header.contains("| INSTANCE ID |"));
    assert!(header.contains("| STATE"));
    assert!(
        lines
            .iter()
            .all(|line| line.chars().count() == header.chars().count()),
        "all lines should share the header's width"
    );
    let Some(separator) = lines.get(1) else {
        panic!("expected a separator line");
    };
    assert!(separator.contains("-+-"));
    assert!(separator.chars().all(|ch| ch == '-' || ch == '+'));
    let Some(second_row) = lines.get(3) else {
        panic!("expected a second data row");
    };
    assert!(second_row.contains("StopInstanceRule-i-1-aabbccdd"));
    assert!(
        second_row.contains(" - "),
        "missing cells should render a placeholder"
    );
    assert!(rendered.contains("ENABLED"));
}

#[rstest]
fn rule_table_reports_empty_listings() {
    let rendered = RuleTable::new(&[]).to_string();
    assert_eq!(rendered, "(no rules matched)\n");
}
