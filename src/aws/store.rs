//! EventBridge rule store with Lambda-held invocation grants.
//!
//! Rules and targets live in EventBridge; the permission for EventBridge to
//! invoke the function lives on the function's resource policy in Lambda,
//! one statement per rule, keyed by the rule name. Benign remote conditions
//! are mapped to typed outcomes here so orchestration never inspects
//! provider error codes.

use aws_sdk_eventbridge::Client as EventsClient;
use aws_sdk_eventbridge::operation::describe_rule::{DescribeRuleError, DescribeRuleOutput};
use aws_sdk_eventbridge::operation::list_targets_by_rule::ListTargetsByRuleError;
use aws_sdk_eventbridge::operation::remove_targets::RemoveTargetsError;
use aws_sdk_eventbridge::types::{Rule, RuleState, Target};
use aws_sdk_lambda::Client as LambdaClient;
use aws_sdk_lambda::operation::add_permission::AddPermissionError;
use aws_sdk_lambda::operation::remove_permission::RemovePermissionError;

use crate::rules::{
    GrantOutcome, RevokeOutcome, RuleDetail, RuleExpression, RulePage, RuleStatus, RuleStore,
    RuleSummary, RuleTarget, StoreFuture, TargetPayload, TriggerRuleSpec,
};

use super::AwsApiError;

/// Fixed id of the single target each rule carries.
const TARGET_ID: &str = "1";

/// Rule store backed by EventBridge and the Lambda permission surface.
#[derive(Clone, Debug)]
pub struct EventBridgeRuleStore {
    events: EventsClient,
    lambda: LambdaClient,
    function_arn: String,
}

impl EventBridgeRuleStore {
    /// Creates a store binding rules to the function at `function_arn`.
    #[must_use]
    pub fn new(
        events: EventsClient,
        lambda: LambdaClient,
        function_arn: impl Into<String>,
    ) -> Self {
        Self {
            events,
            lambda,
            function_arn: function_arn.into(),
        }
    }
}

impl RuleStore for EventBridgeRuleStore {
    type Error = AwsApiError;

    fn function_arn(&self) -> &str {
        &self.function_arn
    }

    fn put_rule<'a>(&'a self, spec: &'a TriggerRuleSpec) -> StoreFuture<'a, String, Self::Error> {
        Box::pin(async move {
            let mut request = self
                .events
                .put_rule()
                .name(&spec.name)
                .state(rule_state(spec.status));
            request = match &spec.expression {
                RuleExpression::Schedule(expression) => request.schedule_expression(expression),
                RuleExpression::Pattern(document) => request.event_pattern(document),
            };
            if let Some(description) = &spec.description {
                request = request.description(description);
            }
            let output = request
                .send()
                .await
                .map_err(|err| AwsApiError::api("PutRule", err))?;
            output
                .rule_arn()
                .map(ToOwned::to_owned)
                .ok_or(AwsApiError::MissingField {
                    operation: "PutRule",
                    field: "RuleArn",
                })
        })
    }

    fn delete_rule<'a>(&'a self, name: &'a str) -> StoreFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.events
                .delete_rule()
                .name(name)
                .send()
                .await
                .map_err(|err| AwsApiError::api("DeleteRule", err))?;
            Ok(())
        })
    }

    fn describe_rule<'a>(
        &'a self,
        name: &'a str,
    ) -> StoreFuture<'a, Option<RuleDetail>, Self::Error> {
        Box::pin(async move {
            let output = match self.events.describe_rule().name(name).send().await {
                Ok(output) => output,
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(DescribeRuleError::is_resource_not_found_exception) =>
                {
                    return Ok(None);
                }
                Err(err) => return Err(AwsApiError::api("DescribeRule", err)),
            };
            Ok(Some(RuleDetail {
                name: output.name().unwrap_or(name).to_owned(),
                expression: detail_expression(&output),
                status: output.state().and_then(rule_status),
                description: output.description().map(ToOwned::to_owned),
            }))
        })
    }

    fn list_rules<'a>(
        &'a self,
        next_token: Option<&'a str>,
    ) -> StoreFuture<'a, RulePage, Self::Error> {
        Box::pin(async move {
            let mut request = self.events.list_rules();
            if let Some(token) = next_token {
                request = request.next_token(token);
            }
            let output = request
                .send()
                .await
                .map_err(|err| AwsApiError::api("ListRules", err))?;
            Ok(RulePage {
                rules: output.rules().iter().map(summarise).collect(),
                next_token: output.next_token().map(ToOwned::to_owned),
            })
        })
    }

    fn rule_target<'a>(
        &'a self,
        name: &'a str,
    ) -> StoreFuture<'a, Option<RuleTarget>, Self::Error> {
        Box::pin(async move {
            let output = match self.events.list_targets_by_rule().rule(name).send().await {
                Ok(output) => output,
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(ListTargetsByRuleError::is_resource_not_found_exception) =>
                {
                    return Ok(None);
                }
                Err(err) => return Err(AwsApiError::api("ListTargetsByRule", err)),
            };
            Ok(output.targets().first().map(|target| RuleTarget {
                arn: target.arn().to_owned(),
                payload: target.input().and_then(TargetPayload::from_json),
            }))
        })
    }

    fn bind_target<'a>(
        &'a self,
        name: &'a str,
        payload: &'a TargetPayload,
    ) -> StoreFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let input = payload.to_json().map_err(|err| AwsApiError::Encode {
                what: "target payload",
                message: err.to_string(),
            })?;
            let target = Target::builder()
                .id(TARGET_ID)
                .arn(&self.function_arn)
                .input(input)
                .build()
                .map_err(|err| AwsApiError::Encode {
                    what: "rule target",
                    message: err.to_string(),
                })?;
            let output = self
                .events
                .put_targets()
                .rule(name)
                .targets(target)
                .send()
                .await
                .map_err(|err| AwsApiError::api("PutTargets", err))?;
            if let Some(entry) = output.failed_entries().first() {
                return Err(AwsApiError::Api {
                    operation: "PutTargets",
                    message: entry_message(entry.error_code(), entry.error_message()),
                });
            }
            Ok(())
        })
    }

    fn unbind_target<'a>(&'a self, name: &'a str) -> StoreFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let output = match self
                .events
                .remove_targets()
                .rule(name)
                .ids(TARGET_ID)
                .send()
                .await
            {
                Ok(output) => output,
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(RemoveTargetsError::is_resource_not_found_exception) =>
                {
                    return Ok(());
                }
                Err(err) => return Err(AwsApiError::api("RemoveTargets", err)),
            };
            // A target that is already gone is the desired end state.
            if let Some(entry) = output
                .failed_entries()
                .iter()
                .find(|entry| entry.error_code() != Some("ResourceNotFoundException"))
            {
                return Err(AwsApiError::Api {
                    operation: "RemoveTargets",
                    message: entry_message(entry.error_code(), entry.error_message()),
                });
            }
            Ok(())
        })
    }

    fn grant_invocation<'a>(
        &'a self,
        name: &'a str,
        rule_arn: &'a str,
    ) -> StoreFuture<'a, GrantOutcome, Self::Error> {
        Box::pin(async move {
            match self
                .lambda
                .add_permission()
                .function_name(&self.function_arn)
                .statement_id(name)
                .action("lambda:InvokeFunction")
                .principal("events.amazonaws.com")
                .source_arn(rule_arn)
                .send()
                .await
            {
                Ok(_) => Ok(GrantOutcome::Granted),
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(AddPermissionError::is_resource_conflict_exception) =>
                {
                    Ok(GrantOutcome::AlreadyGranted)
                }
                Err(err) => Err(AwsApiError::api("AddPermission", err)),
            }
        })
    }

    fn revoke_invocation<'a>(
        &'a self,
        name: &'a str,
    ) -> StoreFuture<'a, RevokeOutcome, Self::Error> {
        Box::pin(async move {
            match self
                .lambda
                .remove_permission()
                .function_name(&self.function_arn)
                .statement_id(name)
                .send()
                .await
            {
                Ok(_) => Ok(RevokeOutcome::Revoked),
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(RemovePermissionError::is_resource_not_found_exception) =>
                {
                    Ok(RevokeOutcome::NotFound)
                }
                Err(err) => Err(AwsApiError::api("RemovePermission", err)),
            }
        })
    }
}

const fn rule_state(status: RuleStatus) -> RuleState {
    match status {
        RuleStatus::Enabled => RuleState::Enabled,
        RuleStatus::Disabled => RuleState::Disabled,
    }
}

fn rule_status(state: &RuleState) -> Option<RuleStatus> {
    match state {
        RuleState::Enabled => Some(RuleStatus::Enabled),
        RuleState::Disabled => Some(RuleStatus::Disabled),
        _ => None,
    }
}

fn detail_expression(output: &DescribeRuleOutput) -> Option<RuleExpression> {
    output
        .schedule_expression()
        .map(|expression| RuleExpression::Schedule(expression.to_owned()))
        .or_else(|| {
            output
                .event_pattern()
                .map(|document| RuleExpression::Pattern(document.to_owned()))
        })
}

fn summarise(rule: &Rule) -> RuleSummary {
    RuleSummary {
        name: rule.name().unwrap_or_default().to_owned(),
        schedule: rule.schedule_expression().map(ToOwned::to_owned),
        status: rule.state().and_then(rule_status),
    }
}

fn entry_message(code: Option<&str>, message: Option<&str>) -> String {
    format!(
        "{}: {}",
        code.unwrap_or("unknown error"),
        message.unwrap_or("no detail")
    )
}
