//! Orchestrates trigger-rule lifecycles against the scheduler.
//!
//! Every operation is a short, ordered sequence of control-plane calls: a
//! rule is written before its grant, the grant before the target binding,
//! and removal unwinds in the same order (target, rule, grant). Creation is
//! compensated: when a later step fails, the steps already taken are rolled
//! back so the scheduler is not left holding a rule without a grant or
//! target. The scheduler itself is the sole source of truth; nothing is
//! cached between invocations.

use std::fmt::Display;

use thiserror::Error;
use tracing::info;

use crate::directory::{DirectoryError, InstanceDirectory, InstanceRef};
use crate::rules::{
    GrantOutcome, RevokeOutcome, RuleExpression, RuleName, RuleStatus, RuleStore, ScheduleAction,
    TargetPayload, TriggerRuleSpec,
};

mod listing;

pub use listing::{ListFilter, RuleRow, RuleTable};

/// Errors surfaced while reconciling rules.
#[derive(Debug, Error)]
pub enum ReconcileError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when no instance carries the requested `Name` tag.
    #[error("no instance named '{name}' found in a running or stopped state")]
    InstanceNotFound {
        /// Name tag that was searched for.
        name: String,
    },
    /// Raised when the scheduler does not know the named rule.
    #[error("no rule named '{name}' exists")]
    RuleNotFound {
        /// Rule name that was requested.
        name: String,
    },
    /// Raised when an existing rule carries neither a schedule expression
    /// nor an event pattern, so its state cannot be re-submitted.
    #[error("rule '{name}' carries neither a schedule expression nor an event pattern")]
    RuleIncomplete {
        /// Rule name with the incomplete remote record.
        name: String,
    },
    /// Raised when a rule name does not follow the managed naming scheme,
    /// so the action cannot be recovered from it.
    #[error("rule '{name}' does not follow the managed naming scheme")]
    UnrecognisedRule {
        /// Rule name that failed to parse.
        name: String,
    },
    /// Raised when the schedule flag does not match the rule's action.
    #[error("rule '{name}' is a {actual} rule; pass the new cron via --{actual}")]
    ActionMismatch {
        /// Rule name the update was aimed at.
        name: String,
        /// Action encoded in the rule name.
        actual: ScheduleAction,
    },
    /// Raised when an instance directory lookup fails.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    /// Raised when granting the invocation permission fails after the rule
    /// was written. The message notes whether rollback succeeded.
    #[error("failed to grant invocation permission: {message}")]
    Grant {
        /// Failure description, including any rollback note.
        message: String,
        /// Provider-specific error.
        #[source]
        source: E,
    },
    /// Raised when binding the function target fails after the rule and
    /// grant were written. The message notes whether rollback succeeded.
    #[error("failed to bind the function target: {message}")]
    Bind {
        /// Failure description, including any rollback note.
        message: String,
        /// Provider-specific error.
        #[source]
        source: E,
    },
    /// Raised for any other scheduler request failure.
    #[error("scheduler request failed: {0}")]
    Store(#[source] E),
}

/// Outcome of creating one trigger rule.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreatedRule {
    /// Derived rule name.
    pub name: String,
    /// ARN the scheduler assigned to the rule.
    pub rule_arn: String,
    /// Action the rule performs.
    pub action: ScheduleAction,
    /// Whether the invocation grant was newly written or already present.
    pub grant: GrantOutcome,
}

/// Reconciles trigger rules against the scheduler and instance directory.
#[derive(Debug)]
pub struct RuleReconciler<S, D> {
    store: S,
    directory: D,
}

impl<S, D> RuleReconciler<S, D>
where
    S: RuleStore,
    D: InstanceDirectory,
{
    /// Creates a reconciler over the given store and directory.
    #[must_use]
    pub const fn new(store: S, directory: D) -> Self {
        Self { store, directory }
    }

    /// Resolves an instance by its `Name` tag.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InstanceNotFound`] when no running or
    /// stopped instance carries the tag, and [`ReconcileError::Directory`]
    /// when the lookup itself fails.
    pub async fn lookup_instance(
        &self,
        name: &str,
    ) -> Result<InstanceRef, ReconcileError<S::Error>> {
        self.directory
            .find_by_name(name)
            .await?
            .ok_or_else(|| ReconcileError::InstanceNotFound {
                name: name.to_owned(),
            })
    }

    /// Creates the requested schedules for a named instance.
    ///
    /// The instance is resolved once; a start rule is created when
    /// `start_cron` is given and a stop rule when `stop_cron` is given.
    ///
    /// # Errors
    ///
    /// Returns any [`ReconcileError`] from the lookup or from rule creation.
    pub async fn create_schedules(
        &self,
        instance_name: &str,
        start_cron: Option<&str>,
        stop_cron: Option<&str>,
    ) -> Result<Vec<CreatedRule>, ReconcileError<S::Error>> {
        let instance = self.lookup_instance(instance_name).await?;
        let mut created = Vec::new();
        if let Some(cron) = start_cron {
            created.push(self.create(&instance, ScheduleAction::Start, cron).await?);
        }
        if let Some(cron) = stop_cron {
            created.push(self.create(&instance, ScheduleAction::Stop, cron).await?);
        }
        Ok(created)
    }

    /// Creates one rule, its invocation grant, and its target binding.
    ///
    /// The sequence is rule, grant, target. A duplicate grant is benign and
    /// logged. When the grant or binding fails, the steps already taken are
    /// rolled back before the error is returned; rollback failures are
    /// appended to the error message rather than masking the original
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Store`] when writing the rule fails,
    /// [`ReconcileError::Grant`] when the grant fails, and
    /// [`ReconcileError::Bind`] when the target binding fails.
    pub async fn create(
        &self,
        instance: &InstanceRef,
        action: ScheduleAction,
        cron: &str,
    ) -> Result<CreatedRule, ReconcileError<S::Error>> {
        let name = RuleName::derive(action, &instance.id, cron).to_string();
        let spec = TriggerRuleSpec {
            name: name.clone(),
            expression: RuleExpression::Schedule(format!("cron({cron})")),
            status: RuleStatus::Enabled,
            description: Some(describe_purpose(action, instance, cron)),
        };
        let rule_arn = self
            .store
            .put_rule(&spec)
            .await
            .map_err(ReconcileError::Store)?;

        let grant = match self.store.grant_invocation(&name, &rule_arn).await {
            Ok(outcome) => {
                if outcome == GrantOutcome::AlreadyGranted {
                    info!(rule = %name, "invocation grant already present; continuing");
                }
                outcome
            }
            Err(err) => {
                let message = self.unwind_create(&name, false, &err).await;
                return Err(ReconcileError::Grant {
                    message,
                    source: err,
                });
            }
        };

        let payload = TargetPayload::new(instance.id.clone(), action);
        if let Err(err) = self.store.bind_target(&name, &payload).await {
            let message = self.unwind_create(&name, true, &err).await;
            return Err(ReconcileError::Bind {
                message,
                source: err,
            });
        }

        Ok(CreatedRule {
            name,
            rule_arn,
            action,
            grant,
        })
    }

    /// Removes a rule: target binding first, then the rule, then the grant.
    ///
    /// A grant that is already absent is benign and logged; the scheduler
    /// was already in the desired state.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::RuleNotFound`] when the rule does not
    /// exist and [`ReconcileError::Store`] when any removal step fails.
    pub async fn remove(&self, rule_name: &str) -> Result<(), ReconcileError<S::Error>> {
        let detail = self
            .store
            .describe_rule(rule_name)
            .await
            .map_err(ReconcileError::Store)?;
        if detail.is_none() {
            return Err(ReconcileError::RuleNotFound {
                name: rule_name.to_owned(),
            });
        }
        self.store
            .unbind_target(rule_name)
            .await
            .map_err(ReconcileError::Store)?;
        self.store
            .delete_rule(rule_name)
            .await
            .map_err(ReconcileError::Store)?;
        match self
            .store
            .revoke_invocation(rule_name)
            .await
            .map_err(ReconcileError::Store)?
        {
            RevokeOutcome::Revoked => {}
            RevokeOutcome::NotFound => {
                info!(rule = %rule_name, "invocation grant already absent");
            }
        }
        Ok(())
    }

    /// Enables or disables a rule, preserving its trigger condition.
    ///
    /// The existing rule is fetched and re-submitted with whichever of its
    /// schedule expression or event pattern it already carries, so toggling
    /// state never alters the trigger. Re-submitting the current state is a
    /// no-op on the remote side.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::RuleNotFound`] when the rule does not
    /// exist, [`ReconcileError::RuleIncomplete`] when it carries no trigger
    /// condition, and [`ReconcileError::Store`] when a scheduler call fails.
    pub async fn set_state(
        &self,
        rule_name: &str,
        status: RuleStatus,
    ) -> Result<(), ReconcileError<S::Error>> {
        let detail = self
            .store
            .describe_rule(rule_name)
            .await
            .map_err(ReconcileError::Store)?
            .ok_or_else(|| ReconcileError::RuleNotFound {
                name: rule_name.to_owned(),
            })?;
        let expression = detail
            .expression
            .ok_or_else(|| ReconcileError::RuleIncomplete {
                name: rule_name.to_owned(),
            })?;
        let spec = TriggerRuleSpec {
            name: detail.name,
            expression,
            status,
            description: detail.description,
        };
        self.store
            .put_rule(&spec)
            .await
            .map_err(ReconcileError::Store)?;
        Ok(())
    }

    /// Replaces a rule's schedule, preserving its action.
    ///
    /// The action is recovered from the existing rule name and must match
    /// the flag the new cron arrived on. The old rule and grant are removed
    /// and a fresh pair is created under the name derived from the new cron;
    /// when the cron is unchanged the name is identical and the rule is
    /// simply rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::UnrecognisedRule`] for unmanaged names,
    /// [`ReconcileError::ActionMismatch`] when the flag disagrees with the
    /// rule, [`ReconcileError::RuleNotFound`] when the rule does not exist,
    /// and any error from removal or creation.
    pub async fn reschedule(
        &self,
        rule_name: &str,
        action: ScheduleAction,
        cron: &str,
    ) -> Result<CreatedRule, ReconcileError<S::Error>> {
        let parsed =
            RuleName::parse(rule_name).ok_or_else(|| ReconcileError::UnrecognisedRule {
                name: rule_name.to_owned(),
            })?;
        if parsed.action() != action {
            return Err(ReconcileError::ActionMismatch {
                name: rule_name.to_owned(),
                actual: parsed.action(),
            });
        }
        if self
            .store
            .describe_rule(rule_name)
            .await
            .map_err(ReconcileError::Store)?
            .is_none()
        {
            return Err(ReconcileError::RuleNotFound {
                name: rule_name.to_owned(),
            });
        }

        let instance_id = self.resolve(rule_name).await?.map_or_else(
            || parsed.instance_id().to_owned(),
            |payload| payload.instance_id,
        );
        let instance_name = self.directory.name_for_id(&instance_id).await?;
        let instance = InstanceRef {
            id: instance_id,
            name: instance_name,
        };

        self.remove(rule_name).await?;
        self.create(&instance, action, cron).await
    }

    /// Resolves a rule to the payload on its bound target.
    ///
    /// Returns `None` when the rule has no target or the target's payload
    /// is missing or malformed; absence is an answer, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Store`] when fetching the target fails.
    pub async fn resolve(
        &self,
        rule_name: &str,
    ) -> Result<Option<TargetPayload>, ReconcileError<S::Error>> {
        let target = self
            .store
            .rule_target(rule_name)
            .await
            .map_err(ReconcileError::Store)?;
        Ok(target.and_then(|bound| bound.payload))
    }

    /// Reports whether the scheduler knows the named rule.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Store`] when the describe call fails for
    /// any reason other than the rule being unknown.
    pub async fn exists(&self, rule_name: &str) -> Result<bool, ReconcileError<S::Error>> {
        Ok(self
            .store
            .describe_rule(rule_name)
            .await
            .map_err(ReconcileError::Store)?
            .is_some())
    }

    async fn unwind_create<E: Display>(
        &self,
        name: &str,
        revoke_grant: bool,
        failure: &E,
    ) -> String {
        let mut message = failure.to_string();
        if let Err(err) = self.store.delete_rule(name).await {
            message = format!("{message} (rollback of rule also failed: {err})");
        }
        if revoke_grant && let Err(err) = self.store.revoke_invocation(name).await {
            message = format!("{message} (rollback of grant also failed: {err})");
        }
        message
    }
}

fn describe_purpose(action: ScheduleAction, instance: &InstanceRef, cron: &str) -> String {
    let display_name = instance.name.as_deref().unwrap_or(&instance.id);
    format!(
        "Rule to {} EC2 instance {} (Name: {display_name}) at specified time: cron({cron})",
        action.verb(),
        instance.id
    )
}

#[cfg(test)]
mod tests;
