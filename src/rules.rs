//! Domain model for scheduled trigger rules.
//!
//! A trigger rule binds a cron expression to the scheduler function together
//! with a payload naming the instance and the action to take. Rule names are
//! deterministic: the action and instance id are embedded verbatim for human
//! scanning, and the cron expression contributes a short digest so several
//! schedules for the same instance and action can coexist without
//! overwriting each other.

use std::fmt::{self, Display};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex length of the schedule digest embedded in rule names.
const DIGEST_LEN: usize = 8;

const START_PREFIX: &str = "StartInstanceRule-";
const STOP_PREFIX: &str = "StopInstanceRule-";

/// Action a trigger rule performs against its instance.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleAction {
    /// Start the instance when the schedule fires.
    Start,
    /// Stop the instance when the schedule fires.
    Stop,
}

impl ScheduleAction {
    /// Lower-case verb used in payloads and rule descriptions.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }

    /// Title-case form used as the rule name prefix.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Stop => "Stop",
        }
    }
}

impl Display for ScheduleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Deterministic name of a trigger rule.
///
/// The textual form is `{Start|Stop}InstanceRule-{instanceId}-{digest}`,
/// where the digest is the first eight hex characters of the SHA-256 of the
/// cron expression. The digest keeps names unique per schedule while the
/// prefix and instance id keep them scannable in the scheduler console.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RuleName {
    action: ScheduleAction,
    instance_id: String,
    digest: String,
}

impl RuleName {
    /// Derives the rule name for an instance, action, and cron expression.
    #[must_use]
    pub fn derive(action: ScheduleAction, instance_id: &str, cron_expression: &str) -> Self {
        let mut digest = hex::encode(Sha256::digest(cron_expression.as_bytes()));
        digest.truncate(DIGEST_LEN);
        Self {
            action,
            instance_id: instance_id.to_owned(),
            digest,
        }
    }

    /// Parses a rule name back into its parts.
    ///
    /// Returns `None` when the name does not follow the derived shape. The
    /// scheduler namespace is shared with rules this tool never created, so
    /// foreign names are expected input, not errors.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let (action, rest) = if let Some(rest) = name.strip_prefix(START_PREFIX) {
            (ScheduleAction::Start, rest)
        } else if let Some(rest) = name.strip_prefix(STOP_PREFIX) {
            (ScheduleAction::Stop, rest)
        } else {
            return None;
        };
        let (instance_id, digest) = rest.rsplit_once('-')?;
        if instance_id.is_empty()
            || digest.len() != DIGEST_LEN
            || !digest.chars().all(|c| c.is_ascii_hexdigit())
        {
            return None;
        }
        Some(Self {
            action,
            instance_id: instance_id.to_owned(),
            digest: digest.to_owned(),
        })
    }

    /// Action encoded in the name.
    #[must_use]
    pub const fn action(&self) -> ScheduleAction {
        self.action
    }

    /// Instance id encoded in the name.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Digest suffix disambiguating schedules for the same instance/action.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}InstanceRule-{}-{}",
            self.action.title(),
            self.instance_id,
            self.digest
        )
    }
}

/// Payload delivered to the scheduler function when a rule fires.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TargetPayload {
    /// Identifier of the instance to act on.
    pub instance_id: String,
    /// Action the function performs when invoked.
    pub action: ScheduleAction,
}

impl TargetPayload {
    /// Creates a payload for the given instance and action.
    #[must_use]
    pub fn new(instance_id: impl Into<String>, action: ScheduleAction) -> Self {
        Self {
            instance_id: instance_id.into(),
            action,
        }
    }

    /// Parses a payload from a target's input document.
    ///
    /// Returns `None` for malformed or foreign payloads; targets bound by
    /// other consumers simply do not participate in listings or resolution.
    #[must_use]
    pub fn from_json(input: &str) -> Option<Self> {
        serde_json::from_str(input).ok()
    }

    /// Serialises the payload to the JSON document stored on the target.
    ///
    /// # Errors
    ///
    /// Returns the underlying serialisation error, which for this fixed
    /// shape only occurs when formatting fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Whether a rule fires on its trigger.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RuleStatus {
    /// The rule fires when its trigger matches.
    Enabled,
    /// The rule is retained but does not fire.
    Disabled,
}

impl Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => f.write_str("ENABLED"),
            Self::Disabled => f.write_str("DISABLED"),
        }
    }
}

/// Trigger condition carried by a rule.
///
/// The scheduler stores exactly one of a schedule expression or an event
/// pattern per rule; state updates must re-submit whichever is present.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RuleExpression {
    /// A `cron(...)` or `rate(...)` schedule expression.
    Schedule(String),
    /// An event pattern document.
    Pattern(String),
}

impl RuleExpression {
    /// Schedule expression text, when this is a schedule.
    #[must_use]
    pub fn schedule(&self) -> Option<&str> {
        match self {
            Self::Schedule(expression) => Some(expression),
            Self::Pattern(_) => None,
        }
    }

    /// Event pattern text, when this is a pattern.
    #[must_use]
    pub fn pattern(&self) -> Option<&str> {
        match self {
            Self::Pattern(document) => Some(document),
            Self::Schedule(_) => None,
        }
    }
}

/// Full specification of a rule as written to the scheduler.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TriggerRuleSpec {
    /// Rule name.
    pub name: String,
    /// Trigger condition.
    pub expression: RuleExpression,
    /// Whether the rule fires.
    pub status: RuleStatus,
    /// Human-readable description shown in the scheduler console.
    pub description: Option<String>,
}

/// Snapshot of an existing rule as fetched from the scheduler.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuleDetail {
    /// Rule name.
    pub name: String,
    /// Trigger condition, when the remote record carries one.
    pub expression: Option<RuleExpression>,
    /// Current status, when reported.
    pub status: Option<RuleStatus>,
    /// Description, when set.
    pub description: Option<String>,
}

/// One rule as returned by a listing page.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuleSummary {
    /// Rule name.
    pub name: String,
    /// Schedule expression, when the rule has one.
    pub schedule: Option<String>,
    /// Current status, when reported.
    pub status: Option<RuleStatus>,
}

/// A page of rule summaries plus the continuation token, if any.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RulePage {
    /// Rules on this page.
    pub rules: Vec<RuleSummary>,
    /// Token for the next page; `None` on the final page.
    pub next_token: Option<String>,
}

/// Target binding fetched from an existing rule.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuleTarget {
    /// ARN the rule invokes.
    pub arn: String,
    /// Parsed payload, when present and well formed.
    pub payload: Option<TargetPayload>,
}

/// Result of granting the scheduler permission to invoke the function.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GrantOutcome {
    /// A new grant was written.
    Granted,
    /// An identical grant already existed.
    AlreadyGranted,
}

/// Result of revoking the scheduler's permission for a rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RevokeOutcome {
    /// The grant was removed.
    Revoked,
    /// No grant existed for the statement id.
    NotFound,
}

/// Future returned by rule-store operations.
pub type StoreFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Interface to the remote scheduler and the function's permission surface.
///
/// Implementations own the wire format; orchestration deals only in the
/// typed values above. Benign remote conditions (duplicate grant, grant
/// already gone, rule unknown on describe) surface as typed outcomes rather
/// than errors so callers can match on them exhaustively.
pub trait RuleStore {
    /// Error type raised by the underlying service client.
    type Error: std::error::Error + Send + Sync + 'static;

    /// ARN of the function that rules are bound to.
    fn function_arn(&self) -> &str;

    /// Creates or overwrites a rule, returning the rule's ARN.
    fn put_rule<'a>(&'a self, spec: &'a TriggerRuleSpec) -> StoreFuture<'a, String, Self::Error>;

    /// Deletes a rule by name.
    fn delete_rule<'a>(&'a self, name: &'a str) -> StoreFuture<'a, (), Self::Error>;

    /// Fetches a rule; `None` when the scheduler does not know the name.
    fn describe_rule<'a>(
        &'a self,
        name: &'a str,
    ) -> StoreFuture<'a, Option<RuleDetail>, Self::Error>;

    /// Fetches one page of rules, starting from `next_token` when given.
    fn list_rules<'a>(
        &'a self,
        next_token: Option<&'a str>,
    ) -> StoreFuture<'a, RulePage, Self::Error>;

    /// Fetches the target bound to a rule.
    ///
    /// `None` covers both a rule without a target and a rule the scheduler
    /// does not know.
    fn rule_target<'a>(
        &'a self,
        name: &'a str,
    ) -> StoreFuture<'a, Option<RuleTarget>, Self::Error>;

    /// Binds the function as the rule's sole target with the given payload.
    fn bind_target<'a>(
        &'a self,
        name: &'a str,
        payload: &'a TargetPayload,
    ) -> StoreFuture<'a, (), Self::Error>;

    /// Removes the rule's target binding.
    fn unbind_target<'a>(&'a self, name: &'a str) -> StoreFuture<'a, (), Self::Error>;

    /// Grants the scheduler permission to invoke the function for this rule.
    ///
    /// The statement id is the rule name so the grant can be revoked from
    /// the name alone.
    fn grant_invocation<'a>(
        &'a self,
        name: &'a str,
        rule_arn: &'a str,
    ) -> StoreFuture<'a, GrantOutcome, Self::Error>;

    /// Revokes the scheduler's invocation permission for this rule.
    fn revoke_invocation<'a>(&'a self, name: &'a str) -> StoreFuture<'a, RevokeOutcome, Self::Error>;
}
