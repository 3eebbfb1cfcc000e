//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::directory::{DirectoryError, DirectoryFuture, InstanceDirectory, InstanceRef};
use crate::rules::{
    GrantOutcome, RevokeOutcome, RuleDetail, RuleExpression, RulePage, RuleStatus, RuleStore,
    RuleSummary, RuleTarget, StoreFuture, TargetPayload, TriggerRuleSpec,
};

/// Function ARN used by the scripted store.
pub const FUNCTION_ARN: &str =
    "arn:aws:lambda:eu-west-1:111111111111:function:drowse-ec2-scheduler";

/// Errors produced by the scripted doubles.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedError {
    /// Raised when a test scripted the named operation to fail.
    #[error("scripted failure in {0}")]
    Scripted(&'static str),
    /// Raised when an operation addresses a rule the store does not hold.
    #[error("rule '{0}' has no record")]
    UnknownRule(String),
    /// Raised when a rule is deleted while its target is still bound.
    #[error("rule '{0}' still has a target bound")]
    TargetStillBound(String),
}

/// Snapshot of one stored rule for assertions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredRule {
    /// Trigger condition, when present.
    pub expression: Option<RuleExpression>,
    /// Rule status, when present.
    pub status: Option<RuleStatus>,
    /// Description, when set.
    pub description: Option<String>,
    /// Bound target, when present.
    pub target: Option<RuleTarget>,
}

#[derive(Debug, Default)]
struct StoreState {
    rules: BTreeMap<String, StoredRule>,
    grants: BTreeSet<String>,
    failures: BTreeSet<&'static str>,
    calls: Vec<String>,
    page_size: Option<usize>,
}

impl StoreState {
    fn check_op(&mut self, operation: &'static str, detail: &str) -> Result<(), ScriptedError> {
        self.calls.push(format!("{operation} {detail}"));
        if self.failures.contains(operation) {
            return Err(ScriptedError::Scripted(operation));
        }
        Ok(())
    }
}

/// In-memory rule store with scripted failures and a call log.
///
/// Mimics the scheduler's semantics closely enough to catch ordering bugs:
/// writing a rule preserves any existing target, and deleting a rule whose
/// target is still bound fails.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRuleStore {
    state: Arc<Mutex<StoreState>>,
}

impl ScriptedRuleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("scripted store lock poisoned: {err}"))
    }

    /// Scripts the named operation to fail on every call.
    pub fn fail_on(&self, operation: &'static str) {
        self.locked().failures.insert(operation);
    }

    /// Limits listing pages to `size` rules, forcing pagination.
    pub fn set_page_size(&self, size: usize) {
        self.locked().page_size = Some(size);
    }

    /// Seeds a rule record without going through `put_rule`.
    pub fn seed_rule(
        &self,
        name: &str,
        expression: Option<RuleExpression>,
        status: Option<RuleStatus>,
    ) {
        self.locked().rules.insert(
            name.to_owned(),
            StoredRule {
                expression,
                status,
                description: None,
                target: None,
            },
        );
    }

    /// Seeds a target binding on an existing rule.
    pub fn seed_target(&self, name: &str, arn: &str, payload: Option<TargetPayload>) {
        let mut state = self.locked();
        let stored = state
            .rules
            .get_mut(name)
            .unwrap_or_else(|| panic!("seed_target: rule '{name}' not seeded"));
        stored.target = Some(RuleTarget {
            arn: arn.to_owned(),
            payload,
        });
    }

    /// Seeds an invocation grant.
    pub fn seed_grant(&self, name: &str) {
        self.locked().grants.insert(name.to_owned());
    }

    /// Returns the operations performed so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.locked().calls.clone()
    }

    /// Returns the names of all stored rules.
    #[must_use]
    pub fn rule_names(&self) -> Vec<String> {
        self.locked().rules.keys().cloned().collect()
    }

    /// Returns a snapshot of one stored rule.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<StoredRule> {
        self.locked().rules.get(name).cloned()
    }

    /// Reports whether an invocation grant exists for the rule.
    #[must_use]
    pub fn has_grant(&self, name: &str) -> bool {
        self.locked().grants.contains(name)
    }

    /// Number of invocation grants currently held.
    #[must_use]
    pub fn grant_count(&self) -> usize {
        self.locked().grants.len()
    }
}

impl RuleStore for ScriptedRuleStore {
    type Error = ScriptedError;

    fn function_arn(&self) -> &str {
        FUNCTION_ARN
    }

    fn put_rule<'a>(&'a self, spec: &'a TriggerRuleSpec) -> StoreFuture<'a, String, Self::Error> {
        Box::pin(async move {
            let mut state = self.locked();
            state.check_op("put_rule", &spec.name)?;
            let target = state
                .rules
                .get(&spec.name)
                .and_then(|stored| stored.target.clone());
            state.rules.insert(
                spec.name.clone(),
                StoredRule {
                    expression: Some(spec.expression.clone()),
                    status: Some(spec.status),
                    description: spec.description.clone(),
                    target,
                },
            );
            Ok(format!(
                "arn:aws:events:eu-west-1:111111111111:rule/{}",
                spec.name
            ))
        })
    }

    fn delete_rule<'a>(&'a self, name: &'a str) -> StoreFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.locked();
            state.check_op("delete_rule", name)?;
            if let Some(stored) = state.rules.get(name)
                && stored.target.is_some()
            {
                return Err(ScriptedError::TargetStillBound(name.to_owned()));
            }
            state.rules.remove(name);
            Ok(())
        })
    }

    fn describe_rule<'a>(
        &'a self,
        name: &'a str,
    ) -> StoreFuture<'a, Option<RuleDetail>, Self::Error> {
        Box::pin(async move {
            let mut state = self.locked();
            state.check_op("describe_rule", name)?;
            Ok(state.rules.get(name).map(|stored| RuleDetail {
                name: name.to_owned(),
                expression: stored.expression.clone(),
                status: stored.status,
                description: stored.description.clone(),
            }))
        })
    }

    fn list_rules<'a>(
        &'a self,
        next_token: Option<&'a str>,
    ) -> StoreFuture<'a, RulePage, Self::Error> {
        Box::pin(async move {
            let mut state = self.locked();
            state.check_op("list_rules", next_token.unwrap_or("-"))?;
            let page_size = state.page_size.unwrap_or(usize::MAX);
            let start = next_token
                .and_then(|token| token.parse::<usize>().ok())
                .unwrap_or(0);
            let total = state.rules.len();
            let rules: Vec<RuleSummary> = state
                .rules
                .iter()
                .skip(start)
                .take(page_size)
                .map(|(name, stored)| RuleSummary {
                    name: name.clone(),
                    schedule: stored
                        .expression
                        .as_ref()
                        .and_then(RuleExpression::schedule)
                        .map(str::to_owned),
                    status: stored.status,
                })
                .collect();
            let consumed = start.saturating_add(rules.len());
            let next = (consumed < total).then(|| consumed.to_string());
            Ok(RulePage {
                rules,
                next_token: next,
            })
        })
    }

    fn rule_target<'a>(
        &'a self,
        name: &'a str,
    ) -> StoreFuture<'a, Option<RuleTarget>, Self::Error> {
        Box::pin(async move {
            let mut state = self.locked();
            state.check_op("rule_target", name)?;
            Ok(state
                .rules
                .get(name)
                .and_then(|stored| stored.target.clone()))
        })
    }

    fn bind_target<'a>(
        &'a self,
        name: &'a str,
        payload: &'a TargetPayload,
    ) -> StoreFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.locked();
            state.check_op("bind_target", name)?;
            let stored = state
                .rules
                .get_mut(name)
                .ok_or_else(|| ScriptedError::UnknownRule(name.to_owned()))?;
            stored.target = Some(RuleTarget {
                arn: FUNCTION_ARN.to_owned(),
                payload: Some(payload.clone()),
            });
            Ok(())
        })
    }

    fn unbind_target<'a>(&'a self, name: &'a str) -> StoreFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.locked();
            state.check_op("unbind_target", name)?;
            if let Some(stored) = state.rules.get_mut(name) {
                stored.target = None;
            }
            Ok(())
        })
    }

    fn grant_invocation<'a>(
        &'a self,
        name: &'a str,
        _rule_arn: &'a str,
    ) -> StoreFuture<'a, GrantOutcome, Self::Error> {
        Box::pin(async move {
            let mut state = self.locked();
            state.check_op("grant_invocation", name)?;
            if state.grants.insert(name.to_owned()) {
                Ok(GrantOutcome::Granted)
            } else {
                Ok(GrantOutcome::AlreadyGranted)
            }
        })
    }

    fn revoke_invocation<'a>(&'a self, name: &'a str) -> StoreFuture<'a, RevokeOutcome, Self::Error> {
        Box::pin(async move {
            let mut state = self.locked();
            state.check_op("revoke_invocation", name)?;
            if state.grants.remove(name) {
                Ok(RevokeOutcome::Revoked)
            } else {
                Ok(RevokeOutcome::NotFound)
            }
        })
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    by_name: BTreeMap<String, String>,
    by_id: BTreeMap<String, Option<String>>,
    fail: bool,
    id_lookups: u32,
}

/// In-memory instance directory keyed by `Name` tag and instance id.
#[derive(Clone, Debug, Default)]
pub struct ScriptedDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl ScriptedDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, DirectoryState> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("scripted directory lock poisoned: {err}"))
    }

    /// Registers a named instance in both lookup directions.
    pub fn insert_instance(&self, name: &str, id: &str) {
        let mut state = self.locked();
        state.by_name.insert(name.to_owned(), id.to_owned());
        state.by_id.insert(id.to_owned(), Some(name.to_owned()));
    }

    /// Registers an instance with no `Name` tag.
    pub fn insert_unnamed(&self, id: &str) {
        self.locked().by_id.insert(id.to_owned(), None);
    }

    /// Scripts every lookup to fail.
    pub fn fail_lookups(&self) {
        self.locked().fail = true;
    }

    /// Number of id-to-name lookups performed.
    #[must_use]
    pub fn id_lookups(&self) -> u32 {
        self.locked().id_lookups
    }
}

impl InstanceDirectory for ScriptedDirectory {
    fn find_by_name<'a>(&'a self, name: &'a str) -> DirectoryFuture<'a, Option<InstanceRef>> {
        Box::pin(async move {
            let state = self.locked();
            if state.fail {
                return Err(DirectoryError::Api {
                    operation: "DescribeInstances",
                    message: String::from("scripted directory failure"),
                });
            }
            Ok(state.by_name.get(name).map(|id| InstanceRef {
                id: id.clone(),
                name: Some(name.to_owned()),
            }))
        })
    }

    fn name_for_id<'a>(&'a self, instance_id: &'a str) -> DirectoryFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut state = self.locked();
            state.id_lookups += 1;
            if state.fail {
                return Err(DirectoryError::Api {
                    operation: "DescribeInstances",
                    message: String::from("scripted directory failure"),
                });
            }
            Ok(state.by_id.get(instance_id).cloned().flatten())
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: tokio::sync::MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
