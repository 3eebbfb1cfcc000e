//! Instance directory lookups against the compute control plane.
//!
//! Schedules are keyed by instance id, but operators think in `Name` tags.
//! The directory resolves between the two; it never caches, so every command
//! invocation sees the control plane's current view.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// A compute instance's id and name pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRef {
    /// Provider identifier, for example `i-0123456789abcdef0`.
    pub id: String,
    /// Value of the instance's `Name` tag, when one is set.
    pub name: Option<String>,
}

/// Errors raised by directory lookups.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The control plane rejected or failed a lookup call.
    #[error("{operation} failed: {message}")]
    Api {
        /// Control-plane operation that failed.
        operation: &'static str,
        /// Provider-reported failure detail.
        message: String,
    },
}

/// Future returned by directory operations.
pub type DirectoryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DirectoryError>> + Send + 'a>>;

/// Read-only view of the compute control plane's instance inventory.
pub trait InstanceDirectory {
    /// Finds a running or stopped instance by its `Name` tag.
    ///
    /// Returns `None` when no instance carries the tag. When several match,
    /// implementations return the first and log the ambiguity.
    fn find_by_name<'a>(&'a self, name: &'a str) -> DirectoryFuture<'a, Option<InstanceRef>>;

    /// Looks up the `Name` tag value for an instance id.
    ///
    /// Returns `None` when the instance is unknown or carries no `Name` tag;
    /// callers render a placeholder rather than failing.
    fn name_for_id<'a>(&'a self, instance_id: &'a str) -> DirectoryFuture<'a, Option<String>>;
}
