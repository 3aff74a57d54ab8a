//! State-change notification.

use crate::job::JobSnapshot;

/// Receives the full job list after every start, stop and reap.
///
/// The supervisor does not know how subscribers are reached; implementations
/// must not block.
pub trait Notifier: Send + Sync {
    fn publish(&self, streams: Vec<JobSnapshot>);
}

/// Notifier that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn publish(&self, _streams: Vec<JobSnapshot>) {}
}

