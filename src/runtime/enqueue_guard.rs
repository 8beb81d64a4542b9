// src/runtime/enqueue_guard.rs

use crate::runtime::QueueStatistics;

/// Accounts for exactly one enqueue attempt.
///
/// The attempt is resolved explicitly with [`succeeded`](Self::succeeded) or
/// [`failed`](Self::failed). If the guard is dropped unresolved, the
/// producer future was cancelled while waiting for space, and the attempt
/// is counted as a failure.
pub(crate) struct EnqueueGuard<'a> {
  stats: &'a QueueStatistics,
  node: &'a str,
  resolved: bool,
}

impl<'a> EnqueueGuard<'a> {
  pub fn new(stats: &'a QueueStatistics, node: &'a str) -> Self {
    Self {
      stats,
      node,
      resolved: false,
    }
  }

  pub fn succeeded(mut self) {
    self.resolved = true;
    self.stats.record_enqueue_success();
  }

  pub fn failed(mut self) {
    self.resolved = true;
    self.stats.record_enqueue_failure();
  }
}

impl Drop for EnqueueGuard<'_> {
  fn drop(&mut self) {
    if !self.resolved {
      tracing::debug!(node = %self.node, "Enqueue cancelled while waiting for mailbox space");
      self.stats.record_enqueue_failure();
    }
  }
}
