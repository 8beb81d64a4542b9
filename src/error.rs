// src/error.rs

use thiserror::Error;

/// Errors surfaced by mailboxes, nodes and their configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum NodeError {
  // --- Enqueue outcomes ---
  /// The producer was cancelled while waiting for mailbox space.
  #[error("Enqueue cancelled while waiting for mailbox space")]
  Cancelled,
  /// The mailbox was closed (node released) before or while waiting.
  #[error("Mailbox is closed")]
  Closed,
  /// Immediate-rejection mode: the mailbox was at capacity.
  #[error("Mailbox is full")]
  QueueFull,
  /// Bounded-wait mode: no space became available in time.
  #[error("Enqueue timed out waiting for mailbox space")]
  Timeout,

  // --- Configuration ---
  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String),
  #[error("Invalid value for property '{key}': {reason}")]
  InvalidOptionValue { key: String, reason: String },

  // --- Lifecycle ---
  /// `start()` was called outside of a tokio runtime.
  #[error("No tokio runtime available to spawn the dispatch worker")]
  NoRuntime,
  /// `start()` was called while the previous worker is still shutting down.
  #[error("Dispatch worker is still stopping")]
  Stopping,

  // --- Routing ---
  /// A packet was forwarded by a node that has no parent.
  #[error("Node '{0}' has no parent; forwarded packet is undeliverable")]
  NoParent(String),

  // --- Processing ---
  /// Returned by a [`PacketProcessor`](crate::node::PacketProcessor) that failed.
  #[error("Packet processing failed: {0}")]
  Processing(String),

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

impl NodeError {
  /// Helper for building an [`NodeError::InvalidOptionValue`].
  pub fn invalid_option(key: &str, reason: impl Into<String>) -> Self {
    NodeError::InvalidOptionValue {
      key: key.to_string(),
      reason: reason.into(),
    }
  }

  /// Whether this is one of the failed-enqueue outcomes counted by the
  /// node's `enqueue_failure` statistic.
  pub fn is_enqueue_failure(&self) -> bool {
    matches!(
      self,
      NodeError::Cancelled | NodeError::Closed | NodeError::QueueFull | NodeError::Timeout
    )
  }
}
