// src/lib.rs

//! mailnode - bounded mailbox nodes for hierarchical message routing.
//!
//! Every [`Node`] owns one bounded FIFO mailbox drained by exactly one
//! dispatch worker task. Entries tagged LOCAL go to the node's
//! [`PacketProcessor`]; entries tagged FORWARD go to the parent's mailbox,
//! so nodes compose into a tree where work flows upward. Producers wait
//! (backpressure) rather than drop when a mailbox is full.

/// Defines the error type used throughout the library.
pub mod error;
/// Contains the `Packet` carried through mailboxes.
pub mod message;
/// Nodes: hierarchy, routing, lifecycle and the dispatch worker.
pub mod node;
/// Per-node registry of owned addresses.
pub mod routing;
/// Provides the bounded mailbox and its statistics counters.
pub mod runtime;

// Re-export core types for user convenience, making them accessible directly
// from the crate root (e.g., `mailnode::Node`, `mailnode::NodeError`).
pub use error::NodeError;
pub use message::Packet;
pub use node::{MessageReceiver, Node, NodeConfig, PacketProcessor, ProcessContext, Properties, PropertyValue};
pub use routing::RoutingTable;
pub use runtime::{
  Direction, Mailbox, MailboxEntry, ResizeOutcome, StatRecord, StatisticType, StatisticsSnapshot,
};

// --- Top-Level Library Information Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
///
/// # Examples
///
/// ```
/// let (major, minor, patch) = mailnode::version();
/// println!("mailnode version: {}.{}.{}", major, minor, patch);
/// ```
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

/// Returns the major version number of the library.
pub fn version_major() -> i32 {
  VERSION_MAJOR
}

/// Returns the minor version number of the library.
pub fn version_minor() -> i32 {
  VERSION_MINOR
}

/// Returns the patch version number of the library.
pub fn version_patch() -> i32 {
  VERSION_PATCH
}
