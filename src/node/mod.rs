// src/node/mod.rs

pub mod config; // NodeConfig and property parsing
pub mod core; // The Node handle: mailbox, routing, hierarchy, lifecycle
mod worker; // Dispatch loop run by each node's worker task

pub use self::core::{Node, ProcessContext, DEAD_LETTER_CAPACITY};
pub use config::{NodeConfig, Properties, PropertyValue};

use crate::error::NodeError;
use crate::message::Packet;

use std::collections::BTreeSet;

use async_trait::async_trait;

/// What a node needs from its parent.
///
/// Any type can sit above a [`Node`] in the tree by implementing this; the
/// child never manages the parent's lifecycle.
#[async_trait]
pub trait MessageReceiver: Send + Sync + 'static {
  fn name(&self) -> &str;

  /// Accepts a packet for the receiver's own processing. May wait for space
  /// (backpressure); failures are reported, never retried by the caller's
  /// worker.
  async fn add_packet(&self, packet: Packet) -> Result<(), NodeError>;

  /// The host this receiver resolves as its default, if any.
  fn default_host(&self) -> Option<String>;

  fn routings(&self) -> BTreeSet<String>;
}

/// The per-node-type processing hook, invoked on the worker task for every
/// LOCAL entry, one at a time and in mailbox order.
///
/// An `Err` or a panic is reported through logs and the node's
/// `process_failure` statistic; the worker then carries on with the next
/// entry.
#[async_trait]
pub trait PacketProcessor: Send + Sync + 'static {
  async fn process(&self, packet: Packet, ctx: &ProcessContext) -> Result<(), NodeError>;
}
