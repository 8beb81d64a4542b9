// src/node/worker.rs

use crate::error::NodeError;
use crate::message::Packet;
use crate::node::core::{Node, NodeInner, ProcessContext};
use crate::runtime::{Direction, MailboxEntry};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_channel::TrySendError;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

/// Whether the worker may keep going after handling one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
  Continue,
  Stop,
}

/// Task body of a node's dispatch worker: the sole consumer of its mailbox.
///
/// Exits when `stop` is cancelled, or when the mailbox is closed and
/// drained.
pub(crate) async fn run_dispatch_loop(inner: Arc<NodeInner>, stop: CancellationToken) {
  let name = inner.name.clone();
  tracing::info!(node = %name, "Dispatch worker started");
  let ctx = ProcessContext::new(Node::from_inner(inner.clone()), stop.clone());

  loop {
    let entry = tokio::select! {
      biased;
      _ = stop.cancelled() => {
        tracing::debug!(node = %name, "Stop signal received");
        break;
      }
      entry = inner.mailbox.pop() => match entry {
        Some(entry) => entry,
        None => {
          tracing::debug!(node = %name, "Mailbox closed and drained");
          break;
        }
      },
    };

    let flow = match entry.direction {
      Direction::Local => {
        process_local(&inner, &ctx, entry.packet).await;
        Flow::Continue
      }
      Direction::Forward => forward_until_stopped(&inner, entry.packet, &stop).await,
    };
    if flow == Flow::Stop {
      break;
    }
  }

  tracing::info!(
    node = %name,
    remaining = inner.mailbox.depth(),
    "Dispatch worker stopped"
  );
}

async fn process_local(inner: &NodeInner, ctx: &ProcessContext, packet: Packet) {
  tracing::trace!(node = %inner.name, from = ?packet.from(), "Processing packet");
  let outcome = AssertUnwindSafe(inner.processor.process(packet, ctx))
    .catch_unwind()
    .await;

  match outcome {
    Ok(Ok(())) => inner.stats.record_processed(),
    Ok(Err(e)) => {
      inner.stats.record_process_failure();
      tracing::error!(node = %inner.name, error = %e, "Packet processor failed");
    }
    Err(panic) => {
      inner.stats.record_process_failure();
      tracing::error!(
        node = %inner.name,
        panic = %panic_message(&*panic),
        "Packet processor panicked"
      );
    }
  }
}

/// Hands a FORWARD entry to the parent, giving up if a stop arrives while
/// the parent's mailbox is full. The entry then goes back to the head of
/// this node's mailbox.
async fn forward_until_stopped(
  inner: &NodeInner,
  packet: Packet,
  stop: &CancellationToken,
) -> Flow {
  let parent = inner.parent.read().clone();
  let Some(parent) = parent else {
    report_undeliverable(inner, packet);
    return Flow::Continue;
  };

  tracing::trace!(node = %inner.name, parent = %parent.name(), "Sending packet to parent");
  tokio::select! {
    biased;
    _ = stop.cancelled() => {
      tracing::debug!(node = %inner.name, "Stop signal received while forwarding; re-queueing packet");
      inner.mailbox.push_front(MailboxEntry::forward(packet));
      Flow::Stop
    }
    result = parent.add_packet(packet.clone()) => {
      record_forward_result(inner, parent.name(), result);
      Flow::Continue
    }
  }
}

/// Delivers `packet` to the parent without going through this node's
/// mailbox. A stop while the parent is full parks the packet at the head of
/// this node's mailbox instead.
pub(crate) async fn deliver_to_parent(
  inner: &NodeInner,
  packet: Packet,
  stop: &CancellationToken,
) -> Result<(), NodeError> {
  let parent = inner.parent.read().clone();
  let Some(parent) = parent else {
    report_undeliverable(inner, packet);
    return Err(NodeError::NoParent(inner.name.clone()));
  };

  tokio::select! {
    biased;
    _ = stop.cancelled() => {
      tracing::debug!(node = %inner.name, "Stop requested during processor forward; re-queueing packet");
      inner.mailbox.push_front(MailboxEntry::forward(packet));
      Err(NodeError::Cancelled)
    }
    result = parent.add_packet(packet.clone()) => {
      record_forward_result(inner, parent.name(), result.clone());
      result
    }
  }
}

fn record_forward_result(inner: &NodeInner, parent: &str, result: Result<(), NodeError>) {
  match result {
    Ok(()) => inner.stats.record_forwarded(),
    // Already counted by the parent; not retried here.
    Err(e) => tracing::warn!(
      node = %inner.name,
      parent = %parent,
      error = %e,
      "Parent did not accept forwarded packet"
    ),
  }
}

fn report_undeliverable(inner: &NodeInner, packet: Packet) {
  inner.stats.record_undeliverable();
  tracing::warn!(node = %inner.name, to = ?packet.to(), "No parent, forwarded packet is undeliverable");

  match inner.dead_letter_tx.try_send(packet) {
    Ok(()) => {}
    Err(TrySendError::Full(packet)) => tracing::error!(
      node = %inner.name,
      to = ?packet.to(),
      "Dead-letter channel full, dropping undeliverable packet"
    ),
    Err(TrySendError::Closed(_)) => {
      tracing::error!(node = %inner.name, "Dead-letter channel closed, dropping undeliverable packet")
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
