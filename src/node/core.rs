// src/node/core.rs

use crate::error::NodeError;
use crate::message::Packet;
use crate::node::config::{NodeConfig, Properties};
use crate::node::worker;
use crate::node::{MessageReceiver, PacketProcessor};
use crate::routing::RoutingTable;
use crate::runtime::{
  EnqueueGuard, Mailbox, MailboxEntry, QueueStatistics, ResizeOutcome, StatRecord, StatisticsSnapshot,
};

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::future::{self, Future};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of each node's dead-letter channel.
pub const DEAD_LETTER_CAPACITY: usize = 1024;

/// Resolves once the worker task has exited; any number of `stop` callers
/// can await it.
type WorkerExit = Shared<BoxFuture<'static, Result<(), String>>>;

/// The dispatch worker. Stays registered until its task has exited, so a
/// stopping worker still counts as running.
struct WorkerHandle {
  stop: CancellationToken,
  abort: AbortHandle,
  exit: WorkerExit,
}

impl WorkerHandle {
  fn is_finished(&self) -> bool {
    self.abort.is_finished()
  }
}

/// State shared between [`Node`] handles and the node's worker task.
pub(crate) struct NodeInner {
  pub(crate) name: String,
  pub(crate) mailbox: Mailbox,
  pub(crate) routings: RoutingTable,
  pub(crate) parent: RwLock<Option<Arc<dyn MessageReceiver>>>,
  pub(crate) config: Mutex<NodeConfig>,
  pub(crate) stats: QueueStatistics,
  pub(crate) processor: Arc<dyn PacketProcessor>,
  pub(crate) dead_letter_tx: async_channel::Sender<Packet>,
  dead_letter_rx: async_channel::Receiver<Packet>,
  worker: Mutex<Option<WorkerHandle>>,
}

/// A participant in the routing tree: one bounded mailbox, one dispatch
/// worker, one routing table and an optional parent.
///
/// `Node` is a cheap, cloneable handle; clones share the same node.
///
/// A started node keeps its worker alive until [`stop`](Node::stop) or
/// [`release`](Node::release) is called, even if every handle is dropped.
#[derive(Clone)]
pub struct Node {
  inner: Arc<NodeInner>,
}

impl Node {
  /// Builds a stopped node. Fails if `config.max_queue_size` is zero.
  pub fn new(config: NodeConfig, processor: Arc<dyn PacketProcessor>) -> Result<Self, NodeError> {
    let mailbox = Mailbox::new(config.max_queue_size)?;
    let (dead_letter_tx, dead_letter_rx) = async_channel::bounded(DEAD_LETTER_CAPACITY);
    tracing::debug!(
      node = %config.name,
      capacity = config.max_queue_size,
      default_host = ?config.default_host,
      "Node created"
    );
    Ok(Self {
      inner: Arc::new(NodeInner {
        name: config.name.clone(),
        mailbox,
        routings: RoutingTable::new(),
        parent: RwLock::new(None),
        config: Mutex::new(config),
        stats: QueueStatistics::new(),
        processor,
        dead_letter_tx,
        dead_letter_rx,
        worker: Mutex::new(None),
      }),
    })
  }

  pub(crate) fn from_inner(inner: Arc<NodeInner>) -> Self {
    Self { inner }
  }

  pub fn name(&self) -> &str {
    &self.inner.name
  }

  // --- Producer API ---

  /// Submits one packet for this node's own processing, waiting while the
  /// mailbox is full.
  pub async fn add_packet(&self, packet: Packet) -> Result<(), NodeError> {
    self.enqueue(MailboxEntry::local(packet)).await
  }

  /// Submits packets in order, stopping at the first failure.
  ///
  /// Each packet is removed from `packets` only once it is in the mailbox,
  /// so on failure (or if this future is dropped) `packets` holds exactly
  /// the ones not yet accepted, in their original order. On success it is
  /// left empty.
  pub async fn add_packets(&self, packets: &mut VecDeque<Packet>) -> Result<(), NodeError> {
    self.add_packets_or_cancel(packets, future::pending()).await
  }

  /// Like [`add_packet`](Node::add_packet), but gives up with
  /// [`NodeError::Cancelled`] once `cancel` completes. The packet is not
  /// inserted in that case and the attempt counts as a failed enqueue.
  pub async fn add_packet_or_cancel<F>(&self, packet: Packet, cancel: F) -> Result<(), NodeError>
  where
    F: Future<Output = ()>,
  {
    tokio::select! {
      biased;
      result = self.enqueue(MailboxEntry::local(packet)) => result,
      _ = cancel => Err(NodeError::Cancelled),
    }
  }

  /// Batch form of [`add_packet_or_cancel`](Node::add_packet_or_cancel), with
  /// the same remainder contract as [`add_packets`](Node::add_packets).
  pub async fn add_packets_or_cancel<F>(&self, packets: &mut VecDeque<Packet>, cancel: F) -> Result<(), NodeError>
  where
    F: Future<Output = ()>,
  {
    tokio::pin!(cancel);
    while let Some(head) = packets.front() {
      let entry = MailboxEntry::local(head.clone());
      tokio::select! {
        biased;
        result = self.enqueue(entry) => result?,
        _ = &mut cancel => {
          tracing::debug!(node = %self.inner.name, remaining = packets.len(), "Batch enqueue cancelled");
          return Err(NodeError::Cancelled);
        }
      }
      packets.pop_front();
    }
    Ok(())
  }

  /// Queues a packet for delivery to the parent node. The worker hands it
  /// over in mailbox order, and the enqueue counts in this node's
  /// statistics like any other. Processors running on the worker should use
  /// [`ProcessContext::forward`] instead.
  pub async fn forward_packet(&self, packet: Packet) -> Result<(), NodeError> {
    self.enqueue(MailboxEntry::forward(packet)).await
  }

  async fn enqueue(&self, entry: MailboxEntry) -> Result<(), NodeError> {
    let inner = &*self.inner;
    tracing::trace!(
      node = %inner.name,
      direction = ?entry.direction,
      to = ?entry.packet.to(),
      data = %entry.packet.string_data(),
      "Adding packet to mailbox"
    );

    let guard = EnqueueGuard::new(&inner.stats, &inner.name);
    let timeout_opt = inner.config.lock().enqueue_timeout;
    let result = match timeout_opt {
      None => inner.mailbox.push(entry).await,
      Some(d) if d.is_zero() => inner.mailbox.try_push(entry),
      Some(d) => match tokio::time::timeout(d, inner.mailbox.push(entry)).await {
        Ok(result) => result,
        Err(_elapsed) => Err(NodeError::Timeout),
      },
    };

    match &result {
      Ok(()) => guard.succeeded(),
      Err(e) => {
        tracing::debug!(node = %inner.name, error = %e, "Failed to add packet to mailbox");
        guard.failed();
      }
    }
    result
  }

  // --- Hierarchy ---

  /// Links this node under `parent` and registers the resolved default host
  /// as one of this node's routings.
  ///
  /// Cycles are not detected; wiring an acyclic tree is the caller's job.
  pub fn set_parent(&self, parent: Arc<dyn MessageReceiver>) {
    tracing::debug!(node = %self.inner.name, parent = %parent.name(), "Parent set");
    *self.inner.parent.write() = Some(parent);
    if let Some(host) = self.default_host() {
      self.inner.routings.add(host);
    }
  }

  pub fn parent(&self) -> Option<Arc<dyn MessageReceiver>> {
    self.inner.parent.read().clone()
  }

  /// This node's declared default host, otherwise the parent's resolved
  /// one, otherwise `None`.
  pub fn default_host(&self) -> Option<String> {
    if let Some(host) = self.inner.config.lock().default_host.clone() {
      return Some(host);
    }
    // Clone the parent out so the lock is not held while walking up.
    let parent = self.parent()?;
    parent.default_host()
  }

  // --- Routing ---

  pub fn routings(&self) -> BTreeSet<String> {
    self.inner.routings.all()
  }

  /// Returns `true` if the address was not already registered.
  pub fn add_routing(&self, address: impl Into<String>) -> bool {
    self.inner.routings.add(address)
  }

  /// Returns `true` if the address was registered.
  pub fn remove_routing(&self, address: &str) -> bool {
    self.inner.routings.remove(address)
  }

  pub fn has_routing(&self, address: &str) -> bool {
    self.inner.routings.contains(address)
  }

  // --- Lifecycle ---

  /// Spawns the dispatch worker on the current tokio runtime.
  ///
  /// Does nothing if the worker is already running; a worker that has
  /// finished is replaced. Fails with [`NodeError::Stopping`] while a
  /// previous worker is still winding down.
  pub fn start(&self) -> Result<(), NodeError> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| NodeError::NoRuntime)?;
    if self.inner.mailbox.is_closed() {
      return Err(NodeError::Closed);
    }

    let mut worker_guard = self.inner.worker.lock();
    if let Some(worker) = worker_guard.as_ref() {
      if !worker.is_finished() {
        if worker.stop.is_cancelled() {
          return Err(NodeError::Stopping);
        }
        tracing::debug!(node = %self.inner.name, "Dispatch worker already running");
        return Ok(());
      }
    }

    let stop = CancellationToken::new();
    let task = runtime.spawn(worker::run_dispatch_loop(self.inner.clone(), stop.clone()));
    let abort = task.abort_handle();
    let exit = task.map(|joined| joined.map_err(|e| e.to_string())).boxed().shared();
    *worker_guard = Some(WorkerHandle { stop, abort, exit });
    Ok(())
  }

  /// Stops the dispatch worker and waits for it to exit.
  ///
  /// A worker waiting on an empty mailbox wakes immediately. A packet being
  /// processed is finished first. Entries still queued stay in the mailbox
  /// and are picked up by the next [`start`](Node::start).
  ///
  /// Dropping the returned future does not cancel the stop; the worker
  /// still exits and the node reports running until it has.
  pub async fn stop(&self) -> Result<(), NodeError> {
    let exit = {
      let worker_guard = self.inner.worker.lock();
      let Some(worker) = worker_guard.as_ref() else {
        return Ok(());
      };
      worker.stop.cancel();
      worker.exit.clone()
    };

    let joined = exit.await;

    {
      let mut worker_guard = self.inner.worker.lock();
      if worker_guard.as_ref().map_or(false, WorkerHandle::is_finished) {
        *worker_guard = None;
      }
    }
    joined.map_err(|e| NodeError::Internal(format!("dispatch worker for '{}' failed: {}", self.inner.name, e)))
  }

  /// `true` from [`start`](Node::start) until the worker task has exited,
  /// including while a stop is in progress.
  pub fn is_running(&self) -> bool {
    self
      .inner
      .worker
      .lock()
      .as_ref()
      .map_or(false, |worker| !worker.is_finished())
  }

  /// Stops the worker, closes the mailbox and hands back every entry that
  /// was never dispatched. Producers still waiting for space fail with
  /// [`NodeError::Closed`]. The node cannot be started again.
  pub async fn release(&self) -> Result<Vec<MailboxEntry>, NodeError> {
    self.stop().await?;
    self.inner.mailbox.close();
    let remaining = self.inner.mailbox.drain();
    tracing::info!(node = %self.inner.name, undispatched = remaining.len(), "Node released");
    Ok(remaining)
  }

  // --- Configuration ---

  /// Resizes the mailbox, keeping every queued entry in order.
  pub fn set_max_queue_size(&self, max_queue_size: usize) -> Result<ResizeOutcome, NodeError> {
    let mut config = self.inner.config.lock();
    let outcome = self.inner.mailbox.set_capacity(max_queue_size)?;
    config.max_queue_size = max_queue_size;
    if let ResizeOutcome::Overfull { depth, capacity } = outcome {
      tracing::warn!(
        node = %self.inner.name,
        depth,
        capacity,
        "Mailbox shrunk below its current depth; producers wait until it drains"
      );
    }
    Ok(outcome)
  }

  pub fn max_queue_size(&self) -> usize {
    self.inner.config.lock().max_queue_size
  }

  /// Applies recognised properties (`max-queue-size`, `def-hostname`,
  /// `enqueue-timeout`). Nothing changes if any value is invalid.
  pub fn set_properties(&self, properties: &Properties) -> Result<(), NodeError> {
    let mut config = self.inner.config.lock();
    let mut updated = config.clone();
    updated.apply_properties(properties)?;
    if updated.max_queue_size != config.max_queue_size {
      self.inner.mailbox.set_capacity(updated.max_queue_size)?;
    }
    *config = updated;
    Ok(())
  }

  pub fn config(&self) -> NodeConfig {
    self.inner.config.lock().clone()
  }

  // --- Observability ---

  pub fn get_statistics(&self) -> StatisticsSnapshot {
    self.inner.stats.snapshot(self.inner.mailbox.depth())
  }

  pub fn statistics_records(&self) -> Vec<StatRecord> {
    self.get_statistics().to_records()
  }

  /// Receives FORWARD packets that could not be delivered because this node
  /// has no parent.
  pub fn dead_letters(&self) -> async_channel::Receiver<Packet> {
    self.inner.dead_letter_rx.clone()
  }
}

impl fmt::Debug for Node {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Node")
      .field("name", &self.inner.name)
      .field("depth", &self.inner.mailbox.depth())
      .field("running", &self.is_running())
      .finish()
  }
}

#[async_trait]
impl MessageReceiver for Node {
  fn name(&self) -> &str {
    Node::name(self)
  }

  async fn add_packet(&self, packet: Packet) -> Result<(), NodeError> {
    Node::add_packet(self, packet).await
  }

  fn default_host(&self) -> Option<String> {
    Node::default_host(self)
  }

  fn routings(&self) -> BTreeSet<String> {
    Node::routings(self)
  }
}

/// Handed to [`PacketProcessor::process`] for each packet.
pub struct ProcessContext {
  node: Node,
  stop: CancellationToken,
}

impl ProcessContext {
  pub(crate) fn new(node: Node, stop: CancellationToken) -> Self {
    Self { node, stop }
  }

  pub fn node_name(&self) -> &str {
    self.node.name()
  }

  pub fn node(&self) -> &Node {
    &self.node
  }

  /// `true` once [`Node::stop`] has been requested for this worker.
  pub fn is_stopping(&self) -> bool {
    self.stop.is_cancelled()
  }

  /// Sends `packet` up to the parent right away, bypassing this node's
  /// mailbox and its enqueue counters.
  ///
  /// Runs on the worker, so it must not wait on this node's own mailbox.
  /// With no parent the packet goes to the dead-letter channel and
  /// [`NodeError::NoParent`] is returned. If the node is stopped while the
  /// parent is full, the packet is queued at the head of this node's
  /// mailbox as a FORWARD entry and [`NodeError::Cancelled`] is returned.
  pub async fn forward(&self, packet: Packet) -> Result<(), NodeError> {
    worker::deliver_to_parent(&self.node.inner, packet, &self.stop).await
  }
}

impl fmt::Debug for ProcessContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ProcessContext").field("node", &self.node.name()).finish()
  }
}
