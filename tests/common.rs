// tests/common.rs
#![allow(dead_code)] // Not every test binary uses every helper

use mailnode::{Node, NodeConfig, NodeError, Packet, PacketProcessor, ProcessContext};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(50);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(2);

// Use std::sync::Once for one-time initialization
static TRACING_INIT: Once = Once::new();

// Setup function to initialize tracing
pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Can be overridden by RUST_LOG env variable
    let default_filter = "mailnode=debug,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_max_level(tracing::Level::TRACE)
      .with_env_filter(env_filter)
      .with_target(true) // Show module path
      .with_line_number(true)
      .with_test_writer() // Write to test output capture
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

/// Processor that hands every packet to a channel the test reads from.
pub struct Recorder {
  tx: async_channel::Sender<Packet>,
}

impl Recorder {
  pub fn new(tx: async_channel::Sender<Packet>) -> Self {
    Self { tx }
  }
}

#[async_trait]
impl PacketProcessor for Recorder {
  async fn process(&self, packet: Packet, _ctx: &ProcessContext) -> Result<(), NodeError> {
    self
      .tx
      .send(packet)
      .await
      .map_err(|_| NodeError::Processing("recorder channel closed".into()))
  }
}

/// Processor that forwards every packet it sees to the parent via the context.
pub struct Relay;

#[async_trait]
impl PacketProcessor for Relay {
  async fn process(&self, packet: Packet, ctx: &ProcessContext) -> Result<(), NodeError> {
    ctx.forward(packet).await
  }
}

/// Processor that parks every call until the test hands out a permit, and
/// tracks how many calls overlap.
pub struct Gate {
  permits: Semaphore,
  active: AtomicUsize,
  max_active: AtomicUsize,
  saw_stopping: AtomicBool,
}

impl Gate {
  pub fn new() -> Self {
    Self {
      permits: Semaphore::new(0),
      active: AtomicUsize::new(0),
      max_active: AtomicUsize::new(0),
      saw_stopping: AtomicBool::new(false),
    }
  }

  pub fn release(&self, calls: usize) {
    self.permits.add_permits(calls);
  }

  pub fn active(&self) -> usize {
    self.active.load(Ordering::SeqCst)
  }

  pub fn max_active(&self) -> usize {
    self.max_active.load(Ordering::SeqCst)
  }

  pub fn saw_stopping(&self) -> bool {
    self.saw_stopping.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl PacketProcessor for Gate {
  async fn process(&self, _packet: Packet, ctx: &ProcessContext) -> Result<(), NodeError> {
    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_active.fetch_max(now, Ordering::SeqCst);
    let permit = self.permits.acquire().await;
    if ctx.is_stopping() {
      self.saw_stopping.store(true, Ordering::SeqCst);
    }
    self.active.fetch_sub(1, Ordering::SeqCst);
    permit
      .map(|p| p.forget())
      .map_err(|_| NodeError::Processing("gate closed".into()))
  }
}

/// Builds a stopped node whose processed packets arrive on the returned receiver.
pub fn recording_node(config: NodeConfig) -> (Node, async_channel::Receiver<Packet>) {
  setup_tracing();
  let (tx, rx) = async_channel::unbounded();
  let node = Node::new(config, Arc::new(Recorder::new(tx))).expect("Failed to create test node");
  (node, rx)
}

pub fn packet(n: u8) -> Packet {
  Packet::from_vec(vec![n])
}

pub fn first_byte(packet: &Packet) -> u8 {
  packet.data()[0]
}

// Helper for recv with timeout assertion
pub async fn recv_timeout(rx: &async_channel::Receiver<Packet>, duration: Duration) -> Option<Packet> {
  match tokio::time::timeout(duration, rx.recv()).await {
    Ok(Ok(packet)) => Some(packet),
    _ => None,
  }
}

/// Polls `check` until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
  let start = tokio::time::Instant::now();
  while start.elapsed() < limit {
    if check() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  check()
}
