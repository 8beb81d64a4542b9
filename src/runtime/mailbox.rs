// src/runtime/mailbox.rs

//! Bounded FIFO mailbox serviced by a single consumer.
//!
//! The store is a `VecDeque` behind a `parking_lot::Mutex`, with two
//! `tokio::sync::Notify` handles standing in for the classic
//! not-empty / not-full condition variables. Producers wait (rather than
//! fail) while the mailbox is at capacity, and the consumer waits while it
//! is empty. Every wait registers interest with `Notified::enable` *before*
//! inspecting the store, so a wake-up issued between the check and the
//! `.await` is never lost.
//!
//! Both `push` and `pop` are cancel-safe: dropping either future while it is
//! suspended leaves the mailbox untouched.

use crate::error::NodeError;
use crate::message::Packet;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Default capacity, matching the `max-queue-size` property default.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1000;

/// Upper bound on slots reserved up front, so a very large configured
/// capacity does not translate into a very large allocation.
const MAX_PREALLOCATED_SLOTS: usize = 4096;

/// Where a mailbox entry is headed once the worker dequeues it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
  /// Handed to this node's own packet processor.
  Local,
  /// Handed to the parent node's mailbox.
  Forward,
}

/// A packet tagged with its [`Direction`]. The entry owns its packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxEntry {
  pub direction: Direction,
  pub packet: Packet,
}

impl MailboxEntry {
  pub fn local(packet: Packet) -> Self {
    Self {
      direction: Direction::Local,
      packet,
    }
  }

  pub fn forward(packet: Packet) -> Self {
    Self {
      direction: Direction::Forward,
      packet,
    }
  }

  pub fn into_packet(self) -> Packet {
    self.packet
  }
}

/// What [`Mailbox::set_capacity`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
  /// Requested capacity equals the current one; nothing was touched.
  Unchanged,
  Grown,
  Shrunk,
  /// The new capacity is below the current depth. Every entry was kept;
  /// producers stay blocked until the consumer drains below `capacity`.
  Overfull { depth: usize, capacity: usize },
}

#[derive(Debug)]
struct MailboxState {
  queue: VecDeque<MailboxEntry>,
  capacity: usize,
  closed: bool,
}

/// A capacity-limited, multi-producer / single-consumer FIFO of
/// [`MailboxEntry`] values.
#[derive(Debug)]
pub struct Mailbox {
  state: Mutex<MailboxState>,
  /// Mirror of `queue.len()`, written under the lock and read without it.
  depth: AtomicUsize,
  not_empty: Notify,
  not_full: Notify,
}

impl Mailbox {
  /// Creates an empty mailbox. A capacity of zero is rejected.
  pub fn new(capacity: usize) -> Result<Self, NodeError> {
    validate_capacity(capacity)?;
    Ok(Self {
      state: Mutex::new(MailboxState {
        queue: VecDeque::with_capacity(capacity.min(MAX_PREALLOCATED_SLOTS)),
        capacity,
        closed: false,
      }),
      depth: AtomicUsize::new(0),
      not_empty: Notify::new(),
      not_full: Notify::new(),
    })
  }

  /// Appends `entry` at the tail, waiting while the mailbox is full.
  ///
  /// Fails with [`NodeError::Closed`] if the mailbox is closed before or
  /// while waiting; the entry is not inserted in that case.
  pub async fn push(&self, entry: MailboxEntry) -> Result<(), NodeError> {
    loop {
      let notified = self.not_full.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      {
        let mut state = self.state.lock();
        if state.closed {
          return Err(NodeError::Closed);
        }
        if state.queue.len() < state.capacity {
          state.queue.push_back(entry);
          self.depth.store(state.queue.len(), Ordering::Release);
          drop(state);
          self.not_empty.notify_one();
          return Ok(());
        }
        tracing::trace!(
          depth = state.queue.len(),
          capacity = state.capacity,
          "Mailbox full, producer waiting"
        );
      }

      notified.await;
    }
  }

  /// Appends `entry` only if there is room right now.
  pub fn try_push(&self, entry: MailboxEntry) -> Result<(), NodeError> {
    let mut state = self.state.lock();
    if state.closed {
      return Err(NodeError::Closed);
    }
    if state.queue.len() >= state.capacity {
      return Err(NodeError::QueueFull);
    }
    state.queue.push_back(entry);
    self.depth.store(state.queue.len(), Ordering::Release);
    drop(state);
    self.not_empty.notify_one();
    Ok(())
  }

  /// Puts `entry` back at the head, ignoring capacity.
  ///
  /// Only meant for the consumer returning an entry it dequeued but could
  /// not hand off, so the head position it came from is restored.
  pub fn push_front(&self, entry: MailboxEntry) {
    let mut state = self.state.lock();
    state.queue.push_front(entry);
    self.depth.store(state.queue.len(), Ordering::Release);
    drop(state);
    self.not_empty.notify_one();
  }

  /// Removes and returns the head entry, waiting while the mailbox is empty.
  ///
  /// Returns `None` only once the mailbox is closed *and* drained.
  pub async fn pop(&self) -> Option<MailboxEntry> {
    loop {
      let notified = self.not_empty.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      {
        let mut state = self.state.lock();
        if let Some(entry) = state.queue.pop_front() {
          self.depth.store(state.queue.len(), Ordering::Release);
          drop(state);
          self.not_full.notify_one();
          return Some(entry);
        }
        if state.closed {
          return None;
        }
      }

      notified.await;
    }
  }

  /// Removes and returns the head entry if there is one.
  pub fn try_pop(&self) -> Option<MailboxEntry> {
    let mut state = self.state.lock();
    let entry = state.queue.pop_front()?;
    self.depth.store(state.queue.len(), Ordering::Release);
    drop(state);
    self.not_full.notify_one();
    Some(entry)
  }

  /// Replaces the backing store with one sized for `new_capacity`,
  /// copying every current entry in order.
  ///
  /// Runs entirely under the store lock, so concurrent producers and the
  /// consumer observe either the old store or the new one, never a mix.
  /// Shrinking below the current depth keeps all entries
  /// ([`ResizeOutcome::Overfull`]).
  pub fn set_capacity(&self, new_capacity: usize) -> Result<ResizeOutcome, NodeError> {
    validate_capacity(new_capacity)?;

    let mut state = self.state.lock();
    let old_capacity = state.capacity;
    if new_capacity == old_capacity {
      return Ok(ResizeOutcome::Unchanged);
    }

    let depth = state.queue.len();
    let mut store = VecDeque::with_capacity(new_capacity.min(MAX_PREALLOCATED_SLOTS).max(depth));
    store.extend(state.queue.drain(..));
    state.queue = store;
    state.capacity = new_capacity;
    self.depth.store(depth, Ordering::Release);
    drop(state);

    tracing::debug!(old_capacity, new_capacity, depth, "Mailbox resized");

    if new_capacity > old_capacity {
      // More than one slot may have opened up.
      self.not_full.notify_waiters();
    }

    Ok(if depth > new_capacity {
      ResizeOutcome::Overfull {
        depth,
        capacity: new_capacity,
      }
    } else if new_capacity > old_capacity {
      ResizeOutcome::Grown
    } else {
      ResizeOutcome::Shrunk
    })
  }

  /// Closes the mailbox: pending and future pushes fail with
  /// [`NodeError::Closed`], and `pop` returns `None` once drained.
  pub fn close(&self) {
    let mut state = self.state.lock();
    if state.closed {
      return;
    }
    state.closed = true;
    drop(state);
    self.not_full.notify_waiters();
    self.not_empty.notify_waiters();
  }

  pub fn is_closed(&self) -> bool {
    self.state.lock().closed
  }

  /// Removes every remaining entry, in FIFO order.
  pub fn drain(&self) -> Vec<MailboxEntry> {
    let mut state = self.state.lock();
    let entries: Vec<_> = state.queue.drain(..).collect();
    self.depth.store(0, Ordering::Release);
    drop(state);
    if !entries.is_empty() {
      self.not_full.notify_waiters();
    }
    entries
  }

  /// Current number of entries. Never takes the store lock.
  pub fn depth(&self) -> usize {
    self.depth.load(Ordering::Acquire)
  }

  pub fn is_empty(&self) -> bool {
    self.depth() == 0
  }

  pub fn capacity(&self) -> usize {
    self.state.lock().capacity
  }
}

fn validate_capacity(capacity: usize) -> Result<(), NodeError> {
  if capacity == 0 {
    return Err(NodeError::InvalidArgument(
      "mailbox capacity must be a positive integer".into(),
    ));
  }
  Ok(())
}
