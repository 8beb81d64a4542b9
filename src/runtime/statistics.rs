// src/runtime/statistics.rs

//! Lock-free traffic counters for one node.
//!
//! Every counter only ever grows for the lifetime of the process. Reads are
//! independent atomic loads, so a [`StatisticsSnapshot`] is eventually
//! consistent across fields rather than a single atomic view.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between producers (enqueue outcomes) and the dispatch
/// worker (what happened to dequeued entries).
#[derive(Debug, Default)]
pub struct QueueStatistics {
  enqueue_success: AtomicU64,
  /// Enqueues that gave up: cancelled, closed, timed out or rejected.
  enqueue_failure: AtomicU64,
  processed: AtomicU64,
  forwarded: AtomicU64,
  undeliverable: AtomicU64,
  process_failures: AtomicU64,
}

impl QueueStatistics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record_enqueue_success(&self) {
    self.enqueue_success.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_enqueue_failure(&self) {
    self.enqueue_failure.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_processed(&self) {
    self.processed.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_forwarded(&self) {
    self.forwarded.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_undeliverable(&self) {
    self.undeliverable.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_process_failure(&self) {
    self.process_failures.fetch_add(1, Ordering::Relaxed);
  }

  /// Reads every counter; `queue_depth` is supplied by the caller since the
  /// mailbox owns it.
  pub fn snapshot(&self, queue_depth: usize) -> StatisticsSnapshot {
    StatisticsSnapshot {
      queue_depth,
      enqueue_success_count: self.enqueue_success.load(Ordering::Relaxed),
      enqueue_failure_count: self.enqueue_failure.load(Ordering::Relaxed),
      processed_count: self.processed.load(Ordering::Relaxed),
      forwarded_count: self.forwarded.load(Ordering::Relaxed),
      undeliverable_count: self.undeliverable.load(Ordering::Relaxed),
      process_failure_count: self.process_failures.load(Ordering::Relaxed),
    }
  }
}

/// Point-in-time copy of a node's statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
  pub queue_depth: usize,
  pub enqueue_success_count: u64,
  pub enqueue_failure_count: u64,
  pub processed_count: u64,
  pub forwarded_count: u64,
  pub undeliverable_count: u64,
  pub process_failure_count: u64,
}

impl StatisticsSnapshot {
  /// Total enqueue attempts that have completed, successful or not.
  pub fn enqueue_attempts(&self) -> u64 {
    self.enqueue_success_count + self.enqueue_failure_count
  }

  /// Flattens the snapshot into records for an external reporting sink.
  pub fn to_records(&self) -> Vec<StatRecord> {
    vec![
      StatRecord::new(StatisticType::QueueSize, self.queue_depth as u64),
      StatRecord::new(StatisticType::MsgReceivedOk, self.enqueue_success_count),
      StatRecord::new(StatisticType::EnqueueFailed, self.enqueue_failure_count),
      StatRecord::new(StatisticType::Processed, self.processed_count),
      StatRecord::new(StatisticType::Forwarded, self.forwarded_count),
      StatRecord::new(StatisticType::Undeliverable, self.undeliverable_count),
      StatRecord::new(StatisticType::ProcessFailed, self.process_failure_count),
    ]
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatisticType {
  QueueSize,
  MsgReceivedOk,
  EnqueueFailed,
  Processed,
  Forwarded,
  Undeliverable,
  ProcessFailed,
}

impl StatisticType {
  pub fn as_str(&self) -> &'static str {
    match self {
      StatisticType::QueueSize => "queue-size",
      StatisticType::MsgReceivedOk => "msg-received-ok",
      StatisticType::EnqueueFailed => "enqueue-failed",
      StatisticType::Processed => "processed",
      StatisticType::Forwarded => "forwarded",
      StatisticType::Undeliverable => "undeliverable",
      StatisticType::ProcessFailed => "process-failed",
    }
  }
}

impl fmt::Display for StatisticType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One named value handed to a statistics sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatRecord {
  pub kind: StatisticType,
  pub value: u64,
}

impl StatRecord {
  pub fn new(kind: StatisticType, value: u64) -> Self {
    Self { kind, value }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[test]
  fn snapshot_reflects_increments() {
    let stats = QueueStatistics::new();
    stats.record_enqueue_success();
    stats.record_enqueue_success();
    stats.record_enqueue_failure();
    stats.record_undeliverable();

    let snap = stats.snapshot(3);
    assert_eq!(snap.queue_depth, 3);
    assert_eq!(snap.enqueue_success_count, 2);
    assert_eq!(snap.enqueue_failure_count, 1);
    assert_eq!(snap.enqueue_attempts(), 3);
    assert_eq!(snap.undeliverable_count, 1);
    assert_eq!(snap.processed_count, 0);
  }

  #[test]
  fn records_carry_every_counter() {
    let stats = QueueStatistics::new();
    stats.record_forwarded();
    let records = stats.snapshot(0).to_records();
    assert_eq!(records.len(), 7);
    assert_eq!(records[0], StatRecord::new(StatisticType::QueueSize, 0));
    assert!(records.contains(&StatRecord::new(StatisticType::Forwarded, 1)));
    assert_eq!(StatisticType::EnqueueFailed.to_string(), "enqueue-failed");
  }

  #[test]
  fn concurrent_increments_are_counted() {
    let stats = Arc::new(QueueStatistics::new());
    let threads: Vec<_> = (0..8)
      .map(|_| {
        let stats = stats.clone();
        std::thread::spawn(move || {
          for _ in 0..1000 {
            stats.record_enqueue_success();
          }
        })
      })
      .collect();
    for t in threads {
      t.join().unwrap();
    }
    assert_eq!(stats.snapshot(0).enqueue_success_count, 8000);
  }
}
