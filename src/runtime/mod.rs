// src/runtime/mod.rs

//! Core primitives: the bounded mailbox, its traffic counters and the
//! guard that accounts for abandoned enqueues.

pub mod enqueue_guard;
pub mod mailbox;
pub mod statistics;

pub use mailbox::{Direction, Mailbox, MailboxEntry, ResizeOutcome, DEFAULT_MAILBOX_CAPACITY};
pub use statistics::{QueueStatistics, StatRecord, StatisticType, StatisticsSnapshot};

pub(crate) use enqueue_guard::EnqueueGuard;
