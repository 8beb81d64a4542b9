// src/message/mod.rs

//! Message types carried through node mailboxes.

pub mod packet;

pub use packet::Packet;
