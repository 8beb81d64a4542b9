// src/message/packet.rs

use bytes::Bytes;
use std::fmt;

/// A routed message. The payload is opaque to the mailbox core; only the
/// addressing fields are inspected, and only for logging.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Packet {
  to: Option<String>,
  from: Option<String>,
  // Use Bytes for efficient slicing and cloning (reference counted)
  data: Bytes,
}

impl Packet {
  /// Creates a packet from `bytes::Bytes`.
  pub fn new(data: Bytes) -> Self {
    Self {
      data,
      ..Default::default()
    }
  }

  /// Creates a packet from a `Vec<u8>`, taking ownership.
  pub fn from_vec(data: Vec<u8>) -> Self {
    Self::new(Bytes::from(data))
  }

  /// Creates a packet from a static byte slice (zero-copy).
  pub fn from_static(data: &'static [u8]) -> Self {
    Self::new(Bytes::from_static(data))
  }

  pub fn with_to(mut self, to: impl Into<String>) -> Self {
    self.to = Some(to.into());
    self
  }

  pub fn with_from(mut self, from: impl Into<String>) -> Self {
    self.from = Some(from.into());
    self
  }

  /// Destination address, if any.
  pub fn to(&self) -> Option<&str> {
    self.to.as_deref()
  }

  /// Source address, if any.
  pub fn from(&self) -> Option<&str> {
    self.from.as_deref()
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// Returns the underlying `Bytes` (cheap, reference counted).
  pub fn data_bytes(&self) -> Bytes {
    self.data.clone()
  }

  /// Size of the payload in bytes.
  pub fn size(&self) -> usize {
    self.data.len()
  }

  /// Lossy UTF-8 rendering of the payload, for trace logging.
  pub fn string_data(&self) -> String {
    String::from_utf8_lossy(&self.data).into_owned()
  }
}

impl fmt::Debug for Packet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Packet")
      .field("to", &self.to)
      .field("from", &self.from)
      .field("data", &format!("{} bytes", self.data.len())) // Avoid printing large data
      .finish()
  }
}
