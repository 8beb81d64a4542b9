// src/routing.rs

use std::collections::BTreeSet;

use parking_lot::RwLock;

/// The set of addresses a node claims ownership of.
///
/// Kept sorted so snapshots and logs are stable. Mostly touched on the
/// control path, hence a plain read/write lock.
#[derive(Debug, Default)]
pub struct RoutingTable {
  addresses: RwLock<BTreeSet<String>>,
}

impl RoutingTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds `address`. Returns `true` if it was not already present.
  pub fn add(&self, address: impl Into<String>) -> bool {
    let address = address.into();
    let added = self.addresses.write().insert(address.clone());
    if added {
      tracing::trace!(%address, "Routing added");
    }
    added
  }

  /// Removes `address`. Returns `true` if it was present.
  pub fn remove(&self, address: &str) -> bool {
    let removed = self.addresses.write().remove(address);
    if removed {
      tracing::trace!(%address, "Routing removed");
    }
    removed
  }

  pub fn contains(&self, address: &str) -> bool {
    self.addresses.read().contains(address)
  }

  /// Snapshot of every address currently registered.
  pub fn all(&self) -> BTreeSet<String> {
    self.addresses.read().clone()
  }

  pub fn len(&self) -> usize {
    self.addresses.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.addresses.read().is_empty()
  }
}
