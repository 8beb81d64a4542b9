// src/node/config.rs

use crate::error::NodeError;
use crate::runtime::DEFAULT_MAILBOX_CAPACITY;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Mailbox capacity, a positive integer.
pub const MAX_QUEUE_SIZE_PROP_KEY: &str = "max-queue-size";
/// Default host declared by this node (normally only the tree root sets it).
pub const DEF_HOSTNAME_PROP_KEY: &str = "def-hostname";
/// How long a producer may wait for mailbox space, in milliseconds.
/// `-1` waits indefinitely, `0` rejects immediately when full.
pub const ENQUEUE_TIMEOUT_PROP_KEY: &str = "enqueue-timeout";

pub const MAX_QUEUE_SIZE_PROP_VAL: usize = DEFAULT_MAILBOX_CAPACITY;

/// A single already-parsed configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
  Int(i64),
  Str(String),
  Bool(bool),
}

impl PropertyValue {
  fn type_name(&self) -> &'static str {
    match self {
      PropertyValue::Int(_) => "integer",
      PropertyValue::Str(_) => "string",
      PropertyValue::Bool(_) => "boolean",
    }
  }
}

impl fmt::Display for PropertyValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PropertyValue::Int(v) => write!(f, "{}", v),
      PropertyValue::Str(v) => f.write_str(v),
      PropertyValue::Bool(v) => write!(f, "{}", v),
    }
  }
}

impl From<i64> for PropertyValue {
  fn from(v: i64) -> Self {
    PropertyValue::Int(v)
  }
}

impl From<&str> for PropertyValue {
  fn from(v: &str) -> Self {
    PropertyValue::Str(v.to_string())
  }
}

impl From<String> for PropertyValue {
  fn from(v: String) -> Self {
    PropertyValue::Str(v)
  }
}

impl From<bool> for PropertyValue {
  fn from(v: bool) -> Self {
    PropertyValue::Bool(v)
  }
}

/// Key/value configuration as handed over by whatever loaded it.
pub type Properties = HashMap<String, PropertyValue>;

/// Settings for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
  pub name: String,
  pub max_queue_size: usize,
  pub default_host: Option<String>,
  // Timeouts: None = -1 (wait forever), Some(ZERO) = 0 (reject when full), Some(>0) = bounded wait
  pub enqueue_timeout: Option<Duration>,
}

impl NodeConfig {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      max_queue_size: MAX_QUEUE_SIZE_PROP_VAL,
      default_host: None,
      enqueue_timeout: None,
    }
  }

  pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
    self.max_queue_size = max_queue_size;
    self
  }

  pub fn with_default_host(mut self, host: impl Into<String>) -> Self {
    self.default_host = Some(host.into());
    self
  }

  pub fn with_enqueue_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.enqueue_timeout = timeout;
    self
  }

  /// The properties this node understands, with their default values.
  pub fn defaults() -> Properties {
    let mut defs = Properties::new();
    defs.insert(
      MAX_QUEUE_SIZE_PROP_KEY.to_string(),
      PropertyValue::Int(MAX_QUEUE_SIZE_PROP_VAL as i64),
    );
    defs.insert(ENQUEUE_TIMEOUT_PROP_KEY.to_string(), PropertyValue::Int(-1));
    defs
  }

  /// Overlays recognised keys from `properties`. Unknown keys are ignored.
  /// Validation happens before anything is assigned, so a bad value leaves
  /// the config untouched.
  pub fn apply_properties(&mut self, properties: &Properties) -> Result<(), NodeError> {
    let max_queue_size = properties
      .get(MAX_QUEUE_SIZE_PROP_KEY)
      .map(parse_queue_size_property)
      .transpose()?;
    let default_host = properties
      .get(DEF_HOSTNAME_PROP_KEY)
      .map(|v| parse_string_property(DEF_HOSTNAME_PROP_KEY, v))
      .transpose()?;
    let enqueue_timeout = properties
      .get(ENQUEUE_TIMEOUT_PROP_KEY)
      .map(parse_timeout_property)
      .transpose()?;

    if let Some(size) = max_queue_size {
      self.max_queue_size = size;
    }
    if let Some(host) = default_host {
      self.default_host = Some(host);
    }
    if let Some(timeout) = enqueue_timeout {
      self.enqueue_timeout = timeout;
    }
    Ok(())
  }
}

// --- Helper functions for parsing property values ---

fn parse_int_property(key: &str, value: &PropertyValue) -> Result<i64, NodeError> {
  match value {
    PropertyValue::Int(v) => Ok(*v),
    // Loaders that only deal in strings are common.
    PropertyValue::Str(s) => s
      .trim()
      .parse::<i64>()
      .map_err(|_| NodeError::invalid_option(key, format!("'{}' is not an integer", s))),
    other => Err(NodeError::invalid_option(
      key,
      format!("expected integer, got {}", other.type_name()),
    )),
  }
}

fn parse_string_property(key: &str, value: &PropertyValue) -> Result<String, NodeError> {
  match value {
    PropertyValue::Str(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
    PropertyValue::Str(_) => Err(NodeError::invalid_option(key, "must not be empty")),
    other => Err(NodeError::invalid_option(
      key,
      format!("expected string, got {}", other.type_name()),
    )),
  }
}

fn parse_queue_size_property(value: &PropertyValue) -> Result<usize, NodeError> {
  let val = parse_int_property(MAX_QUEUE_SIZE_PROP_KEY, value)?;
  match val {
    1.. => usize::try_from(val)
      .map_err(|_| NodeError::invalid_option(MAX_QUEUE_SIZE_PROP_KEY, "value too large")),
    _ => Err(NodeError::invalid_option(
      MAX_QUEUE_SIZE_PROP_KEY,
      format!("must be a positive integer, got {}", val),
    )),
  }
}

fn parse_timeout_property(value: &PropertyValue) -> Result<Option<Duration>, NodeError> {
  let val = parse_int_property(ENQUEUE_TIMEOUT_PROP_KEY, value)?;
  match val {
    -1 => Ok(None),                                     // Infinite wait
    0 => Ok(Some(Duration::ZERO)),                      // Reject immediately when full
    1.. => Ok(Some(Duration::from_millis(val as u64))), // Bounded wait
    _ => Err(NodeError::invalid_option(
      ENQUEUE_TIMEOUT_PROP_KEY,
      format!("must be -1, 0 or a positive number of milliseconds, got {}", val),
    )),
  }
}
