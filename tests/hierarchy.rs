// tests/hierarchy.rs

use mailnode::{MessageReceiver, Node, NodeConfig, NodeError, Packet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
mod common;

use common::{first_byte, packet, recording_node, recv_timeout, wait_until, Relay, LONG_TIMEOUT, SHORT_TIMEOUT};

#[tokio::test]
async fn test_set_parent_inherits_default_host() {
  let (root, _root_rx) = recording_node(NodeConfig::new("router").with_default_host("host.example"));
  let (child, _child_rx) = recording_node(NodeConfig::new("sm"));
  assert_eq!(child.default_host(), None);
  assert!(child.routings().is_empty());

  child.set_parent(Arc::new(root.clone()));

  assert_eq!(child.default_host().as_deref(), Some("host.example"));
  assert!(child.routings().contains("host.example"));
  // The parent's own table is untouched.
  assert!(root.routings().is_empty());
}

#[tokio::test]
async fn test_default_host_walks_up_the_chain() {
  let (root, _) = recording_node(NodeConfig::new("root").with_default_host("top.example"));
  let (middle, _) = recording_node(NodeConfig::new("middle"));
  let (leaf, _) = recording_node(NodeConfig::new("leaf"));

  middle.set_parent(Arc::new(root));
  leaf.set_parent(Arc::new(middle.clone()));

  assert_eq!(leaf.default_host().as_deref(), Some("top.example"));
  assert!(leaf.routings().contains("top.example"));
  assert!(middle.routings().contains("top.example"));

  // A node's own declaration wins over its ancestors'.
  let (own, _) = recording_node(NodeConfig::new("own").with_default_host("own.example"));
  own.set_parent(Arc::new(middle));
  assert_eq!(own.default_host().as_deref(), Some("own.example"));
}

#[tokio::test]
async fn test_parent_without_host_adds_no_routing() {
  let (root, _) = recording_node(NodeConfig::new("bare-root"));
  let (child, _) = recording_node(NodeConfig::new("child"));
  child.add_routing("child.example");

  child.set_parent(Arc::new(root));

  assert_eq!(child.routings().len(), 1);
  assert!(child.has_routing("child.example"));
  assert!(child.remove_routing("child.example"));
  assert!(!child.remove_routing("child.example"));
}

#[tokio::test]
async fn test_forward_reaches_parent_processor() -> Result<(), NodeError> {
  let (parent, parent_rx) = recording_node(NodeConfig::new("parent"));
  let (child, child_rx) = recording_node(NodeConfig::new("child"));
  child.set_parent(Arc::new(parent.clone()));
  parent.start()?;
  child.start()?;

  child.forward_packet(packet(7)).await?;
  child.add_packet(packet(8)).await?;

  let up = recv_timeout(&parent_rx, LONG_TIMEOUT).await.expect("parent never saw forwarded packet");
  assert_eq!(first_byte(&up), 7);
  let local = recv_timeout(&child_rx, LONG_TIMEOUT).await.expect("child never processed local packet");
  assert_eq!(first_byte(&local), 8);

  assert!(wait_until(LONG_TIMEOUT, || child.get_statistics().forwarded_count == 1).await);
  assert_eq!(parent.get_statistics().enqueue_success_count, 1);

  child.stop().await?;
  parent.stop().await?;
  Ok(())
}

#[tokio::test]
async fn test_forward_without_parent_is_dead_lettered() -> Result<(), NodeError> {
  let (orphan, rx) = recording_node(NodeConfig::new("orphan"));
  let dead_letters = orphan.dead_letters();
  orphan.start()?;

  orphan.forward_packet(Packet::from_static(b"lost").with_to("nobody@host")).await?;
  // The worker keeps going afterwards.
  orphan.add_packet(packet(1)).await?;

  let dead = timeout(LONG_TIMEOUT, dead_letters.recv())
    .await
    .expect("no dead letter reported")
    .unwrap();
  assert_eq!(dead.data(), b"lost");
  assert_eq!(dead.to(), Some("nobody@host"));
  assert_eq!(first_byte(&recv_timeout(&rx, LONG_TIMEOUT).await.unwrap()), 1);

  let stats = orphan.get_statistics();
  assert_eq!(stats.undeliverable_count, 1);
  assert_eq!(stats.forwarded_count, 0);

  timeout(LONG_TIMEOUT, orphan.stop()).await.expect("stop hung").unwrap();
  Ok(())
}

#[tokio::test]
async fn test_process_context_forwards_upward() -> Result<(), NodeError> {
  let (root, root_rx) = recording_node(NodeConfig::new("root"));
  common::setup_tracing();
  let relay = Node::new(NodeConfig::new("relay"), Arc::new(Relay))?;
  relay.set_parent(Arc::new(root.clone()));
  root.start()?;
  relay.start()?;

  relay.add_packet(packet(42)).await?;
  let got = recv_timeout(&root_rx, LONG_TIMEOUT).await.expect("root never received relayed packet");
  assert_eq!(first_byte(&got), 42);
  assert!(wait_until(LONG_TIMEOUT, || relay.get_statistics().processed_count == 1).await);
  let stats = relay.get_statistics();
  assert_eq!(stats.forwarded_count, 1);
  // Only the original add_packet went through the relay's own mailbox.
  assert_eq!(stats.enqueue_success_count, 1);
  assert_eq!(stats.queue_depth, 0);

  relay.stop().await?;
  root.stop().await?;
  Ok(())
}

#[tokio::test]
async fn test_relay_without_parent_reports_failure() -> Result<(), NodeError> {
  common::setup_tracing();
  let relay = Node::new(NodeConfig::new("lonely-relay"), Arc::new(Relay))?;
  let dead_letters = relay.dead_letters();
  relay.start()?;

  relay.add_packet(packet(5)).await?;
  let dead = timeout(LONG_TIMEOUT, dead_letters.recv()).await.expect("no dead letter").unwrap();
  assert_eq!(first_byte(&dead), 5);
  // The processor surfaced NoParent as its own failure.
  assert!(wait_until(LONG_TIMEOUT, || relay.get_statistics().process_failure_count == 1).await);

  relay.stop().await?;
  Ok(())
}

// --- Backpressure propagates up the tree, and stop still works while a forward waits ---
#[tokio::test]
async fn test_stop_while_parent_full_requeues_packet() -> Result<(), NodeError> {
  let (parent, parent_rx) = recording_node(NodeConfig::new("full-parent").with_max_queue_size(1));
  parent.add_packet(packet(0)).await?; // Parent is full and not running.

  let (child, _child_rx) = recording_node(NodeConfig::new("blocked-child"));
  child.set_parent(Arc::new(parent.clone()));
  child.start()?;
  child.forward_packet(packet(9)).await?;

  // The worker picks the entry up and waits on the parent.
  assert!(wait_until(LONG_TIMEOUT, || child.get_statistics().queue_depth == 0).await);
  tokio::time::sleep(Duration::from_millis(20)).await;
  assert_eq!(child.get_statistics().forwarded_count, 0);

  timeout(LONG_TIMEOUT, child.stop()).await.expect("stop hung on parent backpressure")?;
  assert_eq!(child.get_statistics().queue_depth, 1, "forward entry must be re-queued");
  // The abandoned hand-off shows up in the parent's failure count.
  assert_eq!(parent.get_statistics().enqueue_failure_count, 1);

  // Once the parent drains, restarting the child delivers the packet.
  parent.start()?;
  child.start()?;
  assert_eq!(first_byte(&recv_timeout(&parent_rx, LONG_TIMEOUT).await.unwrap()), 0);
  assert_eq!(first_byte(&recv_timeout(&parent_rx, LONG_TIMEOUT).await.unwrap()), 9);
  assert!(recv_timeout(&parent_rx, SHORT_TIMEOUT).await.is_none());

  child.stop().await?;
  parent.stop().await?;
  Ok(())
}

#[tokio::test]
async fn test_stop_while_processor_forward_waits_on_full_parent() -> Result<(), NodeError> {
  let (parent, parent_rx) = recording_node(NodeConfig::new("full-parent").with_max_queue_size(1));
  parent.add_packet(packet(0)).await?; // Parent is full and not running.

  let relay = Node::new(NodeConfig::new("stuck-relay"), Arc::new(Relay))?;
  relay.set_parent(Arc::new(parent.clone()));
  relay.start()?;
  relay.add_packet(packet(9)).await?;

  // The processor is inside ctx.forward, waiting on the parent.
  assert!(wait_until(LONG_TIMEOUT, || relay.get_statistics().queue_depth == 0).await);
  tokio::time::sleep(Duration::from_millis(20)).await;

  timeout(LONG_TIMEOUT, relay.stop())
    .await
    .expect("stop hung while the processor forward waited on the parent")?;
  let stats = relay.get_statistics();
  assert_eq!(stats.queue_depth, 1, "packet parked as a forward entry");
  assert_eq!(stats.process_failure_count, 1, "Relay surfaces Cancelled");
  assert_eq!(stats.forwarded_count, 0);
  assert_eq!(parent.get_statistics().enqueue_failure_count, 1);

  // The parked entry goes straight to the parent after a restart.
  parent.start()?;
  relay.start()?;
  assert_eq!(first_byte(&recv_timeout(&parent_rx, LONG_TIMEOUT).await.unwrap()), 0);
  assert_eq!(first_byte(&recv_timeout(&parent_rx, LONG_TIMEOUT).await.unwrap()), 9);
  assert!(wait_until(LONG_TIMEOUT, || relay.get_statistics().forwarded_count == 1).await);
  assert_eq!(relay.get_statistics().processed_count, 0);

  relay.stop().await?;
  parent.stop().await?;
  Ok(())
}

#[tokio::test]
async fn test_node_acts_as_message_receiver() -> Result<(), NodeError> {
  let (node, rx) = recording_node(NodeConfig::new("as-parent").with_default_host("p.example"));
  node.add_routing("p.example");
  let receiver: Arc<dyn MessageReceiver> = Arc::new(node.clone());

  assert_eq!(receiver.name(), "as-parent");
  assert_eq!(receiver.default_host().as_deref(), Some("p.example"));
  assert!(receiver.routings().contains("p.example"));

  receiver.add_packet(packet(3)).await?;
  node.start()?;
  assert_eq!(first_byte(&recv_timeout(&rx, LONG_TIMEOUT).await.unwrap()), 3);
  node.stop().await?;
  Ok(())
}
