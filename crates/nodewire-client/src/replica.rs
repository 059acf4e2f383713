//! Applying remote events to the local graph replica.
//!
//! The same event vocabulary the hub dispatches, applied to the local copy
//! instead of canonical state. Application is best-effort: an event whose
//! payload does not decode is skipped (the replica converges again on the
//! next snapshot), and a move for an unknown node is ignored.

use tracing::debug;

use nodewire_core::{Connection, Graph, Node};
use nodewire_protocol::{EventKind, MovePayload, RawEvent};

/// Applies one remote event to the local replica.
///
/// Returns `true` when the replica changed (the embedder should re-run
/// the evaluation engine).
pub fn apply_event(graph: &mut Graph, event: &RawEvent) -> bool {
    match &event.kind {
        EventKind::NodeCreated => match event.payload_as::<Node>() {
            Ok(node) => {
                graph.upsert_node(node);
                true
            }
            Err(err) => {
                debug!(%err, "skipping undecodable node_created");
                false
            }
        },
        EventKind::LinkCreated => match event.payload_as::<Connection>() {
            Ok(conn) => {
                graph.push_connection(conn);
                true
            }
            Err(err) => {
                debug!(%err, "skipping undecodable link_created");
                false
            }
        },
        EventKind::NodeMoved | EventKind::NodeMoveAck => match event.payload_as::<MovePayload>() {
            Ok(mv) => graph.move_node(&mv.id, mv.x, mv.y),
            Err(err) => {
                debug!(%err, "skipping undecodable node_moved");
                false
            }
        },
        EventKind::GraphSnapshot => match event.payload_as::<Graph>() {
            Ok(snapshot) => {
                *graph = snapshot;
                true
            }
            Err(err) => {
                debug!(%err, "skipping undecodable graph_snapshot");
                false
            }
        },
        // Value updates, acks, and info frames carry no replica state.
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodewire_core::NodeKind;
    use serde_json::json;

    #[test]
    fn node_created_upserts() {
        let mut graph = Graph::new();
        let node = Node::new("n1", NodeKind::Variable).with_title("V");
        assert!(apply_event(&mut graph, &RawEvent::node_created(&node)));
        assert_eq!(graph.get_node("n1").unwrap().title, "V");
    }

    #[test]
    fn snapshot_replaces_wholesale() {
        let mut graph = Graph::new();
        graph.insert_node(Node::new("old", NodeKind::Generic)).unwrap();

        let mut incoming = Graph::new();
        incoming.insert_node(Node::new("new", NodeKind::Generic)).unwrap();
        assert!(apply_event(&mut graph, &RawEvent::graph_snapshot(&incoming)));

        assert!(graph.get_node("old").is_none());
        assert!(graph.get_node("new").is_some());
    }

    #[test]
    fn move_for_unknown_node_is_ignored() {
        let mut graph = Graph::new();
        assert!(!apply_event(&mut graph, &RawEvent::node_moved("ghost", 1.0, 2.0)));
    }

    #[test]
    fn undecodable_payload_is_skipped() {
        let mut graph = Graph::new();
        let bad = RawEvent {
            kind: EventKind::NodeCreated,
            payload: json!("not-a-node"),
        };
        assert!(!apply_event(&mut graph, &bad));
        assert!(graph.nodes.is_empty());
    }

    #[test]
    fn info_and_acks_do_not_touch_the_replica() {
        let mut graph = Graph::new();
        assert!(!apply_event(&mut graph, &RawEvent::snapshot_ack()));
        assert!(!apply_event(&mut graph, &RawEvent::info(json!({}))));
        assert!(!apply_event(
            &mut graph,
            &RawEvent::node_update("n", json!(42))
        ));
    }
}
