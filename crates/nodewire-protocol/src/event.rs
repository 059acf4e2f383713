//! Fire-and-forget graph events: the `{type, payload}` wire form.
//!
//! Parsing is two-stage on purpose. [`RawEvent::parse`] keeps the payload
//! as a raw [`Value`] so the hub can rebroadcast a message verbatim -- byte
//! content preserved, unknown fields included -- while the typed payload
//! structs below are only materialized where state application needs them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use nodewire_core::{Connection, Graph, Node};

use crate::error::ProtocolError;

/// The fixed event vocabulary, plus a default route for everything else.
///
/// Dispatch is a closed set: unrecognized tags are routed through
/// `Unknown` (the hub wraps them in an `info` reply), never rejected with
/// a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NodeCreated,
    LinkCreated,
    NodeMoved,
    GraphSnapshot,
    NodeUpdate,
    NodeMoveAck,
    SnapshotAck,
    Info,
    /// Any tag this build does not recognize.
    #[serde(untagged)]
    Unknown(String),
}

/// A parsed event with its payload left raw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event tag.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Raw payload; typed interpretation happens per kind.
    #[serde(default)]
    pub payload: Value,
}

impl RawEvent {
    /// Parses a text frame as an event.
    ///
    /// Distinguishes the failure modes the dispatch cares about: not JSON
    /// at all (plain-text echo fallback) versus JSON that is not an event
    /// object (envelope or info-wrap path).
    pub fn parse(text: &str) -> Result<RawEvent, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::NotJson)?;
        let is_event = value
            .as_object()
            .is_some_and(|obj| obj.get("type").is_some_and(Value::is_string));
        if !is_event {
            return Err(ProtocolError::NotAnEvent);
        }
        serde_json::from_value(value).map_err(|_| ProtocolError::NotAnEvent)
    }

    /// Serializes to the wire text frame.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decodes the payload into a typed shape, tolerating extra fields.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.payload.clone()).map_err(|source| ProtocolError::BadPayload {
            kind: format!("{:?}", self.kind),
            source,
        })
    }

    // -----------------------------------------------------------------------
    // Event builders
    // -----------------------------------------------------------------------

    /// `node_created` carrying a full node.
    pub fn node_created(node: &Node) -> Self {
        RawEvent {
            kind: EventKind::NodeCreated,
            payload: serde_json::to_value(node).unwrap_or(Value::Null),
        }
    }

    /// `link_created` carrying a connection.
    pub fn link_created(conn: &Connection) -> Self {
        RawEvent {
            kind: EventKind::LinkCreated,
            payload: serde_json::to_value(conn).unwrap_or(Value::Null),
        }
    }

    /// `node_moved` carrying an id and the new position.
    pub fn node_moved(id: &str, x: f64, y: f64) -> Self {
        RawEvent {
            kind: EventKind::NodeMoved,
            payload: json!({ "id": id, "x": x, "y": y }),
        }
    }

    /// `graph_snapshot` carrying a full graph document.
    pub fn graph_snapshot(graph: &Graph) -> Self {
        RawEvent {
            kind: EventKind::GraphSnapshot,
            payload: serde_json::to_value(graph).unwrap_or(Value::Null),
        }
    }

    /// `node_update`: hub-computed value for a node, sent to the creator.
    pub fn node_update(id: &str, value: Value) -> Self {
        RawEvent {
            kind: EventKind::NodeUpdate,
            payload: json!({ "id": id, "value": value }),
        }
    }

    /// `node_move_ack` echoing the applied id/position.
    pub fn node_move_ack(id: &str, x: f64, y: f64) -> Self {
        RawEvent {
            kind: EventKind::NodeMoveAck,
            payload: json!({ "id": id, "x": x, "y": y }),
        }
    }

    /// `snapshot_ack` confirming a wholesale replace.
    pub fn snapshot_ack() -> Self {
        RawEvent {
            kind: EventKind::SnapshotAck,
            payload: json!({ "status": "ok" }),
        }
    }

    /// `info` wrapping a message the receiver did not understand.
    ///
    /// Unknown input is never silently dropped; the original message rides
    /// along so the sender can see what arrived.
    pub fn info(original: Value) -> Self {
        RawEvent {
            kind: EventKind::Info,
            payload: json!({ "received": original }),
        }
    }
}

/// Typed `node_moved` / `node_move_ack` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovePayload {
    pub id: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// Typed `node_update` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdatePayload {
    pub id: String,
    pub value: Value,
}
