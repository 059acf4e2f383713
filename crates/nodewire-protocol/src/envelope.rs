//! The request/response transport envelope.
//!
//! `{action, data, request_id, timestamp, version}` -- every envelope
//! carries enough to be processed without side-channel state. `request_id`
//! is a client-chosen correlation token; the hub copies it into the reply
//! and never looks inside it.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use nodewire_core::Graph;

/// Protocol version stamped on every envelope.
pub const PROTOCOL_VERSION: &str = "1.5.0-alpha";

/// The fixed envelope action vocabulary.
///
/// Process and terminal actions are carried for external collaborators;
/// the hub itself only executes the `graph.*` and `node.*` actions.
/// Anything else round-trips through [`Action::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "process.start")]
    ProcessStart,
    #[serde(rename = "process.stop")]
    ProcessStop,
    #[serde(rename = "process.status")]
    ProcessStatus,
    #[serde(rename = "process.result")]
    ProcessResult,
    #[serde(rename = "terminal.run_command")]
    TerminalRunCommand,
    #[serde(rename = "terminal.change_profile")]
    TerminalChangeProfile,
    #[serde(rename = "terminal.close")]
    TerminalClose,
    #[serde(rename = "graph.snapshot")]
    GraphSnapshot,
    #[serde(rename = "graph.update")]
    GraphUpdate,
    #[serde(rename = "node.save_content")]
    NodeSaveContent,
    /// Any action string this build does not recognize.
    #[serde(untagged)]
    Other(String),
}

impl Action {
    /// The dotted wire string for this action.
    pub fn as_str(&self) -> &str {
        match self {
            Action::ProcessStart => "process.start",
            Action::ProcessStop => "process.stop",
            Action::ProcessStatus => "process.status",
            Action::ProcessResult => "process.result",
            Action::TerminalRunCommand => "terminal.run_command",
            Action::TerminalChangeProfile => "terminal.change_profile",
            Action::TerminalClose => "terminal.close",
            Action::GraphSnapshot => "graph.snapshot",
            Action::GraphUpdate => "graph.update",
            Action::NodeSaveContent => "node.save_content",
            Action::Other(s) => s,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Standard transport envelope for request/response exchanges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The action type.
    pub action: Action,
    /// Payload-specific content.
    #[serde(default)]
    pub data: Value,
    /// Optional client-provided id to correlate responses. Opaque.
    #[serde(default)]
    pub request_id: Option<String>,
    /// UNIX timestamp in milliseconds.
    pub timestamp: u64,
    /// Protocol version of the sender.
    pub version: String,
}

impl Envelope {
    /// Creates an envelope stamped with the current time and protocol
    /// version.
    pub fn new(action: Action, data: Value) -> Self {
        Envelope {
            action,
            data,
            request_id: None,
            timestamp: now_ms(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    /// Builder: attaches a correlation id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Builds a reply to this envelope, echoing its correlation id.
    pub fn reply(&self, action: Action, data: Value) -> Envelope {
        let mut reply = Envelope::new(action, data);
        reply.request_id = self.request_id.clone();
        reply
    }

    /// Serializes to the wire text frame.
    pub fn to_text(&self) -> String {
        // Envelope serialization cannot fail: all fields are plain data.
        serde_json::to_string(self).unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Request builders (graph transport)
    // -----------------------------------------------------------------------

    /// `graph.snapshot` carrying a full graph document.
    pub fn graph_snapshot(graph: &Graph) -> Self {
        Envelope::new(
            Action::GraphSnapshot,
            json!({ "graph": serde_json::to_value(graph).unwrap_or(Value::Null) }),
        )
    }

    /// `graph.snapshot` with empty data: a request for the canonical state.
    pub fn graph_snapshot_request() -> Self {
        Envelope::new(Action::GraphSnapshot, json!({}))
    }

    /// `graph.update` carrying incremental node/connection lists.
    pub fn graph_update(graph_id: &str, nodes: Value, connections: Value) -> Self {
        Envelope::new(
            Action::GraphUpdate,
            json!({
                "graph_id": graph_id,
                "nodes": nodes,
                "connections": connections,
                "meta": {}
            }),
        )
    }

    /// `node.save_content` storing a node's text payload.
    pub fn node_save_content(node_id: &str, content: &str) -> Self {
        Envelope::new(
            Action::NodeSaveContent,
            json!({ "node_id": node_id, "content": content, "content_type": null }),
        )
    }

    // -----------------------------------------------------------------------
    // Request builders (external collaborator vocabulary)
    // -----------------------------------------------------------------------

    /// `process.start` for a graph execution backend.
    pub fn process_start(graph_id: &str, entry_node_id: Option<&str>) -> Self {
        Envelope::new(
            Action::ProcessStart,
            json!({
                "graph_id": graph_id,
                "entry_node_id": entry_node_id,
                "params": {},
                "env": {},
                "cwd": null
            }),
        )
    }

    /// `process.stop` for a running process.
    pub fn process_stop(process_id: &str, reason: Option<&str>) -> Self {
        Envelope::new(
            Action::ProcessStop,
            json!({ "process_id": process_id, "reason": reason }),
        )
    }

    /// `process.status` query.
    pub fn process_status(process_id: &str) -> Self {
        Envelope::new(Action::ProcessStatus, json!({ "process_id": process_id }))
    }

    /// `terminal.run_command` on a terminal-backed node.
    pub fn terminal_run_command(node_id: &str, command: &str, profile: Option<&str>) -> Self {
        Envelope::new(
            Action::TerminalRunCommand,
            json!({ "node_id": node_id, "command": command, "profile": profile, "cwd": null }),
        )
    }

    /// `terminal.change_profile` on a terminal-backed node.
    pub fn terminal_change_profile(node_id: &str, profile: &str) -> Self {
        Envelope::new(
            Action::TerminalChangeProfile,
            json!({ "node_id": node_id, "profile": profile }),
        )
    }

    /// `terminal.close` on a terminal-backed node.
    pub fn terminal_close(node_id: &str, reason: Option<&str>) -> Self {
        Envelope::new(
            Action::TerminalClose,
            json!({ "node_id": node_id, "reason": reason }),
        )
    }
}

/// Lightweight shape check: is this value a plausible envelope?
///
/// Checks only the presence and type of mandatory fields; unknown extra
/// fields never fail validation (forward compatibility).
pub fn validate_envelope(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    obj.get("action").is_some_and(Value::is_string)
        && obj.contains_key("data")
        && obj.get("timestamp").is_some_and(Value::is_number)
        && obj.get("version").is_some_and(Value::is_string)
}

/// UNIX timestamp in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_dotted_strings() {
        let action: Action = serde_json::from_str("\"graph.snapshot\"").unwrap();
        assert_eq!(action, Action::GraphSnapshot);
        assert_eq!(serde_json::to_string(&action).unwrap(), "\"graph.snapshot\"");
    }

    #[test]
    fn unknown_action_round_trips_as_other() {
        let action: Action = serde_json::from_str("\"graph.compact\"").unwrap();
        assert_eq!(action, Action::Other("graph.compact".to_string()));
        assert_eq!(serde_json::to_string(&action).unwrap(), "\"graph.compact\"");
    }

    #[test]
    fn envelope_wire_shape() {
        let env = Envelope::new(Action::ProcessStatus, json!({"process_id": "p1"}))
            .with_request_id("req-7");
        let value = serde_json::to_value(&env).unwrap();

        assert_eq!(value["action"], "process.status");
        assert_eq!(value["data"]["process_id"], "p1");
        assert_eq!(value["request_id"], "req-7");
        assert_eq!(value["version"], PROTOCOL_VERSION);
        assert!(value["timestamp"].is_u64());
    }

    #[test]
    fn reply_echoes_request_id() {
        let req = Envelope::graph_snapshot_request().with_request_id("abc");
        let reply = req.reply(Action::GraphSnapshot, json!({"graph": {}}));
        assert_eq!(reply.request_id.as_deref(), Some("abc"));
    }

    #[test]
    fn envelope_tolerates_unknown_fields() {
        let text = r#"{
            "action": "graph.update",
            "data": {},
            "request_id": null,
            "timestamp": 1700000000000,
            "version": "9.9",
            "trace_id": "opaque-extension"
        }"#;
        let env: Envelope = serde_json::from_str(text).unwrap();
        assert_eq!(env.action, Action::GraphUpdate);
        assert_eq!(env.request_id, None);
    }

    #[test]
    fn validate_envelope_shape() {
        let good = serde_json::to_value(Envelope::process_status("p")).unwrap();
        assert!(validate_envelope(&good));

        assert!(!validate_envelope(&json!({"action": "x"})));
        assert!(!validate_envelope(&json!("just a string")));
        // Extra fields never fail validation.
        let mut extended = good;
        extended["extra"] = json!(1);
        assert!(validate_envelope(&extended));
    }
}
