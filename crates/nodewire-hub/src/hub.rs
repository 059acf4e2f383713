//! Canonical graph state, session registry, and message dispatch.
//!
//! [`Hub`] is an explicit handle passed to every connection task -- there
//! is no process-wide global. Canonical graph and session registry live
//! behind one `std::sync::Mutex`, and every message is handled in a single
//! short critical section: apply the mutation, enqueue replies into
//! per-session outboxes. Outboxes are unbounded channels, so enqueueing
//! never blocks; actual socket writes happen in each session's writer task
//! with no lock held.
//!
//! Failure semantics (per message, apply-or-reject atomically):
//! - transport error on a session: that session is deregistered, nothing
//!   else is touched;
//! - malformed JSON: plain-text echo to the sender only;
//! - unknown event type: `info` reply wrapping the original message;
//! - bad payload for a known type: `info` reply, canonical state untouched.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use nodewire_core::{Connection, Graph, Node};
use nodewire_protocol::envelope::validate_envelope;
use nodewire_protocol::{Action, Envelope, EventKind, MovePayload, ProtocolError, RawEvent};

/// Identifies one connected client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-session outbox: text frames queued for the writer task.
pub type Outbox = mpsc::UnboundedSender<String>;

struct HubState {
    graph: Graph,
    sessions: HashMap<SessionId, Outbox>,
}

/// The synchronization hub handle.
///
/// Cheap to clone; all clones share the same canonical state.
#[derive(Clone)]
pub struct Hub {
    state: Arc<Mutex<HubState>>,
    /// Wholesale snapshot persistence target, when configured.
    graph_path: Option<Arc<PathBuf>>,
}

impl Hub {
    /// Creates a hub owning the given initial graph.
    pub fn new(graph: Graph) -> Self {
        Hub {
            state: Arc::new(Mutex::new(HubState {
                graph,
                sessions: HashMap::new(),
            })),
            graph_path: None,
        }
    }

    /// Builder: persist the canonical graph to this path on every accepted
    /// snapshot or update. Best-effort; failures are logged, never fatal.
    pub fn with_graph_path(mut self, path: PathBuf) -> Self {
        self.graph_path = Some(Arc::new(path));
        self
    }

    // -----------------------------------------------------------------------
    // Session registry
    // -----------------------------------------------------------------------

    /// Registers a new client session. Always succeeds.
    pub fn register(&self, outbox: Outbox) -> SessionId {
        let id = SessionId::new();
        self.lock().sessions.insert(id, outbox);
        info!(session_id = %id, "session registered");
        id
    }

    /// Deregisters a session. Idempotent: removing an already-removed
    /// session is a no-op.
    pub fn deregister(&self, id: SessionId) {
        if self.lock().sessions.remove(&id).is_some() {
            info!(session_id = %id, "session deregistered");
        }
    }

    /// Number of currently registered sessions.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Clones the canonical graph (HTTP debug surface, tests).
    pub fn graph(&self) -> Graph {
        self.lock().graph.clone()
    }

    /// Looks up one canonical node by id.
    pub fn node(&self, id: &str) -> Option<Node> {
        self.lock().graph.get_node(id).cloned()
    }

    // -----------------------------------------------------------------------
    // Message handling
    // -----------------------------------------------------------------------

    /// Handles one text frame from a session.
    ///
    /// Dispatches structured events by `type`, envelopes by `action`, and
    /// echoes anything that is not JSON back to the sender so the channel
    /// stays usable for trivial liveness checks.
    pub fn handle_text(&self, sender: SessionId, text: &str) {
        match RawEvent::parse(text) {
            Ok(event) => self.handle_event(sender, event, text),
            Err(ProtocolError::NotJson(_)) => {
                debug!(session_id = %sender, "plain text frame, echoing");
                self.send_to(sender, format!("Server echo: {}", text));
            }
            Err(_) => {
                // JSON, but not an event: envelope or arbitrary payload.
                self.handle_non_event(sender, text);
            }
        }
    }

    fn handle_event(&self, sender: SessionId, event: RawEvent, raw: &str) {
        match &event.kind {
            EventKind::NodeCreated => match event.payload_as::<Node>() {
                Ok(node) => {
                    let id = node.id.clone();
                    self.lock().graph.upsert_node(node.clone());
                    debug!(session_id = %sender, node_id = %id, "node created");
                    let value = preview_value(&node);
                    self.send_to(sender, RawEvent::node_update(id.as_str(), value).to_text());
                }
                Err(err) => self.reject(sender, raw, err),
            },
            EventKind::LinkCreated => match event.payload_as::<Connection>() {
                Ok(conn) => {
                    self.lock().graph.push_connection(conn);
                    debug!(session_id = %sender, "link created");
                    self.broadcast(raw, Some(sender));
                }
                Err(err) => self.reject(sender, raw, err),
            },
            EventKind::NodeMoved => match event.payload_as::<MovePayload>() {
                Ok(mv) => {
                    let moved = self.lock().graph.move_node(&mv.id, mv.x, mv.y);
                    if moved {
                        self.send_to(
                            sender,
                            RawEvent::node_move_ack(&mv.id, mv.x, mv.y).to_text(),
                        );
                    } else {
                        // Unknown id: silently ignored, no ack.
                        debug!(session_id = %sender, node_id = %mv.id, "move for unknown node ignored");
                    }
                }
                Err(err) => self.reject(sender, raw, err),
            },
            EventKind::GraphSnapshot => match event.payload_as::<Graph>() {
                Ok(graph) => {
                    self.lock().graph = graph;
                    info!(session_id = %sender, "canonical graph replaced by snapshot");
                    self.broadcast(raw, Some(sender));
                    self.send_to(sender, RawEvent::snapshot_ack().to_text());
                    self.persist();
                }
                Err(err) => self.reject(sender, raw, err),
            },
            // Server-to-client kinds arriving from a client, and anything
            // unknown: wrap in an info reply, never drop silently.
            _ => {
                debug!(session_id = %sender, kind = ?event.kind, "unhandled event type");
                self.send_info(sender, raw);
            }
        }
    }

    /// JSON that is not a `{type, payload}` event: an envelope, or an
    /// arbitrary structure that gets the info-wrap treatment.
    fn handle_non_event(&self, sender: SessionId, raw: &str) {
        let Ok(value) = serde_json::from_str::<Value>(raw) else {
            // Raced parse outcomes are still just an echo.
            self.send_to(sender, format!("Server echo: {}", raw));
            return;
        };
        if !validate_envelope(&value) {
            self.send_info(sender, raw);
            return;
        }
        match serde_json::from_value::<Envelope>(value) {
            Ok(env) => self.handle_envelope(sender, env),
            Err(_) => self.send_info(sender, raw),
        }
    }

    fn handle_envelope(&self, sender: SessionId, env: Envelope) {
        match &env.action {
            Action::GraphSnapshot => {
                // A snapshot envelope either carries a graph (save) or an
                // empty body (resync request for the canonical state).
                match extract_graph(&env.data) {
                    Some(graph) => {
                        self.lock().graph = graph.clone();
                        info!(session_id = %sender, "canonical graph replaced by envelope snapshot");
                        self.broadcast(&RawEvent::graph_snapshot(&graph).to_text(), Some(sender));
                        self.send_to(
                            sender,
                            env.reply(Action::GraphSnapshot, json!({"status": "ok"})).to_text(),
                        );
                        self.persist();
                    }
                    None => {
                        let graph = self.graph();
                        let data = json!({
                            "graph": serde_json::to_value(&graph).unwrap_or(Value::Null)
                        });
                        self.send_to(sender, env.reply(Action::GraphSnapshot, data).to_text());
                    }
                }
            }
            Action::GraphUpdate => {
                let nodes: Vec<Node> = env
                    .data
                    .get("nodes")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let connections: Vec<Connection> = env
                    .data
                    .get("connections")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                {
                    let mut state = self.lock();
                    for node in nodes {
                        state.graph.upsert_node(node);
                    }
                    for conn in connections {
                        state.graph.push_connection(conn);
                    }
                }
                self.send_to(
                    sender,
                    env.reply(Action::GraphUpdate, json!({"status": "ok"})).to_text(),
                );
                self.persist();
            }
            Action::NodeSaveContent => {
                let node_id = env.data.get("node_id").and_then(Value::as_str);
                let content = env.data.get("content").and_then(Value::as_str);
                let applied = match (node_id, content) {
                    (Some(id), Some(content)) => self.lock().graph.set_content(id, content),
                    _ => false,
                };
                self.send_to(
                    sender,
                    env.reply(Action::NodeSaveContent, json!({"status": "ok", "applied": applied}))
                        .to_text(),
                );
                if applied {
                    self.persist();
                }
            }
            // Process/terminal execution belongs to external collaborators;
            // the hub acknowledges that it does not run them.
            other => {
                debug!(session_id = %sender, action = %other, "unsupported envelope action");
                let reply = env.reply(other.clone(), json!({"status": "unsupported"}));
                self.send_to(sender, reply.to_text());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    /// Sends a text frame to every registered session except `exclude`.
    ///
    /// A send failure on an individual session is treated as a disconnect:
    /// that session is removed from the registry and broadcasting continues
    /// with the rest.
    pub fn broadcast(&self, text: &str, exclude: Option<SessionId>) {
        let mut state = self.lock();
        let mut dead: Vec<SessionId> = Vec::new();
        for (&id, outbox) in &state.sessions {
            if Some(id) == exclude {
                continue;
            }
            if outbox.send(text.to_string()).is_err() {
                dead.push(id);
            }
        }
        for id in dead {
            state.sessions.remove(&id);
            warn!(session_id = %id, "session dropped during broadcast");
        }
    }

    /// Sends a text frame to one session. A failure removes the session.
    fn send_to(&self, id: SessionId, text: String) {
        let mut state = self.lock();
        let failed = match state.sessions.get(&id) {
            Some(outbox) => outbox.send(text).is_err(),
            None => false,
        };
        if failed {
            state.sessions.remove(&id);
            warn!(session_id = %id, "session dropped on send");
        }
    }

    fn send_info(&self, sender: SessionId, raw: &str) {
        let original = serde_json::from_str(raw).unwrap_or(Value::String(raw.to_string()));
        self.send_to(sender, RawEvent::info(original).to_text());
    }

    /// A known event kind with a payload that does not fit: reject the one
    /// message with an info reply, canonical state untouched.
    fn reject(&self, sender: SessionId, raw: &str, err: ProtocolError) {
        debug!(session_id = %sender, error = %err, "payload rejected");
        self.send_info(sender, raw);
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Writes the canonical graph wholesale to the configured path, if any.
    ///
    /// The graph is cloned under the lock; the file write happens outside
    /// any critical section.
    fn persist(&self) {
        let Some(path) = &self.graph_path else {
            return;
        };
        let graph = self.graph();
        if let Err(err) = graph.save_to_path(path.as_ref()) {
            warn!(path = %path.display(), error = %err, "snapshot persistence failed");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        // A poisoned lock means a panic mid-mutation; canonical state is
        // last-write-wins anyway, so continue with whatever is there.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Server-side computed value for a freshly created node.
///
/// A stand-in demonstrating that server-side computation is possible; a
/// real computation can replace it without changing the contract.
fn preview_value(_node: &Node) -> Value {
    json!(42)
}

/// Accepts both envelope snapshot shapes: `{"graph": {...}}` from the
/// payload builders and a bare graph document from the prototype UI.
fn extract_graph(data: &Value) -> Option<Graph> {
    let candidate = match data.get("graph") {
        Some(inner) => inner,
        None if data.get("nodes").is_some() => data,
        None => return None,
    };
    serde_json::from_value(candidate.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodewire_core::{NodeKind, Port};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct TestClient {
        id: SessionId,
        rx: UnboundedReceiver<String>,
    }

    impl TestClient {
        fn join(hub: &Hub) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = hub.register(tx);
            TestClient { id, rx }
        }

        /// All frames delivered so far.
        fn drain(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(text) = self.rx.try_recv() {
                out.push(text);
            }
            out
        }

        fn drain_json(&mut self) -> Vec<Value> {
            self.drain()
                .iter()
                .map(|t| serde_json::from_str(t).unwrap())
                .collect()
        }
    }

    fn node_created(id: &str) -> String {
        format!(r#"{{"type":"node_created","payload":{{"id":"{}"}}}}"#, id)
    }

    #[test]
    fn plain_text_is_echoed_to_sender_only() {
        let hub = Hub::new(Graph::new());
        let mut a = TestClient::join(&hub);
        let mut b = TestClient::join(&hub);

        hub.handle_text(a.id, "ping");

        assert_eq!(a.drain(), vec!["Server echo: ping".to_string()]);
        assert!(b.drain().is_empty());
        assert_eq!(hub.graph(), Graph::new());
    }

    #[test]
    fn node_created_appends_and_acks_with_value() {
        let hub = Hub::new(Graph::new());
        let mut a = TestClient::join(&hub);
        let mut b = TestClient::join(&hub);

        hub.handle_text(a.id, &node_created("n1"));

        assert!(hub.node("n1").is_some());
        let replies = a.drain_json();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["type"], "node_update");
        assert_eq!(replies[0]["payload"]["id"], "n1");
        assert_eq!(replies[0]["payload"]["value"], 42);
        // The ack is sender-only.
        assert!(b.drain().is_empty());
    }

    #[test]
    fn link_created_broadcasts_verbatim_excluding_sender() {
        let hub = Hub::new(Graph::new());
        let mut a = TestClient::join(&hub);
        let mut b = TestClient::join(&hub);
        let mut c = TestClient::join(&hub);

        let raw = r#"{"type":"link_created","payload":{"from":{"node":"n1","port":"out"},"to":{"node":"n2","port":"in"}},"trace":"extra-field"}"#;
        hub.handle_text(a.id, raw);

        assert_eq!(hub.graph().connections.len(), 1);
        // Exactly N-1 deliveries, byte-identical, none to the sender.
        assert_eq!(b.drain(), vec![raw.to_string()]);
        assert_eq!(c.drain(), vec![raw.to_string()]);
        assert!(a.drain().is_empty());
    }

    #[test]
    fn node_moved_updates_position_and_acks() {
        let mut graph = Graph::new();
        graph
            .insert_node(Node::new("n1", NodeKind::Generic))
            .unwrap();
        let hub = Hub::new(graph);
        let mut a = TestClient::join(&hub);

        hub.handle_text(
            a.id,
            r#"{"type":"node_moved","payload":{"id":"n1","x":10.0,"y":-2.5}}"#,
        );

        let node = hub.node("n1").unwrap();
        assert_eq!((node.x, node.y), (10.0, -2.5));
        let replies = a.drain_json();
        assert_eq!(replies[0]["type"], "node_move_ack");
        assert_eq!(replies[0]["payload"]["id"], "n1");
        assert_eq!(replies[0]["payload"]["x"], 10.0);
    }

    #[test]
    fn node_moved_unknown_id_is_silently_ignored() {
        let hub = Hub::new(Graph::new());
        let mut a = TestClient::join(&hub);

        hub.handle_text(
            a.id,
            r#"{"type":"node_moved","payload":{"id":"ghost","x":1.0,"y":1.0}}"#,
        );

        // No ack at all: the sender notices only by its absence.
        assert!(a.drain().is_empty());
    }

    #[test]
    fn graph_snapshot_replaces_broadcasts_and_acks() {
        let hub = Hub::new(Graph::new());
        let mut a = TestClient::join(&hub);
        let mut b = TestClient::join(&hub);

        let raw = r#"{"type":"graph_snapshot","payload":{"nodes":[{"id":"x"}],"connections":[]}}"#;
        hub.handle_text(a.id, raw);

        assert!(hub.node("x").is_some());
        assert_eq!(b.drain(), vec![raw.to_string()]);
        let replies = a.drain_json();
        assert_eq!(replies[0]["type"], "snapshot_ack");
    }

    #[test]
    fn unknown_event_type_gets_info_reply() {
        let hub = Hub::new(Graph::new());
        let mut a = TestClient::join(&hub);
        let mut b = TestClient::join(&hub);

        let raw = r#"{"type":"node_recolored","payload":{"id":"n1"}}"#;
        hub.handle_text(a.id, raw);

        let replies = a.drain_json();
        assert_eq!(replies[0]["type"], "info");
        assert_eq!(replies[0]["payload"]["received"]["type"], "node_recolored");
        assert!(b.drain().is_empty());
    }

    #[test]
    fn bad_payload_rejects_message_without_corrupting_state() {
        let hub = Hub::new(Graph::new());
        let mut a = TestClient::join(&hub);
        hub.handle_text(a.id, &node_created("good"));
        a.drain();

        // node payload must be an object with an id
        hub.handle_text(a.id, r#"{"type":"node_created","payload":"not-a-node"}"#);

        let replies = a.drain_json();
        assert_eq!(replies[0]["type"], "info");
        // State accepted from prior events is untouched.
        assert!(hub.node("good").is_some());
        assert_eq!(hub.graph().nodes.len(), 1);
    }

    #[test]
    fn apply_is_deterministic_replay() {
        let sequence = [
            node_created("n1"),
            node_created("n2"),
            r#"{"type":"link_created","payload":{"from":{"node":"n1","port":"out"},"to":{"node":"n2","port":"in"}}}"#.to_string(),
            r#"{"type":"node_moved","payload":{"id":"n1","x":5.0,"y":6.0}}"#.to_string(),
        ];

        let hub = Hub::new(Graph::new());
        let mut client = TestClient::join(&hub);
        for msg in &sequence {
            hub.handle_text(client.id, msg);
        }
        client.drain();

        // Replaying the same sequence against a fresh hub yields the same
        // canonical graph.
        let replay = Hub::new(Graph::new());
        let mut replay_client = TestClient::join(&replay);
        for msg in &sequence {
            replay.handle_text(replay_client.id, msg);
        }
        replay_client.drain();

        assert_eq!(hub.graph(), replay.graph());
    }

    #[test]
    fn broadcast_drops_dead_sessions_and_continues() {
        let hub = Hub::new(Graph::new());
        let mut a = TestClient::join(&hub);
        let dead = TestClient::join(&hub);
        let dead_id = dead.id;
        drop(dead.rx); // receiver gone: sends to it now fail
        let mut c = TestClient::join(&hub);

        assert_eq!(hub.session_count(), 3);
        hub.broadcast("hello", None);

        assert_eq!(a.drain(), vec!["hello".to_string()]);
        assert_eq!(c.drain(), vec!["hello".to_string()]);
        assert_eq!(hub.session_count(), 2);

        // Deregistering the already-dropped session is a no-op.
        hub.deregister(dead_id);
        assert_eq!(hub.session_count(), 2);
    }

    #[test]
    fn snapshot_envelope_with_empty_data_returns_canonical_graph() {
        let mut graph = Graph::new();
        graph
            .insert_node(Node::new("n1", NodeKind::Variable).with_output(Port::new("out")))
            .unwrap();
        let hub = Hub::new(graph);
        let mut a = TestClient::join(&hub);

        let req = Envelope::graph_snapshot_request().with_request_id("r1");
        hub.handle_text(a.id, &req.to_text());

        let replies = a.drain_json();
        assert_eq!(replies[0]["action"], "graph.snapshot");
        assert_eq!(replies[0]["request_id"], "r1");
        assert_eq!(replies[0]["data"]["graph"]["nodes"][0]["id"], "n1");
    }

    #[test]
    fn snapshot_envelope_with_graph_replaces_state() {
        let hub = Hub::new(Graph::new());
        let mut a = TestClient::join(&hub);
        let mut b = TestClient::join(&hub);

        let mut graph = Graph::new();
        graph
            .insert_node(Node::new("saved", NodeKind::Generic))
            .unwrap();
        hub.handle_text(a.id, &Envelope::graph_snapshot(&graph).to_text());

        assert!(hub.node("saved").is_some());
        // Other sessions receive the new state as a graph_snapshot event.
        let relayed = b.drain_json();
        assert_eq!(relayed[0]["type"], "graph_snapshot");
        let ack = a.drain_json();
        assert_eq!(ack[0]["data"]["status"], "ok");
    }

    #[test]
    fn prototype_bare_snapshot_envelope_is_accepted() {
        let hub = Hub::new(Graph::new());
        let mut a = TestClient::join(&hub);

        // The prototype UI sends the graph document directly as data.
        let raw = json!({
            "action": "graph.snapshot",
            "data": {"nodes": [{"id": "p1"}], "links": []},
            "request_id": null,
            "timestamp": 1u64,
            "version": "proto"
        });
        hub.handle_text(a.id, &raw.to_string());

        assert!(hub.node("p1").is_some());
        assert!(!a.drain().is_empty());
    }

    #[test]
    fn node_save_content_envelope() {
        let mut graph = Graph::new();
        graph
            .insert_node(Node::new("n1", NodeKind::Generic))
            .unwrap();
        let hub = Hub::new(graph);
        let mut a = TestClient::join(&hub);

        hub.handle_text(a.id, &Envelope::node_save_content("n1", "new text").to_text());
        assert_eq!(hub.node("n1").unwrap().content, "new text");
        let replies = a.drain_json();
        assert_eq!(replies[0]["data"]["applied"], true);

        hub.handle_text(a.id, &Envelope::node_save_content("ghost", "x").to_text());
        let replies = a.drain_json();
        assert_eq!(replies[0]["data"]["applied"], false);
    }

    #[test]
    fn unsupported_envelope_action_is_acknowledged() {
        let hub = Hub::new(Graph::new());
        let mut a = TestClient::join(&hub);

        hub.handle_text(a.id, &Envelope::process_start("g1", None).to_text());

        let replies = a.drain_json();
        assert_eq!(replies[0]["action"], "process.start");
        assert_eq!(replies[0]["data"]["status"], "unsupported");
    }

    #[test]
    fn non_event_json_object_gets_info_reply() {
        let hub = Hub::new(Graph::new());
        let mut a = TestClient::join(&hub);

        hub.handle_text(a.id, r#"{"hello": "world"}"#);

        let replies = a.drain_json();
        assert_eq!(replies[0]["type"], "info");
        assert_eq!(replies[0]["payload"]["received"]["hello"], "world");
    }

    #[test]
    fn persistence_writes_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canonical.json");
        let hub = Hub::new(Graph::new()).with_graph_path(path.clone());
        let mut a = TestClient::join(&hub);

        hub.handle_text(
            a.id,
            r#"{"type":"graph_snapshot","payload":{"nodes":[{"id":"x"}],"connections":[]}}"#,
        );
        a.drain();

        let saved = Graph::load_from_path(&path).unwrap();
        assert!(saved.get_node("x").is_some());
    }
}
