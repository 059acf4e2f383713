//! The websocket session: outgoing edits, incoming events, resync.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use uuid::Uuid;

use nodewire_core::{Connection, Graph, Node};
use nodewire_protocol::{Action, Envelope, ProtocolError, RawEvent};

use crate::error::SessionError;
use crate::replica::apply_event;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Writer = Arc<tokio::sync::Mutex<SplitSink<Ws, Message>>>;
type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Envelope>>>>;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A live session against the hub.
///
/// Owns the local graph replica. Incoming remote events are applied to it
/// on the reader task; the change counter from [`Session::changes`] ticks
/// after every application so the embedder knows to re-run evaluation.
pub struct Session {
    url: String,
    writer: Writer,
    replica: Arc<Mutex<Graph>>,
    pending: Pending,
    changes: Arc<watch::Sender<u64>>,
    events_tx: mpsc::UnboundedSender<RawEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<RawEvent>>,
    reader: JoinHandle<()>,
    request_timeout: Duration,
}

impl Session {
    /// Dials the hub and starts the reader task.
    pub async fn connect(url: impl Into<String>) -> Result<Self, SessionError> {
        let url = url.into();
        let (ws, _) = connect_async(url.as_str()).await?;
        let (sink, stream) = ws.split();

        let replica = Arc::new(Mutex::new(Graph::new()));
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (changes, _) = watch::channel(0u64);
        let changes = Arc::new(changes);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let reader = spawn_reader(
            stream,
            replica.clone(),
            pending.clone(),
            changes.clone(),
            events_tx.clone(),
        );
        info!(%url, "session connected");

        Ok(Session {
            url,
            writer: Arc::new(tokio::sync::Mutex::new(sink)),
            replica,
            pending,
            changes,
            events_tx,
            events_rx: Some(events_rx),
            reader,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Builder: overrides the request/response timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    // -----------------------------------------------------------------------
    // Local replica access
    // -----------------------------------------------------------------------

    /// Clones the current local replica.
    pub fn graph(&self) -> Graph {
        self.lock_replica().clone()
    }

    /// Runs a closure against the local replica (rendering, evaluation).
    pub fn with_graph<R>(&self, f: impl FnOnce(&mut Graph) -> R) -> R {
        f(&mut self.lock_replica())
    }

    /// A watch channel that ticks whenever a remote event changed the
    /// replica. Re-run the evaluation engine on each tick.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Takes the stream of raw incoming events (acks, `node_update`
    /// values, info frames). Can be taken once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<RawEvent>> {
        self.events_rx.take()
    }

    // -----------------------------------------------------------------------
    // Outgoing
    // -----------------------------------------------------------------------

    /// Sends a fire-and-forget event.
    pub async fn send_event(&self, event: &RawEvent) -> Result<(), SessionError> {
        self.send_text(event.to_text()).await
    }

    /// Sends a request envelope and awaits the correlated response.
    pub async fn send_request(
        &self,
        action: Action,
        data: Value,
    ) -> Result<Envelope, SessionError> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(request_id.clone(), tx);

        let envelope = Envelope::new(action, data).with_request_id(request_id.clone());
        if let Err(err) = self.send_text(envelope.to_text()).await {
            self.lock_pending().remove(&request_id);
            return Err(err);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => {
                self.lock_pending().remove(&request_id);
                Err(SessionError::Timeout)
            }
        }
    }

    /// Announces a locally created node: applies it to the replica and
    /// sends `node_created`.
    pub async fn create_node(&self, node: Node) -> Result<(), SessionError> {
        let event = RawEvent::node_created(&node);
        self.lock_replica().upsert_node(node);
        self.send_event(&event).await
    }

    /// Announces a locally created connection.
    pub async fn create_link(&self, conn: Connection) -> Result<(), SessionError> {
        let event = RawEvent::link_created(&conn);
        self.lock_replica().push_connection(conn);
        self.send_event(&event).await
    }

    /// Announces a locally moved node.
    pub async fn move_node(&self, id: &str, x: f64, y: f64) -> Result<(), SessionError> {
        self.lock_replica().move_node(id, x, y);
        self.send_event(&RawEvent::node_moved(id, x, y)).await
    }

    /// Pushes the whole local replica to the hub as the new canonical
    /// state.
    pub async fn push_snapshot(&self) -> Result<(), SessionError> {
        let event = RawEvent::graph_snapshot(&self.graph());
        self.send_event(&event).await
    }

    // -----------------------------------------------------------------------
    // Resynchronization
    // -----------------------------------------------------------------------

    /// Requests the canonical graph and replaces the local replica with
    /// it. Missed events are not replayed; this is the whole recovery
    /// story after a gap.
    pub async fn resync(&self) -> Result<(), SessionError> {
        let response = self.send_request(Action::GraphSnapshot, json!({})).await?;
        let graph_value = response
            .data
            .get("graph")
            .cloned()
            .ok_or_else(|| SessionError::Protocol("snapshot response without graph".into()))?;
        let graph: Graph = serde_json::from_value(graph_value)
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        *self.lock_replica() = graph;
        self.changes.send_modify(|v| *v = v.wrapping_add(1));
        Ok(())
    }

    /// Re-dials the hub after a transport loss, then resyncs.
    pub async fn reconnect(&mut self) -> Result<(), SessionError> {
        self.reader.abort();
        let (ws, _) = connect_async(self.url.as_str()).await?;
        let (sink, stream) = ws.split();
        *self.writer.lock().await = sink;
        self.reader = spawn_reader(
            stream,
            self.replica.clone(),
            self.pending.clone(),
            self.changes.clone(),
            self.events_tx.clone(),
        );
        info!(url = %self.url, "session reconnected");
        self.resync().await
    }

    async fn send_text(&self, text: String) -> Result<(), SessionError> {
        self.writer
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await?;
        Ok(())
    }

    fn lock_replica(&self) -> std::sync::MutexGuard<'_, Graph> {
        match self.replica.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Envelope>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn spawn_reader(
    mut stream: SplitStream<Ws>,
    replica: Arc<Mutex<Graph>>,
    pending: Pending,
    changes: Arc<watch::Sender<u64>>,
    events_tx: mpsc::UnboundedSender<RawEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let msg = match frame {
                Ok(msg) => msg,
                Err(err) => {
                    debug!(%err, "session transport error");
                    break;
                }
            };
            match msg {
                Message::Text(text) => {
                    handle_incoming(text.as_str(), &replica, &pending, &changes, &events_tx)
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        debug!("session reader stopped");
    })
}

fn handle_incoming(
    text: &str,
    replica: &Arc<Mutex<Graph>>,
    pending: &Pending,
    changes: &watch::Sender<u64>,
    events_tx: &mpsc::UnboundedSender<RawEvent>,
) {
    match RawEvent::parse(text) {
        Ok(event) => {
            let changed = {
                let mut graph = match replica.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                apply_event(&mut graph, &event)
            };
            if changed {
                changes.send_modify(|v| *v = v.wrapping_add(1));
            }
            // Receiver may be gone (embedder never took the stream).
            let _ = events_tx.send(event);
        }
        Err(ProtocolError::NotJson(_)) => {
            // Plain-text frames are liveness echoes; nothing to apply.
            debug!(%text, "server text frame");
        }
        Err(_) => {
            // Envelope: correlate with a pending request if possible.
            match serde_json::from_str::<Envelope>(text) {
                Ok(envelope) => {
                    let waiter = envelope.request_id.as_ref().and_then(|id| {
                        let mut map = match pending.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        map.remove(id)
                    });
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(envelope);
                        }
                        None => {
                            debug!(action = %envelope.action, "uncorrelated envelope dropped")
                        }
                    }
                }
                Err(err) => debug!(%err, "undecodable frame dropped"),
            }
        }
    }
}
