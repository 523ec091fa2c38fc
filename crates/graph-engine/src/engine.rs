//! Graph executor
//!
//! Owns the loaded graph, steps it on a fixed interval, and exposes the
//! lifecycle surface (load, start, stop, hot reload, status). Ticks run
//! strictly one at a time: the loop awaits each pass and skips intervals it
//! missed, so a slow device call delays the schedule instead of overlapping it.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::EngineError;
use crate::model::{ConnectionRecord, GraphDocument, NodeRecord};
use crate::node::{BufferRole, Node, NodeInputs, NodeOutputs, NodeServices};
use crate::order::execution_order;
use crate::registry::{NodeRegistry, Resolution};

/// Executor timing knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Gap between evaluation passes
    pub tick_interval: Duration,
    /// Gap between periodic status events while running
    pub status_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            status_interval: Duration::from_secs(1),
        }
    }
}

/// Lifecycle snapshot served to clients
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub node_count: usize,
    pub connection_count: usize,
    pub tick_count: u64,
    /// RFC 3339 timestamp of the last completed pass
    pub last_tick_time: Option<String>,
}

/// Events published on the engine's broadcast channel
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Started { status: EngineStatus },
    Stopped { status: EngineStatus },
    Status { status: EngineStatus },
}

/// Outcome of loading a graph document
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LoadSummary {
    /// Records instantiated as executable nodes
    pub loaded: usize,
    /// Records skipped because no registered type matched
    pub skipped: usize,
    pub connections: usize,
}

struct NodeEntry {
    type_id: String,
    node: Box<dyn Node>,
}

#[derive(Default)]
struct GraphState {
    nodes: HashMap<String, NodeEntry>,
    /// Ids in document order, the deterministic tie-breaker for execution
    node_order: Vec<String>,
    connections: Vec<ConnectionRecord>,
    /// Most recent outputs per node; survives across ticks so cycles read the
    /// previous pass's value
    outputs: HashMap<String, NodeOutputs>,
}

pub struct GraphEngine {
    registry: Arc<NodeRegistry>,
    services: Arc<NodeServices>,
    config: EngineConfig,
    graph: Mutex<GraphState>,
    running: AtomicBool,
    tick_count: AtomicU64,
    node_count: AtomicUsize,
    connection_count: AtomicUsize,
    last_tick: StdMutex<Option<DateTime<Utc>>>,
    tick_task: StdMutex<Option<JoinHandle<()>>>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl GraphEngine {
    #[must_use]
    pub fn new(
        registry: Arc<NodeRegistry>,
        services: Arc<NodeServices>,
        config: EngineConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            registry,
            services,
            config,
            graph: Mutex::new(GraphState::default()),
            running: AtomicBool::new(false),
            tick_count: AtomicU64::new(0),
            node_count: AtomicUsize::new(0),
            connection_count: AtomicUsize::new(0),
            last_tick: StdMutex::new(None),
            tick_task: StdMutex::new(None),
            event_tx,
        }
    }

    /// Subscribe to lifecycle and status events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn services(&self) -> &Arc<NodeServices> {
        &self.services
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current lifecycle snapshot; callable from sync contexts
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let last_tick_time = self
            .last_tick
            .lock()
            .ok()
            .and_then(|guard| guard.map(|at| at.to_rfc3339()));
        EngineStatus {
            running: self.is_running(),
            node_count: self.node_count.load(Ordering::SeqCst),
            connection_count: self.connection_count.load(Ordering::SeqCst),
            tick_count: self.tick_count.load(Ordering::SeqCst),
            last_tick_time,
        }
    }

    /// Read and load a graph document from disk.
    ///
    /// Read and parse failures surface before any state changes, so a bad
    /// file leaves the currently loaded graph untouched.
    pub async fn load_graph(&self, path: impl AsRef<Path>) -> Result<LoadSummary, EngineError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| EngineError::GraphRead {
                path: path.to_path_buf(),
                source,
            })?;
        let doc: GraphDocument = serde_json::from_str(&raw)?;
        tracing::info!(path = %path.display(), "loading graph document");
        Ok(self.load_document(&doc).await)
    }

    /// Replace the loaded graph with `doc`.
    ///
    /// The shared buffer is wiped exactly once, before any node restores, so
    /// values from the previous graph never leak into the new one. Records
    /// whose type cannot be resolved are skipped with a warning; editor-only
    /// decorations are dropped silently.
    pub async fn load_document(&self, doc: &GraphDocument) -> LoadSummary {
        let mut guard = self.graph.lock().await;
        *guard = GraphState::default();
        self.services.buffer.clear();

        let mut loaded = 0usize;
        let mut skipped = 0usize;
        for record in &doc.nodes {
            match self
                .registry
                .resolve(record.type_id.as_deref(), record.label.as_deref())
            {
                Resolution::Resolved { type_id, factory } => {
                    let mut node = factory(self.services.clone());
                    node.restore(&record.data);
                    let entry = NodeEntry {
                        type_id: type_id.to_string(),
                        node,
                    };
                    if guard.nodes.insert(record.id.clone(), entry).is_some() {
                        tracing::warn!(
                            node_id = %record.id,
                            "duplicate node id in document, later definition wins"
                        );
                    } else {
                        guard.node_order.push(record.id.clone());
                    }
                    loaded += 1;
                }
                Resolution::UiOnly => {
                    tracing::debug!(node_id = %record.id, "skipping editor-only node");
                }
                Resolution::Unknown => {
                    tracing::warn!(
                        node_id = %record.id,
                        node_type = record.type_id.as_deref().unwrap_or("<none>"),
                        "unknown node type, skipping"
                    );
                    skipped += 1;
                }
            }
        }
        guard.connections = doc.connections.clone();

        self.node_count.store(guard.nodes.len(), Ordering::SeqCst);
        self.connection_count
            .store(guard.connections.len(), Ordering::SeqCst);
        self.tick_count.store(0, Ordering::SeqCst);
        if let Ok(mut last) = self.last_tick.lock() {
            *last = None;
        }

        let summary = LoadSummary {
            loaded,
            skipped,
            connections: guard.connections.len(),
        };
        tracing::info!(
            loaded = summary.loaded,
            skipped = summary.skipped,
            connections = summary.connections,
            "graph loaded"
        );
        summary
    }

    /// Start the tick loop. The first pass runs immediately.
    pub fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        if self.is_running() {
            tracing::debug!("engine already running");
            return Ok(());
        }
        if self.node_count.load(Ordering::SeqCst) == 0 {
            return Err(EngineError::EmptyGraph);
        }

        self.tick_count.store(0, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        let engine = Arc::clone(self);
        let tick_interval = self.config.tick_interval;
        let status_interval = self.config.status_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_status = Instant::now();
            loop {
                ticker.tick().await;
                if !engine.running.load(Ordering::SeqCst) {
                    break;
                }
                engine.tick().await;
                if last_status.elapsed() >= status_interval {
                    let _ = engine.event_tx.send(EngineEvent::Status {
                        status: engine.status(),
                    });
                    last_status = Instant::now();
                }
            }
        });
        if let Ok(mut slot) = self.tick_task.lock() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
            }
        }

        let status = self.status();
        tracing::info!(
            nodes = status.node_count,
            connections = status.connection_count,
            "engine started"
        );
        let _ = self.event_tx.send(EngineEvent::Started { status });
        Ok(())
    }

    /// Stop the tick loop; a no-op when already stopped
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            tracing::debug!("engine already stopped");
            return;
        }
        if let Ok(mut slot) = self.tick_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        let status = self.status();
        tracing::info!(ticks = status.tick_count, "engine stopped");
        let _ = self.event_tx.send(EngineEvent::Stopped { status });
    }

    /// Swap in a new document, keeping the run state from before the swap.
    ///
    /// A previously running engine restarts only when the new document has at
    /// least one runnable node.
    pub async fn hot_reload(self: &Arc<Self>, doc: &GraphDocument) -> LoadSummary {
        let was_running = self.is_running();
        self.stop();
        let summary = self.load_document(doc).await;
        if was_running {
            if summary.loaded > 0 {
                if let Err(err) = self.start() {
                    tracing::warn!(error = %err, "engine did not restart after reload");
                }
            } else {
                tracing::warn!("reloaded graph has no runnable nodes, engine stays stopped");
            }
        }
        summary
    }

    /// Run one evaluation pass immediately, outside the interval schedule
    pub async fn force_tick(&self) {
        self.tick().await;
    }

    async fn tick(&self) {
        let started = Instant::now();
        let mut guard = self.graph.lock().await;
        let GraphState {
            nodes,
            node_order,
            connections,
            outputs,
        } = &mut *guard;

        let mut writers = HashSet::new();
        let mut readers = HashSet::new();
        for (id, entry) in nodes.iter() {
            match entry.node.buffer_role() {
                BufferRole::Writer => {
                    writers.insert(id.clone());
                }
                BufferRole::Reader => {
                    readers.insert(id.clone());
                }
                BufferRole::None => {}
            }
        }

        let order = execution_order(node_order, connections, &writers, &readers);
        for id in &order {
            let mut inputs = NodeInputs::new();
            for connection in connections.iter().filter(|c| c.target == *id) {
                if !nodes.contains_key(&connection.source) {
                    continue;
                }
                let value = outputs
                    .get(&connection.source)
                    .and_then(|outs| outs.get(&connection.source_output))
                    .cloned();
                inputs.push(&connection.target_input, value);
            }

            let Some(entry) = nodes.get_mut(id) else {
                continue;
            };
            match entry.node.step(&inputs).await {
                Ok(outs) => {
                    outputs.insert(id.clone(), outs);
                }
                Err(err) => {
                    tracing::error!(
                        node_id = %id,
                        node_type = %entry.type_id,
                        error = %err,
                        "node step failed"
                    );
                }
            }
        }
        drop(guard);

        self.tick_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_tick.lock() {
            *last = Some(Utc::now());
        }
        tracing::trace!(elapsed_ms = started.elapsed().as_millis() as u64, "tick complete");
    }

    /// Outputs the node produced on its most recent pass
    pub async fn node_outputs(&self, node_id: &str) -> Option<NodeOutputs> {
        self.graph.lock().await.outputs.get(node_id).cloned()
    }

    /// Serialize the loaded graph back into a document
    pub async fn export_document(&self) -> GraphDocument {
        let guard = self.graph.lock().await;
        let nodes = guard
            .node_order
            .iter()
            .filter_map(|id| {
                guard.nodes.get(id).map(|entry| NodeRecord {
                    id: id.clone(),
                    type_id: Some(entry.type_id.clone()),
                    label: self.registry.label_for(&entry.type_id),
                    data: entry.node.serialize(),
                })
            })
            .collect();
        GraphDocument {
            nodes,
            connections: guard.connections.clone(),
        }
    }
}

impl Drop for GraphEngine {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.tick_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}
