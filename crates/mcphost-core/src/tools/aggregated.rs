//! Router multiplexing a discovered, changing set of backends
//!
//! A refresh cycle resolves the watched service names, reconciles live
//! connections against the resolved address set and publishes a fully
//! rebuilt tool index. Cycles run once at start and then on a fixed interval
//! until the router is closed.
//!
//! Readers (`catalog`, `invoke`) take the shared lock only long enough to
//! clone an `Arc` of the current state, so invocations never block a refresh
//! and run in parallel with each other.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::discovery::DiscoveryResolver;
use crate::logging::Logger;
use crate::{log_debug, log_error, log_info};
use crate::types::{CancellationToken, Tool};

use super::backend::{BackendConnector, ToolBackend};
use super::error::{RouterError, RouterResult};
use super::router::ToolRouter;

/// Published routing state; replaced wholesale on every refresh
struct RouterState {
    /// Live connections keyed by address
    connections: BTreeMap<String, Arc<dyn ToolBackend>>,
    /// Tool name -> owning connection
    index: HashMap<String, Arc<dyn ToolBackend>>,
    /// Sorted by name
    catalog: Vec<Tool>,
}

impl RouterState {
    fn empty() -> Self {
        Self {
            connections: BTreeMap::new(),
            index: HashMap::new(),
            catalog: Vec::new(),
        }
    }

    /// Derive index and catalog from `connections`.
    ///
    /// Connections are visited in address order and the first to advertise
    /// a name owns it.
    fn build(connections: BTreeMap<String, Arc<dyn ToolBackend>>, logger: &dyn Logger) -> Self {
        let mut index: HashMap<String, Arc<dyn ToolBackend>> = HashMap::new();
        let mut catalog = Vec::new();

        for conn in connections.values() {
            for tool in conn.tools() {
                match index.entry(tool.name.clone()) {
                    Entry::Occupied(owner) => logger.warn(&format!(
                        "tool {} from {} shadowed by {}",
                        tool.name,
                        conn.address(),
                        owner.get().address()
                    )),
                    Entry::Vacant(slot) => {
                        slot.insert(Arc::clone(conn));
                        catalog.push(tool);
                    }
                }
            }
        }
        catalog.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            connections,
            index,
            catalog,
        }
    }
}

/// Tool router over every backend registered under a set of service names
pub struct AggregatedRouter {
    services: Vec<String>,
    resolver: Arc<dyn DiscoveryResolver>,
    connector: Arc<dyn BackendConnector>,
    interval: Duration,
    state: RwLock<Arc<RouterState>>,
    /// Serializes refresh cycles with each other and with close
    refresh_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    logger: Arc<dyn Logger>,
}

impl AggregatedRouter {
    /// Create an idle router; nothing is resolved until [`start`](Self::start)
    /// or [`refresh`](Self::refresh) runs.
    pub fn new(
        services: Vec<String>,
        resolver: Arc<dyn DiscoveryResolver>,
        connector: Arc<dyn BackendConnector>,
        interval: Duration,
        logger: Arc<dyn Logger>,
    ) -> Arc<Self> {
        Arc::new(Self {
            services,
            resolver,
            connector,
            interval,
            state: RwLock::new(Arc::new(RouterState::empty())),
            refresh_lock: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
            task: Mutex::new(None),
            logger,
        })
    }

    /// Create a router, run the first refresh and start the periodic loop
    pub async fn connect(
        services: Vec<String>,
        resolver: Arc<dyn DiscoveryResolver>,
        connector: Arc<dyn BackendConnector>,
        interval: Duration,
        logger: Arc<dyn Logger>,
    ) -> Arc<Self> {
        let router = Self::new(services, resolver, connector, interval, logger);
        router.start().await;
        router
    }

    /// Run the first refresh, then refresh every interval in the background.
    ///
    /// Calling it again while the loop runs only refreshes.
    pub async fn start(self: &Arc<Self>) {
        self.refresh().await;

        let mut task = self.task.lock();
        if task.is_some() || self.closed.load(Ordering::SeqCst) {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let interval = self.interval;
        *task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                // Dropped routers stop refreshing
                let Some(router) = weak.upgrade() else { break };
                router.refresh().await;
            }
        }));
    }

    /// Run one refresh cycle now.
    ///
    /// A discovery failure is logged and leaves the published state as it was.
    pub async fn refresh(&self) {
        let _cycle = self.refresh_lock.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let snapshot = match self.resolver.resolve(&self.services).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log_error!(self.logger, "registry resolve: {}", e);
                return;
            }
        };
        let target: BTreeSet<String> = snapshot.into_values().flatten().collect();

        let current = Arc::clone(&*self.state.read());

        let mut connections: BTreeMap<String, Arc<dyn ToolBackend>> = current
            .connections
            .iter()
            .filter(|(addr, _)| target.contains(*addr))
            .map(|(addr, conn)| (addr.clone(), Arc::clone(conn)))
            .collect();

        let fresh: Vec<&String> = target
            .iter()
            .filter(|addr| !current.connections.contains_key(*addr))
            .collect();
        let dialed = join_all(fresh.into_iter().map(|addr| async move {
            (addr.clone(), self.connector.connect(addr).await)
        }))
        .await;

        for (addr, result) in dialed {
            match result {
                Ok(conn) => {
                    log_info!(self.logger, "mcp connected: {} (tools={})", addr, conn.tools().len());
                    connections.insert(addr, conn);
                }
                Err(e) => log_error!(self.logger, "mcp dial {}: {}", addr, e),
            }
        }

        let departed: Vec<Arc<dyn ToolBackend>> = current
            .connections
            .iter()
            .filter(|(addr, _)| !target.contains(*addr))
            .map(|(_, conn)| Arc::clone(conn))
            .collect();
        drop(current);

        let next = Arc::new(RouterState::build(connections, self.logger.as_ref()));
        log_debug!(
            self.logger,
            "tool index rebuilt: {} connections, {} tools",
            next.connections.len(),
            next.catalog.len()
        );
        *self.state.write() = next;

        for conn in departed {
            log_info!(self.logger, "mcp disconnected: {}", conn.address());
            conn.close().await;
        }
    }

    /// Addresses of the live connections, in order
    pub fn connected_addresses(&self) -> Vec<String> {
        self.state.read().connections.keys().cloned().collect()
    }

    /// Whether `close` has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolRouter for AggregatedRouter {
    fn catalog(&self) -> Vec<Tool> {
        self.state.read().catalog.clone()
    }

    async fn invoke(&self, name: &str, arguments: Value) -> RouterResult<String> {
        if self.is_closed() {
            return Err(RouterError::Closed);
        }
        let owner = self.state.read().index.get(name).cloned();
        match owner {
            Some(conn) => conn.call_tool(name, arguments).await,
            None => Err(RouterError::ToolNotFound(name.to_string())),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        drop(self.task.lock().take());

        // Wait out an in-flight cycle so nothing is published after this point
        let _cycle = self.refresh_lock.lock().await;
        let state = std::mem::replace(&mut *self.state.write(), Arc::new(RouterState::empty()));

        for conn in state.connections.values() {
            conn.close().await;
        }
        self.logger.info(&format!(
            "tool router closed ({} connections)",
            state.connections.len()
        ));
    }
}
