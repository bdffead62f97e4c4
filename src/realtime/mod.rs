//! Realtime gateway.
//!
//! ARCHITECTURE
//! ============
//! One WebSocket per client at `/ws`, on the same listener as the REST API
//! but outside its middleware chain. Three pieces:
//!
//! - `Registry`: event name to handler, assembled through `RegistryBuilder`
//!   during startup and frozen before the listener binds. It has no
//!   mutating methods, so late registration is impossible.
//! - `Hub`: live connections grouped by user. HTTP handlers publish through
//!   it; the lifecycle controller uses it to close every socket on shutdown.
//! - `ws`: the upgrade handler and per-connection loop.
//!
//! Each connection owns a bounded outbound channel. Publishing never waits
//! on a slow socket: a full channel drops the event for that connection.

pub mod handlers;
pub mod message;
pub mod ws;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

pub use message::Event;

use crate::services::auth::{Identity, TokenVerifier};

/// Per-connection outbound queue depth.
pub const OUTBOUND_CAPACITY: usize = 256;

// =============================================================================
// HANDLER REGISTRY
// =============================================================================

/// What a handler sees about the connection that sent the event.
#[derive(Clone)]
pub struct Context {
    pub identity: Identity,
    pub connection_id: Uuid,
    pub hub: Hub,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one inbound event. `Ok(Some(_))` is sent back to the sender;
    /// `Err(message)` becomes an `error` event.
    async fn handle(&self, ctx: &Context, data: Value) -> Result<Option<Event>, String>;
}

#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`. A later registration for the same
    /// name replaces the earlier one.
    #[must_use]
    pub fn on(mut self, event: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        let event = event.into();
        if self.handlers.insert(event.clone(), handler).is_some() {
            warn!(%event, "realtime handler replaced");
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Registry {
        Registry { handlers: self.handlers }
    }
}

/// Immutable event-to-handler table shared by every connection.
pub struct Registry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl Registry {
    #[must_use]
    pub fn get(&self, event: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(event)
    }

    /// Registered event names, sorted.
    #[must_use]
    pub fn events(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// =============================================================================
// HUB
// =============================================================================

/// Streams a connection can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Training,
}

#[derive(Debug)]
pub enum Outbound {
    Event(Event),
    /// Server is going away; send a close frame and stop.
    Close,
}

struct Connection {
    tx: mpsc::Sender<Outbound>,
    topics: HashSet<Topic>,
}

/// user_id -> connection_id -> connection.
type Connections = HashMap<Uuid, HashMap<Uuid, Connection>>;

#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<RwLock<Connections>>,
    /// Set by `close_all`; connections registering afterwards are closed
    /// on arrival.
    closing: Arc<AtomicBool>,
}

impl Hub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: Uuid, connection_id: Uuid, tx: mpsc::Sender<Outbound>) {
        let mut conns = self.inner.write().await;
        if self.closing.load(Ordering::SeqCst) {
            let _ = tx.try_send(Outbound::Close);
        }
        conns
            .entry(user_id)
            .or_default()
            .insert(connection_id, Connection { tx, topics: HashSet::new() });
    }

    pub async fn unregister(&self, user_id: Uuid, connection_id: Uuid) {
        let mut conns = self.inner.write().await;
        if let Some(user_conns) = conns.get_mut(&user_id) {
            user_conns.remove(&connection_id);
            if user_conns.is_empty() {
                conns.remove(&user_id);
            }
        }
    }

    /// Toggle `topic` for one connection. Returns false if the connection
    /// is not registered.
    pub async fn set_subscribed(&self, user_id: Uuid, connection_id: Uuid, topic: Topic, on: bool) -> bool {
        let mut conns = self.inner.write().await;
        let Some(conn) = conns.get_mut(&user_id).and_then(|c| c.get_mut(&connection_id)) else {
            return false;
        };
        if on {
            conn.topics.insert(topic);
        } else {
            conn.topics.remove(&topic);
        }
        true
    }

    /// Deliver `event` to every connection of `user_id` subscribed to
    /// `topic`. Returns how many connections accepted it.
    pub async fn publish(&self, user_id: Uuid, topic: Topic, event: Event) -> usize {
        let conns = self.inner.read().await;
        let Some(user_conns) = conns.get(&user_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (connection_id, conn) in user_conns {
            if !conn.topics.contains(&topic) {
                continue;
            }
            match conn.tx.try_send(Outbound::Event(event.clone())) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(%connection_id, error = %e, "realtime: dropped event"),
            }
        }
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.values().map(HashMap::len).sum()
    }

    /// Ask every open socket to close, including any that upgrade later.
    /// Connections unregister themselves as their loops exit.
    pub async fn close_all(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let conns = self.inner.read().await;
        for conn in conns.values().flat_map(HashMap::values) {
            // A full queue means the socket is stuck; dropping it on exit is fine.
            let _ = conn.tx.try_send(Outbound::Close);
        }
    }
}

// =============================================================================
// GATEWAY STATE
// =============================================================================

/// State behind the `/ws` route.
#[derive(Clone)]
pub struct Gateway {
    pub registry: Arc<Registry>,
    pub hub: Hub,
    pub verifier: Arc<dyn TokenVerifier>,
    /// Exact `Origin` a browser handshake must carry.
    pub allowed_origin: String,
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
