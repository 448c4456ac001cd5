//! Named connections sharing one dispatcher.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::Stream;
use url::Url;

use super::config::Config;
use super::connection::{Connection, ConnectionStatus, SharedCounters};
use super::dispatcher::{Dispatcher, SubscriptionId};
use super::error::WsError;
use super::queue::SendOutcome;
use super::transport::Transport;
use super::types::request::Command;
use super::types::response::{EventType, InboundEvent};
use crate::Result;
use crate::error::Error;

/// Name used when a caller does not pick one.
pub const DEFAULT_CONNECTION: &str = "default";

/// Aggregate counters across every connection of a [`Registry`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Connections currently registered
    pub total_connections: usize,
    /// Retry attempts scheduled since the registry was created
    pub total_reconnections: u64,
    /// Frames written to a transport
    pub messages_sent: u64,
    /// Frames read from a transport
    pub messages_received: u64,
    /// Commands waiting in outbound queues right now
    pub queued_messages: usize,
    /// Commands discarded because an outbound queue overflowed
    pub dropped_messages: u64,
}

/// Owns the set of named connections and the dispatcher their events flow into.
///
/// An application creates one registry at startup and passes it (or clones of it) to the
/// components that need stream access. Clones share connections, subscribers and counters.
///
/// Must be used from within a tokio runtime: opening a connection spawns its worker task.
#[derive(Clone)]
pub struct Registry {
    config: Config,
    transport: Arc<dyn Transport>,
    connections: Arc<DashMap<String, Connection>>,
    dispatcher: Dispatcher,
    counters: Arc<SharedCounters>,
}

impl Registry {
    /// A registry whose connections use `tokio-tungstenite`.
    #[cfg(feature = "tungstenite")]
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_transport(config, super::transport::TungsteniteTransport)
    }

    /// A registry whose connections open through `transport`.
    #[must_use]
    pub fn with_transport<T: Transport>(config: Config, transport: T) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            connections: Arc::new(DashMap::new()),
            dispatcher: Dispatcher::new(),
            counters: Arc::new(SharedCounters::default()),
        }
    }

    /// Open (or reuse) the connection called `name` and start connecting.
    ///
    /// If `name` is already `Connecting` or `Connected`, or a connect on it is still pending,
    /// the existing handle is returned and nothing else happens. A `Disconnected` or `Failed`
    /// connection of that name is replaced.
    pub fn open(&self, name: &str, endpoint: &str) -> Result<Connection> {
        self.open_with(name, endpoint, self.config.clone())
    }

    /// [`open`](Self::open) under [`DEFAULT_CONNECTION`].
    pub fn open_default(&self, endpoint: &str) -> Result<Connection> {
        self.open(DEFAULT_CONNECTION, endpoint)
    }

    /// [`open`](Self::open) with a configuration for this connection only.
    pub fn open_with(&self, name: &str, endpoint: &str, config: Config) -> Result<Connection> {
        if name.is_empty() {
            return Err(Error::validation("connection name must not be empty"));
        }
        let endpoint = Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "unsupported endpoint scheme `{}`, expected ws or wss",
                endpoint.scheme()
            )));
        }

        // The entry guard serializes concurrent opens of the same name, and the connect is
        // requested before it is released so a racing open sees the connection as active.
        match self.connections.entry(name.to_owned()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get();
                if existing.is_active() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        connection = name,
                        state = %existing.state(),
                        "Connection already open, reusing it"
                    );
                    return Ok(existing.clone());
                }

                existing.shutdown();
                let connection = self.spawn(name, endpoint.as_str(), config);
                connection.connect()?;
                entry.insert(connection.clone());
                Ok(connection)
            }
            Entry::Vacant(entry) => {
                let connection = self.spawn(name, endpoint.as_str(), config);
                connection.connect()?;
                entry.insert(connection.clone());
                Ok(connection)
            }
        }
    }

    /// Disconnect and forget the connection called `name`. Returns `false` if there was none.
    pub async fn close(&self, name: &str) -> Result<bool> {
        let Some((_, connection)) = self.connections.remove(name) else {
            return Ok(false);
        };

        let closed = connection.disconnect().await;
        connection.shutdown();
        closed?;

        #[cfg(feature = "tracing")]
        tracing::info!(connection = name, "Connection closed");

        Ok(true)
    }

    /// Close every connection.
    pub async fn close_all(&self) -> Result<()> {
        for name in self.names() {
            self.close(&name).await?;
        }
        Ok(())
    }

    /// Tear the registry down: close every connection and stop its worker.
    pub async fn shutdown(&self) -> Result<()> {
        let closed = self.close_all().await;
        // Workers whose disconnect failed still have to stop.
        for entry in self.connections.iter() {
            entry.value().shutdown();
        }
        self.connections.clear();
        closed
    }

    /// Route a command to the connection called `name`, or [`DEFAULT_CONNECTION`].
    pub fn send(&self, command: Command, name: Option<&str>) -> Result<SendOutcome> {
        let name = name.unwrap_or(DEFAULT_CONNECTION);
        let connection = self
            .connection(name)
            .ok_or_else(|| WsError::UnknownConnection(name.to_owned()))?;

        let outcome = connection.send(command)?;
        if outcome == SendOutcome::Queued {
            #[cfg(feature = "tracing")]
            tracing::debug!(connection = name, "Connection is not up, command queued");
        }
        Ok(outcome)
    }

    #[must_use]
    pub fn connection(&self, name: &str) -> Option<Connection> {
        self.connections.get(name).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn status(&self, name: &str) -> Option<ConnectionStatus> {
        self.connections.get(name).map(|entry| entry.value().status())
    }

    /// Status of every connection, sorted by name.
    #[must_use]
    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        let mut statuses: Vec<_> = self
            .connections
            .iter()
            .map(|entry| entry.value().status())
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Register a callback for one event type, on every connection.
    pub fn subscribe<F>(&self, event_type: EventType, callback: F) -> SubscriptionId
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(event_type, callback)
    }

    /// Register a callback for every event, on every connection.
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe_all(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Stream of every event from every connection.
    pub fn events(&self) -> impl Stream<Item = Result<InboundEvent>> + use<> {
        self.dispatcher.events()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        let (queued_messages, dropped_messages) = self
            .connections
            .iter()
            .map(|entry| entry.value().status())
            .fold((0_usize, 0_u64), |(queued, dropped), status| {
                (
                    queued.saturating_add(status.queued_messages),
                    dropped.saturating_add(status.dropped_messages),
                )
            });

        Stats {
            total_connections: self.connections.len(),
            total_reconnections: self.counters.reconnections.load(Ordering::Relaxed),
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            messages_received: self.counters.messages_received.load(Ordering::Relaxed),
            queued_messages,
            dropped_messages,
        }
    }

    fn names(&self) -> Vec<String> {
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn spawn(&self, name: &str, endpoint: &str, config: Config) -> Connection {
        Connection::spawn(
            name,
            endpoint,
            config,
            Arc::clone(&self.transport),
            self.dispatcher.clone(),
            Arc::clone(&self.counters),
        )
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("connections", &self.names())
            .finish_non_exhaustive()
    }
}
