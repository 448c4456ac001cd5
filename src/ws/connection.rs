#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

//! A single managed stream connection.
//!
//! [`Connection`] is a cheap handle to a background worker task. The worker owns the transport,
//! the outbound queue, the reconnect scheduler and the heartbeat monitor; the handle talks to it
//! over a command channel and observes it through a `watch` channel carrying
//! [`ConnectionStatus`]. All state transitions happen on the worker task, one at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use backoff::backoff::Backoff as _;
use chrono::{DateTime, Utc};
use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use super::config::Config;
use super::dispatcher::Dispatcher;
use super::error::WsError;
use super::heartbeat::{HeartbeatMonitor, HeartbeatSample, Tick};
use super::queue::{OutboundMessage, OutboundQueue, SendOutcome};
use super::reconnect::ReconnectScheduler;
use super::transport::{
    ABNORMAL_CLOSURE, EventStream, FrameSink, NORMAL_CLOSURE, Outgoing, Transport, TransportEvent,
    is_normal_closure,
};
use super::types::request::Command;
use super::types::response::{EventKind, InboundEvent, decode};
use crate::Result;

/// Close code sent when the heartbeat monitor gives up on the peer.
pub const HEARTBEAT_TIMEOUT_CLOSE: u16 = 4000;

/// Lifecycle state of a [`Connection`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected and not trying to connect
    Disconnected,
    /// A transport is being opened
    Connecting,
    /// The transport is open and frames flow both ways
    Connected,
    /// An explicit disconnect is waiting for the close to complete
    Closing,
    /// Reconnection gave up; only an explicit `connect` or `force_reconnect` leaves this state
    Failed,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// `true` while a transport is open or being opened.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// Point-in-time view of a connection.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    pub name: String,
    pub endpoint: String,
    pub state: ConnectionState,
    /// Retry attempts since the last successful open
    pub reconnect_attempts: u32,
    /// Delay of the pending retry, if one is scheduled
    pub next_retry_in: Option<Duration>,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_disconnected_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<HeartbeatSample>,
    pub queued_messages: usize,
    pub dropped_messages: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

impl ConnectionStatus {
    fn new(name: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_owned(),
            endpoint: endpoint.to_owned(),
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            next_retry_in: None,
            last_connected_at: None,
            last_disconnected_at: None,
            last_heartbeat: None,
            queued_messages: 0,
            dropped_messages: 0,
            messages_sent: 0,
            messages_received: 0,
        }
    }
}

/// Counters aggregated across every connection of a registry.
#[derive(Debug, Default)]
pub(crate) struct SharedCounters {
    pub(crate) reconnections: AtomicU64,
    pub(crate) messages_sent: AtomicU64,
    pub(crate) messages_received: AtomicU64,
}

impl SharedCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
enum Control {
    Connect,
    ForceReconnect,
    Send(OutboundMessage),
    Disconnect(oneshot::Sender<()>),
}

/// Handle to a managed connection. Cheap to clone; clones drive the same worker.
#[derive(Debug, Clone)]
pub struct Connection {
    name: String,
    control_tx: mpsc::UnboundedSender<Control>,
    status_rx: watch::Receiver<ConnectionStatus>,
    /// Set by `connect` until the worker has published `Connecting` (or found it already active)
    connect_requested: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Spawn the worker for a new connection. The connection starts `Disconnected`.
    pub(crate) fn spawn(
        name: &str,
        endpoint: &str,
        config: Config,
        transport: Arc<dyn Transport>,
        dispatcher: Dispatcher,
        counters: Arc<SharedCounters>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::new(name, endpoint));
        let shutdown = CancellationToken::new();
        let connect_requested = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            name: name.to_owned(),
            endpoint: endpoint.to_owned(),
            queue: OutboundQueue::new(config.queue.capacity),
            scheduler: ReconnectScheduler::new(config.reconnect.clone()),
            heartbeat: HeartbeatMonitor::new(&config.heartbeat),
            config,
            transport,
            dispatcher,
            counters,
            control_rx,
            status_tx,
            shutdown: shutdown.clone(),
            connect_requested: Arc::clone(&connect_requested),
            interests: Vec::new(),
            has_connected: false,
        };
        tokio::spawn(worker.run());

        Self {
            name: name.to_owned(),
            control_tx,
            status_rx,
            connect_requested,
            shutdown,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start connecting. A no-op while `Connecting` or `Connected`; cancels a pending retry
    /// timer and attempts at once.
    pub fn connect(&self) -> Result<()> {
        self.connect_requested.store(true, Ordering::Release);
        self.control(Control::Connect)
    }

    /// Drop the current transport (if any), reset the retry counter and connect immediately.
    pub fn force_reconnect(&self) -> Result<()> {
        self.connect_requested.store(true, Ordering::Release);
        self.control(Control::ForceReconnect)
    }

    /// Close the connection with code 1000 and wait until it is `Disconnected`.
    ///
    /// Pending retries are cancelled and no reconnection follows. Queued messages are kept and
    /// go out on the next successful connect.
    pub async fn disconnect(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.control(Control::Disconnect(done_tx))?;
        done_rx.await.map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Send a command, or queue it while the connection is down.
    ///
    /// A `ping` issued while disconnected is skipped rather than queued.
    ///
    /// The outcome reflects the published state at the time of the call. A link that drops
    /// before the worker picks the command up still reports [`SendOutcome::Sent`]; the worker
    /// then queues the command and delivers it after the next successful connect.
    pub fn send(&self, command: Command) -> Result<SendOutcome> {
        let connected = self.state().is_connected();
        if !connected && command.is_ping() {
            return Ok(SendOutcome::Skipped);
        }

        self.control(Control::Send(OutboundMessage::new(command)))?;

        Ok(if connected {
            SendOutcome::Sent
        } else {
            SendOutcome::Queued
        })
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status_rx.borrow().state
    }

    /// `true` while the connection is `Connecting` or `Connected`, or a connect has been
    /// requested that the worker has not picked up yet.
    #[must_use]
    pub fn is_active(&self) -> bool {
        // The flag is cleared only after `Connecting` is published, so read it first.
        self.connect_requested.load(Ordering::Acquire) || self.state().is_active()
    }

    /// A receiver notified on every status change.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Stop the worker without waiting for a close handshake.
    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn control(&self, control: Control) -> Result<()> {
        self.control_tx
            .send(control)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }
}

/// What the worker does next.
#[derive(Debug)]
enum Phase {
    /// Wait for a command (`Disconnected` or `Failed`)
    Idle,
    /// Open the transport now
    Connect,
    /// Wait out a retry delay, then open the transport
    Backoff(Duration),
    Exit,
}

struct Worker {
    name: String,
    endpoint: String,
    config: Config,
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    counters: Arc<SharedCounters>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    status_tx: watch::Sender<ConnectionStatus>,
    shutdown: CancellationToken,
    connect_requested: Arc<AtomicBool>,
    queue: OutboundQueue,
    scheduler: ReconnectScheduler,
    heartbeat: HeartbeatMonitor,
    /// Subscriptions delivered on the current or a previous transport, replayed on reconnect
    interests: Vec<Command>,
    has_connected: bool,
}

impl Worker {
    async fn run(mut self) {
        let mut phase = Phase::Idle;

        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Connect => self.attempt().await,
                Phase::Backoff(delay) => self.backoff(delay).await,
                Phase::Exit => break,
            };
        }

        self.connect_acknowledged();

        self.update(|status| {
            status.state = ConnectionState::Disconnected;
            status.next_retry_in = None;
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(connection = %self.name, "Connection worker stopped");
    }

    /// `Disconnected` or `Failed`: nothing happens until a command arrives.
    async fn idle(&mut self) -> Phase {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return Phase::Exit,
                control = self.control_rx.recv() => match control {
                    None => return Phase::Exit,
                    Some(Control::Connect | Control::ForceReconnect) => {
                        // Leaving `Failed` is a manual reconnect and starts a fresh budget.
                        if self.state() == ConnectionState::Failed {
                            self.reset_attempts();
                        }
                        return Phase::Connect;
                    }
                    Some(Control::Send(message)) => self.enqueue(message),
                    Some(Control::Disconnect(done)) => {
                        if self.state() == ConnectionState::Failed {
                            self.set_state(ConnectionState::Closing);
                        }
                        self.finish_disconnect(done);
                    }
                },
            }
        }
    }

    /// `Connecting`: open the transport, bounded by the connect timeout.
    async fn attempt(&mut self) -> Phase {
        self.update(|status| {
            status.state = ConnectionState::Connecting;
            status.next_retry_in = None;
        });
        self.connect_acknowledged();

        #[cfg(feature = "tracing")]
        tracing::info!(
            connection = %self.name,
            endpoint = %self.endpoint,
            attempt = self.scheduler.attempts(),
            "Connecting"
        );

        let transport = Arc::clone(&self.transport);
        let endpoint = self.endpoint.clone();
        let connect_timeout = self.config.connect_timeout;
        let open = timeout(connect_timeout, async move { transport.open(&endpoint).await });
        tokio::pin!(open);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return Phase::Exit,
                control = self.control_rx.recv() => match control {
                    None => return Phase::Exit,
                    Some(Control::Connect) => self.connect_acknowledged(),
                    Some(Control::ForceReconnect) => {
                        self.reset_attempts();
                        return Phase::Connect;
                    }
                    Some(Control::Send(message)) => self.enqueue(message),
                    Some(Control::Disconnect(done)) => {
                        self.set_state(ConnectionState::Closing);
                        self.finish_disconnect(done);
                        return Phase::Idle;
                    }
                },
                opened = &mut open => {
                    return match opened {
                        Ok(Ok((sink, events))) => self.connected(sink, events).await,
                        Ok(Err(e)) => self.on_failure(&e.to_string()),
                        Err(_elapsed) => {
                            let error = WsError::ConnectionTimeout(connect_timeout);
                            self.on_failure(&error.to_string())
                        }
                    };
                }
            }
        }
    }

    /// Waiting to retry. `connect` skips the wait; `disconnect` cancels it.
    async fn backoff(&mut self, delay: Duration) -> Phase {
        let retry = sleep(delay);
        tokio::pin!(retry);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return Phase::Exit,
                control = self.control_rx.recv() => match control {
                    None => return Phase::Exit,
                    Some(Control::Connect) => return Phase::Connect,
                    Some(Control::ForceReconnect) => {
                        self.reset_attempts();
                        return Phase::Connect;
                    }
                    Some(Control::Send(message)) => self.enqueue(message),
                    Some(Control::Disconnect(done)) => {
                        self.set_state(ConnectionState::Closing);
                        self.finish_disconnect(done);
                        return Phase::Idle;
                    }
                },
                () = &mut retry => return Phase::Connect,
            }
        }
    }

    /// `Connected`: pump frames until the transport closes or a command ends the session.
    async fn connected(&mut self, mut sink: FrameSink, mut events: EventStream) -> Phase {
        self.scheduler.reset();
        self.heartbeat.reset();
        self.update(|status| {
            status.state = ConnectionState::Connected;
            status.reconnect_attempts = 0;
            status.next_retry_in = None;
            status.last_connected_at = Some(Utc::now());
        });

        #[cfg(feature = "tracing")]
        tracing::info!(connection = %self.name, "Connected");

        self.emit(EventKind::Connected);

        if self.has_connected && self.config.resubscribe_on_reconnect {
            for command in self.interests.clone() {
                if let Err(e) = self.deliver(&mut sink, &command).await {
                    return self.on_error(&e.to_string());
                }
            }
        }
        self.has_connected = true;

        while let Some(message) = self.queue.pop() {
            if let Err(e) = self.deliver(&mut sink, &message.command).await {
                self.queue.requeue_front(message);
                self.sync_queue();
                return self.on_error(&e.to_string());
            }
        }
        self.sync_queue();

        let mut ticker = self.heartbeat.ticker();

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    close(&mut sink, NORMAL_CLOSURE, "shutdown").await;
                    return Phase::Exit;
                }
                event = events.next() => match event {
                    Some(TransportEvent::Message(text)) => self.on_frame(&text),
                    Some(TransportEvent::Closed { code, reason }) => {
                        if code.is_some_and(is_normal_closure) {
                            self.on_closed_normally(code, reason);
                            return Phase::Idle;
                        }
                        return self.on_lost(Some(code.unwrap_or(ABNORMAL_CLOSURE)), &reason);
                    }
                    Some(TransportEvent::Error(message)) => return self.on_error(&message),
                    None => return self.on_lost(Some(ABNORMAL_CLOSURE), "stream ended"),
                },
                control = self.control_rx.recv() => match control {
                    None => {
                        close(&mut sink, NORMAL_CLOSURE, "shutdown").await;
                        return Phase::Exit;
                    }
                    Some(Control::Connect) => self.connect_acknowledged(),
                    Some(Control::ForceReconnect) => {
                        close(&mut sink, NORMAL_CLOSURE, "reconnect requested").await;
                        self.mark_disconnected(
                            Some(NORMAL_CLOSURE),
                            "reconnect requested".to_owned(),
                        );
                        self.reset_attempts();
                        return Phase::Connect;
                    }
                    Some(Control::Send(message)) => {
                        if let Err(e) = self.deliver(&mut sink, &message.command).await {
                            self.enqueue(message);
                            return self.on_error(&e.to_string());
                        }
                    }
                    Some(Control::Disconnect(done)) => {
                        self.close_gracefully(&mut sink, &mut events).await;
                        self.finish_disconnect(done);
                        return Phase::Idle;
                    }
                },
                _ = ticker.tick() => match self.heartbeat.on_tick() {
                    Tick::Ping(ping) => {
                        if let Err(e) = self.deliver(&mut sink, &ping).await {
                            return self.on_error(&e.to_string());
                        }
                    }
                    Tick::Expired { missed } => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            connection = %self.name,
                            missed,
                            "Heartbeat timeout, recycling connection"
                        );
                        #[cfg(not(feature = "tracing"))]
                        let _ = missed;

                        close(&mut sink, HEARTBEAT_TIMEOUT_CLOSE, "heartbeat timeout").await;
                        return self.on_lost(Some(HEARTBEAT_TIMEOUT_CLOSE), "heartbeat timeout");
                    }
                },
            }
        }
    }

    /// Send close 1000 and wait (bounded) for the peer to confirm.
    async fn close_gracefully(&mut self, sink: &mut FrameSink, events: &mut EventStream) {
        self.set_state(ConnectionState::Closing);
        close(sink, NORMAL_CLOSURE, "client disconnect").await;

        let close_timeout = self.config.close_timeout;
        let confirmed = timeout(close_timeout, async {
            while let Some(event) = events.next().await {
                match event {
                    TransportEvent::Message(text) => self.on_frame(&text),
                    TransportEvent::Closed { .. } | TransportEvent::Error(_) => break,
                }
            }
        })
        .await;

        if confirmed.is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                connection = %self.name,
                "Close not confirmed in time, dropping transport"
            );
        }

        self.heartbeat.reset();
        self.update(|status| status.last_disconnected_at = Some(Utc::now()));
        self.emit(EventKind::Disconnected {
            code: Some(NORMAL_CLOSURE),
            reason: "client disconnect".to_owned(),
        });
    }

    /// Complete an explicit disconnect: `Disconnected`, no retry pending, attempts cleared.
    fn finish_disconnect(&mut self, done: oneshot::Sender<()>) {
        self.reset_attempts();
        self.set_state(ConnectionState::Disconnected);

        #[cfg(feature = "tracing")]
        tracing::info!(connection = %self.name, "Disconnected");

        _ = done.send(());
    }

    fn on_closed_normally(&mut self, code: Option<u16>, reason: String) {
        #[cfg(feature = "tracing")]
        tracing::info!(connection = %self.name, ?code, %reason, "Server closed the connection");

        self.mark_disconnected(code, reason);
    }

    /// The peer closed an established transport with an abnormal code.
    fn on_lost(&mut self, code: Option<u16>, reason: &str) -> Phase {
        self.mark_disconnected(code, reason.to_owned());
        let error = WsError::AbnormalClosure {
            code,
            reason: reason.to_owned(),
        };
        self.report(&error.to_string());
        self.retry_or_fail()
    }

    /// An established transport failed without a close code.
    fn on_error(&mut self, message: &str) -> Phase {
        self.report(message);
        self.mark_disconnected(None, message.to_owned());
        self.retry_or_fail()
    }

    /// An attempt failed before the transport opened.
    fn on_failure(&mut self, message: &str) -> Phase {
        self.report(message);
        self.retry_or_fail()
    }

    fn mark_disconnected(&mut self, code: Option<u16>, reason: String) {
        self.heartbeat.reset();
        self.update(|status| {
            status.state = ConnectionState::Disconnected;
            status.last_disconnected_at = Some(Utc::now());
        });
        self.emit(EventKind::Disconnected { code, reason });
    }

    fn report(&self, message: &str) {
        #[cfg(feature = "tracing")]
        tracing::warn!(connection = %self.name, error = %message, "Connection failed");

        self.emit(EventKind::TransportError {
            message: message.to_owned(),
        });
    }

    /// Schedule the next retry, or give up and enter `Failed`.
    fn retry_or_fail(&mut self) -> Phase {
        if let Some(delay) = self.scheduler.next_backoff() {
            let attempt = self.scheduler.attempts();
            SharedCounters::bump(&self.counters.reconnections);
            self.update(|status| {
                status.state = ConnectionState::Disconnected;
                status.reconnect_attempts = attempt;
                status.next_retry_in = Some(delay);
            });

            #[cfg(feature = "tracing")]
            tracing::info!(connection = %self.name, attempt, ?delay, "Scheduling reconnect");

            self.emit(EventKind::Reconnecting { attempt, delay });
            Phase::Backoff(delay)
        } else {
            let attempts = self.scheduler.attempts();
            self.update(|status| {
                status.state = ConnectionState::Failed;
                status.next_retry_in = None;
            });

            #[cfg(feature = "tracing")]
            {
                let error = WsError::MaxRetriesExceeded { attempts };
                tracing::error!(connection = %self.name, %error, "Giving up on connection");
            }

            self.emit(EventKind::ReconnectFailed { attempts });
            Phase::Idle
        }
    }

    fn on_frame(&mut self, text: &str) {
        SharedCounters::bump(&self.counters.messages_received);
        self.update(|status| {
            status.messages_received = status.messages_received.saturating_add(1);
        });

        #[cfg(feature = "tracing")]
        tracing::trace!(connection = %self.name, %text, "Received frame");

        let kinds = match decode(text.as_bytes()) {
            Ok(kinds) => kinds,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    connection = %self.name,
                    %text,
                    error = %e,
                    "Failed to parse frame"
                );
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                return;
            }
        };

        for kind in kinds {
            let pong = match kind {
                EventKind::Pong { timestamp } => Some(timestamp),
                _ => None,
            };
            self.emit(kind);

            if let Some(timestamp) = pong
                && let Some(sample) = self.heartbeat.on_pong(timestamp)
            {
                self.update(|status| status.last_heartbeat = Some(sample));
                self.emit(EventKind::Heartbeat(sample));
            }
        }
    }

    /// Write one command to the transport.
    ///
    /// Only transport failures are returned; a command that cannot be encoded is logged and
    /// discarded.
    async fn deliver(
        &mut self,
        sink: &mut FrameSink,
        command: &Command,
    ) -> std::result::Result<(), WsError> {
        let frame = match command.encode() {
            Ok(frame) => frame,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(
                    connection = %self.name,
                    kind = command.kind(),
                    error = %e,
                    "Unable to encode command"
                );
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                return Ok(());
            }
        };

        sink.send(Outgoing::Text(frame)).await?;

        SharedCounters::bump(&self.counters.messages_sent);
        self.update(|status| {
            status.messages_sent = status.messages_sent.saturating_add(1);
        });
        self.remember(command);
        Ok(())
    }

    /// Track delivered subscriptions so they can be replayed after a reconnect.
    fn remember(&mut self, command: &Command) {
        let Some(target) = command.interest() else {
            return;
        };

        match command {
            Command::Subscribe { .. } => {
                if let Some(existing) = self
                    .interests
                    .iter_mut()
                    .find(|interest| interest.interest() == Some(target))
                {
                    existing.clone_from(command);
                } else {
                    self.interests.push(command.clone());
                }
            }
            Command::Unsubscribe { .. } => {
                self.interests
                    .retain(|interest| interest.interest() != Some(target));
            }
            _ => {}
        }
    }

    fn enqueue(&mut self, message: OutboundMessage) {
        if message.command.is_ping() {
            return;
        }

        if let Some(evicted) = self.queue.push(message) {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                connection = %self.name,
                kind = evicted.command.kind(),
                "Outbound queue full, dropped oldest message"
            );
            #[cfg(not(feature = "tracing"))]
            let _ = &evicted;
        }
        self.sync_queue();
    }

    fn sync_queue(&self) {
        let queued = self.queue.len();
        let dropped = self.queue.dropped();
        self.update(|status| {
            status.queued_messages = queued;
            status.dropped_messages = dropped;
        });
    }

    fn connect_acknowledged(&self) {
        self.connect_requested.store(false, Ordering::Release);
    }

    fn reset_attempts(&mut self) {
        self.scheduler.reset();
        self.update(|status| {
            status.reconnect_attempts = 0;
            status.next_retry_in = None;
        });
    }

    fn state(&self) -> ConnectionState {
        self.status_tx.borrow().state
    }

    fn set_state(&self, state: ConnectionState) {
        self.update(|status| {
            status.state = state;
            if state == ConnectionState::Disconnected {
                status.next_retry_in = None;
            }
        });
    }

    fn update<F: FnOnce(&mut ConnectionStatus)>(&self, modify: F) {
        self.status_tx.send_modify(modify);
    }

    fn emit(&self, kind: EventKind) {
        self.dispatcher
            .dispatch(&InboundEvent::new(self.name.as_str(), kind));
    }
}

async fn close(sink: &mut FrameSink, code: u16, reason: &str) {
    let frame = Outgoing::Close {
        code,
        reason: reason.to_owned(),
    };
    if let Err(e) = sink.send(frame).await {
        #[cfg(feature = "tracing")]
        tracing::debug!(error = %e, "Unable to send close frame");
        #[cfg(not(feature = "tracing"))]
        let _ = &e;
    }
}
