#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Deeply nested uses in sub-modules are falsely flagged as being unused"
)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc as chan;
use futures::{SinkExt as _, StreamExt as _};
use serde_json::Value;
use stream_relay::Result;
use stream_relay::ws::{
    Connection, ConnectionState, EventStream, EventType, FrameSink, InboundEvent, Outgoing,
    Registry, Transport, TransportEvent, WsError,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};

pub const ENDPOINT: &str = "ws://stream.test/ws";

/// How the next `open` call behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Open succeeds and hands a [`Link`] to the test
    Accept,
    /// Open fails immediately
    Refuse,
    /// Open never completes
    Hang,
}

/// The test's end of one accepted transport.
pub struct Link {
    frames: chan::UnboundedReceiver<Outgoing>,
    events: chan::UnboundedSender<TransportEvent>,
}

impl Link {
    pub async fn next_frame(&mut self) -> Outgoing {
        timeout(Duration::from_secs(3600), self.frames.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("transport sink dropped")
    }

    /// Next text frame, parsed as JSON.
    pub async fn next_command(&mut self) -> Value {
        match self.next_frame().await {
            Outgoing::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    /// Next text frame that is not a heartbeat `ping`.
    pub async fn next_non_ping(&mut self) -> Value {
        loop {
            let command = self.next_command().await;
            if command["type"] != "ping" {
                return command;
            }
        }
    }

    pub fn push(&self, text: &str) {
        self.events
            .unbounded_send(TransportEvent::Message(text.to_owned()))
            .unwrap();
    }

    pub fn close(&self, code: u16) {
        self.events
            .unbounded_send(TransportEvent::Closed {
                code: Some(code),
                reason: String::new(),
            })
            .unwrap();
    }

    pub fn fail(&self, message: &str) {
        self.events
            .unbounded_send(TransportEvent::Error(message.to_owned()))
            .unwrap();
    }
}

struct Script {
    plans: VecDeque<Plan>,
    opens: Vec<Instant>,
}

/// In-memory [`Transport`] driven by a queue of [`Plan`]s. Unscripted opens are accepted.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    links_tx: mpsc::UnboundedSender<Link>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Link>) {
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        let transport = Self {
            script: Arc::new(Mutex::new(Script {
                plans: VecDeque::new(),
                opens: Vec::new(),
            })),
            links_tx,
        };
        (transport, links_rx)
    }

    pub fn plan<I: IntoIterator<Item = Plan>>(&self, plans: I) {
        self.script.lock().unwrap().plans.extend(plans);
    }

    /// Time of every `open` call so far.
    pub fn opens(&self) -> Vec<Instant> {
        self.script.lock().unwrap().opens.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _endpoint: &str) -> Result<(FrameSink, EventStream)> {
        let plan = {
            let mut script = self.script.lock().unwrap();
            script.opens.push(Instant::now());
            script.plans.pop_front().unwrap_or(Plan::Accept)
        };

        match plan {
            Plan::Accept => {
                let (frames_tx, frames_rx) = chan::unbounded();
                let (events_tx, events_rx) = chan::unbounded();
                self.links_tx
                    .send(Link {
                        frames: frames_rx,
                        events: events_tx,
                    })
                    .unwrap();

                let sink: FrameSink = Box::pin(frames_tx.sink_map_err(WsError::connection));
                Ok((sink, events_rx.boxed()))
            }
            Plan::Refuse => Err(WsError::connection(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))
            .into()),
            Plan::Hang => futures::future::pending().await,
        }
    }
}

pub async fn wait_for_state(connection: &Connection, state: ConnectionState) {
    let mut status = connection.status_receiver();
    timeout(Duration::from_secs(3600), status.wait_for(|s| s.state == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
        .unwrap();
}

/// Record every dispatched event.
pub fn record(registry: &Registry) -> Arc<Mutex<Vec<InboundEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    registry.subscribe_all(move |event: &InboundEvent| sink.lock().unwrap().push(event.clone()));
    log
}

pub fn count(log: &Mutex<Vec<InboundEvent>>, event_type: EventType) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|event| event.event_type() == event_type)
        .count()
}

pub fn types(log: &Mutex<Vec<InboundEvent>>) -> Vec<EventType> {
    log.lock().unwrap().iter().map(InboundEvent::event_type).collect()
}
