//! Stream connection demo: opens a connection, subscribes to live alerts and a token, and
//! prints events until interrupted.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,stream_relay=debug cargo run --example stream -- wss://stream.example.com/ws 0xabc
//! ```
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=stream.log RUST_LOG=info cargo run --example stream -- wss://stream.example.com/ws
//! ```

use std::fs::File;
use std::time::Duration;

use futures::StreamExt as _;
use stream_relay::ws::config::{Config, HeartbeatConfig};
use stream_relay::ws::{Command, EventKind, EventType, Registry};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let mut args = std::env::args().skip(1);
    let endpoint = args
        .next()
        .unwrap_or_else(|| "ws://127.0.0.1:8080/ws".to_owned());
    let token = args.next();

    let config = Config::builder()
        .heartbeat(
            HeartbeatConfig::builder()
                .interval(Duration::from_secs(15))
                .max_missed_pongs(3)
                .build(),
        )
        .build();
    let registry = Registry::new(config);

    registry.subscribe(EventType::Heartbeat, |event| {
        if let EventKind::Heartbeat(sample) = &event.kind {
            info!(connection = %event.connection, rtt_ms = sample.rtt_ms(), "heartbeat");
        }
    });
    registry.subscribe(EventType::ReconnectFailed, |event| {
        warn!(connection = %event.connection, "gave up reconnecting");
    });

    let mut events = Box::pin(registry.events());

    registry.open_default(&endpoint)?;
    registry.send(Command::subscribe_channel("live_alerts"), None)?;
    if let Some(token) = token {
        registry.send(Command::subscribe_token(token), None)?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(Ok(event)) => match event.kind.data() {
                    Some(data) => info!(connection = %event.connection, kind = %event.event_type(), %data),
                    None => info!(connection = %event.connection, kind = ?event.kind),
                },
                Some(Err(e)) => warn!(error = %e, "event stream lagged"),
                None => break,
            },
        }
    }

    info!(stats = ?registry.stats(), "shutting down");
    registry.shutdown().await?;

    Ok(())
}
