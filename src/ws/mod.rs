//! Realtime stream connections.
//!
//! # Architecture
//!
//! - [`Registry`]: named connections sharing one [`Dispatcher`]
//! - [`Connection`]: handle to a per-connection worker task that owns the transport, the
//!   outbound queue, the reconnect scheduler and the heartbeat monitor
//! - [`Dispatcher`]: routes decoded [`InboundEvent`]s to callbacks and streams
//! - [`Transport`]: the seam to the socket implementation
//!
//! # Example
//!
//! ```ignore
//! let registry = Registry::new(Config::default());
//! registry.subscribe(EventType::PriceUpdate, |event| println!("{:?}", event.kind));
//!
//! registry.open_default("wss://stream.example.com/ws")?;
//! registry.send(Command::subscribe_token("0xabc"), None)?;
//! ```

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod queue;
pub mod reconnect;
pub mod registry;
pub mod transport;
pub mod types;

pub use config::{Config, HeartbeatConfig, QueueConfig, ReconnectConfig};
pub use connection::{Connection, ConnectionState, ConnectionStatus};
pub use dispatcher::{Dispatcher, SubscriptionId};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use heartbeat::HeartbeatSample;
pub use queue::SendOutcome;
pub use registry::{DEFAULT_CONNECTION, Registry, Stats};
#[cfg(feature = "tungstenite")]
pub use transport::TungsteniteTransport;
pub use transport::{EventStream, FrameSink, Outgoing, Transport, TransportEvent};
pub use types::request::Command;
pub use types::response::{EventKind, EventType, InboundEvent, decode};
