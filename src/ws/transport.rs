//! Transport seam between the connection worker and the socket implementation.
//!
//! The worker never touches sockets directly: it asks a [`Transport`] to open an endpoint
//! and receives a sink for [`Outgoing`] frames plus a stream of [`TransportEvent`]s. The
//! default implementation, [`TungsteniteTransport`], is backed by `tokio-tungstenite`; tests
//! and embedders can supply any other implementation.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Sink;
use futures::stream::BoxStream;

use super::error::WsError;
use crate::Result;

/// Close code for a normal, intentional closure.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code sent by an endpoint that is going away (server shutdown, page navigation).
pub const GOING_AWAY: u16 = 1001;
/// Close code reported when the stream ended without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Returns `true` for close codes that never trigger reconnection.
#[must_use]
pub const fn is_normal_closure(code: u16) -> bool {
    matches!(code, NORMAL_CLOSURE | GOING_AWAY)
}

/// A frame handed to the transport for sending.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// A text frame carrying one encoded command
    Text(String),
    /// A close frame
    Close {
        /// Close code
        code: u16,
        /// Human-readable close reason
        reason: String,
    },
}

/// Something that happened on an open transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived
    Message(String),
    /// The peer closed the connection
    Closed {
        /// Close code, if the peer sent one
        code: Option<u16>,
        /// Close reason, possibly empty
        reason: String,
    },
    /// The transport failed without a close code
    Error(String),
}

/// Sending half of an open transport.
pub type FrameSink = Pin<Box<dyn Sink<Outgoing, Error = WsError> + Send>>;

/// Receiving half of an open transport.
pub type EventStream = BoxStream<'static, TransportEvent>;

/// Opens connections on behalf of the connection worker.
///
/// The returned stream ending (yielding `None`) is treated as an abnormal closure.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `endpoint`.
    async fn open(&self, endpoint: &str) -> Result<(FrameSink, EventStream)>;
}

#[cfg(feature = "tungstenite")]
pub use self::tungstenite::TungsteniteTransport;

#[cfg(feature = "tungstenite")]
mod tungstenite {
    use async_trait::async_trait;
    use futures::{SinkExt as _, StreamExt as _};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use super::{EventStream, FrameSink, Outgoing, Transport, TransportEvent};
    use crate::Result;
    use crate::ws::error::WsError;

    /// [`Transport`] backed by `tokio-tungstenite` (plain and rustls-secured WebSockets).
    #[non_exhaustive]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct TungsteniteTransport;

    #[async_trait]
    impl Transport for TungsteniteTransport {
        async fn open(&self, endpoint: &str) -> Result<(FrameSink, EventStream)> {
            let (ws_stream, _) = connect_async(endpoint).await?;
            let (write, read) = ws_stream.split();

            let sink = write
                .sink_map_err(WsError::connection)
                .with(|outgoing: Outgoing| async move {
                    Ok::<_, WsError>(match outgoing {
                        Outgoing::Text(text) => Message::Text(text.into()),
                        Outgoing::Close { code, reason } => Message::Close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        })),
                    })
                });

            let events = read.filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => Some(TransportEvent::Message(text.to_string())),
                    Ok(Message::Close(frame)) => Some(match frame {
                        Some(frame) => TransportEvent::Closed {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.to_string(),
                        },
                        None => TransportEvent::Closed {
                            code: None,
                            reason: String::new(),
                        },
                    }),
                    Err(e) => Some(TransportEvent::Error(e.to_string())),
                    // Binary frames are not part of the protocol; control frames are
                    // answered by tungstenite itself.
                    Ok(_) => None,
                }
            });

            Ok((Box::pin(sink), events.boxed()))
        }
    }
}
