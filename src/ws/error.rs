#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error reported by the underlying transport
    Connection(Box<dyn StdError + Send + Sync + 'static>),
    /// The transport did not signal open within the connect timeout
    ConnectionTimeout(Duration),
    /// The transport closed with a non-normal code or failed without one
    AbnormalClosure {
        /// Close code, if the transport provided one
        code: Option<u16>,
        /// Close reason, possibly empty
        reason: String,
    },
    /// The reconnect scheduler exhausted its attempts
    MaxRetriesExceeded {
        /// Number of retries that were made
        attempts: u32,
    },
    /// Error parsing a WebSocket message
    MessageParse(serde_json::Error),
    /// Received an invalid or unexpected message
    InvalidMessage(String),
    /// No connection is registered under the given name
    UnknownConnection(String),
    /// The connection worker has shut down
    ConnectionClosed,
    /// Event stream lagged and missed messages
    Lagged {
        /// Number of messages that were missed
        count: u64,
    },
}

impl WsError {
    /// Wrap any transport-level error.
    pub fn connection<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self::Connection(Box::new(error))
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::ConnectionTimeout(after) => {
                write!(f, "WebSocket connection timed out after {after:?}")
            }
            Self::AbnormalClosure {
                code: Some(code),
                reason,
            } => write!(f, "WebSocket closed abnormally ({code}): {reason}"),
            Self::AbnormalClosure { code: None, reason } => {
                write!(f, "WebSocket closed abnormally: {reason}")
            }
            Self::MaxRetriesExceeded { attempts } => {
                write!(f, "Reconnection failed after {attempts} attempts")
            }
            Self::MessageParse(e) => write!(f, "Failed to parse WebSocket message: {e}"),
            Self::InvalidMessage(msg) => write!(f, "Invalid WebSocket message: {msg}"),
            Self::UnknownConnection(name) => write!(f, "No connection named `{name}`"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::Lagged { count } => write!(f, "Event stream lagged, missed {count} messages"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e.as_ref()),
            Self::MessageParse(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

#[cfg(feature = "tungstenite")]
impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::connection(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Kind;

    #[test]
    fn abnormal_closure_display_includes_code() {
        let error = WsError::AbnormalClosure {
            code: Some(1006),
            reason: "stream ended".to_owned(),
        };

        assert_eq!(
            error.to_string(),
            "WebSocket closed abnormally (1006): stream ended"
        );
    }

    #[test]
    fn ws_error_converts_to_websocket_kind() {
        let error: crate::error::Error = WsError::MaxRetriesExceeded { attempts: 5 }.into();

        assert_eq!(error.kind(), Kind::WebSocket);
        assert!(matches!(
            error.downcast_ref::<WsError>(),
            Some(WsError::MaxRetriesExceeded { attempts: 5 })
        ));
    }
}
