use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

/// Target of a subscription. Tokens and channels live in separate key spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Interest<'cmd> {
    Token(&'cmd str),
    Channel(&'cmd str),
}

/// Outbound command sent from the client to the stream server.
///
/// Serialized as a flat JSON object tagged by `type`, e.g.
/// `{"type":"subscribe","token_address":"0xabc"}`.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Heartbeat probe carrying the send time in Unix milliseconds
    Ping { timestamp: i64 },
    /// Register interest in a channel or a token
    Subscribe {
        #[serde(skip_serializing_if = "Option::is_none")]
        subscription: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        token_address: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<Value>,
    },
    /// Remove interest in a token
    Unsubscribe { token_address: String },
    /// Ask the server to stop pushing updates for now
    Pause,
    /// Ask the server to resume pushing updates
    Resume,
    /// Ask the server to push a fresh snapshot
    RequestUpdate { timestamp: i64 },
    /// Generic control command, e.g. starting or stopping a server-side process
    Command {
        command: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl Command {
    /// A `ping` stamped with the current time.
    #[must_use]
    pub fn ping() -> Self {
        Self::Ping {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Subscribe to a named channel (e.g. `live_alerts`).
    #[must_use]
    pub fn subscribe_channel<S: Into<String>>(subscription: S) -> Self {
        Self::Subscribe {
            subscription: Some(subscription.into()),
            token_address: None,
            options: None,
        }
    }

    /// Subscribe to updates for a single token.
    #[must_use]
    pub fn subscribe_token<S: Into<String>>(token_address: S) -> Self {
        Self::Subscribe {
            subscription: None,
            token_address: Some(token_address.into()),
            options: None,
        }
    }

    /// Unsubscribe from updates for a single token.
    #[must_use]
    pub fn unsubscribe_token<S: Into<String>>(token_address: S) -> Self {
        Self::Unsubscribe {
            token_address: token_address.into(),
        }
    }

    /// A `request_update` stamped with the current time.
    #[must_use]
    pub fn request_update() -> Self {
        Self::RequestUpdate {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// A generic control command without extra fields.
    #[must_use]
    pub fn control<S: Into<String>>(command: S) -> Self {
        Self::Command {
            command: command.into(),
            extra: Map::new(),
        }
    }

    /// Attach subscription options. No-op for anything but `subscribe`.
    #[must_use]
    pub fn with_options(mut self, value: Value) -> Self {
        if let Self::Subscribe { options, .. } = &mut self {
            *options = Some(value);
        }
        self
    }

    /// Attach an extra field to a generic control command. No-op for other commands.
    #[must_use]
    pub fn with_field<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        if let Self::Command { extra, .. } = &mut self {
            extra.insert(key.into(), value);
        }
        self
    }

    /// The wire `type` of this command.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ping { .. } => "ping",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::RequestUpdate { .. } => "request_update",
            Self::Command { .. } => "command",
        }
    }

    #[must_use]
    pub const fn is_ping(&self) -> bool {
        matches!(self, Self::Ping { .. })
    }

    /// What a `subscribe`/`unsubscribe` targets, used to replay subscriptions after a
    /// reconnect.
    pub(crate) fn interest(&self) -> Option<Interest<'_>> {
        match self {
            Self::Subscribe {
                token_address: Some(address),
                ..
            }
            | Self::Unsubscribe {
                token_address: address,
            } => Some(Interest::Token(address)),
            Self::Subscribe {
                subscription: Some(subscription),
                ..
            } => Some(Interest::Channel(subscription)),
            _ => None,
        }
    }

    /// Encode this command into a wire frame.
    pub fn encode(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
