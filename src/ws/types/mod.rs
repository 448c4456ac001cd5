//! Wire types: outbound [`Command`](request::Command)s and inbound events.

pub mod request;
pub mod response;
