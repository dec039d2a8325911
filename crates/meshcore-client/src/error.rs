//! Client error taxonomy.

use thiserror::Error;

use meshcore_protocol::{FirmwareError, ProtocolError};
use meshcore_store::StoreError;

use crate::transport::TransportError;

/// Errors surfaced to callers of the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (disconnect, I/O, write shortfall).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Codec-level failure (malformed or oversized frame).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The firmware answered a request with an ERR response; carries the
    /// error sub-code.
    #[error("device error: {0}")]
    Device(FirmwareError),

    /// Persistence failure.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// The request was still awaiting its response when the link closed.
    #[error("operation cancelled")]
    Cancelled,

    /// Caller-supplied argument was rejected before hitting the wire.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The session has not reached the READY state yet.
    #[error("session not ready")]
    NotReady,
}
