//! Transport capability shared by the serial and BLE links.
//!
//! A transport delivers whole frames in (through the [`LinkEvent`] channel
//! handed to it at construction) and accepts whole frames out (through
//! [`FrameSink::send_frame`]). Higher layers depend on this capability only,
//! never on a concrete link type, and frames crossing it are already
//! stripped of any medium-specific envelope.

use thiserror::Error;

/// Connection state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No medium held.
    Disconnected,
    /// Acquiring the medium.
    Connecting,
    /// Frames can flow.
    Connected,
    /// The medium failed; an explicit reopen is required.
    Error,
}

/// Category attached to asynchronous transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkErrorKind {
    /// The peer went away.
    Disconnect,
    /// Read or write failure on the medium.
    Io,
    /// Framing-level problem on the inbound stream.
    Framing,
}

/// Asynchronous outputs of a transport, in arrival order.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The link changed state.
    State(LinkState),
    /// A whole frame arrived (envelope already stripped).
    Frame(Vec<u8>),
    /// Something went wrong on the link.
    Error {
        /// Error category.
        kind: LinkErrorKind,
        /// Human-readable description.
        message: String,
    },
}

/// Errors returned by synchronous transport operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The link is not in the Connected state.
    #[error("link not open")]
    NotOpen,

    /// Frame exceeds the protocol maximum.
    #[error("frame too large: maximum {max} bytes, got {actual}")]
    FrameTooLarge {
        /// Maximum frame size.
        max: usize,
        /// Attempted frame size.
        actual: usize,
    },

    /// The medium accepted fewer bytes than the frame required.
    #[error("incomplete write: {written} of {expected} bytes")]
    WriteIncomplete {
        /// Bytes the medium took.
        written: usize,
        /// Bytes required.
        expected: usize,
    },

    /// The outbound buffer is full; the medium is not draining.
    #[error("transmit buffer full")]
    Busy,

    /// The link's worker tasks have shut down.
    #[error("link closed")]
    Closed,
}

/// Frame-level send capability realized by both concrete links.
pub trait FrameSink: Send {
    /// Enqueue one frame for transmission.
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Current link state.
    fn state(&self) -> LinkState;

    /// Release the medium. Idempotent; always ends in Disconnected.
    fn close(&mut self);
}
