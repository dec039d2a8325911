//! Events broadcast to client subscribers.

use std::sync::Arc;

use meshcore_protocol::{Channel, Contact, Message, PublicKey};

use crate::error::ClientError;

/// Everything a subscriber can observe about a session, delivered in
/// arrival order through a broadcast channel.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The transport reached the Connected state.
    Connected,
    /// The transport was closed or lost.
    Disconnected,
    /// The init sequence finished; the session is READY.
    InitComplete,
    /// A contact arrived from the device (sync or explicit request).
    ContactReceived(Contact),
    /// The contact set changed.
    ContactsUpdated,
    /// A contact was removed.
    ContactRemoved(PublicKey),
    /// Channel discovery surfaced a non-empty slot.
    ChannelDiscovered(Channel),
    /// The channel list changed (discovery finished or a slot was written).
    ChannelListUpdated,
    /// A message was received (and persisted, when enabled).
    MessageReceived(Message),
    /// The device's offline queue is empty.
    NoMoreMessages,
    /// The device accepted a message for transmission.
    MessageSent,
    /// A previously sent message was acknowledged end-to-end.
    SendConfirmed {
        /// ACK hash being confirmed.
        ack_hash: u32,
        /// Round-trip time in milliseconds.
        trip_time_ms: u32,
    },
    /// Routing path to a contact changed.
    PathUpdated {
        /// The affected contact, when the firmware included it.
        public_key: Option<PublicKey>,
    },
    /// The device reported its clock.
    DeviceTime {
        /// Unix timestamp in seconds.
        time_secs: u32,
    },
    /// Raw RX log entry for sniffer-style tooling.
    RawRx {
        /// SNR in dB.
        snr: f32,
        /// RSSI in dBm.
        rssi: i8,
        /// Raw packet bytes.
        raw: Vec<u8>,
    },
    /// A request failed: the firmware answered it with ERR (carrying the
    /// error sub-code as [`ClientError::Device`]), or the link closed while
    /// it was still pending ([`ClientError::Cancelled`]).
    RequestFailed {
        /// Opcode of the outgoing command the failure binds to, when the
        /// session had one pending.
        request: Option<u8>,
        /// The typed failure.
        error: Arc<ClientError>,
    },
    /// An asynchronous failure was observed; the session stays usable
    /// unless the transport itself is gone.
    Error {
        /// Human-readable description.
        message: String,
    },
}
