//! Unified message model shared by the session, store, and subscribers.

use crate::types::PublicKeyPrefix;

/// Whether a message travelled over a channel or directly between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Group message on a channel index.
    Channel,
    /// Direct message addressed by public key prefix.
    Direct,
}

/// A text message, as stored and surfaced to subscribers.
///
/// Channel messages carry the sender's display name parsed from the
/// `"Sender: text"` payload prefix; direct messages carry the sender's
/// 6-byte key prefix instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Channel or direct.
    pub kind: MessageKind,
    /// Channel index (channel messages only).
    pub channel_idx: Option<u8>,
    /// Sender public key prefix (direct messages only).
    pub sender_prefix: Option<PublicKeyPrefix>,
    /// Sender display name ("Unknown" when it cannot be determined).
    pub sender_name: String,
    /// Message text.
    pub text: String,
    /// Sender-side timestamp (remote clock, seconds).
    pub timestamp: u32,
    /// Local receive time (seconds since the epoch).
    pub received_at: u64,
    /// Path length: -1 = no route info, hop count otherwise. The wire byte
    /// 0xFF arrives here as -1.
    pub path_len: i8,
    /// Text type byte.
    pub txt_type: u8,
    /// Signal-to-noise ratio in dB (quarter-dB fixed point on the wire).
    pub snr: f32,
    /// Whether this message was sent by the local node.
    pub sent_by_me: bool,
}

impl Message {
    /// Split a channel payload of the form `"Sender: message"` at the first
    /// colon. A missing colon, or a colon at position 0, yields sender
    /// `"Unknown"` with the full payload as text.
    pub fn split_sender_text(full_text: &str) -> (String, String) {
        match full_text.find(':') {
            Some(pos) if pos > 0 && pos < full_text.len() - 1 => {
                let sender = full_text[..pos].trim().to_string();
                let text = full_text[pos + 1..].trim().to_string();
                (sender, text)
            }
            _ => ("Unknown".to_string(), full_text.to_string()),
        }
    }

    /// Build a channel message from a decoded payload, splitting the sender
    /// name out of the text.
    pub fn from_channel_recv(
        channel_idx: u8,
        full_text: &str,
        timestamp: u32,
        path_len: i8,
        txt_type: u8,
        snr: f32,
        received_at: u64,
    ) -> Self {
        let (sender_name, text) = Self::split_sender_text(full_text);
        Message {
            kind: MessageKind::Channel,
            channel_idx: Some(channel_idx),
            sender_prefix: None,
            sender_name,
            text,
            timestamp,
            received_at,
            path_len,
            txt_type,
            snr,
            sent_by_me: false,
        }
    }

    /// Build a direct message from a decoded payload.
    #[allow(clippy::too_many_arguments)]
    pub fn from_direct_recv(
        sender_prefix: PublicKeyPrefix,
        text: &str,
        timestamp: u32,
        path_len: i8,
        txt_type: u8,
        snr: f32,
        received_at: u64,
    ) -> Self {
        Message {
            kind: MessageKind::Direct,
            channel_idx: None,
            sender_prefix: Some(sender_prefix),
            sender_name: sender_prefix.to_hex(),
            text: text.to_string(),
            timestamp,
            received_at,
            path_len,
            txt_type,
            snr,
            sent_by_me: false,
        }
    }

    /// The identifier hashed for deduplication: display name for channel
    /// messages, key prefix bytes for direct messages.
    pub fn sender_identifier(&self) -> Vec<u8> {
        match self.kind {
            MessageKind::Channel => self.sender_name.as_bytes().to_vec(),
            MessageKind::Direct => self
                .sender_prefix
                .map(|p| p.as_bytes().to_vec())
                .unwrap_or_default(),
        }
    }

    /// Whether the message arrived over a direct link (no routing path).
    pub fn is_direct_link(&self) -> bool {
        self.path_len == -1
    }
}
