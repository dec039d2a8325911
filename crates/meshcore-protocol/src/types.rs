//! Common types used in the protocol and by the host-side model.

use base64::Engine;

use crate::constants::*;

/// A 32-byte node public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; PUB_KEY_SIZE]);

impl PublicKey {
    /// Create a new public key from bytes.
    pub fn new(bytes: [u8; PUB_KEY_SIZE]) -> Self {
        PublicKey(bytes)
    }

    /// Create from a slice. Returns None if the slice is not exactly 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() == PUB_KEY_SIZE {
            let mut bytes = [0u8; PUB_KEY_SIZE];
            bytes.copy_from_slice(slice);
            Some(PublicKey(bytes))
        } else {
            None
        }
    }

    /// Get the 6-byte prefix used to address direct messages.
    pub fn prefix(&self) -> PublicKeyPrefix {
        PublicKeyPrefix::from(self)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; PUB_KEY_SIZE] {
        &self.0
    }

    /// Render as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for PublicKey {
    fn default() -> Self {
        PublicKey([0u8; PUB_KEY_SIZE])
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 6-byte public key prefix (used to identify message senders/recipients).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKeyPrefix(pub [u8; PUB_KEY_PREFIX_SIZE]);

impl PublicKeyPrefix {
    /// Create a new prefix from bytes.
    pub fn new(bytes: [u8; PUB_KEY_PREFIX_SIZE]) -> Self {
        PublicKeyPrefix(bytes)
    }

    /// Create from a slice. Returns None if shorter than 6 bytes; extra
    /// bytes beyond the prefix are ignored.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() >= PUB_KEY_PREFIX_SIZE {
            let mut bytes = [0u8; PUB_KEY_PREFIX_SIZE];
            bytes.copy_from_slice(&slice[..PUB_KEY_PREFIX_SIZE]);
            Some(PublicKeyPrefix(bytes))
        } else {
            None
        }
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; PUB_KEY_PREFIX_SIZE] {
        &self.0
    }

    /// Render as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for PublicKeyPrefix {
    fn default() -> Self {
        PublicKeyPrefix([0u8; PUB_KEY_PREFIX_SIZE])
    }
}

impl From<&PublicKey> for PublicKeyPrefix {
    fn from(key: &PublicKey) -> Self {
        let mut prefix = [0u8; PUB_KEY_PREFIX_SIZE];
        prefix.copy_from_slice(&key.0[..PUB_KEY_PREFIX_SIZE]);
        PublicKeyPrefix(prefix)
    }
}

/// Text message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextType {
    /// Plain text message.
    Plain,
    /// CLI/command data.
    CliData,
    /// Signed plain text.
    SignedPlain,
    /// Unknown type.
    Unknown(u8),
}

impl From<u8> for TextType {
    fn from(value: u8) -> Self {
        match value {
            TXT_TYPE_PLAIN => TextType::Plain,
            TXT_TYPE_CLI_DATA => TextType::CliData,
            TXT_TYPE_SIGNED_PLAIN => TextType::SignedPlain,
            _ => TextType::Unknown(value),
        }
    }
}

impl From<TextType> for u8 {
    fn from(value: TextType) -> Self {
        match value {
            TextType::Plain => TXT_TYPE_PLAIN,
            TextType::CliData => TXT_TYPE_CLI_DATA,
            TextType::SignedPlain => TXT_TYPE_SIGNED_PLAIN,
            TextType::Unknown(v) => v,
        }
    }
}

/// Kind of node a contact represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactType {
    /// Unset/unknown.
    None,
    /// Regular chat node.
    Chat,
    /// Repeater node.
    Repeater,
    /// Room server.
    Room,
    /// Type byte this crate does not know about.
    Unknown(u8),
}

impl From<u8> for ContactType {
    fn from(value: u8) -> Self {
        match value {
            0 => ContactType::None,
            1 => ContactType::Chat,
            2 => ContactType::Repeater,
            3 => ContactType::Room,
            _ => ContactType::Unknown(value),
        }
    }
}

impl From<ContactType> for u8 {
    fn from(value: ContactType) -> Self {
        match value {
            ContactType::None => 0,
            ContactType::Chat => 1,
            ContactType::Repeater => 2,
            ContactType::Room => 3,
            ContactType::Unknown(v) => v,
        }
    }
}

/// A contact known to the device.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    /// Contact's public key.
    pub public_key: PublicKey,
    /// Display name (up to 32 bytes UTF-8).
    pub name: String,
    /// Contact type byte.
    pub contact_type: ContactType,
    /// Contact flags.
    pub flags: u8,
    /// Outbound path length: -1 = flood, otherwise hop count.
    pub path_len: i8,
    /// Outbound path bytes.
    pub path: [u8; MAX_PATH_SIZE],
    /// Timestamp of the contact's last advertisement (remote clock, secs).
    pub last_advert_timestamp: u32,
    /// Last modification timestamp (local device clock, secs).
    pub last_modified: u32,
    /// Latitude in micro-degrees.
    pub latitude: i32,
    /// Longitude in micro-degrees.
    pub longitude: i32,
}

impl Default for Contact {
    fn default() -> Self {
        Contact {
            public_key: PublicKey::default(),
            name: String::new(),
            contact_type: ContactType::Chat,
            flags: 0,
            path_len: PATH_LEN_FLOOD,
            path: [0u8; MAX_PATH_SIZE],
            last_advert_timestamp: 0,
            last_modified: 0,
            latitude: 0,
            longitude: 0,
        }
    }
}

impl Contact {
    /// A contact is valid iff the key is a full 32 bytes and the name is
    /// non-empty.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }

    /// Whether a direct route to this contact is known.
    pub fn has_direct_path(&self) -> bool {
        self.path_len >= 0
    }

    /// Latitude in degrees.
    pub fn latitude_deg(&self) -> f64 {
        self.latitude as f64 / 1_000_000.0
    }

    /// Longitude in degrees.
    pub fn longitude_deg(&self) -> f64 {
        self.longitude as f64 / 1_000_000.0
    }
}

/// A channel slot on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Channel index (0 is the well-known public channel).
    pub index: u8,
    /// Channel name (up to 32 bytes, null-padded on the wire).
    pub name: String,
    /// Pre-shared key (16 or 32 bytes).
    pub secret: Vec<u8>,
}

impl Default for Channel {
    fn default() -> Self {
        Channel {
            index: 0,
            name: String::new(),
            secret: Vec::new(),
        }
    }
}

impl Channel {
    /// The well-known default public channel at index 0.
    pub fn public_channel() -> Self {
        let secret = base64::engine::general_purpose::STANDARD
            .decode(PUBLIC_CHANNEL_PSK_BASE64)
            .expect("well-known PSK is valid base64");
        Channel {
            index: 0,
            name: "Public".to_string(),
            secret,
        }
    }

    /// An empty slot is a discovery sentinel: whitespace-only name or an
    /// all-zero secret. Empty channels are never surfaced.
    pub fn is_empty(&self) -> bool {
        if self.name.trim().is_empty() {
            return true;
        }
        self.secret.iter().all(|&b| b == 0)
    }
}

/// Device information returned by CMD_DEVICE_QUERY.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Firmware version code byte.
    pub firmware_version: u8,
    /// Firmware identifier string (manufacturer plus version string).
    pub firmware_name: String,
    /// Companion protocol version in use.
    pub protocol_version: u32,
}

/// Identity of the local node, returned in reply to CMD_APP_START.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelfInfo {
    /// Node's public key; also the persistence scope key.
    pub public_key: PublicKey,
    /// Advertised node name.
    pub node_name: String,
    /// Contact type byte the node advertises as.
    pub contact_type: u8,
    /// Flag byte.
    pub flags: u8,
    /// Current TX power in dBm.
    pub tx_power_dbm: u8,
}

/// LoRa radio parameters for CMD_SET_RADIO_PARAMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioParams {
    /// Frequency in kHz (the protocol expects kHz, not Hz).
    pub freq_khz: u32,
    /// Bandwidth in Hz.
    pub bandwidth_hz: u32,
    /// Spreading factor (5-12).
    pub spreading_factor: u8,
    /// Coding rate (5-8).
    pub coding_rate: u8,
}

impl RadioParams {
    /// Range check over the LoRa parameter space the firmware accepts.
    pub fn is_valid(&self) -> bool {
        (300_000..=2_500_000).contains(&self.freq_khz)
            && (7_800..=500_000).contains(&self.bandwidth_hz)
            && (5..=12).contains(&self.spreading_factor)
            && (5..=8).contains(&self.coding_rate)
    }

    /// Frequency in MHz.
    pub fn frequency_mhz(&self) -> f64 {
        self.freq_khz as f64 / 1000.0
    }
}
