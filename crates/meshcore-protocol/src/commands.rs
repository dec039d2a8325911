//! Commands sent from the host to the companion firmware.

use crate::constants::*;
use crate::types::*;

/// Commands understood by the companion firmware. All multi-byte integers
/// are little-endian on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Query device information. First command of the init sequence.
    DeviceQuery {
        /// Protocol version the app understands.
        app_target_version: u8,
    },

    /// Start the app connection; the radio replies with SELF_INFO.
    AppStart {
        /// App version byte.
        app_version: u8,
        /// App name string (NUL-terminated on the wire).
        app_name: String,
    },

    /// Send a text message to a contact.
    SendTextMessage {
        /// Message type byte.
        text_type: TextType,
        /// Retry attempt number.
        attempt: u8,
        /// Sender timestamp (seconds).
        timestamp: u32,
        /// Recipient's public key prefix.
        recipient_prefix: PublicKeyPrefix,
        /// Message text (NUL-terminated on the wire).
        text: String,
    },

    /// Send a text message to a channel.
    SendChannelTextMessage {
        /// Message type byte.
        text_type: TextType,
        /// Channel index.
        channel_idx: u8,
        /// Sender timestamp (seconds).
        timestamp: u32,
        /// Message text (NUL-terminated on the wire).
        text: String,
    },

    /// Get contacts modified after `since` (0 = all).
    GetContacts {
        /// Lower bound on lastmod, seconds.
        since: u32,
    },

    /// Get the current device time.
    GetDeviceTime,

    /// Set the device time.
    SetDeviceTime {
        /// Unix timestamp in seconds.
        time_secs: u32,
    },

    /// Send a self-advertisement.
    SendSelfAdvert {
        /// Whether to flood (true) or zero-hop (false).
        flood: bool,
    },

    /// Set the advertised node name.
    SetAdvertName {
        /// New name (NUL-terminated on the wire).
        name: String,
    },

    /// Set the advertised location.
    SetAdvertLatLon {
        /// Latitude in micro-degrees.
        lat: i32,
        /// Longitude in micro-degrees.
        lon: i32,
    },

    /// Add or update a contact on the device.
    AddUpdateContact {
        /// Contact record to push.
        contact: Contact,
    },

    /// Pull the next message from the offline queue.
    SyncNextMessage,

    /// Set radio parameters.
    SetRadioParams {
        /// LoRa parameters.
        params: RadioParams,
    },

    /// Set radio TX power.
    SetRadioTxPower {
        /// TX power in dBm.
        power_dbm: u8,
    },

    /// Remove a contact.
    RemoveContact {
        /// Contact's public key.
        public_key: PublicKey,
    },

    /// Ask the device to send a single contact by key.
    GetContactByKey {
        /// Contact's public key.
        public_key: PublicKey,
    },

    /// Get channel information for a slot.
    GetChannel {
        /// Channel index.
        index: u8,
    },

    /// Write channel information into a slot.
    SetChannel {
        /// Channel record (name zero-padded to 32 bytes on the wire).
        channel: Channel,
    },
}

impl Command {
    /// Get the opcode for this command.
    pub fn code(&self) -> u8 {
        match self {
            Command::DeviceQuery { .. } => CMD_DEVICE_QUERY,
            Command::AppStart { .. } => CMD_APP_START,
            Command::SendTextMessage { .. } => CMD_SEND_TXT_MSG,
            Command::SendChannelTextMessage { .. } => CMD_SEND_CHANNEL_TXT_MSG,
            Command::GetContacts { .. } => CMD_GET_CONTACTS,
            Command::GetDeviceTime => CMD_GET_DEVICE_TIME,
            Command::SetDeviceTime { .. } => CMD_SET_DEVICE_TIME,
            Command::SendSelfAdvert { .. } => CMD_SEND_SELF_ADVERT,
            Command::SetAdvertName { .. } => CMD_SET_ADVERT_NAME,
            Command::SetAdvertLatLon { .. } => CMD_SET_ADVERT_LATLON,
            Command::AddUpdateContact { .. } => CMD_ADD_UPDATE_CONTACT,
            Command::SyncNextMessage => CMD_SYNC_NEXT_MESSAGE,
            Command::SetRadioParams { .. } => CMD_SET_RADIO_PARAMS,
            Command::SetRadioTxPower { .. } => CMD_SET_RADIO_TX_POWER,
            Command::RemoveContact { .. } => CMD_REMOVE_CONTACT,
            Command::GetContactByKey { .. } => CMD_GET_CONTACT_BY_KEY,
            Command::GetChannel { .. } => CMD_GET_CHANNEL,
            Command::SetChannel { .. } => CMD_SET_CHANNEL,
        }
    }

    /// Encode the command to frame bytes (no transport envelope).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_FRAME_SIZE);
        buf.push(self.code());

        match self {
            Command::DeviceQuery { app_target_version } => {
                buf.push(*app_target_version);
            }

            Command::AppStart {
                app_version,
                app_name,
            } => {
                buf.push(*app_version);
                buf.extend_from_slice(app_name.as_bytes());
                buf.push(0);
            }

            Command::SendTextMessage {
                text_type,
                attempt,
                timestamp,
                recipient_prefix,
                text,
            } => {
                buf.push((*text_type).into());
                buf.push(*attempt);
                buf.extend_from_slice(&timestamp.to_le_bytes());
                buf.extend_from_slice(recipient_prefix.as_bytes());
                buf.extend_from_slice(text.as_bytes());
                buf.push(0);
            }

            Command::SendChannelTextMessage {
                text_type,
                channel_idx,
                timestamp,
                text,
            } => {
                buf.push((*text_type).into());
                buf.push(*channel_idx);
                buf.extend_from_slice(&timestamp.to_le_bytes());
                buf.extend_from_slice(text.as_bytes());
                buf.push(0);
            }

            Command::GetContacts { since } => {
                buf.extend_from_slice(&since.to_le_bytes());
            }

            Command::GetDeviceTime => {}

            Command::SetDeviceTime { time_secs } => {
                buf.extend_from_slice(&time_secs.to_le_bytes());
            }

            Command::SendSelfAdvert { flood } => {
                buf.push(if *flood { 1 } else { 0 });
            }

            Command::SetAdvertName { name } => {
                buf.extend_from_slice(name.as_bytes());
                buf.push(0);
            }

            Command::SetAdvertLatLon { lat, lon } => {
                buf.extend_from_slice(&lat.to_le_bytes());
                buf.extend_from_slice(&lon.to_le_bytes());
            }

            Command::AddUpdateContact { contact } => {
                buf.extend_from_slice(contact.public_key.as_bytes());
                buf.push(contact.contact_type.into());
                buf.push(contact.flags);
                buf.push(contact.path_len as u8);
                buf.extend_from_slice(&contact.path);
                buf.extend_from_slice(&padded_name(&contact.name));
                buf.extend_from_slice(&contact.last_advert_timestamp.to_le_bytes());
                buf.extend_from_slice(&contact.latitude.to_le_bytes());
                buf.extend_from_slice(&contact.longitude.to_le_bytes());
                buf.extend_from_slice(&contact.last_modified.to_le_bytes());
            }

            Command::SyncNextMessage => {}

            Command::SetRadioParams { params } => {
                buf.extend_from_slice(&params.freq_khz.to_le_bytes());
                buf.extend_from_slice(&params.bandwidth_hz.to_le_bytes());
                buf.push(params.spreading_factor);
                buf.push(params.coding_rate);
            }

            Command::SetRadioTxPower { power_dbm } => {
                buf.push(*power_dbm);
            }

            Command::RemoveContact { public_key } => {
                buf.extend_from_slice(public_key.as_bytes());
            }

            Command::GetContactByKey { public_key } => {
                buf.extend_from_slice(public_key.as_bytes());
            }

            Command::GetChannel { index } => {
                buf.push(*index);
            }

            Command::SetChannel { channel } => {
                buf.push(channel.index);
                buf.extend_from_slice(&padded_name(&channel.name));
                buf.extend_from_slice(&channel.secret);
            }
        }

        buf
    }
}

/// Zero-pad a UTF-8 name into the fixed 32-byte wire field, truncating to
/// leave room for the terminating NUL.
fn padded_name(name: &str) -> [u8; MAX_NAME_SIZE] {
    let mut field = [0u8; MAX_NAME_SIZE];
    let bytes = name.as_bytes();
    let len = bytes.len().min(MAX_NAME_SIZE - 1);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}
