//! Protocol constants
//!
//! Command codes, response codes, push codes, and other wire-level values of
//! the MeshCore companion protocol (version 3).

/// Companion protocol version implemented by this crate.
pub const PROTOCOL_VERSION: u8 = 3;

// ============================================================================
// Frame envelope (serial transport only)
// ============================================================================

/// Serial envelope marker for host → radio frames ('<').
pub const FRAME_TO_RADIO: u8 = 0x3C;
/// Serial envelope marker for radio → host frames ('>').
pub const FRAME_FROM_RADIO: u8 = 0x3E;

// ============================================================================
// Command Codes (host → radio)
// ============================================================================

/// Initial handshake command - starts the app connection.
pub const CMD_APP_START: u8 = 1;
/// Send a text message to a contact.
pub const CMD_SEND_TXT_MSG: u8 = 2;
/// Send a text message to a channel.
pub const CMD_SEND_CHANNEL_TXT_MSG: u8 = 3;
/// Get the list of contacts (with a 'since' filter).
pub const CMD_GET_CONTACTS: u8 = 4;
/// Get the current device time.
pub const CMD_GET_DEVICE_TIME: u8 = 5;
/// Set the device time.
pub const CMD_SET_DEVICE_TIME: u8 = 6;
/// Send a self-advertisement packet.
pub const CMD_SEND_SELF_ADVERT: u8 = 7;
/// Set the advertisement name.
pub const CMD_SET_ADVERT_NAME: u8 = 8;
/// Add or update a contact.
pub const CMD_ADD_UPDATE_CONTACT: u8 = 9;
/// Sync the next message from the offline queue.
pub const CMD_SYNC_NEXT_MESSAGE: u8 = 10;
/// Set radio parameters (frequency, bandwidth, SF, CR).
pub const CMD_SET_RADIO_PARAMS: u8 = 11;
/// Set radio TX power.
pub const CMD_SET_RADIO_TX_POWER: u8 = 12;
/// Set advertisement latitude/longitude.
pub const CMD_SET_ADVERT_LATLON: u8 = 14;
/// Remove a contact.
pub const CMD_REMOVE_CONTACT: u8 = 15;
/// Query device information.
pub const CMD_DEVICE_QUERY: u8 = 22;
/// Get a contact by public key.
pub const CMD_GET_CONTACT_BY_KEY: u8 = 30;
/// Get channel information.
pub const CMD_GET_CHANNEL: u8 = 31;
/// Set channel information.
pub const CMD_SET_CHANNEL: u8 = 32;

// ============================================================================
// Response Codes (radio → host)
// ============================================================================

/// Generic OK response.
pub const RESP_CODE_OK: u8 = 0;
/// Generic error response (followed by error sub-code).
pub const RESP_CODE_ERR: u8 = 1;
/// Start of contacts list.
pub const RESP_CODE_CONTACTS_START: u8 = 2;
/// A single contact entry.
pub const RESP_CODE_CONTACT: u8 = 3;
/// End of contacts list.
pub const RESP_CODE_END_OF_CONTACTS: u8 = 4;
/// Self info response (reply to CMD_APP_START).
pub const RESP_CODE_SELF_INFO: u8 = 5;
/// Message sent acknowledgment.
pub const RESP_CODE_SENT: u8 = 6;
/// Current device time.
pub const RESP_CODE_CURR_TIME: u8 = 9;
/// No more messages in the offline queue.
pub const RESP_CODE_NO_MORE_MESSAGES: u8 = 10;
/// Device info response (reply to CMD_DEVICE_QUERY).
pub const RESP_CODE_DEVICE_INFO: u8 = 13;
/// Contact message received (protocol ver >= 3).
pub const RESP_CODE_CONTACT_MSG_RECV_V3: u8 = 16;
/// Channel message received (protocol ver >= 3).
pub const RESP_CODE_CHANNEL_MSG_RECV_V3: u8 = 17;
/// Channel info response (reply to CMD_GET_CHANNEL).
pub const RESP_CODE_CHANNEL_INFO: u8 = 18;

// ============================================================================
// Push Codes (unsolicited radio → host, high bit set)
// ============================================================================

/// Path to a contact was updated.
pub const PUSH_CODE_PATH_UPDATED: u8 = 0x81;
/// Message send confirmed (ACK received).
pub const PUSH_CODE_SEND_CONFIRMED: u8 = 0x82;
/// Message waiting in the offline queue.
pub const PUSH_CODE_MSG_WAITING: u8 = 0x83;
/// Raw RX data log (for debugging / sniffing).
pub const PUSH_CODE_LOG_RX_DATA: u8 = 0x88;

// ============================================================================
// Error Sub-codes (second byte of RESP_CODE_ERR)
// ============================================================================

/// Unsupported command.
pub const ERR_CODE_UNSUPPORTED_CMD: u8 = 1;
/// Contact/item not found.
pub const ERR_CODE_NOT_FOUND: u8 = 2;
/// Table (contacts, packets, etc.) is full.
pub const ERR_CODE_TABLE_FULL: u8 = 3;
/// Bad state for this operation.
pub const ERR_CODE_BAD_STATE: u8 = 4;
/// File I/O error on the device.
pub const ERR_CODE_FILE_IO_ERROR: u8 = 5;
/// Illegal argument.
pub const ERR_CODE_ILLEGAL_ARG: u8 = 6;

// ============================================================================
// Text Types
// ============================================================================

/// Plain text message.
pub const TXT_TYPE_PLAIN: u8 = 0;
/// CLI/command data.
pub const TXT_TYPE_CLI_DATA: u8 = 1;
/// Signed plain text message.
pub const TXT_TYPE_SIGNED_PLAIN: u8 = 2;

// ============================================================================
// Sizes
// ============================================================================

/// Maximum frame size in bytes (excluding the serial envelope).
pub const MAX_FRAME_SIZE: usize = 172;
/// Size of a public key in bytes.
pub const PUB_KEY_SIZE: usize = 32;
/// Size of the public key prefix used to address messages.
pub const PUB_KEY_PREFIX_SIZE: usize = 6;
/// Maximum routing path size in bytes.
pub const MAX_PATH_SIZE: usize = 64;
/// Maximum name size in bytes (contacts, channels).
pub const MAX_NAME_SIZE: usize = 32;

// ============================================================================
// Path length sentinels
// ============================================================================

/// Path length meaning "flood routing" (no pinned route).
pub const PATH_LEN_FLOOD: i8 = -1;
/// Path length byte meaning "direct link" in message frames.
pub const PATH_LEN_DIRECT: u8 = 0xFF;

/// Pre-shared key of the well-known public channel (index 0), base64.
pub const PUBLIC_CHANNEL_PSK_BASE64: &str = "izOH6cXN6mrJ5e26oRXNcg==";
