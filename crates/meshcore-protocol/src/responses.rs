//! Responses and push notifications from the companion firmware.
//!
//! Every decoder checks the minimum frame length for its code before
//! touching payload bytes; undersized frames yield
//! [`ProtocolError::Malformed`], never an out-of-bounds read.

use crate::constants::*;
use crate::error::*;
use crate::types::*;

/// Responses received in reply to commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Generic OK.
    Ok,

    /// Error with firmware sub-code.
    Error(FirmwareError),

    /// Start of the contacts list.
    ContactsStart,

    /// A single contact entry.
    Contact(Contact),

    /// End of the contacts list.
    EndOfContacts,

    /// Local node identity (reply to APP_START).
    SelfInfo(SelfInfo),

    /// Message accepted for transmission.
    Sent,

    /// Current device time.
    CurrentTime {
        /// Unix timestamp in seconds.
        time_secs: u32,
    },

    /// Offline queue is empty.
    NoMoreMessages,

    /// Device information (reply to DEVICE_QUERY).
    DeviceInfo(DeviceInfo),

    /// Direct message pulled from the queue.
    ContactMessage(ContactMessageEvent),

    /// Channel message pulled from the queue.
    ChannelMessage(ChannelMessageEvent),

    /// Channel slot contents (reply to GET_CHANNEL).
    ChannelInfo(Channel),

    /// Response code this crate does not decode; the session logs and
    /// retains its state.
    Unknown {
        /// The code byte.
        code: u8,
        /// Payload after the code byte.
        payload: Vec<u8>,
    },
}

/// Push notifications (unsolicited, code byte >= 0x80).
#[derive(Debug, Clone, PartialEq)]
pub enum Push {
    /// Path to a contact was updated. Firmware revisions differ on whether
    /// the key is attached.
    PathUpdated {
        /// Affected contact, when present in the frame.
        public_key: Option<PublicKey>,
    },

    /// Message delivery confirmed by an ACK.
    SendConfirmed {
        /// ACK hash that was confirmed.
        ack_hash: u32,
        /// Round-trip time in milliseconds.
        trip_time_ms: u32,
    },

    /// A message is waiting in the offline queue.
    MessageWaiting,

    /// Raw RX log entry (sniffer/debugging).
    LogRxData {
        /// SNR in quarter-dB units.
        snr_x4: i8,
        /// RSSI in dBm.
        rssi: i8,
        /// Raw packet bytes.
        raw: Vec<u8>,
    },

    /// Push code this crate does not decode.
    Unknown {
        /// The code byte.
        code: u8,
        /// Payload after the code byte.
        payload: Vec<u8>,
    },
}

/// A decoded direct message frame (CONTACT_MSG_RECV_V3).
#[derive(Debug, Clone, PartialEq)]
pub struct ContactMessageEvent {
    /// Sender's public key prefix.
    pub sender_prefix: PublicKeyPrefix,
    /// Path length as a signed byte: -1 = no route info.
    pub path_len: i8,
    /// Text type byte.
    pub txt_type: u8,
    /// Sender timestamp (seconds).
    pub timestamp: u32,
    /// SNR in quarter-dB units.
    pub snr_x4: i8,
    /// Message text.
    pub text: String,
}

impl ContactMessageEvent {
    /// SNR in dB.
    pub fn snr(&self) -> f32 {
        self.snr_x4 as f32 / 4.0
    }
}

/// A decoded channel message frame (CHANNEL_MSG_RECV_V3).
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessageEvent {
    /// Channel index.
    pub channel_idx: u8,
    /// Path length byte: 0xFF = direct.
    pub path_len: u8,
    /// Text type byte.
    pub txt_type: u8,
    /// Sender timestamp (seconds).
    pub timestamp: u32,
    /// SNR in quarter-dB units.
    pub snr_x4: i8,
    /// Full text payload, `"Sender: message"` form.
    pub text: String,
}

impl ChannelMessageEvent {
    /// SNR in dB.
    pub fn snr(&self) -> f32 {
        self.snr_x4 as f32 / 4.0
    }
}

/// Either a response or a push notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A reply on the request/response stream.
    Response(Response),
    /// An out-of-band push.
    Push(Push),
}

/// Classify a frame without decoding it: pushes carry the high bit.
pub fn is_push(frame: &[u8]) -> bool {
    !frame.is_empty() && frame[0] >= 0x80
}

impl Event {
    /// Decode a frame into a response or push.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        if is_push(frame) {
            Ok(Event::Push(Push::decode(frame)?))
        } else {
            Ok(Event::Response(Response::decode(frame)?))
        }
    }
}

impl Response {
    /// Decode a response frame (first byte < 0x80).
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        let code = frame[0];
        match code {
            RESP_CODE_OK => Ok(Response::Ok),

            RESP_CODE_ERR => {
                check_len(code, frame, 2)?;
                Ok(Response::Error(FirmwareError::from(frame[1])))
            }

            RESP_CODE_CONTACTS_START => Ok(Response::ContactsStart),

            RESP_CODE_CONTACT => Ok(Response::Contact(decode_contact(frame)?)),

            RESP_CODE_END_OF_CONTACTS => Ok(Response::EndOfContacts),

            RESP_CODE_SELF_INFO => Ok(Response::SelfInfo(decode_self_info(frame)?)),

            RESP_CODE_SENT => Ok(Response::Sent),

            RESP_CODE_CURR_TIME => {
                check_len(code, frame, 5)?;
                Ok(Response::CurrentTime {
                    time_secs: read_u32(frame, 1),
                })
            }

            RESP_CODE_NO_MORE_MESSAGES => Ok(Response::NoMoreMessages),

            RESP_CODE_DEVICE_INFO => Ok(Response::DeviceInfo(decode_device_info(frame)?)),

            RESP_CODE_CONTACT_MSG_RECV_V3 => {
                Ok(Response::ContactMessage(decode_contact_message(frame)?))
            }

            RESP_CODE_CHANNEL_MSG_RECV_V3 => {
                Ok(Response::ChannelMessage(decode_channel_message(frame)?))
            }

            RESP_CODE_CHANNEL_INFO => Ok(Response::ChannelInfo(decode_channel_info(frame)?)),

            _ => Ok(Response::Unknown {
                code,
                payload: frame[1..].to_vec(),
            }),
        }
    }
}

impl Push {
    /// Decode a push frame (first byte >= 0x80).
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        let code = frame[0];
        match code {
            PUSH_CODE_PATH_UPDATED => {
                let public_key = if frame.len() >= 1 + PUB_KEY_SIZE {
                    PublicKey::from_slice(&frame[1..1 + PUB_KEY_SIZE])
                } else {
                    None
                };
                Ok(Push::PathUpdated { public_key })
            }

            PUSH_CODE_SEND_CONFIRMED => {
                check_len(code, frame, 9)?;
                Ok(Push::SendConfirmed {
                    ack_hash: read_u32(frame, 1),
                    trip_time_ms: read_u32(frame, 5),
                })
            }

            PUSH_CODE_MSG_WAITING => Ok(Push::MessageWaiting),

            PUSH_CODE_LOG_RX_DATA => {
                check_len(code, frame, 3)?;
                Ok(Push::LogRxData {
                    snr_x4: frame[1] as i8,
                    rssi: frame[2] as i8,
                    raw: frame[3..].to_vec(),
                })
            }

            _ => Ok(Push::Unknown {
                code,
                payload: frame[1..].to_vec(),
            }),
        }
    }
}

// ============================================================================
// Field readers
// ============================================================================

fn read_u32(frame: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ])
}

fn read_i32(frame: &[u8], offset: usize) -> i32 {
    read_u32(frame, offset) as i32
}

/// Read a string bounded by both `max_len` and the first NUL byte,
/// whichever comes first.
fn read_cstr(frame: &[u8], offset: usize, max_len: usize) -> String {
    if offset >= frame.len() {
        return String::new();
    }
    let end = (offset + max_len).min(frame.len());
    let slice = &frame[offset..end];
    let len = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
    String::from_utf8_lossy(&slice[..len]).to_string()
}

// ============================================================================
// Per-code decoders (offsets include the code byte at offset 0)
// ============================================================================

fn decode_device_info(frame: &[u8]) -> Result<DeviceInfo, ProtocolError> {
    check_len(RESP_CODE_DEVICE_INFO, frame, 80)?;

    let firmware_version = frame[1];
    let mut firmware_name = read_cstr(frame, 20, 40).trim().to_string();
    let version_str = read_cstr(frame, 60, 20).trim().to_string();
    if !version_str.is_empty() {
        if !firmware_name.is_empty() {
            firmware_name.push(' ');
        }
        firmware_name.push_str(&version_str);
    }

    Ok(DeviceInfo {
        firmware_version,
        firmware_name,
        protocol_version: PROTOCOL_VERSION as u32,
    })
}

fn decode_self_info(frame: &[u8]) -> Result<SelfInfo, ProtocolError> {
    check_len(RESP_CODE_SELF_INFO, frame, 46)?;

    let contact_type = frame[1];
    let tx_power_dbm = frame[2];
    let public_key = PublicKey::from_slice(&frame[4..4 + PUB_KEY_SIZE])
        .ok_or_else(|| ProtocolError::InvalidData("bad public key field".into()))?;
    // Bytes 36..44 carry the advertised lat/lon; radio-side only.

    Ok(SelfInfo {
        public_key,
        node_name: String::new(),
        contact_type,
        flags: 0,
        tx_power_dbm,
    })
}

fn decode_channel_info(frame: &[u8]) -> Result<Channel, ProtocolError> {
    check_len(RESP_CODE_CHANNEL_INFO, frame, 50)?;

    Ok(Channel {
        index: frame[1],
        name: read_cstr(frame, 2, MAX_NAME_SIZE),
        secret: frame[34..50].to_vec(),
    })
}

fn decode_contact(frame: &[u8]) -> Result<Contact, ProtocolError> {
    check_len(RESP_CODE_CONTACT, frame, 148)?;

    let public_key = PublicKey::from_slice(&frame[1..33])
        .ok_or_else(|| ProtocolError::InvalidData("bad public key field".into()))?;
    let mut path = [0u8; MAX_PATH_SIZE];
    path.copy_from_slice(&frame[36..100]);

    Ok(Contact {
        public_key,
        contact_type: ContactType::from(frame[33]),
        flags: frame[34],
        path_len: frame[35] as i8,
        path,
        name: read_cstr(frame, 100, MAX_NAME_SIZE),
        last_advert_timestamp: read_u32(frame, 132),
        latitude: read_i32(frame, 136),
        longitude: read_i32(frame, 140),
        last_modified: read_u32(frame, 144),
    })
}

fn decode_channel_message(frame: &[u8]) -> Result<ChannelMessageEvent, ProtocolError> {
    check_len(RESP_CODE_CHANNEL_MSG_RECV_V3, frame, 12)?;

    Ok(ChannelMessageEvent {
        snr_x4: frame[1] as i8,
        channel_idx: frame[4],
        path_len: frame[5],
        txt_type: frame[6],
        timestamp: read_u32(frame, 7),
        text: read_cstr(frame, 11, frame.len() - 11),
    })
}

fn decode_contact_message(frame: &[u8]) -> Result<ContactMessageEvent, ProtocolError> {
    check_len(RESP_CODE_CONTACT_MSG_RECV_V3, frame, 16)?;

    let sender_prefix = PublicKeyPrefix::from_slice(&frame[4..10])
        .ok_or_else(|| ProtocolError::InvalidData("bad sender prefix field".into()))?;

    Ok(ContactMessageEvent {
        snr_x4: frame[1] as i8,
        sender_prefix,
        path_len: frame[10] as i8,
        txt_type: frame[11],
        timestamp: read_u32(frame, 12),
        text: read_cstr(frame, 16, frame.len() - 16),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_msg_frame() -> Vec<u8> {
        // S2: snr 20 (5.0 dB), channel 0, direct, plain, ts 0xDEADBEEF, "Alice: hi"
        let mut frame = vec![
            0x11, 0x14, 0x00, 0x00, 0x00, 0xFF, 0x00, 0xEF, 0xBE, 0xAD, 0xDE,
        ];
        frame.extend_from_slice(b"Alice: hi");
        frame.push(0);
        frame
    }

    #[test]
    fn channel_message_decode() {
        let event = Response::decode(&channel_msg_frame()).unwrap();
        let msg = match event {
            Response::ChannelMessage(m) => m,
            other => panic!("expected channel message, got {:?}", other),
        };
        assert_eq!(msg.channel_idx, 0);
        assert_eq!(msg.path_len, 0xFF);
        assert_eq!(msg.txt_type, 0);
        assert_eq!(msg.timestamp, 0xDEADBEEF);
        assert_eq!(msg.text, "Alice: hi");
        assert_eq!(msg.snr(), 5.0);
    }

    #[test]
    fn contact_message_decode() {
        let mut frame = vec![0x10, 0xEC, 0, 0]; // snr -20 => -5.0 dB
        frame.extend_from_slice(&[1, 2, 3, 4, 5, 6]); // prefix
        frame.push(0xFF); // path_len -1
        frame.push(0); // txt_type
        frame.extend_from_slice(&0x01020304u32.to_le_bytes());
        frame.extend_from_slice(b"hello\0");

        let msg = match Response::decode(&frame).unwrap() {
            Response::ContactMessage(m) => m,
            other => panic!("expected contact message, got {:?}", other),
        };
        assert_eq!(msg.sender_prefix.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(msg.path_len, -1);
        assert_eq!(msg.timestamp, 0x01020304);
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.snr(), -5.0);
    }

    #[test]
    fn device_info_decode() {
        let mut frame = vec![0u8; 80];
        frame[0] = RESP_CODE_DEVICE_INFO;
        frame[1] = 7;
        frame[20..24].copy_from_slice(b"MyFW");
        frame[60..64].copy_from_slice(b"v1.2");

        let info = match Response::decode(&frame).unwrap() {
            Response::DeviceInfo(i) => i,
            other => panic!("expected device info, got {:?}", other),
        };
        assert_eq!(info.firmware_version, 7);
        assert_eq!(info.firmware_name, "MyFW v1.2");
        assert_eq!(info.protocol_version, 3);
    }

    #[test]
    fn device_info_without_version_string() {
        let mut frame = vec![0u8; 80];
        frame[0] = RESP_CODE_DEVICE_INFO;
        frame[20..23].copy_from_slice(b"ABC");

        let info = match Response::decode(&frame).unwrap() {
            Response::DeviceInfo(i) => i,
            other => panic!("expected device info, got {:?}", other),
        };
        assert_eq!(info.firmware_name, "ABC");
    }

    #[test]
    fn self_info_decode() {
        let mut frame = vec![0u8; 46];
        frame[0] = RESP_CODE_SELF_INFO;
        frame[1] = 1; // chat
        frame[2] = 22; // tx power
        frame[4..36].copy_from_slice(&[0x11; 32]);

        let info = match Response::decode(&frame).unwrap() {
            Response::SelfInfo(i) => i,
            other => panic!("expected self info, got {:?}", other),
        };
        assert_eq!(info.contact_type, 1);
        assert_eq!(info.tx_power_dbm, 22);
        assert_eq!(info.public_key.as_bytes(), &[0x11; 32]);
    }

    #[test]
    fn channel_info_decode() {
        let mut frame = vec![0u8; 50];
        frame[0] = RESP_CODE_CHANNEL_INFO;
        frame[1] = 2;
        frame[2..7].copy_from_slice(b"Alpha");
        frame[34..50].copy_from_slice(&[0xCD; 16]);

        let ch = match Response::decode(&frame).unwrap() {
            Response::ChannelInfo(c) => c,
            other => panic!("expected channel info, got {:?}", other),
        };
        assert_eq!(ch.index, 2);
        assert_eq!(ch.name, "Alpha");
        assert_eq!(ch.secret, vec![0xCD; 16]);
        assert!(!ch.is_empty());
    }

    #[test]
    fn contact_decode() {
        let mut frame = vec![0u8; 148];
        frame[0] = RESP_CODE_CONTACT;
        frame[1..33].copy_from_slice(&[0x42; 32]);
        frame[33] = 1; // chat
        frame[34] = 0x10; // flags
        frame[35] = 0xFF; // path_len -1
        frame[100..104].copy_from_slice(b"Peer");
        frame[132..136].copy_from_slice(&100u32.to_le_bytes());
        frame[136..140].copy_from_slice(&(-37_813_600i32).to_le_bytes());
        frame[140..144].copy_from_slice(&144_963_100i32.to_le_bytes());
        frame[144..148].copy_from_slice(&200u32.to_le_bytes());

        let contact = match Response::decode(&frame).unwrap() {
            Response::Contact(c) => c,
            other => panic!("expected contact, got {:?}", other),
        };
        assert_eq!(contact.public_key.as_bytes(), &[0x42; 32]);
        assert_eq!(contact.contact_type, ContactType::Chat);
        assert_eq!(contact.flags, 0x10);
        assert_eq!(contact.path_len, -1);
        assert!(!contact.has_direct_path());
        assert_eq!(contact.name, "Peer");
        assert_eq!(contact.last_advert_timestamp, 100);
        assert_eq!(contact.latitude, -37_813_600);
        assert_eq!(contact.longitude, 144_963_100);
        assert_eq!(contact.last_modified, 200);
        assert!(contact.is_valid());
    }

    #[test]
    fn bare_responses() {
        assert_eq!(Response::decode(&[0]).unwrap(), Response::Ok);
        assert_eq!(Response::decode(&[2]).unwrap(), Response::ContactsStart);
        assert_eq!(Response::decode(&[4]).unwrap(), Response::EndOfContacts);
        assert_eq!(Response::decode(&[6]).unwrap(), Response::Sent);
        assert_eq!(Response::decode(&[10]).unwrap(), Response::NoMoreMessages);
        assert_eq!(
            Response::decode(&[1, 2]).unwrap(),
            Response::Error(FirmwareError::NotFound)
        );
    }

    #[test]
    fn undersized_frames_are_malformed_not_panics() {
        // (code, minimum length) pairs for every length-checked decoder
        let cases: &[(u8, usize)] = &[
            (RESP_CODE_ERR, 2),
            (RESP_CODE_CONTACT, 148),
            (RESP_CODE_SELF_INFO, 46),
            (RESP_CODE_CURR_TIME, 5),
            (RESP_CODE_DEVICE_INFO, 80),
            (RESP_CODE_CONTACT_MSG_RECV_V3, 16),
            (RESP_CODE_CHANNEL_MSG_RECV_V3, 12),
            (RESP_CODE_CHANNEL_INFO, 50),
        ];
        for &(code, need) in cases {
            for len in 1..need {
                let mut frame = vec![0u8; len];
                frame[0] = code;
                match Response::decode(&frame) {
                    Err(ProtocolError::Malformed {
                        code: c,
                        got,
                        need: n,
                    }) => {
                        assert_eq!(c, code);
                        assert_eq!(got, len);
                        assert_eq!(n, need);
                    }
                    other => panic!(
                        "code 0x{:02X} len {}: expected Malformed, got {:?}",
                        code, len, other
                    ),
                }
            }
        }
    }

    #[test]
    fn push_classification() {
        assert!(is_push(&[0x83]));
        assert!(is_push(&[0x80]));
        assert!(!is_push(&[0x11, 0]));
        assert!(!is_push(&[]));
    }

    #[test]
    fn push_decode() {
        assert_eq!(Push::decode(&[0x83]).unwrap(), Push::MessageWaiting);

        let mut confirmed = vec![0x82];
        confirmed.extend_from_slice(&7u32.to_le_bytes());
        confirmed.extend_from_slice(&1500u32.to_le_bytes());
        assert_eq!(
            Push::decode(&confirmed).unwrap(),
            Push::SendConfirmed {
                ack_hash: 7,
                trip_time_ms: 1500
            }
        );

        let rx = Push::decode(&[0x88, 0x14, 0xB0, 0xAA, 0xBB]).unwrap();
        assert_eq!(
            rx,
            Push::LogRxData {
                snr_x4: 20,
                rssi: -80,
                raw: vec![0xAA, 0xBB],
            }
        );
    }

    #[test]
    fn path_updated_with_and_without_key() {
        let bare = Push::decode(&[0x81]).unwrap();
        assert_eq!(bare, Push::PathUpdated { public_key: None });

        let mut with_key = vec![0x81];
        with_key.extend_from_slice(&[9u8; 32]);
        assert_eq!(
            Push::decode(&with_key).unwrap(),
            Push::PathUpdated {
                public_key: Some(PublicKey::new([9; 32]))
            }
        );
    }

    #[test]
    fn unknown_codes_are_preserved_not_errors() {
        match Response::decode(&[23, 1, 2]).unwrap() {
            Response::Unknown { code, payload } => {
                assert_eq!(code, 23);
                assert_eq!(payload, vec![1, 2]);
            }
            other => panic!("expected unknown, got {:?}", other),
        }
        match Push::decode(&[0x8E, 5]).unwrap() {
            Push::Unknown { code, payload } => {
                assert_eq!(code, 0x8E);
                assert_eq!(payload, vec![5]);
            }
            other => panic!("expected unknown push, got {:?}", other),
        }
    }

    #[test]
    fn event_dispatch() {
        assert!(matches!(
            Event::decode(&[0x83]).unwrap(),
            Event::Push(Push::MessageWaiting)
        ));
        assert!(matches!(
            Event::decode(&[0]).unwrap(),
            Event::Response(Response::Ok)
        ));
        assert_eq!(Event::decode(&[]), Err(ProtocolError::EmptyFrame));
    }

    #[test]
    fn strings_bounded_by_nul_and_field_width() {
        let mut frame = vec![0u8; 50];
        frame[0] = RESP_CODE_CHANNEL_INFO;
        frame[1] = 0;
        // No NUL inside the 32-byte field: must stop at the field edge
        for b in frame[2..34].iter_mut() {
            *b = b'A';
        }
        frame[34..50].copy_from_slice(&[1; 16]);
        let ch = match Response::decode(&frame).unwrap() {
            Response::ChannelInfo(c) => c,
            other => panic!("expected channel info, got {:?}", other),
        };
        assert_eq!(ch.name.len(), 32);
        assert!(ch.name.bytes().all(|b| b == b'A'));
    }
}
