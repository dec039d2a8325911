//! MeshCore Companion Protocol
//!
//! This crate provides types and utilities for talking to MeshCore companion
//! firmware over its framed binary protocol. Messages are length-delimited
//! frames where the first byte identifies the message:
//!
//! - **Commands** (host → radio): start with a `CMD_*` byte
//! - **Responses** (radio → host): start with a `RESP_CODE_*` byte (< 0x80)
//! - **Push notifications** (radio → host): start with a `PUSH_CODE_*` byte (0x80+)
//!
//! Over a serial link every frame travels inside a 3-byte envelope
//! (`0x3C`/`0x3E` direction marker plus a little-endian length); over BLE the
//! frame bytes are exchanged verbatim. [`StreamDeframer`] recovers frames from
//! an unbounded serial byte stream, while [`Command::encode`] and
//! [`Event::decode`] map between frame bytes and typed values.
//!
//! # Example
//!
//! ```rust,ignore
//! use meshcore_protocol::{Command, Event, PROTOCOL_VERSION};
//!
//! let frame = Command::DeviceQuery { app_target_version: PROTOCOL_VERSION }.encode();
//! // ... send, receive ...
//! let event = Event::decode(&received)?;
//! ```

mod commands;
mod constants;
mod error;
mod frame;
mod message;
mod responses;
mod types;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use message::*;
pub use responses::*;
pub use types::*;
