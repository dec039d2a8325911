//! Host-side client for MeshCore companion radios.
//!
//! This crate drives a radio over a byte transport and mediates application
//! interaction with it:
//!
//! - [`SerialLink`] / [`BleLink`]: the two transport flavors. Serial wraps
//!   any `AsyncRead + AsyncWrite` byte stream and applies the
//!   length-prefixed envelope; BLE wraps a message-oriented notification
//!   stream and exchanges frames verbatim. Both feed whole frames into the
//!   session through an event channel.
//! - [`MeshClient`]: the session state machine. On connect it runs the init
//!   sequence (device query, app start, contact sync, channel discovery),
//!   then serves application requests and processes incoming messages and
//!   pushes, persisting into a per-device [`meshcore_store::Store`].
//! - [`ClientEvent`]: ordered broadcast stream of everything subscribers
//!   care about (contacts, channels, messages, errors).
//!
//! # Example
//!
//! ```rust,ignore
//! use meshcore_client::{ClientConfig, LinkEvent, MeshClient, SerialLink};
//! use tokio::sync::mpsc;
//!
//! let (tx, rx) = mpsc::channel(64);
//! let link = SerialLink::spawn(reader, writer, tx);
//! let mut client = MeshClient::new(Box::new(link), ClientConfig::default());
//! let mut events = client.subscribe();
//! client.run(rx).await;
//! ```

mod ble;
mod error;
mod events;
mod presets;
mod serial;
mod session;
mod settings;
mod transport;

pub use ble::*;
pub use error::*;
pub use events::*;
pub use presets::*;
pub use serial::*;
pub use session::*;
pub use settings::*;
pub use transport::*;
