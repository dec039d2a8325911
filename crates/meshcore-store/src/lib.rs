//! Per-device persistence for MeshCore host clients.
//!
//! Each radio gets its own SQLite database file named after its 32-byte
//! public key (`device_<hex>.db`), so distinct devices never share state and
//! a device resumes its history on reconnect. The store holds contacts,
//! channels, messages (with content-hash deduplication), and a small device
//! metadata record.
//!
//! # Example
//!
//! ```rust,ignore
//! use meshcore_store::Store;
//!
//! let store = Store::open_in(data_dir, self_info.public_key.as_bytes())?;
//! store.save_contact(&contact)?;
//! let history = store.load_messages(50, 0)?;
//! ```

mod error;
mod store;

pub use error::*;
pub use store::*;
