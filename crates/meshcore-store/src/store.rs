//! SQLite-backed device store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use meshcore_protocol::{
    Channel, Contact, ContactType, DeviceInfo, Message, MessageKind, PublicKey, PublicKeyPrefix,
    SelfInfo, MAX_PATH_SIZE, PUB_KEY_SIZE,
};

use crate::error::StoreError;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Message kind discriminants as stored in `messages.message_type`.
const MSG_TYPE_CHANNEL: i64 = 0;
const MSG_TYPE_DIRECT: i64 = 1;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable per-device store for contacts, channels, and messages.
///
/// One store corresponds to one device scope (one SQLite file). Writes
/// within a scope are serialized by the interior mutex; distinct scopes are
/// independent stores.
pub struct Store {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Database file path for a device scope inside `dir`.
    pub fn db_path(dir: &Path, public_key: &[u8; PUB_KEY_SIZE]) -> PathBuf {
        dir.join(format!("device_{}.db", hex::encode(public_key)))
    }

    /// Open (or create) the scope for `public_key` inside `dir`.
    pub fn open_in(dir: &Path, public_key: &[u8; PUB_KEY_SIZE]) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = Self::db_path(dir, public_key);

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Store {
            conn: Mutex::new(conn),
            path,
        };
        store.initialize_schema()?;
        debug!(path = %store.path.display(), "device store opened");
        Ok(store)
    }

    /// Open the scope for `public_key` in the platform's per-user
    /// application data directory.
    pub fn open_default(public_key: &[u8; PUB_KEY_SIZE]) -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "meshcore")
            .ok_or(StoreError::NoDataDir)?;
        Self::open_in(dirs.data_dir(), public_key)
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // ========================================================================
    // Schema
    // ========================================================================

    fn initialize_schema(&self) -> Result<()> {
        let version = self.schema_version()?;

        if version == 0 {
            self.create_tables()?;
        } else if version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::SchemaTooNew {
                found: version,
                supported: CURRENT_SCHEMA_VERSION,
            });
        } else if version < CURRENT_SCHEMA_VERSION {
            self.migrate_schema(version)?;
        }

        Ok(())
    }

    /// Current schema version, 0 for a fresh database.
    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.lock()?;
        let exists: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(0);
        }

        let version: Option<i64> = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.unwrap_or(0))
    }

    fn migrate_schema(&self, from: i64) -> Result<()> {
        // v1 is the first published schema; nothing to migrate from yet.
        Err(StoreError::SchemaTooOld {
            found: from,
            oldest: CURRENT_SCHEMA_VERSION,
        })
    }

    fn create_tables(&self) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                 version INTEGER PRIMARY KEY,
                 applied_at INTEGER NOT NULL
             );

             CREATE TABLE IF NOT EXISTS device_info (
                 id INTEGER PRIMARY KEY CHECK (id = 1),
                 public_key BLOB NOT NULL,
                 node_name TEXT,
                 firmware_version INTEGER,
                 firmware_name TEXT,
                 protocol_version INTEGER,
                 contact_type INTEGER,
                 flags INTEGER,
                 last_connected_at INTEGER,
                 created_at INTEGER NOT NULL
             );

             CREATE TABLE IF NOT EXISTS contacts (
                 public_key BLOB PRIMARY KEY,
                 name TEXT NOT NULL,
                 type INTEGER NOT NULL,
                 flags INTEGER NOT NULL,
                 path_length INTEGER,
                 path BLOB,
                 last_advert_ts INTEGER,
                 last_modified INTEGER,
                 latitude INTEGER,
                 longitude INTEGER,
                 created_at INTEGER NOT NULL,
                 updated_at INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_contacts_name ON contacts(name);
             CREATE INDEX IF NOT EXISTS idx_contacts_updated_at ON contacts(updated_at);

             CREATE TABLE IF NOT EXISTS channels (
                 idx INTEGER PRIMARY KEY,
                 name TEXT NOT NULL,
                 secret BLOB NOT NULL,
                 created_at INTEGER NOT NULL,
                 updated_at INTEGER NOT NULL
             );

             CREATE TABLE IF NOT EXISTS messages (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 message_type INTEGER NOT NULL,
                 channel_idx INTEGER,
                 sender_prefix BLOB,
                 sender_name TEXT,
                 text TEXT NOT NULL,
                 timestamp INTEGER NOT NULL,
                 received_at INTEGER NOT NULL,
                 path_length INTEGER,
                 txt_type INTEGER,
                 snr REAL,
                 is_sent_by_me INTEGER DEFAULT 0
             );
             CREATE INDEX IF NOT EXISTS idx_messages_channel
                 ON messages(channel_idx, timestamp DESC);
             CREATE INDEX IF NOT EXISTS idx_messages_sender
                 ON messages(sender_prefix, timestamp DESC);
             CREATE INDEX IF NOT EXISTS idx_messages_received_at
                 ON messages(received_at DESC);
             CREATE INDEX IF NOT EXISTS idx_messages_timestamp
                 ON messages(timestamp DESC);

             CREATE TABLE IF NOT EXISTS message_hashes (
                 hash TEXT PRIMARY KEY,
                 message_id INTEGER NOT NULL,
                 created_at INTEGER NOT NULL,
                 FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
             );
             CREATE INDEX IF NOT EXISTS idx_message_hashes_created_at
                 ON message_hashes(created_at);",
        )?;

        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            params![CURRENT_SCHEMA_VERSION, now_secs()],
        )?;

        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Device info
    // ========================================================================

    /// Save the device metadata singleton, preserving `created_at`.
    pub fn save_device_info(&self, device: &DeviceInfo, node: &SelfInfo) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO device_info
                 (id, public_key, node_name, firmware_version, firmware_name,
                  protocol_version, contact_type, flags, last_connected_at, created_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                 COALESCE((SELECT created_at FROM device_info WHERE id = 1), ?9))",
            params![
                node.public_key.as_bytes().as_slice(),
                node.node_name,
                device.firmware_version,
                device.firmware_name,
                device.protocol_version,
                node.contact_type,
                node.flags,
                now_secs(),
                now_secs(),
            ],
        )?;
        Ok(())
    }

    /// Load the device metadata singleton, if one was saved.
    pub fn load_device_info(&self) -> Result<Option<(DeviceInfo, SelfInfo)>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT public_key, node_name, firmware_version, firmware_name,
                    protocol_version, contact_type, flags
             FROM device_info WHERE id = 1",
            [],
            |row| {
                let key: Vec<u8> = row.get(0)?;
                let device = DeviceInfo {
                    firmware_version: row.get::<_, i64>(2)? as u8,
                    firmware_name: row.get(3)?,
                    protocol_version: row.get::<_, i64>(4)? as u32,
                };
                let node = SelfInfo {
                    public_key: PublicKey::from_slice(&key).unwrap_or_default(),
                    node_name: row.get(1)?,
                    contact_type: row.get::<_, i64>(5)? as u8,
                    flags: row.get::<_, i64>(6)? as u8,
                    tx_power_dbm: 0,
                };
                Ok((device, node))
            },
        )
        .optional()
        .map_err(Into::into)
    }

    /// Record the current time as the last successful connection.
    pub fn touch_last_connected(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE device_info SET last_connected_at = ?1 WHERE id = 1",
            params![now_secs()],
        )?;
        Ok(())
    }

    // ========================================================================
    // Contacts
    // ========================================================================

    /// Insert or update a contact, preserving `created_at` and refreshing
    /// `updated_at`.
    pub fn save_contact(&self, contact: &Contact) -> Result<()> {
        let conn = self.lock()?;
        save_contact_with(&conn, contact)
    }

    /// Save a batch of contacts inside a single transaction.
    pub fn save_contacts(&self, contacts: &[Contact]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for contact in contacts {
            save_contact_with(&tx, contact)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a contact by public key.
    pub fn delete_contact(&self, public_key: &PublicKey) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM contacts WHERE public_key = ?1",
            params![public_key.as_bytes().as_slice()],
        )?;
        Ok(())
    }

    /// Load all contacts, ordered by name.
    pub fn load_contacts(&self) -> Result<Vec<Contact>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT public_key, name, type, flags, path_length, path,
                    last_advert_ts, last_modified, latitude, longitude
             FROM contacts ORDER BY name",
        )?;
        let rows = stmt.query_map([], contact_from_row)?;
        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    /// Load one contact by public key.
    pub fn load_contact(&self, public_key: &PublicKey) -> Result<Option<Contact>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT public_key, name, type, flags, path_length, path,
                    last_advert_ts, last_modified, latitude, longitude
             FROM contacts WHERE public_key = ?1",
            params![public_key.as_bytes().as_slice()],
            contact_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    // ========================================================================
    // Channels
    // ========================================================================

    /// Insert or update a channel slot, preserving `created_at`.
    pub fn save_channel(&self, channel: &Channel) -> Result<()> {
        let conn = self.lock()?;
        save_channel_with(&conn, channel)
    }

    /// Save a batch of channels inside a single transaction.
    pub fn save_channels(&self, channels: &[Channel]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for channel in channels {
            save_channel_with(&tx, channel)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a channel slot.
    pub fn delete_channel(&self, index: u8) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM channels WHERE idx = ?1", params![index])?;
        Ok(())
    }

    /// Load all channels, ordered by index.
    pub fn load_channels(&self) -> Result<Vec<Channel>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT idx, name, secret FROM channels ORDER BY idx")?;
        let rows = stmt.query_map([], channel_from_row)?;
        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?);
        }
        Ok(channels)
    }

    /// Load one channel slot.
    pub fn load_channel(&self, index: u8) -> Result<Option<Channel>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT idx, name, secret FROM channels WHERE idx = ?1",
            params![index],
            channel_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Content hash used for deduplication: SHA-256 over the sender
    /// identifier (display name for channel messages, key prefix for direct
    /// messages), the UTF-8 text, and the little-endian sender timestamp.
    pub fn message_hash(message: &Message) -> String {
        let mut hasher = Sha256::new();
        hasher.update(message.sender_identifier());
        hasher.update(message.text.as_bytes());
        hasher.update(message.timestamp.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    /// Whether a message with the same dedup hash was already saved.
    pub fn is_message_duplicate(&self, message: &Message) -> Result<bool> {
        let hash = Self::message_hash(message);
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM message_hashes WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Save a message. Duplicate saves (same sender identifier, text, and
    /// timestamp) are a no-op and still report success. Returns `true` when
    /// a new row was inserted.
    pub fn save_message(&self, message: &Message) -> Result<bool> {
        let hash = Self::message_hash(message);
        let mut conn = self.lock()?;

        let duplicate: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM message_hashes WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        if duplicate.is_some() {
            debug!(hash = %hash, "duplicate message skipped");
            return Ok(false);
        }

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO messages
                 (message_type, channel_idx, sender_prefix, sender_name, text,
                  timestamp, received_at, path_length, txt_type, snr, is_sent_by_me)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                match message.kind {
                    MessageKind::Channel => MSG_TYPE_CHANNEL,
                    MessageKind::Direct => MSG_TYPE_DIRECT,
                },
                message.channel_idx,
                message.sender_prefix.as_ref().map(|p| p.as_bytes().to_vec()),
                message.sender_name,
                message.text,
                message.timestamp,
                message.received_at as i64,
                message.path_len,
                message.txt_type,
                message.snr as f64,
                message.sent_by_me,
            ],
        )?;
        let message_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO message_hashes (hash, message_id, created_at) VALUES (?1, ?2, ?3)",
            params![hash, message_id, now_secs()],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Load messages newest-received first.
    pub fn load_messages(&self, limit: u32, offset: u32) -> Result<Vec<Message>> {
        self.query_messages(
            "SELECT message_type, channel_idx, sender_prefix, sender_name, text,
                    timestamp, received_at, path_length, txt_type, snr, is_sent_by_me
             FROM messages ORDER BY received_at DESC LIMIT ?1 OFFSET ?2",
            params![limit, offset],
        )
    }

    /// Load the history of one channel, newest first.
    pub fn load_channel_messages(&self, channel_idx: u8, limit: u32) -> Result<Vec<Message>> {
        self.query_messages(
            "SELECT message_type, channel_idx, sender_prefix, sender_name, text,
                    timestamp, received_at, path_length, txt_type, snr, is_sent_by_me
             FROM messages WHERE channel_idx = ?1 ORDER BY timestamp DESC LIMIT ?2",
            params![channel_idx, limit],
        )
    }

    /// Load the direct-message history with one peer, newest first.
    pub fn load_direct_messages(
        &self,
        sender_prefix: &PublicKeyPrefix,
        limit: u32,
    ) -> Result<Vec<Message>> {
        self.query_messages(
            "SELECT message_type, channel_idx, sender_prefix, sender_name, text,
                    timestamp, received_at, path_length, txt_type, snr, is_sent_by_me
             FROM messages WHERE sender_prefix = ?1 ORDER BY timestamp DESC LIMIT ?2",
            params![sender_prefix.as_bytes().to_vec(), limit],
        )
    }

    fn query_messages<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, message_from_row)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Total number of stored messages.
    pub fn message_count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of stored messages on one channel.
    pub fn channel_message_count(&self, channel_idx: u8) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE channel_idx = ?1",
            params![channel_idx],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Number of dedup hash rows (one per stored message).
    pub fn message_hash_count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM message_hashes", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Wipe every table in this scope.
    pub fn clear_all(&self) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM message_hashes;
             DELETE FROM messages;
             DELETE FROM channels;
             DELETE FROM contacts;
             DELETE FROM device_info;",
        )?;
        tx.commit()?;
        warn!(path = %self.path.display(), "device store cleared");
        Ok(())
    }
}

// ============================================================================
// Row mapping and shared statements
// ============================================================================

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn save_contact_with(conn: &Connection, contact: &Contact) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO contacts
             (public_key, name, type, flags, path_length, path, last_advert_ts,
              last_modified, latitude, longitude, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
             COALESCE((SELECT created_at FROM contacts WHERE public_key = ?1), ?11), ?12)",
        params![
            contact.public_key.as_bytes().as_slice(),
            contact.name,
            u8::from(contact.contact_type),
            contact.flags,
            contact.path_len,
            contact.path.to_vec(),
            contact.last_advert_timestamp,
            contact.last_modified,
            contact.latitude,
            contact.longitude,
            now_secs(),
            now_secs(),
        ],
    )?;
    Ok(())
}

fn save_channel_with(conn: &Connection, channel: &Channel) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO channels (idx, name, secret, created_at, updated_at)
         VALUES (?1, ?2, ?3,
             COALESCE((SELECT created_at FROM channels WHERE idx = ?1), ?4), ?5)",
        params![channel.index, channel.name, channel.secret, now_secs(), now_secs()],
    )?;
    Ok(())
}

fn contact_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let key: Vec<u8> = row.get(0)?;
    let path_blob: Vec<u8> = row.get::<_, Option<Vec<u8>>>(5)?.unwrap_or_default();
    let mut path = [0u8; MAX_PATH_SIZE];
    let len = path_blob.len().min(MAX_PATH_SIZE);
    path[..len].copy_from_slice(&path_blob[..len]);

    Ok(Contact {
        public_key: PublicKey::from_slice(&key).unwrap_or_default(),
        name: row.get(1)?,
        contact_type: ContactType::from(row.get::<_, i64>(2)? as u8),
        flags: row.get::<_, i64>(3)? as u8,
        path_len: row.get::<_, Option<i64>>(4)?.unwrap_or(-1) as i8,
        path,
        last_advert_timestamp: row.get::<_, Option<i64>>(6)?.unwrap_or(0) as u32,
        last_modified: row.get::<_, Option<i64>>(7)?.unwrap_or(0) as u32,
        latitude: row.get::<_, Option<i64>>(8)?.unwrap_or(0) as i32,
        longitude: row.get::<_, Option<i64>>(9)?.unwrap_or(0) as i32,
    })
}

fn channel_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        index: row.get::<_, i64>(0)? as u8,
        name: row.get(1)?,
        secret: row.get(2)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let kind = if row.get::<_, i64>(0)? == MSG_TYPE_DIRECT {
        MessageKind::Direct
    } else {
        MessageKind::Channel
    };
    let prefix: Option<Vec<u8>> = row.get(2)?;

    Ok(Message {
        kind,
        channel_idx: row.get::<_, Option<i64>>(1)?.map(|v| v as u8),
        sender_prefix: prefix.and_then(|p| PublicKeyPrefix::from_slice(&p)),
        sender_name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        text: row.get(4)?,
        timestamp: row.get::<_, i64>(5)? as u32,
        received_at: row.get::<_, i64>(6)? as u64,
        path_len: row.get::<_, Option<i64>>(7)?.unwrap_or(-1) as i8,
        txt_type: row.get::<_, Option<i64>>(8)?.unwrap_or(0) as u8,
        snr: row.get::<_, Option<f64>>(9)?.unwrap_or(0.0) as f32,
        sent_by_me: row.get::<_, Option<bool>>(10)?.unwrap_or(false),
    })
}
