//! Session state machine and client surface.
//!
//! One [`MeshClient`] drives one radio over one link. On connect it walks
//! the init sequence (device query → app start → contact sync → channel
//! discovery), then stays in READY serving caller requests and processing
//! incoming messages and pushes. All protocol state lives on one task:
//! link events are handled to completion, in arrival order.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use meshcore_protocol::{
    is_push, Channel, ChannelMessageEvent, Command, Contact, ContactMessageEvent, DeviceInfo,
    FirmwareError, Message, Push, PublicKey, PublicKeyPrefix, RadioParams, Response, SelfInfo,
    TextType, PROTOCOL_VERSION,
};
use meshcore_store::{Store, StoreError};

use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::presets::find_preset;
use crate::transport::{FrameSink, LinkErrorKind, LinkEvent, LinkState};

/// Capacity of the subscriber broadcast channel.
const EVENT_CAPACITY: usize = 64;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// App name sent in APP_START.
    pub app_name: String,
    /// App version byte sent in APP_START.
    pub app_version: u8,
    /// Persist contacts/channels/messages to the per-device store.
    pub persistence: bool,
    /// Directory for device databases; None uses the platform default.
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            app_name: "MeshCoreQt".to_string(),
            app_version: 1,
            persistence: true,
            data_dir: None,
        }
    }
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport, or transport lost.
    Idle,
    /// DEVICE_QUERY sent, waiting for DEVICE_INFO.
    AwaitDeviceInfo,
    /// APP_START sent, waiting for SELF_INFO.
    AwaitSelfInfo,
    /// GET_CONTACTS sent, streaming the contact list.
    AwaitContacts,
    /// Walking channel slots with GET_CHANNEL.
    DiscoverChannels,
    /// Init complete; caller requests are accepted.
    Ready,
    /// Unrecoverable failure; reopen the transport to retry.
    Failed,
}

/// Host-side client for one MeshCore radio.
///
/// Owns the link exclusively; the persistence store is shared and opened
/// per-device once the node identity is known.
pub struct MeshClient {
    config: ClientConfig,
    link: Box<dyn FrameSink>,
    state: SessionState,
    device_info: Option<DeviceInfo>,
    self_info: Option<SelfInfo>,
    contacts: Vec<Contact>,
    channels: BTreeMap<u8, Channel>,
    next_channel_idx: u8,
    /// Opcode of the last outgoing READY-state request. The next response
    /// consumes it; an ERR binds to it, a disconnect cancels it.
    pending_request: Option<u8>,
    store: Option<Arc<Store>>,
    events: broadcast::Sender<ClientEvent>,
}

impl MeshClient {
    /// Create a client over an opened link. The link must push its events
    /// into the channel the caller will drive [`MeshClient::run`] (or
    /// [`MeshClient::handle_link_event`]) with.
    pub fn new(link: Box<dyn FrameSink>, config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut channels = BTreeMap::new();
        let public = Channel::public_channel();
        channels.insert(public.index, public);

        MeshClient {
            config,
            link,
            state: SessionState::Idle,
            device_info: None,
            self_info: None,
            contacts: Vec::new(),
            channels,
            next_channel_idx: 0,
            pending_request: None,
            store: None,
            events,
        }
    }

    /// Subscribe to the ordered client event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Device info captured during init.
    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device_info.as_ref()
    }

    /// Local node identity captured during init.
    pub fn self_info(&self) -> Option<&SelfInfo> {
        self.self_info.as_ref()
    }

    /// Contacts known to this session.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Channels known to this session, ordered by index.
    pub fn channels(&self) -> Vec<Channel> {
        self.channels.values().cloned().collect()
    }

    /// The open per-device store, when persistence is active.
    pub fn store(&self) -> Option<&Arc<Store>> {
        self.store.as_ref()
    }

    /// Drive the session from a link event channel until the link
    /// disconnects. The session can be reused after an explicit reopen.
    pub async fn run(&mut self, mut link_events: mpsc::Receiver<LinkEvent>) {
        while let Some(event) = link_events.recv().await {
            let disconnected = matches!(event, LinkEvent::State(LinkState::Disconnected));
            self.handle_link_event(event);
            if disconnected {
                break;
            }
        }
    }

    /// Close the link and reset the session to Idle.
    pub fn close(&mut self) {
        self.link.close();
        self.on_disconnected();
    }

    // ========================================================================
    // Dispatcher
    // ========================================================================

    /// Feed one link event through the session. Handlers run to completion
    /// before the next event is pulled, so state transitions, persistence
    /// writes, and notifications stay in arrival order.
    pub fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::State(LinkState::Connected) => {
                info!("link connected");
                self.emit(ClientEvent::Connected);
                if self.state == SessionState::Idle {
                    self.start_init();
                }
            }
            LinkEvent::State(LinkState::Disconnected) => {
                self.on_disconnected();
            }
            LinkEvent::State(state) => {
                trace!(?state, "link state changed");
            }
            LinkEvent::Frame(frame) => {
                self.dispatch_frame(&frame);
            }
            LinkEvent::Error { kind, message } => {
                warn!(?kind, message = %message, "link error");
                self.emit(ClientEvent::Error {
                    message: message.clone(),
                });
                if kind == LinkErrorKind::Disconnect {
                    self.on_disconnected();
                }
            }
        }
    }

    fn dispatch_frame(&mut self, frame: &[u8]) {
        if frame.is_empty() {
            trace!("empty frame dropped");
            return;
        }

        if is_push(frame) {
            match Push::decode(frame) {
                Ok(push) => self.handle_push(push),
                Err(err) => warn!(error = %err, "discarding malformed push"),
            }
        } else {
            match Response::decode(frame) {
                Ok(response) => self.handle_response(response),
                Err(err) => warn!(error = %err, "discarding malformed response"),
            }
        }
    }

    // ========================================================================
    // Init sequence
    // ========================================================================

    fn start_init(&mut self) {
        debug!("starting init sequence");
        self.state = SessionState::AwaitDeviceInfo;
        self.send_or_fail(&Command::DeviceQuery {
            app_target_version: PROTOCOL_VERSION,
        });
    }

    fn send_app_start(&mut self) {
        self.state = SessionState::AwaitSelfInfo;
        self.send_or_fail(&Command::AppStart {
            app_version: self.config.app_version,
            app_name: self.config.app_name.clone(),
        });
    }

    fn send_get_contacts(&mut self) {
        self.state = SessionState::AwaitContacts;
        self.send_or_fail(&Command::GetContacts { since: 0 });
    }

    fn begin_channel_discovery(&mut self) {
        self.state = SessionState::DiscoverChannels;
        self.next_channel_idx = 0;
        self.send_or_fail(&Command::GetChannel { index: 0 });
    }

    fn finish_channel_discovery(&mut self) {
        debug!(
            channels = self.channels.len(),
            "channel discovery complete"
        );
        self.emit(ClientEvent::ChannelListUpdated);
        self.state = SessionState::Ready;
        info!("session ready");
        self.emit(ClientEvent::InitComplete);
    }

    fn open_store_scope(&mut self) {
        if !self.config.persistence {
            return;
        }
        let Some(self_info) = self.self_info.clone() else {
            return;
        };

        let opened = match &self.config.data_dir {
            Some(dir) => Store::open_in(dir, self_info.public_key.as_bytes()),
            None => Store::open_default(self_info.public_key.as_bytes()),
        };

        match opened {
            Ok(store) => {
                if let Some(device_info) = &self.device_info {
                    if let Err(err) = store.save_device_info(device_info, &self_info) {
                        warn!(error = %err, "failed to save device info");
                    }
                }
                for channel in self.channels.values() {
                    if let Err(err) = store.save_channel(channel) {
                        warn!(error = %err, "failed to save channel");
                    }
                }
                // Seed the in-memory contact list from the cache; the sync
                // that follows overwrites entries the device still has.
                match store.load_contacts() {
                    Ok(cached) => {
                        debug!(count = cached.len(), "loaded cached contacts");
                        self.contacts = cached;
                    }
                    Err(err) => warn!(error = %err, "failed to load cached contacts"),
                }
                self.store = Some(Arc::new(store));
            }
            Err(err) => {
                warn!(error = %err, "failed to open device store");
                self.emit(ClientEvent::Error {
                    message: format!("persistence unavailable: {}", err),
                });
            }
        }
    }

    // ========================================================================
    // Response handling
    // ========================================================================

    fn handle_response(&mut self, response: Response) {
        // Any response consumes the pending-request slot; pushes arriving
        // in between never do.
        let pending = if self.state == SessionState::Ready {
            self.pending_request.take()
        } else {
            None
        };

        match response {
            Response::ChannelMessage(event) => self.on_channel_message(event),
            Response::ContactMessage(event) => self.on_contact_message(event),
            Response::NoMoreMessages => {
                debug!("offline queue empty");
                self.emit(ClientEvent::NoMoreMessages);
            }
            Response::Sent => {
                debug!("message accepted for transmission");
                self.emit(ClientEvent::MessageSent);
            }
            Response::CurrentTime { time_secs } => {
                self.emit(ClientEvent::DeviceTime { time_secs });
            }
            Response::Ok => {
                debug!("OK response");
            }
            Response::Unknown { code, .. } => {
                warn!(code, "unhandled response code");
            }
            other => self.advance_state(other, pending),
        }
    }

    /// State-dependent responses: the init ladder plus READY-state contact
    /// and channel traffic. Device errors during init collapse forward so a
    /// partially capable firmware still reaches READY; in READY they bind
    /// to the pending request.
    fn advance_state(&mut self, response: Response, pending: Option<u8>) {
        match self.state {
            SessionState::AwaitDeviceInfo => match response {
                Response::DeviceInfo(info) => {
                    debug!(firmware = %info.firmware_name, "device info received");
                    self.device_info = Some(info);
                    self.send_app_start();
                }
                Response::Error(err) => {
                    warn!(error = %err, "device query failed, continuing init");
                    self.send_app_start();
                }
                other => self.unexpected(other),
            },

            SessionState::AwaitSelfInfo => match response {
                Response::SelfInfo(info) => {
                    debug!(key = %info.public_key.to_hex(), "self info received");
                    self.self_info = Some(info);
                    self.open_store_scope();
                    self.send_get_contacts();
                }
                Response::Error(err) => {
                    warn!(error = %err, "app start failed, continuing init");
                    self.send_get_contacts();
                }
                other => self.unexpected(other),
            },

            SessionState::AwaitContacts => match response {
                Response::ContactsStart => {
                    debug!("contact sync started");
                    self.contacts.clear();
                }
                Response::Contact(contact) => {
                    if contact.is_valid() {
                        debug!(name = %contact.name, "contact received");
                        self.upsert_contact(contact.clone());
                        self.persist_contact(&contact);
                        self.emit(ClientEvent::ContactReceived(contact));
                    }
                }
                Response::EndOfContacts => {
                    debug!(count = self.contacts.len(), "contact sync complete");
                    self.emit(ClientEvent::ContactsUpdated);
                    self.begin_channel_discovery();
                }
                Response::Error(err) => {
                    warn!(error = %err, "contact sync failed, continuing init");
                    self.emit(ClientEvent::ContactsUpdated);
                    self.begin_channel_discovery();
                }
                other => self.unexpected(other),
            },

            SessionState::DiscoverChannels => match response {
                Response::ChannelInfo(channel) => {
                    if channel.is_empty() {
                        debug!(index = channel.index, "skipping empty channel slot");
                    } else {
                        debug!(index = channel.index, name = %channel.name, "channel discovered");
                        self.channels.insert(channel.index, channel.clone());
                        self.persist_channel(&channel);
                        self.emit(ClientEvent::ChannelDiscovered(channel));
                    }
                    self.next_channel_idx = self.next_channel_idx.wrapping_add(1);
                    let index = self.next_channel_idx;
                    self.send_or_fail(&Command::GetChannel { index });
                }
                Response::Error(FirmwareError::NotFound) => {
                    self.finish_channel_discovery();
                }
                Response::Error(err) => {
                    warn!(error = %err, "channel discovery error, finishing");
                    self.finish_channel_discovery();
                }
                other => self.unexpected(other),
            },

            SessionState::Ready => match response {
                Response::Contact(contact) => {
                    if contact.is_valid() {
                        self.upsert_contact(contact.clone());
                        self.persist_contact(&contact);
                        self.emit(ClientEvent::ContactReceived(contact));
                        self.emit(ClientEvent::ContactsUpdated);
                    }
                }
                Response::ChannelInfo(channel) => {
                    if !channel.is_empty() {
                        self.channels.insert(channel.index, channel.clone());
                        self.persist_channel(&channel);
                        self.emit(ClientEvent::ChannelDiscovered(channel));
                        self.emit(ClientEvent::ChannelListUpdated);
                    }
                }
                Response::Error(err) => {
                    let error = Arc::new(ClientError::Device(err));
                    warn!(error = %error, request = ?pending, "device error");
                    self.emit(ClientEvent::RequestFailed {
                        request: pending,
                        error,
                    });
                }
                other => self.unexpected(other),
            },

            SessionState::Idle | SessionState::Failed => {
                trace!(?response, "response outside an active session");
            }
        }
    }

    fn unexpected(&mut self, response: Response) {
        warn!(state = ?self.state, response = ?response, "unexpected response, state retained");
    }

    // ========================================================================
    // Push handling
    // ========================================================================

    /// Pushes may arrive at any time, including before init completes; they
    /// never alter init state.
    fn handle_push(&mut self, push: Push) {
        match push {
            Push::MessageWaiting => {
                debug!("message waiting, auto-syncing");
                if let Err(err) = self.send(&Command::SyncNextMessage) {
                    warn!(error = %err, "failed to auto-sync");
                }
            }
            Push::SendConfirmed {
                ack_hash,
                trip_time_ms,
            } => {
                debug!(ack_hash, trip_time_ms, "send confirmed");
                self.emit(ClientEvent::SendConfirmed {
                    ack_hash,
                    trip_time_ms,
                });
            }
            Push::PathUpdated { public_key } => {
                debug!("path updated");
                self.emit(ClientEvent::PathUpdated { public_key });
            }
            Push::LogRxData { snr_x4, rssi, raw } => {
                let snr = snr_x4 as f32 / 4.0;
                debug!(snr, rssi, len = raw.len(), "raw RX data");
                self.emit(ClientEvent::RawRx { snr, rssi, raw });
            }
            Push::Unknown { code, .. } => {
                trace!(code, "unhandled push code");
            }
        }
    }

    // ========================================================================
    // Incoming messages
    // ========================================================================

    fn on_channel_message(&mut self, event: ChannelMessageEvent) {
        let message = Message::from_channel_recv(
            event.channel_idx,
            &event.text,
            event.timestamp,
            event.path_len as i8,
            event.txt_type,
            event.snr(),
            now_secs(),
        );
        debug!(
            channel = event.channel_idx,
            sender = %message.sender_name,
            "channel message received"
        );
        self.persist_message(&message);
        self.emit(ClientEvent::MessageReceived(message));
    }

    fn on_contact_message(&mut self, event: ContactMessageEvent) {
        let message = Message::from_direct_recv(
            event.sender_prefix,
            &event.text,
            event.timestamp,
            event.path_len,
            event.txt_type,
            event.snr(),
            now_secs(),
        );
        debug!(sender = %event.sender_prefix.to_hex(), "direct message received");
        self.persist_message(&message);
        self.emit(ClientEvent::MessageReceived(message));
    }

    // ========================================================================
    // Caller operations (READY state)
    // ========================================================================

    /// Join a channel: writes the next free slot on the device and records
    /// it locally. The PSK is hex, 32 or 64 characters (16 or 32 bytes).
    /// Returns the chosen slot index.
    pub fn join_channel(&mut self, name: &str, psk_hex: &str) -> Result<u8, ClientError> {
        self.ensure_ready()?;
        if psk_hex.len() != 32 && psk_hex.len() != 64 {
            return Err(ClientError::InvalidArgument(
                "PSK must be 32 or 64 hex characters (16 or 32 bytes)".into(),
            ));
        }
        let secret = hex::decode(psk_hex)
            .map_err(|_| ClientError::InvalidArgument("PSK is not valid hex".into()))?;
        if name.trim().is_empty() {
            return Err(ClientError::InvalidArgument("channel name is empty".into()));
        }

        let index = self.next_free_channel_index();
        let channel = Channel {
            index,
            name: name.to_string(),
            secret,
        };
        info!(index, name = %channel.name, "joining channel");
        self.send(&Command::SetChannel {
            channel: channel.clone(),
        })?;

        self.channels.insert(index, channel.clone());
        self.persist_channel(&channel);
        self.emit(ClientEvent::ChannelListUpdated);
        Ok(index)
    }

    /// Write a channel slot verbatim.
    pub fn set_channel(&mut self, channel: &Channel) -> Result<(), ClientError> {
        self.ensure_ready()?;
        if channel.secret.len() != 16 && channel.secret.len() != 32 {
            return Err(ClientError::InvalidArgument(
                "channel secret must be 16 or 32 bytes".into(),
            ));
        }
        self.send(&Command::SetChannel {
            channel: channel.clone(),
        })?;
        self.channels.insert(channel.index, channel.clone());
        self.persist_channel(channel);
        self.emit(ClientEvent::ChannelListUpdated);
        Ok(())
    }

    /// Ask the device for one channel slot (answered via events).
    pub fn request_channel(&mut self, index: u8) -> Result<(), ClientError> {
        self.ensure_ready()?;
        self.send(&Command::GetChannel { index })
    }

    /// Send a text message to a channel the session knows about.
    pub fn send_channel_message(&mut self, channel_idx: u8, text: &str) -> Result<(), ClientError> {
        self.ensure_ready()?;
        if !self.channels.contains_key(&channel_idx) {
            return Err(ClientError::InvalidArgument(format!(
                "channel {} not found",
                channel_idx
            )));
        }
        debug!(channel = channel_idx, "sending channel message");
        self.send(&Command::SendChannelTextMessage {
            text_type: TextType::Plain,
            channel_idx,
            timestamp: now_secs() as u32,
            text: text.to_string(),
        })
    }

    /// Send a direct text message. `recipient` is a public key or key
    /// prefix; at least 6 bytes are required.
    pub fn send_direct_message(&mut self, recipient: &[u8], text: &str) -> Result<(), ClientError> {
        self.ensure_ready()?;
        let prefix = PublicKeyPrefix::from_slice(recipient).ok_or_else(|| {
            ClientError::InvalidArgument("recipient key must be at least 6 bytes".into())
        })?;
        debug!(recipient = %prefix.to_hex(), "sending direct message");
        self.send(&Command::SendTextMessage {
            text_type: TextType::Plain,
            attempt: 0,
            timestamp: now_secs() as u32,
            recipient_prefix: prefix,
            text: text.to_string(),
        })
    }

    /// Pull the next message from the device's offline queue.
    pub fn sync_next_message(&mut self) -> Result<(), ClientError> {
        self.ensure_ready()?;
        self.send(&Command::SyncNextMessage)
    }

    /// Push a contact record to the device and record it locally.
    pub fn add_update_contact(&mut self, contact: &Contact) -> Result<(), ClientError> {
        self.ensure_ready()?;
        if !contact.is_valid() {
            return Err(ClientError::InvalidArgument(
                "contact needs a 32-byte key and a non-empty name".into(),
            ));
        }
        info!(name = %contact.name, "adding/updating contact");
        self.send(&Command::AddUpdateContact {
            contact: contact.clone(),
        })?;
        self.upsert_contact(contact.clone());
        self.persist_contact(contact);
        self.emit(ClientEvent::ContactReceived(contact.clone()));
        self.emit(ClientEvent::ContactsUpdated);
        Ok(())
    }

    /// Remove a contact from the device and the local records.
    pub fn remove_contact(&mut self, public_key: &[u8]) -> Result<(), ClientError> {
        self.ensure_ready()?;
        let key = PublicKey::from_slice(public_key).ok_or_else(|| {
            ClientError::InvalidArgument("public key must be exactly 32 bytes".into())
        })?;
        info!(key = %key.to_hex(), "removing contact");
        self.send(&Command::RemoveContact { public_key: key })?;

        self.contacts.retain(|c| c.public_key != key);
        if let Some(store) = &self.store {
            if let Err(err) = store.delete_contact(&key) {
                warn!(error = %err, "failed to delete contact");
            }
        }
        self.emit(ClientEvent::ContactRemoved(key));
        self.emit(ClientEvent::ContactsUpdated);
        Ok(())
    }

    /// Ask the device for one contact by key (answered via events).
    pub fn request_contact(&mut self, public_key: &[u8]) -> Result<(), ClientError> {
        self.ensure_ready()?;
        let key = PublicKey::from_slice(public_key).ok_or_else(|| {
            ClientError::InvalidArgument("public key must be exactly 32 bytes".into())
        })?;
        self.send(&Command::GetContactByKey { public_key: key })
    }

    /// Broadcast a self-advertisement.
    pub fn send_self_advert(&mut self, flood: bool) -> Result<(), ClientError> {
        self.ensure_ready()?;
        self.send(&Command::SendSelfAdvert { flood })
    }

    /// Change the advertised node name.
    pub fn set_advert_name(&mut self, name: &str) -> Result<(), ClientError> {
        self.ensure_ready()?;
        if name.trim().is_empty() {
            return Err(ClientError::InvalidArgument("name is empty".into()));
        }
        self.send(&Command::SetAdvertName {
            name: name.to_string(),
        })
    }

    /// Change the advertised location (degrees).
    pub fn set_advert_location(&mut self, latitude: f64, longitude: f64) -> Result<(), ClientError> {
        self.ensure_ready()?;
        self.send(&Command::SetAdvertLatLon {
            lat: (latitude * 1_000_000.0) as i32,
            lon: (longitude * 1_000_000.0) as i32,
        })
    }

    /// Apply radio parameters after range-checking them.
    pub fn set_radio_params(&mut self, params: RadioParams) -> Result<(), ClientError> {
        self.ensure_ready()?;
        if !params.is_valid() {
            return Err(ClientError::InvalidArgument(
                "radio parameters out of range".into(),
            ));
        }
        info!(
            freq_khz = params.freq_khz,
            bw_hz = params.bandwidth_hz,
            sf = params.spreading_factor,
            cr = params.coding_rate,
            "setting radio parameters"
        );
        self.send(&Command::SetRadioParams { params })
    }

    /// Apply a named regional preset.
    pub fn set_radio_preset(&mut self, key: &str) -> Result<(), ClientError> {
        let preset = find_preset(key)
            .ok_or_else(|| ClientError::InvalidArgument(format!("unknown radio preset: {}", key)))?;
        self.set_radio_params(preset.params)
    }

    /// Set the radio TX power.
    pub fn set_tx_power(&mut self, power_dbm: u8) -> Result<(), ClientError> {
        self.ensure_ready()?;
        self.send(&Command::SetRadioTxPower { power_dbm })
    }

    /// Set the device clock.
    pub fn set_device_time(&mut self, time_secs: u32) -> Result<(), ClientError> {
        self.ensure_ready()?;
        self.send(&Command::SetDeviceTime { time_secs })
    }

    /// Ask for the device clock (answered via [`ClientEvent::DeviceTime`]).
    pub fn request_device_time(&mut self) -> Result<(), ClientError> {
        self.ensure_ready()?;
        self.send(&Command::GetDeviceTime)
    }

    // ========================================================================
    // History accessors (store-backed)
    // ========================================================================

    /// Load persisted messages, newest-received first.
    pub fn message_history(&self, limit: u32, offset: u32) -> Result<Vec<Message>, ClientError> {
        let store = self.require_store()?;
        Ok(store.load_messages(limit, offset)?)
    }

    /// Load the persisted history of one channel.
    pub fn channel_history(&self, channel_idx: u8, limit: u32) -> Result<Vec<Message>, ClientError> {
        let store = self.require_store()?;
        Ok(store.load_channel_messages(channel_idx, limit)?)
    }

    /// Load the persisted direct-message history with one peer.
    pub fn direct_history(
        &self,
        sender_prefix: &PublicKeyPrefix,
        limit: u32,
    ) -> Result<Vec<Message>, ClientError> {
        let store = self.require_store()?;
        Ok(store.load_direct_messages(sender_prefix, limit)?)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_ready(&self) -> Result<(), ClientError> {
        if self.state == SessionState::Ready {
            Ok(())
        } else {
            Err(ClientError::NotReady)
        }
    }

    fn require_store(&self) -> Result<&Arc<Store>, ClientError> {
        self.store
            .as_ref()
            .ok_or(ClientError::Persistence(StoreError::NotOpen))
    }

    fn send(&mut self, command: &Command) -> Result<(), ClientError> {
        trace!(code = command.code(), "sending command");
        self.link.send_frame(&command.encode())?;
        if self.state == SessionState::Ready {
            self.pending_request = Some(command.code());
        }
        Ok(())
    }

    /// Init-sequence sends: a transport failure here fails the session.
    fn send_or_fail(&mut self, command: &Command) {
        if let Err(err) = self.send(command) {
            warn!(error = %err, "init send failed");
            self.state = SessionState::Failed;
            self.emit(ClientEvent::Error {
                message: format!("init failed: {}", err),
            });
        }
    }

    fn next_free_channel_index(&self) -> u8 {
        // Slot 0 is the public channel.
        (1..=u8::MAX)
            .find(|idx| !self.channels.contains_key(idx))
            .unwrap_or(1)
    }

    fn upsert_contact(&mut self, contact: Contact) {
        if let Some(existing) = self
            .contacts
            .iter_mut()
            .find(|c| c.public_key == contact.public_key)
        {
            *existing = contact;
        } else {
            self.contacts.push(contact);
        }
    }

    fn persist_contact(&self, contact: &Contact) {
        if let Some(store) = &self.store {
            if let Err(err) = store.save_contact(contact) {
                warn!(error = %err, "failed to save contact");
            }
        }
    }

    fn persist_channel(&self, channel: &Channel) {
        if let Some(store) = &self.store {
            if let Err(err) = store.save_channel(channel) {
                warn!(error = %err, "failed to save channel");
            }
        }
    }

    /// Persistence failures on the receive path are logged and broadcast but
    /// never stop message delivery.
    fn persist_message(&self, message: &Message) {
        if let Some(store) = &self.store {
            match store.save_message(message) {
                Ok(inserted) => {
                    if !inserted {
                        debug!("duplicate message, store unchanged");
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to save message");
                    self.emit(ClientEvent::Error {
                        message: format!("failed to save message: {}", err),
                    });
                }
            }
        }
    }

    fn on_disconnected(&mut self) {
        if self.state == SessionState::Idle && self.store.is_none() {
            return;
        }
        info!("link disconnected, session reset");

        // A request still awaiting its response resolves with Cancelled
        // before the reset is announced.
        if let Some(request) = self.pending_request.take() {
            self.emit(ClientEvent::RequestFailed {
                request: Some(request),
                error: Arc::new(ClientError::Cancelled),
            });
        }

        if let Some(store) = self.store.take() {
            if let Err(err) = store.touch_last_connected() {
                warn!(error = %err, "failed to record last-connected time");
            }
        }

        self.state = SessionState::Idle;
        self.device_info = None;
        self.self_info = None;
        self.contacts.clear();
        self.channels.clear();
        let public = Channel::public_channel();
        self.channels.insert(public.index, public);
        self.next_channel_idx = 0;

        self.emit(ClientEvent::Disconnected);
    }

    fn emit(&self, event: ClientEvent) {
        // Send only fails when nobody subscribed, which is fine.
        let _ = self.events.send(event);
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use meshcore_protocol::MessageKind;

    /// Records sent frames instead of touching a medium.
    struct TestLink {
        sent: Arc<StdMutex<Vec<Vec<u8>>>>,
        state: Arc<StdMutex<LinkState>>,
    }

    impl TestLink {
        fn new() -> (Self, Arc<StdMutex<Vec<Vec<u8>>>>, Arc<StdMutex<LinkState>>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let state = Arc::new(StdMutex::new(LinkState::Connected));
            (
                TestLink {
                    sent: sent.clone(),
                    state: state.clone(),
                },
                sent,
                state,
            )
        }
    }

    impl FrameSink for TestLink {
        fn send_frame(&mut self, frame: &[u8]) -> Result<(), crate::TransportError> {
            if *self.state.lock().unwrap() != LinkState::Connected {
                return Err(crate::TransportError::NotOpen);
            }
            self.sent.lock().unwrap().push(frame.to_vec());
            Ok(())
        }

        fn state(&self) -> LinkState {
            *self.state.lock().unwrap()
        }

        fn close(&mut self) {
            *self.state.lock().unwrap() = LinkState::Disconnected;
        }
    }

    fn test_client(
        data_dir: &std::path::Path,
    ) -> (
        MeshClient,
        Arc<StdMutex<Vec<Vec<u8>>>>,
        broadcast::Receiver<ClientEvent>,
    ) {
        let (link, sent, _state) = TestLink::new();
        let config = ClientConfig {
            data_dir: Some(data_dir.to_path_buf()),
            ..ClientConfig::default()
        };
        let client = MeshClient::new(Box::new(link), config);
        let events = client.subscribe();
        (client, sent, events)
    }

    fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn device_info_frame() -> Vec<u8> {
        let mut frame = vec![0u8; 80];
        frame[0] = 13;
        frame[1] = 1;
        frame[20..24].copy_from_slice(b"MyFW");
        frame[60..64].copy_from_slice(b"v1.2");
        frame
    }

    fn self_info_frame(key_byte: u8) -> Vec<u8> {
        let mut frame = vec![0u8; 46];
        frame[0] = 5;
        frame[1] = 1;
        frame[4..36].copy_from_slice(&[key_byte; 32]);
        frame
    }

    fn channel_info_frame(index: u8, name: &str, secret_byte: u8) -> Vec<u8> {
        let mut frame = vec![0u8; 50];
        frame[0] = 18;
        frame[1] = index;
        frame[2..2 + name.len()].copy_from_slice(name.as_bytes());
        frame[34..50].copy_from_slice(&[secret_byte; 16]);
        frame
    }

    fn contact_frame(key_byte: u8, name: &str) -> Vec<u8> {
        let mut frame = vec![0u8; 148];
        frame[0] = 3;
        frame[1..33].copy_from_slice(&[key_byte; 32]);
        frame[33] = 1;
        frame[35] = 0xFF;
        frame[100..100 + name.len()].copy_from_slice(name.as_bytes());
        frame
    }

    fn channel_msg_frame() -> Vec<u8> {
        let mut frame = vec![
            0x11u8, 0x14, 0x00, 0x00, 0x00, 0xFF, 0x00, 0xEF, 0xBE, 0xAD, 0xDE,
        ];
        frame.extend_from_slice(b"Alice: hi\0");
        frame
    }

    fn feed(client: &mut MeshClient, frame: Vec<u8>) {
        client.handle_link_event(LinkEvent::Frame(frame));
    }

    /// Run the whole init ladder; leaves the session READY.
    fn make_ready(client: &mut MeshClient) {
        client.handle_link_event(LinkEvent::State(LinkState::Connected));
        feed(client, device_info_frame());
        feed(client, self_info_frame(0x11));
        feed(client, vec![2]); // CONTACTS_START
        feed(client, vec![4]); // END_OF_CONTACTS
        feed(client, vec![1, 2]); // ERR NOT_FOUND
        assert_eq!(client.state(), SessionState::Ready);
    }

    #[test]
    fn init_happy_path_states_and_commands() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, sent, mut events) = test_client(dir.path());
        assert_eq!(client.state(), SessionState::Idle);

        client.handle_link_event(LinkEvent::State(LinkState::Connected));
        assert_eq!(client.state(), SessionState::AwaitDeviceInfo);

        feed(&mut client, device_info_frame());
        assert_eq!(client.state(), SessionState::AwaitSelfInfo);
        assert_eq!(client.device_info().unwrap().firmware_name, "MyFW v1.2");

        feed(&mut client, self_info_frame(0x11));
        assert_eq!(client.state(), SessionState::AwaitContacts);
        assert_eq!(
            client.self_info().unwrap().public_key.as_bytes(),
            &[0x11; 32]
        );

        feed(&mut client, vec![2]);
        feed(&mut client, vec![4]);
        assert_eq!(client.state(), SessionState::DiscoverChannels);

        feed(&mut client, vec![1, 2]);
        assert_eq!(client.state(), SessionState::Ready);

        let frames = sent.lock().unwrap().clone();
        let mut app_start = vec![1u8, 1];
        app_start.extend_from_slice(b"MeshCoreQt");
        app_start.push(0);
        assert_eq!(
            frames,
            vec![
                vec![22, 3],
                app_start,
                vec![4, 0, 0, 0, 0],
                vec![31, 0],
            ]
        );

        let seen = drain(&mut events);
        assert!(seen.iter().any(|e| matches!(e, ClientEvent::Connected)));
        assert!(seen
            .iter()
            .any(|e| matches!(e, ClientEvent::ContactsUpdated)));
        assert!(seen
            .iter()
            .any(|e| matches!(e, ClientEvent::InitComplete)));

        // The store scope opened under the node key and holds the seeded
        // public channel plus the device record.
        let store = client.store().unwrap();
        let channels = store.load_channels().unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Public");
        assert!(store.load_device_info().unwrap().is_some());
    }

    #[test]
    fn discovery_skips_empty_slots_but_continues() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, sent, mut events) = test_client(dir.path());

        client.handle_link_event(LinkEvent::State(LinkState::Connected));
        feed(&mut client, device_info_frame());
        feed(&mut client, self_info_frame(0x11));
        feed(&mut client, vec![2]);
        feed(&mut client, vec![4]);
        drain(&mut events);

        feed(&mut client, channel_info_frame(0, "Public", 0xAB));
        feed(&mut client, channel_info_frame(1, "", 0x00)); // empty sentinel
        feed(&mut client, channel_info_frame(2, "Alpha", 0xCD));
        feed(&mut client, vec![1, 2]); // ERR NOT_FOUND

        assert_eq!(client.state(), SessionState::Ready);

        // One GET_CHANNEL per probed slot.
        let frames = sent.lock().unwrap().clone();
        let probes: Vec<_> = frames.iter().filter(|f| f[0] == 31).cloned().collect();
        assert_eq!(
            probes,
            vec![vec![31, 0], vec![31, 1], vec![31, 2], vec![31, 3]]
        );

        // Indices {0, 2} surfaced and persisted; index 1 skipped.
        let indices: Vec<u8> = client.channels().iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 2]);
        let stored: Vec<u8> = client
            .store()
            .unwrap()
            .load_channels()
            .unwrap()
            .iter()
            .map(|c| c.index)
            .collect();
        assert_eq!(stored, vec![0, 2]);

        let discovered = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, ClientEvent::ChannelDiscovered(_)))
            .count();
        assert_eq!(discovered, 2);
    }

    #[test]
    fn contacts_are_buffered_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _sent, mut events) = test_client(dir.path());

        client.handle_link_event(LinkEvent::State(LinkState::Connected));
        feed(&mut client, device_info_frame());
        feed(&mut client, self_info_frame(0x11));
        feed(&mut client, vec![2]);
        feed(&mut client, contact_frame(0x42, "Peer"));
        feed(&mut client, vec![4]);

        assert_eq!(client.contacts().len(), 1);
        assert_eq!(client.contacts()[0].name, "Peer");
        let stored = client.store().unwrap().load_contacts().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Peer");
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, ClientEvent::ContactReceived(_))));
    }

    #[test]
    fn err_during_contact_sync_collapses_forward() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, sent, _events) = test_client(dir.path());

        client.handle_link_event(LinkEvent::State(LinkState::Connected));
        feed(&mut client, device_info_frame());
        feed(&mut client, self_info_frame(0x11));
        feed(&mut client, vec![1, 1]); // ERR UNSUPPORTED_CMD during contact sync

        assert_eq!(client.state(), SessionState::DiscoverChannels);
        assert!(client.contacts().is_empty());
        assert_eq!(sent.lock().unwrap().last().unwrap(), &vec![31, 0]);
    }

    #[test]
    fn msg_waiting_push_auto_syncs_without_touching_init() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, sent, _events) = test_client(dir.path());

        client.handle_link_event(LinkEvent::State(LinkState::Connected));
        assert_eq!(client.state(), SessionState::AwaitDeviceInfo);

        feed(&mut client, vec![0x83]); // MSG_WAITING before init completes
        assert_eq!(client.state(), SessionState::AwaitDeviceInfo);
        assert_eq!(sent.lock().unwrap().last().unwrap(), &vec![10]);
    }

    #[test]
    fn channel_message_is_persisted_deduped_and_notified() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _sent, mut events) = test_client(dir.path());
        make_ready(&mut client);
        drain(&mut events);

        feed(&mut client, channel_msg_frame());
        feed(&mut client, channel_msg_frame()); // same message again

        // Both deliveries are notified; the store keeps exactly one row.
        let received: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::MessageReceived(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(received.len(), 2);
        let msg = &received[0];
        assert_eq!(msg.kind, MessageKind::Channel);
        assert_eq!(msg.channel_idx, Some(0));
        assert_eq!(msg.sender_name, "Alice");
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.timestamp, 0xDEADBEEF);
        assert_eq!(msg.snr, 5.0);
        assert!(msg.is_direct_link());

        let store = client.store().unwrap();
        assert_eq!(store.message_count().unwrap(), 1);
        assert_eq!(store.message_hash_count().unwrap(), 1);
        assert_eq!(client.message_history(10, 0).unwrap().len(), 1);
    }

    #[test]
    fn direct_message_carries_sender_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _sent, mut events) = test_client(dir.path());
        make_ready(&mut client);
        drain(&mut events);

        let mut frame = vec![0x10u8, 0x08, 0, 0];
        frame.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        frame.push(2); // two hops
        frame.push(0);
        frame.extend_from_slice(&77u32.to_le_bytes());
        frame.extend_from_slice(b"direct\0");
        feed(&mut client, frame);

        let received: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::MessageReceived(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, MessageKind::Direct);
        assert_eq!(
            received[0].sender_prefix.unwrap().as_bytes(),
            &[1, 2, 3, 4, 5, 6]
        );
        assert_eq!(received[0].path_len, 2);
        assert_eq!(received[0].text, "direct");

        let prefix = PublicKeyPrefix::new([1, 2, 3, 4, 5, 6]);
        assert_eq!(client.direct_history(&prefix, 10).unwrap().len(), 1);
    }

    #[test]
    fn no_more_messages_is_notified() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _sent, mut events) = test_client(dir.path());
        make_ready(&mut client);
        drain(&mut events);

        feed(&mut client, vec![10]);
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, ClientEvent::NoMoreMessages)));
    }

    #[test]
    fn disconnect_resets_session_within_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _sent, mut events) = test_client(dir.path());
        make_ready(&mut client);
        drain(&mut events);

        client.handle_link_event(LinkEvent::State(LinkState::Disconnected));

        assert_eq!(client.state(), SessionState::Idle);
        assert!(client.device_info().is_none());
        assert!(client.self_info().is_none());
        assert!(client.contacts().is_empty());
        // Channel table resets to the seeded public channel.
        assert_eq!(client.channels().len(), 1);
        assert_eq!(client.channels()[0].index, 0);
        assert!(client.store().is_none());
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, ClientEvent::Disconnected)));

        // Operations after close resolve immediately with NotReady.
        assert!(matches!(
            client.sync_next_message(),
            Err(ClientError::NotReady)
        ));
    }

    #[test]
    fn operations_before_ready_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _sent, _events) = test_client(dir.path());

        assert!(matches!(
            client.send_channel_message(0, "hi"),
            Err(ClientError::NotReady)
        ));
        assert!(matches!(
            client.send_self_advert(true),
            Err(ClientError::NotReady)
        ));
        assert!(matches!(
            client.join_channel("Alpha", &"ab".repeat(16)),
            Err(ClientError::NotReady)
        ));
    }

    #[test]
    fn malformed_frames_are_discarded_without_state_change() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _sent, _events) = test_client(dir.path());

        client.handle_link_event(LinkEvent::State(LinkState::Connected));
        feed(&mut client, vec![13, 1]); // DEVICE_INFO far too short
        assert_eq!(client.state(), SessionState::AwaitDeviceInfo);

        feed(&mut client, Vec::new()); // empty frame
        assert_eq!(client.state(), SessionState::AwaitDeviceInfo);

        feed(&mut client, device_info_frame());
        assert_eq!(client.state(), SessionState::AwaitSelfInfo);
    }

    #[test]
    fn unexpected_response_retains_state() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _sent, _events) = test_client(dir.path());

        client.handle_link_event(LinkEvent::State(LinkState::Connected));
        feed(&mut client, self_info_frame(0x11)); // SELF_INFO while awaiting DEVICE_INFO
        assert_eq!(client.state(), SessionState::AwaitDeviceInfo);

        feed(&mut client, vec![23, 9, 9]); // unknown response code
        assert_eq!(client.state(), SessionState::AwaitDeviceInfo);
    }

    #[test]
    fn join_channel_validates_psk_and_picks_free_slot() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, sent, _events) = test_client(dir.path());
        make_ready(&mut client);

        assert!(matches!(
            client.join_channel("Alpha", "1234"),
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.join_channel("Alpha", &"zz".repeat(16)),
            Err(ClientError::InvalidArgument(_))
        ));

        let index = client.join_channel("Alpha", &"ab".repeat(16)).unwrap();
        assert_eq!(index, 1);
        let frame = sent.lock().unwrap().last().unwrap().clone();
        assert_eq!(frame[0], 32);
        assert_eq!(frame[1], 1);
        assert_eq!(&frame[2..7], b"Alpha");
        assert_eq!(frame.len(), 2 + 32 + 16);

        // Next join lands on the next free slot.
        let index = client.join_channel("Beta", &"cd".repeat(32)).unwrap();
        assert_eq!(index, 2);
    }

    #[test]
    fn send_message_validations() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, sent, _events) = test_client(dir.path());
        make_ready(&mut client);

        assert!(matches!(
            client.send_channel_message(9, "hi"),
            Err(ClientError::InvalidArgument(_))
        ));
        client.send_channel_message(0, "hi").unwrap();
        let frame = sent.lock().unwrap().last().unwrap().clone();
        assert_eq!(frame[0], 3);
        assert_eq!(frame[2], 0);
        assert_eq!(&frame[7..9], b"hi");

        assert!(matches!(
            client.send_direct_message(&[1, 2, 3], "hi"),
            Err(ClientError::InvalidArgument(_))
        ));
        client.send_direct_message(&[9; 32], "yo").unwrap();
        let frame = sent.lock().unwrap().last().unwrap().clone();
        assert_eq!(frame[0], 2);
        assert_eq!(&frame[7..13], &[9; 6]);
    }

    #[test]
    fn contact_operations_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, sent, _events) = test_client(dir.path());
        make_ready(&mut client);

        let contact = Contact {
            public_key: PublicKey::new([0x55; 32]),
            name: "Buddy".to_string(),
            ..Contact::default()
        };
        client.add_update_contact(&contact).unwrap();
        assert_eq!(client.contacts().len(), 1);
        assert_eq!(sent.lock().unwrap().last().unwrap()[0], 9);
        assert_eq!(
            client
                .store()
                .unwrap()
                .load_contact(&contact.public_key)
                .unwrap()
                .unwrap()
                .name,
            "Buddy"
        );

        let invalid = Contact::default(); // empty name
        assert!(matches!(
            client.add_update_contact(&invalid),
            Err(ClientError::InvalidArgument(_))
        ));

        assert!(matches!(
            client.remove_contact(&[1, 2]),
            Err(ClientError::InvalidArgument(_))
        ));
        client.remove_contact(&[0x55; 32]).unwrap();
        assert!(client.contacts().is_empty());
        assert_eq!(sent.lock().unwrap().last().unwrap()[0], 15);
        assert!(client
            .store()
            .unwrap()
            .load_contact(&contact.public_key)
            .unwrap()
            .is_none());
    }

    #[test]
    fn radio_configuration_paths() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, sent, _events) = test_client(dir.path());
        make_ready(&mut client);

        assert!(matches!(
            client.set_radio_preset("mars_wide"),
            Err(ClientError::InvalidArgument(_))
        ));
        client.set_radio_preset("usa_canada_narrow").unwrap();
        let frame = sent.lock().unwrap().last().unwrap().clone();
        assert_eq!(frame[0], 11);
        assert_eq!(
            u32::from_le_bytes(frame[1..5].try_into().unwrap()),
            910_525
        );

        let bad = RadioParams {
            freq_khz: 1,
            bandwidth_hz: 1,
            spreading_factor: 1,
            coding_rate: 1,
        };
        assert!(matches!(
            client.set_radio_params(bad),
            Err(ClientError::InvalidArgument(_))
        ));

        client.set_tx_power(20).unwrap();
        assert_eq!(sent.lock().unwrap().last().unwrap(), &vec![12, 20]);

        client.set_advert_location(-37.8136, 144.9631).unwrap();
        let frame = sent.lock().unwrap().last().unwrap().clone();
        assert_eq!(frame[0], 14);
        let lat = i32::from_le_bytes(frame[1..5].try_into().unwrap());
        assert!((lat - -37_813_600).abs() <= 1, "lat was {}", lat);
    }

    #[test]
    fn persistence_disabled_changes_no_protocol_behavior() {
        let dir = tempfile::tempdir().unwrap();
        let (link, sent, _state) = TestLink::new();
        let config = ClientConfig {
            persistence: false,
            data_dir: Some(dir.path().to_path_buf()),
            ..ClientConfig::default()
        };
        let mut client = MeshClient::new(Box::new(link), config);

        make_ready(&mut client);
        assert!(client.store().is_none());
        feed(&mut client, channel_msg_frame()); // delivery still works

        // Same init command sequence as with persistence on.
        let frames = sent.lock().unwrap().clone();
        assert_eq!(frames[0], vec![22, 3]);
        assert_eq!(frames[2], vec![4, 0, 0, 0, 0]);
        assert_eq!(frames[3], vec![31, 0]);

        // History needs the store.
        assert!(matches!(
            client.message_history(10, 0),
            Err(ClientError::Persistence(StoreError::NotOpen))
        ));
    }

    #[test]
    fn ready_state_device_error_binds_to_pending_request() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _sent, mut events) = test_client(dir.path());
        make_ready(&mut client);
        drain(&mut events);

        client.sync_next_message().unwrap();
        feed(&mut client, vec![1, 3]); // ERR TABLE_FULL
        assert_eq!(client.state(), SessionState::Ready);

        let failed: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::RequestFailed { request, error } => Some((request, error)),
                _ => None,
            })
            .collect();
        assert_eq!(failed.len(), 1);
        let (request, error) = &failed[0];
        assert_eq!(*request, Some(10)); // SYNC_NEXT_MESSAGE
        assert!(matches!(
            &**error,
            ClientError::Device(FirmwareError::TableFull)
        ));
    }

    #[test]
    fn responses_consume_pending_slot_pushes_do_not() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _sent, mut events) = test_client(dir.path());
        make_ready(&mut client);
        drain(&mut events);

        client.request_device_time().unwrap();

        // A push in between leaves the slot pending.
        let mut confirmed = vec![0x82];
        confirmed.extend_from_slice(&7u32.to_le_bytes());
        confirmed.extend_from_slice(&1500u32.to_le_bytes());
        feed(&mut client, confirmed);

        // The time response consumes the slot, so a later ERR binds to
        // no request.
        let mut time = vec![9];
        time.extend_from_slice(&4242u32.to_le_bytes());
        feed(&mut client, time);
        feed(&mut client, vec![1, 4]); // ERR BAD_STATE

        let seen = drain(&mut events);
        assert!(seen
            .iter()
            .any(|e| matches!(e, ClientEvent::DeviceTime { time_secs: 4242 })));
        let failed: Vec<_> = seen
            .iter()
            .filter_map(|e| match e {
                ClientEvent::RequestFailed { request, error } => Some((request, error)),
                _ => None,
            })
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(*failed[0].0, None);
        assert!(matches!(
            &**failed[0].1,
            ClientError::Device(FirmwareError::BadState)
        ));
    }

    #[test]
    fn pending_request_is_cancelled_on_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _sent, mut events) = test_client(dir.path());
        make_ready(&mut client);
        drain(&mut events);

        client.sync_next_message().unwrap();
        client.handle_link_event(LinkEvent::State(LinkState::Disconnected));

        let seen = drain(&mut events);
        let cancelled = seen.iter().find_map(|e| match e {
            ClientEvent::RequestFailed { request, error } => Some((request, error)),
            _ => None,
        });
        let (request, error) = cancelled.expect("pending request resolves on disconnect");
        assert_eq!(*request, Some(10));
        assert!(matches!(&**error, ClientError::Cancelled));
        assert!(seen.iter().any(|e| matches!(e, ClientEvent::Disconnected)));
        assert_eq!(client.state(), SessionState::Idle);
    }
}
