//! Message-framed link for BLE UART (Nordic UART Service) media.
//!
//! Over BLE GATT every notification is exactly one frame and every write is
//! exactly one frame; the serial `0x3C`/`0x3E` + length envelope does not
//! exist on this medium. This link adapts a notification receiver and a
//! write sender (supplied by whatever owns the GATT plumbing) to the same
//! frame contract the serial link provides.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use meshcore_protocol::MAX_FRAME_SIZE;

use crate::serial::set_state_shared;
use crate::transport::{FrameSink, LinkEvent, LinkState, TransportError};

/// Nordic UART Service UUID advertised by MeshCore radios.
pub const NUS_SERVICE_UUID: &str = "6E400001-B5A3-F393-E0A9-E50E24DCCA9E";
/// Write characteristic (host → device).
pub const NUS_WRITE_CHAR_UUID: &str = "6E400002-B5A3-F393-E0A9-E50E24DCCA9E";
/// Notify characteristic (device → host).
pub const NUS_NOTIFY_CHAR_UUID: &str = "6E400003-B5A3-F393-E0A9-E50E24DCCA9E";
/// Value to write into the Client Characteristic Configuration descriptor
/// of the notify characteristic to enable notifications.
pub const CCC_ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];

/// A BLE link over an established GATT notification/write pair.
pub struct BleLink {
    writes: mpsc::Sender<Vec<u8>>,
    state: Arc<Mutex<LinkState>>,
    events: mpsc::Sender<LinkEvent>,
}

impl BleLink {
    /// Adapt an established GATT session: `notifications` yields the value
    /// of each notify-characteristic change, `writes` accepts values for the
    /// write characteristic. Frames pass through verbatim in both directions.
    pub fn spawn(
        mut notifications: mpsc::Receiver<Vec<u8>>,
        writes: mpsc::Sender<Vec<u8>>,
        events: mpsc::Sender<LinkEvent>,
    ) -> Self {
        let state = Arc::new(Mutex::new(LinkState::Connected));

        let _ = events.try_send(LinkEvent::State(LinkState::Connected));

        let forward_events = events.clone();
        let forward_state = state.clone();
        tokio::spawn(async move {
            while let Some(frame) = notifications.recv().await {
                if forward_events.send(LinkEvent::Frame(frame)).await.is_err() {
                    return;
                }
            }
            debug!("BLE notification stream ended");
            if set_state_shared(&forward_state, LinkState::Disconnected) {
                let _ = forward_events
                    .send(LinkEvent::State(LinkState::Disconnected))
                    .await;
            }
        });

        BleLink {
            writes,
            state,
            events,
        }
    }
}

impl FrameSink for BleLink {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.state() != LinkState::Connected {
            return Err(TransportError::NotOpen);
        }
        if frame.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                max: MAX_FRAME_SIZE,
                actual: frame.len(),
            });
        }
        if frame.is_empty() {
            return Ok(());
        }

        self.writes.try_send(frame.to_vec()).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TransportError::Busy,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn state(&self) -> LinkState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn close(&mut self) {
        if set_state_shared(&self.state, LinkState::Disconnected) {
            let _ = self.events.try_send(LinkEvent::State(LinkState::Disconnected));
            debug!("BLE link closed");
        }
    }
}
