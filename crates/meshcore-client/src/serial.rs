//! Stream-framed link for serial media.
//!
//! Wraps any `AsyncRead + AsyncWrite` byte stream (opening the actual port
//! is the embedder's job) and applies the serial envelope: outbound frames
//! get the `0x3C` + length prefix and a flush, inbound bytes run through the
//! [`StreamDeframer`] so higher layers only ever see whole frames.

use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use meshcore_protocol::{StreamDeframer, FRAME_TO_RADIO, MAX_FRAME_SIZE};

use crate::transport::{FrameSink, LinkErrorKind, LinkEvent, LinkState, TransportError};

/// Outbound queue depth before senders see [`TransportError::Busy`].
const WRITE_QUEUE_DEPTH: usize = 256;
/// Read chunk size for the reader task.
const READ_CHUNK: usize = 1024;

/// A serial link over an already-open byte stream.
pub struct SerialLink {
    writer_tx: Option<mpsc::Sender<Vec<u8>>>,
    state: Arc<Mutex<LinkState>>,
    events: mpsc::Sender<LinkEvent>,
}

impl SerialLink {
    /// Take ownership of a byte stream and start the reader/writer tasks.
    /// Link events flow into `events`; the link starts out Connected.
    pub fn spawn<R, W>(reader: R, writer: W, events: mpsc::Sender<LinkEvent>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let state = Arc::new(Mutex::new(LinkState::Connected));
        let (writer_tx, writer_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);

        let _ = events.try_send(LinkEvent::State(LinkState::Connected));

        tokio::spawn(reader_task(reader, events.clone(), state.clone()));
        tokio::spawn(writer_task(writer, writer_rx, events.clone(), state.clone()));

        SerialLink {
            writer_tx: Some(writer_tx),
            state,
            events,
        }
    }
}

impl FrameSink for SerialLink {
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

        let mut envelope = Vec::with_capacity(3 + frame.len());
        envelope.push(FRAME_TO_RADIO);
        envelope.extend_from_slice(&(frame.len() as u16).to_le_bytes());
        envelope.extend_from_slice(frame);

        let tx = self.writer_tx.as_ref().ok_or(TransportError::Closed)?;
        tx.try_send(envelope).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TransportError::Busy,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn state(&self) -> LinkState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn close(&mut self) {
        self.writer_tx = None;
        let changed = set_state_shared(&self.state, LinkState::Disconnected);
        if changed {
            let _ = self.events.try_send(LinkEvent::State(LinkState::Disconnected));
            debug!("serial link closed");
        }
    }
}

/// Update the shared state; returns whether it changed.
pub(crate) fn set_state_shared(state: &Arc<Mutex<LinkState>>, new: LinkState) -> bool {
    let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
    if *guard != new {
        *guard = new;
        true
    } else {
        false
    }
}

async fn reader_task<R>(
    mut reader: R,
    events: mpsc::Sender<LinkEvent>,
    state: Arc<Mutex<LinkState>>,
) where
    R: AsyncRead + Unpin,
{
    let mut deframer = StreamDeframer::new();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    loop {
        buf.clear();
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!("serial stream ended");
                if set_state_shared(&state, LinkState::Disconnected) {
                    let _ = events.send(LinkEvent::State(LinkState::Disconnected)).await;
                }
                return;
            }
            Ok(n) => {
                trace!(bytes = n, "serial rx");
                deframer.push(&buf);
                while let Some(frame) = deframer.next_frame() {
                    if events.send(LinkEvent::Frame(frame)).await.is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "serial read error");
                fail_link(&events, &state, format!("read error: {}", err)).await;
                return;
            }
        }
    }
}

async fn writer_task<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<Vec<u8>>,
    events: mpsc::Sender<LinkEvent>,
    state: Arc<Mutex<LinkState>>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        let mut written = 0;
        while written < envelope.len() {
            match writer.write(&envelope[written..]).await {
                Ok(0) => {
                    // The medium stopped accepting bytes mid-frame.
                    let err = TransportError::WriteIncomplete {
                        written,
                        expected: envelope.len(),
                    };
                    warn!(error = %err, "serial write stalled");
                    fail_link(&events, &state, err.to_string()).await;
                    return;
                }
                Ok(n) => written += n,
                Err(err) => {
                    warn!(error = %err, "serial write error");
                    fail_link(&events, &state, format!("write error: {}", err)).await;
                    return;
                }
            }
        }

        if let Err(err) = writer.flush().await {
            warn!(error = %err, "serial flush error");
            fail_link(&events, &state, format!("flush error: {}", err)).await;
            return;
        }
    }
}

/// Broadcast an I/O failure and take the link down.
async fn fail_link(
    events: &mpsc::Sender<LinkEvent>,
    state: &Arc<Mutex<LinkState>>,
    message: String,
) {
    let _ = events
        .send(LinkEvent::Error {
            kind: LinkErrorKind::Io,
            message,
        })
        .await;
    if set_state_shared(state, LinkState::Disconnected) {
        let _ = events.send(LinkEvent::State(LinkState::Disconnected)).await;
    }
}
