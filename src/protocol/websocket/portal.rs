//! WebSocket portal: the live session handle for an upgraded connection
//!
//! A portal owns the socket for the rest of the connection's life. A dedicated
//! background reader thread drains the socket continuously: control frames are
//! handled inline (PING is answered, PONG resolves waiters, CLOSE tears the
//! session down) and data frames are queued for [`Portal::recv`]. The reader
//! is the only producer into the inbound queue, so frames reach `recv` in
//! arrival order.

use std::collections::HashMap;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::frame::{Frame, Opcode};

/// Normal closure close code
pub const CLOSE_NORMAL: u16 = 1000;
/// Protocol error close code
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// Internal error close code
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Failures surfaced by portal operations
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("timed out waiting for a message")]
    Timeout,
    #[error("portal is closed")]
    Closed,
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("I/O on portal socket: {0}")]
    Io(#[from] std::io::Error),
}

/// One complete logical message, reassembled from one or more frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(s.to_string())
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(s)
    }
}

impl From<Vec<u8>> for Message {
    fn from(b: Vec<u8>) -> Self {
        Message::Binary(b)
    }
}

/// State shared between the portal and its reader thread
struct Shared {
    writer: Mutex<TcpStream>,
    closed: AtomicBool,
    pong_waiters: Mutex<Vec<(u64, Sender<()>)>>,
    peer: Option<SocketAddr>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn send_frame(&self, frame: &Frame) -> Result<(), PortalError> {
        if self.is_closed() {
            return Err(PortalError::Closed);
        }
        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        writer.write_all(&frame.encode())?;
        Ok(())
    }

    /// Idempotent close: send a CLOSE frame carrying the code, mark closed,
    /// shut the socket down. The socket shutdown also unblocks the reader.
    fn close(&self, code: u16) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let _ = writer.write_all(&Frame::control(Opcode::Close, &code.to_be_bytes()).encode());
        let _ = writer.shutdown(Shutdown::Both);

        if let Some(peer) = self.peer {
            log::debug!("ws session with {peer} closed (code {code})");
        }
    }

    fn notify_pong(&self) {
        let waiters = self.pong_waiters.lock().unwrap_or_else(|p| p.into_inner());
        for (_, waiter) in waiters.iter() {
            let _ = waiter.send(());
        }
    }
}

/// The live bidirectional messaging handle for an upgraded connection.
///
/// Created at a successful WebSocket handshake; destroyed when the socket
/// closes. All operations take `&self`; the portal is bound 1:1 to the
/// connection thread running the endpoint handler.
pub struct Portal {
    shared: Arc<Shared>,
    inbound: Mutex<Receiver<Frame>>,
    slugs: HashMap<String, String>,
    ping_seq: AtomicU64,
}

impl Portal {
    /// Take ownership of an upgraded socket and start the reader thread.
    ///
    /// `max_payload` bounds the payload length any single inbound frame may
    /// advertise; larger frames fail decode and close the session with 1011.
    pub(crate) fn open(
        stream: TcpStream,
        slugs: HashMap<String, String>,
        max_payload: u64,
    ) -> std::io::Result<Self> {
        let reader_stream = stream.try_clone()?;
        let peer = stream.peer_addr().ok();

        let shared = Arc::new(Shared {
            writer: Mutex::new(stream),
            closed: AtomicBool::new(false),
            pong_waiters: Mutex::new(Vec::new()),
            peer,
        });

        let (tx, rx) = mpsc::channel();
        let reader_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("ws-portal-reader".to_string())
            .spawn(move || read_loop(reader_shared, reader_stream, tx, max_payload))?;

        Ok(Self {
            shared,
            inbound: Mutex::new(rx),
            slugs,
            ping_seq: AtomicU64::new(0),
        })
    }

    /// Slug bindings captured on the route that reached this portal
    pub fn slugs(&self) -> &HashMap<String, String> {
        &self.slugs
    }

    pub fn slug(&self, name: &str) -> Option<&str> {
        self.slugs.get(name).map(|s| s.as_str())
    }

    /// Whether the session has been closed (by either side)
    pub fn closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Block until one complete logical message is available.
    ///
    /// A non-final first frame starts reassembly: every subsequent frame must
    /// carry the CONTINUATION opcode until a final frame arrives, and the
    /// payloads concatenate in order (text stays text, binary stays binary).
    /// A non-conforming frame closes the session with 1002 and fails with
    /// [`PortalError::InvalidFrame`].
    ///
    /// # Errors
    ///
    /// [`PortalError::Timeout`] if no complete message arrives within
    /// `timeout` (measured per frame wait); [`PortalError::Closed`] if the
    /// portal is already closed or closes while waiting.
    pub fn recv(&self, timeout: Option<Duration>) -> Result<Message, PortalError> {
        if self.closed() {
            return Err(PortalError::Closed);
        }

        let first = self.next_frame(timeout)?;

        let is_text = match first.opcode {
            Opcode::Text => true,
            Opcode::Binary => false,
            other => {
                self.shared.close(CLOSE_PROTOCOL_ERROR);
                return Err(PortalError::InvalidFrame(format!(
                    "unexpected leading {other:?} frame"
                )));
            }
        };

        let mut payload = first.payload;
        let mut fin = first.fin;

        while !fin {
            let next = self.next_frame(timeout)?;
            if next.opcode != Opcode::Continuation {
                self.shared.close(CLOSE_PROTOCOL_ERROR);
                return Err(PortalError::InvalidFrame(format!(
                    "expected continuation, got {:?}",
                    next.opcode
                )));
            }
            payload.extend_from_slice(&next.payload);
            fin = next.fin;
        }

        if is_text {
            match String::from_utf8(payload) {
                Ok(text) => Ok(Message::Text(text)),
                Err(_) => {
                    self.shared.close(CLOSE_PROTOCOL_ERROR);
                    Err(PortalError::InvalidFrame(
                        "reassembled text message is not valid UTF-8".to_string(),
                    ))
                }
            }
        } else {
            Ok(Message::Binary(payload))
        }
    }

    fn next_frame(&self, timeout: Option<Duration>) -> Result<Frame, PortalError> {
        let inbound = self.inbound.lock().unwrap_or_else(|p| p.into_inner());
        match timeout {
            Some(duration) => inbound.recv_timeout(duration).map_err(|e| match e {
                RecvTimeoutError::Timeout => PortalError::Timeout,
                RecvTimeoutError::Disconnected => PortalError::Closed,
            }),
            None => inbound.recv().map_err(|_| PortalError::Closed),
        }
    }

    /// Send one unfragmented TEXT or BINARY frame, depending on the payload.
    ///
    /// # Errors
    ///
    /// [`PortalError::Closed`] if the session has been closed.
    pub fn send(&self, message: impl Into<Message>) -> Result<(), PortalError> {
        let frame = match message.into() {
            Message::Text(text) => Frame::data(Opcode::Text, text.into_bytes()),
            Message::Binary(bytes) => Frame::data(Opcode::Binary, bytes),
        };
        self.shared.send_frame(&frame)?;

        if let Some(peer) = self.shared.peer {
            log::debug!("ws -> {peer}: {} bytes", frame.payload.len());
        }
        Ok(())
    }

    /// Send a PING and wait for a matching PONG.
    ///
    /// Returns `true` if a PONG arrives before `timeout`, `false` otherwise.
    /// The registered waiter is removed on every exit path.
    pub fn ping(&self, timeout: Duration) -> Result<bool, PortalError> {
        let id = self.ping_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        {
            let mut waiters = self.shared.pong_waiters.lock().unwrap_or_else(|p| p.into_inner());
            waiters.push((id, tx));
        }

        let outcome = self
            .shared
            .send_frame(&Frame::control(Opcode::Ping, &[]))
            .map(|()| rx.recv_timeout(timeout).is_ok());

        let mut waiters = self.shared.pong_waiters.lock().unwrap_or_else(|p| p.into_inner());
        waiters.retain(|(wid, _)| *wid != id);

        outcome
    }

    /// Close the session with a normal (1000) close code. No-op if already
    /// closed.
    pub fn close(&self) {
        self.shared.close(CLOSE_NORMAL);
    }

    /// Close the session with an explicit close code. No-op if already
    /// closed.
    pub fn close_with_code(&self, code: u16) {
        self.shared.close(code);
    }
}

impl Drop for Portal {
    fn drop(&mut self) {
        // scoped resource discipline: the socket never outlives the portal
        self.shared.close(CLOSE_NORMAL);
    }
}

impl std::fmt::Debug for Portal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Portal")
            .field("peer", &self.shared.peer)
            .field("closed", &self.closed())
            .field("slugs", &self.slugs)
            .finish()
    }
}

/// Background read loop: sole producer into the inbound queue.
///
/// Runs for the portal's entire lifetime. Control frames are dispatched
/// inline; any decode failure closes the session with 1011.
fn read_loop(shared: Arc<Shared>, mut stream: TcpStream, inbound: Sender<Frame>, max_payload: u64) {
    loop {
        if shared.is_closed() {
            break;
        }

        let frame = match Frame::read_from(&mut stream, max_payload) {
            Ok(frame) => frame,
            Err(err) => {
                if !shared.is_closed() {
                    log::warn!("ws read loop terminating: {err}");
                    shared.close(CLOSE_INTERNAL_ERROR);
                }
                break;
            }
        };

        match frame.opcode {
            Opcode::Ping => {
                if !frame.fin {
                    // fragmented control frames are a protocol violation
                    shared.close(CLOSE_PROTOCOL_ERROR);
                    break;
                }
                if shared.send_frame(&Frame::control(Opcode::Pong, &frame.payload)).is_err() {
                    break;
                }
            }
            Opcode::Pong => shared.notify_pong(),
            Opcode::Close => {
                shared.close(CLOSE_NORMAL);
                break;
            }
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                if inbound.send(frame).is_err() {
                    // portal dropped; its Drop already closed the socket
                    break;
                }
            }
        }
    }
}
