//! Link session: one live duplex connection to the peripheral
//!
//! A `SessionHandle` is the single owner of a raw link's resources. Opening
//! it splits the link and starts exactly one receive thread; the thread lives
//! exactly as long as the handle:
//! - `close()` (or drop) shuts the link down, the pending read fails, the
//!   thread exits without reporting anything
//! - an I/O error or end-of-stream ends the thread, which releases the link
//!   and reports `TransportEvent::LinkDisconnected` once
//!
//! The raw link is released exactly once whichever path gets there first.

pub mod stats;

use self::stats::Stats;
use crate::codec::{self, Message};
use crate::error::{ConnectError, WriteError};
use crate::radio::{emit, EventSender, RawLink, TransportEvent};
use parking_lot::Mutex;
use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of the peripheral link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Scanning,
    Connecting,
    Connected,
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Identifies one session for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parameters for opening a session
pub struct SessionOptions {
    pub id: SessionId,
    /// Inbound frames must start with this to reach the application
    pub inbound_prefix: String,
    /// Receives `MessageReceived` and `LinkDisconnected`
    pub events: EventSender,
    pub stats: Arc<Stats>,
}

/// Strip the addressing prefix from an inbound frame
///
/// Returns `None` for frames not addressed to this client. A trailing `'\r'`
/// (firmware `println`) is not part of the payload.
pub fn strip_address<'a>(frame: &'a str, prefix: &str) -> Option<&'a str> {
    frame
        .strip_prefix(prefix)
        .map(|payload| payload.strip_suffix('\r').unwrap_or(payload))
}

/// State shared between the handle and its receive thread
struct Shared {
    id: SessionId,
    link: Mutex<Option<Box<dyn RawLink>>>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    /// Set before an intentional teardown so the reader stays quiet
    closing: AtomicBool,
}

impl Shared {
    /// Release the raw link
    ///
    /// Returns true for the one call that actually released it.
    fn release(&self) -> bool {
        let link = self.link.lock().take();
        let Some(link) = link else {
            return false;
        };

        // Shut down before taking the writer: unblocks a write in progress
        link.shutdown();
        drop(self.writer.lock().take());
        debug!("Session {} released {}", self.id, link.endpoint());
        true
    }
}

/// Exclusive owner of one live connection
pub struct SessionHandle {
    shared: Arc<Shared>,
    endpoint: String,
    reader: Option<JoinHandle<()>>,
    stats: Arc<Stats>,
}

impl SessionHandle {
    /// Wrap an established raw link and start its receive loop
    pub fn open(raw: Box<dyn RawLink>, options: SessionOptions) -> Result<Self, ConnectError> {
        let endpoint = raw.endpoint().to_string();
        let (reader, writer) = match raw.try_split() {
            Ok(halves) => halves,
            Err(source) => {
                raw.shutdown();
                return Err(ConnectError::Io { endpoint, source });
            }
        };

        let SessionOptions {
            id,
            inbound_prefix,
            events,
            stats,
        } = options;

        let shared = Arc::new(Shared {
            id,
            link: Mutex::new(Some(raw)),
            writer: Mutex::new(Some(writer)),
            closing: AtomicBool::new(false),
        });

        let loop_shared = shared.clone();
        let loop_stats = stats.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("link-rx-{}", id.0))
            .spawn(move || receive_loop(reader, loop_shared, inbound_prefix, events, loop_stats));

        let reader = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                shared.closing.store(true, Ordering::Release);
                shared.release();
                return Err(ConnectError::Io { endpoint, source });
            }
        };

        info!("Session {} opened on {}", id, endpoint);
        Ok(Self {
            shared,
            endpoint,
            reader: Some(reader),
            stats,
        })
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// True until the link has been released by either side
    pub fn is_open(&self) -> bool {
        self.shared.link.lock().is_some()
    }

    /// Encode and write one message (blocking write, serialized)
    ///
    /// Returns `WriteError::Unavailable` without any I/O when the link is
    /// already gone. A failed write releases the link.
    pub fn send(&self, message: &Message) -> Result<(), WriteError> {
        let frame = codec::encode(message);

        let mut guard = self.shared.writer.lock();
        let Some(writer) = guard.as_mut() else {
            return Err(WriteError::Unavailable);
        };

        match writer.write_all(&frame).and_then(|()| writer.flush()) {
            Ok(()) => {
                self.stats.add_tx(frame.len());
                debug!("-> {}", message);
                Ok(())
            }
            Err(source) => {
                drop(guard);
                warn!("Session {} write failed: {}", self.shared.id, source);
                self.shared.closing.store(true, Ordering::Release);
                self.shared.release();
                Err(WriteError::Io { source })
            }
        }
    }

    /// Release the link and stop the receive loop
    ///
    /// Idempotent. Blocks until the receive thread has exited.
    pub fn close(&mut self) {
        self.release_quietly();

        if let Some(handle) = self.reader.take() {
            if handle.thread().id() != std::thread::current().id() && handle.join().is_err() {
                warn!("Session {} receive thread panicked", self.shared.id);
            }
        }
    }

    /// Release the link without waiting for the receive thread
    ///
    /// The thread sees its read fail and exits on its own, silently.
    pub fn close_detached(mut self) {
        self.release_quietly();
        drop(self.reader.take());
    }

    fn release_quietly(&self) {
        self.shared.closing.store(true, Ordering::Release);
        if self.shared.release() {
            info!("Session {} closed", self.shared.id);
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sole reader of the inbound stream for one session
fn receive_loop(
    reader: Box<dyn Read + Send>,
    shared: Arc<Shared>,
    prefix: String,
    events: EventSender,
    stats: Arc<Stats>,
) {
    let session = shared.id;

    for frame in codec::decode_stream(reader) {
        match frame {
            Ok(text) => {
                // Wire size includes the terminator
                let size = text.len() + 1;
                match strip_address(&text, &prefix) {
                    Some(payload) => {
                        stats.add_rx(size);
                        debug!("<- {}", payload);
                        emit(
                            &events,
                            TransportEvent::MessageReceived {
                                session,
                                text: payload.to_string(),
                            },
                        );
                    }
                    None => {
                        stats.add_dropped(size);
                        debug!("Peripheral chatter: {}", text);
                    }
                }
            }
            Err(e) => {
                if !shared.closing.load(Ordering::Acquire) {
                    warn!("Session {} read failed: {}", session, e);
                }
                break;
            }
        }
    }

    if !shared.closing.load(Ordering::Acquire) && shared.release() {
        info!("Session {} disconnected", session);
        emit(&events, TransportEvent::LinkDisconnected { session });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::tcp::TcpLink;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn pair() -> (Box<dyn RawLink>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let client = TcpStream::connect(&addr).unwrap();
        let (peer, _) = listener.accept().unwrap();
        (Box::new(TcpLink::from_stream(addr, client)), peer)
    }

    fn open(
        raw: Box<dyn RawLink>,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::open(
            raw,
            SessionOptions {
                id: SessionId(1),
                inbound_prefix: "BL: ".to_string(),
                events: tx,
                stats: Arc::new(Stats::new()),
            },
        )
        .unwrap();
        (handle, rx)
    }

    fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        for _ in 0..200 {
            if let Ok(ev) = rx.try_recv() {
                return ev;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("timeout waiting for event");
    }

    #[test]
    fn test_strip_address() {
        assert_eq!(strip_address("BL: 12", "BL: "), Some("12"));
        assert_eq!(strip_address("BL: 12\r", "BL: "), Some("12"));
        assert_eq!(strip_address("BL: ", "BL: "), Some(""));
        assert_eq!(strip_address("Distance: 12", "BL: "), None);
        assert_eq!(strip_address("bl: 12", "BL: "), None);
        assert_eq!(strip_address("", "BL: "), None);
    }

    #[test]
    fn test_send_writes_frame() {
        let (raw, mut peer) = pair();
        let (handle, _rx) = open(raw);

        handle.send(&Message::new("F").unwrap()).unwrap();

        let mut buf = [0u8; 2];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"F\0");
    }

    #[test]
    fn test_receive_delivers_addressed_only() {
        let (raw, mut peer) = pair();
        let (_handle, mut rx) = open(raw);

        peer.write_all(b"Ultrasonic ready\nBL: 37\n").unwrap();

        match next_event(&mut rx) {
            TransportEvent::MessageReceived { session, text } => {
                assert_eq!(session, SessionId(1));
                assert_eq!(text, "37");
            }
            other => panic!("Unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_peer_close_reports_disconnect_once() {
        let (raw, peer) = pair();
        let (handle, mut rx) = open(raw);

        drop(peer);

        assert!(matches!(
            next_event(&mut rx),
            TransportEvent::LinkDisconnected { session: SessionId(1) }
        ));
        assert!(!handle.is_open());
        std::thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_close_is_unavailable() {
        let (raw, _peer) = pair();
        let (mut handle, _rx) = open(raw);

        handle.close();
        handle.close();

        assert!(matches!(
            handle.send(&Message::new("S").unwrap()),
            Err(WriteError::Unavailable)
        ));
    }

    #[test]
    fn test_close_is_silent() {
        let (raw, _peer) = pair();
        let (mut handle, mut rx) = open(raw);

        handle.close();

        assert!(!handle.is_open());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_detached_releases_and_thread_exits_quietly() {
        let (raw, mut peer) = pair();
        let (handle, mut rx) = open(raw);

        handle.close_detached();

        // Link released synchronously: peer sees end of stream
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);

        // The receive thread drops its sender when it exits, reporting nothing
        for _ in 0..200 {
            match rx.try_recv() {
                Err(mpsc::error::TryRecvError::Disconnected) => return,
                Err(mpsc::error::TryRecvError::Empty) => {
                    std::thread::sleep(Duration::from_millis(5))
                }
                Ok(ev) => panic!("Unexpected {:?}", ev),
            }
        }
        panic!("receive thread still running");
    }
}
