//! Radio abstraction for peripheral discovery and stream links
//!
//! Separates platform concerns from session logic:
//! - **Radio**: adapter state, scanning, establishing a raw link
//! - **RawLink**: one established duplex byte stream
//! - **Session logic**: framing, lifecycle (handled by `link` and `controller`)
//!
//! A radio reports asynchronous outcomes (scan results, remediation results)
//! as `TransportEvent`s on the channel it was created with. Connect attempts
//! and sessions report on the same channel, so the controller has a single
//! event stream to dispatch.
//!
//! # Adding a new backend
//!
//! 1. Create `radio/my_backend.rs`
//! 2. Implement `Radio` and `RawLink`
//! 3. Add `pub mod my_backend;` here and a `RadioBackend` variant in config

pub mod serial;
pub mod tcp;

pub use serial::SerialRadio;
pub use tcp::TcpRadio;

use crate::error::ConnectError;
use crate::link::SessionId;
use std::fmt;
use std::io::{self, Read, Write};
use tokio::sync::mpsc;

/// Sender half of the controller's event channel
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half of the controller's event channel
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Identity of a discovered peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralIdentity {
    /// Human-readable name (e.g. "HC-05")
    pub name: String,
    /// Hardware address (e.g. "98:D3:31:F5:2A:10")
    pub address: String,
    /// Backend-specific endpoint (serial port path, TCP address)
    pub endpoint: Option<String>,
}

impl PeripheralIdentity {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

impl fmt::Display for PeripheralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Event delivered to the session controller
///
/// Every asynchronous outcome in the system funnels through this enum.
pub enum TransportEvent {
    /// A device answered the scan
    DeviceFound(PeripheralIdentity),
    /// The radio started scanning
    ScanStarted,
    /// The radio finished scanning
    ScanFinished,
    /// A background connect attempt succeeded
    LinkConnected {
        attempt: u64,
        identity: PeripheralIdentity,
        link: Box<dyn RawLink>,
    },
    /// A background connect attempt failed
    ConnectFailed { attempt: u64, error: ConnectError },
    /// A session's receive loop hit an I/O error or end-of-stream
    LinkDisconnected { session: SessionId },
    /// An addressed inbound message, prefix already stripped
    MessageReceived { session: SessionId, text: String },
    /// Outcome of `Radio::request_enable_radio`
    RadioEnableResult { enabled: bool },
    /// Outcome of `Radio::request_scan_permission`
    PermissionResult { granted: bool },
}

impl TransportEvent {
    /// Short tag for tracing
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeviceFound(_) => "device_found",
            Self::ScanStarted => "scan_started",
            Self::ScanFinished => "scan_finished",
            Self::LinkConnected { .. } => "link_connected",
            Self::ConnectFailed { .. } => "connect_failed",
            Self::LinkDisconnected { .. } => "link_disconnected",
            Self::MessageReceived { .. } => "message_received",
            Self::RadioEnableResult { .. } => "radio_enable_result",
            Self::PermissionResult { .. } => "permission_result",
        }
    }
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceFound(id) => write!(f, "DeviceFound({})", id),
            Self::LinkConnected {
                attempt, identity, ..
            } => write!(f, "LinkConnected(#{}, {})", attempt, identity),
            Self::ConnectFailed { attempt, error } => {
                write!(f, "ConnectFailed(#{}, {})", attempt, error)
            }
            Self::LinkDisconnected { session } => write!(f, "LinkDisconnected({})", session),
            Self::MessageReceived { session, text } => {
                write!(f, "MessageReceived({}, {:?})", session, text)
            }
            Self::RadioEnableResult { enabled } => write!(f, "RadioEnableResult({})", enabled),
            Self::PermissionResult { granted } => write!(f, "PermissionResult({})", granted),
            other => f.write_str(other.kind()),
        }
    }
}

/// One established duplex byte stream to a peripheral
///
/// The session splits the link once into a reader (owned by the receive
/// loop) and a writer (behind the session's write lock). `shutdown` must make
/// a read blocked on the reader fail promptly; it is called exactly once by
/// the session that owns the link.
pub trait RawLink: Send + Sync {
    /// Human-readable endpoint for logs
    fn endpoint(&self) -> &str;

    /// Obtain independent read and write halves
    fn try_split(&self) -> io::Result<(Box<dyn Read + Send>, Box<dyn Write + Send>)>;

    /// Tear the connection down, interrupting any pending read
    fn shutdown(&self);
}

/// Platform radio used for discovery and connection
///
/// Gate checks are synchronous. Remediation requests and scans complete
/// asynchronously through `TransportEvent`s. `connect` blocks and must only
/// be called from a background thread.
pub trait Radio: Send + Sync + 'static {
    fn is_radio_present(&self) -> bool;

    fn is_radio_enabled(&self) -> bool;

    /// Ask the platform to switch the radio on
    ///
    /// Answered by `TransportEvent::RadioEnableResult`.
    fn request_enable_radio(&self);

    fn has_scan_permission(&self) -> bool;

    /// Ask the platform for scan permission
    ///
    /// Answered by `TransportEvent::PermissionResult`.
    fn request_scan_permission(&self);

    /// Start emitting `DeviceFound` events
    fn begin_scan(&self) -> io::Result<()>;

    /// Stop an ongoing scan; harmless when none is running
    fn cancel_scan(&self) -> io::Result<()>;

    /// Establish a raw link to `identity` (blocking)
    fn connect(&self, identity: &PeripheralIdentity) -> Result<Box<dyn RawLink>, ConnectError>;
}

/// Forward an event, tolerating a closed channel (controller gone)
pub(crate) fn emit(events: &EventSender, event: TransportEvent) {
    if let Err(e) = events.send(event) {
        tracing::debug!("Dropping {} event, controller gone", e.0.kind());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let id = PeripheralIdentity::new("HC-05", "AA:BB:CC:00:11:22");
        assert_eq!(id.to_string(), "HC-05 (AA:BB:CC:00:11:22)");
        assert_eq!(id.endpoint, None);
    }

    #[test]
    fn test_identity_with_endpoint() {
        let id = PeripheralIdentity::new("HC-05", "AA").with_endpoint("/dev/rfcomm0");
        assert_eq!(id.endpoint.as_deref(), Some("/dev/rfcomm0"));
    }

    #[test]
    fn test_event_debug_uses_kind() {
        assert_eq!(format!("{:?}", TransportEvent::ScanStarted), "scan_started");
        assert_eq!(
            format!("{:?}", TransportEvent::RadioEnableResult { enabled: true }),
            "RadioEnableResult(true)"
        );
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        // Must not panic
        emit(&tx, TransportEvent::ScanFinished);
    }
}
