//! TCP radio for the virtual peripheral
//!
//! Stands in for the radio when no hardware is at hand: the "peripheral" is a
//! TCP endpoint (see `simulator`) speaking the same framing as the real
//! module. A scan always reports exactly one device, the configured one;
//! reachability is only checked when connecting.
//!
//! Uses blocking std sockets so the session model is the same as on real
//! hardware: a dedicated thread blocks on `read`, and `shutdown` makes that
//! read fail immediately.

use super::{emit, EventSender, PeripheralIdentity, Radio, RawLink, TransportEvent};
use crate::error::ConnectError;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use tracing::{debug, info};

/// Radio whose single peripheral is reachable over TCP
pub struct TcpRadio {
    peripheral: PeripheralIdentity,
    events: EventSender,
}

impl TcpRadio {
    /// Create a radio advertising `name` at `address` (`host:port`)
    pub fn new(name: impl Into<String>, address: impl Into<String>, events: EventSender) -> Self {
        let address = address.into();
        Self {
            peripheral: PeripheralIdentity::new(name, address.clone()).with_endpoint(address),
            events,
        }
    }
}

impl Radio for TcpRadio {
    fn is_radio_present(&self) -> bool {
        true
    }

    fn is_radio_enabled(&self) -> bool {
        true
    }

    fn request_enable_radio(&self) {
        emit(&self.events, TransportEvent::RadioEnableResult { enabled: true });
    }

    fn has_scan_permission(&self) -> bool {
        true
    }

    fn request_scan_permission(&self) {
        emit(&self.events, TransportEvent::PermissionResult { granted: true });
    }

    fn begin_scan(&self) -> io::Result<()> {
        emit(&self.events, TransportEvent::ScanStarted);
        emit(
            &self.events,
            TransportEvent::DeviceFound(self.peripheral.clone()),
        );
        emit(&self.events, TransportEvent::ScanFinished);
        Ok(())
    }

    fn cancel_scan(&self) -> io::Result<()> {
        Ok(())
    }

    fn connect(&self, identity: &PeripheralIdentity) -> Result<Box<dyn RawLink>, ConnectError> {
        let endpoint = identity
            .endpoint
            .as_deref()
            .ok_or_else(|| ConnectError::Unreachable {
                address: identity.address.clone(),
            })?;

        info!("Connecting to {} at {}", identity.name, endpoint);
        let link = TcpLink::connect(endpoint)?;
        Ok(Box::new(link))
    }
}

/// Raw link over a TCP stream
pub struct TcpLink {
    endpoint: String,
    stream: TcpStream,
}

impl TcpLink {
    /// Connect to `endpoint` (blocking, no timeout)
    pub fn connect(endpoint: &str) -> Result<Self, ConnectError> {
        let map_err = |source| ConnectError::Io {
            endpoint: endpoint.to_string(),
            source,
        };

        let stream = TcpStream::connect(endpoint).map_err(map_err)?;
        stream.set_nodelay(true).map_err(map_err)?;
        Ok(Self::from_stream(endpoint, stream))
    }

    /// Wrap an already connected stream
    pub fn from_stream(endpoint: impl Into<String>, stream: TcpStream) -> Self {
        Self {
            endpoint: endpoint.into(),
            stream,
        }
    }
}

impl RawLink for TcpLink {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn try_split(&self) -> io::Result<(Box<dyn Read + Send>, Box<dyn Write + Send>)> {
        let reader = self.stream.try_clone()?;
        let writer = self.stream.try_clone()?;
        Ok((Box::new(reader), Box::new(writer)))
    }

    fn shutdown(&self) {
        // Fails only if the peer already closed, which is fine
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("TCP shutdown of {}: {}", self.endpoint, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use tokio::sync::mpsc;

    #[test]
    fn test_scan_reports_configured_peripheral() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let radio = TcpRadio::new("HC-05", "127.0.0.1:9750", tx);

        radio.begin_scan().unwrap();

        assert!(matches!(rx.try_recv(), Ok(TransportEvent::ScanStarted)));
        match rx.try_recv() {
            Ok(TransportEvent::DeviceFound(id)) => {
                assert_eq!(id.name, "HC-05");
                assert_eq!(id.endpoint.as_deref(), Some("127.0.0.1:9750"));
            }
            _ => panic!("Expected DeviceFound"),
        }
        assert!(matches!(rx.try_recv(), Ok(TransportEvent::ScanFinished)));
    }

    #[test]
    fn test_connect_refused_is_io_error() {
        // Bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let (tx, _rx) = mpsc::unbounded_channel();
        let radio = TcpRadio::new("HC-05", format!("127.0.0.1:{}", port), tx);
        let identity =
            PeripheralIdentity::new("HC-05", "x").with_endpoint(format!("127.0.0.1:{}", port));

        assert!(matches!(
            radio.connect(&identity),
            Err(ConnectError::Io { .. })
        ));
    }

    #[test]
    fn test_shutdown_unblocks_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let link = TcpLink::connect(&addr).unwrap();
        let (_peer, _) = listener.accept().unwrap();

        let (mut reader, _writer) = link.try_split().unwrap();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 1];
            reader.read(&mut buf)
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        link.shutdown();

        // Either EOF or an error, but the read must return
        let result = handle.join().unwrap();
        assert!(matches!(result, Ok(0) | Err(_)));
    }
}
