//! Serial radio for paired SPP peripherals
//!
//! Once an SPP module (HC-05, HC-06) is paired, the OS exposes it as a serial
//! port: `/dev/rfcomm0` after `rfcomm bind` on Linux, `/dev/cu.HC-05-DevB` on
//! macOS, an outgoing `COMx` port on Windows. Opening the port establishes the
//! radio link.
//!
//! Discovery reports every configured paired device whose port is present.
//! Pairing, enabling the adapter and permissions are handled by the OS before
//! this program runs, so all gates report satisfied when ports can be listed.

use super::{emit, EventSender, PeripheralIdentity, Radio, RawLink, TransportEvent};
use crate::config::PairedDevice;
use crate::constants::{SERIAL_DISCONNECT_THRESHOLD, SERIAL_READ_TIMEOUT_MS};
use crate::error::{AppError, ConnectError};
use parking_lot::Mutex;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Radio backed by OS serial ports bound to paired peripherals
///
/// # Example
///
/// ```ignore
/// let radio = SerialRadio::new(config.radio.devices.clone(), 9600, events_tx);
/// radio.begin_scan()?; // DeviceFound for each present device
/// ```
pub struct SerialRadio {
    devices: Vec<PairedDevice>,
    baud_rate: u32,
    events: EventSender,
}

impl SerialRadio {
    pub fn new(devices: Vec<PairedDevice>, baud_rate: u32, events: EventSender) -> Self {
        Self {
            devices,
            baud_rate,
            events,
        }
    }

    /// Open a serial port as a raw link
    pub fn open(port_name: &str, baud_rate: u32) -> Result<SerialLink, ConnectError> {
        let map_err = |e: serialport::Error| ConnectError::Io {
            endpoint: port_name.to_string(),
            source: io::Error::other(e.to_string()),
        };

        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(SERIAL_READ_TIMEOUT_MS))
            .open()
            .map_err(map_err)?;

        Ok(SerialLink {
            port_name: port_name.to_string(),
            port: Mutex::new(port),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// List the serial ports the OS currently exposes
pub fn list_ports() -> Result<Vec<SerialPortInfo>, AppError> {
    serialport::available_ports().map_err(|source| AppError::PortList { source })
}

/// Short description of a port's type for listings
pub fn describe_port(port: &SerialPortInfo) -> String {
    match &port.port_type {
        SerialPortType::BluetoothPort => "bluetooth".to_string(),
        SerialPortType::UsbPort(usb) => format!(
            "usb {:04x}:{:04x} {}",
            usb.vid,
            usb.pid,
            usb.product.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_string(),
        SerialPortType::PciPort => "pci".to_string(),
        SerialPortType::Unknown => "unknown".to_string(),
    }
}

/// Check if a paired device's port is currently available
fn is_present(device: &PairedDevice, ports: &[SerialPortInfo]) -> bool {
    // rfcomm TTYs are not always enumerated, fall back to the device node
    ports.iter().any(|p| p.port_name == device.port) || Path::new(&device.port).exists()
}

impl Radio for SerialRadio {
    fn is_radio_present(&self) -> bool {
        serialport::available_ports().is_ok()
    }

    fn is_radio_enabled(&self) -> bool {
        true
    }

    fn request_enable_radio(&self) {
        emit(
            &self.events,
            TransportEvent::RadioEnableResult {
                enabled: self.is_radio_enabled(),
            },
        );
    }

    fn has_scan_permission(&self) -> bool {
        true
    }

    fn request_scan_permission(&self) {
        emit(&self.events, TransportEvent::PermissionResult { granted: true });
    }

    fn begin_scan(&self) -> io::Result<()> {
        let ports = serialport::available_ports().map_err(|e| io::Error::other(e.to_string()))?;

        emit(&self.events, TransportEvent::ScanStarted);
        for device in &self.devices {
            if is_present(device, &ports) {
                emit(&self.events, TransportEvent::DeviceFound(device.identity()));
            } else {
                debug!("Paired device {} not present on {}", device.name, device.port);
            }
        }
        emit(&self.events, TransportEvent::ScanFinished);
        Ok(())
    }

    fn cancel_scan(&self) -> io::Result<()> {
        // Enumeration completes inside begin_scan
        Ok(())
    }

    fn connect(&self, identity: &PeripheralIdentity) -> Result<Box<dyn RawLink>, ConnectError> {
        let port = identity
            .endpoint
            .as_deref()
            .ok_or_else(|| ConnectError::Unreachable {
                address: identity.address.clone(),
            })?;

        info!("Opening {} @ {} baud for {}", port, self.baud_rate, identity);
        Ok(Box::new(Self::open(port, self.baud_rate)?))
    }
}

/// Raw link over an open serial port
pub struct SerialLink {
    port_name: String,
    port: Mutex<Box<dyn SerialPort>>,
    closed: Arc<AtomicBool>,
}

impl RawLink for SerialLink {
    fn endpoint(&self) -> &str {
        &self.port_name
    }

    fn try_split(&self) -> io::Result<(Box<dyn Read + Send>, Box<dyn Write + Send>)> {
        let guard = self.port.lock();
        let port: &dyn SerialPort = &**guard;
        let clone = |p: &dyn SerialPort| p.try_clone().map_err(|e| io::Error::other(e.to_string()));

        let reader = SerialReader {
            port: clone(port)?,
            closed: self.closed.clone(),
            zero_reads: 0,
        };
        let writer: Box<dyn Write + Send> = Box::new(clone(port)?);
        Ok((Box::new(reader), writer))
    }

    fn shutdown(&self) {
        // Port handles close when the halves and this link are dropped
        self.closed.store(true, Ordering::Release);
    }
}

/// Read half of a serial link
///
/// Serial reads cannot be interrupted by another thread, so the port runs
/// with a short timeout and the reader checks the shutdown flag between
/// timeouts. Callers see a plain blocking reader.
struct SerialReader<P> {
    port: P,
    closed: Arc<AtomicBool>,
    zero_reads: u32,
}

impl<P: Read> Read for SerialReader<P> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "link closed"));
            }

            match self.port.read(buf) {
                Ok(0) => {
                    // Zero bytes read - could be normal or port gone
                    self.zero_reads += 1;
                    if self.zero_reads > SERIAL_DISCONNECT_THRESHOLD {
                        return Ok(0);
                    }
                }
                Ok(n) => {
                    self.zero_reads = 0;
                    return Ok(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                    self.zero_reads = 0;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn device(port: &str) -> PairedDevice {
        PairedDevice {
            name: "HC-05".to_string(),
            address: "98:D3:31:F5:2A:10".to_string(),
            port: port.to_string(),
        }
    }

    #[test]
    fn test_is_present_by_enumeration() {
        let ports = vec![SerialPortInfo {
            port_name: "COM7".to_string(),
            port_type: SerialPortType::BluetoothPort,
        }];
        assert!(is_present(&device("COM7"), &ports));
        assert!(!is_present(&device("COM8-definitely-missing"), &ports));
    }

    #[test]
    fn test_describe_bluetooth_port() {
        let port = SerialPortInfo {
            port_name: "COM7".to_string(),
            port_type: SerialPortType::BluetoothPort,
        };
        assert_eq!(describe_port(&port), "bluetooth");
    }

    #[test]
    fn test_connect_without_endpoint_is_unreachable() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let radio = SerialRadio::new(vec![], 9600, tx);
        let identity = PeripheralIdentity::new("HC-05", "98:D3:31:F5:2A:10");

        match radio.connect(&identity) {
            Err(ConnectError::Unreachable { address }) => {
                assert_eq!(address, "98:D3:31:F5:2A:10")
            }
            _ => panic!("Expected Unreachable"),
        }
    }

    #[test]
    fn test_remediation_results_are_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let radio = SerialRadio::new(vec![], 9600, tx);

        radio.request_enable_radio();
        radio.request_scan_permission();

        assert!(matches!(
            rx.try_recv(),
            Ok(TransportEvent::RadioEnableResult { enabled: true })
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(TransportEvent::PermissionResult { granted: true })
        ));
    }

    /// Port that times out forever, closing the link on the given call
    struct TimingOutPort {
        calls: usize,
        close_on: usize,
        closed: Arc<AtomicBool>,
    }

    impl Read for TimingOutPort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls == self.close_on {
                self.closed.store(true, Ordering::Release);
            }
            Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))
        }
    }

    #[test]
    fn test_reader_aborts_once_closed() {
        let closed = Arc::new(AtomicBool::new(false));
        let mut reader = SerialReader {
            port: TimingOutPort {
                calls: 0,
                close_on: 3,
                closed: closed.clone(),
            },
            closed,
            zero_reads: 0,
        };

        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
        assert_eq!(reader.port.calls, 3);
    }

    #[test]
    fn test_reader_passes_data_and_detects_silent_port() {
        let mut reader = SerialReader {
            port: io::Cursor::new(b"BL: 7\n".to_vec()),
            closed: Arc::new(AtomicBool::new(false)),
            zero_reads: 0,
        };

        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"BL: 7\n");

        // Exhausted cursor reads zero bytes every time
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.zero_reads, SERIAL_DISCONNECT_THRESHOLD + 1);
    }
}
