//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Peripheral
// =============================================================================

/// Name advertised by the stock HC-05 SPP module
pub const DEFAULT_PERIPHERAL_NAME: &str = "HC-05";

/// Prefix marking inbound lines addressed to this client
///
/// Everything else on the stream is firmware log output.
pub const DEFAULT_INBOUND_PREFIX: &str = "BL: ";

/// Unit appended to telemetry values by the console
pub const DEFAULT_TELEMETRY_UNIT: &str = "cm";

/// Baud rate of the HC-05 in data mode
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Address of the TCP peripheral simulator
pub const DEFAULT_TCP_ADDRESS: &str = "127.0.0.1:9750";

// =============================================================================
// Framing
// =============================================================================

/// Terminator appended to every outbound frame
pub const OUTBOUND_DELIMITER: u8 = 0x00;

/// Terminator of every inbound frame
pub const INBOUND_DELIMITER: u8 = b'\n';

/// Largest inbound frame kept before the partial buffer is dropped
pub const MAX_FRAME_SIZE: usize = 4096;

// =============================================================================
// Timing
// =============================================================================

/// Serial read timeout, used only to observe link shutdown
pub const SERIAL_READ_TIMEOUT_MS: u64 = 100;

/// Minimum interval between rate updates (seconds)
pub const RATE_UPDATE_MIN_INTERVAL_SECS: f64 = 0.1;

/// Simulator bind attempts before giving up
pub const MAX_SOCKET_RETRY_ATTEMPTS: u32 = 5;

/// Base delay for bind retry backoff (milliseconds)
pub const RETRY_BASE_DELAY_MS: u64 = 200;

// =============================================================================
// Serial
// =============================================================================

/// Consecutive zero-byte reads before assuming port disconnected
pub const SERIAL_DISCONNECT_THRESHOLD: u32 = 10;
