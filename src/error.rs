//! Centralized error types
//!
//! Every failure of the link stack is turned into one of these values at the
//! component boundary; nothing below the controller panics on I/O.
//!
//! - `ScanError`: discovery gates
//! - `ConnectError`: establishing or opening a link
//! - `WriteError`: outbound writes on a session
//! - `SessionError`: commands rejected by the controller
//! - `AppError`: binary set-up (config, runtime, backend)

use std::fmt;
use std::path::PathBuf;

use crate::link::LinkState;

// =============================================================================
// Discovery
// =============================================================================

/// A discovery gate that is not satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    /// No radio hardware; nothing the user can do
    RadioUnavailable,
    /// Radio present but switched off; recoverable via enable prompt
    RadioDisabled,
    /// Scan permission not granted; recoverable via permission prompt
    PermissionDenied,
    /// The transport refused to start scanning
    Refused,
}

impl std::error::Error for ScanError {}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RadioUnavailable => write!(f, "Radio hardware unavailable"),
            Self::RadioDisabled => write!(f, "Radio disabled"),
            Self::PermissionDenied => write!(f, "Scan permission denied"),
            Self::Refused => write!(f, "Radio refused to start scanning"),
        }
    }
}

// =============================================================================
// Link
// =============================================================================

/// Failure to establish or open a link
#[derive(Debug)]
pub enum ConnectError {
    /// Peripheral has no endpoint the backend can reach
    Unreachable { address: String },
    /// Transport-level failure while connecting or splitting the stream
    Io {
        endpoint: String,
        source: std::io::Error,
    },
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Unreachable { .. } => None,
        }
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { address } => write!(f, "No endpoint for peripheral {}", address),
            Self::Io { endpoint, source } => {
                write!(f, "Cannot connect to {}: {}", endpoint, source)
            }
        }
    }
}

/// Failure to write on a session
#[derive(Debug)]
pub enum WriteError {
    /// Session already torn down; no I/O was attempted
    Unavailable,
    /// The write failed and the link has been released
    Io { source: std::io::Error },
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source } => Some(source),
            Self::Unavailable => None,
        }
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "Link output unavailable"),
            Self::Io { source } => write!(f, "Link write failed: {}", source),
        }
    }
}

// =============================================================================
// Controller
// =============================================================================

/// A command the session controller refused or could not complete
#[derive(Debug)]
pub enum SessionError {
    /// Outbound message requested while not connected
    NotConnected,
    /// A scan, connect attempt or session is already in progress
    Busy { state: LinkState },
    /// Outbound messages must not be empty
    EmptyMessage,
    /// Outbound messages must not contain the frame terminator
    EmbeddedTerminator,
    /// Discovery could not start
    Scan(ScanError),
    /// The session failed while writing
    Write(WriteError),
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Scan(e) => Some(e),
            Self::Write(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "Not connected"),
            Self::Busy { state } => write!(f, "Busy ({})", state),
            Self::EmptyMessage => write!(f, "Message is empty"),
            Self::EmbeddedTerminator => write!(f, "Message contains a frame terminator"),
            Self::Scan(e) => write!(f, "{}", e),
            Self::Write(e) => write!(f, "{}", e),
        }
    }
}

impl From<ScanError> for SessionError {
    fn from(e: ScanError) -> Self {
        Self::Scan(e)
    }
}

impl From<WriteError> for SessionError {
    fn from(e: WriteError) -> Self {
        Self::Write(e)
    }
}

// =============================================================================
// Binary
// =============================================================================

/// Set-up errors of the binary
#[derive(Debug)]
pub enum AppError {
    /// Config file could not be read or written
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },
    /// Serial port enumeration failed
    PortList { source: serialport::Error },
    /// Tokio runtime creation failed
    Runtime { source: std::io::Error },
    /// Simulator could not listen
    Bind {
        address: String,
        source: std::io::Error,
    },
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigRead { source, .. }
            | Self::Runtime { source }
            | Self::Bind { source, .. } => Some(source),
            Self::PortList { source } => Some(source),
            Self::ConfigValidation { .. } => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigRead { path, .. } => write!(f, "Config IO error: {}", path.display()),
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
            Self::PortList { source } => write!(f, "Cannot list serial ports: {}", source),
            Self::Runtime { .. } => write!(f, "Failed to create runtime"),
            Self::Bind { address, source } => {
                write!(f, "Failed to listen on {}: {}", address, source)
            }
        }
    }
}

/// Alias for Result with AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_session_error_wraps_write_source() {
        let err = SessionError::from(WriteError::Io {
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"),
        });
        assert!(err.source().is_some());
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_busy_reports_state() {
        let err = SessionError::Busy {
            state: LinkState::Connecting,
        };
        assert_eq!(err.to_string(), "Busy (connecting)");
    }

    #[test]
    fn test_scan_error_display() {
        assert_eq!(ScanError::RadioDisabled.to_string(), "Radio disabled");
        assert_eq!(
            SessionError::from(ScanError::PermissionDenied).to_string(),
            "Scan permission denied"
        );
    }
}
