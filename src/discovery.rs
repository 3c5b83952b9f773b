//! Discovery coordinator
//!
//! Checks the radio gates, drives scanning and decides which discovered
//! device is the expected peripheral. Matching is exact and case-sensitive on
//! the device name; the first match of a scan wins.

use crate::error::ScanError;
use crate::radio::{PeripheralIdentity, Radio};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of offering a discovered device to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    Matched,
    Ignored,
}

pub struct DiscoveryCoordinator {
    radio: Arc<dyn Radio>,
    expected_name: String,
    /// Set once a scan produced its match; reset by `start_scan`
    matched: bool,
}

impl DiscoveryCoordinator {
    pub fn new(radio: Arc<dyn Radio>, expected_name: impl Into<String>) -> Self {
        Self {
            radio,
            expected_name: expected_name.into(),
            matched: false,
        }
    }

    pub fn expected_name(&self) -> &str {
        &self.expected_name
    }

    /// Check the gates in order (hardware, enabled, permission)
    pub fn check_gates(&self) -> Result<(), ScanError> {
        if !self.radio.is_radio_present() {
            return Err(ScanError::RadioUnavailable);
        }
        if !self.radio.is_radio_enabled() {
            return Err(ScanError::RadioDisabled);
        }
        if !self.radio.has_scan_permission() {
            return Err(ScanError::PermissionDenied);
        }
        Ok(())
    }

    /// Start scanning for the expected peripheral
    ///
    /// The first failing gate is returned and nothing is started; the caller
    /// remediates and calls again.
    pub fn start_scan(&mut self) -> Result<(), ScanError> {
        self.check_gates()?;

        self.matched = false;
        self.radio.begin_scan().map_err(|e| {
            warn!("Radio refused to scan: {}", e);
            ScanError::Refused
        })?;
        info!("Scanning for {}", self.expected_name);
        Ok(())
    }

    /// Decide whether a discovered device is the expected peripheral
    pub fn on_device_found(&mut self, identity: &PeripheralIdentity) -> MatchDecision {
        debug!("Device: {}", identity);

        if self.matched || identity.name != self.expected_name {
            return MatchDecision::Ignored;
        }

        self.matched = true;
        info!("Matched {}", identity);
        MatchDecision::Matched
    }

    /// Best-effort scan cancellation
    pub fn stop_scan(&self) {
        if let Err(e) = self.radio.cancel_scan() {
            warn!("Failed to cancel scan: {}", e);
        }
    }
}
