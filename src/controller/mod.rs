//! Session controller
//!
//! Orchestrates discovery and the link session behind a small command/event
//! interface. Owns at most one `SessionHandle`; everything that happens in
//! the background (scan results, connect outcome, inbound messages,
//! disconnects) arrives as a `TransportEvent` and is dispatched here.
//!
//! ```text
//!  Idle ──connect──▶ Scanning ──match──▶ Connecting ──ok──▶ Connected
//!   ▲                   │                    │                  │
//!   └───── finished ────┘◀──── failed ───────┘◀── lost / stop ──┘
//! ```
//!
//! No reconnection policy: after a failure or disconnect the controller
//! waits in `Idle` for the next connect request.

pub mod command;

pub use command::{Direction, Notification, UiCommand};

use crate::codec::Message;
use crate::config::PeripheralConfig;
use crate::discovery::{DiscoveryCoordinator, MatchDecision};
use crate::error::{ConnectError, ScanError, SessionError};
use crate::link::stats::Stats;
use crate::link::{LinkState, SessionHandle, SessionId, SessionOptions};
use crate::radio::{
    emit, EventReceiver, EventSender, PeripheralIdentity, Radio, RawLink, TransportEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Sender half for UI notifications
pub type NotificationSender = mpsc::UnboundedSender<Notification>;

pub struct SessionController {
    radio: Arc<dyn Radio>,
    discovery: DiscoveryCoordinator,
    events: EventSender,
    notifications: NotificationSender,
    inbound_prefix: String,
    greeting: Option<Message>,
    stats: Arc<Stats>,

    state: LinkState,
    session: Option<SessionHandle>,
    /// Peripheral being connected to or connected
    peripheral: Option<PeripheralIdentity>,
    /// Current connect attempt; outcomes of older attempts are discarded
    attempt: u64,
    next_session: u64,
    /// A connect thread has not reported back yet (it may be stale)
    connect_in_flight: bool,
    /// A connect request is waiting on a remediation result
    pending_start: bool,
    /// Gates already remediated for the current connect request
    remediated: Vec<ScanError>,
}

impl SessionController {
    /// Create a controller
    ///
    /// `events` must be the sender of the channel the controller is driven
    /// from; the radio should report on the same channel.
    pub fn new(
        config: &PeripheralConfig,
        radio: Arc<dyn Radio>,
        events: EventSender,
        notifications: NotificationSender,
    ) -> Self {
        let greeting = config
            .greeting
            .as_deref()
            .and_then(|text| match Message::new(text) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("Ignoring greeting: {}", e);
                    None
                }
            });

        Self {
            discovery: DiscoveryCoordinator::new(radio.clone(), &config.expected_name),
            radio,
            events,
            notifications,
            inbound_prefix: config.inbound_prefix.clone(),
            greeting,
            stats: Arc::new(Stats::new()),
            state: LinkState::Idle,
            session: None,
            peripheral: None,
            attempt: 0,
            next_session: 0,
            connect_in_flight: false,
            pending_start: false,
            remediated: Vec::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn peripheral(&self) -> Option<&PeripheralIdentity> {
        self.peripheral.as_ref()
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    // =========================================================================
    // UI commands
    // =========================================================================

    /// Start discovery of the expected peripheral
    ///
    /// Only valid from `Idle` with no connect attempt still running. When a
    /// gate fails, the matching remediation is requested and the scan starts
    /// once the radio reports success; each gate is remediated at most once
    /// per request.
    pub fn on_connect_requested(&mut self) -> Result<(), SessionError> {
        self.remediated.clear();
        self.start_discovery()
    }

    fn start_discovery(&mut self) -> Result<(), SessionError> {
        if self.state != LinkState::Idle {
            debug!("Connect requested while {}", self.state);
            return Err(SessionError::Busy { state: self.state });
        }
        if self.connect_in_flight {
            debug!("Connect requested while a cancelled attempt is still running");
            return Err(SessionError::Busy {
                state: LinkState::Connecting,
            });
        }

        match self.discovery.start_scan() {
            Ok(()) => {
                self.pending_start = false;
                self.set_state(LinkState::Scanning);
                self.status(format!("Searching for {}...", self.discovery.expected_name()));
                Ok(())
            }
            Err(e) => {
                self.remediate(e);
                Err(e.into())
            }
        }
    }

    /// Send free text to the peripheral
    pub fn on_send_requested(&mut self, text: &str) -> Result<(), SessionError> {
        if self.state != LinkState::Connected {
            return Err(SessionError::NotConnected);
        }
        let message = Message::new(text)?;
        self.send(&message)
    }

    /// Send a directional shortcut
    pub fn on_directional_command(&mut self, direction: Direction) -> Result<(), SessionError> {
        self.send(&direction.message())
    }

    /// Cancel whatever is in progress and return to `Idle`
    pub fn on_stop_requested(&mut self) {
        match self.state {
            LinkState::Scanning => {
                self.discovery.stop_scan();
                self.pending_start = false;
                self.set_state(LinkState::Idle);
                self.status("Scan cancelled");
            }
            LinkState::Connecting => {
                // The in-flight attempt's outcome will be discarded
                self.attempt += 1;
                self.peripheral = None;
                self.set_state(LinkState::Idle);
                self.status("Connection cancelled");
            }
            LinkState::Connected => {
                let name = self.peripheral_name();
                self.teardown();
                self.status(format!("Disconnected from {}", name));
            }
            LinkState::Idle => self.pending_start = false,
            LinkState::Closed => {}
        }
    }

    /// Stop everything for good
    pub fn shutdown(&mut self) {
        self.on_stop_requested();
        self.set_state(LinkState::Closed);
    }

    /// Apply one UI command, reporting failures as status lines
    pub fn handle_command(&mut self, command: UiCommand) {
        let result = match command {
            UiCommand::Connect => self.on_connect_requested(),
            UiCommand::Send(text) => self.on_send_requested(&text),
            UiCommand::Drive(direction) => self.on_directional_command(direction),
            UiCommand::Disconnect => {
                self.on_stop_requested();
                Ok(())
            }
            UiCommand::Status => {
                self.report_status();
                Ok(())
            }
        };

        match result {
            // Gate failures already surfaced their remediation status
            Ok(()) | Err(SessionError::Scan(_)) => {}
            Err(e) => self.status(e.to_string()),
        }
    }

    // =========================================================================
    // Transport events
    // =========================================================================

    pub fn handle_event(&mut self, event: TransportEvent) {
        debug!("Event {:?} while {}", event, self.state);

        match event {
            TransportEvent::DeviceFound(identity) => self.on_device_found(identity),
            TransportEvent::ScanStarted => {}
            TransportEvent::ScanFinished => {
                if self.state == LinkState::Scanning {
                    self.set_state(LinkState::Idle);
                    self.status(format!("{} not found", self.discovery.expected_name()));
                }
            }
            TransportEvent::LinkConnected {
                attempt,
                identity,
                link,
            } => {
                self.connect_in_flight = false;
                self.on_link_connected(attempt, identity, link)
            }
            TransportEvent::ConnectFailed { attempt, error } => {
                self.connect_in_flight = false;
                self.on_connect_failed(attempt, error)
            }
            TransportEvent::LinkDisconnected { session } => {
                if self.is_current(session) {
                    let name = self.peripheral_name();
                    self.teardown();
                    self.status(format!("Disconnected from {}", name));
                }
            }
            TransportEvent::MessageReceived { session, text } => {
                if self.is_current(session) {
                    self.notify(Notification::TelemetryReceived(text));
                }
            }
            TransportEvent::RadioEnableResult { enabled } => {
                self.on_remediation_result(enabled, "Radio was not enabled")
            }
            TransportEvent::PermissionResult { granted } => {
                self.on_remediation_result(granted, "Scan permission was not granted")
            }
        }
    }

    /// Drive the controller until the command channel closes
    pub async fn run(
        mut self,
        mut events: EventReceiver,
        mut commands: mpsc::Receiver<UiCommand>,
    ) {
        loop {
            tokio::select! {
                Some(event) = events.recv() => self.handle_event(event),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }
        self.shutdown();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn on_device_found(&mut self, identity: PeripheralIdentity) {
        if self.state != LinkState::Scanning {
            return;
        }
        if self.discovery.on_device_found(&identity) == MatchDecision::Ignored {
            return;
        }

        self.discovery.stop_scan();
        self.attempt += 1;
        self.peripheral = Some(identity.clone());
        self.set_state(LinkState::Connecting);
        self.status(format!("Connecting to {}...", identity));

        let radio = self.radio.clone();
        let events = self.events.clone();
        let attempt = self.attempt;
        let spawned = std::thread::Builder::new()
            .name("link-connect".to_string())
            .spawn(move || {
                let event = match radio.connect(&identity) {
                    Ok(link) => TransportEvent::LinkConnected {
                        attempt,
                        identity,
                        link,
                    },
                    Err(error) => TransportEvent::ConnectFailed { attempt, error },
                };
                emit(&events, event);
            });

        match spawned {
            Ok(_) => self.connect_in_flight = true,
            Err(source) => self.on_connect_failed(
                attempt,
                ConnectError::Io {
                    endpoint: "connect thread".to_string(),
                    source,
                },
            ),
        }
    }

    fn on_link_connected(
        &mut self,
        attempt: u64,
        identity: PeripheralIdentity,
        link: Box<dyn RawLink>,
    ) {
        if attempt != self.attempt || self.state != LinkState::Connecting {
            debug!("Discarding stale link to {}", identity);
            link.shutdown();
            return;
        }

        self.next_session += 1;
        let options = SessionOptions {
            id: SessionId(self.next_session),
            inbound_prefix: self.inbound_prefix.clone(),
            events: self.events.clone(),
            stats: self.stats.clone(),
        };

        match SessionHandle::open(link, options) {
            Ok(handle) => {
                self.session = Some(handle);
                self.set_state(LinkState::Connected);
                self.status(format!("Connected to {}", identity));

                if let Some(greeting) = self.greeting.clone() {
                    if let Err(e) = self.send(&greeting) {
                        warn!("Greeting failed: {}", e);
                    }
                }
            }
            Err(error) => self.on_connect_failed(attempt, error),
        }
    }

    fn on_connect_failed(&mut self, attempt: u64, error: ConnectError) {
        if attempt != self.attempt || self.state != LinkState::Connecting {
            debug!("Ignoring stale connect failure: {}", error);
            return;
        }

        warn!("Failed to connect: {}", error);
        self.peripheral = None;
        self.set_state(LinkState::Idle);
        self.status("Failed to connect. Try restarting the peripheral.");
    }

    fn on_remediation_result(&mut self, granted: bool, declined: &str) {
        if !self.pending_start {
            return;
        }
        if granted {
            // Gate reported satisfied: retry the connect request that triggered it
            self.pending_start = false;
            if let Err(e) = self.start_discovery() {
                debug!("Retry after remediation failed: {}", e);
            }
        } else {
            self.pending_start = false;
            self.status(declined);
        }
    }

    fn remediate(&mut self, error: ScanError) {
        match error {
            ScanError::RadioUnavailable => {
                self.pending_start = false;
                self.status("This device does not have radio hardware.");
            }
            ScanError::RadioDisabled | ScanError::PermissionDenied
                if self.remediated.contains(&error) =>
            {
                // Radio reported success but the gate still fails
                self.pending_start = false;
                self.status(format!("{}, giving up", error));
            }
            ScanError::RadioDisabled => {
                self.pending_start = true;
                self.remediated.push(error);
                self.status("Radio is disabled, requesting to enable it");
                self.radio.request_enable_radio();
            }
            ScanError::PermissionDenied => {
                self.pending_start = true;
                self.remediated.push(error);
                self.status("Requesting scan permission");
                self.radio.request_scan_permission();
            }
            ScanError::Refused => {
                self.pending_start = false;
                self.status("Failed to start discovery");
            }
        }
    }

    fn send(&mut self, message: &Message) -> Result<(), SessionError> {
        let session = match (&self.session, self.state) {
            (Some(session), LinkState::Connected) => session,
            _ => return Err(SessionError::NotConnected),
        };

        match session.send(message) {
            Ok(()) => Ok(()),
            Err(e) => {
                let name = self.peripheral_name();
                self.teardown();
                self.status(format!("Connection to {} lost", name));
                Err(e.into())
            }
        }
    }

    /// Release the session (if any) and return to `Idle`
    fn teardown(&mut self) {
        // The receive thread exits on its own; never join it on the caller's context
        if let Some(session) = self.session.take() {
            session.close_detached();
        }
        self.peripheral = None;
        self.set_state(LinkState::Idle);
    }

    fn is_current(&self, id: SessionId) -> bool {
        self.session.as_ref().map(|s| s.id()) == Some(id)
    }

    fn peripheral_name(&self) -> String {
        self.peripheral
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| self.discovery.expected_name().to_string())
    }

    fn report_status(&self) {
        let snap = self.stats.snapshot();
        let target = match &self.peripheral {
            Some(p) => format!(" {}", p),
            None => String::new(),
        };
        self.status(format!(
            "State: {}{} | tx {} B ({} frames, {:.0} B/s) | rx {} B ({} frames, {} dropped, {:.0} B/s)",
            self.state,
            target,
            snap.tx_bytes,
            snap.tx_frames,
            snap.tx_rate,
            snap.rx_bytes,
            snap.rx_frames,
            snap.dropped_frames,
            snap.rx_rate,
        ));
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state != state {
            info!("{} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn status(&self, text: impl Into<String>) {
        self.notify(Notification::StatusChanged(text.into()));
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            debug!("UI gone, dropping notification");
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.close_detached();
        }
    }
}
