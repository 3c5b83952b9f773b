//! Virtual peripheral over TCP
//!
//! Behaves like the rover firmware behind an SPP module, so the client can be
//! driven without hardware:
//! - reads `0x00`-terminated commands and acknowledges each one
//! - prints a distance reading every tick, prefixed for the client
//! - interleaves unaddressed debug chatter the client must ignore
//!
//! Serves one client at a time; a disconnect returns to accepting.

use crate::codec::FrameDecoder;
use crate::constants::{
    DEFAULT_INBOUND_PREFIX, DEFAULT_TCP_ADDRESS, MAX_SOCKET_RETRY_ATTEMPTS, OUTBOUND_DELIMITER,
    RETRY_BASE_DELAY_MS,
};
use crate::controller::Direction;
use crate::error::{AppError, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Every Nth tick also prints a line not addressed to the client
const CHATTER_EVERY: u64 = 4;

const MIN_DISTANCE: u32 = 5;
const MAX_DISTANCE: u32 = 200;
const STEP: u32 = 3;

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub listen: String,
    /// Prefix of addressed lines
    pub prefix: String,
    /// Telemetry period
    pub interval: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_TCP_ADDRESS.to_string(),
            prefix: DEFAULT_INBOUND_PREFIX.to_string(),
            interval: Duration::from_millis(500),
        }
    }
}

// =============================================================================
// Rover model
// =============================================================================

/// Simulated drive and range finder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rover {
    drive: Direction,
    distance: u32,
}

impl Default for Rover {
    fn default() -> Self {
        Self {
            drive: Direction::Stop,
            distance: 120,
        }
    }
}

impl Rover {
    pub fn drive(&self) -> Direction {
        self.drive
    }

    pub fn distance(&self) -> u32 {
        self.distance
    }

    /// Apply one received command; returns the reply line (without newline)
    pub fn apply(&mut self, command: &str) -> String {
        let direction = match command {
            "S" => Some(Direction::Stop),
            "F" => Some(Direction::Forward),
            "B" => Some(Direction::Backward),
            "L" => Some(Direction::Left),
            "R" => Some(Direction::Right),
            _ => None,
        };

        match direction {
            Some(direction) => {
                self.drive = direction;
                format!("ack {}", direction)
            }
            None => format!("echo {}", command),
        }
    }

    /// Advance one tick and return the current reading
    pub fn tick(&mut self) -> u32 {
        match self.drive {
            Direction::Forward => {
                self.distance = self.distance.saturating_sub(STEP);
                if self.distance < MIN_DISTANCE {
                    // Obstacle hit: firmware stops the motors
                    self.distance = MIN_DISTANCE;
                    self.drive = Direction::Stop;
                }
            }
            Direction::Backward => {
                self.distance = (self.distance + STEP).min(MAX_DISTANCE);
            }
            Direction::Stop | Direction::Left | Direction::Right => {}
        }
        self.distance
    }
}

// =============================================================================
// Server
// =============================================================================

pub struct Simulator {
    listener: TcpListener,
    config: SimulatorConfig,
}

impl Simulator {
    /// Bind the listening socket
    pub fn bind(config: SimulatorConfig) -> Result<Self> {
        let listener = create_reusable_listener(&config.listen)?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Serve clients until `shutdown` is set
    pub async fn run(self, shutdown: Arc<AtomicBool>) {
        info!("Simulator listening on {}", self.config.listen);

        while !shutdown.load(Ordering::Relaxed) {
            match tokio::time::timeout(Duration::from_millis(100), self.listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    info!("Client connected: {}", addr);
                    if let Err(e) = serve(stream, &self.config, &shutdown).await {
                        debug!("Client {}: {}", addr, e);
                    }
                    info!("Client disconnected: {}", addr);
                }
                Ok(Err(e)) => warn!("Accept failed: {}", e),
                Err(_) => {
                    // Timeout - check shutdown flag
                }
            }
        }
    }
}

async fn serve(
    stream: TcpStream,
    config: &SimulatorConfig,
    shutdown: &AtomicBool,
) -> std::io::Result<()> {
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = FrameDecoder::new(OUTBOUND_DELIMITER);
    let mut rover = Rover::default();
    let mut ticker = tokio::time::interval(config.interval);
    let mut ticks: u64 = 0;
    let mut buf = [0u8; 256];

    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }

        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }

                let mut commands = Vec::new();
                decoder.feed_slice(&buf[..n], |frame| commands.push(frame));
                for command in commands {
                    debug!("Command: {:?}", command);
                    let reply = rover.apply(&command);
                    writer
                        .write_all(format!("{}{}\n", config.prefix, reply).as_bytes())
                        .await?;
                }
            }
            _ = ticker.tick() => {
                ticks += 1;
                let distance = rover.tick();
                writer
                    .write_all(format!("{}{}\n", config.prefix, distance).as_bytes())
                    .await?;
                if ticks % CHATTER_EVERY == 0 {
                    let chatter = format!("dbg: drive={} uptime={}\r\n", rover.drive(), ticks);
                    writer.write_all(chatter.as_bytes()).await?;
                }
            }
        }
    }
}

/// Create a TCP listener with SO_REUSEADDR for quick rebind after restart
///
/// Retries a few times if the address is still in use.
fn create_reusable_listener(address: &str) -> Result<TcpListener> {
    let map_err = |e| AppError::Bind {
        address: address.to_string(),
        source: e,
    };
    let addr: SocketAddr = address.parse().map_err(|_| AppError::ConfigValidation {
        field: "listen",
        reason: format!("'{}' is not a socket address", address),
    })?;

    for attempt in 0..MAX_SOCKET_RETRY_ATTEMPTS {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(map_err)?;
        socket.set_reuse_address(true).map_err(map_err)?;
        socket.set_nonblocking(true).map_err(map_err)?;

        match socket.bind(&addr.into()) {
            Ok(()) => {
                socket.listen(4).map_err(map_err)?;
                let std_listener: std::net::TcpListener = socket.into();
                return TcpListener::from_std(std_listener).map_err(map_err);
            }
            Err(_) if attempt < MAX_SOCKET_RETRY_ATTEMPTS - 1 => {
                // Exponential backoff: 200ms, 400ms, 800ms, 1600ms
                std::thread::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * (1 << attempt)));
            }
            Err(e) => return Err(map_err(e)),
        }
    }

    Err(map_err(std::io::Error::new(
        std::io::ErrorKind::AddrInUse,
        "failed after retries",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};

    #[test]
    fn test_rover_commands() {
        let mut rover = Rover::default();
        assert_eq!(rover.apply("F"), "ack forward");
        assert_eq!(rover.drive(), Direction::Forward);
        assert_eq!(rover.apply("Hello"), "echo Hello");
        assert_eq!(rover.drive(), Direction::Forward);
    }

    #[test]
    fn test_rover_stops_at_obstacle() {
        let mut rover = Rover::default();
        rover.apply("F");
        for _ in 0..100 {
            rover.tick();
        }
        assert_eq!(rover.distance(), MIN_DISTANCE);
        assert_eq!(rover.drive(), Direction::Stop);
    }

    #[test]
    fn test_rover_backward_is_capped() {
        let mut rover = Rover::default();
        rover.apply("B");
        for _ in 0..100 {
            rover.tick();
        }
        assert_eq!(rover.distance(), MAX_DISTANCE);
    }

    #[test]
    fn test_bind_rejects_bad_address() {
        let config = SimulatorConfig {
            listen: "not-an-address".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Simulator::bind(config),
            Err(AppError::ConfigValidation { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_simulator_acks_and_reports() {
        let config = SimulatorConfig {
            listen: "127.0.0.1:0".to_string(),
            interval: Duration::from_millis(20),
            ..Default::default()
        };
        let sim = Simulator::bind(config).unwrap();
        let addr = sim.local_addr().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(sim.run(shutdown.clone()));

        let lines = tokio::task::spawn_blocking(move || {
            let mut stream = std::net::TcpStream::connect(addr).unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            stream.write_all(b"F\0").unwrap();

            let mut reader = BufReader::new(stream);
            let mut lines = Vec::new();
            while lines.len() < 6 {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                lines.push(line);
            }
            lines
        })
        .await
        .unwrap();

        assert!(lines.iter().any(|l| l == "BL: ack forward\n"));
        assert!(lines
            .iter()
            .any(|l| l.starts_with("BL: ") && l.trim_end()[4..].parse::<u32>().is_ok()));

        shutdown.store(true, Ordering::SeqCst);
        task.await.unwrap();
    }
}
