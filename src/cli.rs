//! Command-line interface definition using clap

use crate::config::RadioBackend;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Remote-control client for a Bluetooth SPP peripheral
#[derive(Parser, Debug, Default)]
#[command(name = "rover-link")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file (default: config.toml next to the executable)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Radio backend (overrides config)
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Serial port of the peripheral (overrides configured devices)
    #[arg(long, value_name = "PORT")]
    pub port: Option<String>,

    /// Simulator address, implies the tcp backend
    #[arg(long, value_name = "ADDR")]
    pub tcp: Option<String>,

    /// Print notifications as JSON lines
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Serial,
    Tcp,
}

impl From<BackendArg> for RadioBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Serial => RadioBackend::Serial,
            BackendArg::Tcp => RadioBackend::Tcp,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports (paired SPP peripherals show up here)
    ListPorts,

    /// Run a virtual peripheral on TCP
    Simulate {
        /// Address to listen on
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,

        /// Telemetry period in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 500)]
        interval_ms: u64,
    },
}

impl Cli {
    /// Backend selected on the command line, if any
    pub fn backend_override(&self) -> Option<RadioBackend> {
        if self.tcp.is_some() {
            return Some(RadioBackend::Tcp);
        }
        self.backend.map(Into::into)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_defaults() {
        let cli = Cli::parse_from(["rover-link"]);
        assert!(!cli.verbose);
        assert!(!cli.json);
        assert!(cli.config.is_none());
        assert!(cli.command.is_none());
        assert_eq!(cli.backend_override(), None);
    }

    #[test]
    fn test_cli_parse_verbose() {
        let cli = Cli::parse_from(["rover-link", "-v"]);
        assert!(cli.verbose);

        let cli = Cli::parse_from(["rover-link", "--verbose"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_parse_port() {
        let cli = Cli::parse_from(["rover-link", "--port", "/dev/rfcomm0"]);
        assert_eq!(cli.port, Some("/dev/rfcomm0".to_string()));
    }

    #[test]
    fn test_cli_tcp_implies_backend() {
        let cli = Cli::parse_from(["rover-link", "--backend", "serial", "--tcp", "127.0.0.1:9750"]);
        assert_eq!(cli.backend_override(), Some(RadioBackend::Tcp));

        let cli = Cli::parse_from(["rover-link", "--backend", "tcp"]);
        assert_eq!(cli.backend_override(), Some(RadioBackend::Tcp));
    }

    #[test]
    fn test_cli_parse_simulate() {
        let cli = Cli::parse_from(["rover-link", "simulate", "--listen", "0.0.0.0:9750"]);
        match cli.command {
            Some(Command::Simulate {
                listen,
                interval_ms,
            }) => {
                assert_eq!(listen, Some("0.0.0.0:9750".to_string()));
                assert_eq!(interval_ms, 500);
            }
            _ => panic!("Expected Simulate command"),
        }
    }

    #[test]
    fn test_cli_parse_list_ports() {
        let cli = Cli::parse_from(["rover-link", "list-ports"]);
        assert!(matches!(cli.command, Some(Command::ListPorts)));
    }
}
