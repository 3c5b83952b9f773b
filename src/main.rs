//! rover-link - remote control for a Bluetooth SPP rover
//!
//! Usage:
//!   rover-link                      Connect and read commands from stdin
//!   rover-link --tcp 127.0.0.1:9750 Use the simulator instead of hardware
//!   rover-link list-ports           Show serial ports
//!   rover-link simulate             Run the virtual peripheral

use clap::Parser;
use rover_link::cli::{Cli, Command};
use rover_link::config::{self, Config, PairedDevice, RadioBackend};
use rover_link::console;
use rover_link::controller::{SessionController, UiCommand};
use rover_link::error::{AppError, Result};
use rover_link::logging;
use rover_link::radio::{self, serial, EventSender, Radio, SerialRadio, TcpRadio};
use rover_link::simulator::{Simulator, SimulatorConfig};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Some(Command::ListPorts) => list_ports(&config),
        Some(Command::Simulate {
            ref listen,
            interval_ms,
        }) => {
            let sim_config = SimulatorConfig {
                listen: listen.clone().unwrap_or_else(|| config.radio.tcp_address.clone()),
                prefix: config.peripheral.inbound_prefix.clone(),
                interval: Duration::from_millis(interval_ms.max(1)),
            };
            let rt = runtime()?;
            rt.block_on(run_simulator(sim_config))
        }
        None => {
            let rt = runtime()?;
            let result = rt.block_on(run_console(config, cli.json));
            // stdin reads block a worker; don't wait for them
            rt.shutdown_timeout(Duration::from_millis(100));
            result
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|source| AppError::Runtime { source })
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };

    if let Some(backend) = cli.backend_override() {
        config.radio.backend = backend;
    }
    if let Some(address) = &cli.tcp {
        config.radio.tcp_address = address.clone();
    }
    if let Some(port) = &cli.port {
        // Ad-hoc device: assume the port belongs to the expected peripheral
        config.radio.devices = vec![PairedDevice {
            name: config.peripheral.expected_name.clone(),
            address: port.clone(),
            port: port.clone(),
        }];
    }

    config.validate()?;
    Ok(config)
}

fn list_ports(config: &Config) -> Result<()> {
    let ports = serial::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in &ports {
        let paired = config
            .radio
            .devices
            .iter()
            .find(|d| d.port == port.port_name)
            .map(|d| format!("  <- {} ({})", d.name, d.address))
            .unwrap_or_default();
        println!("{:<24} {}{}", port.port_name, serial::describe_port(port), paired);
    }
    Ok(())
}

fn create_radio(config: &Config, events: EventSender) -> Arc<dyn Radio> {
    match config.radio.backend {
        RadioBackend::Serial => Arc::new(SerialRadio::new(
            config.radio.devices.clone(),
            config.radio.baud_rate,
            events,
        )),
        RadioBackend::Tcp => Arc::new(TcpRadio::new(
            &config.radio.tcp_name,
            &config.radio.tcp_address,
            events,
        )),
    }
}

async fn run_console(config: Config, json: bool) -> Result<()> {
    let (events_tx, events_rx) = mpsc::unbounded_channel::<radio::TransportEvent>();
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::channel::<UiCommand>(16);

    let radio = create_radio(&config, events_tx.clone());
    let controller = SessionController::new(&config.peripheral, radio, events_tx, notify_tx);

    info!(
        "Backend: {:?}, looking for {}",
        config.radio.backend, config.peripheral.expected_name
    );
    eprintln!("{}", console::help());

    let printer = tokio::spawn(console::print_notifications(
        notify_rx,
        json,
        config.peripheral.telemetry_unit.clone(),
    ));

    // Start searching right away
    let _ = command_tx.send(UiCommand::Connect).await;
    tokio::spawn(console::read_commands(command_tx));

    tokio::select! {
        _ = controller.run(events_rx, command_rx) => {},
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    // Controller dropped: session closed, notification channel closed
    let _ = printer.await;
    Ok(())
}

async fn run_simulator(config: SimulatorConfig) -> Result<()> {
    let simulator = Simulator::bind(config)?;
    if let Some(addr) = simulator.local_addr() {
        eprintln!("Simulating peripheral on {}", addr);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.store(true, Ordering::SeqCst);
    });

    simulator.run(shutdown).await;
    Ok(())
}
