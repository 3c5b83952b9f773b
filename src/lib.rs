//! Remote-control client for a Bluetooth SPP peripheral
//!
//! Finds the peripheral by name, holds one duplex link to it, sends short
//! text commands and delivers the telemetry lines addressed to this client.
//!
//! Layers, leaves first:
//! - `codec` - frame encoding/decoding
//! - `radio` - discovery and raw links (serial, TCP)
//! - `link` - one live session and its receive thread
//! - `discovery` - radio gates and identity matching
//! - `controller` - orchestration behind a command/event interface

pub mod cli;
pub mod codec;
pub mod config;
pub mod console;
pub mod constants;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod link;
pub mod logging;
pub mod radio;
pub mod simulator;
