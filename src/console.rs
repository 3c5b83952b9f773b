//! Headless console front-end
//!
//! Reads one command per stdin line and prints controller notifications to
//! stdout, either as timestamped text or as JSON lines.

use crate::controller::{Direction, Notification, UiCommand};
use crate::logging::LogEntry;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(UiCommand),
    Quit,
    Empty,
}

/// Parse a console line
///
/// Unknown words are sent to the peripheral as free text.
pub fn parse_line(line: &str) -> ConsoleInput {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ConsoleInput::Empty;
    }

    let (word, rest) = match trimmed.split_once(' ') {
        Some((word, rest)) => (word, rest),
        None => (trimmed, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "quit" | "exit" if rest.is_empty() => ConsoleInput::Quit,
        "connect" if rest.is_empty() => ConsoleInput::Command(UiCommand::Connect),
        "disconnect" if rest.is_empty() => ConsoleInput::Command(UiCommand::Disconnect),
        "status" if rest.is_empty() => ConsoleInput::Command(UiCommand::Status),
        "send" => ConsoleInput::Command(UiCommand::Send(rest.to_string())),
        other if rest.is_empty() => match other.parse::<Direction>() {
            Ok(direction) => ConsoleInput::Command(UiCommand::Drive(direction)),
            Err(()) => ConsoleInput::Command(UiCommand::Send(trimmed.to_string())),
        },
        _ => ConsoleInput::Command(UiCommand::Send(trimmed.to_string())),
    }
}

pub fn help() -> &'static str {
    "commands: connect | disconnect | status | f b l r s | send <text> | quit"
}

/// Forward stdin commands until `quit` or end of input
///
/// Dropping `commands` on return ends the controller loop.
pub async fn read_commands(commands: mpsc::Sender<UiCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!("stdin: {}", e);
                break;
            }
        };

        match parse_line(&line) {
            ConsoleInput::Command(command) => {
                if commands.send(command).await.is_err() {
                    break;
                }
            }
            ConsoleInput::Quit => break,
            ConsoleInput::Empty => {}
        }
    }
}

/// Print notifications until the controller goes away
pub async fn print_notifications(
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    json: bool,
    unit: String,
) {
    while let Some(notification) = notifications.recv().await {
        let entry = LogEntry::from_notification(notification);
        if json {
            println!("{}", entry.to_json());
        } else {
            println!("{}", entry.render(&unit));
        }
    }
}
