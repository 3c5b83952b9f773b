//! Commands and notifications exchanged with the UI layer

use crate::codec::Message;
use std::fmt;
use std::str::FromStr;

/// Directional shortcut understood by the peripheral firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Stop,
    Forward,
    Backward,
    Left,
    Right,
}

impl Direction {
    /// Single-character command sent on the wire
    pub fn command(self) -> &'static str {
        match self {
            Self::Stop => "S",
            Self::Forward => "F",
            Self::Backward => "B",
            Self::Left => "L",
            Self::Right => "R",
        }
    }

    pub fn message(self) -> Message {
        Message::from_static(self.command())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stop => "stop",
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
        };
        f.write_str(s)
    }
}

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" | "s" => Ok(Self::Stop),
            "forward" | "f" => Ok(Self::Forward),
            "backward" | "back" | "b" => Ok(Self::Backward),
            "left" | "l" => Ok(Self::Left),
            "right" | "r" => Ok(Self::Right),
            _ => Err(()),
        }
    }
}

/// Request from the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    /// Scan for the peripheral and connect to it
    Connect,
    /// Send free text
    Send(String),
    /// Send a directional shortcut
    Drive(Direction),
    /// Cancel scan/connect or drop the session
    Disconnect,
    /// Report state and traffic counters
    Status,
}

/// Notification for the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// User-visible status line
    StatusChanged(String),
    /// Addressed payload from the peripheral, prefix stripped
    TelemetryReceived(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_commands() {
        assert_eq!(Direction::Stop.command(), "S");
        assert_eq!(Direction::Forward.command(), "F");
        assert_eq!(Direction::Backward.command(), "B");
        assert_eq!(Direction::Left.command(), "L");
        assert_eq!(Direction::Right.command(), "R");
        assert_eq!(Direction::Forward.message().as_str(), "F");
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("forward".parse(), Ok(Direction::Forward));
        assert_eq!("b".parse(), Ok(Direction::Backward));
        assert_eq!("sideways".parse::<Direction>(), Err(()));
    }
}
