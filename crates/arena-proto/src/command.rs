use std::fmt;

use crate::device::{DeviceMode, DeviceState};
use crate::param::Parameter;

/// A request line understood by the field devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    GetInfo { addr: u8 },
    SetMode { addr: u8, mode: DeviceMode },
    SetParameter { addr: u8, param: Parameter, value: i64 },
    Reset4Combat,
    SetState4Combat(DeviceState),
}

impl Command {
    /// Wire form, CRLF terminated.
    pub fn to_line(&self) -> String {
        format!("{self}\r\n")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Ping => f.write_str("Ping"),
            Command::GetInfo { addr } => write!(f, "GetInfo {addr}"),
            Command::SetMode { addr, mode } => write!(f, "SetMode {addr}, {}", mode.code()),
            Command::SetParameter { addr, param, value } => {
                write!(f, "SetParameter {addr}, {}, {value}", param.id())
            }
            Command::Reset4Combat => f.write_str("Reset4Combat"),
            Command::SetState4Combat(state) => write!(f, "SetState4Combat {}", state.code()),
        }
    }
}

/// Acknowledgment line: `Ack <code>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack(pub u32);

impl Ack {
    pub const OK: Ack = Ack(0);
    /// Reply to `GetInfo` when nothing answers at that address.
    pub const ABSENT: Ack = Ack(2);

    pub fn parse(line: &str) -> Option<Ack> {
        let mut parts = line.split_whitespace();
        if parts.next()? != "Ack" {
            return None;
        }
        let code = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Ack(code))
    }

    pub fn is_ok(line: &str) -> bool {
        Ack::parse(line) == Some(Ack::OK)
    }

    pub fn is_absent(line: &str) -> bool {
        Ack::parse(line) == Some(Ack::ABSENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_wire_lines() {
        assert_eq!(Command::Ping.to_line(), "Ping\r\n");
        assert_eq!(Command::GetInfo { addr: 31 }.to_line(), "GetInfo 31\r\n");
        assert_eq!(
            Command::SetMode { addr: 3, mode: DeviceMode::Combat }.to_line(),
            "SetMode 3, 1\r\n"
        );
        assert_eq!(
            Command::SetParameter { addr: 9, param: Parameter::ReloadTime, value: 40 }.to_line(),
            "SetParameter 9, 6, 40\r\n"
        );
        assert_eq!(Command::Reset4Combat.to_line(), "Reset4Combat\r\n");
        assert_eq!(
            Command::SetState4Combat(DeviceState::Destroyed).to_line(),
            "SetState4Combat 5\r\n"
        );
    }

    #[test]
    fn classifies_acks() {
        assert!(Ack::is_ok("Ack 0"));
        assert!(!Ack::is_ok("Ack 1"));
        assert!(Ack::is_absent("Ack 2"));
        assert_eq!(Ack::parse("Ack"), None);
        assert_eq!(Ack::parse("Ack 0 0"), None);
        assert_eq!(Ack::parse("0 0 0 0 0 0"), None);
    }
}
