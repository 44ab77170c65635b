use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Tank,
    Target,
    Turret,
}

impl DeviceType {
    pub const ALL: [DeviceType; 3] = [DeviceType::Tank, DeviceType::Target, DeviceType::Turret];

    pub fn code(self) -> u8 {
        match self {
            DeviceType::Tank => 0,
            DeviceType::Target => 1,
            DeviceType::Turret => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(DeviceType::Tank),
            1 => Some(DeviceType::Target),
            2 => Some(DeviceType::Turret),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceType::Tank => "tank",
            DeviceType::Target => "target",
            DeviceType::Turret => "turret",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown device type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    Training,
    Combat,
}

impl DeviceMode {
    pub fn code(self) -> u8 {
        match self {
            DeviceMode::Training => 0,
            DeviceMode::Combat => 1,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(DeviceMode::Training),
            1 => Some(DeviceMode::Combat),
            _ => None,
        }
    }
}

impl std::str::FromStr for DeviceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "training" | "0" => Ok(DeviceMode::Training),
            "combat" | "1" => Ok(DeviceMode::Combat),
            other => Err(format!("unknown device mode: {other}")),
        }
    }
}

/// Operating state of a device. Doubles as the argument of the
/// session-wide `SetState4Combat` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Unknown,
    Previous,
    Paused,
    Operational,
    Reload,
    Damaged,
    Destroyed,
}

impl DeviceState {
    pub fn code(self) -> i8 {
        match self {
            DeviceState::Unknown => -1,
            DeviceState::Previous => 0,
            DeviceState::Paused => 1,
            DeviceState::Operational => 2,
            DeviceState::Reload => 3,
            DeviceState::Damaged => 4,
            DeviceState::Destroyed => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(DeviceState::Unknown),
            0 => Some(DeviceState::Previous),
            1 => Some(DeviceState::Paused),
            2 => Some(DeviceState::Operational),
            3 => Some(DeviceState::Reload),
            4 => Some(DeviceState::Damaged),
            5 => Some(DeviceState::Destroyed),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceState::Unknown => "unknown",
            DeviceState::Previous => "previous",
            DeviceState::Paused => "paused",
            DeviceState::Operational => "operational",
            DeviceState::Reload => "reload",
            DeviceState::Damaged => "damaged",
            DeviceState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Last known telemetry of one field unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: u8,
    pub kind: DeviceType,
    pub group: u8,
    pub mode: DeviceMode,
    pub state: DeviceState,
    pub health: u8,
    /// Device-local counter in seconds.
    pub time: u64,
    pub missing_in_action: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InfoError {
    #[error("not a telemetry line")]
    Malformed,
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
}

const INFO_FIELDS: usize = 6;

/// Parses a `GetInfo` reply: six unsigned integers separated by whitespace
/// and/or commas, anchored at the start of the line.
///
/// Every field is validated on its own; the record is built only if all of
/// them pass.
pub fn parse_info(id: u8, line: &str) -> Result<Device, InfoError> {
    let raw = split_fields(line).ok_or(InfoError::Malformed)?;

    let kind = raw[0]
        .parse::<u64>()
        .ok()
        .and_then(DeviceType::from_code)
        .ok_or_else(|| out_of_range("type", raw[0]))?;
    let group = raw[1]
        .parse::<u8>()
        .ok()
        .filter(|g| *g <= 7)
        .ok_or_else(|| out_of_range("group", raw[1]))?;
    let mode = raw[2]
        .parse::<u64>()
        .ok()
        .and_then(DeviceMode::from_code)
        .ok_or_else(|| out_of_range("mode", raw[2]))?;
    let state = raw[3]
        .parse::<i64>()
        .ok()
        .and_then(DeviceState::from_code)
        .ok_or_else(|| out_of_range("state", raw[3]))?;
    let health = raw[4]
        .parse::<u8>()
        .map_err(|_| out_of_range("health", raw[4]))?;
    let time = raw[5]
        .parse::<u64>()
        .map_err(|_| out_of_range("time", raw[5]))?;

    Ok(Device {
        id,
        kind,
        group,
        mode,
        state,
        health,
        time,
        missing_in_action: false,
    })
}

/// Renders a device record the way the firmware reports it.
pub fn format_info(device: &Device) -> String {
    format!(
        "{} {} {} {} {} {}",
        device.kind.code(),
        device.group,
        device.mode.code(),
        device.state.code(),
        device.health,
        device.time
    )
}

fn out_of_range(field: &'static str, value: &str) -> InfoError {
    InfoError::OutOfRange { field, value: value.to_string() }
}

fn is_separator(c: char) -> bool {
    c == ',' || c.is_ascii_whitespace()
}

// Anything after the sixth digit run is ignored.
fn split_fields(line: &str) -> Option<[&str; INFO_FIELDS]> {
    let mut fields = [""; INFO_FIELDS];
    let mut rest = line;
    for (i, slot) in fields.iter_mut().enumerate() {
        if i > 0 {
            let trimmed = rest.trim_start_matches(is_separator);
            if trimmed.len() == rest.len() {
                return None;
            }
            rest = trimmed;
        }
        let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        *slot = &rest[..end];
        rest = &rest[end..];
    }
    Some(fields)
}
