use std::fmt::Write as _;
use std::str::FromStr;

use arena_link::session::format_clock;
use arena_link::Event;
use arena_proto::{Device, DeviceMode, DeviceState, DeviceType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Connect,
    Disconnect,
    Upload,
    Reset,
    Start,
    Stop,
    Pause,
    Mode { id: u8, mode: DeviceMode },
    Devices,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  connect | disconnect
  upload                    push configured parameters to every device
  reset | start | stop      session control
  pause                     pause, or resume a paused session
  mode <id> <training|combat>
  devices | status | help | quit";

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let Some(word) = parts.next() else {
            return Err("empty command".into());
        };
        let action = match word.to_ascii_lowercase().as_str() {
            "connect" => Action::Connect,
            "disconnect" => Action::Disconnect,
            "upload" => Action::Upload,
            "reset" => Action::Reset,
            "start" => Action::Start,
            "stop" => Action::Stop,
            "pause" => Action::Pause,
            "devices" | "ls" => Action::Devices,
            "status" => Action::Status,
            "help" | "?" => Action::Help,
            "quit" | "exit" => Action::Quit,
            "mode" => {
                let id = parts
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or("usage: mode <id> <training|combat>")?;
                let mode = parts.next().ok_or("usage: mode <id> <training|combat>")?.parse()?;
                Action::Mode { id, mode }
            }
            other => return Err(format!("unknown command: {other} (try help)")),
        };
        if parts.next().is_some() {
            return Err(format!("too many arguments for {word}"));
        }
        Ok(action)
    }
}

/// One status line per event; the clock is only printed on whole seconds
/// changing, which the caller tracks.
pub fn render_event(ev: &Event) -> Option<String> {
    let line = match ev {
        Event::Connected => "link up".to_string(),
        Event::Disconnected => "link down".to_string(),
        Event::DeviceUpdated(_) | Event::Clock(_) => return None,
        Event::UploadStarted => "upload: started".to_string(),
        Event::UploadFinished => "upload: finished".to_string(),
        Event::UploadAborted => "upload: aborted".to_string(),
        Event::SessionEnabled => "session: idle".to_string(),
        Event::SessionDisabled => "session: disabled".to_string(),
        Event::SessionReset => "session: ready".to_string(),
        Event::SessionStarted => "session: running".to_string(),
        Event::SessionStopped => "session: stopped".to_string(),
        Event::SessionPaused => "session: paused".to_string(),
        Event::SessionResumed => "session: resumed".to_string(),
        Event::Notice(text) => text.clone(),
        Event::Failed(e) => format!("error: {e}"),
    };
    Some(line)
}

pub fn render_clock(elapsed: std::time::Duration) -> String {
    format!("clock {}", format_clock(elapsed))
}

fn state_tag(state: DeviceState) -> &'static str {
    match state {
        DeviceState::Operational | DeviceState::Reload => "green",
        DeviceState::Damaged => "yellow",
        DeviceState::Destroyed => "red",
        _ => "",
    }
}

/// Device table grouped by type. `colors` adds the combat status hint
/// shown while a session is in progress.
pub fn render_devices<'a>(devices: impl Iterator<Item = &'a Device>, colors: bool) -> String {
    let devices: Vec<&Device> = devices.collect();
    let mut out = String::new();
    for kind in DeviceType::ALL {
        let rows: Vec<&&Device> = devices.iter().filter(|d| d.kind == kind).collect();
        if rows.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{kind}s:");
        let _ = writeln!(out, "  {:>3} {:>5} {:<12} {:>6} {:<8}", "id", "group", "state", "health", "mode");
        for d in rows {
            let mode = match d.mode {
                DeviceMode::Training => "training",
                DeviceMode::Combat => "combat",
            };
            let state = if d.missing_in_action {
                "MIA".to_string()
            } else {
                d.state.name().to_ascii_uppercase()
            };
            let _ = write!(
                out,
                "  {:>3} {:>5} {:<12} {:>6} {:<8}",
                d.id, d.group, state, d.health, mode
            );
            if colors && !d.missing_in_action {
                let _ = write!(out, " {}", state_tag(d.state));
            }
            out.push('\n');
        }
    }
    if out.is_empty() {
        out.push_str("no devices\n");
    }
    out
}
