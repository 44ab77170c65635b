pub mod arena;
pub mod clock;
pub mod doctor;
pub mod error;
pub mod event;
pub mod params;
pub mod poller;
pub mod ports;
pub mod serial;
pub mod session;
pub mod transport;

use std::time::Duration;

use serde::Deserialize;

pub use arena::{Arena, ArenaConfig};
pub use error::Error;
pub use event::Event;
pub use session::{SessionRequest, SessionState};

/// Completion token carried by every command that expects an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Info(u8),
    SetMode(u8),
    Session(SessionRequest),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkConfig {
    /// Serial device path. When absent the first discovered port is used.
    pub port: Option<String>,
    pub baud: Option<u32>,

    /// Minimum gap between commands. Default 10 ms.
    pub command_delay_ms: Option<u64>,

    /// Abandon a command that gets no answer within this many ms.
    /// Absent or 0: wait forever, a silent device stalls the queue.
    pub response_timeout_ms: Option<u64>,
}

impl LinkConfig {
    pub fn baud(&self) -> u32 {
        self.baud.unwrap_or(serial::DEFAULT_BAUD)
    }

    pub fn transport(&self) -> transport::TransportConfig {
        let defaults = transport::TransportConfig::default();
        transport::TransportConfig {
            command_delay: self
                .command_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.command_delay),
            response_timeout: self
                .response_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Combat length in seconds. Default 600.
    pub duration_s: Option<u64>,
}

impl SessionConfig {
    pub fn duration(&self) -> Duration {
        self.duration_s
            .map(Duration::from_secs)
            .unwrap_or(session::DEFAULT_DURATION)
    }
}
