use std::time::Duration;

use arena_proto::Device;

use crate::error::Error;

/// Outcome events published towards the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected,
    Disconnected,
    DeviceUpdated(Device),
    UploadStarted,
    UploadFinished,
    /// Pass dropped by a link teardown before it wrapped around.
    UploadAborted,
    SessionEnabled,
    SessionDisabled,
    SessionReset,
    SessionStarted,
    SessionStopped,
    SessionPaused,
    SessionResumed,
    /// Elapsed playtime.
    Clock(Duration),
    Notice(String),
    Failed(Error),
}
