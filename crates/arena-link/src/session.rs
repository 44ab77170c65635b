use std::time::{Duration, Instant};

use arena_proto::{Ack, Command, DeviceState};
use time::macros::format_description;
use tracing::{debug, info, warn};

use crate::clock::{ClockHandle, Timer};
use crate::error::Error;
use crate::event::Event;
use crate::transport::CommandSink;
use crate::Reply;

pub const TICK_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_DURATION: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disabled,
    Idle,
    Ready,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRequest {
    Reset,
    Start,
    Stop,
    Pause,
    Resume,
}

impl SessionRequest {
    fn action(self) -> &'static str {
        match self {
            SessionRequest::Reset => "reset",
            SessionRequest::Start => "starting the session",
            SessionRequest::Stop => "stopping the session",
            SessionRequest::Pause => "pausing the session",
            SessionRequest::Resume => "resuming the session",
        }
    }

    /// States from which the request may be issued, and in which its
    /// acknowledgment is still applied.
    fn allowed_from(self, state: SessionState) -> bool {
        match self {
            SessionRequest::Reset => state == SessionState::Idle,
            SessionRequest::Start => state == SessionState::Ready,
            SessionRequest::Stop => matches!(state, SessionState::Running | SessionState::Paused),
            SessionRequest::Pause => state == SessionState::Running,
            SessionRequest::Resume => state == SessionState::Paused,
        }
    }

    fn command(self) -> Command {
        match self {
            SessionRequest::Reset => Command::Reset4Combat,
            SessionRequest::Start => Command::SetState4Combat(DeviceState::Operational),
            SessionRequest::Stop => Command::SetState4Combat(DeviceState::Destroyed),
            SessionRequest::Pause => Command::SetState4Combat(DeviceState::Paused),
            SessionRequest::Resume => Command::SetState4Combat(DeviceState::Previous),
        }
    }
}

pub struct Session {
    clock: ClockHandle,
    state: SessionState,
    duration: Duration,
    base: Duration,
    started: Option<Instant>,
    tick: Timer,
    /// Set while an automatic stop waits for its acknowledgment.
    auto_stop_pending: bool,
    events: Vec<Event>,
}

impl Session {
    pub fn new(clock: ClockHandle, duration: Duration) -> Self {
        Self {
            clock,
            state: SessionState::Disabled,
            duration,
            base: Duration::ZERO,
            started: None,
            tick: Timer::periodic(TICK_INTERVAL),
            auto_stop_pending: false,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn elapsed(&self) -> Duration {
        let running = self
            .started
            .map(|s| self.clock.now().saturating_duration_since(s))
            .unwrap_or_default();
        self.base + running
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.tick.deadline()
    }

    pub fn enable(&mut self) {
        if self.state != SessionState::Disabled {
            return;
        }
        self.stop_timing(true);
        self.state = SessionState::Idle;
        self.events.push(Event::SessionEnabled);
    }

    pub fn disable(&mut self) {
        self.stop_timing(true);
        self.auto_stop_pending = false;
        self.state = SessionState::Disabled;
        self.events.push(Event::SessionDisabled);
    }

    pub fn reset(&mut self, tx: &mut impl CommandSink<Reply>) -> bool {
        self.request(SessionRequest::Reset, tx)
    }

    pub fn start(&mut self, tx: &mut impl CommandSink<Reply>) -> bool {
        self.request(SessionRequest::Start, tx)
    }

    pub fn stop(&mut self, tx: &mut impl CommandSink<Reply>) -> bool {
        self.request(SessionRequest::Stop, tx)
    }

    /// Pauses a running session, or resumes a paused one.
    pub fn pause(&mut self, tx: &mut impl CommandSink<Reply>) -> bool {
        match self.state {
            SessionState::Paused => self.request(SessionRequest::Resume, tx),
            _ => self.request(SessionRequest::Pause, tx),
        }
    }

    fn request(&mut self, req: SessionRequest, tx: &mut impl CommandSink<Reply>) -> bool {
        if !req.allowed_from(self.state) {
            debug!("session: {:?} ignored in {:?}", req, self.state);
            return false;
        }
        tx.send(req.command(), Some(Reply::Session(req)));
        true
    }

    pub fn on_ack(&mut self, req: SessionRequest, line: &str) {
        if req == SessionRequest::Stop {
            self.auto_stop_pending = false;
        }
        if !req.allowed_from(self.state) {
            debug!("session: stale {:?} ack in {:?}", req, self.state);
            return;
        }
        if !Ack::is_ok(line) {
            warn!("session: {:?} rejected: {}", req, line);
            self.events.push(Event::Failed(Error::Rejected {
                action: req.action(),
                response: line.to_string(),
            }));
            return;
        }

        let (state, event) = match req {
            SessionRequest::Reset => {
                self.stop_timing(true);
                (SessionState::Ready, Event::SessionReset)
            }
            SessionRequest::Start => {
                self.start_timing(true);
                (SessionState::Running, Event::SessionStarted)
            }
            SessionRequest::Stop => {
                self.stop_timing(false);
                (SessionState::Idle, Event::SessionStopped)
            }
            SessionRequest::Pause => {
                self.stop_timing(false);
                (SessionState::Paused, Event::SessionPaused)
            }
            SessionRequest::Resume => {
                self.start_timing(false);
                (SessionState::Running, Event::SessionResumed)
            }
        };
        info!("session: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.events.push(event);
    }

    pub fn on_timeout(&mut self, req: SessionRequest) {
        if req == SessionRequest::Stop {
            self.auto_stop_pending = false;
        }
        self.events.push(Event::Failed(Error::NoResponse { action: req.action() }));
    }

    /// Periodic tick: republishes the clock and ends the session once the
    /// configured duration has elapsed.
    pub fn on_timer(&mut self, tx: &mut impl CommandSink<Reply>) {
        if !self.tick.fire(self.clock.now()) {
            return;
        }
        let elapsed = self.publish_clock();
        if self.state == SessionState::Running && elapsed >= self.duration && !self.auto_stop_pending {
            info!("session: duration reached");
            self.auto_stop_pending = self.stop(tx);
        }
    }

    fn publish_clock(&mut self) -> Duration {
        let elapsed = Duration::from_secs(self.elapsed().as_secs());
        self.events.push(Event::Clock(elapsed));
        elapsed
    }

    fn start_timing(&mut self, reset: bool) {
        if reset {
            self.base = Duration::ZERO;
        }
        self.publish_clock();
        let now = self.clock.now();
        self.started = Some(now);
        self.tick.start(now);
    }

    fn stop_timing(&mut self, reset: bool) {
        self.tick.stop();
        let now = self.clock.now();
        if reset {
            self.base = Duration::ZERO;
        } else if let Some(s) = self.started {
            self.base += now.saturating_duration_since(s);
        }
        self.started = None;
        self.publish_clock();
    }
}

/// `HH:MM:SS`, wrapping at 24 hours.
pub fn format_clock(elapsed: Duration) -> String {
    let secs = elapsed.as_secs() % 86_400;
    let t = time::Time::MIDNIGHT + time::Duration::seconds(secs as i64);
    t.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60))
}
