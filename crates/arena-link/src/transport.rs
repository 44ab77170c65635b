use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::Result;
use arena_proto::Command;
use bytes::BytesMut;
use tracing::{debug, warn};

use crate::clock::{earliest, ClockHandle, Timer};

/// Byte-level access to the physical link.
pub trait Link {
    fn is_open(&self) -> bool;

    /// Queues `data` for transmission. Completion is reported later through
    /// [`Transport::on_written`].
    fn write(&mut self, data: &[u8]) -> Result<()>;
}

/// Something that accepts commands for transmission.
pub trait CommandSink<R> {
    fn send(&mut self, command: Command, reply: Option<R>);
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Minimum gap between two commands.
    pub command_delay: Duration,
    /// `None` keeps a silent device stalling the queue indefinitely.
    pub response_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { command_delay: Duration::from_millis(10), response_timeout: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disabled,
    Idle,
    Work,
}

/// What happened to the head-of-queue command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
    Replied { reply: R, line: String },
    TimedOut { reply: R, command: Command },
}

#[derive(Debug)]
struct Queued<R> {
    command: Command,
    reply: Option<R>,
}

/// FIFO of commands with one in flight. Without a response timeout a silent
/// device stalls the queue until `clear`.
pub struct Transport<L, R> {
    link: L,
    clock: ClockHandle,
    queue: VecDeque<Queued<R>>,
    pace: Timer,
    watchdog: Option<Timer>,
    rx: BytesMut,
    unsent: usize,
    state: TransportState,
    write_complete: bool,
    read_complete: bool,
}

impl<L: Link, R: Clone> Transport<L, R> {
    pub fn new(link: L, clock: ClockHandle, cfg: &TransportConfig) -> Self {
        Self {
            link,
            clock,
            queue: VecDeque::new(),
            pace: Timer::one_shot(cfg.command_delay),
            watchdog: cfg.response_timeout.map(Timer::one_shot),
            rx: BytesMut::with_capacity(256),
            unsent: 0,
            state: TransportState::Disabled,
            write_complete: false,
            read_complete: false,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn unsent(&self) -> usize {
        self.unsent
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Leaves `Disabled`, queues a liveness probe and starts transmitting.
    pub fn enable(&mut self) {
        if self.state != TransportState::Disabled {
            return;
        }
        self.state = TransportState::Idle;
        self.send(Command::Ping, None);
        if !self.queue.is_empty() {
            self.process();
        }
    }

    /// Stops pending timers and forces `Disabled`. The queue is kept.
    pub fn disable(&mut self) {
        self.pace.stop();
        self.stop_watchdog();
        self.state = TransportState::Disabled;
    }

    pub fn clear(&mut self) {
        self.pace.stop();
        self.stop_watchdog();
        self.queue.clear();
        self.unsent = 0;
    }

    pub fn send(&mut self, command: Command, reply: Option<R>) {
        self.queue.push_back(Queued { command, reply });
        if self.state == TransportState::Idle {
            self.pace.start(self.clock.now());
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest(self.pace.deadline(), self.watchdog.as_ref().and_then(Timer::deadline))
    }

    pub fn on_timer(&mut self) -> Option<Outcome<R>> {
        let now = self.clock.now();
        if self.watchdog.as_mut().is_some_and(|w| w.fire(now)) {
            return self.abandon();
        }
        if self.pace.fire(now) {
            self.process();
        }
        None
    }

    /// Write-completion notification for `n` bytes.
    pub fn on_written(&mut self, n: usize) {
        if self.state != TransportState::Work {
            return;
        }
        self.unsent = self.unsent.saturating_sub(n);
        if self.unsent == 0 {
            self.write_complete = true;
            if self.read_complete {
                self.finalize();
            }
        }
    }

    /// Feeds received bytes. Returns the head command's completion once a
    /// non-empty line arrives for it.
    pub fn on_received(&mut self, data: &[u8]) -> Option<Outcome<R>> {
        self.rx.extend_from_slice(data);
        if self.state != TransportState::Work || self.read_complete {
            return None;
        }

        while let Some(line) = self.take_line() {
            if line.is_empty() {
                continue;
            }
            debug!("rx: {}", line);
            let reply = self.queue.front().and_then(|q| q.reply.clone());
            self.read_complete = true;
            if self.write_complete {
                self.finalize();
            }
            return reply.map(|reply| Outcome::Replied { reply, line });
        }
        None
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.rx.iter().position(|b| *b == b'\n')?;
        let raw = self.rx.split_to(pos + 1);
        Some(String::from_utf8_lossy(&raw).trim().to_string())
    }

    fn process(&mut self) {
        if self.state != TransportState::Idle {
            return;
        }
        self.pace.stop();

        if !self.link.is_open() {
            warn!("transport: link closed, disabling");
            self.state = TransportState::Disabled;
            return;
        }
        let Some(head) = self.queue.front() else {
            return;
        };

        let line = head.command.to_line();
        debug!("tx: {}", head.command);

        self.rx.clear();
        self.unsent = line.len();
        self.state = TransportState::Work;
        self.read_complete = false;
        self.write_complete = false;

        if let Err(e) = self.link.write(line.as_bytes()) {
            warn!("transport: write failed: {:#}", e);
            self.state = TransportState::Disabled;
            return;
        }
        let now = self.clock.now();
        if let Some(w) = self.watchdog.as_mut() {
            w.start(now);
        }
    }

    fn finalize(&mut self) {
        if self.state != TransportState::Work {
            return;
        }
        self.stop_watchdog();
        self.queue.pop_front();
        self.state = TransportState::Idle;
        if !self.queue.is_empty() {
            self.pace.start(self.clock.now());
        }
    }

    fn abandon(&mut self) -> Option<Outcome<R>> {
        if self.state != TransportState::Work {
            return None;
        }
        let head = self.queue.front()?;
        warn!("transport: no response to {:?}, dropping it", head.command.to_string());
        let outcome = head
            .reply
            .clone()
            .map(|reply| Outcome::TimedOut { reply, command: head.command.clone() });
        self.rx.clear();
        self.unsent = 0;
        self.write_complete = true;
        self.read_complete = true;
        self.finalize();
        outcome
    }

    fn stop_watchdog(&mut self) {
        if let Some(w) = self.watchdog.as_mut() {
            w.stop();
        }
    }
}

impl<L: Link, R: Clone> CommandSink<R> for Transport<L, R> {
    fn send(&mut self, command: Command, reply: Option<R>) {
        Transport::send(self, command, reply);
    }
}

/// In-memory link used by tests.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct MockLink {
    pub open: bool,
    pub written: Vec<String>,
}

#[cfg(test)]
impl MockLink {
    pub fn new() -> Self {
        Self { open: true, written: Vec::new() }
    }
}

#[cfg(test)]
impl Link for MockLink {
    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.written.push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }
}
