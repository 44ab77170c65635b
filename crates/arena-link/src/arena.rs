use std::time::{Duration, Instant};

use arena_proto::DeviceMode;
use tracing::info;

use crate::clock::{earliest, ClockHandle};
use crate::error::Error;
use crate::event::Event;
use crate::params::ParamConfig;
use crate::poller::Poller;
use crate::session::{Session, DEFAULT_DURATION};
use crate::transport::{Link, Outcome, Transport, TransportConfig};
use crate::Reply;

#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub transport: TransportConfig,
    pub duration: Duration,
    pub params: ParamConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            duration: DEFAULT_DURATION,
            params: ParamConfig::default(),
        }
    }
}

pub struct Arena<L> {
    transport: Transport<L, Reply>,
    poller: Poller,
    session: Session,
    params: ParamConfig,
    connected: bool,
    events: Vec<Event>,
}

impl<L: Link> Arena<L> {
    pub fn new(link: L, clock: ClockHandle, cfg: ArenaConfig) -> Self {
        Self {
            transport: Transport::new(link, clock.clone(), &cfg.transport),
            poller: Poller::new(),
            session: Session::new(clock, cfg.duration),
            params: cfg.params,
            connected: false,
            events: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn transport(&self) -> &Transport<L, Reply> {
        &self.transport
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn link_mut(&mut self) -> &mut L {
        self.transport.link_mut()
    }

    pub fn params(&self) -> &ParamConfig {
        &self.params
    }

    /// Replaces the parameter set; the next upload step uses it.
    pub fn set_params(&mut self, params: ParamConfig) {
        self.params = params;
    }

    /// Call once the physical link is open.
    pub fn connect(&mut self) {
        if self.connected {
            return;
        }
        info!("arena: link up");
        self.connected = true;
        self.events.push(Event::Connected);
        self.transport.enable();
        self.poller.enable(&mut self.transport);
        self.session.enable();
        self.absorb_session();
    }

    /// Tears everything down. `reason` is set when the link went away on
    /// its own rather than at the operator's request.
    pub fn disconnect(&mut self, reason: Option<String>) {
        if !self.connected {
            return;
        }
        info!("arena: link down");
        self.connected = false;
        self.transport.disable();
        self.poller.disable();
        self.session.disable();
        self.absorb_session();
        self.transport.clear();
        self.poller.clear();
        self.absorb_poller();
        self.events.push(Event::Disconnected);
        if let Some(reason) = reason {
            self.events.push(Event::Notice(reason));
        }
    }

    pub fn start_upload(&mut self) -> bool {
        if !self.connected {
            self.events.push(Event::Notice("not connected".into()));
            return false;
        }
        self.poller.start_upload();
        self.absorb_poller();
        true
    }

    pub fn set_mode(&mut self, id: u8, mode: DeviceMode) -> bool {
        self.poller.set_mode(id, mode, &mut self.transport)
    }

    pub fn reset(&mut self) -> bool {
        self.session.reset(&mut self.transport)
    }

    pub fn start(&mut self) -> bool {
        self.session.start(&mut self.transport)
    }

    pub fn stop(&mut self) -> bool {
        self.session.stop(&mut self.transport)
    }

    pub fn pause(&mut self) -> bool {
        self.session.pause(&mut self.transport)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest(self.transport.next_deadline(), self.session.next_deadline())
    }

    pub fn on_timer(&mut self) {
        if let Some(outcome) = self.transport.on_timer() {
            self.dispatch(outcome);
        }
        self.session.on_timer(&mut self.transport);
        self.absorb_session();
    }

    pub fn on_written(&mut self, n: usize) {
        self.transport.on_written(n);
    }

    pub fn on_received(&mut self, data: &[u8]) {
        if let Some(outcome) = self.transport.on_received(data) {
            self.dispatch(outcome);
        }
    }

    /// Events in the order they happened.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    fn absorb_poller(&mut self) {
        self.events.append(&mut self.poller.take_events());
    }

    fn absorb_session(&mut self) {
        self.events.append(&mut self.session.take_events());
    }

    fn dispatch(&mut self, outcome: Outcome<Reply>) {
        match outcome {
            Outcome::Replied { reply, line } => match reply {
                Reply::Info(addr) => {
                    self.poller.on_info(addr, &line, &mut self.transport, &self.params);
                }
                Reply::SetMode(id) => self.poller.on_set_mode(id, &line),
                Reply::Session(req) => self.session.on_ack(req, &line),
            },
            Outcome::TimedOut { reply, .. } => match reply {
                Reply::Info(addr) => {
                    self.poller.on_info_timeout(addr, &mut self.transport, &self.params);
                }
                Reply::SetMode(_) => self.events.push(Event::Failed(Error::NoResponse {
                    action: "switching device mode",
                })),
                Reply::Session(req) => self.session.on_timeout(req),
            },
        }
        self.absorb_poller();
        self.absorb_session();
    }
}
