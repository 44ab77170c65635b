use std::collections::BTreeMap;

use arena_proto::device::{parse_info, InfoError};
use arena_proto::{Ack, Command, Device, DeviceMode, FIRST_ADDRESS, LAST_ADDRESS};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::event::Event;
use crate::params::ParamConfig;
use crate::transport::CommandSink;
use crate::Reply;

#[derive(Debug, Clone, Copy)]
struct UploadPass {
    /// First address visited by this pass; reaching it again ends the pass.
    anchor: Option<u8>,
}

#[derive(Debug)]
pub struct Poller {
    enabled: bool,
    cursor: u8,
    devices: BTreeMap<u8, Device>,
    upload: Option<UploadPass>,
    events: Vec<Event>,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

impl Poller {
    pub fn new() -> Self {
        Self {
            enabled: false,
            cursor: FIRST_ADDRESS,
            devices: BTreeMap::new(),
            upload: None,
            events: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cursor(&self) -> u8 {
        self.cursor
    }

    pub fn is_uploading(&self) -> bool {
        self.upload.is_some()
    }

    pub fn device(&self, id: u8) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn enable(&mut self, tx: &mut impl CommandSink<Reply>) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        self.query(tx);
    }

    /// Stops issuing polls. The one in flight still completes.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Forgets every device and rewinds the cursor. An unfinished upload
    /// pass is dropped, not resumed.
    pub fn clear(&mut self) {
        self.devices.clear();
        self.cursor = FIRST_ADDRESS;
        if self.upload.take().is_some() {
            info!("upload: pass aborted");
            self.events.push(Event::UploadAborted);
        }
    }

    pub fn start_upload(&mut self) {
        if self.upload.is_some() {
            debug!("upload: pass already running");
            return;
        }
        info!("upload: pass armed");
        self.upload = Some(UploadPass { anchor: None });
        self.events.push(Event::UploadStarted);
    }

    /// Returns false when the poller is disabled and nothing was sent.
    pub fn set_mode(&mut self, id: u8, mode: DeviceMode, tx: &mut impl CommandSink<Reply>) -> bool {
        if !self.enabled {
            return false;
        }
        tx.send(Command::SetMode { addr: id, mode }, Some(Reply::SetMode(id)));
        true
    }

    pub fn on_set_mode(&mut self, id: u8, line: &str) {
        if !Ack::is_ok(line) {
            warn!("device {}: SetMode rejected: {}", id, line);
            self.events.push(Event::Failed(Error::Rejected {
                action: "switching device mode",
                response: line.to_string(),
            }));
        }
    }

    /// Completion of `GetInfo <addr>`.
    pub fn on_info(
        &mut self,
        addr: u8,
        line: &str,
        tx: &mut impl CommandSink<Reply>,
        params: &ParamConfig,
    ) {
        if Ack::is_absent(line) {
            if let Some(device) = self.devices.get_mut(&addr) {
                device.missing_in_action = true;
                self.events.push(Event::DeviceUpdated(device.clone()));
            }
        } else {
            match parse_info(addr, line) {
                Ok(device) => {
                    self.devices.insert(addr, device.clone());
                    self.events.push(Event::DeviceUpdated(device));
                }
                Err(InfoError::Malformed) => debug!("device {}: ignoring {:?}", addr, line),
                Err(e) => debug!("device {}: dropping telemetry: {}", addr, e),
            }
        }
        self.advance(addr, tx, params);
    }

    /// The query for `addr` went unanswered; move on without touching records.
    pub fn on_info_timeout(&mut self, addr: u8, tx: &mut impl CommandSink<Reply>, params: &ParamConfig) {
        debug!("device {}: no answer", addr);
        self.advance(addr, tx, params);
    }

    fn advance(&mut self, addr: u8, tx: &mut impl CommandSink<Reply>, params: &ParamConfig) {
        self.upload_step(addr, tx, params);

        self.cursor = if addr >= LAST_ADDRESS { FIRST_ADDRESS } else { addr + 1 };
        if self.enabled {
            self.query(tx);
        }
    }

    fn upload_step(&mut self, addr: u8, tx: &mut impl CommandSink<Reply>, params: &ParamConfig) {
        let Some(pass) = self.upload.as_mut() else {
            return;
        };
        if pass.anchor == Some(addr) {
            self.upload = None;
            info!("upload: pass finished");
            self.events.push(Event::UploadFinished);
            return;
        }
        pass.anchor.get_or_insert(addr);

        let Some(device) = self.devices.get(&addr).filter(|d| !d.missing_in_action) else {
            return;
        };
        for (param, value) in params.resolve(device.kind, device.id) {
            tx.send(Command::SetParameter { addr, param, value }, None);
        }
    }

    fn query(&mut self, tx: &mut impl CommandSink<Reply>) {
        let addr = self.cursor;
        tx.send(Command::GetInfo { addr }, Some(Reply::Info(addr)));
    }
}
