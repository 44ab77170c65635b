//! Drives a full `Arena` against a simulated device field.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use arena_link::clock::ManualClock;
use arena_link::params::ParamConfig;
use arena_link::transport::{Link, TransportConfig, TransportState};
use arena_link::{Arena, ArenaConfig, Event, SessionState};
use arena_proto::{DeviceMode, DeviceType};

const STEP: Duration = Duration::from_millis(10);

#[derive(Default)]
struct FieldLink {
    closed: bool,
    written: Vec<String>,
}

impl Link for FieldLink {
    fn is_open(&self) -> bool {
        !self.closed
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.written.push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }
}

/// Devices answering on the bus, keyed by address.
#[derive(Default)]
struct Field {
    telemetry: BTreeMap<u8, String>,
    silent: BTreeSet<u8>,
    reject_session: bool,
    log: Vec<String>,
}

impl Field {
    fn answer(&mut self, line: &str) -> Option<String> {
        let line = line.trim_end();
        self.log.push(line.to_string());
        let (cmd, args) = line.split_once(' ').unwrap_or((line, ""));
        match cmd {
            "GetInfo" => {
                let addr: u8 = args.parse().unwrap();
                if self.silent.contains(&addr) {
                    return None;
                }
                Some(self.telemetry.get(&addr).cloned().unwrap_or_else(|| "Ack 2".into()))
            }
            "Reset4Combat" | "SetState4Combat" if self.reject_session => Some("Ack 1".into()),
            _ => Some("Ack 0".into()),
        }
    }

    fn sent(&self, prefix: &str) -> Vec<&str> {
        self.log.iter().filter(|l| l.starts_with(prefix)).map(String::as_str).collect()
    }
}

struct Rig {
    clock: Arc<ManualClock>,
    arena: Arena<FieldLink>,
    field: Field,
    events: Vec<Event>,
}

impl Rig {
    fn new(cfg: ArenaConfig) -> Self {
        let clock = Arc::new(ManualClock::new());
        let arena = Arena::new(FieldLink::default(), clock.clone(), cfg);
        Self { clock, arena, field: Field::default(), events: Vec::new() }
    }

    /// Runs the link for `d`, answering every transmitted line at once.
    fn run_for(&mut self, d: Duration) {
        let steps = d.as_millis() / STEP.as_millis();
        for _ in 0..steps {
            let pending = std::mem::take(&mut self.arena.link_mut().written);
            assert!(pending.len() <= 1, "more than one command in flight: {pending:?}");
            for line in pending {
                self.arena.on_written(line.len());
                if let Some(answer) = self.field.answer(&line) {
                    self.arena.on_received(format!("{answer}\r\n").as_bytes());
                }
            }
            self.clock.advance(STEP);
            self.arena.on_timer();
            self.events.extend(self.arena.take_events());
        }
    }
}

fn telemetry(kind: DeviceType) -> String {
    format!("{} 1 0 2 100 0", kind.code())
}

#[test]
fn connect_polls_every_address_in_order() {
    let mut rig = Rig::new(ArenaConfig::default());
    rig.field.telemetry.insert(2, telemetry(DeviceType::Tank));
    rig.field.telemetry.insert(30, telemetry(DeviceType::Turret));

    rig.arena.connect();
    rig.run_for(Duration::from_secs(2));

    assert_eq!(rig.field.log[0], "Ping");
    let polls = rig.field.sent("GetInfo");
    assert!(polls.len() > 31);
    for (i, line) in polls.iter().take(40).enumerate() {
        assert_eq!(*line, format!("GetInfo {}", i % 31 + 1));
    }

    let ids: Vec<u8> = rig.arena.poller().devices().map(|d| d.id).collect();
    assert_eq!(ids, vec![2, 30]);
    assert!(rig.events.contains(&Event::Connected));
    assert!(rig.events.contains(&Event::SessionEnabled));
}

#[test]
fn upload_reaches_only_present_devices_once() {
    let mut params = ParamConfig::default();
    params.default.insert("IRDamage".into(), 20);
    params.default.insert("Unknown".into(), 1);
    params.by_type.insert("target".into(), BTreeMap::from([("RepairTime".to_string(), 8)]));
    let mut rig = Rig::new(ArenaConfig { params, ..ArenaConfig::default() });
    rig.field.telemetry.insert(3, telemetry(DeviceType::Tank));
    rig.field.telemetry.insert(9, telemetry(DeviceType::Target));
    rig.field.telemetry.insert(12, telemetry(DeviceType::Tank));

    rig.arena.connect();
    rig.run_for(Duration::from_secs(1));
    // Device 12 goes quiet after discovery.
    rig.field.telemetry.remove(&12);
    rig.run_for(Duration::from_secs(1));
    assert!(rig.arena.poller().device(12).unwrap().missing_in_action);

    assert!(rig.arena.start_upload());
    rig.run_for(Duration::from_secs(3));

    let mut pushed = rig.field.sent("SetParameter");
    pushed.sort_unstable();
    assert_eq!(
        pushed,
        vec!["SetParameter 3, 5, 20", "SetParameter 9, 5, 20", "SetParameter 9, 7, 8"]
    );
    assert!(!rig.arena.poller().is_uploading());
    assert!(rig.events.contains(&Event::UploadFinished));
}

#[test]
fn edited_params_apply_to_the_next_upload() {
    let mut params = ParamConfig::default();
    params.default.insert("IRDamage".into(), 20);
    let mut rig = Rig::new(ArenaConfig { params: params.clone(), ..ArenaConfig::default() });
    rig.field.telemetry.insert(3, telemetry(DeviceType::Tank));

    rig.arena.connect();
    rig.run_for(Duration::from_secs(1));
    assert!(rig.arena.start_upload());
    rig.run_for(Duration::from_secs(2));
    assert_eq!(rig.field.sent("SetParameter"), vec!["SetParameter 3, 5, 20"]);

    params.default.insert("IRDamage".into(), 30);
    params.by_device.insert("3".into(), BTreeMap::from([("Group".to_string(), 6)]));
    rig.arena.set_params(params);
    rig.field.log.clear();
    assert!(rig.arena.start_upload());
    rig.run_for(Duration::from_secs(2));

    let mut pushed = rig.field.sent("SetParameter");
    pushed.sort_unstable();
    assert_eq!(pushed, vec!["SetParameter 3, 3, 6", "SetParameter 3, 5, 30"]);
    assert_eq!(rig.events.iter().filter(|e| **e == Event::UploadFinished).count(), 2);
}

#[test]
fn teardown_events_come_out_in_order() {
    let mut rig = Rig::new(ArenaConfig::default());
    rig.field.telemetry.insert(2, telemetry(DeviceType::Turret));
    rig.arena.connect();
    rig.run_for(Duration::from_millis(200));
    assert!(rig.arena.start_upload());
    rig.run_for(Duration::from_millis(100));
    assert!(rig.arena.poller().is_uploading());

    rig.arena.disconnect(Some("link lost".into()));
    assert_eq!(
        rig.arena.take_events(),
        vec![
            Event::Clock(Duration::ZERO),
            Event::SessionDisabled,
            Event::UploadAborted,
            Event::Disconnected,
            Event::Notice("link lost".into()),
        ]
    );
}

#[test]
fn session_runs_to_its_duration() {
    let mut rig = Rig::new(ArenaConfig { duration: Duration::from_secs(2), ..ArenaConfig::default() });
    rig.arena.connect();
    rig.run_for(Duration::from_millis(100));

    assert!(!rig.arena.start());
    assert!(rig.arena.reset());
    rig.run_for(Duration::from_millis(500));
    assert_eq!(rig.arena.session().state(), SessionState::Ready);

    assert!(rig.arena.start());
    rig.run_for(Duration::from_millis(500));
    assert_eq!(rig.arena.session().state(), SessionState::Running);

    rig.run_for(Duration::from_secs(3));
    assert_eq!(rig.arena.session().state(), SessionState::Idle);
    assert_eq!(rig.field.sent("SetState4Combat 5").len(), 1);
    assert!(rig.events.contains(&Event::SessionStopped));
    assert!(rig.arena.session().elapsed() >= Duration::from_secs(2));
}

#[test]
fn rejected_session_command_leaves_state() {
    let mut rig = Rig::new(ArenaConfig::default());
    rig.field.reject_session = true;
    rig.arena.connect();
    rig.arena.reset();
    rig.run_for(Duration::from_secs(1));
    assert_eq!(rig.arena.session().state(), SessionState::Idle);
    assert!(rig.events.iter().any(|e| matches!(e, Event::Failed(_))));
}

#[test]
fn mode_switch_goes_through_the_queue() {
    let mut rig = Rig::new(ArenaConfig::default());
    assert!(!rig.arena.set_mode(4, DeviceMode::Combat));
    rig.arena.connect();
    assert!(rig.arena.set_mode(4, DeviceMode::Combat));
    rig.run_for(Duration::from_millis(200));
    assert_eq!(rig.field.sent("SetMode"), vec!["SetMode 4, 1"]);
}

#[test]
fn disconnect_tears_down_and_reconnect_starts_over() {
    let mut rig = Rig::new(ArenaConfig::default());
    rig.field.telemetry.insert(1, telemetry(DeviceType::Target));
    rig.arena.connect();
    rig.run_for(Duration::from_millis(500));
    assert_eq!(rig.arena.poller().devices().count(), 1);

    rig.arena.disconnect(Some("link lost".into()));
    assert_eq!(rig.arena.poller().devices().count(), 0);
    assert_eq!(rig.arena.session().state(), SessionState::Disabled);
    assert_eq!(rig.arena.transport().state(), TransportState::Disabled);

    // Whatever was on the wire at teardown is lost with the port.
    rig.arena.link_mut().written.clear();
    rig.field.log.clear();
    rig.run_for(Duration::from_millis(500));
    assert!(rig.field.log.is_empty());
    assert!(rig.events.contains(&Event::Notice("link lost".into())));

    rig.arena.connect();
    rig.run_for(Duration::from_millis(100));
    assert_eq!(rig.field.log[0], "Ping");
    assert_eq!(rig.field.log[1], "GetInfo 1");
}

#[test]
fn silent_device_stalls_the_queue() {
    let mut rig = Rig::new(ArenaConfig::default());
    rig.field.silent.insert(4);
    rig.arena.connect();
    rig.run_for(Duration::from_secs(2));
    assert_eq!(rig.field.sent("GetInfo").last(), Some(&"GetInfo 4"));
    assert_eq!(rig.field.sent("GetInfo").len(), 4);
}

#[test]
fn response_timeout_skips_a_silent_device() {
    let transport = TransportConfig {
        response_timeout: Some(Duration::from_millis(100)),
        ..TransportConfig::default()
    };
    let mut rig = Rig::new(ArenaConfig { transport, ..ArenaConfig::default() });
    rig.field.silent.insert(4);
    rig.field.telemetry.insert(5, telemetry(DeviceType::Tank));
    rig.arena.connect();
    rig.run_for(Duration::from_secs(2));
    assert!(rig.field.sent("GetInfo").contains(&"GetInfo 5"));
    assert!(rig.arena.poller().device(5).is_some());
    assert!(rig.arena.poller().device(4).is_none());
}

#[test]
fn link_lost_mid_run_disables_transport() {
    let mut rig = Rig::new(ArenaConfig::default());
    rig.arena.connect();
    rig.run_for(Duration::from_millis(100));
    rig.arena.link_mut().closed = true;
    rig.field.log.clear();
    rig.run_for(Duration::from_millis(200));
    // Only the command already in flight reaches the field.
    assert!(rig.field.log.len() <= 1);
    assert_eq!(rig.arena.transport().state(), TransportState::Disabled);
}
