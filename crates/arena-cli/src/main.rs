mod console;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use arena_link::clock::SystemClock;
use arena_link::params::ParamConfig;
use arena_link::ports::{candidate_ports, resolve_port};
use arena_link::serial::{LinkEvent, SerialLink, SerialPort};
use arena_link::{doctor, Arena, ArenaConfig, Event, LinkConfig, SessionConfig, SessionState};

use console::Action;

#[derive(Debug, Parser)]
#[command(name = "arena", version, about = "Robothlon arena control station")]
struct Cli {
    #[arg(long, default_value = "arena.toml")]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect to the device bus and take commands from stdin.
    Run,
    /// Validate the configuration file.
    Doctor,
    /// List serial ports found on this machine.
    Ports,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    link: LinkConfig,
    session: SessionConfig,
    params: ParamConfig,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Run => run(&cli.config, &load_config(&cli.config)?).await?,
        Command::Doctor => check(&load_config(&cli.config)?)?,
        Command::Ports => {
            for p in candidate_ports() {
                println!("{}", p);
            }
        }
    }
    Ok(())
}

fn check(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    doctor::check_link(&cfg.link)?;
    doctor::check_session(&cfg.session)?;
    for key in doctor::check_params(&cfg.params)? {
        warn!("doctor: unknown parameter {:?} will be skipped", key);
    }
    info!("doctor: OK");
    Ok(())
}

struct Station {
    arena: Arena<SerialLink>,
    port: Option<SerialPort>,
    link: LinkConfig,
    config_path: String,
    last_second: Option<u64>,
}

impl Station {
    fn connect(&mut self) {
        if self.port.is_some() {
            println!("already connected");
            return;
        }
        let opened = resolve_port(self.link.port.as_deref())
            .and_then(|dev| SerialPort::open(&dev, self.link.baud()));
        match opened {
            Ok(port) => {
                println!("connected to {}", port.name());
                self.arena.link_mut().attach(&port);
                self.port = Some(port);
                self.arena.connect();
            }
            Err(e) => {
                warn!("link: {:#}", e);
                println!("cannot connect: {:#}", e);
            }
        }
    }

    fn disconnect(&mut self, reason: Option<String>) {
        self.port = None;
        self.arena.link_mut().detach();
        self.arena.disconnect(reason);
    }

    fn on_link_event(&mut self, ev: LinkEvent) {
        match ev {
            LinkEvent::Received(data) => self.arena.on_received(&data),
            LinkEvent::Written(n) => self.arena.on_written(n),
            LinkEvent::Closed(reason) => {
                warn!("link: {}", reason);
                self.disconnect(Some(format!("link lost: {}", reason)));
            }
        }
    }

    /// Returns false when the operator asked to quit.
    fn on_line(&mut self, line: &str) -> bool {
        if line.trim().is_empty() {
            return true;
        }
        let action = match line.parse::<Action>() {
            Ok(a) => a,
            Err(e) => {
                println!("{}", e);
                return true;
            }
        };
        let accepted = match action {
            Action::Connect => {
                self.connect();
                true
            }
            Action::Disconnect => {
                if self.port.is_some() {
                    self.disconnect(None);
                }
                true
            }
            Action::Upload => {
                self.reload_params();
                self.arena.start_upload()
            }
            Action::Reset => self.arena.reset(),
            Action::Start => self.arena.start(),
            Action::Stop => self.arena.stop(),
            Action::Pause => self.arena.pause(),
            Action::Mode { id, mode } => self.arena.set_mode(id, mode),
            Action::Devices => {
                print!("{}", self.device_table());
                true
            }
            Action::Status => {
                self.print_status();
                true
            }
            Action::Help => {
                println!("{}", console::HELP);
                true
            }
            Action::Quit => return false,
        };
        if !accepted {
            println!("not possible right now");
        }
        true
    }

    /// Picks up parameter edits made to the config file since startup.
    fn reload_params(&mut self) {
        match load_config(&self.config_path) {
            Ok(cfg) => self.arena.set_params(cfg.params),
            Err(e) => warn!("upload: keeping previous parameters: {:#}", e),
        }
    }

    fn device_table(&self) -> String {
        let in_play = matches!(
            self.arena.session().state(),
            SessionState::Running | SessionState::Paused
        );
        console::render_devices(self.arena.poller().devices(), in_play)
    }

    fn print_status(&self) {
        let port = self.port.as_ref().map(|p| p.name()).unwrap_or("-");
        let session = self.arena.session();
        println!(
            "link {} | transport {:?}, {} queued | session {:?} {} / {}",
            port,
            self.arena.transport().state(),
            self.arena.transport().queue_len(),
            session.state(),
            arena_link::session::format_clock(session.elapsed()),
            arena_link::session::format_clock(session.duration()),
        );
    }

    fn flush_events(&mut self) {
        for ev in self.arena.take_events() {
            if let Event::Clock(elapsed) = ev {
                let second = elapsed.as_secs();
                if self.last_second != Some(second) {
                    self.last_second = Some(second);
                    println!("{}", console::render_clock(elapsed));
                }
                continue;
            }
            if let Some(line) = console::render_event(&ev) {
                println!("{}", line);
            }
        }
    }
}

async fn next_link_event(port: &mut Option<SerialPort>) -> Option<LinkEvent> {
    match port {
        Some(p) => p.next_event().await,
        None => std::future::pending().await,
    }
}

async fn run(config_path: &str, cfg: &Config) -> Result<()> {
    let arena_cfg = ArenaConfig {
        transport: cfg.link.transport(),
        duration: cfg.session.duration(),
        params: cfg.params.clone(),
    };
    info!(
        "run: session {}s, command delay {:?}",
        arena_cfg.duration.as_secs(),
        arena_cfg.transport.command_delay
    );
    let mut station = Station {
        arena: Arena::new(SerialLink::default(), Arc::new(SystemClock), arena_cfg),
        port: None,
        link: cfg.link.clone(),
        config_path: config_path.to_string(),
        last_second: None,
    };
    station.connect();
    station.flush_events();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let deadline = station.arena.next_deadline();
        let sleep_until = deadline
            .map(tokio::time::Instant::from_std)
            .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            ev = next_link_event(&mut station.port) => match ev {
                Some(ev) => station.on_link_event(ev),
                None => station.disconnect(Some("link lost".into())),
            },
            line = stdin.next_line() => match line.context("read stdin")? {
                Some(line) => {
                    if !station.on_line(&line) {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {
                station.arena.on_timer();
            }
        }
        station.flush_events();
    }

    if station.port.is_some() {
        station.disconnect(None);
        station.flush_events();
    }
    info!("run: exit");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_proto::{DeviceType, Parameter};

    fn station(config_path: &std::path::Path, params: ParamConfig) -> Station {
        let cfg = ArenaConfig { params, ..ArenaConfig::default() };
        Station {
            arena: Arena::new(SerialLink::default(), Arc::new(SystemClock), cfg),
            port: None,
            link: LinkConfig::default(),
            config_path: config_path.display().to_string(),
            last_second: None,
        }
    }

    fn ir_damage(st: &Station) -> Option<i64> {
        st.arena.params().resolve(DeviceType::Tank, 1).get(&Parameter::IRDamage).copied()
    }

    #[test]
    fn upload_rereads_params_from_disk() {
        let path = std::env::temp_dir().join(format!("arena-reload-{}.toml", std::process::id()));
        std::fs::write(&path, "[params.default]\nIRDamage = 20\n").unwrap();
        let mut st = station(&path, load_config(path.to_str().unwrap()).unwrap().params);
        assert_eq!(ir_damage(&st), Some(20));

        std::fs::write(&path, "[params.default]\nIRDamage = 35\n").unwrap();
        st.reload_params();
        assert_eq!(ir_damage(&st), Some(35));

        // A broken edit leaves the last good set in place.
        std::fs::write(&path, "[params.default\nIRDamage = ").unwrap();
        assert!(st.on_line("upload"));
        assert_eq!(ir_damage(&st), Some(35));

        std::fs::remove_file(&path).unwrap();
    }
}
