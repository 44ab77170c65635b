use std::path::Path;

use anyhow::Result;
use tracing::warn;

pub fn default_candidate_devs() -> Vec<String> {
    vec![
        "/dev/ttyUSB0".into(),
        "/dev/ttyUSB1".into(),
        "/dev/ttyACM0".into(),
        "/dev/ttyACM1".into(),
        "/dev/serial0".into(),
        "/dev/ttyS0".into(),
    ]
}

/// Serial ports present on this machine, in enumeration order.
pub fn candidate_ports() -> Vec<String> {
    match tokio_serial::available_ports() {
        Ok(ports) if !ports.is_empty() => ports.into_iter().map(|p| p.port_name).collect(),
        Ok(_) => existing_defaults(),
        Err(e) => {
            warn!("ports: enumeration failed: {}", e);
            existing_defaults()
        }
    }
}

fn existing_defaults() -> Vec<String> {
    default_candidate_devs()
        .into_iter()
        .filter(|d| Path::new(d).exists())
        .collect()
}

/// The configured port, or the first one found.
pub fn resolve_port(configured: Option<&str>) -> Result<String> {
    if let Some(dev) = configured.filter(|d| !d.is_empty()) {
        return Ok(dev.to_string());
    }
    match candidate_ports().into_iter().next() {
        Some(dev) => Ok(dev),
        None => anyhow::bail!("no serial port configured and none found"),
    }
}
