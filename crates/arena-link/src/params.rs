use std::collections::BTreeMap;

use anyhow::Result;
use arena_proto::{DeviceType, Parameter, FIRST_ADDRESS, LAST_ADDRESS};
use serde::Deserialize;
use tracing::warn;

pub type ParamValues = BTreeMap<String, i64>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParamConfig {
    #[serde(default)]
    pub default: ParamValues,
    #[serde(default, rename = "type")]
    pub by_type: BTreeMap<String, ParamValues>,
    #[serde(default, rename = "device")]
    pub by_device: BTreeMap<String, ParamValues>,
}

impl ParamConfig {
    /// Effective parameter set for one device.
    pub fn resolve(&self, kind: DeviceType, id: u8) -> BTreeMap<Parameter, i64> {
        let by_type = self
            .by_type
            .iter()
            .find(|(k, _)| k.parse::<DeviceType>().ok() == Some(kind))
            .map(|(_, v)| v);
        let by_device = self
            .by_device
            .iter()
            .find(|(k, _)| k.parse::<u8>().ok() == Some(id))
            .map(|(_, v)| v);

        let mut out = BTreeMap::new();
        for layer in std::iter::once(&self.default).chain(by_type).chain(by_device) {
            for (key, value) in layer {
                match key.parse::<Parameter>() {
                    Ok(p) => {
                        out.insert(p, *value);
                    }
                    Err(_) => warn!("params: skipping unknown key {}", key),
                }
            }
        }
        out
    }

    /// Keys that will never be uploaded, as `section.key`.
    pub fn unknown_keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut scan = |section: String, values: &ParamValues| {
            for key in values.keys() {
                if key.parse::<Parameter>().is_err() {
                    out.push(format!("{section}.{key}"));
                }
            }
        };
        scan("default".into(), &self.default);
        for (k, v) in &self.by_type {
            scan(format!("type.{k}"), v);
        }
        for (k, v) in &self.by_device {
            scan(format!("device.{k}"), v);
        }
        out
    }

    /// Section names must address something that exists.
    pub fn check(&self) -> Result<()> {
        for k in self.by_type.keys() {
            anyhow::ensure!(
                k.parse::<DeviceType>().is_ok(),
                "params.type.{k}: expected tank, target or turret"
            );
        }
        for k in self.by_device.keys() {
            let ok = k
                .parse::<u8>()
                .is_ok_and(|id| (FIRST_ADDRESS..=LAST_ADDRESS).contains(&id));
            anyhow::ensure!(ok, "params.device.{k}: device id must be {FIRST_ADDRESS}..{LAST_ADDRESS}");
        }
        Ok(())
    }
}
