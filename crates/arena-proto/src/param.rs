use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Configurable device parameter. The set is fixed by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Parameter {
    DefaultHitCnt,
    CurrentHitCnt,
    Group,
    IRPower,
    IRDamage,
    ReloadTime,
    RepairTime,
}

impl Parameter {
    pub const ALL: [Parameter; 7] = [
        Parameter::DefaultHitCnt,
        Parameter::CurrentHitCnt,
        Parameter::Group,
        Parameter::IRPower,
        Parameter::IRDamage,
        Parameter::ReloadTime,
        Parameter::RepairTime,
    ];

    pub fn id(self) -> u8 {
        match self {
            Parameter::DefaultHitCnt => 1,
            Parameter::CurrentHitCnt => 2,
            Parameter::Group => 3,
            Parameter::IRPower => 4,
            Parameter::IRDamage => 5,
            Parameter::ReloadTime => 6,
            Parameter::RepairTime => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Parameter::DefaultHitCnt => "DefaultHitCnt",
            Parameter::CurrentHitCnt => "CurrentHitCnt",
            Parameter::Group => "Group",
            Parameter::IRPower => "IRPower",
            Parameter::IRDamage => "IRDamage",
            Parameter::ReloadTime => "ReloadTime",
            Parameter::RepairTime => "RepairTime",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parameter::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| format!("unknown parameter: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_map_to_fixed_ids() {
        let ids: Vec<u8> = Parameter::ALL.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!("IRDamage".parse::<Parameter>(), Ok(Parameter::IRDamage));
        assert!("irdamage".parse::<Parameter>().is_err());
        assert!("Volume".parse::<Parameter>().is_err());
    }
}
