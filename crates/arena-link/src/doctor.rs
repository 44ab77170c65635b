use anyhow::Result;

use crate::params::ParamConfig;
use crate::{LinkConfig, SessionConfig};

pub fn check_link(link: &LinkConfig) -> Result<()> {
    anyhow::ensure!(link.baud() > 0, "link.baud must be > 0");
    if let Some(port) = &link.port {
        anyhow::ensure!(!port.is_empty(), "link.port is empty");
    }
    anyhow::ensure!(
        link.command_delay_ms.unwrap_or(10) <= 1000,
        "link.command_delay_ms should be <= 1000"
    );
    Ok(())
}

pub fn check_session(session: &SessionConfig) -> Result<()> {
    anyhow::ensure!(!session.duration().is_zero(), "session.duration_s must be > 0");
    Ok(())
}

/// Returns the keys that will be ignored at upload time.
pub fn check_params(params: &ParamConfig) -> Result<Vec<String>> {
    params.check()?;
    Ok(params.unknown_keys())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass() {
        assert!(check_link(&LinkConfig::default()).is_ok());
        assert!(check_session(&SessionConfig::default()).is_ok());
        assert_eq!(check_params(&ParamConfig::default()).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn zero_duration_fails() {
        let s = SessionConfig { duration_s: Some(0) };
        assert!(check_session(&s).is_err());
    }

    #[test]
    fn zero_timeout_means_stall() {
        let link = LinkConfig { response_timeout_ms: Some(0), ..LinkConfig::default() };
        assert_eq!(link.transport().response_timeout, None);
        assert_eq!(link.baud(), 115_200);
    }
}
