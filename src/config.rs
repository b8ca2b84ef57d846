use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BioGuardError, BioGuardResult};
use crate::types::Contact;

/// Runtime configuration for the agent and its sampling loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Frames kept in the perception history. Default: 10.
    pub buffer_capacity: usize,

    /// Countdown ticks between alert detection and dispatch. Default: 3.
    pub countdown_ticks: u32,

    /// Length of one countdown tick. Default: 1000ms.
    pub countdown_interval_ms: u64,

    /// Ticks an escalation stays fired before returning to idle on its own.
    /// 0 keeps it fired until acknowledged or reset. Default: 10.
    pub cooldown_ticks: u32,

    /// Perception sampling cadence. Default: 3000ms.
    pub sample_interval_ms: u64,

    /// Caregiver to reach on dispatch.
    pub contact: Option<Contact>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10,
            countdown_ticks: 3,
            countdown_interval_ms: 1000,
            cooldown_ticks: 10,
            sample_interval_ms: 3000,
            contact: None,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> BioGuardResult<()> {
        if self.buffer_capacity == 0 {
            return Err(BioGuardError::Config(
                "buffer_capacity must be >= 1".to_string(),
            ));
        }
        if self.countdown_ticks == 0 {
            return Err(BioGuardError::Config(
                "countdown_ticks must be >= 1".to_string(),
            ));
        }
        if self.countdown_interval_ms == 0 {
            return Err(BioGuardError::Config(
                "countdown_interval_ms must be > 0".to_string(),
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err(BioGuardError::Config(
                "sample_interval_ms must be > 0".to_string(),
            ));
        }
        if let Some(contact) = &self.contact {
            if contact.number.trim().is_empty() {
                return Err(BioGuardError::Config(format!(
                    "contact {:?} has an empty number",
                    contact.name
                )));
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> BioGuardResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BioGuardError::Config(format!("JSON parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> BioGuardResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BioGuardError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn countdown_interval(&self) -> Duration {
        Duration::from_millis(self.countdown_interval_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AgentConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_capacity, 10);
        assert_eq!(config.countdown_ticks, 3);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = AgentConfig::from_json(
            r#"{"countdown_ticks":5,"contact":{"name":"Li Wei","number":"+8613800000000"}}"#,
        )
        .unwrap();

        assert_eq!(config.countdown_ticks, 5);
        assert_eq!(config.buffer_capacity, 10);
        assert_eq!(config.contact.unwrap().name, "Li Wei");
    }

    #[test]
    fn zero_values_are_rejected() {
        for json in [
            r#"{"buffer_capacity":0}"#,
            r#"{"countdown_ticks":0}"#,
            r#"{"countdown_interval_ms":0}"#,
            r#"{"sample_interval_ms":0}"#,
        ] {
            assert!(
                matches!(AgentConfig::from_json(json), Err(BioGuardError::Config(_))),
                "{json} should fail validation"
            );
        }
    }

    #[test]
    fn blank_contact_number_is_rejected() {
        let json = r#"{"contact":{"name":"Li Wei","number":"  "}}"#;

        assert!(AgentConfig::from_json(json).is_err());
    }
}
