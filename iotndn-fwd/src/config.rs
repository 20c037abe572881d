use std::{fs, path::Path};

use iotndn_core::DEFAULT_INTEREST_LIFETIME;
use serde::{Deserialize, Serialize};

use crate::face_set::FACE_SET_WIDTH;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Table sizes and timing defaults, fixed for the lifetime of a forwarder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    pub name_tree_capacity: usize,
    pub face_table_capacity: usize,
    pub fib_capacity: usize,
    pub pit_capacity: usize,
    pub task_queue_capacity: usize,
    /// Applied to Interests that carry no InterestLifetime
    pub default_interest_lifetime_ms: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            name_tree_capacity: 64,
            face_table_capacity: 10,
            fib_capacity: 20,
            pit_capacity: 32,
            task_queue_capacity: 32,
            default_interest_lifetime_ms: DEFAULT_INTEREST_LIFETIME.as_millis() as u64,
        }
    }
}

impl ForwarderConfig {
    /// Load from a TOML file; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ForwarderConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacities = [
            ("name_tree_capacity", self.name_tree_capacity),
            ("face_table_capacity", self.face_table_capacity),
            ("fib_capacity", self.fib_capacity),
            ("pit_capacity", self.pit_capacity),
            ("task_queue_capacity", self.task_queue_capacity),
        ];
        if let Some((field, _)) = capacities.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{} cannot be zero", field)));
        }

        if self.face_table_capacity > FACE_SET_WIDTH {
            return Err(ConfigError::Invalid(format!(
                "face_table_capacity {} exceeds the face set width {}",
                self.face_table_capacity, FACE_SET_WIDTH
            )));
        }

        if self.name_tree_capacity < self.fib_capacity.max(self.pit_capacity) {
            return Err(ConfigError::Invalid(
                "name_tree_capacity must be at least as large as the FIB and the PIT".to_string(),
            ));
        }

        if self.default_interest_lifetime_ms == 0 {
            return Err(ConfigError::Invalid(
                "default_interest_lifetime_ms cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}
