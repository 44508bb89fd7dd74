use serde::{Deserialize, Serialize};

pub const DEFAULT_INDEX_KEY: &str = "referral_keys";
pub const DEFAULT_RECORD_PREFIX: &str = "referral_";

/// How the store applies read-modify-write updates (index appends and
/// record transitions).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Compare-and-swap loop when the ledger offers one, read-modify-write
    /// otherwise.
    #[default]
    Atomic,
    /// Plain read-modify-write. Concurrent creates can drop ids and
    /// concurrent transitions can overwrite each other.
    ReadModifyWrite,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub index_key: String,
    pub record_prefix: String,
    pub write_mode: WriteMode,
    pub cas_attempts: u32,
    pub id_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_key: DEFAULT_INDEX_KEY.to_string(),
            record_prefix: DEFAULT_RECORD_PREFIX.to_string(),
            write_mode: WriteMode::Atomic,
            cas_attempts: 8,
            id_attempts: 4,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config is not valid json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("`{0}` must not be empty")]
    Empty(&'static str),
    #[error("`{0}` must be at least 1")]
    Zero(&'static str),
}

impl StoreConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_key.is_empty() {
            return Err(ConfigError::Empty("index_key"));
        }
        if self.record_prefix.is_empty() {
            return Err(ConfigError::Empty("record_prefix"));
        }
        if self.cas_attempts == 0 {
            return Err(ConfigError::Zero("cas_attempts"));
        }
        if self.id_attempts == 0 {
            return Err(ConfigError::Zero("id_attempts"));
        }
        Ok(())
    }

    pub fn record_key(&self, id: &str) -> String {
        format!("{}{}", self.record_prefix, id)
    }
}
