use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Largest amount a single charge or use may move.
    #[serde(default = "default_max_amount")]
    pub max_amount: i64,
    /// Bounded wait for a user's lock before the operation is abandoned.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_amount: default_max_amount(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

fn default_max_amount() -> i64 {
    1000
}

fn default_lock_timeout_ms() -> u64 {
    3000
}

impl LedgerConfig {
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: LedgerConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_amount, 1000);
        assert_eq!(config.lock_timeout_ms, 3000);

        let config: LedgerConfig = toml::from_str("max_amount = 500\n").unwrap();
        assert_eq!(config.max_amount, 500);
        assert_eq!(config.lock_timeout_ms, 3000);
    }
}
