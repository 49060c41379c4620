use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: i64,
    pub amount: i64,
}

/// Accounts to seed at boot; rewritten whenever an admin upserts an account.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LedgerStateFile {
    #[serde(default)]
    pub accounts: Vec<AccountRecord>,
}

#[derive(Debug, Error)]
pub enum StateFileError {
    #[error("read state file failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("parse state file failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("write state file failed: {0}")]
    Write(std::io::Error),
}

impl LedgerStateFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StateFileError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StateFileError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(StateFileError::Write)?;
            }
        }

        let payload = serde_json::to_vec_pretty(self)?;
        let tmp_path = path.with_extension("tmp");

        if fs::write(&tmp_path, &payload).is_err() {
            return fs::write(path, &payload).map_err(StateFileError::Write);
        }

        match fs::rename(&tmp_path, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                let written = fs::write(path, &payload).map_err(StateFileError::Write);
                let _ = fs::remove_file(&tmp_path);
                written
            }
        }
    }

    pub fn upsert(&mut self, account: AccountRecord) {
        match self.accounts.iter_mut().find(|row| row.id == account.id) {
            Some(row) => *row = account,
            None => self.accounts.push(account),
        }
    }
}
