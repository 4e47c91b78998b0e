use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::account::{Account, AccountNumber};

pub const FIRST_ACCOUNT_NUMBER: u64 = 1001;
pub const DEFAULT_DATA_FILE: &str = "bank_data.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed bank data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Inconsistent bank data: {0}")]
    Inconsistent(String),
}

/// Everything that survives between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryState {
    #[serde(default = "first_account_number")]
    pub next_account_number: u64,
    pub accounts: BTreeMap<AccountNumber, Account>,
}

impl Default for DirectoryState {
    fn default() -> Self {
        Self {
            next_account_number: FIRST_ACCOUNT_NUMBER,
            accounts: BTreeMap::new(),
        }
    }
}

impl DirectoryState {
    /// Parses a stored document and checks it before the directory relies on it.
    ///
    /// Accounts stored under a foreign key or with a negative balance make the
    /// document unusable. A counter that would hand out an existing number is
    /// moved past the highest stored one.
    pub fn decode(raw: &str) -> Result<Self, StorageError> {
        let mut state: Self = serde_json::from_str(raw)?;
        for (key, acc) in &state.accounts {
            if key != acc.account_number() {
                return Err(StorageError::Inconsistent(format!(
                    "account {} is stored under key {key}",
                    acc.account_number()
                )));
            }
            if acc.balance() < Decimal::ZERO {
                return Err(StorageError::Inconsistent(format!(
                    "account {key} has negative balance {}",
                    acc.balance()
                )));
            }
        }
        let highest = state
            .accounts
            .keys()
            .filter_map(|key| key.parse::<u64>().ok())
            .max();
        if let Some(highest) = highest {
            if state.next_account_number <= highest {
                warn!(
                    next_account_number = state.next_account_number,
                    highest, "Stored account counter is behind, advancing it"
                );
                state.next_account_number = highest + 1;
            }
        }
        Ok(state)
    }
}

fn first_account_number() -> u64 {
    FIRST_ACCOUNT_NUMBER
}

pub trait Storage {
    /// `Ok(None)` means nothing was stored yet.
    fn load(&self) -> Result<Option<DirectoryState>, StorageError>;

    fn save(&self, state: &DirectoryState) -> Result<(), StorageError>;
}

/// Pretty-printed JSON document on disk, overwritten in place on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for JsonFileStorage {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_FILE)
    }
}

impl Storage for JsonFileStorage {
    fn load(&self) -> Result<Option<DirectoryState>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        DirectoryState::decode(&raw).map(Some)
    }

    fn save(&self, state: &DirectoryState) -> Result<(), StorageError> {
        let raw = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// Keeps the serialized document in memory. Goes through the same JSON
/// encoding as [`JsonFileStorage`], so it is a faithful stand-in for tests.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    document: RefCell<Option<String>>,
    fail_saves: bool,
}

impl InMemoryStorage {
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: RefCell::new(Some(document.into())),
            fail_saves: false,
        }
    }

    /// Storage whose every save fails, as a full disk would.
    pub fn failing() -> Self {
        Self {
            document: RefCell::new(None),
            fail_saves: true,
        }
    }

    pub fn document(&self) -> Option<String> {
        self.document.borrow().clone()
    }
}

impl Storage for InMemoryStorage {
    fn load(&self) -> Result<Option<DirectoryState>, StorageError> {
        match self.document.borrow().as_deref() {
            Some(raw) => DirectoryState::decode(raw).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, state: &DirectoryState) -> Result<(), StorageError> {
        if self.fail_saves {
            return Err(io::Error::other("storage is not writable").into());
        }
        *self.document.borrow_mut() = Some(serde_json::to_string_pretty(state)?);
        Ok(())
    }
}
