use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("Ledger file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Ledger is not a JSON array of strings: {0}")]
    Format(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Digests of every statement file imported so far, persisted as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashLedger {
    hashes: BTreeSet<String>,
}

impl HashLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        if path.as_os_str().is_empty() {
            return Err(LedgerError::MissingArgument("path"));
        }
        if !path.is_file() {
            return Err(LedgerError::FileNotFound(path.to_path_buf()));
        }
        let data = std::fs::read(path)?;
        let hashes: Vec<String> = serde_json::from_slice(&data)?;
        Ok(hashes.into_iter().collect())
    }

    /// `Ok(None)` when there is no ledger file yet, i.e. nothing was imported.
    pub fn load_if_exists(path: &Path) -> Result<Option<Self>, LedgerError> {
        match Self::load(path) {
            Ok(ledger) => Ok(Some(ledger)),
            Err(LedgerError::FileNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Overwrites `path` with the sorted digest list.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        if self.hashes.is_empty() {
            return Err(LedgerError::MissingArgument("hashes"));
        }
        if path.as_os_str().is_empty() {
            return Err(LedgerError::MissingArgument("path"));
        }
        let json = serde_json::to_string_pretty(&self.hashes)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn delete(path: &Path) -> Result<(), LedgerError> {
        if path.as_os_str().is_empty() {
            return Err(LedgerError::MissingArgument("path"));
        }
        if !path.is_file() {
            return Err(LedgerError::FileNotFound(path.to_path_buf()));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    /// Membership test. An empty candidate or an empty ledger is a caller
    /// error: "no ledger" must be handled before asking.
    pub fn exists(candidate: &str, hashes: &HashLedger) -> Result<bool, LedgerError> {
        if candidate.is_empty() {
            return Err(LedgerError::MissingArgument("candidate hash"));
        }
        if hashes.is_empty() {
            return Err(LedgerError::MissingArgument("hashes"));
        }
        Ok(hashes.contains(candidate))
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    /// Returns `false` if the digest was already recorded.
    pub fn insert(&mut self, hash: impl Into<String>) -> bool {
        self.hashes.insert(hash.into())
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hashes.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for HashLedger {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            hashes: iter.into_iter().map(Into::into).collect(),
        }
    }
}
