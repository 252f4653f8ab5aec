use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::csv::{list_csv_files, CsvError};
use crate::hasher::{hash_file, HashAlgorithm};
use crate::ledger::{HashLedger, LedgerError};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// A discovered statement file and the digest of its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub hash: String,
}

/// Files that cannot be read are logged and left out; they show up again on
/// the next discovery.
pub fn hash_files(paths: Vec<PathBuf>, algorithm: HashAlgorithm) -> Vec<FileRecord> {
    paths
        .into_iter()
        .filter_map(|path| match hash_file(algorithm, &path) {
            Ok(hash) => Some(FileRecord { path, hash }),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "cannot hash statement, skipping");
                None
            }
        })
        .collect()
}

/// Drops files whose digest is already in the ledger, and later copies of a
/// file seen earlier in the same batch.
///
/// `None` means no ledger file exists yet: nothing has been imported, so
/// every file is new.
pub fn filter_new(records: Vec<FileRecord>, ledger: Option<&HashLedger>) -> Result<Vec<FileRecord>, LedgerError> {
    let ledger = match ledger {
        Some(l) if !l.is_empty() => Some(l),
        Some(_) => None,
        None => {
            tracing::warn!("hash ledger not found, treating every statement as new");
            None
        }
    };

    let mut seen = HashSet::new();
    let mut fresh = Vec::with_capacity(records.len());
    for record in records {
        if let Some(ledger) = ledger {
            if HashLedger::exists(&record.hash, ledger)? {
                tracing::info!(file = %record.path.display(), "already imported, skipping");
                continue;
            }
        }
        if !seen.insert(record.hash.clone()) {
            tracing::info!(file = %record.path.display(), "duplicate of another file in this batch, skipping");
            continue;
        }
        fresh.push(record);
    }
    Ok(fresh)
}

/// List, hash and filter the statements in `folder`.
pub fn discover_new_files(
    folder: &Path,
    algorithm: HashAlgorithm,
    ledger: Option<&HashLedger>,
) -> Result<Vec<FileRecord>, IntakeError> {
    let paths = list_csv_files(folder, true)?;
    let records = hash_files(paths, algorithm);
    let total = records.len();
    let fresh = filter_new(records, ledger)?;
    tracing::info!(folder = %folder.display(), found = total, new = fresh.len(), "statement discovery finished");
    Ok(fresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, hash: &str) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            hash: hash.to_string(),
        }
    }

    #[test]
    fn no_ledger_keeps_everything() {
        let records = vec![record("a.csv", "1"), record("b.csv", "2")];
        assert_eq!(filter_new(records.clone(), None).unwrap(), records);
    }

    #[test]
    fn empty_ledger_keeps_everything() {
        let records = vec![record("a.csv", "1")];
        let ledger = HashLedger::new();
        assert_eq!(filter_new(records.clone(), Some(&ledger)).unwrap(), records);
    }

    #[test]
    fn known_hashes_are_filtered() {
        let ledger: HashLedger = ["1"].into_iter().collect();
        let fresh = filter_new(vec![record("a.csv", "1"), record("b.csv", "2")], Some(&ledger)).unwrap();
        assert_eq!(fresh, vec![record("b.csv", "2")]);
    }

    #[test]
    fn identical_files_in_one_batch_are_kept_once() {
        let fresh = filter_new(vec![record("a.csv", "1"), record("copy.csv", "1")], None).unwrap();
        assert_eq!(fresh, vec![record("a.csv", "1")]);
    }

    #[test]
    fn discovery_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.CSV");
        std::fs::write(&a, "Buchungstag;Betrag\n01.01.2023;1,00\n").unwrap();
        std::fs::write(&b, "Buchungstag;Betrag\n02.01.2023;2,00\n").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "ignored").unwrap();
        let ledger_path = dir.path().join("hashes.json");

        // Nothing imported yet.
        let ledger = HashLedger::load_if_exists(&ledger_path).unwrap();
        let first = discover_new_files(dir.path(), HashAlgorithm::Sha256, ledger.as_ref()).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].path, a);
        assert_eq!(first[0].hash, hash_file(HashAlgorithm::Sha256, &a).unwrap());
        assert_eq!(first[1].path, b);

        // Record A as imported and run again.
        let mut ledger = HashLedger::new();
        ledger.insert(first[0].hash.clone());
        ledger.save(&ledger_path).unwrap();

        let ledger = HashLedger::load_if_exists(&ledger_path).unwrap();
        let second = discover_new_files(dir.path(), HashAlgorithm::Sha256, ledger.as_ref()).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].path, b);
    }

    #[test]
    fn unreadable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        std::fs::write(&a, "Buchungstag;Betrag\n").unwrap();
        let vanished = dir.path().join("vanished.csv");

        let records = hash_files(vec![vanished, a.clone()], HashAlgorithm::Md5);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, a);
    }

    #[test]
    fn discovery_invalid_folder() {
        let dir = tempfile::tempdir().unwrap();
        let result = discover_new_files(&dir.path().join("missing"), HashAlgorithm::Sha1, None);
        assert!(matches!(result, Err(IntakeError::Csv(CsvError::InvalidPath(_)))));
    }
}
