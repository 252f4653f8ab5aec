pub mod csv;
pub mod dataset;
pub mod hasher;
pub mod intake;
pub mod ledger;
pub mod profile;

pub use crate::csv::{list_csv_files, load_and_transform, CsvError, CsvImporter};
pub use dataset::{CellValue, Dataset};
pub use hasher::{hash_file, HashAlgorithm, HashError};
pub use intake::{discover_new_files, filter_new, hash_files, FileRecord, IntakeError};
pub use ledger::{HashLedger, LedgerError};
pub use profile::{
    BankProfile, ColumnType, Converter, CurrencyConversion, Institution, MultiColumnConverter,
    ProfileError, ProfileRegistry,
};
