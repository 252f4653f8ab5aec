use std::io::Read;
use std::path::{Path, PathBuf};
use tally_core::{ConversionArgs, ConversionPolicy, Currency, RateError, RateSource};
use thiserror::Error;

use crate::dataset::{CellValue, Dataset};
use crate::profile::{BankProfile, CurrencyConversion, MultiColumnConverter};

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    CsvError(#[from] csv::Error),
    #[error(transparent)]
    Rate(#[from] RateError),
    #[error("Invalid path: {}", .0.display())]
    InvalidPath(PathBuf),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Invalid {expected} '{value}' in column '{column}', row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
        expected: String,
    },
}

/// CSV files directly inside `folder`, sorted. With `full_paths` the entries are
/// joined onto `folder`, otherwise only file names are returned.
pub fn list_csv_files(folder: &Path, full_paths: bool) -> Result<Vec<PathBuf>, CsvError> {
    if folder.as_os_str().is_empty() || !folder.is_dir() {
        return Err(CsvError::InvalidPath(folder.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !is_csv || !path.is_file() {
            continue;
        }
        files.push(if full_paths { path } else { PathBuf::from(entry.file_name()) });
    }
    files.sort();
    Ok(files)
}

/// Applies one bank profile to statement files.
pub struct CsvImporter<'a> {
    profile: &'a BankProfile,
    rates: &'a dyn RateSource,
    policy: &'a ConversionPolicy,
}

impl<'a> CsvImporter<'a> {
    pub fn new(profile: &'a BankProfile, rates: &'a dyn RateSource, policy: &'a ConversionPolicy) -> Self {
        Self { profile, rates, policy }
    }

    pub fn import_file(&self, path: &Path) -> Result<Dataset, CsvError> {
        if path.as_os_str().is_empty() || !path.is_file() {
            return Err(CsvError::InvalidPath(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        let dataset = self.import_reader(file)?;
        tracing::debug!(
            file = %path.display(),
            rows = dataset.len(),
            columns = dataset.columns().len(),
            "statement transformed"
        );
        Ok(dataset)
    }

    /// Parse, derive multi-column values, then drop the profile's columns.
    pub fn import_reader<R: Read>(&self, data: R) -> Result<Dataset, CsvError> {
        let mut dataset = self.parse(data)?;
        for converter in self.profile.multi_column_converters() {
            self.apply_multi_column(&mut dataset, converter)?;
        }
        dataset.drop_columns(self.profile.drop_columns());
        Ok(dataset)
    }

    fn parse<R: Read>(&self, data: R) -> Result<Dataset, CsvError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.profile.delimiter())
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(data);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut dataset = Dataset::new(columns.clone());

        for (i, result) in reader.records().enumerate() {
            let record = result?;
            let mut row = Vec::with_capacity(columns.len());
            for (column, raw) in columns.iter().zip(record.iter()) {
                row.push(self.parse_cell(column, raw, i + 1)?);
            }
            dataset.push_row(row);
        }
        Ok(dataset)
    }

    fn parse_cell(&self, column: &str, raw: &str, row: usize) -> Result<CellValue, CsvError> {
        if let Some(converter) = self.profile.converters().get(column) {
            return Ok(converter.apply(raw).unwrap_or(CellValue::Null));
        }
        if raw.trim().is_empty() {
            return Ok(CellValue::Null);
        }
        match self.profile.column_types().get(column) {
            Some(column_type) => column_type.parse(raw).ok_or_else(|| CsvError::InvalidValue {
                column: column.to_string(),
                row,
                value: raw.to_string(),
                expected: column_type.to_string(),
            }),
            None => Ok(CellValue::Text(raw.to_string())),
        }
    }

    fn apply_multi_column(&self, dataset: &mut Dataset, converter: &MultiColumnConverter) -> Result<(), CsvError> {
        let values = match converter {
            MultiColumnConverter::CurrencyConversion(conversion) => self.convert_currency(dataset, conversion)?,
        };
        dataset.set_column(converter.target(), values);
        Ok(())
    }

    fn convert_currency(&self, dataset: &Dataset, conversion: &CurrencyConversion) -> Result<Vec<CellValue>, CsvError> {
        let index = |name: &str| {
            dataset
                .column_index(name)
                .ok_or_else(|| CsvError::MissingColumn(name.to_string()))
        };
        let value_idx = index(&conversion.value_column)?;
        let currency_idx = index(&conversion.currency_column)?;
        let date_idx = index(&conversion.date_column)?;

        let mut out = Vec::with_capacity(dataset.len());
        for (i, row) in dataset.rows().iter().enumerate() {
            let (Some(value), Some(date), Some(code)) = (
                row[value_idx].as_amount(),
                row[date_idx].as_date(),
                row[currency_idx].as_text(),
            ) else {
                out.push(CellValue::Null);
                continue;
            };
            let current_currency: Currency = code.parse().map_err(|_| CsvError::InvalidValue {
                column: conversion.currency_column.clone(),
                row: i + 1,
                value: code.to_string(),
                expected: "currency code".to_string(),
            })?;
            let args = ConversionArgs {
                value,
                current_currency,
                date,
                target_currency: conversion.target_currency.clone(),
            };
            out.push(CellValue::Amount(self.policy.convert(self.rates, &args)?));
        }
        Ok(out)
    }
}

pub fn load_and_transform(
    path: &Path,
    profile: &BankProfile,
    rates: &dyn RateSource,
    policy: &ConversionPolicy,
) -> Result<Dataset, CsvError> {
    CsvImporter::new(profile, rates, policy).import_file(path)
}
