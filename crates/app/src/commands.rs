use anyhow::Context;
use clap::ValueEnum;
use std::io::Write;
use tally_core::{EcbRates, RateSource};
use tally_import::{discover_new_files, CsvImporter, Dataset, HashLedger, ProfileRegistry};
use tracing::{info, warn};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub failed: usize,
}

pub fn load_registry(config: &Config) -> anyhow::Result<ProfileRegistry> {
    match &config.profiles_file {
        Some(path) => ProfileRegistry::from_path(path, &config.currency)
            .with_context(|| format!("loading bank profiles from {}", path.display())),
        None => Ok(ProfileRegistry::builtin(&config.currency)),
    }
}

pub fn load_rates(config: &Config) -> anyhow::Result<EcbRates> {
    match &config.rates_file {
        Some(path) => {
            let rates = EcbRates::from_path(path)
                .with_context(|| format!("loading ECB rates from {}", path.display()))?;
            info!(file = %path.display(), currencies = rates.currencies().count(), "ECB rates loaded");
            Ok(rates)
        }
        None => {
            warn!("ECB_RATES_FILE not set, only rows already in the target currency can be converted");
            Ok(EcbRates::default())
        }
    }
}

/// Discover new statements, transform each one and record the digests of the
/// files that went through. A failing file is logged and left out of the
/// ledger so the next run picks it up again.
pub fn import(
    config: &Config,
    institution: &str,
    rates: &dyn RateSource,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<ImportSummary> {
    let registry = load_registry(config)?;
    let profile = registry.get_profile(institution).with_context(|| {
        format!("known institutions: {}", registry.names().collect::<Vec<_>>().join(", "))
    })?;

    let ledger = HashLedger::load_if_exists(&config.hash_file)
        .with_context(|| format!("reading hash ledger {}", config.hash_file.display()))?;
    let files = discover_new_files(&config.csv_folder, config.hash_algorithm, ledger.as_ref())?;
    let mut ledger = ledger.unwrap_or_default();

    let importer = CsvImporter::new(profile, rates, &config.policy);
    let mut summary = ImportSummary::default();
    for file in files {
        info!(file = %file.path.display(), hash = %file.hash, "importing statement");
        match importer.import_file(&file.path) {
            Ok(dataset) => {
                for converter in profile.multi_column_converters() {
                    let column = converter.target();
                    info!(
                        file = %file.path.display(),
                        column,
                        total = %dataset.total(column).map(|m| m.to_string()).unwrap_or_else(|| "n/a".to_string()),
                        empty = dataset.null_count(column),
                        "converted column"
                    );
                }
                write_dataset(out, &file.path.display().to_string(), &dataset, format)?;
                ledger.insert(file.hash);
                summary.imported += 1;
            }
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "statement import failed");
                summary.failed += 1;
            }
        }
    }

    if summary.imported > 0 {
        ledger
            .save(&config.hash_file)
            .with_context(|| format!("writing hash ledger {}", config.hash_file.display()))?;
    }
    info!(imported = summary.imported, failed = summary.failed, "import finished");
    Ok(summary)
}

pub fn discover(config: &Config, out: &mut dyn Write) -> anyhow::Result<usize> {
    let ledger = HashLedger::load_if_exists(&config.hash_file)?;
    let files = discover_new_files(&config.csv_folder, config.hash_algorithm, ledger.as_ref())?;
    for file in &files {
        writeln!(out, "{}  {}", file.hash, file.path.display())?;
    }
    Ok(files.len())
}

pub fn forget(config: &Config) -> anyhow::Result<()> {
    HashLedger::delete(&config.hash_file)
        .with_context(|| format!("deleting hash ledger {}", config.hash_file.display()))?;
    info!(ledger = %config.hash_file.display(), "hash ledger deleted");
    Ok(())
}

fn write_dataset(out: &mut dyn Write, title: &str, dataset: &Dataset, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Markdown => {
            writeln!(out, "## {title}\n")?;
            writeln!(out, "{}", dataset.to_markdown())?;
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, dataset)?;
            writeln!(out)?;
        }
    }
    Ok(())
}
