use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tally_core::{ConversionPolicy, Currency};
use tally_import::HashAlgorithm;
use tracing::warn;

const DEFAULT_INSTITUTION: &str = "commerzbank";

/// Raw environment, keys matched case-insensitively (`CSVs_FOLDER` → `csvs_folder`).
#[derive(Deserialize)]
struct EnvironmentVariables {
    db_currency: String,
    hash_algorithm: String,
    hash_file: String,
    csvs_folder: String,
    bank_institution: Option<String>,
    bank_profiles_file: Option<String>,
    ecb_rates_file: Option<String>,
    conversion_reference_hour: Option<u32>,
    conversion_amount_offset: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub currency: Currency,
    pub hash_algorithm: HashAlgorithm,
    pub hash_file: PathBuf,
    pub csv_folder: PathBuf,
    pub institution: String,
    pub profiles_file: Option<PathBuf>,
    pub rates_file: Option<PathBuf>,
    pub policy: ConversionPolicy,
}

impl Config {
    pub fn new() -> Result<Self, anyhow::Error> {
        let _ = dotenv::dotenv().map_err(|err| warn!("error loading .env: {:?}", err));
        let cwd = std::env::current_dir().context("cannot determine working directory")?;
        Self::from_vars(std::env::vars(), &cwd)
    }

    /// Relative paths are resolved against `base`.
    pub fn from_vars<I>(vars: I, base: &Path) -> Result<Self, anyhow::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let envs = envy::from_iter::<_, EnvironmentVariables>(vars).context("invalid environment variables")?;

        let currency = Currency::from_str(&envs.db_currency).context("DB_CURRENCY")?;
        let hash_algorithm = HashAlgorithm::resolve(&envs.hash_algorithm).context("HASH_ALGORITHM")?;

        let offset = match envs.conversion_amount_offset.as_deref() {
            Some(raw) => Decimal::from_str(raw.trim())
                .with_context(|| format!("CONVERSION_AMOUNT_OFFSET is not a number: '{raw}'"))?,
            None => Decimal::ZERO,
        };
        let default_policy = ConversionPolicy::default();
        let policy = ConversionPolicy::new(
            envs.conversion_reference_hour.unwrap_or(default_policy.reference_hour()),
            offset,
        )
        .context("CONVERSION_REFERENCE_HOUR")?;
        if !policy.amount_offset().is_zero() {
            warn!(offset = %policy.amount_offset(), "amounts are offset before currency conversion");
        }

        Ok(Config {
            currency,
            hash_algorithm,
            hash_file: base.join(envs.hash_file),
            csv_folder: base.join(envs.csvs_folder),
            institution: envs
                .bank_institution
                .unwrap_or_else(|| DEFAULT_INSTITUTION.to_string()),
            profiles_file: envs.bank_profiles_file.map(|p| base.join(p)),
            rates_file: envs.ecb_rates_file.map(|p| base.join(p)),
            policy,
        })
    }
}
