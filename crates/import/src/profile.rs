use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tally_core::{Currency, Money};
use thiserror::Error;

use crate::dataset::CellValue;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Bank settings for '{0}' not found")]
    UnknownInstitution(String),
    #[error("Invalid profile '{profile}': {reason}")]
    Invalid { profile: String, reason: String },
    #[error("Failed to parse profiles TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Single-column typing and converters ───────────────────────────────────────

/// Static type of a column without a converter. A value that does not fit
/// the type fails the import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    Decimal,
}

impl ColumnType {
    pub fn parse(self, raw: &str) -> Option<CellValue> {
        match self {
            ColumnType::Text => Some(CellValue::Text(raw.to_string())),
            ColumnType::Integer => raw.trim().parse().ok().map(CellValue::Integer),
            ColumnType::Decimal => Decimal::from_str(raw.trim())
                .ok()
                .map(|d| CellValue::Amount(Money::new(d))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Text => write!(f, "text"),
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Decimal => write!(f, "decimal"),
        }
    }
}

/// Per-cell converter. Unparseable input yields `None`, never an error, so a
/// single bad cell does not abort the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Converter {
    /// `1.234,56` style: `.` groups thousands, `,` is the decimal point.
    DecimalComma,
    /// `chrono` format string, e.g. `%d.%m.%Y`.
    Date(String),
}

impl Converter {
    pub fn apply(&self, raw: &str) -> Option<CellValue> {
        match self {
            Converter::DecimalComma => parse_decimal_comma(raw).map(CellValue::Amount),
            Converter::Date(format) => parse_date(raw, format).map(CellValue::Date),
        }
    }
}

impl FromStr for Converter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "decimal_comma" => Ok(Converter::DecimalComma),
            other => match other.strip_prefix("date:") {
                Some(format) if !format.trim().is_empty() => Ok(Converter::Date(format.trim().to_string())),
                Some(_) => Err("date converter needs a format, e.g. 'date:%d.%m.%Y'".to_string()),
                None => Err(format!("Unknown converter: '{other}'")),
            },
        }
    }
}

impl TryFrom<String> for Converter {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Converter> for String {
    fn from(c: Converter) -> Self {
        match c {
            Converter::DecimalComma => "decimal_comma".to_string(),
            Converter::Date(format) => format!("date:{format}"),
        }
    }
}

pub fn parse_decimal_comma(raw: &str) -> Option<Money> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let normalized = if s.contains(',') {
        s.replace('.', "").replace(',', ".")
    } else {
        s.to_string()
    };
    Decimal::from_str(&normalized).ok().map(Money::new)
}

pub fn parse_date(raw: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), format).ok()
}

// ── Multi-column converters ───────────────────────────────────────────────────

/// Derived value computed from several cells of the same row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiColumnConverter {
    CurrencyConversion(CurrencyConversion),
}

impl MultiColumnConverter {
    pub fn target(&self) -> &str {
        match self {
            MultiColumnConverter::CurrencyConversion(c) => &c.target,
        }
    }
}

/// Writes `target` with the row's amount converted from the row's currency
/// into `target_currency`, using the row's booking date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyConversion {
    pub target: String,
    pub value_column: String,
    pub currency_column: String,
    pub date_column: String,
    pub target_currency: Currency,
}

// ── Bank profile ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankProfile {
    name: String,
    delimiter: u8,
    column_types: BTreeMap<String, ColumnType>,
    converters: BTreeMap<String, Converter>,
    multi_column_converters: Vec<MultiColumnConverter>,
    drop_columns: Vec<String>,
}

impl BankProfile {
    /// Columns handled by a converter lose their static type entry.
    pub fn new(
        name: &str,
        delimiter: u8,
        mut column_types: BTreeMap<String, ColumnType>,
        converters: BTreeMap<String, Converter>,
        multi_column_converters: Vec<MultiColumnConverter>,
        drop_columns: Vec<String>,
    ) -> Self {
        column_types.retain(|column, _| !converters.contains_key(column));
        Self {
            name: name.to_string(),
            delimiter,
            column_types,
            converters,
            multi_column_converters,
            drop_columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn column_types(&self) -> &BTreeMap<String, ColumnType> {
        &self.column_types
    }

    pub fn converters(&self) -> &BTreeMap<String, Converter> {
        &self.converters
    }

    pub fn multi_column_converters(&self) -> &[MultiColumnConverter] {
        &self.multi_column_converters
    }

    pub fn drop_columns(&self) -> &[String] {
        &self.drop_columns
    }
}

/// Institutions with a built-in profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Institution {
    Commerzbank,
}

impl Institution {
    pub const ALL: [Institution; 1] = [Institution::Commerzbank];

    pub fn key(self) -> &'static str {
        match self {
            Institution::Commerzbank => "commerzbank",
        }
    }

    pub fn profile(self, target_currency: &Currency) -> BankProfile {
        match self {
            Institution::Commerzbank => commerzbank(target_currency),
        }
    }
}

impl FromStr for Institution {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Institution::ALL
            .into_iter()
            .find(|i| i.key() == wanted)
            .ok_or_else(|| ProfileError::UnknownInstitution(s.to_string()))
    }
}

fn commerzbank(target_currency: &Currency) -> BankProfile {
    let column_types = [
        "Umsatzart",
        "Buchungstext",
        "Währung",
        "Auftraggeberkonto",
        "Bankleitzahl Auftraggeberkonto",
        "IBAN Auftraggeberkonto",
    ]
    .into_iter()
    .map(|c| (c.to_string(), ColumnType::Text))
    .collect();

    let date = Converter::Date("%d.%m.%Y".to_string());
    let converters = BTreeMap::from([
        ("Buchungstag".to_string(), date.clone()),
        ("Wertstellung".to_string(), date),
        ("Betrag".to_string(), Converter::DecimalComma),
    ]);

    // Interest postings carry no value date, so the booking date drives the rate.
    let conversion = MultiColumnConverter::CurrencyConversion(CurrencyConversion {
        target: "Betrag".to_string(),
        value_column: "Betrag".to_string(),
        currency_column: "Währung".to_string(),
        date_column: "Buchungstag".to_string(),
        target_currency: target_currency.clone(),
    });

    BankProfile::new(
        Institution::Commerzbank.key(),
        b';',
        column_types,
        converters,
        vec![conversion],
        vec!["Währung".to_string()],
    )
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfilesFile {
    #[serde(default)]
    profiles: BTreeMap<String, RawProfile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    #[serde(default = "default_delimiter")]
    delimiter: String,
    #[serde(default)]
    column_types: BTreeMap<String, ColumnType>,
    #[serde(default)]
    converters: BTreeMap<String, Converter>,
    #[serde(default)]
    multi_column_converters: Vec<RawMultiColumnConverter>,
    #[serde(default)]
    drop_columns: Vec<String>,
}

fn default_delimiter() -> String {
    ";".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawMultiColumnConverter {
    CurrencyConversion {
        target: String,
        value: String,
        current_currency: String,
        date: String,
        target_currency: Option<Currency>,
    },
}

/// Bank profiles by case-insensitive institution name, validated when built.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, BankProfile>,
}

impl ProfileRegistry {
    /// The built-in institutions, converting into `target_currency`.
    pub fn builtin(target_currency: &Currency) -> Self {
        let profiles = Institution::ALL
            .into_iter()
            .map(|i| (i.key().to_string(), i.profile(target_currency)))
            .collect();
        Self { profiles }
    }

    /// Built-in profiles plus those declared in `toml_content`; declared
    /// profiles replace built-ins of the same name.
    pub fn from_toml(toml_content: &str, target_currency: &Currency) -> Result<Self, ProfileError> {
        let file: ProfilesFile = toml::from_str(toml_content)?;
        let mut registry = Self::builtin(target_currency);
        for (name, raw) in file.profiles {
            let profile = build_profile(&name, raw, target_currency)?;
            registry.profiles.insert(name.to_lowercase(), profile);
        }
        Ok(registry)
    }

    pub fn from_path(path: &Path, target_currency: &Currency) -> Result<Self, ProfileError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content, target_currency)
    }

    pub fn get_profile(&self, institution: &str) -> Result<&BankProfile, ProfileError> {
        self.profiles
            .get(&institution.trim().to_lowercase())
            .ok_or_else(|| ProfileError::UnknownInstitution(institution.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

fn build_profile(name: &str, raw: RawProfile, target_currency: &Currency) -> Result<BankProfile, ProfileError> {
    let invalid = |reason: String| ProfileError::Invalid {
        profile: name.to_string(),
        reason,
    };

    if name.trim().is_empty() {
        return Err(invalid("empty institution name".to_string()));
    }
    let delimiter = match raw.delimiter.as_bytes() {
        [b] if b.is_ascii() => *b,
        _ => return Err(invalid(format!("delimiter must be one ASCII character, got '{}'", raw.delimiter))),
    };

    let mut multi = Vec::with_capacity(raw.multi_column_converters.len());
    for m in raw.multi_column_converters {
        match m {
            RawMultiColumnConverter::CurrencyConversion {
                target,
                value,
                current_currency,
                date,
                target_currency: explicit,
            } => {
                if [&target, &value, &current_currency, &date].iter().any(|c| c.trim().is_empty()) {
                    return Err(invalid("currency_conversion needs target, value, current_currency and date".to_string()));
                }
                if !yields_amounts(&raw.converters, &raw.column_types, &value) {
                    return Err(invalid(format!(
                        "currency_conversion value column '{value}' needs a decimal_comma converter or decimal type"
                    )));
                }
                if !matches!(raw.converters.get(&date), Some(Converter::Date(_))) {
                    return Err(invalid(format!("currency_conversion date column '{date}' needs a date: converter")));
                }
                multi.push(MultiColumnConverter::CurrencyConversion(CurrencyConversion {
                    target,
                    value_column: value,
                    currency_column: current_currency,
                    date_column: date,
                    target_currency: explicit.unwrap_or_else(|| target_currency.clone()),
                }));
            }
        }
    }

    Ok(BankProfile::new(
        name,
        delimiter,
        raw.column_types,
        raw.converters,
        multi,
        raw.drop_columns,
    ))
}

/// Converters win over types, so a column typed `decimal` but converted as
/// something else does not produce amounts.
fn yields_amounts(
    converters: &BTreeMap<String, Converter>,
    column_types: &BTreeMap<String, ColumnType>,
    column: &str,
) -> bool {
    match converters.get(column) {
        Some(converter) => *converter == Converter::DecimalComma,
        None => column_types.get(column) == Some(&ColumnType::Decimal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> Currency {
        "USD".parse().unwrap()
    }

    // ── converters ────────────────────────────────────────────────────────────

    #[test]
    fn decimal_comma_with_thousands() {
        assert_eq!(parse_decimal_comma("1.234,56"), Some(Money::new(Decimal::new(123456, 2))));
    }

    #[test]
    fn decimal_comma_negative_and_plain() {
        assert_eq!(parse_decimal_comma("-12,50"), Some(Money::new(Decimal::new(-1250, 2))));
        assert_eq!(parse_decimal_comma("42"), Some(Money::new(Decimal::new(42, 0))));
    }

    #[test]
    fn decimal_comma_garbage_is_none() {
        assert_eq!(parse_decimal_comma("abc"), None);
        assert_eq!(parse_decimal_comma(""), None);
        assert_eq!(parse_decimal_comma("1,2,3"), None);
    }

    #[test]
    fn date_fixed_format() {
        assert_eq!(
            parse_date("31.12.2023", "%d.%m.%Y"),
            NaiveDate::from_ymd_opt(2023, 12, 31)
        );
        assert_eq!(parse_date("2023-12-31", "%d.%m.%Y"), None);
    }

    #[test]
    fn converter_apply_yields_cells() {
        let date = Converter::Date("%d.%m.%Y".into());
        assert_eq!(
            date.apply("01.02.2024"),
            NaiveDate::from_ymd_opt(2024, 2, 1).map(CellValue::Date)
        );
        assert_eq!(date.apply("not a date"), None);
        assert_eq!(
            Converter::DecimalComma.apply("0,99"),
            Some(CellValue::Amount(Money::new(Decimal::new(99, 2))))
        );
    }

    #[test]
    fn converter_names_round_trip() {
        for c in [Converter::DecimalComma, Converter::Date("%Y%m%d".into())] {
            let name: String = c.clone().into();
            assert_eq!(name.parse::<Converter>().unwrap(), c);
        }
        assert!("date:".parse::<Converter>().is_err());
        assert!("uppercase".parse::<Converter>().is_err());
    }

    #[test]
    fn column_type_parse() {
        assert_eq!(ColumnType::Integer.parse(" 42 "), Some(CellValue::Integer(42)));
        assert_eq!(ColumnType::Integer.parse("4.2"), None);
        assert_eq!(ColumnType::Text.parse("0042"), Some(CellValue::Text("0042".into())));
        assert_eq!(
            ColumnType::Decimal.parse("4.20"),
            Some(CellValue::Amount(Money::new(Decimal::new(420, 2))))
        );
    }

    // ── profiles ──────────────────────────────────────────────────────────────

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = ProfileRegistry::builtin(&usd());
        assert_eq!(registry.get_profile("CommerzBank").unwrap().name(), "commerzbank");
        assert_eq!("COMMERZBANK".parse::<Institution>().unwrap(), Institution::Commerzbank);
    }

    #[test]
    fn unknown_institution() {
        let registry = ProfileRegistry::builtin(&usd());
        assert!(matches!(
            registry.get_profile("sparkasse"),
            Err(ProfileError::UnknownInstitution(n)) if n == "sparkasse"
        ));
        assert!("".parse::<Institution>().is_err());
    }

    #[test]
    fn commerzbank_profile_shape() {
        let registry = ProfileRegistry::builtin(&usd());
        let p = registry.get_profile("commerzbank").unwrap();

        assert_eq!(p.delimiter(), b';');
        assert_eq!(p.converters().get("Betrag"), Some(&Converter::DecimalComma));
        assert_eq!(p.column_types().get("Währung"), Some(&ColumnType::Text));
        assert_eq!(p.drop_columns(), &["Währung".to_string()]);

        let [MultiColumnConverter::CurrencyConversion(c)] = p.multi_column_converters() else {
            panic!("expected one currency conversion");
        };
        assert_eq!(c.target, "Betrag");
        assert_eq!(c.value_column, "Betrag");
        assert_eq!(c.currency_column, "Währung");
        assert_eq!(c.date_column, "Buchungstag");
        assert_eq!(c.target_currency, usd());
    }

    #[test]
    fn converters_take_precedence_over_types() {
        let types = BTreeMap::from([
            ("Betrag".to_string(), ColumnType::Text),
            ("Umsatzart".to_string(), ColumnType::Text),
        ]);
        let converters = BTreeMap::from([("Betrag".to_string(), Converter::DecimalComma)]);
        let p = BankProfile::new("x", b',', types, converters, vec![], vec![]);

        assert!(!p.column_types().contains_key("Betrag"));
        assert!(p.column_types().contains_key("Umsatzart"));
    }

    #[test]
    fn no_column_is_both_typed_and_converted() {
        let toml = r#"
            [profiles.overlap]
            column_types = { Betrag = "decimal", Text = "text" }
            converters = { Betrag = "decimal_comma" }
        "#;
        let registry = ProfileRegistry::from_toml(toml, &usd()).unwrap();
        for name in registry.names() {
            let p = registry.get_profile(name).unwrap();
            for column in p.converters().keys() {
                assert!(!p.column_types().contains_key(column), "{name}: {column}");
            }
        }
    }

    // ── TOML registry ─────────────────────────────────────────────────────────

    #[test]
    fn toml_profile_is_loaded() {
        let toml = r#"
            [profiles.Sparkasse]
            delimiter = ","
            drop_columns = ["Waehrung"]

            [profiles.Sparkasse.column_types]
            Verwendungszweck = "text"

            [profiles.Sparkasse.converters]
            Buchungstag = "date:%d.%m.%y"
            Betrag = "decimal_comma"

            [[profiles.Sparkasse.multi_column_converters]]
            kind = "currency_conversion"
            target = "Betrag EUR"
            value = "Betrag"
            current_currency = "Waehrung"
            date = "Buchungstag"
            target_currency = "eur"
        "#;
        let registry = ProfileRegistry::from_toml(toml, &usd()).unwrap();
        let p = registry.get_profile("sparkasse").unwrap();

        assert_eq!(p.delimiter(), b',');
        assert_eq!(p.converters().get("Buchungstag"), Some(&Converter::Date("%d.%m.%y".into())));
        assert_eq!(p.multi_column_converters()[0].target(), "Betrag EUR");
        let MultiColumnConverter::CurrencyConversion(c) = &p.multi_column_converters()[0];
        assert_eq!(c.target_currency.as_str(), "EUR");
        // Built-ins stay available.
        assert!(registry.get_profile("commerzbank").is_ok());
    }

    #[test]
    fn toml_target_currency_defaults_to_registry_currency() {
        let toml = r#"
            [profiles.bank.converters]
            Amount = "decimal_comma"
            Date = "date:%d.%m.%Y"

            [[profiles.bank.multi_column_converters]]
            kind = "currency_conversion"
            target = "Amount"
            value = "Amount"
            current_currency = "Currency"
            date = "Date"
        "#;
        let registry = ProfileRegistry::from_toml(toml, &usd()).unwrap();
        let MultiColumnConverter::CurrencyConversion(c) =
            &registry.get_profile("bank").unwrap().multi_column_converters()[0];
        assert_eq!(c.target_currency, usd());
    }

    #[test]
    fn toml_rejects_unknown_converter_and_bad_delimiter() {
        let bad_converter = r#"
            [profiles.bank.converters]
            Betrag = "roman_numerals"
        "#;
        assert!(matches!(
            ProfileRegistry::from_toml(bad_converter, &usd()),
            Err(ProfileError::Toml(_))
        ));

        let bad_delimiter = r#"
            [profiles.bank]
            delimiter = ";;"
        "#;
        assert!(matches!(
            ProfileRegistry::from_toml(bad_delimiter, &usd()),
            Err(ProfileError::Invalid { .. })
        ));
    }

    #[test]
    fn toml_rejects_unknown_keys_and_currency() {
        let unknown_key = r#"
            [profiles.bank]
            separator = ";"
        "#;
        assert!(ProfileRegistry::from_toml(unknown_key, &usd()).is_err());

        let bad_currency = r#"
            [[profiles.bank.multi_column_converters]]
            kind = "currency_conversion"
            target = "A"
            value = "A"
            current_currency = "C"
            date = "D"
            target_currency = "DOLLARS"
        "#;
        assert!(ProfileRegistry::from_toml(bad_currency, &usd()).is_err());
    }

    #[test]
    fn toml_rejects_misspelled_top_level_table() {
        let toml = r#"
            [profile.sparkasse]
            delimiter = ","
        "#;
        assert!(matches!(
            ProfileRegistry::from_toml(toml, &usd()),
            Err(ProfileError::Toml(_))
        ));
    }

    #[test]
    fn toml_rejects_conversion_over_unparsed_columns() {
        let conversion = r#"
            [[profiles.bank.multi_column_converters]]
            kind = "currency_conversion"
            target = "Amount"
            value = "Amount"
            current_currency = "Currency"
            date = "Date"
        "#;
        assert!(matches!(
            ProfileRegistry::from_toml(conversion, &usd()),
            Err(ProfileError::Invalid { reason, .. }) if reason.contains("'Amount'")
        ));

        let text_date = format!(
            "[profiles.bank.column_types]\nAmount = \"decimal\"\nDate = \"text\"\n{conversion}"
        );
        assert!(matches!(
            ProfileRegistry::from_toml(&text_date, &usd()),
            Err(ProfileError::Invalid { reason, .. }) if reason.contains("'Date'")
        ));

        let date_as_amount = format!(
            "[profiles.bank.converters]\nAmount = \"date:%d.%m.%Y\"\nDate = \"date:%d.%m.%Y\"\n{conversion}"
        );
        assert!(matches!(
            ProfileRegistry::from_toml(&date_as_amount, &usd()),
            Err(ProfileError::Invalid { .. })
        ));

        let typed = format!(
            "[profiles.bank.column_types]\nAmount = \"decimal\"\n[profiles.bank.converters]\nDate = \"date:%d.%m.%Y\"\n{conversion}"
        );
        assert!(ProfileRegistry::from_toml(&typed, &usd()).is_ok());
    }
}
