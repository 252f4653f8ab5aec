use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::currency::Currency;
use crate::money::Money;

/// ECB publishes on TARGET business days only; gaps longer than this are treated
/// as "no rate" rather than silently reusing a stale fixing.
const MAX_FALLBACK_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum RateError {
    #[error("Unsupported currency: {0}")]
    UnknownCurrency(Currency),
    #[error("No {currency} rate on or shortly before {date}")]
    DateOutOfRange { currency: Currency, date: NaiveDate },
    #[error("Invalid reference hour: {0}")]
    InvalidReferenceHour(u32),
    #[error("Amount out of range: {0}")]
    Overflow(String),
    #[error("Rate table parse error: {0}")]
    Parse(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Historical exchange-rate lookup.
pub trait RateSource {
    fn convert(
        &self,
        amount: Decimal,
        from: &Currency,
        to: &Currency,
        at: NaiveDateTime,
    ) -> Result<Decimal, RateError>;
}

/// Inputs of one currency conversion, gathered from a single dataset row plus
/// the profile's static target currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionArgs {
    pub value: Money,
    pub current_currency: Currency,
    pub date: NaiveDate,
    pub target_currency: Currency,
}

/// How a row's booking date and amount are turned into a rate-source query.
///
/// `reference_hour` is the time of day attached to the booking date.
/// `amount_offset` is added to the amount before conversion; it exists only to
/// reproduce historical outputs and is zero unless configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionPolicy {
    reference_hour: u32,
    amount_offset: Decimal,
}

impl Default for ConversionPolicy {
    fn default() -> Self {
        Self {
            reference_hour: 16,
            amount_offset: Decimal::ZERO,
        }
    }
}

impl ConversionPolicy {
    pub fn new(reference_hour: u32, amount_offset: Decimal) -> Result<Self, RateError> {
        if reference_hour > 23 {
            return Err(RateError::InvalidReferenceHour(reference_hour));
        }
        Ok(Self { reference_hour, amount_offset })
    }

    pub fn reference_hour(&self) -> u32 {
        self.reference_hour
    }

    pub fn amount_offset(&self) -> Decimal {
        self.amount_offset
    }

    pub fn convert(&self, rates: &dyn RateSource, args: &ConversionArgs) -> Result<Money, RateError> {
        let amount = args
            .value
            .amount()
            .checked_add(self.amount_offset)
            .ok_or_else(|| RateError::Overflow(format!("{} + offset {}", args.value, self.amount_offset)))?;
        if amount.is_zero() || args.current_currency == args.target_currency {
            return Ok(Money::new(amount));
        }
        let at = args
            .date
            .and_hms_opt(self.reference_hour, 0, 0)
            .ok_or(RateError::InvalidReferenceHour(self.reference_hour))?;
        let converted = rates.convert(amount, &args.current_currency, &args.target_currency, at)?;
        Ok(Money::from_decimal(converted))
    }
}

// ── ECB reference rates ───────────────────────────────────────────────────────

/// Euro foreign exchange reference rates in the layout of the ECB's
/// `eurofxref-hist.csv`: a `Date` column followed by one column per currency,
/// each value being units of that currency per 1 EUR.
#[derive(Debug, Clone, Default)]
pub struct EcbRates {
    days: BTreeMap<NaiveDate, HashMap<Currency, Decimal>>,
    currencies: BTreeSet<Currency>,
}

impl EcbRates {
    pub fn from_path(path: &Path) -> Result<Self, RateError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(data: R) -> Result<Self, RateError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data);

        let headers = reader.headers()?.clone();
        let mut columns: Vec<Option<Currency>> = Vec::with_capacity(headers.len());
        for (i, name) in headers.iter().enumerate() {
            if i == 0 || name.is_empty() {
                columns.push(None);
                continue;
            }
            let currency = Currency::from_str(name)
                .map_err(|e| RateError::Parse(e.to_string()))?;
            columns.push(Some(currency));
        }

        let mut rates = EcbRates::default();
        for result in reader.records() {
            let record = result?;
            let Some(raw_date) = record.get(0).filter(|s| !s.is_empty()) else {
                continue;
            };
            let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
                .map_err(|_| RateError::Parse(format!("invalid date '{raw_date}'")))?;

            let mut day = HashMap::new();
            for (field, currency) in record.iter().zip(columns.iter()) {
                let Some(currency) = currency else { continue };
                if field.is_empty() || field.eq_ignore_ascii_case("N/A") {
                    continue;
                }
                let rate = Decimal::from_str(field).map_err(|_| {
                    RateError::Parse(format!("invalid {currency} rate '{field}' on {date}"))
                })?;
                if rate <= Decimal::ZERO {
                    return Err(RateError::Parse(format!(
                        "non-positive {currency} rate on {date}"
                    )));
                }
                day.insert(currency.clone(), rate);
            }
            rates.days.insert(date, day);
        }

        rates.currencies = columns.into_iter().flatten().collect();
        Ok(rates)
    }

    pub fn currencies(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Units of `currency` per 1 EUR on `date`, falling back to the latest
    /// earlier fixing for non-business days.
    pub fn rate_on(&self, currency: &Currency, date: NaiveDate) -> Result<Decimal, RateError> {
        if currency.is_euro() {
            return Ok(Decimal::ONE);
        }
        if !self.currencies.contains(currency) {
            return Err(RateError::UnknownCurrency(currency.clone()));
        }
        let out_of_range = || RateError::DateOutOfRange {
            currency: currency.clone(),
            date,
        };

        let last = self.days.keys().next_back().copied().ok_or_else(out_of_range)?;
        if date > last {
            return Err(out_of_range());
        }

        let earliest = date - Duration::days(MAX_FALLBACK_DAYS);
        for (day, rates) in self.days.range(earliest..=date).rev() {
            if let Some(rate) = rates.get(currency) {
                if *day != date {
                    tracing::debug!(%currency, requested = %date, used = %day, "using earlier ECB fixing");
                }
                return Ok(*rate);
            }
        }
        Err(out_of_range())
    }
}

impl RateSource for EcbRates {
    fn convert(
        &self,
        amount: Decimal,
        from: &Currency,
        to: &Currency,
        at: NaiveDateTime,
    ) -> Result<Decimal, RateError> {
        if from == to {
            return Ok(amount);
        }
        let date = at.date();
        let from_rate = self.rate_on(from, date)?;
        let to_rate = self.rate_on(to, date)?;
        amount
            .checked_div(from_rate)
            .and_then(|eur| eur.checked_mul(to_rate))
            .ok_or_else(|| RateError::Overflow(format!("converting {amount} {from} to {to}")))
    }
}

// ── Fixed rates (always available, used for tests) ────────────────────────────

/// One recorded `RateSource::convert` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateCall {
    pub amount: Decimal,
    pub from: Currency,
    pub to: Currency,
    pub at: NaiveDateTime,
}

/// Constant pairwise rates that remember every query. Unknown pairs fail with
/// `UnknownCurrency` for the source currency.
#[derive(Debug, Default)]
pub struct FixedRates {
    rates: HashMap<(Currency, Currency), Decimal>,
    calls: RefCell<Vec<RateCall>>,
}

impl FixedRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: Currency, to: Currency, rate: Decimal) -> Self {
        self.rates.insert((from, to), rate);
        self
    }

    pub fn calls(&self) -> Vec<RateCall> {
        self.calls.borrow().clone()
    }
}

impl RateSource for FixedRates {
    fn convert(
        &self,
        amount: Decimal,
        from: &Currency,
        to: &Currency,
        at: NaiveDateTime,
    ) -> Result<Decimal, RateError> {
        self.calls.borrow_mut().push(RateCall {
            amount,
            from: from.clone(),
            to: to.clone(),
            at,
        });
        let rate = self
            .rates
            .get(&(from.clone(), to.clone()))
            .ok_or_else(|| RateError::UnknownCurrency(from.clone()))?;
        amount
            .checked_mul(*rate)
            .ok_or_else(|| RateError::Overflow(format!("converting {amount} {from} to {to}")))
    }
}
