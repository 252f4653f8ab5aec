pub mod currency;
pub mod money;
pub mod rates;

pub use currency::{Currency, CurrencyError};
pub use money::Money;
pub use rates::{ConversionArgs, ConversionPolicy, EcbRates, FixedRates, RateCall, RateError, RateSource};
