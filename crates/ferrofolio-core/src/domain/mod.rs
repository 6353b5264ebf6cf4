//! Validated value types shared across the ledger.

mod company;
mod interval;
mod series;
mod symbol;
mod timestamp;

pub use company::Company;
pub use interval::{Interval, Period};
pub use series::{PricePoint, PriceSeries};
pub use symbol::{normalize_symbol, Symbol, SymbolNormalizer, DEFAULT_MAX_SYMBOL_LEN};
pub use timestamp::{format_date, parse_date, UtcDateTime};
