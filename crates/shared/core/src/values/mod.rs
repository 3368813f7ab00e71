use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Price value - the broker reports prices as doubles
pub type Price = f64;

/// Quantity value - uses Decimal, the broker reports share quantities as decimals
pub type Quantity = Decimal;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Ticker symbol of a stock contract
pub type Symbol = String;
