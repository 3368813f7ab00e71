use serde::{Deserialize, Serialize};

use crate::values::{Price, Quantity};

/// One OHLC bar from a historical data request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar start as the broker formats it (`yyyymmdd` or `yyyymmdd hh:mm:ss`)
    pub time: String,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
}

impl Bar {
    /// All prices finite and the high/low range containing open and close
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite())
            && self.high >= self.low
            && (self.low..=self.high).contains(&self.open)
            && (self.low..=self.high).contains(&self.close)
    }
}
