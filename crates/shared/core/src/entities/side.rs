use serde::{Deserialize, Serialize};

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Order action as the broker spells it
    pub fn as_action(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Parse a broker action string (`BUY`, `SELL`, case-insensitive)
    pub fn from_action(action: &str) -> Option<Self> {
        if action.eq_ignore_ascii_case("BUY") {
            Some(Side::Buy)
        } else if action.eq_ignore_ascii_case("SELL") {
            Some(Side::Sell)
        } else {
            None
        }
    }
}
