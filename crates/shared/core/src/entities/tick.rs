use serde::{Deserialize, Serialize};

/// Semantic price tick classification.
///
/// Real-time and delayed variants of the same quantity share a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickKind {
    Bid,
    Ask,
    Last,
}

impl TickKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickKind::Bid => "bid",
            TickKind::Ask => "ask",
            TickKind::Last => "last",
        }
    }
}
