use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::values::{Price, Quantity, Symbol, Timestamp};

/// A holding in one account as reported by the broker.
/// Negative quantity is a short position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub account: String,
    pub symbol: Symbol,
    pub quantity: Quantity,
    pub avg_cost: Price,
}

impl Position {
    pub fn new(
        account: impl Into<String>,
        symbol: impl Into<Symbol>,
        quantity: Quantity,
        avg_cost: Price,
    ) -> Self {
        Self {
            account: account.into(),
            symbol: symbol.into(),
            quantity,
            avg_cost,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }
}

/// Complete set of positions from one refresh cycle.
///
/// Replaced wholesale when a new cycle completes; never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    positions: Vec<Position>,
    completed_at: Option<Timestamp>,
}

impl PositionSnapshot {
    pub fn new(positions: Vec<Position>, completed_at: Timestamp) -> Self {
        Self {
            positions,
            completed_at: Some(completed_at),
        }
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Positions with a non-zero quantity
    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| !p.is_flat())
    }

    /// Find a position by account and symbol
    pub fn get(&self, account: &str, symbol: &str) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.account == account && p.symbol == symbol)
    }

    pub fn completed_at(&self) -> Option<Timestamp> {
        self.completed_at
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
