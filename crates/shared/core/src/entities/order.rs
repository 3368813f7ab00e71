use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderStatus, OrderType, Side, TimeInForce};
use crate::values::{Price, Quantity, Symbol};

/// Broker order identifier, allocated from the client's monotonic counter
pub type OrderId = i64;

/// Correlation token tying a data request to its asynchronous responses
pub type RequestId = i32;

/// What the user asked to trade. Becomes an order once an id is allocated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    /// Required for Limit and StopLimit orders
    pub limit_price: Option<Price>,
    /// Required for StopLoss and StopLimit orders
    pub stop_price: Option<Price>,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    /// Routing destination; the bridge default applies when absent
    #[serde(default)]
    pub exchange: Option<String>,
}

impl OrderSpec {
    /// Create a market order spec
    pub fn market(symbol: impl Into<Symbol>, side: Side, quantity: Quantity) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::DAY,
            exchange: None,
        }
    }

    /// Create a limit order spec
    pub fn limit(
        symbol: impl Into<Symbol>,
        side: Side,
        quantity: Quantity,
        limit_price: Price,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Create a stop order spec
    pub fn stop(symbol: impl Into<Symbol>, side: Side, quantity: Quantity, stop_price: Price) -> Self {
        Self {
            order_type: OrderType::StopLoss,
            stop_price: Some(stop_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Validate the spec based on order type requirements
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("symbol is empty".to_string());
        }
        if self.quantity <= Decimal::ZERO {
            return Err(format!("quantity must be positive, got {}", self.quantity));
        }
        let valid_price = |p: Option<Price>| p.is_some_and(|p| p.is_finite() && p > 0.0);
        if self.order_type.requires_limit_price() && !valid_price(self.limit_price) {
            return Err(format!("{} order requires a limit price", self.order_type.as_code()));
        }
        if self.order_type.requires_stop_price() && !valid_price(self.stop_price) {
            return Err(format!("{} order requires a stop price", self.order_type.as_code()));
        }
        Ok(())
    }
}

/// Read-only mirror of an order as last reported by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub filled: Quantity,
    pub remaining: Quantity,
    pub avg_fill_price: Price,
}

impl OrderSnapshot {
    /// Mirror of a freshly submitted order
    pub fn submitted(order_id: OrderId, spec: &OrderSpec) -> Self {
        Self {
            order_id,
            symbol: spec.symbol.clone(),
            side: spec.side,
            order_type: spec.order_type,
            quantity: spec.quantity,
            limit_price: spec.limit_price,
            stop_price: spec.stop_price,
            time_in_force: spec.time_in_force,
            status: OrderStatus::PendingSubmit,
            filled: Decimal::ZERO,
            remaining: spec.quantity,
            avg_fill_price: 0.0,
        }
    }

    /// Returns true if the order is completely filled
    pub fn is_filled(&self) -> bool {
        self.filled >= self.quantity
    }
}
