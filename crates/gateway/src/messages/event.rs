//! Typed events delivered to the consumer

use qs_core::{Bar, OrderId, OrderSnapshot, OrderStatus, Position, Price, Quantity, RequestId, TickKind};
use serde::{Deserialize, Serialize};

use crate::lifecycle::ConnectionState;

/// Everything the bridge tells its consumer, data and failures alike.
///
/// Immutable once constructed. Produced by the callback adapter on the
/// worker thread, or by the dispatcher on the consumer thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// The connection is usable. Carries the broker's next valid order id
    /// when the acknowledgement came from `nextValidId`.
    Connected { next_valid_id: Option<OrderId> },
    Disconnected,
    ConnectionStatusChanged(ConnectionState),
    AccountsReceived(Vec<String>),
    Error {
        req_id: Option<RequestId>,
        code: i32,
        message: String,
    },
    PriceTick {
        req_id: RequestId,
        kind: TickKind,
        price: Price,
    },
    HistoricalBar { req_id: RequestId, bar: Bar },
    HistoricalDataEnd { req_id: RequestId },
    PositionUpdate(Position),
    PositionsComplete,
    OrderUpdate(OrderSnapshot),
    OrderStatusUpdate {
        order_id: OrderId,
        status: OrderStatus,
        filled: Quantity,
        remaining: Quantity,
        avg_fill_price: Price,
    },
    OpenOrdersComplete,
}

impl Event {
    /// Request id the event answers, if any
    pub fn req_id(&self) -> Option<RequestId> {
        match self {
            Event::Error { req_id, .. } => *req_id,
            Event::PriceTick { req_id, .. }
            | Event::HistoricalBar { req_id, .. }
            | Event::HistoricalDataEnd { req_id } => Some(*req_id),
            _ => None,
        }
    }

    /// Order id the event concerns, if any
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            Event::OrderUpdate(order) => Some(order.order_id),
            Event::OrderStatusUpdate { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }

    /// Short name of the variant, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connected { .. } => "Connected",
            Event::Disconnected => "Disconnected",
            Event::ConnectionStatusChanged(_) => "ConnectionStatusChanged",
            Event::AccountsReceived(_) => "AccountsReceived",
            Event::Error { .. } => "Error",
            Event::PriceTick { .. } => "PriceTick",
            Event::HistoricalBar { .. } => "HistoricalBar",
            Event::HistoricalDataEnd { .. } => "HistoricalDataEnd",
            Event::PositionUpdate(_) => "PositionUpdate",
            Event::PositionsComplete => "PositionsComplete",
            Event::OrderUpdate(_) => "OrderUpdate",
            Event::OrderStatusUpdate { .. } => "OrderStatusUpdate",
            Event::OpenOrdersComplete => "OpenOrdersComplete",
        }
    }

    /// Create an error event not tied to a request
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Event::Error {
            req_id: None,
            code,
            message: message.into(),
        }
    }

    pub fn status(state: ConnectionState) -> Self {
        Event::ConnectionStatusChanged(state)
    }
}
