//! Raw broker callbacks
//!
//! One variant per callback the client library invokes on its reader thread.
//! Payloads are kept in the broker's own terms (numeric tick types, status
//! text, action strings); the callback adapter turns them into typed events.

use qs_core::{Bar, OrderId, Price, Quantity, RequestId};

/// Request id the broker uses for messages not tied to a request
pub const NO_REQUEST_ID: RequestId = -1;

#[derive(Debug, Clone, PartialEq)]
pub enum RawCallback {
    /// `error(reqId, errorCode, errorString)`
    Error {
        req_id: RequestId,
        code: i32,
        message: String,
    },
    /// `connectAck()`
    ConnectAck,
    /// `nextValidId(orderId)`
    NextValidId(OrderId),
    /// `managedAccounts(accountsList)`, comma separated
    ManagedAccounts(String),
    /// `tickPrice(reqId, tickType, price, attrib)`
    TickPrice {
        req_id: RequestId,
        tick_type: i32,
        price: Price,
    },
    /// `historicalData(reqId, bar)`
    HistoricalData { req_id: RequestId, bar: Bar },
    /// `historicalDataEnd(reqId, start, end)`
    HistoricalDataEnd { req_id: RequestId },
    /// `position(account, contract, position, avgCost)`
    Position {
        account: String,
        symbol: String,
        quantity: Quantity,
        avg_cost: Price,
    },
    /// `positionEnd()`
    PositionEnd,
    /// `openOrder(orderId, contract, order, orderState)`
    OpenOrder {
        order_id: OrderId,
        symbol: String,
        action: String,
        quantity: Quantity,
        order_type: String,
        limit_price: Option<Price>,
        stop_price: Option<Price>,
        time_in_force: String,
        status: String,
    },
    /// `orderStatus(orderId, status, filled, remaining, avgFillPrice, ...)`
    OrderStatus {
        order_id: OrderId,
        status: String,
        filled: Quantity,
        remaining: Quantity,
        avg_fill_price: Price,
    },
    /// `openOrderEnd()`
    OpenOrderEnd,
    /// `connectionClosed()`
    ConnectionClosed,
}

impl RawCallback {
    /// Callback name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            RawCallback::Error { .. } => "error",
            RawCallback::ConnectAck => "connectAck",
            RawCallback::NextValidId(_) => "nextValidId",
            RawCallback::ManagedAccounts(_) => "managedAccounts",
            RawCallback::TickPrice { .. } => "tickPrice",
            RawCallback::HistoricalData { .. } => "historicalData",
            RawCallback::HistoricalDataEnd { .. } => "historicalDataEnd",
            RawCallback::Position { .. } => "position",
            RawCallback::PositionEnd => "positionEnd",
            RawCallback::OpenOrder { .. } => "openOrder",
            RawCallback::OrderStatus { .. } => "orderStatus",
            RawCallback::OpenOrderEnd => "openOrderEnd",
            RawCallback::ConnectionClosed => "connectionClosed",
        }
    }
}
