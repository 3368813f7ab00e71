//! Outbound request types

use qs_core::{OrderId, OrderSpec, RequestId, Symbol};
use serde::{Deserialize, Serialize};

/// Instrument description sent with market data, historical and order requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub symbol: Symbol,
    /// Security type, `STK` for stocks
    pub sec_type: String,
    /// Routing destination, `SMART` for smart routing
    pub exchange: String,
    pub currency: String,
}

impl Contract {
    /// Stock contract routed through `exchange` and priced in `currency`
    pub fn stock(
        symbol: impl Into<Symbol>,
        exchange: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            sec_type: "STK".to_string(),
            exchange: exchange.into(),
            currency: currency.into(),
        }
    }
}

/// Market data type codes accepted by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketDataType {
    Live,
    Frozen,
    Delayed,
    DelayedFrozen,
}

impl MarketDataType {
    pub fn code(&self) -> i32 {
        match self {
            MarketDataType::Live => 1,
            MarketDataType::Frozen => 2,
            MarketDataType::Delayed => 3,
            MarketDataType::DelayedFrozen => 4,
        }
    }
}

/// Bounded historical window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalWindow {
    /// End of the window, empty for "now"
    pub end: String,
    /// Lookback, e.g. `1 D`
    pub duration: String,
    /// Bar size, e.g. `1 min`
    pub bar_size: String,
    /// Data source, e.g. `TRADES`
    pub what_to_show: String,
    /// Regular trading hours only
    pub use_rth: bool,
}

/// Every call the dispatcher makes into the client library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BrokerRequest {
    /// `reqMarketDataType`
    MarketDataType(MarketDataType),
    /// `reqMktData`
    MarketData {
        req_id: RequestId,
        contract: Contract,
    },
    /// `cancelMktData`
    CancelMarketData { req_id: RequestId },
    /// `reqHistoricalData`
    HistoricalData {
        req_id: RequestId,
        contract: Contract,
        window: HistoricalWindow,
    },
    /// `reqPositions`
    Positions,
    /// `reqOpenOrders`
    OpenOrders,
    /// `placeOrder`
    PlaceOrder {
        order_id: OrderId,
        contract: Contract,
        order: OrderSpec,
    },
    /// `reqGlobalCancel`
    GlobalCancel,
}

impl BrokerRequest {
    /// Request name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            BrokerRequest::MarketDataType(_) => "reqMarketDataType",
            BrokerRequest::MarketData { .. } => "reqMktData",
            BrokerRequest::CancelMarketData { .. } => "cancelMktData",
            BrokerRequest::HistoricalData { .. } => "reqHistoricalData",
            BrokerRequest::Positions => "reqPositions",
            BrokerRequest::OpenOrders => "reqOpenOrders",
            BrokerRequest::PlaceOrder { .. } => "placeOrder",
            BrokerRequest::GlobalCancel => "reqGlobalCancel",
        }
    }
}
