//! Callback adapter
//!
//! Translates each raw broker callback into at most one typed [`Event`].
//! Runs on the worker thread and holds no shared state.
//!
//! The adapter is permissive: unknown tick types, unknown status text and
//! malformed payloads are dropped with a debug log, never a panic.

use crate::messages::callback::{NO_REQUEST_ID, RawCallback};
use crate::messages::event::Event;
use crate::relay::SessionEpoch;
use log::{debug, info, warn};
use qs_core::{OrderSnapshot, OrderStatus, OrderType, Position, Side, TickKind, TimeInForce};
use rust_decimal::Decimal;

/// Data-farm connectivity notices. Logged, never surfaced as errors.
pub const INFORMATIONAL_CODES: [i32; 6] = [2104, 2106, 2107, 2108, 2119, 2158];

/// Codes meaning the broker process is unreachable
pub const CONNECTION_ERROR_CODES: [i32; 3] = [502, 504, 10061];

/// Socket-level failure reported by the bridge itself
pub const TRANSPORT_FAILURE: i32 = -1;

/// No acknowledgement within the handshake budget
pub const HANDSHAKE_TIMEOUT: i32 = -2;

/// Fixed tick-type table. Delayed codes (66-68) map to the same kind as
/// their real-time counterparts (1, 2, 4).
const TICK_TABLE: [(i32, TickKind); 6] = [
    (1, TickKind::Bid),
    (2, TickKind::Ask),
    (4, TickKind::Last),
    (66, TickKind::Bid),
    (67, TickKind::Ask),
    (68, TickKind::Last),
];

/// Classify a numeric tick type
pub fn classify_tick(tick_type: i32) -> Option<TickKind> {
    TICK_TABLE
        .iter()
        .find(|(code, _)| *code == tick_type)
        .map(|(_, kind)| *kind)
}

pub fn is_informational(code: i32) -> bool {
    INFORMATIONAL_CODES.contains(&code)
}

/// Codes that end the session: unreachable broker or a transport failure
pub fn is_connection_error(code: i32) -> bool {
    code == TRANSPORT_FAILURE || CONNECTION_ERROR_CODES.contains(&code)
}

/// Stateless translator, tagged with its session for log lines
#[derive(Debug, Clone, Copy)]
pub struct CallbackAdapter {
    epoch: SessionEpoch,
}

impl CallbackAdapter {
    pub fn new(epoch: SessionEpoch) -> Self {
        Self { epoch }
    }

    /// Translate one callback. `None` means the callback is absorbed.
    pub fn translate(&self, raw: RawCallback) -> Option<Event> {
        match raw {
            RawCallback::Error {
                req_id,
                code,
                message,
            } => self.error(req_id, code, message),

            RawCallback::ConnectAck => {
                info!("[session {}] Connection acknowledged", self.epoch);
                Some(Event::Connected {
                    next_valid_id: None,
                })
            }

            RawCallback::NextValidId(order_id) => {
                info!("[session {}] Next valid order id: {}", self.epoch, order_id);
                Some(Event::Connected {
                    next_valid_id: Some(order_id),
                })
            }

            RawCallback::ManagedAccounts(list) => {
                let accounts: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from)
                    .collect();
                info!("[session {}] Accounts: {:?}", self.epoch, accounts);
                Some(Event::AccountsReceived(accounts))
            }

            RawCallback::TickPrice {
                req_id,
                tick_type,
                price,
            } => {
                let Some(kind) = classify_tick(tick_type) else {
                    debug!(
                        "[session {}] Dropping unclassified tick type {} for reqId {}",
                        self.epoch, tick_type, req_id
                    );
                    return None;
                };
                // The broker sends -1 when no price is available
                if !price.is_finite() || price <= 0.0 {
                    debug!(
                        "[session {}] Dropping {} tick without price for reqId {}",
                        self.epoch,
                        kind.as_str(),
                        req_id
                    );
                    return None;
                }
                Some(Event::PriceTick {
                    req_id,
                    kind,
                    price,
                })
            }

            RawCallback::HistoricalData { req_id, bar } => {
                if !bar.is_well_formed() {
                    debug!(
                        "[session {}] Dropping malformed bar {:?} for reqId {}",
                        self.epoch, bar, req_id
                    );
                    return None;
                }
                Some(Event::HistoricalBar { req_id, bar })
            }

            RawCallback::HistoricalDataEnd { req_id } => Some(Event::HistoricalDataEnd { req_id }),

            RawCallback::Position {
                account,
                symbol,
                quantity,
                avg_cost,
            } => {
                if symbol.trim().is_empty() || !avg_cost.is_finite() {
                    debug!(
                        "[session {}] Dropping malformed position for account {}",
                        self.epoch, account
                    );
                    return None;
                }
                Some(Event::PositionUpdate(Position::new(
                    account, symbol, quantity, avg_cost,
                )))
            }

            RawCallback::PositionEnd => Some(Event::PositionsComplete),

            RawCallback::OpenOrder {
                order_id,
                symbol,
                action,
                quantity,
                order_type,
                limit_price,
                stop_price,
                time_in_force,
                status,
            } => {
                let side = Side::from_action(&action);
                let order_type = OrderType::from_code(&order_type);
                let status = OrderStatus::from_broker(&status);
                let (Some(side), Some(order_type), Some(status)) = (side, order_type, status)
                else {
                    debug!(
                        "[session {}] Dropping open order {} with unrecognised fields",
                        self.epoch, order_id
                    );
                    return None;
                };

                Some(Event::OrderUpdate(OrderSnapshot {
                    order_id,
                    symbol,
                    side,
                    order_type,
                    quantity,
                    limit_price,
                    stop_price,
                    time_in_force: TimeInForce::from_code(&time_in_force).unwrap_or_default(),
                    status,
                    filled: Decimal::ZERO,
                    remaining: quantity,
                    avg_fill_price: 0.0,
                }))
            }

            RawCallback::OrderStatus {
                order_id,
                status,
                filled,
                remaining,
                avg_fill_price,
            } => {
                let Some(status) = OrderStatus::from_broker(&status) else {
                    debug!(
                        "[session {}] Dropping unknown status '{}' for order {}",
                        self.epoch, status, order_id
                    );
                    return None;
                };
                Some(Event::OrderStatusUpdate {
                    order_id,
                    status,
                    filled,
                    remaining,
                    avg_fill_price,
                })
            }

            RawCallback::OpenOrderEnd => Some(Event::OpenOrdersComplete),

            RawCallback::ConnectionClosed => {
                info!("[session {}] Connection closed", self.epoch);
                Some(Event::Disconnected)
            }
        }
    }

    fn error(&self, req_id: i32, code: i32, message: String) -> Option<Event> {
        if is_informational(code) {
            info!("[session {}] Info {}: {}", self.epoch, code, message);
            return None;
        }

        warn!("[session {}] Error {}: {}", self.epoch, code, message);
        Some(Event::Error {
            req_id: (req_id != NO_REQUEST_ID).then_some(req_id),
            code,
            message,
        })
    }
}
