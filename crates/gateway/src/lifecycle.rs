//! Connection and request lifecycle
//!
//! Single owner of all client state: connection state machine, session
//! epoch, request-id and order-id counters, active subscriptions, accounts,
//! the open-order mirror and the position snapshot. Lives on the consumer
//! thread and is only mutated from there, so it needs no locks.
//!
//! State machine:
//!
//! ```text
//! Disconnected --connect--> Connecting --first ack--> Connected
//!       ^                        |                        |
//!       +---- disconnect / socket closed / 502,504,10061,-1 +
//! ```
//!
//! `Reconnecting` stands in for `Connecting` while a reconnect is underway.

use crate::adapter::is_connection_error;
use crate::messages::event::Event;
use crate::relay::{Envelope, Origin, SessionEpoch};
use crate::transport::Endpoint;
use chrono::Utc;
use log::{debug, info, warn};
use qs_core::{OrderId, OrderSnapshot, OrderSpec, Position, PositionSnapshot, RequestId, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};

/// First id handed out by request-id auto-assignment
pub const FIRST_AUTO_REQUEST_ID: RequestId = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }

    /// Connecting or reconnecting
    pub fn is_pending(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionKind {
    LivePrice,
    HistoricalBars,
    PositionStream,
    OrderStream,
}

/// A request whose responses are still expected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub req_id: RequestId,
    pub symbol: Symbol,
    pub kind: SubscriptionKind,
    pub active: bool,
}

/// Outcome of applying one envelope
#[derive(Debug, Default)]
pub struct Applied {
    /// Events to hand to the consumer, in order
    pub deliver: Vec<Event>,
    /// The live session ended; the transport must be closed
    pub teardown: bool,
    /// The session just became ready
    pub connected: bool,
}

impl Applied {
    fn deliver(events: Vec<Event>) -> Self {
        Self {
            deliver: events,
            ..Self::default()
        }
    }

    fn nothing() -> Self {
        Self::default()
    }
}

pub struct LifecycleManager {
    state: ConnectionState,
    endpoint: Option<Endpoint>,
    /// Epoch of the current (or most recent) session
    epoch: SessionEpoch,
    connecting_since: Option<Instant>,
    handshake_timeout: Duration,
    /// Next order id to hand out. Survives disconnects.
    next_order_id: Option<OrderId>,
    next_request_id: RequestId,
    subscriptions: BTreeMap<RequestId, Subscription>,
    /// Ids released during this connection. Late data may still carry them,
    /// so they are not handed out again until the next session.
    retired: BTreeSet<RequestId>,
    accounts: Vec<String>,
    orders: BTreeMap<OrderId, OrderSnapshot>,
    positions: PositionSnapshot,
    staged_positions: Vec<Position>,
}

impl LifecycleManager {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            endpoint: None,
            epoch: 0,
            connecting_since: None,
            handshake_timeout,
            next_order_id: None,
            next_request_id: FIRST_AUTO_REQUEST_ID,
            subscriptions: BTreeMap::new(),
            retired: BTreeSet::new(),
            accounts: Vec::new(),
            orders: BTreeMap::new(),
            positions: PositionSnapshot::default(),
            staged_positions: Vec::new(),
        }
    }

    /// Start a connection attempt and return the new session's epoch
    pub fn begin_connect(&mut self, endpoint: Endpoint) -> SessionEpoch {
        self.begin(endpoint, ConnectionState::Connecting)
    }

    /// Same as `begin_connect`, but the state reads `Reconnecting`
    pub fn begin_reconnect(&mut self, endpoint: Endpoint) -> SessionEpoch {
        self.begin(endpoint, ConnectionState::Reconnecting)
    }

    fn begin(&mut self, endpoint: Endpoint, state: ConnectionState) -> SessionEpoch {
        self.epoch += 1;
        self.state = state;
        info!("Session {} {} to {}", self.epoch, state, endpoint);
        self.endpoint = Some(endpoint);
        self.connecting_since = Some(Instant::now());
        self.epoch
    }

    /// Move to `Disconnected` and forget everything tied to the session.
    ///
    /// Bumps the epoch so anything the old worker still produces is stale.
    /// The order-id counter, order mirror and last position snapshot are kept.
    /// Returns false if already disconnected.
    pub fn mark_disconnected(&mut self) -> bool {
        if self.state == ConnectionState::Disconnected {
            return false;
        }

        info!("Session {} disconnected", self.epoch);
        self.epoch += 1;
        self.state = ConnectionState::Disconnected;
        self.connecting_since = None;
        self.next_request_id = FIRST_AUTO_REQUEST_ID;
        self.subscriptions.clear();
        self.retired.clear();
        self.accounts.clear();
        self.staged_positions.clear();
        true
    }

    /// Apply one envelope from the relay
    pub fn apply(&mut self, envelope: Envelope) -> Applied {
        match envelope.origin {
            Origin::Local => Applied::deliver(vec![envelope.event]),
            Origin::Session(epoch) if epoch != self.epoch => {
                debug!(
                    "Discarding {} from stale session {} (current {})",
                    envelope.event.kind(),
                    epoch,
                    self.epoch
                );
                Applied::nothing()
            }
            Origin::Session(_) => self.apply_session_event(envelope.event),
        }
    }

    fn apply_session_event(&mut self, event: Event) -> Applied {
        match event {
            Event::Connected { next_valid_id } => {
                if let Some(broker_id) = next_valid_id {
                    self.seed_order_id(broker_id);
                }
                if !self.state.is_pending() {
                    debug!("Absorbing repeated acknowledgement in state {}", self.state);
                    return Applied::nothing();
                }

                self.state = ConnectionState::Connected;
                self.connecting_since = None;
                info!("Session {} connected", self.epoch);
                Applied {
                    deliver: vec![
                        Event::Connected { next_valid_id },
                        Event::status(ConnectionState::Connected),
                    ],
                    teardown: false,
                    connected: true,
                }
            }

            Event::Disconnected => self.session_lost(Vec::new()),

            Event::Error { req_id, code, message } => {
                let error = Event::Error { req_id, code, message };
                if is_connection_error(code) {
                    self.session_lost(vec![error])
                } else {
                    Applied::deliver(vec![error])
                }
            }

            Event::AccountsReceived(accounts) => {
                self.accounts = accounts.clone();
                Applied::deliver(vec![Event::AccountsReceived(accounts)])
            }

            Event::PriceTick { req_id, .. } => {
                self.deliver_if_subscribed(req_id, SubscriptionKind::LivePrice, event)
            }

            Event::HistoricalBar { req_id, .. } => {
                self.deliver_if_subscribed(req_id, SubscriptionKind::HistoricalBars, event)
            }

            Event::HistoricalDataEnd { req_id } => {
                if self.release(req_id).is_none() {
                    debug!("Historical data end for unknown reqId {}", req_id);
                    return Applied::nothing();
                }
                Applied::deliver(vec![event])
            }

            Event::PositionUpdate(position) => {
                self.staged_positions.push(position.clone());
                Applied::deliver(vec![Event::PositionUpdate(position)])
            }

            Event::PositionsComplete => {
                let staged = std::mem::take(&mut self.staged_positions);
                info!("Position snapshot complete: {} positions", staged.len());
                self.positions = PositionSnapshot::new(staged, Utc::now());
                self.close_stream(SubscriptionKind::PositionStream);
                Applied::deliver(vec![Event::PositionsComplete])
            }

            Event::OrderUpdate(snapshot) => self.merge_open_order(snapshot),

            Event::OrderStatusUpdate {
                order_id,
                status,
                filled,
                remaining,
                avg_fill_price,
            } => {
                if let Some(order) = self.orders.get_mut(&order_id) {
                    if !order.status.can_advance_to(status) {
                        debug!(
                            "Suppressing status regression for order {}: {:?} -> {:?}",
                            order_id, order.status, status
                        );
                        return Applied::nothing();
                    }
                    order.status = status;
                    order.filled = filled;
                    order.remaining = remaining;
                    order.avg_fill_price = avg_fill_price;
                }
                Applied::deliver(vec![event])
            }

            Event::OpenOrdersComplete => {
                self.close_stream(SubscriptionKind::OrderStream);
                self.prune_terminal_orders();
                Applied::deliver(vec![event])
            }

            Event::ConnectionStatusChanged(_) => Applied::deliver(vec![event]),
        }
    }

    /// The live session ended from the broker side
    fn session_lost(&mut self, mut deliver: Vec<Event>) -> Applied {
        let lost = self.mark_disconnected();
        if lost {
            deliver.push(Event::Disconnected);
            deliver.push(Event::status(ConnectionState::Disconnected));
        }
        Applied {
            deliver,
            teardown: lost,
            connected: false,
        }
    }

    fn deliver_if_subscribed(
        &self,
        req_id: RequestId,
        kind: SubscriptionKind,
        event: Event,
    ) -> Applied {
        match self.subscriptions.get(&req_id) {
            Some(sub) if sub.active && sub.kind == kind => Applied::deliver(vec![event]),
            _ => {
                debug!("Dropping {} for inactive reqId {}", event.kind(), req_id);
                Applied::nothing()
            }
        }
    }

    fn merge_open_order(&mut self, mut snapshot: OrderSnapshot) -> Applied {
        if let Some(existing) = self.orders.get(&snapshot.order_id) {
            // Fill progress only comes from status updates
            snapshot.filled = existing.filled;
            snapshot.remaining = existing.remaining;
            snapshot.avg_fill_price = existing.avg_fill_price;
            if !existing.status.can_advance_to(snapshot.status) {
                debug!(
                    "Keeping status {:?} for order {} over reported {:?}",
                    existing.status, snapshot.order_id, snapshot.status
                );
                snapshot.status = existing.status;
            }
        }
        self.orders.insert(snapshot.order_id, snapshot.clone());
        Applied::deliver(vec![Event::OrderUpdate(snapshot)])
    }

    fn close_stream(&mut self, kind: SubscriptionKind) {
        let closed: Vec<RequestId> = self
            .subscriptions
            .values()
            .filter(|sub| sub.kind == kind)
            .map(|sub| sub.req_id)
            .collect();
        for req_id in closed {
            self.release(req_id);
        }
    }

    /// A finished open-order cycle is the broker's full picture; orders
    /// already in a terminal status are dropped from the mirror.
    fn prune_terminal_orders(&mut self) {
        let before = self.orders.len();
        self.orders.retain(|_, order| order.status.is_active());
        let pruned = before - self.orders.len();
        if pruned > 0 {
            debug!("Pruned {} terminal orders from the mirror", pruned);
        }
    }

    fn seed_order_id(&mut self, broker_id: OrderId) {
        let next = match self.next_order_id {
            Some(local) => local.max(broker_id),
            None => broker_id,
        };
        if Some(next) != self.next_order_id {
            debug!("Next order id {:?} -> {}", self.next_order_id, next);
        }
        self.next_order_id = Some(next);
    }

    /// Register a subscription. With `requested` the caller's id is used;
    /// otherwise the next free id from the counter. Returns `None` if the
    /// requested id is active or was released earlier in this connection.
    pub fn reserve_request_id(
        &mut self,
        requested: Option<RequestId>,
        symbol: &str,
        kind: SubscriptionKind,
    ) -> Option<RequestId> {
        let req_id = match requested {
            Some(id) => {
                if self.subscriptions.contains_key(&id) {
                    warn!("reqId {} is already active for {}", id, symbol);
                    return None;
                }
                if self.retired.contains(&id) {
                    warn!("reqId {} was released this session, not reusing it for {}", id, symbol);
                    return None;
                }
                id
            }
            None => {
                let mut id = self.next_request_id;
                while self.subscriptions.contains_key(&id) || self.retired.contains(&id) {
                    id += 1;
                }
                self.next_request_id = id + 1;
                id
            }
        };

        self.subscriptions.insert(
            req_id,
            Subscription {
                req_id,
                symbol: symbol.to_string(),
                kind,
                active: true,
            },
        );
        Some(req_id)
    }

    /// Subscription of the given kind still waiting for its end marker
    pub fn open_stream(&self, kind: SubscriptionKind) -> Option<RequestId> {
        self.subscriptions
            .values()
            .find(|sub| sub.kind == kind)
            .map(|sub| sub.req_id)
    }

    /// Drop a subscription. The id stays retired until the connection ends.
    pub fn release(&mut self, req_id: RequestId) -> Option<Subscription> {
        let released = self.subscriptions.remove(&req_id)?;
        self.retired.insert(req_id);
        Some(released)
    }

    /// Take the next order id. `None` until the broker has reported one.
    pub fn allocate_order_id(&mut self) -> Option<OrderId> {
        let id = self.next_order_id?;
        self.next_order_id = Some(id + 1);
        Some(id)
    }

    /// Mirror a just-submitted order
    pub fn record_order(&mut self, order_id: OrderId, spec: &OrderSpec) {
        self.orders
            .insert(order_id, OrderSnapshot::submitted(order_id, spec));
    }

    /// When the handshake budget runs out, if a connect is pending
    pub fn handshake_deadline(&self) -> Option<Instant> {
        self.connecting_since
            .filter(|_| self.state.is_pending())
            .map(|since| since + self.handshake_timeout)
    }

    pub fn handshake_expired(&self, now: Instant) -> bool {
        self.handshake_deadline().is_some_and(|deadline| now >= deadline)
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn epoch(&self) -> SessionEpoch {
        self.epoch
    }

    /// Parameters of the last connect
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    pub fn next_order_id(&self) -> Option<OrderId> {
        self.next_order_id
    }

    pub fn subscription(&self, req_id: RequestId) -> Option<&Subscription> {
        self.subscriptions.get(&req_id)
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    pub fn order(&self, order_id: OrderId) -> Option<&OrderSnapshot> {
        self.orders.get(&order_id)
    }

    /// Orders not yet in a terminal status
    pub fn open_orders(&self) -> impl Iterator<Item = &OrderSnapshot> {
        self.orders.values().filter(|order| order.status.is_active())
    }

    pub fn positions(&self) -> &PositionSnapshot {
        &self.positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qs_core::{OrderStatus, Side, TickKind};
    use rust_decimal_macros::dec;

    fn manager() -> LifecycleManager {
        LifecycleManager::new(Duration::from_secs(30))
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("127.0.0.1", 7497, 1)
    }

    fn from(epoch: SessionEpoch, event: Event) -> Envelope {
        Envelope {
            origin: Origin::Session(epoch),
            received_at: Utc::now(),
            event,
        }
    }

    fn connected(mgr: &mut LifecycleManager, next_valid_id: OrderId) -> SessionEpoch {
        let epoch = mgr.begin_connect(endpoint());
        mgr.apply(from(
            epoch,
            Event::Connected {
                next_valid_id: Some(next_valid_id),
            },
        ));
        epoch
    }

    #[test]
    fn test_connected_exactly_once() {
        let mut mgr = manager();
        let epoch = mgr.begin_connect(endpoint());
        assert_eq!(mgr.state(), ConnectionState::Connecting);

        let first = mgr.apply(from(epoch, Event::Connected { next_valid_id: None }));
        assert!(first.connected);
        assert_eq!(first.deliver[0], Event::Connected { next_valid_id: None });

        let second = mgr.apply(from(
            epoch,
            Event::Connected {
                next_valid_id: Some(17),
            },
        ));
        assert!(second.deliver.is_empty());
        assert!(!second.connected);
        assert_eq!(mgr.state(), ConnectionState::Connected);
        // The absorbed ack still seeds the order counter
        assert_eq!(mgr.next_order_id(), Some(17));
    }

    #[test]
    fn test_stale_epoch_discarded() {
        let mut mgr = manager();
        let old = connected(&mut mgr, 1);
        mgr.mark_disconnected();
        let new = mgr.begin_reconnect(endpoint());
        assert!(new > old);

        let stale = mgr.apply(from(old, Event::AccountsReceived(vec!["DU1".into()])));
        assert!(stale.deliver.is_empty());
        assert!(mgr.accounts().is_empty());

        let local = mgr.apply(Envelope {
            origin: Origin::Local,
            received_at: Utc::now(),
            event: Event::PositionsComplete,
        });
        assert_eq!(local.deliver, vec![Event::PositionsComplete]);
    }

    #[test]
    fn test_connection_error_tears_down() {
        let mut mgr = manager();
        let epoch = mgr.begin_connect(endpoint());

        let applied = mgr.apply(from(epoch, Event::error(502, "Couldn't connect to TWS")));
        assert!(applied.teardown);
        assert_eq!(
            applied.deliver,
            vec![
                Event::error(502, "Couldn't connect to TWS"),
                Event::Disconnected,
                Event::status(ConnectionState::Disconnected),
            ]
        );
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_protocol_error_not_fatal() {
        let mut mgr = manager();
        let epoch = connected(&mut mgr, 1);
        let applied = mgr.apply(from(epoch, Event::error(200, "No security definition")));
        assert!(!applied.teardown);
        assert_eq!(applied.deliver.len(), 1);
        assert!(mgr.is_connected());
    }

    #[test]
    fn test_request_id_assignment() {
        let mut mgr = manager();
        assert_eq!(
            mgr.reserve_request_id(Some(1001), "SPY", SubscriptionKind::LivePrice),
            Some(1001)
        );
        assert_eq!(
            mgr.reserve_request_id(Some(1001), "QQQ", SubscriptionKind::LivePrice),
            None
        );

        // Auto-assignment skips the active 1001
        assert_eq!(
            mgr.reserve_request_id(None, "AAPL", SubscriptionKind::LivePrice),
            Some(1000)
        );
        assert_eq!(
            mgr.reserve_request_id(None, "MSFT", SubscriptionKind::LivePrice),
            Some(1002)
        );

        // Released ids are not handed out again in the same connection
        assert!(mgr.release(1001).is_some());
        assert_eq!(
            mgr.reserve_request_id(Some(1001), "QQQ", SubscriptionKind::LivePrice),
            None
        );
        assert!(mgr.release(1002).is_some());
        assert_eq!(
            mgr.reserve_request_id(None, "QQQ", SubscriptionKind::LivePrice),
            Some(1003)
        );
    }

    #[test]
    fn test_retired_ids_free_after_disconnect() {
        let mut mgr = manager();
        let epoch = connected(&mut mgr, 1);
        mgr.reserve_request_id(Some(1001), "SPY", SubscriptionKind::HistoricalBars);
        mgr.apply(from(epoch, Event::HistoricalDataEnd { req_id: 1001 }));
        assert!(mgr.subscription(1001).is_none());
        assert_eq!(
            mgr.reserve_request_id(Some(1001), "SPY", SubscriptionKind::LivePrice),
            None
        );

        mgr.mark_disconnected();
        connected(&mut mgr, 1);
        assert_eq!(
            mgr.reserve_request_id(Some(1001), "SPY", SubscriptionKind::LivePrice),
            Some(1001)
        );
    }

    #[test]
    fn test_open_order_cycle_prunes_terminal_orders() {
        let mut mgr = manager();
        let epoch = connected(&mut mgr, 1);
        let spec = OrderSpec::limit("SPY", Side::Buy, dec!(10), 450.0);
        mgr.record_order(1, &spec);
        mgr.record_order(2, &spec);
        mgr.reserve_request_id(None, "*", SubscriptionKind::OrderStream);

        mgr.apply(from(
            epoch,
            Event::OrderStatusUpdate {
                order_id: 1,
                status: OrderStatus::Filled,
                filled: dec!(10),
                remaining: dec!(0),
                avg_fill_price: 449.5,
            },
        ));
        assert!(mgr.order(1).is_some());

        let applied = mgr.apply(from(epoch, Event::OpenOrdersComplete));
        assert_eq!(applied.deliver, vec![Event::OpenOrdersComplete]);
        assert!(mgr.order(1).is_none());
        assert!(mgr.order(2).is_some());
        assert!(mgr.open_stream(SubscriptionKind::OrderStream).is_none());
    }

    #[test]
    fn test_ticks_only_for_active_subscriptions() {
        let mut mgr = manager();
        let epoch = connected(&mut mgr, 1);
        mgr.reserve_request_id(Some(1001), "SPY", SubscriptionKind::LivePrice);

        let tick = |req_id| Event::PriceTick {
            req_id,
            kind: TickKind::Last,
            price: 450.0,
        };
        assert_eq!(mgr.apply(from(epoch, tick(1001))).deliver.len(), 1);
        assert!(mgr.apply(from(epoch, tick(1002))).deliver.is_empty());

        mgr.release(1001);
        assert!(mgr.apply(from(epoch, tick(1001))).deliver.is_empty());
    }

    #[test]
    fn test_order_ids_survive_disconnect() {
        let mut mgr = manager();
        connected(&mut mgr, 5);
        assert_eq!(mgr.allocate_order_id(), Some(5));
        assert_eq!(mgr.allocate_order_id(), Some(6));

        mgr.mark_disconnected();
        // Broker reports a lower id after reconnect; local counter wins
        connected(&mut mgr, 5);
        assert_eq!(mgr.allocate_order_id(), Some(7));
    }

    #[test]
    fn test_no_order_id_before_broker_reports_one() {
        let mut mgr = manager();
        let epoch = mgr.begin_connect(endpoint());
        mgr.apply(from(epoch, Event::Connected { next_valid_id: None }));
        assert_eq!(mgr.allocate_order_id(), None);
    }

    #[test]
    fn test_status_regression_suppressed() {
        let mut mgr = manager();
        let epoch = connected(&mut mgr, 1);
        let spec = OrderSpec::limit("SPY", Side::Buy, dec!(10), 450.0);
        mgr.record_order(1, &spec);

        let update = |status| Event::OrderStatusUpdate {
            order_id: 1,
            status,
            filled: dec!(0),
            remaining: dec!(10),
            avg_fill_price: 0.0,
        };

        assert_eq!(mgr.apply(from(epoch, update(OrderStatus::Submitted))).deliver.len(), 1);
        assert!(mgr
            .apply(from(epoch, update(OrderStatus::PreSubmitted)))
            .deliver
            .is_empty());
        assert_eq!(mgr.order(1).map(|o| o.status), Some(OrderStatus::Submitted));

        mgr.apply(from(epoch, update(OrderStatus::Cancelled)));
        assert_eq!(mgr.open_orders().count(), 0);
    }

    #[test]
    fn test_position_snapshot_replaced_on_complete() {
        let mut mgr = manager();
        let epoch = connected(&mut mgr, 1);

        mgr.apply(from(
            epoch,
            Event::PositionUpdate(Position::new("DU1", "SPY", dec!(100), 440.0)),
        ));
        // Staged, not yet visible
        assert!(mgr.positions().is_empty());

        mgr.apply(from(epoch, Event::PositionsComplete));
        assert_eq!(mgr.positions().len(), 1);
        assert!(mgr.positions().completed_at().is_some());

        // An empty cycle clears the snapshot
        mgr.apply(from(epoch, Event::PositionsComplete));
        assert!(mgr.positions().is_empty());
    }

    #[test]
    fn test_handshake_deadline() {
        let mut mgr = LifecycleManager::new(Duration::from_millis(100));
        assert!(mgr.handshake_deadline().is_none());

        mgr.begin_connect(endpoint());
        let now = Instant::now();
        assert!(!mgr.handshake_expired(now));
        assert!(mgr.handshake_expired(now + Duration::from_millis(200)));

        mgr.mark_disconnected();
        assert!(mgr.handshake_deadline().is_none());
    }

    #[test]
    fn test_disconnect_clears_session_state() {
        let mut mgr = manager();
        let epoch = connected(&mut mgr, 3);
        mgr.apply(from(epoch, Event::AccountsReceived(vec!["DU1".into()])));
        mgr.reserve_request_id(None, "SPY", SubscriptionKind::LivePrice);

        assert!(mgr.mark_disconnected());
        assert!(!mgr.mark_disconnected());
        assert!(mgr.accounts().is_empty());
        assert_eq!(mgr.subscriptions().count(), 0);
        assert_eq!(mgr.next_order_id(), Some(3));
    }
}
