//! Command dispatcher
//!
//! [`Bridge`] is the consumer-facing API. Commands are checked against the
//! connection state; misuse is logged and ignored, never returned as an
//! error, because the caller is an event-driven UI. Every outcome, failures
//! included, reaches the consumer as an [`Event`] on its next drain.
//!
//! ```ignore
//! let mut bridge = Bridge::new(BridgeConfig::default(), connector)?;
//! bridge.on_event(HandlerFilter::Request(1001), |event| println!("{:?}", event));
//! bridge.connect("127.0.0.1", 7497, 1);
//! // later, on the UI timer
//! for event in bridge.process_events() { /* ... */ }
//! ```

use crate::adapter::{HANDSHAKE_TIMEOUT, TRANSPORT_FAILURE};
use crate::config::BridgeConfig;
use crate::error::{ConfigError, TransportError};
use crate::lifecycle::{ConnectionState, LifecycleManager, Subscription, SubscriptionKind};
use crate::messages::event::Event;
use crate::messages::request::{BrokerRequest, Contract};
use crate::relay::{Envelope, EventRelay, SessionEpoch};
use crate::transport::{BrokerConnector, Endpoint, TransportSession};
use log::{debug, error, info, warn};
use qs_core::{OrderId, OrderSnapshot, OrderSpec, PositionSnapshot, RequestId};
use std::time::{Duration, Instant};

pub type HandlerId = u64;

/// Which events a handler receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerFilter {
    All,
    /// Only events answering this request id
    Request(RequestId),
}

impl HandlerFilter {
    fn matches(&self, event: &Event) -> bool {
        match self {
            HandlerFilter::All => true,
            HandlerFilter::Request(req_id) => event.req_id() == Some(*req_id),
        }
    }
}

type EventHandler = Box<dyn FnMut(&Event)>;

struct RegisteredHandler {
    id: HandlerId,
    filter: HandlerFilter,
    handler: EventHandler,
}

/// The broker bridge, owned by the consumer thread
pub struct Bridge {
    config: BridgeConfig,
    transport: TransportSession,
    lifecycle: LifecycleManager,
    relay: EventRelay,
    handlers: Vec<RegisteredHandler>,
    next_handler_id: HandlerId,
}

impl Bridge {
    pub fn new<C>(config: BridgeConfig, connector: C) -> Result<Self, ConfigError>
    where
        C: BrokerConnector + 'static,
    {
        Self::with_relay(config, connector, EventRelay::new())
    }

    /// Use a caller-built relay, e.g. one with a wake hook
    pub fn with_relay<C>(
        config: BridgeConfig,
        connector: C,
        relay: EventRelay,
    ) -> Result<Self, ConfigError>
    where
        C: BrokerConnector + 'static,
    {
        config.validate()?;
        Ok(Self {
            lifecycle: LifecycleManager::new(config.handshake_timeout()),
            transport: TransportSession::new(Box::new(connector)),
            relay,
            config,
            handlers: Vec::new(),
            next_handler_id: 1,
        })
    }

    // ------------------------------------------------------------------
    // Connection commands
    // ------------------------------------------------------------------

    /// Start connecting. Completion arrives later as `Connected`.
    pub fn connect(&mut self, host: &str, port: u16, client_id: i32) {
        match self.lifecycle.state() {
            ConnectionState::Connected => {
                warn!("Already connected, ignoring connect to {}:{}", host, port);
                return;
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                warn!("Abandoning pending connection attempt");
                self.disconnect();
            }
            ConnectionState::Disconnected => {}
        }

        let endpoint = Endpoint::new(host, port, client_id);
        info!("Connecting to {}", endpoint);
        let epoch = self.lifecycle.begin_connect(endpoint.clone());
        self.start_session(&endpoint, epoch);
    }

    /// Connect to the configured endpoint
    pub fn connect_default(&mut self) {
        let endpoint = self.config.endpoint();
        self.connect(&endpoint.host, endpoint.port, endpoint.client_id);
    }

    /// Close the session. Idempotent: only the first call emits `Disconnected`.
    pub fn disconnect(&mut self) {
        let closed = self.transport.disconnect();
        if self.lifecycle.mark_disconnected() {
            self.publish(Event::Disconnected);
            self.publish(Event::status(ConnectionState::Disconnected));
        } else if !closed {
            debug!("Already disconnected");
        }
    }

    /// Disconnect, then connect again with the last parameters
    pub fn reconnect(&mut self) {
        let Some(endpoint) = self.lifecycle.endpoint().cloned() else {
            warn!("Cannot reconnect: never connected");
            return;
        };

        info!("Reconnecting to {}", endpoint);
        self.disconnect();
        let epoch = self.lifecycle.begin_reconnect(endpoint.clone());
        self.start_session(&endpoint, epoch);
    }

    fn start_session(&mut self, endpoint: &Endpoint, epoch: SessionEpoch) {
        self.publish(Event::status(self.lifecycle.state()));

        if let Err(e) = self.transport.connect(endpoint, epoch, self.relay.sender()) {
            error!("Connection to {} failed: {}", endpoint, e);
            self.fail_session(e);
        }
    }

    /// Tear down after a transport failure and report it
    fn fail_session(&mut self, error: TransportError) {
        self.transport.disconnect();
        if self.lifecycle.mark_disconnected() {
            self.publish(Event::error(TRANSPORT_FAILURE, error.to_string()));
            self.publish(Event::Disconnected);
            self.publish(Event::status(ConnectionState::Disconnected));
        }
    }

    // ------------------------------------------------------------------
    // Data and order commands
    // ------------------------------------------------------------------

    /// Subscribe to live (or delayed) ticks. Returns the request id used.
    pub fn subscribe_market_data(
        &mut self,
        symbol: &str,
        req_id: Option<RequestId>,
    ) -> Option<RequestId> {
        let symbol = self.checked_symbol("subscribe_market_data", symbol)?;
        let req_id = self
            .lifecycle
            .reserve_request_id(req_id, &symbol, SubscriptionKind::LivePrice)?;

        info!("Subscribing to {} market data (reqId={})", symbol, req_id);
        let contract = self.contract(&symbol, None);
        self.send(BrokerRequest::MarketData { req_id, contract })
            .then_some(req_id)
    }

    /// Cancel a live price subscription
    pub fn unsubscribe_market_data(&mut self, req_id: RequestId) -> bool {
        if !self.require_connected("unsubscribe_market_data") {
            return false;
        }
        match self.lifecycle.subscription(req_id) {
            Some(sub) if sub.kind == SubscriptionKind::LivePrice => {}
            _ => {
                warn!("Unsubscribe ignored: reqId {} is not a live subscription", req_id);
                return false;
            }
        }

        self.lifecycle.release(req_id);
        info!("Unsubscribing reqId {}", req_id);
        self.send(BrokerRequest::CancelMarketData { req_id })
    }

    /// Request the configured historical window. Bars arrive as
    /// `HistoricalBar` events closed by `HistoricalDataEnd`.
    pub fn request_historical_data(
        &mut self,
        symbol: &str,
        req_id: Option<RequestId>,
    ) -> Option<RequestId> {
        let symbol = self.checked_symbol("request_historical_data", symbol)?;
        let req_id = self
            .lifecycle
            .reserve_request_id(req_id, &symbol, SubscriptionKind::HistoricalBars)?;

        let window = self.config.historical.window();
        info!(
            "Requesting {} of {} bars for {} (reqId={})",
            window.duration, window.bar_size, symbol, req_id
        );
        let contract = self.contract(&symbol, None);
        self.send(BrokerRequest::HistoricalData {
            req_id,
            contract,
            window,
        })
        .then_some(req_id)
    }

    /// Start a position snapshot cycle, closed by `PositionsComplete`
    pub fn request_positions(&mut self) -> bool {
        self.request_stream(SubscriptionKind::PositionStream, BrokerRequest::Positions)
    }

    /// Start an open-order snapshot cycle, closed by `OpenOrdersComplete`
    pub fn request_open_orders(&mut self) -> bool {
        self.request_stream(SubscriptionKind::OrderStream, BrokerRequest::OpenOrders)
    }

    fn request_stream(&mut self, kind: SubscriptionKind, request: BrokerRequest) -> bool {
        if !self.require_connected(request.name()) {
            return false;
        }
        if self.lifecycle.open_stream(kind).is_none() {
            self.lifecycle.reserve_request_id(None, "*", kind);
        } else {
            debug!("{} cycle already running, requesting again", request.name());
        }
        self.send(request)
    }

    /// Submit an order. Returns the order id, which is never reused, or
    /// `None` if the order was ignored or could not be sent.
    pub fn place_order(&mut self, spec: OrderSpec) -> Option<OrderId> {
        if !self.require_connected("place_order") {
            return None;
        }
        if let Err(reason) = spec.validate() {
            warn!("Order rejected locally: {}", reason);
            return None;
        }
        let Some(order_id) = self.lifecycle.allocate_order_id() else {
            warn!("Cannot place order: broker has not reported a valid order id yet");
            return None;
        };

        info!(
            "Placing order {}: {} {} {} @ {}",
            order_id,
            spec.side.as_action(),
            spec.quantity,
            spec.symbol,
            spec.order_type.as_code()
        );
        let contract = self.contract(&spec.symbol, spec.exchange.as_deref());
        let sent = self.send(BrokerRequest::PlaceOrder {
            order_id,
            contract,
            order: spec.clone(),
        });
        if !sent {
            // The id stays consumed
            warn!("Order {} was not transmitted", order_id);
            return None;
        }
        self.lifecycle.record_order(order_id, &spec);
        Some(order_id)
    }

    /// Cancel every open order of the account
    pub fn cancel_all_orders(&mut self) -> bool {
        if !self.require_connected("cancel_all_orders") {
            return false;
        }
        info!("Requesting global cancel");
        self.send(BrokerRequest::GlobalCancel)
    }

    fn require_connected(&self, command: &str) -> bool {
        if self.lifecycle.is_connected() {
            return true;
        }
        warn!(
            "{} ignored: not connected (state={})",
            command,
            self.lifecycle.state()
        );
        false
    }

    fn checked_symbol(&self, command: &str, symbol: &str) -> Option<String> {
        if !self.require_connected(command) {
            return None;
        }
        let symbol = symbol.trim();
        if symbol.is_empty() {
            warn!("{} ignored: empty symbol", command);
            return None;
        }
        Some(symbol.to_uppercase())
    }

    fn contract(&self, symbol: &str, exchange: Option<&str>) -> Contract {
        Contract::stock(
            symbol,
            exchange.unwrap_or(self.config.default_exchange.as_str()),
            self.config.currency.as_str(),
        )
    }

    fn send(&mut self, request: BrokerRequest) -> bool {
        match self.transport.send(&request) {
            Ok(()) => true,
            Err(e) => {
                error!("{} failed: {}", request.name(), e);
                self.fail_session(e);
                false
            }
        }
    }

    fn publish(&self, event: Event) {
        // The relay owns a sender, so the queue cannot be closed here
        if let Err(e) = self.relay.sender().publish_local(event) {
            error!("Dropping local event: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Event delivery
    // ------------------------------------------------------------------

    /// Register a handler. Handlers run inside `process_events`, in
    /// registration order.
    pub fn on_event<F>(&mut self, filter: HandlerFilter, handler: F) -> HandlerId
    where
        F: FnMut(&Event) + 'static,
    {
        let id = self.next_handler_id;
        self.next_handler_id += 1;
        self.handlers.push(RegisteredHandler {
            id,
            filter,
            handler: Box::new(handler),
        });
        id
    }

    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.id != id);
        self.handlers.len() != before
    }

    /// Drain the relay: apply each event to the client state, run matching
    /// handlers, and return what was delivered, in order.
    pub fn process_events(&mut self) -> Vec<Event> {
        let mut delivered = Vec::new();
        self.drain_into(&mut delivered);
        if self.check_handshake(Instant::now()) {
            self.drain_into(&mut delivered);
        }
        delivered
    }

    /// Wait until at least one envelope arrives or `timeout` passes, then
    /// process everything queued. Wakes early for the handshake deadline.
    pub async fn wait_for_events(&mut self, timeout: Duration) -> Vec<Event> {
        let mut delivered = self.process_events();
        if !delivered.is_empty() {
            return delivered;
        }

        let mut deadline = tokio::time::Instant::now() + timeout;
        if let Some(handshake) = self.lifecycle.handshake_deadline() {
            deadline = deadline.min(tokio::time::Instant::from_std(handshake));
        }

        if let Ok(Some(envelope)) = tokio::time::timeout_at(deadline, self.relay.next()).await {
            self.dispatch(envelope, &mut delivered);
        }
        delivered.extend(self.process_events());
        delivered
    }

    fn drain_into(&mut self, delivered: &mut Vec<Event>) {
        while let Some(envelope) = self.relay.try_next() {
            self.dispatch(envelope, delivered);
        }
    }

    fn dispatch(&mut self, envelope: Envelope, delivered: &mut Vec<Event>) {
        let applied = self.lifecycle.apply(envelope);

        if applied.teardown {
            self.transport.disconnect();
        }
        if applied.connected {
            self.send(BrokerRequest::MarketDataType(self.config.market_data_type));
        }

        for event in applied.deliver {
            for registered in self.handlers.iter_mut() {
                if registered.filter.matches(&event) {
                    (registered.handler)(&event);
                }
            }
            delivered.push(event);
        }
    }

    fn check_handshake(&mut self, now: Instant) -> bool {
        if !self.lifecycle.handshake_expired(now) {
            return false;
        }

        let budget = self.lifecycle.handshake_timeout();
        warn!("No acknowledgement within {} ms, giving up", budget.as_millis());
        self.transport.disconnect();
        self.lifecycle.mark_disconnected();
        self.publish(Event::error(
            HANDSHAKE_TIMEOUT,
            format!("No connection acknowledgement within {} ms", budget.as_millis()),
        ));
        self.publish(Event::Disconnected);
        self.publish(Event::status(ConnectionState::Disconnected));
        true
    }

    // ------------------------------------------------------------------
    // Read-only accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    pub fn is_connected(&self) -> bool {
        self.lifecycle.is_connected()
    }

    pub fn accounts(&self) -> &[String] {
        self.lifecycle.accounts()
    }

    pub fn next_order_id(&self) -> Option<OrderId> {
        self.lifecycle.next_order_id()
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.lifecycle.subscriptions()
    }

    pub fn order(&self, order_id: OrderId) -> Option<&OrderSnapshot> {
        self.lifecycle.order(order_id)
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &OrderSnapshot> {
        self.lifecycle.open_orders()
    }

    pub fn positions(&self) -> &PositionSnapshot {
        self.lifecycle.positions()
    }

    /// Parameters of the last connect
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.lifecycle.endpoint()
    }

    /// Envelopes waiting for the next drain
    pub fn pending_events(&self) -> usize {
        self.relay.pending()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::callback::RawCallback;
    use crate::transport::ScriptedBroker;
    use qs_core::Side;
    use rust_decimal_macros::dec;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn bridge(broker: &ScriptedBroker) -> Bridge {
        Bridge::new(BridgeConfig::default(), broker.connector()).unwrap()
    }

    /// Drain until `done` holds for the delivered events or a second passes
    fn pump_until(bridge: &mut Bridge, done: impl Fn(&[Event]) -> bool) -> Vec<Event> {
        let deadline = Instant::now() + Duration::from_secs(1);
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            seen.extend(bridge.process_events());
            if done(&seen) {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        seen
    }

    fn has_connected(events: &[Event]) -> bool {
        events.iter().any(|e| matches!(e, Event::Connected { .. }))
    }

    #[test]
    fn test_commands_ignored_while_disconnected() {
        let broker = ScriptedBroker::new();
        let mut bridge = bridge(&broker);

        assert_eq!(bridge.subscribe_market_data("SPY", Some(1001)), None);
        assert!(!bridge.request_positions());
        assert_eq!(
            bridge.place_order(OrderSpec::market("SPY", Side::Buy, dec!(1))),
            None
        );
        assert!(!bridge.cancel_all_orders());
        assert!(bridge.process_events().is_empty());
        assert!(broker.requests().is_empty());
    }

    #[test]
    fn test_connect_sends_market_data_type_once_ready() {
        let broker = ScriptedBroker::new();
        broker.on_open(vec![
            RawCallback::ConnectAck,
            RawCallback::NextValidId(1),
            RawCallback::ManagedAccounts("DU123".to_string()),
        ]);
        let mut bridge = bridge(&broker);

        bridge.connect("127.0.0.1", 7497, 1);
        assert_eq!(bridge.state(), ConnectionState::Connecting);
        let events = pump_until(&mut bridge, |seen| {
            seen.iter().any(|e| matches!(e, Event::AccountsReceived(_)))
        });

        let connected = events
            .iter()
            .filter(|e| matches!(e, Event::Connected { .. }))
            .count();
        assert_eq!(connected, 1);
        assert_eq!(bridge.state(), ConnectionState::Connected);
        assert_eq!(bridge.accounts(), ["DU123".to_string()]);
        assert_eq!(bridge.next_order_id(), Some(1));
        assert_eq!(
            broker.requests(),
            vec![BrokerRequest::MarketDataType(
                crate::messages::request::MarketDataType::Delayed
            )]
        );
    }

    #[test]
    fn test_refused_connect_reports_transport_failure() {
        let broker = ScriptedBroker::new();
        broker.refuse_connections(true);
        let mut bridge = bridge(&broker);

        bridge.connect("127.0.0.1", 7497, 1);
        let events = bridge.process_events();
        assert_eq!(events[0], Event::status(ConnectionState::Connecting));
        assert!(matches!(
            events[1],
            Event::Error { code: TRANSPORT_FAILURE, .. }
        ));
        assert_eq!(events[2], Event::Disconnected);
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_handshake_timeout() {
        let broker = ScriptedBroker::new();
        let config = BridgeConfig::default().with_handshake_timeout(Duration::from_millis(20));
        let mut bridge = Bridge::new(config, broker.connector()).unwrap();

        bridge.connect("127.0.0.1", 7497, 1);
        std::thread::sleep(Duration::from_millis(40));
        let events = bridge.process_events();

        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Error { code: HANDSHAKE_TIMEOUT, .. })));
        assert_eq!(bridge.state(), ConnectionState::Disconnected);

        // A late acknowledgement from the abandoned session changes nothing
        broker.push(RawCallback::NextValidId(1));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!has_connected(&bridge.process_events()));
    }

    #[test]
    fn test_request_filter_handlers() {
        let broker = ScriptedBroker::new();
        broker.on_open(vec![RawCallback::NextValidId(1)]);
        let mut bridge = bridge(&broker);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let handler = bridge.on_event(HandlerFilter::Request(1001), move |event| {
            sink.borrow_mut().push(event.clone());
        });

        bridge.connect("127.0.0.1", 7497, 1);
        pump_until(&mut bridge, has_connected);
        assert_eq!(bridge.subscribe_market_data("spy", Some(1001)), Some(1001));
        assert_eq!(bridge.subscribe_market_data("QQQ", None), Some(1000));

        broker.push(RawCallback::TickPrice {
            req_id: 1000,
            tick_type: 4,
            price: 380.0,
        });
        broker.push(RawCallback::TickPrice {
            req_id: 1001,
            tick_type: 4,
            price: 450.0,
        });
        pump_until(&mut bridge, |seen| {
            seen.iter().filter(|e| e.kind() == "PriceTick").count() == 2
        });

        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].req_id(), Some(1001));
        assert!(bridge.remove_handler(handler));
        assert!(!bridge.remove_handler(handler));

        // The subscription was registered under the normalised symbol
        assert!(broker.requests().iter().any(|r| matches!(
            r,
            BrokerRequest::MarketData { req_id: 1001, contract } if contract.symbol == "SPY"
        )));
    }

    #[test]
    fn test_unsubscribe_unknown_id_ignored() {
        let broker = ScriptedBroker::new();
        broker.on_open(vec![RawCallback::NextValidId(1)]);
        let mut bridge = bridge(&broker);
        bridge.connect("127.0.0.1", 7497, 1);
        pump_until(&mut bridge, has_connected);

        assert!(!bridge.unsubscribe_market_data(4242));
        let req_id = bridge.subscribe_market_data("SPY", None);
        assert_eq!(req_id, Some(1000));
        assert!(bridge.unsubscribe_market_data(1000));
        assert!(!bridge.unsubscribe_market_data(1000));
        assert_eq!(bridge.subscriptions().count(), 0);
    }

    #[test]
    fn test_place_order_uses_default_exchange() {
        let broker = ScriptedBroker::new();
        broker.on_open(vec![RawCallback::NextValidId(10)]);
        let mut bridge = bridge(&broker);
        bridge.connect("127.0.0.1", 7497, 1);
        pump_until(&mut bridge, has_connected);

        let limit = OrderSpec::limit("SPY", Side::Buy, dec!(5), 450.0);
        assert_eq!(bridge.place_order(limit), Some(10));
        let routed = OrderSpec::market("AAPL", Side::Sell, dec!(1)).with_exchange("ISLAND");
        assert_eq!(bridge.place_order(routed), Some(11));

        // Invalid orders never consume an id
        assert_eq!(
            bridge.place_order(OrderSpec::market("SPY", Side::Buy, dec!(0))),
            None
        );
        assert_eq!(bridge.next_order_id(), Some(12));

        let exchanges: Vec<String> = broker
            .requests()
            .into_iter()
            .filter_map(|r| match r {
                BrokerRequest::PlaceOrder { contract, .. } => Some(contract.exchange),
                _ => None,
            })
            .collect();
        assert_eq!(exchanges, vec!["SMART".to_string(), "ISLAND".to_string()]);
        assert_eq!(bridge.open_orders().count(), 2);
    }
}
