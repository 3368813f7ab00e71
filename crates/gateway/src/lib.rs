//! QS Gateway
//!
//! Bridge between a trading dashboard and Interactive Brokers TWS/Gateway.
//! Provides:
//! - A transport session running the broker's blocking read loop on its own thread
//! - A callback adapter turning raw broker callbacks into typed events
//! - A thread-safe relay carrying events to the consumer in order
//! - Connection and request lifecycle tracking
//! - A command API that fails soft and reports everything as events
//!
//! ## Architecture
//!
//! ```text
//!   TWS / Gateway
//!         │ socket
//!    ┌────▼──────────────┐   worker thread (qs-session-<epoch>)
//!    │ TransportSession  │
//!    │  └ CallbackAdapter│
//!    └────┬──────────────┘
//!         │ EventRelay (mpsc, FIFO, epoch-tagged)
//!    ┌────▼──────────────┐   consumer thread
//!    │ Bridge            │──► handlers / returned events
//!    │  └ Lifecycle      │
//!    └────┬──────────────┘
//!         │ BrokerWriter
//!         ▼
//!   TWS / Gateway
//! ```
//!
//! ## Transport
//!
//! The broker's client library is a black box behind `BrokerConnector`,
//! `BrokerReader` and `BrokerWriter`. `TcpConnector` owns a real socket and
//! takes a `WireCodec` for framing; `ScriptedBroker` is an in-process stub
//! for tests and demos.

pub mod adapter;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod messages;
pub mod relay;
pub mod transport;

// Re-export commonly used types
pub use adapter::{CallbackAdapter, HANDSHAKE_TIMEOUT, TRANSPORT_FAILURE};
pub use config::{BridgeConfig, HistoricalConfig};
pub use diagnostics::{probe_endpoint, scan_well_known, ProbeOutcome, ProbeReport};
pub use dispatcher::{Bridge, HandlerFilter, HandlerId};
pub use error::{ConfigError, TransportError};
pub use lifecycle::{ConnectionState, Subscription, SubscriptionKind};
pub use messages::{
    callback::RawCallback,
    event::Event,
    request::{BrokerRequest, Contract, HistoricalWindow, MarketDataType},
};
pub use relay::{Envelope, EventRelay, Origin, RelaySender, SessionEpoch, WakeHook};
pub use transport::{
    BrokerConnector, BrokerReader, BrokerWriter, Endpoint, ScriptedBroker, ScriptedConnector,
    TcpConnector, TransportSession, WireCodec,
};
