//! Transport abstraction layer
//!
//! The broker's client library is a black box behind three traits:
//! a [`BrokerConnector`] opens a connection and splits it into a blocking
//! [`BrokerReader`] (driven by the session's worker thread) and a
//! [`BrokerWriter`] (used from the consumer thread to send requests and to
//! close the socket).
//!
//! Implementations:
//! - [`tcp::TcpConnector`]: TCP socket, framing delegated to a [`tcp::WireCodec`]
//! - [`scripted::ScriptedBroker`]: in-process broker stub for tests and demos

pub mod scripted;
pub mod session;
pub mod tcp;

pub use scripted::{ScriptedBroker, ScriptedConnector};
pub use session::{SessionWorker, TransportSession};
pub use tcp::{TcpConnector, WireCodec};

use crate::error::TransportError;
use crate::messages::callback::RawCallback;
use crate::messages::request::BrokerRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// TWS paper trading port
pub const TWS_PAPER_PORT: u16 = 7497;
/// TWS live trading port
pub const TWS_LIVE_PORT: u16 = 7496;
/// IB Gateway paper trading port
pub const GATEWAY_PAPER_PORT: u16 = 4002;
/// IB Gateway live trading port
pub const GATEWAY_LIVE_PORT: u16 = 4001;

/// Well-known broker ports with a human label
pub const WELL_KNOWN_PORTS: [(u16, &str); 4] = [
    (TWS_PAPER_PORT, "TWS paper"),
    (TWS_LIVE_PORT, "TWS live"),
    (GATEWAY_PAPER_PORT, "Gateway paper"),
    (GATEWAY_LIVE_PORT, "Gateway live"),
];

/// Label of a well-known port, if it is one
pub fn port_label(port: u16) -> Option<&'static str> {
    WELL_KNOWN_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, label)| *label)
}

/// Where to connect and as which client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub client_id: i32,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, client_id: i32) -> Self {
        Self {
            host: host.into(),
            port,
            client_id,
        }
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (clientId={})", self.host, self.port, self.client_id)
    }
}

/// Opens connections to the broker
pub trait BrokerConnector: Send {
    /// Open the socket and perform whatever handshake the client library
    /// needs before messages can flow. Must not wait for the broker's
    /// connection acknowledgement; that arrives later as a callback.
    fn open(
        &mut self,
        endpoint: &Endpoint,
    ) -> Result<(Box<dyn BrokerReader>, Box<dyn BrokerWriter>), TransportError>;
}

/// Blocking inbound half of a connection, owned by the worker thread
pub trait BrokerReader: Send {
    /// Block until the next decoded callback arrives.
    /// `Ok(None)` means the connection closed cleanly.
    fn next_message(&mut self) -> Result<Option<RawCallback>, TransportError>;
}

/// Outbound half of a connection, owned by the consumer thread
pub trait BrokerWriter: Send {
    fn send(&mut self, request: &BrokerRequest) -> Result<(), TransportError>;

    /// Close the connection so the reader unblocks. Idempotent.
    fn shutdown(&mut self);
}
