//! In-process broker stub
//!
//! Stands in for TWS/Gateway in tests and demos. Each opened session gets its
//! own feed channel; the test pushes raw callbacks into the current feed and
//! the session's reader hands them to the worker thread exactly as a socket
//! would. Every outbound request is recorded for inspection.

use super::{BrokerConnector, BrokerReader, BrokerWriter, Endpoint};
use crate::error::TransportError;
use crate::messages::callback::RawCallback;
use crate::messages::request::BrokerRequest;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;

/// What the stub feeds into a session
#[derive(Debug, Clone)]
enum ScriptItem {
    Callback(RawCallback),
    /// Clean close, the reader reports end of stream
    Close,
    /// Abrupt failure, the reader reports an I/O error
    Fail(String),
}

/// Produces callbacks in reply to a request, e.g. a position cycle for
/// `reqPositions`
pub type Responder = Box<dyn FnMut(&BrokerRequest) -> Vec<RawCallback> + Send>;

#[derive(Default)]
struct BrokerState {
    refuse_connections: bool,
    on_open: Vec<RawCallback>,
    feed: Option<Sender<ScriptItem>>,
    requests: Vec<BrokerRequest>,
    endpoints: Vec<Endpoint>,
    /// Sessions the broker side has closed or broken, by open order
    dropped: BTreeSet<usize>,
    responder: Option<Responder>,
}

/// Handle shared between the test and the connector it hands out
#[derive(Clone, Default)]
pub struct ScriptedBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector to hand to a `TransportSession` or `Bridge`
    pub fn connector(&self) -> ScriptedConnector {
        ScriptedConnector {
            state: Arc::clone(&self.state),
        }
    }

    /// Make `open` fail as if nothing listened on the port
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    /// Callbacks queued into every new session before the worker starts,
    /// typically the handshake (`nextValidId`, `managedAccounts`)
    pub fn on_open(&self, callbacks: Vec<RawCallback>) {
        self.state.lock().on_open = callbacks;
    }

    /// Reply to outbound requests with scripted callbacks
    pub fn respond_with<F>(&self, responder: F)
    where
        F: FnMut(&BrokerRequest) -> Vec<RawCallback> + Send + 'static,
    {
        self.state.lock().responder = Some(Box::new(responder));
    }

    /// Feed a callback into the current session. Returns false when no
    /// session is open.
    pub fn push(&self, raw: RawCallback) -> bool {
        self.feed(ScriptItem::Callback(raw))
    }

    /// Close the current session from the broker side. Later writes on it
    /// fail as on a closed socket.
    pub fn close_session(&self) -> bool {
        self.drop_session(ScriptItem::Close)
    }

    /// Break the current session with a socket-level error
    pub fn fail_session(&self, message: &str) -> bool {
        self.drop_session(ScriptItem::Fail(message.to_string()))
    }

    fn drop_session(&self, item: ScriptItem) -> bool {
        let mut state = self.state.lock();
        let Some(feed) = state.feed.take() else {
            return false;
        };
        let session = state.endpoints.len() - 1;
        state.dropped.insert(session);
        feed.send(item).is_ok()
    }

    fn feed(&self, item: ScriptItem) -> bool {
        let state = self.state.lock();
        match &state.feed {
            Some(feed) => feed.send(item).is_ok(),
            None => false,
        }
    }

    /// Every request sent so far, across sessions
    pub fn requests(&self) -> Vec<BrokerRequest> {
        self.state.lock().requests.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().endpoints.len()
    }

    /// Endpoints of every session opened so far
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.state.lock().endpoints.clone()
    }
}

/// Connector side of a [`ScriptedBroker`]
pub struct ScriptedConnector {
    state: Arc<Mutex<BrokerState>>,
}

impl BrokerConnector for ScriptedConnector {
    fn open(
        &mut self,
        endpoint: &Endpoint,
    ) -> Result<(Box<dyn BrokerReader>, Box<dyn BrokerWriter>), TransportError> {
        let mut state = self.state.lock();
        if state.refuse_connections {
            return Err(TransportError::Connection(format!(
                "connection refused by {}",
                endpoint.address()
            )));
        }

        let session = state.endpoints.len();
        let (tx, rx) = unbounded();
        for raw in &state.on_open {
            // Receiver is alive in this scope
            let _ = tx.send(ScriptItem::Callback(raw.clone()));
        }
        state.feed = Some(tx.clone());
        state.endpoints.push(endpoint.clone());
        info!("Scripted session #{} opened for {}", state.endpoints.len(), endpoint);

        Ok((
            Box::new(ScriptedReader { feed: rx }),
            Box::new(ScriptedWriter {
                state: Arc::clone(&self.state),
                session,
                feed: tx,
                closed: false,
            }),
        ))
    }
}

struct ScriptedReader {
    feed: Receiver<ScriptItem>,
}

impl BrokerReader for ScriptedReader {
    fn next_message(&mut self) -> Result<Option<RawCallback>, TransportError> {
        match self.feed.recv() {
            Ok(ScriptItem::Callback(raw)) => Ok(Some(raw)),
            Ok(ScriptItem::Close) | Err(_) => Ok(None),
            Ok(ScriptItem::Fail(message)) => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                message,
            ))),
        }
    }
}

struct ScriptedWriter {
    state: Arc<Mutex<BrokerState>>,
    session: usize,
    /// This session's own feed, so replies and shutdown never leak into a
    /// later session
    feed: Sender<ScriptItem>,
    closed: bool,
}

impl BrokerWriter for ScriptedWriter {
    fn send(&mut self, request: &BrokerRequest) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::NotConnected);
        }

        let replies = {
            let mut state = self.state.lock();
            if state.dropped.contains(&self.session) {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "connection closed by broker",
                )));
            }
            state.requests.push(request.clone());
            match state.responder.as_mut() {
                Some(responder) => responder(request),
                None => Vec::new(),
            }
        };

        for raw in replies {
            self.feed
                .send(ScriptItem::Callback(raw))
                .map_err(|e| TransportError::Send(e.to_string()))?;
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!("Scripted session shut down by client");
        let _ = self.feed.send(ScriptItem::Close);
    }
}
