//! Transport session - one worker thread per live connection
//!
//! `connect` opens the socket through the connector and starts the blocking
//! message loop on a dedicated thread, then returns without waiting for the
//! broker's acknowledgement. `disconnect` closes the socket, which makes the
//! worker's blocking read return. A retired worker is joined before the next
//! session starts, so two sessions never produce events at the same time.

use super::{BrokerConnector, BrokerReader, BrokerWriter, Endpoint};
use crate::adapter::{CallbackAdapter, TRANSPORT_FAILURE};
use crate::error::TransportError;
use crate::messages::callback::RawCallback;
use crate::messages::event::Event;
use crate::messages::request::BrokerRequest;
use crate::relay::{RelaySender, SessionEpoch};
use log::{debug, error, info, trace, warn};
use std::thread::{self, JoinHandle};

/// Body of the worker thread
pub struct SessionWorker {
    epoch: SessionEpoch,
    reader: Box<dyn BrokerReader>,
    adapter: CallbackAdapter,
    relay: RelaySender,
}

impl SessionWorker {
    pub fn new(epoch: SessionEpoch, reader: Box<dyn BrokerReader>, relay: RelaySender) -> Self {
        Self {
            epoch,
            reader,
            adapter: CallbackAdapter::new(epoch),
            relay,
        }
    }

    /// Blocks until the connection closes. Every decoded message goes through
    /// the adapter and into the relay, in arrival order.
    pub fn run(mut self) {
        info!("[session {}] Message loop started", self.epoch);

        loop {
            match self.reader.next_message() {
                Ok(Some(raw)) => {
                    trace!("[session {}] <- {}", self.epoch, raw.name());
                    let closing = matches!(raw, RawCallback::ConnectionClosed);
                    if let Some(event) = self.adapter.translate(raw) {
                        if !self.forward(event) {
                            break;
                        }
                    }
                    if closing {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("[session {}] Socket closed", self.epoch);
                    if let Some(event) = self.adapter.translate(RawCallback::ConnectionClosed) {
                        self.forward(event);
                    }
                    break;
                }
                Err(e) => {
                    error!("[session {}] Transport failure: {}", self.epoch, e);
                    if self.forward(Event::error(TRANSPORT_FAILURE, e.to_string())) {
                        self.forward(Event::Disconnected);
                    }
                    break;
                }
            }
        }

        info!("[session {}] Message loop exited", self.epoch);
    }

    fn forward(&self, event: Event) -> bool {
        match self.relay.publish(self.epoch, event) {
            Ok(()) => true,
            Err(e) => {
                warn!("[session {}] Consumer gone, stopping: {}", self.epoch, e);
                false
            }
        }
    }
}

struct ActiveSession {
    epoch: SessionEpoch,
    endpoint: Endpoint,
    writer: Box<dyn BrokerWriter>,
    worker: JoinHandle<()>,
}

/// Owns the connector, the live session's writer and its worker thread
pub struct TransportSession {
    connector: Box<dyn BrokerConnector>,
    active: Option<ActiveSession>,
    /// Workers whose socket was closed but that have not been joined yet
    retired: Vec<(SessionEpoch, JoinHandle<()>)>,
}

impl TransportSession {
    pub fn new(connector: Box<dyn BrokerConnector>) -> Self {
        Self {
            connector,
            active: None,
            retired: Vec::new(),
        }
    }

    /// Open a connection and start its worker thread.
    ///
    /// Any running session is torn down and its worker joined first.
    /// Fails with `TransportError::Connection` if the socket cannot be opened.
    pub fn connect(
        &mut self,
        endpoint: &Endpoint,
        epoch: SessionEpoch,
        relay: RelaySender,
    ) -> Result<(), TransportError> {
        if self.active.is_some() {
            warn!("Session still active, tearing it down before connecting");
        }
        self.disconnect();
        self.join_retired();

        let (reader, writer) = self.connector.open(endpoint)?;
        let worker = SessionWorker::new(epoch, reader, relay);

        let handle = thread::Builder::new()
            .name(format!("qs-session-{}", epoch))
            .spawn(move || worker.run())
            .map_err(|e| TransportError::Connection(format!("failed to spawn worker: {}", e)))?;

        info!("[session {}] Started for {}", epoch, endpoint);
        self.active = Some(ActiveSession {
            epoch,
            endpoint: endpoint.clone(),
            writer,
            worker: handle,
        });
        Ok(())
    }

    /// Send a request on the live connection
    pub fn send(&mut self, request: &BrokerRequest) -> Result<(), TransportError> {
        let active = self.active.as_mut().ok_or(TransportError::NotConnected)?;
        debug!("[session {}] -> {}", active.epoch, request.name());
        active.writer.send(request)
    }

    /// Close the socket. The worker exits on its own shortly after; it is
    /// joined before the next session starts. Idempotent.
    pub fn disconnect(&mut self) -> bool {
        let Some(mut active) = self.active.take() else {
            return false;
        };
        info!("[session {}] Closing connection to {}", active.epoch, active.endpoint);
        active.writer.shutdown();
        self.retired.push((active.epoch, active.worker));
        true
    }

    fn join_retired(&mut self) {
        for (epoch, handle) in self.retired.drain(..) {
            if handle.join().is_err() {
                error!("[session {}] Worker thread panicked", epoch);
            } else {
                debug!("[session {}] Worker joined", epoch);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Epoch of the live session
    pub fn epoch(&self) -> Option<SessionEpoch> {
        self.active.as_ref().map(|a| a.epoch)
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.disconnect();
        self.join_retired();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{EventRelay, Origin};
    use crate::transport::scripted::ScriptedBroker;
    use std::time::{Duration, Instant};

    fn wait_for(relay: &EventRelay, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while relay.pending() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_worker_forwards_in_arrival_order() {
        let broker = ScriptedBroker::new();
        let mut relay = EventRelay::new();
        let mut session = TransportSession::new(Box::new(broker.connector()));

        session
            .connect(&Endpoint::new("127.0.0.1", 7497, 1), 1, relay.sender())
            .unwrap();
        broker.push(RawCallback::NextValidId(1));
        broker.push(RawCallback::ManagedAccounts("DU1".to_string()));
        wait_for(&relay, 2);

        let kinds: Vec<&str> = relay.drain().iter().map(|e| e.event.kind()).collect();
        assert_eq!(kinds, vec!["Connected", "AccountsReceived"]);
    }

    #[test]
    fn test_disconnect_ends_worker_and_is_idempotent() {
        let broker = ScriptedBroker::new();
        let mut relay = EventRelay::new();
        let mut session = TransportSession::new(Box::new(broker.connector()));

        session
            .connect(&Endpoint::new("127.0.0.1", 7497, 1), 4, relay.sender())
            .unwrap();
        assert!(session.disconnect());
        assert!(!session.disconnect());
        assert!(!session.is_active());

        wait_for(&relay, 1);
        let envelopes = relay.drain();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].origin, Origin::Session(4));
        assert_eq!(envelopes[0].event, Event::Disconnected);
    }

    #[test]
    fn test_refused_connection() {
        let broker = ScriptedBroker::new();
        broker.refuse_connections(true);
        let relay = EventRelay::new();
        let mut session = TransportSession::new(Box::new(broker.connector()));

        let result = session.connect(&Endpoint::new("127.0.0.1", 7497, 1), 1, relay.sender());
        assert!(matches!(result, Err(TransportError::Connection(_))));
        assert!(!session.is_active());
        assert!(matches!(
            session.send(&BrokerRequest::Positions),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_transport_failure_reported() {
        let broker = ScriptedBroker::new();
        let mut relay = EventRelay::new();
        let mut session = TransportSession::new(Box::new(broker.connector()));

        session
            .connect(&Endpoint::new("127.0.0.1", 7497, 1), 2, relay.sender())
            .unwrap();
        broker.fail_session("connection reset by peer");
        wait_for(&relay, 2);

        let events: Vec<Event> = relay.drain().into_iter().map(|e| e.event).collect();
        assert!(matches!(
            &events[0],
            Event::Error { code, .. } if *code == TRANSPORT_FAILURE
        ));
        assert_eq!(events[1], Event::Disconnected);
    }
}
