//! Shared helpers for bridge integration tests
#![allow(dead_code)]

use qs_gateway::{Bridge, BridgeConfig, Event, RawCallback, ScriptedBroker};
use std::thread;
use std::time::{Duration, Instant};

pub const PUMP_TIMEOUT: Duration = Duration::from_secs(2);

/// Handshake a TWS instance sends right after the socket opens
pub fn handshake(next_valid_id: i64) -> Vec<RawCallback> {
    vec![
        RawCallback::ConnectAck,
        RawCallback::NextValidId(next_valid_id),
        RawCallback::ManagedAccounts("DU1234567".to_string()),
    ]
}

pub fn bridge(broker: &ScriptedBroker) -> Bridge {
    Bridge::new(BridgeConfig::default(), broker.connector()).unwrap()
}

/// Drain the bridge until `done` holds for everything delivered so far,
/// or the timeout passes. Returns all delivered events.
pub fn pump_until<F>(bridge: &mut Bridge, done: F) -> Vec<Event>
where
    F: Fn(&[Event]) -> bool,
{
    let deadline = Instant::now() + PUMP_TIMEOUT;
    let mut seen = Vec::new();
    loop {
        seen.extend(bridge.process_events());
        if done(&seen) || Instant::now() >= deadline {
            return seen;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

/// Drain for a fixed period, for asserting that nothing else shows up
pub fn pump_for(bridge: &mut Bridge, period: Duration) -> Vec<Event> {
    let deadline = Instant::now() + period;
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        seen.extend(bridge.process_events());
        thread::sleep(Duration::from_millis(2));
    }
    seen.extend(bridge.process_events());
    seen
}

pub fn count(events: &[Event], kind: &str) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}

pub fn contains(events: &[Event], kind: &str) -> bool {
    count(events, kind) > 0
}

/// Connect to the scripted broker and wait for `Connected`
pub fn connect(bridge: &mut Bridge) -> Vec<Event> {
    bridge.connect("127.0.0.1", 7497, 1);
    let events = pump_until(bridge, |seen| contains(seen, "AccountsReceived"));
    assert!(bridge.is_connected(), "bridge did not connect: {:?}", events);
    events
}
