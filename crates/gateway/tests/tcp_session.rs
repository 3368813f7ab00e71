//! Integration test: Bridge over a real loopback socket
//!
//! A fake broker speaks a line-based text protocol through a test codec;
//! the bridge does not know the difference.

mod common;

use common::{contains, pump_until};
use qs_gateway::{
    Bridge, BridgeConfig, BrokerRequest, ConnectionState, Endpoint, Event, RawCallback,
    TcpConnector, TransportError, WireCodec,
};
use rust_decimal::Decimal;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

/// One message per line, fields separated by `|`
#[derive(Clone, Default)]
struct LineCodec;

impl WireCodec for LineCodec {
    fn handshake(&mut self, stream: &mut TcpStream, endpoint: &Endpoint) -> Result<(), TransportError> {
        writeln!(stream, "hello|{}", endpoint.client_id)?;
        Ok(())
    }

    fn decode(&mut self, input: &mut dyn BufRead) -> Result<Option<RawCallback>, TransportError> {
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let fields: Vec<&str> = line.trim_end().split('|').collect();
        let bad = || TransportError::Decode(line.clone());

        let raw = match fields.as_slice() {
            ["nextValidId", id] => RawCallback::NextValidId(id.parse().map_err(|_| bad())?),
            ["accounts", list] => RawCallback::ManagedAccounts(list.to_string()),
            ["position", account, symbol, qty, cost] => RawCallback::Position {
                account: account.to_string(),
                symbol: symbol.to_string(),
                quantity: Decimal::from_str(qty).map_err(|_| bad())?,
                avg_cost: cost.parse().map_err(|_| bad())?,
            },
            ["positionEnd"] => RawCallback::PositionEnd,
            _ => return Err(bad()),
        };
        Ok(Some(raw))
    }

    fn encode(&mut self, request: &BrokerRequest, output: &mut dyn Write) -> Result<(), TransportError> {
        writeln!(output, "{}", request.name())?;
        Ok(())
    }
}

/// Accepts one client, answers the handshake and a position request, then
/// returns every line the client sent once the client hangs up.
fn fake_broker(listener: TcpListener) -> thread::JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        let mut writer = socket.try_clone().unwrap();
        let reader = BufReader::new(socket);
        let mut received = Vec::new();

        for line in reader.lines() {
            let Ok(line) = line else { break };
            match line.as_str() {
                l if l.starts_with("hello|") => {
                    writer.write_all(b"nextValidId|7\naccounts|DU1,DU2\n").unwrap();
                }
                "reqPositions" => {
                    writer
                        .write_all(b"position|DU1|SPY|100|440.5\npositionEnd\n")
                        .unwrap();
                }
                _ => {}
            }
            received.push(line);
        }
        received
    })
}

#[test]
fn test_bridge_over_tcp() {
    let _ = env_logger::try_init();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = fake_broker(listener);

    let connector = TcpConnector::new(LineCodec).with_connect_timeout(Duration::from_secs(1));
    let mut bridge = Bridge::new(BridgeConfig::default().with_port(port), connector).unwrap();

    bridge.connect_default();
    let events = pump_until(&mut bridge, |seen| contains(seen, "AccountsReceived"));
    assert!(contains(&events, "Connected"));
    assert_eq!(bridge.accounts(), ["DU1".to_string(), "DU2".to_string()]);
    assert_eq!(bridge.next_order_id(), Some(7));

    assert!(bridge.request_positions());
    pump_until(&mut bridge, |seen| contains(seen, "PositionsComplete"));
    assert_eq!(bridge.positions().len(), 1);

    bridge.disconnect();
    let received = server.join().unwrap();
    assert_eq!(
        received,
        vec!["hello|1", "reqMarketDataType", "reqPositions"]
    );
    assert_eq!(bridge.state(), ConnectionState::Disconnected);
}

#[test]
fn test_nothing_listening() {
    let _ = env_logger::try_init();

    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let connector = TcpConnector::new(LineCodec).with_connect_timeout(Duration::from_millis(500));
    let mut bridge = Bridge::new(BridgeConfig::default(), connector).unwrap();

    bridge.connect("127.0.0.1", port, 1);
    let events = bridge.process_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Error { code: -1, .. })));
    assert!(events.contains(&Event::Disconnected));
    assert_eq!(bridge.state(), ConnectionState::Disconnected);
}
