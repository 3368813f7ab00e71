//! Connectivity diagnostics
//!
//! Raw socket probes of TWS/Gateway ports, independent of any session. A
//! port that accepts the connection is only known to be listening; whether
//! the broker accepts API clients shows up later as a handshake.

use crate::transport::{port_label, WELL_KNOWN_PORTS};
use log::{debug, info};
use serde::Serialize;
use std::fmt;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Largest banner read from an open port
const BANNER_LIMIT: usize = 1024;

/// Bytes shown when a banner is displayed
const BANNER_PREVIEW: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ProbeOutcome {
    /// Connection accepted. `banner` holds whatever the peer sent first,
    /// `None` if nothing arrived before the timeout or no read was attempted.
    Open { banner: Option<Vec<u8>> },
    Refused,
    TimedOut,
    Unresolvable(String),
    Failed(String),
}

impl ProbeOutcome {
    pub fn is_open(&self) -> bool {
        matches!(self, ProbeOutcome::Open { .. })
    }
}

/// Result of probing one `host:port`
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub host: String,
    pub port: u16,
    pub label: Option<&'static str>,
    pub outcome: ProbeOutcome,
    pub elapsed: Duration,
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)?;
        if let Some(label) = self.label {
            write!(f, " ({})", label)?;
        }
        write!(f, " - ")?;
        match &self.outcome {
            ProbeOutcome::Open { banner: Some(bytes) } => {
                let preview = &bytes[..bytes.len().min(BANNER_PREVIEW)];
                write!(
                    f,
                    "open, {} bytes received: {}",
                    bytes.len(),
                    String::from_utf8_lossy(preview).escape_debug()
                )?;
            }
            ProbeOutcome::Open { banner: None } => write!(f, "open, no data received")?,
            ProbeOutcome::Refused => write!(f, "refused")?,
            ProbeOutcome::TimedOut => write!(f, "timed out")?,
            ProbeOutcome::Unresolvable(e) => write!(f, "cannot resolve host: {}", e)?,
            ProbeOutcome::Failed(e) => write!(f, "failed: {}", e)?,
        }
        write!(f, " [{} ms]", self.elapsed.as_millis())
    }
}

/// Probe one port. With `read_banner`, waits up to `timeout` for the peer's
/// first bytes after connecting.
pub fn probe_endpoint(host: &str, port: u16, timeout: Duration, read_banner: bool) -> ProbeReport {
    let started = Instant::now();
    let outcome = probe(host, port, timeout, read_banner);
    let report = ProbeReport {
        host: host.to_string(),
        port,
        label: port_label(port),
        outcome,
        elapsed: started.elapsed(),
    };
    info!("Probe {}", report);
    report
}

/// Probe every well-known TWS/Gateway port on `host`
pub fn scan_well_known(host: &str, timeout: Duration, read_banner: bool) -> Vec<ProbeReport> {
    WELL_KNOWN_PORTS
        .iter()
        .map(|(port, _)| probe_endpoint(host, *port, timeout, read_banner))
        .collect()
}

fn probe(host: &str, port: u16, timeout: Duration, read_banner: bool) -> ProbeOutcome {
    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => return ProbeOutcome::Unresolvable(e.to_string()),
    };
    let Some(addr) = addrs.first() else {
        return ProbeOutcome::Unresolvable(format!("no addresses for {}", host));
    };

    let mut stream = match TcpStream::connect_timeout(addr, timeout) {
        Ok(stream) => stream,
        Err(e) => return classify(e),
    };
    debug!("Connected to {}", addr);

    if !read_banner {
        return ProbeOutcome::Open { banner: None };
    }

    if let Err(e) = stream.set_read_timeout(Some(timeout)) {
        return ProbeOutcome::Failed(e.to_string());
    }
    let mut buf = vec![0u8; BANNER_LIMIT];
    match stream.read(&mut buf) {
        Ok(0) => ProbeOutcome::Open { banner: None },
        Ok(n) => {
            buf.truncate(n);
            ProbeOutcome::Open { banner: Some(buf) }
        }
        Err(e) if is_timeout(&e) => ProbeOutcome::Open { banner: None },
        Err(e) => ProbeOutcome::Failed(format!("receive error: {}", e)),
    }
}

fn classify(error: io::Error) -> ProbeOutcome {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => ProbeOutcome::Refused,
        _ if is_timeout(&error) => ProbeOutcome::TimedOut,
        _ => ProbeOutcome::Failed(error.to_string()),
    }
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
