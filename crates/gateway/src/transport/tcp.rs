//! TCP connector
//!
//! Opens a socket to TWS/Gateway and splits it into a blocking reader and a
//! writer. Message framing belongs to the broker's client library and is
//! plugged in through [`WireCodec`]; this module only owns the socket.

use super::{BrokerConnector, BrokerReader, BrokerWriter, Endpoint};
use crate::error::TransportError;
use crate::messages::callback::RawCallback;
use crate::messages::request::BrokerRequest;
use log::{debug, info, warn};
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default budget for the TCP connect itself
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Encodes requests and decodes callbacks for one connection.
///
/// The codec is cloned once per connection: one copy for the reader, one for
/// the writer.
pub trait WireCodec: Clone + Send + 'static {
    /// Runs once right after the socket opens, before the reader starts.
    /// Must not read past the end of the handshake.
    fn handshake(&mut self, _stream: &mut TcpStream, _endpoint: &Endpoint) -> Result<(), TransportError> {
        Ok(())
    }

    /// Decode the next callback. `Ok(None)` on end of stream.
    fn decode(&mut self, input: &mut dyn BufRead) -> Result<Option<RawCallback>, TransportError>;

    fn encode(&mut self, request: &BrokerRequest, output: &mut dyn Write) -> Result<(), TransportError>;
}

/// Connector over `std::net::TcpStream`
pub struct TcpConnector<C: WireCodec> {
    codec: C,
    connect_timeout: Duration,
}

impl<C: WireCodec> TcpConnector<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn dial(&self, endpoint: &Endpoint) -> Result<TcpStream, TransportError> {
        let address = endpoint.address();
        let addrs: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|e| TransportError::Connection(format!("cannot resolve {}: {}", address, e)))?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(TransportError::Connection(match last_error {
            Some(e) => format!("{}: {}", address, e),
            None => format!("{}: no addresses", address),
        }))
    }
}

impl<C: WireCodec> BrokerConnector for TcpConnector<C> {
    fn open(
        &mut self,
        endpoint: &Endpoint,
    ) -> Result<(Box<dyn BrokerReader>, Box<dyn BrokerWriter>), TransportError> {
        let mut stream = self.dial(endpoint)?;
        stream.set_nodelay(true)?;

        let mut codec = self.codec.clone();
        codec.handshake(&mut stream, endpoint)?;

        let read_half = stream.try_clone()?;
        info!("TCP connection open to {}", endpoint);

        Ok((
            Box::new(TcpReader {
                input: BufReader::new(read_half),
                codec: codec.clone(),
            }),
            Box::new(TcpWriter {
                stream,
                codec,
                closed: false,
            }),
        ))
    }
}

struct TcpReader<C> {
    input: BufReader<TcpStream>,
    codec: C,
}

impl<C: WireCodec> BrokerReader for TcpReader<C> {
    fn next_message(&mut self) -> Result<Option<RawCallback>, TransportError> {
        self.codec.decode(&mut self.input)
    }
}

struct TcpWriter<C> {
    stream: TcpStream,
    codec: C,
    closed: bool,
}

impl<C: WireCodec> BrokerWriter for TcpWriter<C> {
    fn send(&mut self, request: &BrokerRequest) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::NotConnected);
        }

        let mut frame = Vec::new();
        self.codec.encode(request, &mut frame)?;
        self.stream
            .write_all(&frame)
            .and_then(|_| self.stream.flush())
            .map_err(|e| TransportError::Send(format!("{}: {}", request.name(), e)))
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Shutting down both directions makes the blocked reader return
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            warn!("Socket shutdown: {}", e);
        }
    }
}
