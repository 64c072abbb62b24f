//! Blocking socket transport: whole-buffer reads and writes over one connection.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::observability::metrics;
use bytes::{Bytes, BytesMut};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Byte transfer to a single broker endpoint.
///
/// `read` and `write` move whole buffers; implementations hide partial I/O.
pub trait Transport {
    /// Open a new connection, replacing any existing one.
    fn connect(&mut self) -> Result<()>;

    /// Close the connection. Never fails; afterwards there is no connection.
    fn disconnect(&mut self);

    fn reconnect(&mut self) -> Result<()> {
        self.disconnect();
        self.connect()
    }

    /// Block until exactly `len` bytes have been received.
    fn read(&mut self, len: usize) -> Result<Bytes>;

    /// Block until all of `data` has been sent; returns the bytes written.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    fn is_connected(&self) -> bool;
}

/// Opens fresh streams to one endpoint.
pub trait Connector {
    type Stream: Read + Write;

    fn connect(&mut self) -> io::Result<Self::Stream>;

    /// Endpoint description for logs and errors.
    fn addr(&self) -> String;

    /// Close a stream; errors are reported but callers ignore them.
    fn close(&mut self, stream: Self::Stream) -> io::Result<()> {
        drop(stream);
        Ok(())
    }
}

/// TCP connector with socket timeouts.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            connect_timeout: config.connect_timeout(),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn open(&self) -> io::Result<TcpStream> {
        let Some(timeout) = self.connect_timeout else {
            return TcpStream::connect((self.host.as_str(), self.port));
        };
        let mut last_err = None;
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(ErrorKind::NotFound, "host resolved to no addresses")
        }))
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&mut self) -> io::Result<TcpStream> {
        let stream = self.open()?;
        stream.set_read_timeout(self.read_timeout)?;
        stream.set_write_timeout(self.write_timeout)?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn close(&mut self, stream: TcpStream) -> io::Result<()> {
        stream.shutdown(Shutdown::Both)
    }
}

/// [`Transport`] over streams produced by a [`Connector`].
pub struct SocketTransport<C: Connector> {
    connector: C,
    stream: Option<C::Stream>,
}

/// The production transport.
pub type TcpTransport = SocketTransport<TcpConnector>;

impl<C: Connector> SocketTransport<C> {
    /// Wrap `connector` without connecting; the first write connects.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            stream: None,
        }
    }

    /// Wrap `connector` and open the first connection.
    pub fn open(connector: C) -> Result<Self> {
        let mut transport = Self::new(connector);
        transport.connect()?;
        Ok(transport)
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn connection_error(&self, source: io::Error) -> ClientError {
        ClientError::Connection {
            addr: self.connector.addr(),
            source,
        }
    }

    /// One full pass over `data`, looping on short writes.
    fn write_once(&mut self, data: &[u8]) -> io::Result<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::from(ErrorKind::NotConnected))?;
        let mut written = 0;
        while written < data.len() {
            match stream.write(&data[written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::WriteZero,
                        "socket accepted no bytes",
                    ))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        stream.flush()?;
        Ok(written)
    }
}

impl<C: Connector> Transport for SocketTransport<C> {
    fn connect(&mut self) -> Result<()> {
        self.disconnect();
        let stream = self
            .connector
            .connect()
            .map_err(|e| self.connection_error(e))?;
        info!(addr = %self.connector.addr(), "connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = self.connector.close(stream) {
                debug!(addr = %self.connector.addr(), error = %e, "error closing socket (ignored)");
            }
            info!(addr = %self.connector.addr(), "disconnected");
        }
    }

    fn reconnect(&mut self) -> Result<()> {
        metrics().record_reconnect();
        self.disconnect();
        self.connect()
    }

    fn read(&mut self, len: usize) -> Result<Bytes> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let mut buf = BytesMut::zeroed(len);
        match fill(stream, &mut buf) {
            Ok(()) => Ok(buf.freeze()),
            Err(e) => {
                if matches!(e, ClientError::Timeout) {
                    warn!(addr = %self.connector.addr(), len, "read timed out; disconnecting");
                    metrics().record_read_timeout();
                }
                // The frame boundary is lost once a read fails part-way.
                self.disconnect();
                Err(e)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.stream.is_none() {
            self.connect()?;
        }
        match self.write_once(data) {
            Ok(n) => Ok(n),
            Err(e) if ClientError::is_reset(&e) => {
                warn!(addr = %self.connector.addr(), error = %e, "write failed; reconnecting once");
                self.reconnect()?;
                self.write_once(data).map_err(|e| {
                    self.disconnect();
                    self.connection_error(e)
                })
            }
            Err(e) => {
                self.disconnect();
                Err(ClientError::Io(e))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Fill `buf` completely from `stream`, looping on short reads.
fn fill<S: Read>(stream: &mut S, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(ClientError::ConnectionClosed {
                    received: filled,
                    expected: buf.len(),
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(ClientError::Timeout)
            }
            Err(e) => return Err(ClientError::Io(e)),
        }
    }
    Ok(())
}
