//! Reliable byte transport over a single TCP stream.
//!
//! The connection knows nothing about frames. It moves byte buffers with an
//! explicit retry budget and tells an orderly shutdown by the peer apart
//! from every other failure.

use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{Direction, TransferCause, TransportError};
use crate::fmt_hex;

/// Command port of the Ultimate 1541 listener
pub const DEFAULT_PORT: u16 = 64;

/// Life cycle of a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    /// The peer shut the stream down. A new connection is needed.
    Closed,
}

/// Outcome of a single `try_send` / `try_recv` call
#[derive(Debug)]
pub enum Transfer {
    /// Bytes moved, possibly fewer than requested
    Moved(usize),
    /// The first transfer call returned zero bytes
    Closed,
    /// The first transfer call failed
    Failed(io::Error),
}

/// Socket options applied on connect
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Give up connecting after this long (None blocks until the OS gives up)
    pub timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            timeout: None,
            read_timeout: None,
            write_timeout: None,
            nodelay: true,
        }
    }
}

/// One outbound session over a byte stream.
///
/// `S` is a [`TcpStream`] for real use; any `Read + Write` stream can be
/// wrapped with [`Connection::from_stream`].
pub struct Connection<S = TcpStream> {
    stream: Option<S>,
    state: ConnectionState,
    connect_called: bool,
}

/// Drive `op` until `len` bytes moved, the budget runs out or a call fails.
///
/// `op` gets the offset reached so far. Returns the outcome and whether a
/// zero-length transfer (end of stream) was seen.
fn transfer_loop<F>(len: usize, attempts: u32, mut op: F) -> (Transfer, bool)
where
    F: FnMut(usize) -> io::Result<usize>,
{
    let mut done = 0;
    let mut budget = attempts;

    while done < len {
        match op(done) {
            Ok(0) => {
                if done == 0 {
                    return (Transfer::Closed, true);
                }
                return (Transfer::Moved(done), true);
            }
            Ok(n) => {
                done += n;
                if budget != 0 {
                    budget -= 1;
                    if budget == 0 {
                        break;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                if done == 0 {
                    return (Transfer::Failed(e), false);
                }
                debug!("transfer stopped after {} of {} bytes: {}", done, len, e);
                break;
            }
        }
    }

    (Transfer::Moved(done), false)
}

impl Connection<TcpStream> {
    /// Create an unconnected connection
    pub fn new() -> Self {
        Connection {
            stream: None,
            state: ConnectionState::Unconnected,
            connect_called: false,
        }
    }

    /// Connect and return the connection in one step
    pub fn open(address: &str, port: u16, options: &ConnectOptions) -> Result<Self, TransportError> {
        let mut conn = Connection::new();
        conn.connect_with(address, port, options)?;
        Ok(conn)
    }

    /// Open a TCP stream to `address:port` with default options.
    ///
    /// `address` must be a literal IP address; host names are not resolved.
    /// May be called once per connection, whether or not it succeeds.
    pub fn connect(&mut self, address: &str, port: u16) -> Result<(), TransportError> {
        self.connect_with(address, port, &ConnectOptions::default())
    }

    pub fn connect_with(
        &mut self,
        address: &str,
        port: u16,
        options: &ConnectOptions,
    ) -> Result<(), TransportError> {
        if self.connect_called {
            return Err(TransportError::AlreadyConnected);
        }
        self.connect_called = true;

        let connect_error = |source: io::Error| TransportError::Connect {
            target: format!("{}:{}", address, port),
            source,
        };

        let ip: IpAddr = address
            .trim()
            .parse()
            .map_err(|e| connect_error(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let addr = SocketAddr::new(ip, port);

        debug!("connecting to {}", addr);
        let stream = match options.timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(connect_error)?;

        let _ = stream.set_nodelay(options.nodelay);
        stream
            .set_read_timeout(options.read_timeout)
            .map_err(connect_error)?;
        stream
            .set_write_timeout(options.write_timeout)
            .map_err(connect_error)?;

        debug!("connected to {}", addr);
        self.stream = Some(stream);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Address of the remote end, if connected
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    /// Orderly shutdown of both directions
    pub fn shutdown(&mut self) -> Result<(), std::io::Error> {
        if let Some(stream) = &self.stream {
            stream.shutdown(Shutdown::Both)?;
        }
        self.state = ConnectionState::Closed;
        Ok(())
    }
}

impl Default for Connection<TcpStream> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Read + Write> Connection<S> {
    /// Wrap an already connected stream (e.g. one returned by `accept`)
    pub fn from_stream(stream: S) -> Self {
        Connection {
            stream: Some(stream),
            state: ConnectionState::Connected,
            connect_called: true,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    /// Write `buf`, retrying short writes.
    ///
    /// `attempts` caps the number of successful write calls; 0 means retry
    /// until everything is written. Never fails: the outcome says how far it
    /// got.
    pub fn try_send(&mut self, buf: &[u8], attempts: u32) -> Transfer {
        let stream = match (self.state, self.stream.as_mut()) {
            (ConnectionState::Closed, _) => return Transfer::Closed,
            (ConnectionState::Connected, Some(stream)) => stream,
            _ => return Transfer::Failed(io::ErrorKind::NotConnected.into()),
        };

        let (outcome, eof) = transfer_loop(buf.len(), attempts, |done| stream.write(&buf[done..]));
        if eof {
            debug!("peer closed the connection while sending");
            self.state = ConnectionState::Closed;
        }
        if let Transfer::Moved(n) = outcome {
            trace!("-> {} bytes: {}", n, fmt_hex(&buf[..n]));
        }
        outcome
    }

    /// Like [`try_send`](Self::try_send) but classifies failures.
    ///
    /// Returns the number of bytes written; 0 means the peer closed the
    /// connection during this call.
    pub fn send(&mut self, buf: &[u8], attempts: u32) -> Result<usize, TransportError> {
        match self.state {
            ConnectionState::Unconnected => return Err(TransportError::NotConnected),
            ConnectionState::Closed => return Err(TransportError::ConnectionClosed(Direction::Send)),
            ConnectionState::Connected => {}
        }

        match self.try_send(buf, attempts) {
            Transfer::Moved(n) => Ok(n),
            Transfer::Closed => Ok(0),
            Transfer::Failed(e) => Err(TransportError::Send(TransferCause::classify(&e))),
        }
    }

    /// Write all of `buf` or fail.
    pub fn send_fully(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let requested = buf.len();
        let sent = self.send(buf, 0)?;

        if sent == requested {
            return Ok(());
        }
        if sent == 0 {
            return Err(TransportError::ConnectionClosed(Direction::Send));
        }
        Err(TransportError::Incomplete {
            direction: Direction::Send,
            transferred: sent,
            requested,
        })
    }

    /// Read up to `buf.len()` bytes, retrying short reads.
    ///
    /// Same budget rules as [`try_send`](Self::try_send).
    pub fn try_recv(&mut self, buf: &mut [u8], attempts: u32) -> Transfer {
        let stream = match (self.state, self.stream.as_mut()) {
            (ConnectionState::Closed, _) => return Transfer::Closed,
            (ConnectionState::Connected, Some(stream)) => stream,
            _ => return Transfer::Failed(io::ErrorKind::NotConnected.into()),
        };

        let len = buf.len();
        let (outcome, eof) = transfer_loop(len, attempts, |done| stream.read(&mut buf[done..]));
        if eof {
            debug!("peer closed the connection while receiving");
            self.state = ConnectionState::Closed;
        }
        if let Transfer::Moved(n) = outcome {
            trace!("<- {} bytes: {}", n, fmt_hex(&buf[..n]));
        }
        outcome
    }

    pub fn recv(&mut self, buf: &mut [u8], attempts: u32) -> Result<usize, TransportError> {
        match self.state {
            ConnectionState::Unconnected => return Err(TransportError::NotConnected),
            ConnectionState::Closed => return Err(TransportError::ConnectionClosed(Direction::Recv)),
            ConnectionState::Connected => {}
        }

        match self.try_recv(buf, attempts) {
            Transfer::Moved(n) => Ok(n),
            Transfer::Closed => Ok(0),
            Transfer::Failed(e) => Err(TransportError::Recv(TransferCause::classify(&e))),
        }
    }

    /// Fill all of `buf` or fail.
    pub fn recv_fully(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let requested = buf.len();
        let received = self.recv(buf, 0)?;

        if received == requested {
            return Ok(());
        }
        if received == 0 {
            return Err(TransportError::ConnectionClosed(Direction::Recv));
        }
        Err(TransportError::Incomplete {
            direction: Direction::Recv,
            transferred: received,
            requested,
        })
    }
}
