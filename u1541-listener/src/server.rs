//! TCP listener that plays the remote end of the command protocol

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

use thiserror::Error;
use tracing::{debug, info, warn};
use u1541_protocol::{Command, Connection, ReadError};

use crate::machine::Machine;

/// Accepts front-end connections one at a time
pub struct Listener {
    listener: TcpListener,
}

impl Listener {
    pub fn bind(addr: &str) -> Result<Self, io::Error> {
        let listener = TcpListener::bind(addr)?;
        Ok(Listener { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.listener.local_addr()
    }

    /// Wait for the next front-end (blocking)
    pub fn accept(&self) -> Result<(Connection<TcpStream>, SocketAddr), io::Error> {
        let (stream, peer) = self.listener.accept()?;
        // Disable Nagle's algorithm for lower latency
        let _ = stream.set_nodelay(true);
        Ok((Connection::from_stream(stream), peer))
    }

    /// Accept one connection and serve it until the peer hangs up.
    ///
    /// Returns the number of commands applied.
    pub fn serve_one(&self, machine: &mut Machine) -> Result<usize, ServeError> {
        let (mut conn, peer) = self.accept()?;
        info!("connection from {}", peer);
        let count = serve(&mut conn, machine)?;
        info!("{} closed the connection after {} commands", peer, count);
        Ok(count)
    }
}

/// Failure while serving a front-end
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("accept failed: {0}")]
    Accept(#[from] io::Error),

    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Read and apply commands until the peer closes the connection.
///
/// Frames with an unknown opcode or a bad length are skipped; the length
/// field keeps the stream in step.
pub fn serve<S>(conn: &mut Connection<S>, machine: &mut Machine) -> Result<usize, ReadError>
where
    S: io::Read + io::Write,
{
    let mut count = 0;
    loop {
        match Command::read_from(conn) {
            Ok(command) => {
                let line = machine.apply(&command);
                debug!("<- {}", line);
                count += 1;
            }
            Err(ReadError::Decode(e)) => warn!("skipping frame: {}", e),
            Err(e) if e.is_connection_closed() => return Ok(count),
            Err(e) => return Err(e),
        }
    }
}
