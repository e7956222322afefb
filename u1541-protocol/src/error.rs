//! Error types for the transport, the encoder and the session.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::prg::MAX_PRG_SIZE;

/// Which half of the stream a transfer error happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

impl Direction {
    fn verb(self) -> &'static str {
        match self {
            Direction::Send => "written",
            Direction::Recv => "read",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Recv => write!(f, "recv"),
        }
    }
}

/// Classified platform cause of a failed send or receive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferCause {
    NetworkDown,
    OutOfMemory,
    InvalidSocket,
    Unsupported,
    /// Unclassified OS error code
    Code(i32),
    /// Error without an OS code
    Other(io::ErrorKind),
}

impl TransferCause {
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NetworkDown | io::ErrorKind::NetworkUnreachable => {
                TransferCause::NetworkDown
            }
            io::ErrorKind::OutOfMemory => TransferCause::OutOfMemory,
            io::ErrorKind::NotConnected => TransferCause::InvalidSocket,
            io::ErrorKind::Unsupported => TransferCause::Unsupported,
            kind => match err.raw_os_error() {
                Some(code) => TransferCause::Code(code),
                None => TransferCause::Other(kind),
            },
        }
    }
}

impl fmt::Display for TransferCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferCause::NetworkDown => write!(f, "network subsystem error"),
            TransferCause::OutOfMemory => write!(f, "out of memory"),
            TransferCause::InvalidSocket => write!(f, "invalid socket"),
            TransferCause::Unsupported => write!(f, "operation not supported"),
            TransferCause::Code(code) => write!(f, "code {}", code),
            TransferCause::Other(kind) => write!(f, "{}", kind),
        }
    }
}

fn progress(direction: &Direction, transferred: &usize, requested: &usize) -> String {
    format!(
        "{} {} {} out of {}",
        transferred,
        if *transferred == 1 { "byte" } else { "bytes" },
        direction.verb(),
        requested
    )
}

/// Failures of the TCP transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connect call failed; the connection must be discarded.
    #[error("connect to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("connection already established, create a new one to reconnect")]
    AlreadyConnected,

    #[error("socket is not connected")]
    NotConnected,

    #[error("send failed: {0}")]
    Send(TransferCause),

    #[error("recv failed: {0}")]
    Recv(TransferCause),

    /// The peer shut the stream down; the connection cannot be reused.
    #[error("{0} failed: connection closed")]
    ConnectionClosed(Direction),

    /// Some bytes moved but the transfer could not be completed.
    #[error("{direction} failed: {}", progress(.direction, .transferred, .requested))]
    Incomplete {
        direction: Direction,
        transferred: usize,
        requested: usize,
    },
}

impl TransportError {
    /// True when the peer closed the stream and a new connection is needed
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, TransportError::ConnectionClosed(_))
    }
}

/// Main error type for encoder, image and session operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Variable-length payload does not fit the 16-bit length field.
    #[error("payload too large: {len} bytes (max {})", u16::MAX)]
    PayloadTooLarge { len: usize },

    /// No I/O is attempted when this is returned.
    #[error("program too large: {size} bytes (must be below {})", MAX_PRG_SIZE)]
    ProgramTooLarge { size: usize },

    #[error("program image of {size} bytes has no load address")]
    InvalidProgram { size: usize },

    #[error("no program image loaded")]
    NoProgram,

    #[error("not connected")]
    NotConnected,

    #[error("cannot load '{}': {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Error::Transport(e) if e.is_connection_closed())
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_message() {
        let e = TransportError::Incomplete {
            direction: Direction::Send,
            transferred: 1,
            requested: 7,
        };
        assert_eq!(e.to_string(), "send failed: 1 byte written out of 7");

        let e = TransportError::Incomplete {
            direction: Direction::Recv,
            transferred: 3,
            requested: 7,
        };
        assert_eq!(e.to_string(), "recv failed: 3 bytes read out of 7");
    }

    #[test]
    fn test_classify() {
        let e = io::Error::new(io::ErrorKind::NetworkDown, "down");
        assert_eq!(TransferCause::classify(&e), TransferCause::NetworkDown);

        let e = io::Error::new(io::ErrorKind::NotConnected, "gone");
        assert_eq!(TransferCause::classify(&e), TransferCause::InvalidSocket);

        let e = io::Error::new(io::ErrorKind::OutOfMemory, "full");
        assert_eq!(TransferCause::classify(&e), TransferCause::OutOfMemory);

        let e = io::Error::new(io::ErrorKind::Unsupported, "nope");
        assert_eq!(TransferCause::classify(&e), TransferCause::Unsupported);

        let e = io::Error::from_raw_os_error(9999);
        assert_eq!(TransferCause::classify(&e), TransferCause::Code(9999));

        let e = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(
            TransferCause::classify(&e),
            TransferCause::Other(io::ErrorKind::TimedOut)
        );
    }

    #[test]
    fn test_closed_discriminant() {
        let e: Error = TransportError::ConnectionClosed(Direction::Send).into();
        assert!(e.is_connection_closed());
        assert!(!Error::NotConnected.is_connection_closed());
        assert_eq!(e.to_string(), "send failed: connection closed");
    }
}
