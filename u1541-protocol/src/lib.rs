//! # Ultimate 1541 Protocol
//!
//! Remote control of a Commodore 64 through the command listener of an
//! Ultimate 1541 style cartridge.
//!
//! ## Wire Format
//!
//! Every command is a little-endian frame sent over a plain TCP stream:
//! ```text
//! [opcode:u16-LE][len:u16-LE][payload...]
//! ```
//!
//! ## Commands
//!
//! | Opcode | Name | Payload |
//! |--------|------|---------|
//! | 0xFF02 | START_PROGRAM | PRG image (load address + data), < 51714 bytes |
//! | 0xFF03 | TYPE_TEXT | raw text bytes, no terminator |
//! | 0xFF04 | RESET | empty (the zero length field is always sent) |
//! | 0xFF06 | POKE | addr:u16-LE, value:u8 |
//!
//! No command has a reply. The receive primitives on [`Connection`] exist so
//! the other end of the stream can be implemented with the same code.

mod commands;
pub mod connection;
mod error;
mod net;
mod prg;
mod session;

pub use commands::{
    opcode, Command, DecodeError, Frame, ReadError, HEADER_SIZE, POKE_PAYLOAD_SIZE,
};
pub use connection::{ConnectOptions, Connection, ConnectionState, Transfer, DEFAULT_PORT};
pub use error::{Direction, Error, Result, TransferCause, TransportError};
pub use net::{Net, NetError};
pub use prg::{ProgramImage, MAX_PRG_SIZE, MIN_PRG_SIZE};
pub use session::{ImageStatus, PokeTarget, Session};

/// Format bytes as hex string for trace output
pub fn fmt_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
