//! Command frames and their encoding/decoding.

use std::io::{Read, Write};

use thiserror::Error;

use crate::connection::Connection;
use crate::error::{Error, TransportError};
use crate::prg::MAX_PRG_SIZE;

/// Opcode constants (sent as u16-LE)
pub mod opcode {
    pub const START_PROGRAM: u16 = 0xFF02;
    pub const TYPE_TEXT: u16 = 0xFF03;
    pub const RESET: u16 = 0xFF04;
    pub const POKE: u16 = 0xFF06;
}

/// Opcode plus length field
pub const HEADER_SIZE: usize = 4;

/// addr:u16 + value:u8
pub const POKE_PAYLOAD_SIZE: usize = 3;

/// Errors found while decoding a frame
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("incomplete frame: have {have} bytes, need {need}")]
    Incomplete { have: usize, need: usize },

    #[error("unknown opcode: 0x{0:04X}")]
    UnknownOpcode(u16),

    #[error("opcode 0x{opcode:04X} expects {expected} payload bytes, got {len}")]
    BadLength { opcode: u16, expected: usize, len: usize },
}

/// One encoded protocol message, ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    fn new(op: u16, payload: &[u8]) -> Frame {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&op.to_le_bytes());
        // callers have checked that the payload fits
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(payload);
        Frame(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn opcode(&self) -> u16 {
        u16::from_le_bytes([self.0[0], self.0[1]])
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Commands understood by the remote listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reset the machine
    Reset,

    /// Write one byte of memory
    Poke { address: u16, value: u8 },

    /// Put text into the keyboard buffer
    TypeText(Vec<u8>),

    /// Load a PRG image (with its load address header) and run it
    StartProgram(Vec<u8>),
}

impl Command {
    pub fn type_text(text: &str) -> Command {
        Command::TypeText(text.as_bytes().to_vec())
    }

    pub fn opcode(&self) -> u16 {
        match self {
            Command::Reset => opcode::RESET,
            Command::Poke { .. } => opcode::POKE,
            Command::TypeText(_) => opcode::TYPE_TEXT,
            Command::StartProgram(_) => opcode::START_PROGRAM,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Reset => "RESET",
            Command::Poke { .. } => "POKE",
            Command::TypeText(_) => "TYPE_TEXT",
            Command::StartProgram(_) => "START_PROGRAM",
        }
    }

    /// Encode to wire format: `[opcode:u16-LE][len:u16-LE][payload...]`
    pub fn encode(&self) -> Result<Frame, Error> {
        match self {
            // the trailing 0x0000 is part of the frame the listener expects
            Command::Reset => Ok(Frame::new(opcode::RESET, &[])),
            Command::Poke { address, value } => {
                let [lo, hi] = address.to_le_bytes();
                Ok(Frame::new(opcode::POKE, &[lo, hi, *value]))
            }
            Command::TypeText(text) => {
                if text.len() > u16::MAX as usize {
                    return Err(Error::PayloadTooLarge { len: text.len() });
                }
                Ok(Frame::new(opcode::TYPE_TEXT, text))
            }
            Command::StartProgram(image) => {
                if image.len() >= MAX_PRG_SIZE {
                    return Err(Error::ProgramTooLarge { size: image.len() });
                }
                Ok(Frame::new(opcode::START_PROGRAM, image))
            }
        }
    }

    fn from_parts(op: u16, payload: &[u8]) -> Result<Command, DecodeError> {
        let expect = |expected: usize| {
            if payload.len() == expected {
                Ok(())
            } else {
                Err(DecodeError::BadLength {
                    opcode: op,
                    expected,
                    len: payload.len(),
                })
            }
        };

        match op {
            opcode::RESET => {
                expect(0)?;
                Ok(Command::Reset)
            }
            opcode::POKE => {
                expect(POKE_PAYLOAD_SIZE)?;
                Ok(Command::Poke {
                    address: u16::from_le_bytes([payload[0], payload[1]]),
                    value: payload[2],
                })
            }
            opcode::TYPE_TEXT => Ok(Command::TypeText(payload.to_vec())),
            opcode::START_PROGRAM => Ok(Command::StartProgram(payload.to_vec())),
            _ => Err(DecodeError::UnknownOpcode(op)),
        }
    }

    /// Decode one frame from the front of `data`.
    ///
    /// Returns the command and the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Command, usize), DecodeError> {
        if data.len() < HEADER_SIZE {
            return Err(DecodeError::Incomplete {
                have: data.len(),
                need: HEADER_SIZE,
            });
        }

        let op = u16::from_le_bytes([data[0], data[1]]);
        let len = u16::from_le_bytes([data[2], data[3]]) as usize;
        let total_len = HEADER_SIZE + len;

        if data.len() < total_len {
            return Err(DecodeError::Incomplete {
                have: data.len(),
                need: total_len,
            });
        }

        let command = Command::from_parts(op, &data[HEADER_SIZE..total_len])?;
        Ok((command, total_len))
    }

    /// Encode and send in one piece
    pub fn write_to<S: Read + Write>(&self, conn: &mut Connection<S>) -> Result<(), Error> {
        let frame = self.encode()?;
        conn.send_fully(frame.as_bytes())?;
        Ok(())
    }

    /// Read exactly one frame from a connection (blocking)
    pub fn read_from<S: Read + Write>(conn: &mut Connection<S>) -> Result<Command, ReadError> {
        let mut header = [0u8; HEADER_SIZE];
        conn.recv_fully(&mut header)?;

        let op = u16::from_le_bytes([header[0], header[1]]);
        let len = u16::from_le_bytes([header[2], header[3]]) as usize;

        let mut payload = vec![0u8; len];
        conn.recv_fully(&mut payload)?;

        Ok(Command::from_parts(op, &payload)?)
    }
}

/// Failure of [`Command::read_from`]
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ReadError {
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, ReadError::Transport(e) if e.is_connection_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::{ScriptedStream, Step};

    #[test]
    fn test_wire_format_reset() {
        let frame = Command::Reset.encode().unwrap();
        assert_eq!(frame.as_bytes(), &[0x04, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn test_wire_format_poke() {
        let frame = Command::Poke {
            address: 0xD020,
            value: 0x0E,
        }
        .encode()
        .unwrap();
        assert_eq!(frame.as_bytes(), &[0x06, 0xFF, 0x03, 0x00, 0x20, 0xD0, 0x0E]);
        assert_eq!(frame.opcode(), opcode::POKE);
    }

    #[test]
    fn test_wire_format_type_text() {
        let frame = Command::type_text("RUN\r").encode().unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0x03, 0xFF, 0x04, 0x00, b'R', b'U', b'N', b'\r']
        );

        let frame = Command::type_text("").encode().unwrap();
        assert_eq!(frame.as_bytes(), &[0x03, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn test_wire_format_start_program() {
        let frame = Command::StartProgram(vec![0x01, 0x08, 0x60]).encode().unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0x02, 0xFF, 0x03, 0x00, 0x01, 0x08, 0x60]
        );
    }

    #[test]
    fn test_program_size_boundary() {
        let frame = Command::StartProgram(vec![0; MAX_PRG_SIZE - 1]).encode().unwrap();
        assert_eq!(frame.len(), HEADER_SIZE + MAX_PRG_SIZE - 1);

        match Command::StartProgram(vec![0; MAX_PRG_SIZE]).encode() {
            Err(Error::ProgramTooLarge { size }) => assert_eq!(size, MAX_PRG_SIZE),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_type_text_too_long() {
        let text = vec![b'A'; u16::MAX as usize + 1];
        assert!(matches!(
            Command::TypeText(text).encode(),
            Err(Error::PayloadTooLarge { len: 65536 })
        ));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            Command::decode(&[0x06, 0xFF]),
            Err(DecodeError::Incomplete { have: 2, need: 4 })
        );
        assert_eq!(
            Command::decode(&[0x06, 0xFF, 0x03, 0x00, 0x20]),
            Err(DecodeError::Incomplete { have: 5, need: 7 })
        );
        assert_eq!(
            Command::decode(&[0x01, 0xFF, 0x00, 0x00]),
            Err(DecodeError::UnknownOpcode(0xFF01))
        );
        assert_eq!(
            Command::decode(&[0x04, 0xFF, 0x01, 0x00, 0x00]),
            Err(DecodeError::BadLength {
                opcode: opcode::RESET,
                expected: 0,
                len: 1
            })
        );
    }

    #[test]
    fn test_decode_back_to_back() {
        let mut data = Command::Reset.encode().unwrap().into_bytes();
        data.extend(Command::type_text("HI").encode().unwrap().into_bytes());

        let (first, used) = Command::decode(&data).unwrap();
        assert_eq!(first, Command::Reset);
        let (second, rest) = Command::decode(&data[used..]).unwrap();
        assert_eq!(second, Command::type_text("HI"));
        assert_eq!(used + rest, data.len());
    }

    #[test]
    fn test_read_from_connection() {
        let poke = Command::Poke {
            address: 0x0400,
            value: 1,
        };
        let bytes = poke.encode().unwrap().into_bytes();
        // header arrives split, then the payload
        let stream = ScriptedStream::new(vec![
            Step::Data(bytes[..1].to_vec()),
            Step::Data(bytes[1..4].to_vec()),
            Step::Data(bytes[4..].to_vec()),
        ]);
        let mut conn = Connection::from_stream(stream);
        assert_eq!(Command::read_from(&mut conn).unwrap(), poke);

        // script exhausted: the peer is gone
        let err = Command::read_from(&mut conn).unwrap_err();
        assert!(err.is_connection_closed());
    }

    #[test]
    fn test_write_to_connection() {
        let mut conn = Connection::from_stream(ScriptedStream::new(vec![
            Step::Accept(1),
            Step::Accept(100),
        ]));
        Command::Reset.write_to(&mut conn).unwrap();
        assert_eq!(conn.get_ref().unwrap().written, vec![0x04, 0xFF, 0x00, 0x00]);
    }
}
