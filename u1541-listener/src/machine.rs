//! The part of a C64 the listener commands can observe: RAM, the keyboard
//! buffer and the last program started.

use u1541_protocol::{fmt_hex, Command, ProgramImage};

/// C64 keyboard buffer length (KERNAL default at $0289)
pub const KEYBOARD_BUFFER_SIZE: usize = 10;

/// A program that was uploaded and started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedProgram {
    pub load_address: u16,
    pub size: usize,
}

/// Simulated target machine
pub struct Machine {
    ram: Vec<u8>,
    keyboard: Vec<u8>,
    resets: u32,
    started: Option<StartedProgram>,
}

impl Machine {
    pub fn new() -> Self {
        Machine {
            ram: vec![0; 0x10000],
            keyboard: Vec::new(),
            resets: 0,
            started: None,
        }
    }

    pub fn peek(&self, address: u16) -> u8 {
        self.ram[address as usize]
    }

    pub fn poke(&mut self, address: u16, value: u8) {
        self.ram[address as usize] = value;
    }

    /// Keys waiting to be read by the KERNAL
    pub fn keyboard(&self) -> &[u8] {
        &self.keyboard
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    pub fn started(&self) -> Option<StartedProgram> {
        self.started
    }

    /// Carry out one command. Returns a one-line description for the log.
    pub fn apply(&mut self, command: &Command) -> String {
        match command {
            Command::Reset => {
                // RAM survives a reset, the keyboard buffer does not
                self.resets += 1;
                self.keyboard.clear();
                self.started = None;
                format!("RESET #{}", self.resets)
            }
            Command::Poke { address, value } => {
                self.poke(*address, *value);
                format!("POKE ${:04X},${:02X}", address, value)
            }
            Command::TypeText(text) => {
                let room = KEYBOARD_BUFFER_SIZE.saturating_sub(self.keyboard.len());
                let taken = text.len().min(room);
                self.keyboard.extend_from_slice(&text[..taken]);
                if taken < text.len() {
                    format!(
                        "TYPE {} (buffer full, {} dropped)",
                        fmt_hex(text),
                        text.len() - taken
                    )
                } else {
                    format!("TYPE {}", fmt_hex(text))
                }
            }
            Command::StartProgram(bytes) => {
                let image = ProgramImage::from_bytes("<upload>", bytes.clone());
                let Some(load_address) = image.load_address() else {
                    return format!("START_PROGRAM ignored, {} byte image", bytes.len());
                };
                for (i, byte) in image.body().iter().enumerate() {
                    self.poke(load_address.wrapping_add(i as u16), *byte);
                }
                self.started = Some(StartedProgram {
                    load_address,
                    size: bytes.len(),
                });
                format!(
                    "START_PROGRAM ${:04X}, {} bytes",
                    load_address,
                    image.body().len()
                )
            }
        }
    }

    /// Consume the keyboard buffer the way the KERNAL would
    pub fn drain_keyboard(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.keyboard)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poke() {
        let mut machine = Machine::new();
        let line = machine.apply(&Command::Poke {
            address: 0xD020,
            value: 0x0E,
        });
        assert_eq!(machine.peek(0xD020), 0x0E);
        assert_eq!(line, "POKE $D020,$0E");
    }

    #[test]
    fn test_start_program_copies_body() {
        let mut machine = Machine::new();
        machine.apply(&Command::StartProgram(vec![0x01, 0x08, 0xA9, 0x00, 0x60]));
        assert_eq!(machine.peek(0x0801), 0xA9);
        assert_eq!(machine.peek(0x0802), 0x00);
        assert_eq!(machine.peek(0x0803), 0x60);
        assert_eq!(
            machine.started(),
            Some(StartedProgram {
                load_address: 0x0801,
                size: 5
            })
        );
    }

    #[test]
    fn test_start_program_without_header() {
        let mut machine = Machine::new();
        machine.apply(&Command::StartProgram(vec![0x01]));
        assert_eq!(machine.started(), None);
    }

    #[test]
    fn test_keyboard_buffer_limit() {
        let mut machine = Machine::new();
        machine.apply(&Command::type_text("LOAD\"*\",8,1"));
        assert_eq!(machine.keyboard(), b"LOAD\"*\",8,");
        assert_eq!(machine.drain_keyboard().len(), KEYBOARD_BUFFER_SIZE);
        assert!(machine.keyboard().is_empty());
    }

    #[test]
    fn test_reset_keeps_ram() {
        let mut machine = Machine::new();
        machine.apply(&Command::Poke {
            address: 0xC000,
            value: 0x42,
        });
        machine.apply(&Command::type_text("RUN"));
        machine.apply(&Command::Reset);
        assert_eq!(machine.peek(0xC000), 0x42);
        assert!(machine.keyboard().is_empty());
        assert_eq!(machine.resets(), 1);
    }
}
