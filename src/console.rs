//! Line-oriented console: one command per line, read until `quit` or EOF.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;
use u1541_protocol::{ImageStatus, Session};

use crate::parse_args::{parse_hex_u16, parse_hex_u8, parse_text};

const CONSOLE_HELP: &str = "\
connect [ip] [port]   connect to the listener
disconnect            drop the connection
status                show connection and image
reset                 reset the machine
poke <addr> <value>   write one byte (hex)
poke                  repeat the last poke
inc | dec             poke the last address with value +1 / -1
type <text>           type text (\\r sends RETURN)
load <file.prg>       load a program image
reload                read the image file again
run                   upload the image and start it
reload-run            reload, then run
info                  show the loaded image
help                  this text
quit                  leave the console
";

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("bad number '{0}'")]
    BadNumber(String),

    #[error("no host given, use 'connect <ip> [port]' or --host")]
    NoHost,

    #[error(transparent)]
    Session(#[from] u1541_protocol::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect {
        host: Option<String>,
        port: Option<u16>,
    },
    Disconnect,
    Status,
    Reset,
    Poke {
        address: u16,
        value: u8,
    },
    PokeAgain,
    Inc,
    Dec,
    Type(String),
    Load(PathBuf),
    Reload,
    Run,
    ReloadRun,
    Info,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line. Blank lines and `#` comments give `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ConsoleError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        let command = match word.to_ascii_lowercase().as_str() {
            "connect" => {
                if args.len() > 2 {
                    return Err(ConsoleError::Usage("connect [ip] [port]"));
                }
                let port = match args.get(1) {
                    Some(p) => Some(
                        p.parse::<u16>()
                            .map_err(|_| ConsoleError::BadNumber(p.to_string()))?,
                    ),
                    None => None,
                };
                ConsoleCommand::Connect {
                    host: args.first().map(|h| h.to_string()),
                    port,
                }
            }
            "disconnect" => ConsoleCommand::Disconnect,
            "status" => ConsoleCommand::Status,
            "reset" => ConsoleCommand::Reset,
            "poke" => match args.as_slice() {
                [] => ConsoleCommand::PokeAgain,
                [address, value] => ConsoleCommand::Poke {
                    address: parse_hex_u16(address)
                        .map_err(|_| ConsoleError::BadNumber(address.to_string()))?,
                    value: parse_hex_u8(value)
                        .map_err(|_| ConsoleError::BadNumber(value.to_string()))?,
                },
                _ => return Err(ConsoleError::Usage("poke <addr> <value>")),
            },
            "inc" => ConsoleCommand::Inc,
            "dec" => ConsoleCommand::Dec,
            // keep the text as typed, spaces included
            "type" => ConsoleCommand::Type(parse_text(rest)),
            "load" => {
                if rest.is_empty() {
                    return Err(ConsoleError::Usage("load <file.prg>"));
                }
                ConsoleCommand::Load(PathBuf::from(rest))
            }
            "reload" => ConsoleCommand::Reload,
            "run" => ConsoleCommand::Run,
            "reload-run" => ConsoleCommand::ReloadRun,
            "info" => ConsoleCommand::Info,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(ConsoleError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// Whether the console keeps reading after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Console {
    session: Session,
    host: Option<String>,
    port: u16,
}

impl Console {
    pub fn new(session: Session, host: Option<String>, port: u16) -> Self {
        Console {
            session,
            host,
            port,
        }
    }

    /// Connect to the remembered host and port
    pub fn connect(&mut self) -> Result<(), ConsoleError> {
        let host = self.host.as_deref().ok_or(ConsoleError::NoHost)?;
        self.session.connect(host, self.port)?;
        Ok(())
    }

    pub fn execute<W: Write>(
        &mut self,
        command: ConsoleCommand,
        out: &mut W,
    ) -> Result<Flow, ConsoleError> {
        debug!("console: {:?}", command);
        match command {
            ConsoleCommand::Connect { host, port } => {
                if host.is_some() {
                    self.host = host;
                }
                if let Some(port) = port {
                    self.port = port;
                }
                self.connect()?;
                writeln!(out, "Connected to {}:{}", self.host.as_deref().unwrap_or_default(), self.port)?;
            }
            ConsoleCommand::Disconnect => {
                if self.session.disconnect() {
                    writeln!(out, "Disconnected")?;
                } else {
                    writeln!(out, "Not connected")?;
                }
            }
            ConsoleCommand::Status => {
                match self.session.peer_addr() {
                    Some(peer) if self.session.is_connected() => {
                        writeln!(out, "Connected to {}", peer)?
                    }
                    _ => writeln!(out, "Not connected")?,
                }
                let target = self.session.poke_target();
                writeln!(out, "Poke   : ${:04X},${:02X}", target.address, target.value)?;
                match self.session.image_status() {
                    Some(status) => write_image_status(out, &status)?,
                    None => writeln!(out, "No program loaded")?,
                }
            }
            ConsoleCommand::Reset => {
                self.session.send_reset()?;
                writeln!(out, "Reset sent")?;
            }
            ConsoleCommand::Poke { address, value } => {
                self.session.send_poke(address, value)?;
                writeln!(out, "POKE ${:04X},${:02X}", address, value)?;
            }
            ConsoleCommand::PokeAgain => {
                let target = self.session.step_poke(0)?;
                writeln!(out, "POKE ${:04X},${:02X}", target.address, target.value)?;
            }
            ConsoleCommand::Inc => {
                let target = self.session.step_poke(1)?;
                writeln!(out, "POKE ${:04X},${:02X}", target.address, target.value)?;
            }
            ConsoleCommand::Dec => {
                let target = self.session.step_poke(-1)?;
                writeln!(out, "POKE ${:04X},${:02X}", target.address, target.value)?;
            }
            ConsoleCommand::Type(text) => {
                self.session.send_type_text(&text)?;
                writeln!(out, "Typed {} bytes", text.len())?;
            }
            ConsoleCommand::Load(path) => {
                let image = self.session.load_image(&path)?;
                writeln!(out, "Loaded {} ({} bytes)", image.path().display(), image.len())?;
            }
            ConsoleCommand::Reload => {
                let image = self.session.reload_image()?;
                writeln!(out, "Reloaded {} ({} bytes)", image.path().display(), image.len())?;
            }
            ConsoleCommand::Run => {
                self.session.send_start_program()?;
                writeln!(out, "Program started")?;
            }
            ConsoleCommand::ReloadRun => {
                self.session.reload_and_start()?;
                writeln!(out, "Program reloaded and started")?;
            }
            ConsoleCommand::Info => match self.session.image_status() {
                Some(status) => write_image_status(out, &status)?,
                None => writeln!(out, "No program loaded")?,
            },
            ConsoleCommand::Help => write!(out, "{}", CONSOLE_HELP)?,
            ConsoleCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Read commands from `input` until `quit` or end of input.
    /// Command errors are reported and do not stop the console.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut out: W) -> io::Result<()> {
        write!(out, "> ")?;
        out.flush()?;
        for line in input.lines() {
            let line = line?;
            let result = ConsoleCommand::parse(&line).and_then(|command| match command {
                Some(command) => self.execute(command, &mut out),
                None => Ok(Flow::Continue),
            });
            match result {
                Ok(Flow::Quit) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(ConsoleError::Io(e)) => return Err(e),
                Err(e) => writeln!(out, "Error: {}", e)?,
            }
            write!(out, "> ")?;
            out.flush()?;
        }
        writeln!(out)
    }
}

/// Print a program image summary
pub fn write_image_status<W: Write>(out: &mut W, status: &ImageStatus) -> io::Result<()> {
    writeln!(out, "File   : {}", status.path.display())?;
    writeln!(
        out,
        "Size   : {} {} (${:X})",
        status.size,
        if status.size == 1 { "byte" } else { "bytes" },
        status.size
    )?;
    match status.load_address {
        Some(load) => writeln!(out, "Load at: ${:04X}", load)?,
        None => writeln!(out, "Load at: none")?,
    }
    // a bare header writes nothing, so there is no end address
    if let Some(end) = status.end_address {
        writeln!(out, "End    : ${:04X}", end)?;
    }
    if !status.valid {
        writeln!(out, "Warning: not a valid program image")?;
    }
    Ok(())
}
