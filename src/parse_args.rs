use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use u1541_protocol::{ConnectOptions, DEFAULT_PORT};

const HELP: &str = "\
C64 Remote - control a Commodore 64 through an Ultimate 1541 command listener

USAGE:
  c64-remote [OPTIONS] [COMMAND]

COMMANDS:
  console               Interactive console (default)
  reset                 Reset the machine
  poke <addr> <value>   Write one byte of memory (hex, e.g. $d020 0e)
  type <text>           Type text into the keyboard buffer (\\r sends RETURN)
  run <file.prg>        Upload a PRG file and start it
  info <file.prg>       Show size and load address of a PRG file

OPTIONS:
  -h, --help            Prints help information
  --host <ip>           IP address of the listener
  --port <port>         Listener port (default: 64)
  --timeout <ms>        Connect and write timeout in milliseconds
  -v, --verbose         Show connection events
  -vv, --trace          Show every command sent
  -vvv, --trace-wire    Show raw bytes on the wire (very verbose)
  --log <file>          Write log output to file instead of stderr
";

/// Verbosity level for debug output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Warnings and errors only
    #[default]
    Quiet = 0,
    /// Connection events, image loads
    Verbose = 1,
    /// Every command sent
    Trace = 2,
    /// Raw bytes
    TraceWire = 3,
}

impl Verbosity {
    /// `tracing` filter directive for this level
    pub fn filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Verbose => "info",
            Verbosity::Trace => "debug",
            Verbosity::TraceWire => "trace",
        }
    }
}

/// What to do once the arguments are parsed
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Console,
    Reset,
    Poke { address: u16, value: u8 },
    Type(String),
    Run(PathBuf),
    Info(PathBuf),
}

#[derive(Debug)]
pub struct AppArgs {
    pub host: Option<String>,
    pub port: u16,
    pub timeout_ms: Option<u64>,
    pub verbosity: Verbosity,
    pub log_file: Option<String>,
    pub action: Action,
}

impl AppArgs {
    pub fn connect_options(&self) -> ConnectOptions {
        let timeout = self.timeout_ms.map(Duration::from_millis);
        ConnectOptions {
            timeout,
            write_timeout: timeout,
            ..ConnectOptions::default()
        }
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('$')
        .or_else(|| s.strip_prefix("0x"))
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parse a hex address: `$d020`, `0xd020` or `d020`
pub fn parse_hex_u16(s: &str) -> Result<u16, ParseIntError> {
    u16::from_str_radix(strip_hex_prefix(s), 16)
}

pub fn parse_hex_u8(s: &str) -> Result<u8, ParseIntError> {
    u8::from_str_radix(strip_hex_prefix(s), 16)
}

/// Expand `\r`, `\n` (both RETURN on the C64) and `\\` in typed text
pub fn parse_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('r') | Some('n') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

pub fn parse_args() -> Result<AppArgs, pico_args::Error> {
    let mut pargs = pico_args::Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{}", HELP);
        std::process::exit(0);
    }

    // Count -v flags for verbosity level
    let verbosity = if pargs.contains("--trace-wire") || pargs.contains("-vvv") {
        Verbosity::TraceWire
    } else if pargs.contains("--trace") || pargs.contains("-vv") {
        Verbosity::Trace
    } else if pargs.contains(["-v", "--verbose"]) {
        Verbosity::Verbose
    } else {
        Verbosity::Quiet
    };

    let host = pargs.opt_value_from_str("--host")?;
    let port = pargs.opt_value_from_str("--port")?.unwrap_or(DEFAULT_PORT);
    let timeout_ms = pargs.opt_value_from_str("--timeout")?;
    let log_file = pargs.opt_value_from_str("--log")?;

    // free arguments come last
    let command: Option<String> = pargs.opt_free_from_str()?;
    let action = match command.as_deref() {
        None | Some("console") => Action::Console,
        Some("reset") => Action::Reset,
        Some("poke") => Action::Poke {
            address: pargs.free_from_fn(parse_hex_u16)?,
            value: pargs.free_from_fn(parse_hex_u8)?,
        },
        // the text is everything left over, filled in below
        Some("type") => Action::Type(String::new()),
        Some("run") => Action::Run(pargs.free_from_str()?),
        Some("info") => Action::Info(pargs.free_from_str()?),
        Some(other) => {
            return Err(pico_args::Error::ArgumentParsingFailed {
                cause: format!("unknown command '{}'", other),
            })
        }
    };

    let remaining = pargs.finish();
    let action = match action {
        Action::Type(_) => {
            let words: Vec<_> = remaining.iter().map(|w| w.to_string_lossy()).collect();
            Action::Type(parse_text(&words.join(" ")))
        }
        action => {
            if !remaining.is_empty() {
                eprintln!("Warning: unused arguments left: {:?}.", remaining);
            }
            action
        }
    };

    Ok(AppArgs {
        host,
        port,
        timeout_ms,
        verbosity,
        log_file,
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u16("$d020"), Ok(0xD020));
        assert_eq!(parse_hex_u16("0xD021"), Ok(0xD021));
        assert_eq!(parse_hex_u16("400"), Ok(0x0400));
        assert!(parse_hex_u16("10000").is_err());
        assert_eq!(parse_hex_u8("0e"), Ok(0x0E));
        assert!(parse_hex_u8("$100").is_err());
        assert!(parse_hex_u8("zz").is_err());
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(parse_text("RUN\\r"), "RUN\r");
        assert_eq!(parse_text("LIST\\n"), "LIST\r");
        assert_eq!(parse_text("A\\\\B"), "A\\B");
        assert_eq!(parse_text("\\x"), "\\x");
        assert_eq!(parse_text("END\\"), "END\\");
    }

    #[test]
    fn test_connect_options() {
        let args = AppArgs {
            host: None,
            port: DEFAULT_PORT,
            timeout_ms: Some(1500),
            verbosity: Verbosity::Quiet,
            log_file: None,
            action: Action::Console,
        };
        let options = args.connect_options();
        assert_eq!(options.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.write_timeout, Some(Duration::from_millis(1500)));
        assert!(options.nodelay);
    }
}
