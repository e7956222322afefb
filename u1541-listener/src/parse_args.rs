const HELP: &str = "\
U1541 Listener - Ultimate 1541 command listener stand-in

Accepts front-end connections and applies their commands to a simulated C64.

USAGE:
  u1541-listener [OPTIONS]

OPTIONS:
  -h, --help            Prints help information
  --bind <ip:port>      Address to listen on (default: 127.0.0.1:64)
  --once                Exit after the first connection closes
  -v, --verbose         Show connection events
  -vv, --trace          Show every command received
  -vvv, --trace-wire    Show raw bytes on the wire (very verbose)
  --log <file>          Write log output to file instead of stderr
";

/// Verbosity level for debug output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Warnings and errors only
    #[default]
    Quiet = 0,
    /// Connection events
    Verbose = 1,
    /// Every command
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

#[derive(Debug)]
pub struct AppArgs {
    pub bind: String,
    pub once: bool,
    pub verbosity: Verbosity,
    pub log_file: Option<String>,
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

    let args = AppArgs {
        bind: pargs
            .opt_value_from_str("--bind")?
            .unwrap_or_else(|| u1541_listener::DEFAULT_BIND.to_string()),
        once: pargs.contains("--once"),
        verbosity,
        log_file: pargs.opt_value_from_str("--log")?,
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        eprintln!("Warning: unused arguments left: {:?}.", remaining);
    }

    Ok(args)
}
