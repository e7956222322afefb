mod console;
mod logger;
mod parse_args;

use std::io;

use console::{Console, ConsoleCommand, ConsoleError};
use parse_args::{parse_args, Action, AppArgs};
use u1541_protocol::{Net, Session};

fn main() {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error parsing arguments: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logger::init(args.verbosity, args.log_file.as_deref()) {
        eprintln!(
            "Failed to open log file '{}': {}",
            args.log_file.as_deref().unwrap_or_default(),
            e
        );
        std::process::exit(1);
    }
    if let Some(path) = &args.log_file {
        eprintln!("Logging to: {}", path);
    }

    // Network stays initialised until main returns
    let _net = match Net::init() {
        Ok(n) => n,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: AppArgs) -> Result<(), ConsoleError> {
    let session = Session::with_options(args.connect_options());
    let mut console = Console::new(session, args.host, args.port);
    let mut out = io::stdout();

    let command = match args.action {
        Action::Console => {
            // a failed first connect is not fatal, the console can retry
            match console.connect() {
                Ok(()) | Err(ConsoleError::NoHost) => {}
                Err(e) => eprintln!("Error: {}", e),
            }
            return Ok(console.run(io::stdin().lock(), out)?);
        }
        Action::Info(path) => {
            // no connection needed
            console.execute(ConsoleCommand::Load(path), &mut io::sink())?;
            console.execute(ConsoleCommand::Info, &mut out)?;
            return Ok(());
        }
        Action::Reset => ConsoleCommand::Reset,
        Action::Poke { address, value } => ConsoleCommand::Poke { address, value },
        Action::Type(text) => ConsoleCommand::Type(text),
        Action::Run(path) => {
            console.execute(ConsoleCommand::Load(path), &mut out)?;
            ConsoleCommand::Run
        }
    };

    console.connect()?;
    console.execute(command, &mut out)?;
    Ok(())
}
