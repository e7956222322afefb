mod logger;
mod parse_args;

use parse_args::parse_args;
use u1541_listener::{Listener, Machine};
use u1541_protocol::{fmt_hex, Net};

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

    let _net = match Net::init() {
        Ok(n) => n,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let listener = match Listener::bind(&args.bind) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", args.bind, e);
            std::process::exit(1);
        }
    };
    eprintln!("Listening on {}", args.bind);

    let mut machine = Machine::new();

    // One front-end at a time, like the cartridge
    loop {
        match listener.serve_one(&mut machine) {
            Ok(count) => eprintln!("Front-end disconnected after {} commands", count),
            Err(e) => eprintln!("Session error: {}", e),
        }
        report(&mut machine);

        if args.once {
            break;
        }
    }
}

/// Print what the front-end left behind
fn report(machine: &mut Machine) {
    eprintln!("Resets: {}", machine.resets());
    if let Some(program) = machine.started() {
        eprintln!(
            "Started program at ${:04X} ({} bytes)",
            program.load_address, program.size
        );
    }
    let keys = machine.drain_keyboard();
    if !keys.is_empty() {
        eprintln!("Typed: {} ({})", String::from_utf8_lossy(&keys).escape_debug(), fmt_hex(&keys));
    }
}
