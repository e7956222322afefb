//! Stand-in for the command listener on an Ultimate 1541 cartridge.
//!
//! Decodes the frames a front-end sends and applies them to a simulated
//! machine, so front-ends can be exercised without hardware.

mod machine;
mod server;

pub use machine::{Machine, StartedProgram, KEYBOARD_BUFFER_SIZE};
pub use server::{serve, Listener, ServeError};

/// Address the listener binds to by default
pub const DEFAULT_BIND: &str = "127.0.0.1:64";
