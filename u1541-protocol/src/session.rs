//! The operations a front-end may invoke on the core.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::commands::Command;
use crate::connection::{ConnectOptions, Connection};
use crate::error::{Error, Result};
use crate::prg::{ProgramImage, MAX_PRG_SIZE};

/// Address and value of the most recent poke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PokeTarget {
    pub address: u16,
    pub value: u8,
}

impl Default for PokeTarget {
    /// Border colour register, black
    fn default() -> Self {
        PokeTarget {
            address: 0xD020,
            value: 0,
        }
    }
}

/// Read-only summary of the loaded program image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageStatus {
    pub path: PathBuf,
    pub size: usize,
    pub valid: bool,
    pub load_address: Option<u16>,
    pub end_address: Option<u16>,
}

/// One controlling session: at most one connection plus the loaded image.
///
/// The image is independent of the connection and survives disconnects.
#[derive(Default)]
pub struct Session {
    connection: Option<Connection>,
    options: ConnectOptions,
    image: Option<ProgramImage>,
    poke: PokeTarget,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConnectOptions) -> Self {
        Session {
            options,
            ..Self::default()
        }
    }

    /// Connect to the listener, replacing any current connection.
    ///
    /// On failure the session is left disconnected.
    pub fn connect(&mut self, ip: &str, port: u16) -> Result<()> {
        self.disconnect();
        let conn = Connection::open(ip, port, &self.options)?;
        info!("connected to {}:{}", ip, port);
        self.connection = Some(conn);
        Ok(())
    }

    /// Drop the connection. Returns false if there was none.
    pub fn disconnect(&mut self) -> bool {
        match self.connection.take() {
            Some(mut conn) => {
                let _ = conn.shutdown();
                info!("disconnected");
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_connected())
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection.as_ref().and_then(|c| c.peer_addr())
    }

    /// Encode and deliver one command. Any transport failure ends the
    /// connection.
    fn send(&mut self, command: &Command) -> Result<()> {
        let frame = command.encode()?;
        let conn = self.connection.as_mut().ok_or(Error::NotConnected)?;

        debug!("-> {} ({} bytes)", command.name(), frame.len());
        if let Err(e) = conn.send_fully(frame.as_bytes()) {
            warn!("{}, dropping connection", e);
            self.connection = None;
            return Err(e.into());
        }
        Ok(())
    }

    pub fn send_reset(&mut self) -> Result<()> {
        self.send(&Command::Reset)
    }

    pub fn send_poke(&mut self, address: u16, value: u8) -> Result<()> {
        self.poke = PokeTarget { address, value };
        self.send(&Command::Poke { address, value })
    }

    /// Poke the last target again with its value moved by `delta` (wrapping)
    pub fn step_poke(&mut self, delta: i8) -> Result<PokeTarget> {
        let target = PokeTarget {
            address: self.poke.address,
            value: self.poke.value.wrapping_add_signed(delta),
        };
        self.send_poke(target.address, target.value)?;
        Ok(target)
    }

    pub fn poke_target(&self) -> PokeTarget {
        self.poke
    }

    pub fn send_type_text(&mut self, text: &str) -> Result<()> {
        self.send(&Command::type_text(text))
    }

    /// Load a program image. On failure the previous image is kept.
    pub fn load_image<P: AsRef<Path>>(&mut self, path: P) -> Result<&ProgramImage> {
        match ProgramImage::load(path) {
            Ok(image) => {
                info!(
                    "loaded {} ({} bytes)",
                    image.path().display(),
                    image.len()
                );
                Ok(&*self.image.insert(image))
            }
            Err(e) => {
                warn!("{}, keeping previous image", e);
                Err(e)
            }
        }
    }

    /// Read the current image again from its file
    pub fn reload_image(&mut self) -> Result<&ProgramImage> {
        let current = self.image.as_ref().ok_or(Error::NoProgram)?;
        match current.reload() {
            Ok(image) => {
                info!("reloaded {} ({} bytes)", image.path().display(), image.len());
                Ok(&*self.image.insert(image))
            }
            Err(e) => {
                warn!("{}, keeping previous image", e);
                Err(e)
            }
        }
    }

    /// Upload the loaded image and start it
    pub fn send_start_program(&mut self) -> Result<()> {
        let image = self.image.as_ref().ok_or(Error::NoProgram)?;
        let size = image.len();

        if size >= MAX_PRG_SIZE {
            return Err(Error::ProgramTooLarge { size });
        }
        let Some(load_address) = image.load_address() else {
            return Err(Error::InvalidProgram { size });
        };

        info!(
            "starting {} at ${:04X} ({} bytes)",
            image.path().display(),
            load_address,
            size
        );
        let command = Command::StartProgram(image.bytes().to_vec());
        self.send(&command)
    }

    pub fn reload_and_start(&mut self) -> Result<()> {
        self.reload_image()?;
        self.send_start_program()
    }

    pub fn image(&self) -> Option<&ProgramImage> {
        self.image.as_ref()
    }

    pub fn image_status(&self) -> Option<ImageStatus> {
        self.image.as_ref().map(|image| ImageStatus {
            path: image.path().to_path_buf(),
            size: image.len(),
            valid: image.is_valid(),
            load_address: image.load_address(),
            end_address: image.end_address(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    /// Listener that collects every command until the client hangs up
    fn spawn_collector() -> (u16, thread::JoinHandle<Vec<Command>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut conn = Connection::from_stream(stream);
            let mut commands = Vec::new();
            loop {
                match Command::read_from(&mut conn) {
                    Ok(cmd) => commands.push(cmd),
                    Err(e) if e.is_connection_closed() => break,
                    Err(e) => panic!("listener error: {}", e),
                }
            }
            commands
        });
        (port, handle)
    }

    fn temp_prg(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_commands_reach_listener() {
        let (port, listener) = spawn_collector();
        let prg = temp_prg(&[0x01, 0x08, 0xEA, 0x60]);

        let mut session = Session::new();
        session.connect("127.0.0.1", port).unwrap();
        assert!(session.is_connected());

        session.send_reset().unwrap();
        session.send_poke(0xD021, 6).unwrap();
        let target = session.step_poke(-1).unwrap();
        assert_eq!(target, PokeTarget { address: 0xD021, value: 5 });
        session.send_type_text("RUN\r").unwrap();
        session.load_image(prg.path()).unwrap();
        session.send_start_program().unwrap();
        assert!(session.disconnect());
        assert!(!session.is_connected());

        let commands = listener.join().unwrap();
        assert_eq!(
            commands,
            vec![
                Command::Reset,
                Command::Poke { address: 0xD021, value: 6 },
                Command::Poke { address: 0xD021, value: 5 },
                Command::type_text("RUN\r"),
                Command::StartProgram(vec![0x01, 0x08, 0xEA, 0x60]),
            ]
        );
    }

    #[test]
    fn test_not_connected() {
        let mut session = Session::new();
        assert!(matches!(session.send_reset(), Err(Error::NotConnected)));
        assert!(matches!(session.send_poke(0x0400, 1), Err(Error::NotConnected)));
        assert!(!session.disconnect());
    }

    #[test]
    fn test_failed_connect_leaves_nothing() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut session = Session::new();
        match session.connect("127.0.0.1", port) {
            Err(Error::Transport(TransportError::Connect { .. })) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(!session.is_connected());
        assert!(session.peer_addr().is_none());
    }

    #[test]
    fn test_start_program_checks_before_io() {
        let mut session = Session::new();
        assert!(matches!(session.send_start_program(), Err(Error::NoProgram)));

        let big = temp_prg(&vec![0u8; MAX_PRG_SIZE]);
        session.load_image(big.path()).unwrap();
        assert!(session.image().unwrap().is_valid());
        assert!(matches!(
            session.send_start_program(),
            Err(Error::ProgramTooLarge { size: MAX_PRG_SIZE })
        ));

        let short = temp_prg(&[0x01]);
        session.load_image(short.path()).unwrap();
        assert!(matches!(
            session.send_start_program(),
            Err(Error::InvalidProgram { size: 1 })
        ));
    }

    #[test]
    fn test_failed_load_keeps_previous_image() {
        let prg = temp_prg(&[0x00, 0xC0, 0x60]);
        let mut session = Session::new();
        session.load_image(prg.path()).unwrap();

        let missing = prg.path().with_extension("missing");
        assert!(matches!(session.load_image(&missing), Err(Error::Load { .. })));

        let status = session.image_status().unwrap();
        assert_eq!(status.path, prg.path());
        assert_eq!(status.size, 3);
        assert!(status.valid);
        assert_eq!(status.load_address, Some(0xC000));
        assert_eq!(status.end_address, Some(0xC000));
    }

    #[test]
    fn test_reload_image() {
        let mut session = Session::new();
        assert!(matches!(session.reload_image(), Err(Error::NoProgram)));

        let mut prg = temp_prg(&[0x01, 0x08]);
        session.load_image(prg.path()).unwrap();
        prg.write_all(&[0x60]).unwrap();
        prg.flush().unwrap();
        assert_eq!(session.reload_image().unwrap().len(), 3);
    }

    #[test]
    fn test_transport_error_drops_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let mut session = Session::new();
        session.connect("127.0.0.1", port).unwrap();
        server.join().unwrap();

        // the first writes may still be buffered by the OS
        let mut failure = None;
        for _ in 0..200 {
            if let Err(e) = session.send_poke(0xD020, 1) {
                failure = Some(e);
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(matches!(failure, Some(Error::Transport(_))));
        assert!(!session.is_connected());
        assert!(matches!(session.send_reset(), Err(Error::NotConnected)));
    }
}
