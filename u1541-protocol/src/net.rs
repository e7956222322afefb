//! Process-wide network set-up.
//!
//! The standard library starts the platform socket layer (WinSock) on first
//! use and tears it down at exit, so the guard has no platform work to do.
//! Binaries still create exactly one at start-up, which keeps the life time
//! of networking explicit.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::debug;

static ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetError {
    #[error("network already initialised")]
    AlreadyInitialised,
}

/// Scoped network initialiser. Only one may be alive at a time.
#[derive(Debug)]
pub struct Net {
    _private: (),
}

impl Net {
    pub fn init() -> Result<Net, NetError> {
        if ACTIVE.swap(true, Ordering::AcqRel) {
            return Err(NetError::AlreadyInitialised);
        }
        debug!("network initialised");
        Ok(Net { _private: () })
    }
}

impl Drop for Net {
    fn drop(&mut self) {
        ACTIVE.store(false, Ordering::Release);
        debug!("network shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_guard() {
        let net = Net::init().unwrap();
        assert_eq!(Net::init().unwrap_err(), NetError::AlreadyInitialised);
        drop(net);
        assert!(Net::init().is_ok());
    }
}
