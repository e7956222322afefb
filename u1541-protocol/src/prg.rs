//! PRG program images.
//!
//! A PRG file is a 2-byte little-endian load address followed by the bytes
//! the KERNAL loader stores from that address on.

use std::path::{Path, PathBuf};

use crate::error::Error;

/// Smallest valid image: just the load address
pub const MIN_PRG_SIZE: usize = 2;

/// 202 blocks of 256 bytes on a 1541 disk, plus the load address
pub const MAX_PRG_SIZE: usize = 2 + 202 * 256;

/// A program image read from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    path: PathBuf,
    data: Vec<u8>,
}

impl ProgramImage {
    /// Read the whole file at `path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| Error::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(ProgramImage {
            path: path.to_path_buf(),
            data,
        })
    }

    pub fn from_bytes<P: Into<PathBuf>>(path: P, data: Vec<u8>) -> Self {
        ProgramImage {
            path: path.into(),
            data,
        }
    }

    /// Read the image again from the path it was loaded from
    pub fn reload(&self) -> Result<Self, Error> {
        Self::load(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw file contents, load address included
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        (MIN_PRG_SIZE..=MAX_PRG_SIZE).contains(&self.data.len())
    }

    /// Load address from the header, if the image has one
    pub fn load_address(&self) -> Option<u16> {
        match self.data.as_slice() {
            [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }

    /// Bytes that end up in memory
    pub fn body(&self) -> &[u8] {
        self.data.get(MIN_PRG_SIZE..).unwrap_or(&[])
    }

    /// Last address written by the loader. Wraps past $FFFF like the
    /// loader does.
    pub fn end_address(&self) -> Option<u16> {
        let start = self.load_address()?;
        let body = self.body().len();
        if body == 0 {
            return None;
        }
        Some(start.wrapping_add((body - 1) as u16))
    }
}
