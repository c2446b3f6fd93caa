//! Byte sources feeding the stream driver.
//!
//! Two implementations of one contract: [`MemSource`] over a read-only
//! memory mapping (or plain file contents when mapping is unavailable)
//! and [`BufferedSource`] over a buffered file reader.

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use anyhow::Context;
use bytes::Bytes;
use memmap2::Mmap;

use crate::{error::ParseError, helper::AnyResult};

/// Default buffer size for [`BufferedSource`], one page.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Read interface over snapshot bytes.
///
/// `read_exact` returns a view that is only valid until the next call on
/// the source; callers copy what they need to keep. Every read fails with
/// [`ParseError::UnexpectedEndOfInput`] when fewer bytes remain than
/// requested.
pub trait Source {
    /// Advances the cursor past `n` bytes.
    fn skip(&mut self, n: usize) -> AnyResult<()>;

    fn read_u8(&mut self) -> AnyResult<u8>;

    fn read_exact(&mut self, n: usize) -> AnyResult<&[u8]>;

    fn read_le_i16(&mut self) -> AnyResult<i64> {
        let b = self.read_exact(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]) as i64)
    }

    fn read_le_i32(&mut self) -> AnyResult<i64> {
        let b = self.read_exact(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64)
    }

    fn read_le_i64(&mut self) -> AnyResult<i64> {
        let b = self.read_exact(8)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_be_i32(&mut self) -> AnyResult<i64> {
        let b = self.read_exact(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as i64)
    }

    fn read_be_i64(&mut self) -> AnyResult<i64> {
        let b = self.read_exact(8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}

enum Backing {
    Mapped(Mmap),
    Owned(Bytes),
}

impl AsRef<[u8]> for Backing {
    fn as_ref(&self) -> &[u8] {
        match self {
            Backing::Mapped(map) => map,
            Backing::Owned(bytes) => bytes,
        }
    }
}

/// In-memory byte source: a read-only mapping of the snapshot file, or
/// owned bytes when mapping fails or the snapshot is already in memory.
///
/// Reads never block once the mapping is in place, and `read_exact`
/// borrows straight from the backing without copying.
pub struct MemSource {
    data: Backing,
    pos: usize,
}

impl MemSource {
    pub fn open(path: impl AsRef<Path>) -> AnyResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        // Safety: the mapping is read-only and the snapshot file is not
        // expected to change underneath a running parse.
        match unsafe { Mmap::map(&file) } {
            Ok(map) => Ok(Self {
                data: Backing::Mapped(map),
                pos: 0,
            }),
            Err(_) => {
                let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
                Ok(Self::from_bytes(data))
            }
        }
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            data: Backing::Owned(data.into()),
            pos: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.data.as_ref().len() - self.pos
    }
}

impl Source for MemSource {
    fn skip(&mut self, n: usize) -> AnyResult<()> {
        if n > self.remaining() {
            return Err(ParseError::UnexpectedEndOfInput.into());
        }
        self.pos += n;
        Ok(())
    }

    fn read_u8(&mut self) -> AnyResult<u8> {
        let b = self.read_exact(1)?;
        Ok(b[0])
    }

    fn read_exact(&mut self, n: usize) -> AnyResult<&[u8]> {
        if n > self.remaining() {
            return Err(ParseError::UnexpectedEndOfInput.into());
        }
        self.pos += n;
        Ok(&self.data.as_ref()[self.pos - n..self.pos])
    }
}

/// Buffered file source; `read_exact` fills an internal scratch buffer.
pub struct BufferedSource {
    reader: BufReader<File>,
    scratch: Vec<u8>,
}

impl BufferedSource {
    /// Opens `path` with a buffer of at least `buffer_size` bytes; zero
    /// selects [`DEFAULT_BUFFER_SIZE`].
    pub fn open(path: impl AsRef<Path>, buffer_size: usize) -> AnyResult<Self> {
        let path = path.as_ref();
        let size = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            buffer_size
        };
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        Ok(Self {
            reader: BufReader::with_capacity(size, file),
            scratch: Vec::new(),
        })
    }

    /// Closes the underlying file.
    pub fn close(self) -> AnyResult<()> {
        drop(self.reader.into_inner());
        Ok(())
    }
}

fn map_eof(err: io::Error) -> anyhow::Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ParseError::UnexpectedEndOfInput.into()
    } else {
        err.into()
    }
}

impl Source for BufferedSource {
    fn skip(&mut self, n: usize) -> AnyResult<()> {
        self.reader
            .seek_relative(n as i64)
            .map_err(map_eof)
            .context("skip bytes")
    }

    fn read_u8(&mut self) -> AnyResult<u8> {
        let b = self.read_exact(1)?;
        Ok(b[0])
    }

    fn read_exact(&mut self, n: usize) -> AnyResult<&[u8]> {
        self.scratch.resize(n, 0);
        self.reader.read_exact(&mut self.scratch).map_err(map_eof)?;
        Ok(&self.scratch)
    }
}
