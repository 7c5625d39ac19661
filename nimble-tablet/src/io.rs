use std::io::{Read, Seek, SeekFrom};
use std::sync::Mutex;

use bytes::Bytes;
use nimble_error::{NimbleResult, nimble_bail};

/// Positioned reads over an immutable byte source.
pub trait ReadFile: Send + Sync {
    fn size(&self) -> NimbleResult<u64>;

    /// Read exactly `length` bytes starting at `offset`.
    fn read_at(&self, offset: u64, length: usize) -> NimbleResult<Bytes>;
}

/// An append-only byte sink.
pub trait WriteFile: Send {
    fn append(&mut self, data: &[u8]) -> NimbleResult<()>;

    /// Bytes appended so far.
    fn size(&self) -> u64;
}

impl ReadFile for Bytes {
    fn size(&self) -> NimbleResult<u64> {
        Ok(self.len() as u64)
    }

    fn read_at(&self, offset: u64, length: usize) -> NimbleResult<Bytes> {
        let offset = offset as usize;
        if offset + length > self.len() {
            nimble_bail!(
                IoError: "read past end: offset {} length {} of {} bytes",
                offset,
                length,
                self.len()
            );
        }
        Ok(self.slice(offset..offset + length))
    }
}

/// An in-memory [`WriteFile`], convertible into [`Bytes`] for reading back.
#[derive(Default)]
pub struct InMemoryFile {
    buffer: Vec<u8>,
}

impl InMemoryFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buffer)
    }
}

impl WriteFile for InMemoryFile {
    fn append(&mut self, data: &[u8]) -> NimbleResult<()> {
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.buffer.len() as u64
    }
}

/// A [`ReadFile`] over a local file, using seek-and-read under a lock.
pub struct LocalReadFile {
    file: Mutex<std::fs::File>,
    size: u64,
}

impl LocalReadFile {
    pub fn open(path: impl AsRef<std::path::Path>) -> NimbleResult<Self> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }
}

impl ReadFile for LocalReadFile {
    fn size(&self) -> NimbleResult<u64> {
        Ok(self.size)
    }

    fn read_at(&self, offset: u64, length: usize) -> NimbleResult<Bytes> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| nimble_error::nimble_err!(IoError: "file lock poisoned"))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; length];
        file.read_exact(&mut buffer)?;
        Ok(Bytes::from(buffer))
    }
}
