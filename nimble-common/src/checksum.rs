use nimble_error::{NimbleResult, nimble_bail};
use xxhash_rust::xxh64::xxh64;

/// Checksum algorithm identifiers as stored in the file trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChecksumKind {
    None = 0,
    XxHash64 = 1,
}

impl ChecksumKind {
    pub fn from_u8(value: u8) -> NimbleResult<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::XxHash64),
            other => nimble_bail!(MalformedFile: "unknown checksum kind {}", other),
        }
    }

    /// Checksum `bytes`. [`ChecksumKind::None`] always yields zero.
    pub fn checksum(&self, bytes: &[u8]) -> u64 {
        match self {
            Self::None => 0,
            Self::XxHash64 => xxh64(bytes, 0),
        }
    }
}
