use bytes::Bytes;
use nimble_error::{NimbleResult, nimble_bail};

/// Compression identifiers as stored in chunk headers and stream tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressionKind {
    Uncompressed = 0,
    Zstd = 1,
    /// Recognised for compatibility; this implementation never produces it
    /// and cannot read it.
    MetaInternal = 2,
}

impl CompressionKind {
    pub fn from_u8(value: u8) -> NimbleResult<Self> {
        match value {
            0 => Ok(Self::Uncompressed),
            1 => Ok(Self::Zstd),
            2 => Ok(Self::MetaInternal),
            other => nimble_bail!(MalformedEncoding: "unknown compression kind {}", other),
        }
    }
}

impl std::fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uncompressed => "uncompressed",
            Self::Zstd => "zstd",
            Self::MetaInternal => "meta-internal",
        };
        write!(f, "{name}")
    }
}

/// Knobs for compression performed on encoded payloads.
#[derive(Debug, Clone)]
pub struct CompressionOptions {
    /// Compression is kept only when `compressed_len <= accept_ratio * raw_len`.
    pub accept_ratio: f32,
    pub zstd_level: i32,
    /// Payloads below this size are never compressed.
    pub min_compression_size: usize,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            accept_ratio: 0.9,
            zstd_level: 3,
            min_compression_size: 64,
        }
    }
}

/// Compress `payload`, returning `None` when compression does not pay off
/// under `options`.
pub fn try_compress(payload: &[u8], options: &CompressionOptions) -> NimbleResult<Option<Vec<u8>>> {
    if payload.len() < options.min_compression_size {
        return Ok(None);
    }
    let compressed = zstd::bulk::compress(payload, options.zstd_level)
        .map_err(|e| nimble_error::nimble_err!(IoError: "zstd compress: {}", e))?;
    if (compressed.len() as f64) <= (payload.len() as f64) * f64::from(options.accept_ratio) {
        Ok(Some(compressed))
    } else {
        Ok(None)
    }
}

/// Decompress `payload` according to `kind`.
pub fn decompress(kind: CompressionKind, payload: Bytes) -> NimbleResult<Bytes> {
    match kind {
        CompressionKind::Uncompressed => Ok(payload),
        CompressionKind::Zstd => {
            let decompressed = zstd::decode_all(payload.as_ref())
                .map_err(|e| nimble_error::nimble_err!(MalformedEncoding: "zstd decompress: {}", e))?;
            Ok(Bytes::from(decompressed))
        }
        CompressionKind::MetaInternal => {
            nimble_bail!(UnsupportedDataType: "meta-internal compression is not supported")
        }
    }
}
