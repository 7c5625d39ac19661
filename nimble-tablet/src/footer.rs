use bytes::Bytes;
use nimble_common::{ByteCursor, ChecksumKind, CompressionKind, write_string};
use nimble_error::{NimbleResult, nimble_bail};
use nimble_schema::{EncodingLayoutTree, SchemaNode, read_schema, write_schema};

/// The magic number at the very end of every tablet.
pub const MAGIC: u16 = 0xA1FA;
pub const MAJOR_VERSION: u16 = 1;
pub const MINOR_VERSION: u16 = 0;

/// Trailing bytes after the footer: footer length (4), checksum (8),
/// checksum kind (1), footer compression (1), minor/major version (4),
/// magic (2).
pub const POSTSCRIPT_SIZE: usize = 20;

/// One stripe's entry in the stripe index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeMetadata {
    /// Absolute byte offset of the stripe in the file.
    pub offset: u64,
    pub size: u32,
    pub row_count: u32,
}

/// One stream's entry in a stripe's stream table. Entries are dense by
/// stream identifier; an absent stream has zero size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMetadata {
    /// Byte offset relative to the stripe start.
    pub offset: u32,
    pub size: u32,
    pub compression: CompressionKind,
}

impl StreamMetadata {
    pub fn absent() -> Self {
        Self {
            offset: 0,
            size: 0,
            compression: CompressionKind::Uncompressed,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.size == 0
    }
}

/// The decoded file footer.
#[derive(Debug, Clone, PartialEq)]
pub struct Footer {
    pub schema: SchemaNode,
    pub stripes: Vec<StripeMetadata>,
    /// Per stripe, the stream table indexed by stream identifier.
    pub streams: Vec<Vec<StreamMetadata>>,
    pub metadata: Vec<(String, String)>,
    pub layout_tree: Option<EncodingLayoutTree>,
}

impl Footer {
    /// Serialise the footer body (before compression).
    pub fn serialize(&self) -> NimbleResult<Vec<u8>> {
        let mut schema_bytes = Vec::new();
        write_schema(&self.schema, &mut schema_bytes)?;

        let mut out = Vec::new();
        write_string(&schema_bytes, &mut out);

        out.extend_from_slice(&(self.stripes.len() as u32).to_le_bytes());
        for stripe in &self.stripes {
            out.extend_from_slice(&stripe.offset.to_le_bytes());
            out.extend_from_slice(&stripe.size.to_le_bytes());
            out.extend_from_slice(&stripe.row_count.to_le_bytes());
        }
        if self.streams.len() != self.stripes.len() {
            nimble_bail!(
                "stream table count {} does not match stripe count {}",
                self.streams.len(),
                self.stripes.len()
            );
        }
        for table in &self.streams {
            out.extend_from_slice(&(table.len() as u32).to_le_bytes());
            for stream in table {
                out.extend_from_slice(&stream.offset.to_le_bytes());
                out.extend_from_slice(&stream.size.to_le_bytes());
                out.push(stream.compression as u8);
            }
        }

        out.extend_from_slice(&(self.metadata.len() as u32).to_le_bytes());
        for (key, value) in &self.metadata {
            write_string(key.as_bytes(), &mut out);
            write_string(value.as_bytes(), &mut out);
        }

        match &self.layout_tree {
            Some(tree) => {
                let mut tree_bytes = Vec::new();
                tree.serialize(&mut tree_bytes)?;
                write_string(&tree_bytes, &mut out);
            }
            None => out.extend_from_slice(&0u32.to_le_bytes()),
        }
        Ok(out)
    }

    /// Parse a footer body.
    pub fn deserialize(bytes: Bytes) -> NimbleResult<Self> {
        let mut cursor = ByteCursor::new(bytes);
        let schema_bytes = cursor.read_string()?;
        let schema = read_schema(&mut ByteCursor::new(schema_bytes))?;

        let stripe_count = cursor.read_u32()? as usize;
        let mut stripes = Vec::with_capacity(stripe_count);
        for _ in 0..stripe_count {
            stripes.push(StripeMetadata {
                offset: cursor.read_u64()?,
                size: cursor.read_u32()?,
                row_count: cursor.read_u32()?,
            });
        }
        let mut streams = Vec::with_capacity(stripe_count);
        for _ in 0..stripe_count {
            let stream_count = cursor.read_u32()? as usize;
            let mut table = Vec::with_capacity(stream_count);
            for _ in 0..stream_count {
                table.push(StreamMetadata {
                    offset: cursor.read_u32()?,
                    size: cursor.read_u32()?,
                    compression: CompressionKind::from_u8(cursor.read_u8()?)?,
                });
            }
            streams.push(table);
        }

        let metadata_count = cursor.read_u32()? as usize;
        let mut metadata = Vec::with_capacity(metadata_count);
        for _ in 0..metadata_count {
            let key = string_from_bytes(cursor.read_string()?)?;
            let value = string_from_bytes(cursor.read_string()?)?;
            metadata.push((key, value));
        }

        let tree_bytes = cursor.read_string()?;
        let layout_tree = if tree_bytes.is_empty() {
            None
        } else {
            Some(EncodingLayoutTree::deserialize(&mut ByteCursor::new(
                tree_bytes,
            ))?)
        };

        Ok(Self {
            schema,
            stripes,
            streams,
            metadata,
            layout_tree,
        })
    }
}

fn string_from_bytes(bytes: Bytes) -> NimbleResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| nimble_error::nimble_err!(MalformedFile: "metadata is not utf-8"))
}

/// The fixed-size trailer at the end of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Postscript {
    pub footer_length: u32,
    pub checksum: u64,
    pub checksum_kind: ChecksumKind,
    pub footer_compression: CompressionKind,
    pub minor_version: u16,
    pub major_version: u16,
}

impl Postscript {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.footer_length.to_le_bytes());
        out.extend_from_slice(&self.checksum.to_le_bytes());
        out.push(self.checksum_kind as u8);
        out.push(self.footer_compression as u8);
        out.extend_from_slice(&self.minor_version.to_le_bytes());
        out.extend_from_slice(&self.major_version.to_le_bytes());
        out.extend_from_slice(&MAGIC.to_le_bytes());
    }

    pub fn read(bytes: Bytes) -> NimbleResult<Self> {
        if bytes.len() != POSTSCRIPT_SIZE {
            nimble_bail!(MalformedFile: "postscript must be {} bytes", POSTSCRIPT_SIZE);
        }
        let mut cursor = ByteCursor::new(bytes);
        let footer_length = cursor.read_u32()?;
        let checksum = cursor.read_u64()?;
        let checksum_kind = ChecksumKind::from_u8(cursor.read_u8()?)?;
        let footer_compression = CompressionKind::from_u8(cursor.read_u8()?)?;
        let minor_version = cursor.read_u16()?;
        let major_version = cursor.read_u16()?;
        let magic = cursor.read_u16()?;
        if magic != MAGIC {
            nimble_bail!(MalformedFile: "bad magic {:#06x}, expected {:#06x}", magic, MAGIC);
        }
        if major_version > MAJOR_VERSION {
            nimble_bail!(
                MalformedFile: "unsupported major version {} (reader supports up to {})",
                major_version,
                MAJOR_VERSION
            );
        }
        Ok(Self {
            footer_length,
            checksum,
            checksum_kind,
            footer_compression,
            minor_version,
            major_version,
        })
    }
}
