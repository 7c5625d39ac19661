use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use nimble_common::{CompressionKind, decompress};
use nimble_error::{NimbleResult, nimble_bail};
use nimble_schema::{EncodingLayoutTree, SchemaNode, StreamOffset};

use crate::{Footer, POSTSCRIPT_SIZE, Postscript, ReadFile, StreamMetadata};

/// A read-only handle to a tablet: the footer plus lazy access to stripe
/// stream bytes. The tablet owns the file reference; stream handles hold
/// zero-copy slices for the life of the stripe read.
pub struct Tablet {
    file: Arc<dyn ReadFile>,
    footer: Footer,
}

impl Tablet {
    /// Open a tablet: read and verify the postscript, checksum and footer.
    pub fn open(file: Arc<dyn ReadFile>) -> NimbleResult<Self> {
        let size = file.size()?;
        if (size as usize) < POSTSCRIPT_SIZE {
            nimble_bail!(MalformedFile: "file of {} bytes is too small for a tablet", size);
        }
        let postscript =
            Postscript::read(file.read_at(size - POSTSCRIPT_SIZE as u64, POSTSCRIPT_SIZE)?)?;

        let footer_length = postscript.footer_length as u64;
        if footer_length + POSTSCRIPT_SIZE as u64 > size {
            nimble_bail!(MalformedFile: "footer of {} bytes exceeds file size", footer_length);
        }
        let footer_bytes = file.read_at(
            size - POSTSCRIPT_SIZE as u64 - footer_length,
            postscript.footer_length as usize,
        )?;

        let computed = postscript.checksum_kind.checksum(&footer_bytes);
        if computed != postscript.checksum {
            nimble_bail!(
                MalformedFile: "footer checksum mismatch: computed {:#x}, stored {:#x}",
                computed,
                postscript.checksum
            );
        }

        let footer = Footer::deserialize(decompress(
            postscript.footer_compression,
            footer_bytes,
        )?)?;
        Ok(Self { file, footer })
    }

    pub fn schema(&self) -> &SchemaNode {
        &self.footer.schema
    }

    pub fn metadata(&self) -> &[(String, String)] {
        &self.footer.metadata
    }

    pub fn layout_tree(&self) -> Option<&EncodingLayoutTree> {
        self.footer.layout_tree.as_ref()
    }

    pub fn stripe_count(&self) -> usize {
        self.footer.stripes.len()
    }

    /// Total rows across all stripes.
    pub fn row_count(&self) -> u64 {
        self.footer
            .stripes
            .iter()
            .map(|s| u64::from(s.row_count))
            .sum()
    }

    pub fn stripe_row_count(&self, stripe: usize) -> u32 {
        self.footer.stripes[stripe].row_count
    }

    pub fn stripe_offset(&self, stripe: usize) -> u64 {
        self.footer.stripes[stripe].offset
    }

    pub fn stream_count(&self, stripe: usize) -> usize {
        self.footer.streams[stripe].len()
    }

    pub fn stream_offsets(&self, stripe: usize) -> Vec<u32> {
        self.footer.streams[stripe].iter().map(|s| s.offset).collect()
    }

    pub fn stream_sizes(&self, stripe: usize) -> Vec<u32> {
        self.footer.streams[stripe].iter().map(|s| s.size).collect()
    }

    /// Lazy handles for `stream_ids` within `stripe`, in positional order.
    /// A stream that is empty in this stripe yields `None`.
    pub fn load(
        &self,
        stripe: usize,
        stream_ids: &[StreamOffset],
    ) -> NimbleResult<Vec<Option<StreamHandle>>> {
        if stripe >= self.footer.stripes.len() {
            nimble_bail!(
                "stripe {} out of range ({} stripes)",
                stripe,
                self.footer.stripes.len()
            );
        }
        let stripe_offset = self.footer.stripes[stripe].offset;
        let table = &self.footer.streams[stripe];
        Ok(stream_ids
            .iter()
            .map(|id| {
                table
                    .get(*id as usize)
                    .filter(|meta| !meta.is_absent())
                    .map(|meta| StreamHandle::new(self.file.clone(), stripe_offset, *meta))
            })
            .collect())
    }
}

/// A lazily-read stream byte range. No I/O happens until
/// [`bytes`](StreamHandle::bytes) is first called; the result is cached for
/// the life of the handle.
pub struct StreamHandle {
    file: Arc<dyn ReadFile>,
    absolute_offset: u64,
    metadata: StreamMetadata,
    cached: OnceLock<Bytes>,
}

impl StreamHandle {
    fn new(file: Arc<dyn ReadFile>, stripe_offset: u64, metadata: StreamMetadata) -> Self {
        Self {
            file,
            absolute_offset: stripe_offset + u64::from(metadata.offset),
            metadata,
            cached: OnceLock::new(),
        }
    }

    pub fn size(&self) -> u32 {
        self.metadata.size
    }

    /// The stream's bytes, decompressed if the stream table says so.
    pub fn bytes(&self) -> NimbleResult<Bytes> {
        if let Some(bytes) = self.cached.get() {
            return Ok(bytes.clone());
        }
        let raw = self
            .file
            .read_at(self.absolute_offset, self.metadata.size as usize)?;
        let bytes = match self.metadata.compression {
            CompressionKind::Uncompressed => raw,
            other => decompress(other, raw)?,
        };
        Ok(self.cached.get_or_init(|| bytes).clone())
    }
}
