use nimble_common::{ChecksumKind, CompressionKind, CompressionOptions, try_compress};
use nimble_error::{NimbleResult, nimble_bail};
use nimble_schema::{EncodingLayoutTree, SchemaNode, StreamOffset};

use crate::{Footer, Postscript, StreamMetadata, StripeMetadata, WriteFile};
use crate::{MAJOR_VERSION, MINOR_VERSION};

/// One stream's bytes within a stripe being written, in layout order.
#[derive(Debug)]
pub struct StripeStream {
    /// The stream's descriptor offset (its identifier).
    pub id: StreamOffset,
    /// Framed chunk bytes.
    pub content: Vec<u8>,
}

/// Append-only tablet writer: stripes first, footer and postscript at
/// finish. Stripes are immutable once written.
pub struct TabletWriter<W: WriteFile> {
    file: W,
    stripes: Vec<StripeMetadata>,
    streams: Vec<Vec<StreamMetadata>>,
    checksum_kind: ChecksumKind,
    footer_compression: CompressionOptions,
}

impl<W: WriteFile> TabletWriter<W> {
    pub fn new(file: W) -> Self {
        Self {
            file,
            stripes: Vec::new(),
            streams: Vec::new(),
            checksum_kind: ChecksumKind::XxHash64,
            footer_compression: CompressionOptions::default(),
        }
    }

    /// Bytes of stripes written so far.
    pub fn size(&self) -> u64 {
        self.file.size()
    }

    /// Append one stripe. `streams` arrive in their final on-disk order (the
    /// layout planner has already run); the stream table is indexed by
    /// stream identifier, with zero-size entries for streams this stripe
    /// does not carry.
    pub fn write_stripe(&mut self, row_count: u32, streams: &[StripeStream]) -> NimbleResult<()> {
        let stripe_offset = self.file.size();

        let table_len = streams
            .iter()
            .map(|s| s.id as usize + 1)
            .max()
            .unwrap_or(0);
        let mut table = vec![StreamMetadata::absent(); table_len];

        let mut relative = 0u64;
        for stream in streams {
            if stream.content.is_empty() {
                continue;
            }
            if !table[stream.id as usize].is_absent() {
                nimble_bail!("stream {} appears twice in stripe", stream.id);
            }
            if relative + stream.content.len() as u64 > u64::from(u32::MAX) {
                nimble_bail!("stripe exceeds u32 addressing");
            }
            table[stream.id as usize] = StreamMetadata {
                offset: relative as u32,
                size: stream.content.len() as u32,
                compression: CompressionKind::Uncompressed,
            };
            self.file.append(&stream.content)?;
            relative += stream.content.len() as u64;
        }

        self.stripes.push(StripeMetadata {
            offset: stripe_offset,
            size: relative as u32,
            row_count,
        });
        self.streams.push(table);
        Ok(())
    }

    /// Write the footer and postscript, returning the underlying file.
    pub fn finish(
        mut self,
        schema: &SchemaNode,
        metadata: Vec<(String, String)>,
        layout_tree: Option<EncodingLayoutTree>,
    ) -> NimbleResult<W> {
        let footer = Footer {
            schema: schema.clone(),
            stripes: std::mem::take(&mut self.stripes),
            streams: std::mem::take(&mut self.streams),
            metadata,
            layout_tree,
        };
        let raw = footer.serialize()?;
        let (footer_compression, body) = match try_compress(&raw, &self.footer_compression)? {
            Some(compressed) => (CompressionKind::Zstd, compressed),
            None => (CompressionKind::Uncompressed, raw),
        };
        if body.len() > u32::MAX as usize {
            nimble_bail!("footer exceeds u32 length: {}", body.len());
        }
        self.file.append(&body)?;

        let postscript = Postscript {
            footer_length: body.len() as u32,
            checksum: self.checksum_kind.checksum(&body),
            checksum_kind: self.checksum_kind,
            footer_compression,
            minor_version: MINOR_VERSION,
            major_version: MAJOR_VERSION,
        };
        let mut trailer = Vec::new();
        postscript.write(&mut trailer);
        self.file.append(&trailer)?;
        Ok(self.file)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use nimble_common::CompressionOptions;
    use nimble_encodings::{Selector, encode_values};
    use nimble_schema::ScalarKind;

    use super::*;
    use crate::{ChunkedDecoder, InMemoryFile, Tablet, write_chunk};

    fn scalar_schema() -> SchemaNode {
        SchemaNode::Row {
            nulls: 0,
            names: vec!["v".into()],
            children: vec![SchemaNode::Scalar {
                kind: ScalarKind::UInt32,
                values: 1,
            }],
        }
    }

    fn stream_of(values: &[u32]) -> Vec<u8> {
        let encoded = encode_values(&Selector::learned(), values).unwrap();
        let mut content = Vec::new();
        write_chunk(&encoded.bytes, &CompressionOptions::default(), &mut content).unwrap();
        content
    }

    #[test]
    fn tablet_round_trip() {
        let mut writer = TabletWriter::new(InMemoryFile::new());
        writer
            .write_stripe(
                3,
                &[StripeStream {
                    id: 1,
                    content: stream_of(&[10, 20, 30]),
                }],
            )
            .unwrap();
        writer
            .write_stripe(
                2,
                &[StripeStream {
                    id: 1,
                    content: stream_of(&[40, 50]),
                }],
            )
            .unwrap();
        let file = writer
            .finish(
                &scalar_schema(),
                vec![("origin".into(), "test".into())],
                None,
            )
            .unwrap();

        let tablet = Tablet::open(Arc::new(file.into_bytes())).unwrap();
        assert_eq!(tablet.stripe_count(), 2);
        assert_eq!(tablet.row_count(), 5);
        assert_eq!(tablet.stripe_row_count(0), 3);
        assert_eq!(tablet.stripe_row_count(1), 2);
        assert_eq!(tablet.stripe_offset(0), 0);
        assert!(tablet.stripe_offset(1) > 0);
        assert_eq!(tablet.metadata(), &[("origin".into(), "test".into())]);

        // Stream 0 (row nulls) was never written; stream 1 holds the values.
        let handles = tablet.load(1, &[0, 1]).unwrap();
        assert!(handles[0].is_none());
        let handle = handles[1].as_ref().unwrap();
        let mut decoder = ChunkedDecoder::<u32>::new(handle.bytes().unwrap());
        let mut out = Vec::new();
        decoder.materialize(2, &mut out).unwrap();
        assert_eq!(out, vec![40, 50]);
    }

    #[test]
    fn corrupt_checksum_rejected() {
        let mut writer = TabletWriter::new(InMemoryFile::new());
        writer
            .write_stripe(
                1,
                &[StripeStream {
                    id: 1,
                    content: stream_of(&[1]),
                }],
            )
            .unwrap();
        let bytes = writer
            .finish(&scalar_schema(), Vec::new(), None)
            .unwrap()
            .into_bytes();

        // Flip one byte inside the footer.
        let mut corrupted = bytes.to_vec();
        let target = corrupted.len() - crate::POSTSCRIPT_SIZE - 3;
        corrupted[target] ^= 0xFF;
        assert!(Tablet::open(Arc::new(Bytes::from(corrupted))).is_err());
    }

    #[test]
    fn truncated_file_rejected() {
        assert!(Tablet::open(Arc::new(Bytes::from_static(b"short"))).is_err());
    }

    #[test]
    fn empty_tablet() {
        let writer = TabletWriter::new(InMemoryFile::new());
        let bytes = writer
            .finish(&scalar_schema(), Vec::new(), None)
            .unwrap()
            .into_bytes();
        let tablet = Tablet::open(Arc::new(bytes)).unwrap();
        assert_eq!(tablet.stripe_count(), 0);
        assert_eq!(tablet.row_count(), 0);
    }
}
