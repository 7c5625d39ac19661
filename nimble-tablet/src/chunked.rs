use bytes::Bytes;
use nimble_common::{CompressionKind, CompressionOptions, decompress, try_compress};
use nimble_encodings::{Decoder, EncodingValue};
use nimble_error::{NimbleResult, nimble_bail};

/// Bytes framing each chunk: `length (4B LE)` + `compression (1B)` +
/// `reserved (1B)`.
pub const CHUNK_FRAME_SIZE: usize = 6;

/// Frame one encoded payload as a chunk, appending to `out`. Returns the
/// compression that was applied.
pub fn write_chunk(
    payload: &[u8],
    options: &CompressionOptions,
    out: &mut Vec<u8>,
) -> NimbleResult<CompressionKind> {
    let (kind, body) = match try_compress(payload, options)? {
        Some(compressed) => (CompressionKind::Zstd, compressed),
        None => (CompressionKind::Uncompressed, payload.to_vec()),
    };
    if body.len() > u32::MAX as usize {
        nimble_bail!("chunk payload exceeds u32 length: {}", body.len());
    }
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.push(kind as u8);
    out.push(0); // reserved
    out.extend_from_slice(&body);
    Ok(kind)
}

/// A lazy decoder over a chunked stream.
///
/// Only the current chunk's decoding state is held; crossing a chunk boundary
/// drops it and instantiates the next chunk's encoding. An empty stream has
/// zero chunks and zero rows.
pub struct ChunkedDecoder<T: EncodingValue> {
    stream: Bytes,
    /// Byte position of the next chunk frame.
    next_chunk: usize,
    current: Option<Decoder<T>>,
}

impl<T: EncodingValue> ChunkedDecoder<T> {
    pub fn new(stream: Bytes) -> Self {
        Self {
            stream,
            next_chunk: 0,
            current: None,
        }
    }

    /// An always-empty stream.
    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }

    /// Load the next chunk, returning `false` at end of stream.
    fn advance_chunk(&mut self) -> NimbleResult<bool> {
        self.current = None;
        if self.next_chunk == self.stream.len() {
            return Ok(false);
        }
        if self.stream.len() - self.next_chunk < CHUNK_FRAME_SIZE {
            nimble_bail!(MalformedEncoding: "truncated chunk frame");
        }
        let frame = &self.stream[self.next_chunk..self.next_chunk + CHUNK_FRAME_SIZE];
        let length = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        let compression = CompressionKind::from_u8(frame[4])?;
        let body_start = self.next_chunk + CHUNK_FRAME_SIZE;
        if self.stream.len() - body_start < length {
            nimble_bail!(
                MalformedEncoding: "chunk declares {} bytes, {} remain",
                length,
                self.stream.len() - body_start
            );
        }
        let body = self.stream.slice(body_start..body_start + length);
        let payload = decompress(compression, body)?;
        self.current = Some(Decoder::new(payload)?);
        self.next_chunk = body_start + length;
        Ok(true)
    }

    /// The decoder for the chunk the position is in, skipping empty chunks.
    fn current(&mut self) -> NimbleResult<Option<&mut Decoder<T>>> {
        loop {
            if self.current.as_ref().is_some_and(|d| d.remaining() > 0) {
                return Ok(self.current.as_mut());
            }
            if !self.advance_chunk()? {
                return Ok(None);
            }
        }
    }

    fn for_each_span(
        &mut self,
        row_count: usize,
        mut f: impl FnMut(&mut Decoder<T>, usize) -> NimbleResult<()>,
    ) -> NimbleResult<()> {
        let mut rows_left = row_count;
        while rows_left > 0 {
            let Some(decoder) = self.current()? else {
                nimble_bail!(
                    DecoderStateExhausted: "stream exhausted with {} rows outstanding",
                    rows_left
                );
            };
            let take = rows_left.min(decoder.remaining() as usize);
            f(decoder, take)?;
            rows_left -= take;
        }
        Ok(())
    }

    /// Append the next `row_count` values, crossing chunk boundaries as needed.
    pub fn materialize(&mut self, row_count: usize, out: &mut Vec<T>) -> NimbleResult<()> {
        self.for_each_span(row_count, |decoder, take| decoder.materialize(take, out))
    }

    /// As [`materialize`](Self::materialize), also producing presence bits.
    pub fn materialize_nullable(
        &mut self,
        row_count: usize,
        out: &mut Vec<T>,
        nulls: &mut Vec<bool>,
    ) -> NimbleResult<()> {
        self.for_each_span(row_count, |decoder, take| {
            decoder.materialize_nullable(take, out, nulls)
        })
    }

    /// Advance by `row_count` values.
    pub fn skip(&mut self, row_count: usize) -> NimbleResult<()> {
        self.for_each_span(row_count, |decoder, take| decoder.skip(take))
    }

    /// Drop all decode state and return to the start of the stream.
    pub fn reset(&mut self) {
        self.next_chunk = 0;
        self.current = None;
    }

    /// Materialise every remaining row, returning how many were produced.
    pub fn materialize_all(
        &mut self,
        out: &mut Vec<T>,
        nulls: &mut Vec<bool>,
    ) -> NimbleResult<usize> {
        let mut produced = 0usize;
        while let Some(decoder) = self.current()? {
            let take = decoder.remaining() as usize;
            decoder.materialize_nullable(take, out, nulls)?;
            produced += take;
        }
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use nimble_encodings::{Selector, encode_values};

    use super::*;

    fn chunked_stream(chunks: &[Vec<u32>]) -> Bytes {
        let mut stream = Vec::new();
        for values in chunks {
            let encoded = encode_values(&Selector::learned(), values).unwrap();
            write_chunk(&encoded.bytes, &CompressionOptions::default(), &mut stream).unwrap();
        }
        Bytes::from(stream)
    }

    #[test]
    fn crosses_chunk_boundaries() {
        let stream = chunked_stream(&[
            (0..100u32).collect(),
            (100..150).collect(),
            vec![],
            (150..300).collect(),
        ]);
        let mut decoder = ChunkedDecoder::<u32>::new(stream);
        let mut out = Vec::new();
        decoder.materialize(120, &mut out).unwrap();
        assert_eq!(out, (0..120).collect::<Vec<_>>());

        out.clear();
        decoder.skip(30).unwrap();
        decoder.materialize(150, &mut out).unwrap();
        assert_eq!(out, (150..300).collect::<Vec<_>>());

        assert!(decoder.materialize(1, &mut out).is_err());
    }

    #[test]
    fn reset_returns_to_start() {
        let stream = chunked_stream(&[(0..50u32).collect(), (50..80).collect()]);
        let mut decoder = ChunkedDecoder::<u32>::new(stream);
        let mut out = Vec::new();
        decoder.materialize(70, &mut out).unwrap();
        decoder.reset();
        out.clear();
        decoder.materialize(80, &mut out).unwrap();
        assert_eq!(out, (0..80).collect::<Vec<_>>());
    }

    #[test]
    fn empty_stream_has_zero_rows() {
        let mut decoder = ChunkedDecoder::<u32>::empty();
        let mut out = Vec::new();
        decoder.materialize(0, &mut out).unwrap();
        assert!(decoder.materialize(1, &mut out).is_err());
    }

    #[test]
    fn compressible_chunks_round_trip() {
        let values: Vec<u32> = std::iter::repeat(7u32).take(10_000).collect();
        let encoded = encode_values(&Selector::learned(), &values).unwrap();
        let mut stream = Vec::new();
        write_chunk(&encoded.bytes, &CompressionOptions::default(), &mut stream).unwrap();
        let mut decoder = ChunkedDecoder::<u32>::new(Bytes::from(stream));
        let mut out = Vec::new();
        decoder.materialize(10_000, &mut out).unwrap();
        assert_eq!(out, values);
    }
}
