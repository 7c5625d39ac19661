use nimble_common::{ByteCursor, bitmap_byte_len, pack_bitmap, write_string};
use nimble_error::{NimbleResult, nimble_bail};

use crate::selection::{NestedStream, Selector, encode_values};
use crate::{DataType, Decoder, EncodingKind, EncodingLayout, EncodingPrefix, EncodingValue};

/// Stores values directly: fixed-width scalars packed LE, bools bit-packed
/// LSB-first, var-width values as a nested lengths encoding followed by the
/// concatenated content bytes.
pub struct TrivialDecoder<T: EncodingValue> {
    mode: Mode,
    _marker: std::marker::PhantomData<T>,
}

enum Mode {
    Fixed(ByteCursor),
    Bool { bits: bytes::Bytes, pos: usize },
    VarWidth { lengths: Box<Decoder<u32>>, blob: ByteCursor },
}

impl<T: EncodingValue> TrivialDecoder<T> {
    pub(crate) fn new(prefix: &EncodingPrefix, mut cursor: ByteCursor) -> NimbleResult<Self> {
        let row_count = prefix.row_count as usize;
        let mode = match prefix.data_type {
            DataType::Bool => {
                let byte_len = bitmap_byte_len(row_count);
                if cursor.remaining() < byte_len {
                    nimble_bail!(
                        MalformedEncoding: "trivial bool payload holds {} bytes, {} rows need {}",
                        cursor.remaining(),
                        row_count,
                        byte_len
                    );
                }
                Mode::Bool {
                    bits: cursor.read_bytes(byte_len)?,
                    pos: 0,
                }
            }
            DataType::String | DataType::Binary => {
                let lengths_bytes = cursor.read_string()?;
                let lengths = Box::new(Decoder::<u32>::new(lengths_bytes)?);
                if lengths.row_count() != prefix.row_count {
                    nimble_bail!(
                        MalformedEncoding: "trivial lengths hold {} rows, prefix declares {}",
                        lengths.row_count(),
                        prefix.row_count
                    );
                }
                Mode::VarWidth {
                    lengths,
                    blob: ByteCursor::new(cursor.rest()),
                }
            }
            other => {
                let width = other.fixed_width().ok_or_else(|| {
                    nimble_error::nimble_err!(
                        UnsupportedDataType: "trivial encoding over {}", other
                    )
                })?;
                if cursor.remaining() < row_count * width {
                    nimble_bail!(
                        MalformedEncoding: "trivial payload holds {} bytes, {} rows need {}",
                        cursor.remaining(),
                        row_count,
                        row_count * width
                    );
                }
                Mode::Fixed(cursor)
            }
        };
        Ok(Self {
            mode,
            _marker: std::marker::PhantomData,
        })
    }

    pub(crate) fn materialize(&mut self, n: u32, out: &mut Vec<T>) -> NimbleResult<()> {
        match &mut self.mode {
            Mode::Fixed(cursor) => {
                for _ in 0..n {
                    out.push(T::read_from(cursor)?);
                }
                Ok(())
            }
            Mode::Bool { bits, pos } => {
                for _ in 0..n {
                    out.push(T::from_bool(nimble_common::bit(bits, *pos)));
                    *pos += 1;
                }
                Ok(())
            }
            Mode::VarWidth { lengths, blob } => {
                let mut lens = Vec::with_capacity(n as usize);
                lengths.materialize(n as usize, &mut lens)?;
                for len in lens {
                    out.push(T::from_raw(blob.read_bytes(len as usize)?));
                }
                Ok(())
            }
        }
    }

    pub(crate) fn skip(&mut self, n: u32) -> NimbleResult<()> {
        match &mut self.mode {
            Mode::Fixed(cursor) => {
                // Fixed mode is only built for fixed-width data types.
                let width = T::DATA_TYPE.fixed_width().unwrap_or(0);
                cursor.skip(n as usize * width)
            }
            Mode::Bool { pos, .. } => {
                *pos += n as usize;
                Ok(())
            }
            Mode::VarWidth { lengths, blob } => {
                let mut lens = Vec::with_capacity(n as usize);
                lengths.materialize(n as usize, &mut lens)?;
                blob.skip(lens.iter().map(|l| *l as usize).sum())
            }
        }
    }
}

/// Encode `values` trivially, appending to `out`.
pub(crate) fn encode<T: EncodingValue>(
    selector: &Selector,
    values: &[T],
    out: &mut Vec<u8>,
) -> NimbleResult<EncodingLayout> {
    EncodingPrefix {
        kind: EncodingKind::Trivial,
        data_type: T::DATA_TYPE,
        row_count: values.len() as u32,
    }
    .write(out);

    match T::DATA_TYPE {
        DataType::Bool => {
            let bools: Vec<bool> = values.iter().map(T::to_bool).collect();
            out.extend_from_slice(&pack_bitmap(&bools));
            Ok(EncodingLayout::new(EncodingKind::Trivial))
        }
        DataType::String | DataType::Binary => {
            let lengths: Vec<u32> = values.iter().map(|v| v.var_len() as u32).collect();
            let encoded_lengths =
                encode_values(&selector.child(NestedStream::TrivialLengths), &lengths)?;
            write_string(&encoded_lengths.bytes, out);
            for value in values {
                value.append_raw(out);
            }
            Ok(EncodingLayout::with_children(
                EncodingKind::Trivial,
                vec![Some(encoded_lengths.layout)],
            ))
        }
        _ => {
            for value in values {
                value.write_to(out);
            }
            Ok(EncodingLayout::new(EncodingKind::Trivial))
        }
    }
}
