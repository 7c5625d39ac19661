use nimble_common::{ByteCursor, write_string};
use nimble_error::NimbleResult;

use crate::selection::{NestedStream, Selector, encode_values};
use crate::{Decoder, EncodingKind, EncodingLayout, EncodingPrefix, EncodingValue};

/// Wraps an inner encoding of the non-null values plus a nested bool stream
/// of presence bits (`true` = present). The inner encoding's row count equals
/// the number of present rows.
pub struct NullableDecoder<T: EncodingValue> {
    values: Box<Decoder<T>>,
    presence: Box<Decoder<bool>>,
    scratch: Vec<bool>,
}

impl<T: EncodingValue> NullableDecoder<T> {
    pub(crate) fn new(_prefix: &EncodingPrefix, mut cursor: ByteCursor) -> NimbleResult<Self> {
        let values_bytes = cursor.read_string()?;
        let values = Box::new(Decoder::<T>::new(values_bytes)?);
        let presence = Box::new(Decoder::<bool>::new(cursor.rest())?);
        Ok(Self {
            values,
            presence,
            scratch: Vec::new(),
        })
    }

    /// Null slots materialise as `T::default()`.
    pub(crate) fn materialize(&mut self, n: u32, out: &mut Vec<T>) -> NimbleResult<()> {
        let mut nulls = Vec::with_capacity(n as usize);
        let before = out.len();
        self.materialize_nullable(n, out, &mut nulls)?;
        debug_assert_eq!(out.len() - before, n as usize);
        Ok(())
    }

    pub(crate) fn materialize_nullable(
        &mut self,
        n: u32,
        out: &mut Vec<T>,
        nulls: &mut Vec<bool>,
    ) -> NimbleResult<()> {
        self.scratch.clear();
        self.presence.materialize(n as usize, &mut self.scratch)?;
        let present = self.scratch.iter().filter(|p| **p).count();
        let mut values = Vec::with_capacity(present);
        self.values.materialize(present, &mut values)?;
        let mut next_value = values.into_iter();
        for present in &self.scratch {
            if *present {
                out.extend(next_value.next());
            } else {
                out.push(T::default());
            }
            nulls.push(*present);
        }
        Ok(())
    }

    pub(crate) fn skip(&mut self, n: u32) -> NimbleResult<()> {
        self.scratch.clear();
        self.presence.materialize(n as usize, &mut self.scratch)?;
        let present = self.scratch.iter().filter(|p| **p).count();
        self.values.skip(present)
    }
}

/// Encode `values` (the non-null values, in row order) plus their presence
/// bits, appending to `out`. `presence.len()` is the logical row count.
pub(crate) fn encode<T: EncodingValue>(
    selector: &Selector,
    values: &[T],
    presence: &[bool],
    out: &mut Vec<u8>,
) -> NimbleResult<EncodingLayout> {
    debug_assert_eq!(
        values.len(),
        presence.iter().filter(|p| **p).count(),
        "value count must equal present-bit count"
    );
    EncodingPrefix {
        kind: EncodingKind::Nullable,
        data_type: T::DATA_TYPE,
        row_count: presence.len() as u32,
    }
    .write(out);

    let encoded_values = encode_values(&selector.child(NestedStream::NullableValues), values)?;
    write_string(&encoded_values.bytes, out);
    let encoded_presence = encode_values(&selector.child(NestedStream::NullableNulls), presence)?;
    out.extend_from_slice(&encoded_presence.bytes);

    Ok(EncodingLayout::with_children(
        EncodingKind::Nullable,
        vec![Some(encoded_values.layout), Some(encoded_presence.layout)],
    ))
}
