use nimble_common::ByteCursor;
use nimble_error::NimbleResult;

use crate::selection::{NestedStream, Selector, encode_values};
use crate::{Decoder, EncodingKind, EncodingLayout, EncodingPrefix, EncodingValue};

/// A bool stream stored as the positions of its rare bit. The payload leads
/// with the rare bit itself, so both orientations round-trip.
pub struct SparseBoolDecoder<T: EncodingValue> {
    sparse_value: bool,
    indices: Box<Decoder<u32>>,
    pos: u32,
    next_sparse: Option<u32>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: EncodingValue> SparseBoolDecoder<T> {
    pub(crate) fn new(_prefix: &EncodingPrefix, mut cursor: ByteCursor) -> NimbleResult<Self> {
        let sparse_value = cursor.read_u8()? != 0;
        let indices = Box::new(Decoder::<u32>::new(cursor.rest())?);
        let mut decoder = Self {
            sparse_value,
            indices,
            pos: 0,
            next_sparse: None,
            _marker: std::marker::PhantomData,
        };
        decoder.pull_next()?;
        Ok(decoder)
    }

    fn pull_next(&mut self) -> NimbleResult<()> {
        self.next_sparse = if self.indices.remaining() > 0 {
            let mut scratch = Vec::with_capacity(1);
            self.indices.materialize(1, &mut scratch)?;
            Some(scratch[0])
        } else {
            None
        };
        Ok(())
    }

    pub(crate) fn materialize(&mut self, n: u32, out: &mut Vec<T>) -> NimbleResult<()> {
        for _ in 0..n {
            let sparse = self.next_sparse == Some(self.pos);
            if sparse {
                self.pull_next()?;
            }
            out.push(T::from_bool(sparse == self.sparse_value));
            self.pos += 1;
        }
        Ok(())
    }

    pub(crate) fn skip(&mut self, n: u32) -> NimbleResult<()> {
        self.pos += n;
        while let Some(next) = self.next_sparse {
            if next >= self.pos {
                break;
            }
            self.pull_next()?;
        }
        Ok(())
    }
}

/// Encode a bool sequence as sparse exception positions, appending to `out`.
pub(crate) fn encode<T: EncodingValue>(
    selector: &Selector,
    values: &[T],
    out: &mut Vec<u8>,
) -> NimbleResult<EncodingLayout> {
    let bools: Vec<bool> = values.iter().map(T::to_bool).collect();
    let true_count = bools.iter().filter(|b| **b).count();
    let sparse_value = true_count * 2 <= bools.len();
    let indices: Vec<u32> = bools
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == sparse_value)
        .map(|(i, _)| i as u32)
        .collect();

    EncodingPrefix {
        kind: EncodingKind::SparseBool,
        data_type: T::DATA_TYPE,
        row_count: values.len() as u32,
    }
    .write(out);
    out.push(sparse_value as u8);

    let encoded_indices = encode_values(&selector.child(NestedStream::SparseIndices), &indices)?;
    out.extend_from_slice(&encoded_indices.bytes);

    Ok(EncodingLayout::with_children(
        EncodingKind::SparseBool,
        vec![Some(encoded_indices.layout)],
    ))
}
