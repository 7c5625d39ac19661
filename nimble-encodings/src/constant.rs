use nimble_common::ByteCursor;
use nimble_error::{NimbleResult, nimble_bail};

use crate::{EncodingKind, EncodingLayout, EncodingPrefix, EncodingValue};

/// A single value repeated `row_count` times.
pub struct ConstantDecoder<T: EncodingValue> {
    value: T,
}

impl<T: EncodingValue> ConstantDecoder<T> {
    pub(crate) fn new(_prefix: &EncodingPrefix, mut cursor: ByteCursor) -> NimbleResult<Self> {
        Ok(Self {
            value: T::read_from(&mut cursor)?,
        })
    }

    pub(crate) fn materialize(&mut self, n: u32, out: &mut Vec<T>) -> NimbleResult<()> {
        for _ in 0..n {
            out.push(self.value.clone());
        }
        Ok(())
    }

    pub(crate) fn skip(&mut self, _n: u32) -> NimbleResult<()> {
        Ok(())
    }
}

/// Encode a constant sequence, appending to `out`.
pub(crate) fn encode<T: EncodingValue>(values: &[T], out: &mut Vec<u8>) -> NimbleResult<EncodingLayout> {
    let Some(first) = values.first() else {
        nimble_bail!("constant encoding requires at least one value");
    };
    EncodingPrefix {
        kind: EncodingKind::Constant,
        data_type: T::DATA_TYPE,
        row_count: values.len() as u32,
    }
    .write(out);
    first.write_to(out);
    Ok(EncodingLayout::new(EncodingKind::Constant))
}
