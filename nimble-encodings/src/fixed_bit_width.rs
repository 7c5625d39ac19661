use nimble_common::{ByteCursor, FixedBitArray};
use nimble_error::{NimbleResult, nimble_bail};

use crate::{EncodingKind, EncodingLayout, EncodingPrefix, EncodingValue};

/// Integers stored at `ceil(log2(max - min + 1))` bits per value, relative to
/// a base value carried in the payload.
pub struct FixedBitWidthDecoder<T: EncodingValue> {
    base: u64,
    packed: FixedBitArray,
    pos: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: EncodingValue> FixedBitWidthDecoder<T> {
    pub(crate) fn new(prefix: &EncodingPrefix, mut cursor: ByteCursor) -> NimbleResult<Self> {
        let bit_width = cursor.read_u8()? as usize;
        let base = T::read_from(&mut cursor)?.packed();
        let packed = FixedBitArray::new(cursor.rest(), bit_width, prefix.row_count as usize)?;
        Ok(Self {
            base,
            packed,
            pos: 0,
            _marker: std::marker::PhantomData,
        })
    }

    pub(crate) fn materialize(&mut self, n: u32, out: &mut Vec<T>) -> NimbleResult<()> {
        for _ in 0..n {
            out.push(T::from_packed(self.base + self.packed.get(self.pos)));
            self.pos += 1;
        }
        Ok(())
    }

    pub(crate) fn skip(&mut self, n: u32) -> NimbleResult<()> {
        self.pos += n as usize;
        Ok(())
    }
}

/// Bit-pack `values` relative to their minimum, appending to `out`.
pub(crate) fn encode<T: EncodingValue>(values: &[T], out: &mut Vec<u8>) -> NimbleResult<EncodingLayout> {
    if !T::IS_INTEGER {
        nimble_bail!(UnsupportedDataType: "fixed-bit-width encoding over {}", T::DATA_TYPE);
    }
    let packed: Vec<u64> = values.iter().map(EncodingValue::packed).collect();
    let base = packed.iter().copied().min().unwrap_or(0);
    let max = packed.iter().copied().max().unwrap_or(0);
    let deltas: Vec<u64> = packed.iter().map(|v| v - base).collect();
    let bit_width = FixedBitArray::required_bit_width(max - base);

    EncodingPrefix {
        kind: EncodingKind::FixedBitWidth,
        data_type: T::DATA_TYPE,
        row_count: values.len() as u32,
    }
    .write(out);
    out.push(bit_width as u8);
    T::from_packed(base).write_to(out);
    FixedBitArray::pack(&deltas, bit_width, out);
    Ok(EncodingLayout::new(EncodingKind::FixedBitWidth))
}
