use nimble_common::{ByteCursor, write_string};
use nimble_error::{NimbleResult, nimble_bail};

use crate::selection::{NestedStream, Selector, encode_values};
use crate::statistics::Statistics;
use crate::{Decoder, EncodingKind, EncodingLayout, EncodingPrefix, EncodingValue};

/// One dominant value plus exceptions: a nested is-common bool stream, the
/// common value itself, and a nested stream of the uncommon values in
/// position order.
pub struct MainlyConstantDecoder<T: EncodingValue> {
    is_common: Box<Decoder<bool>>,
    common: T,
    others: Box<Decoder<T>>,
    scratch: Vec<bool>,
}

impl<T: EncodingValue> MainlyConstantDecoder<T> {
    pub(crate) fn new(_prefix: &EncodingPrefix, mut cursor: ByteCursor) -> NimbleResult<Self> {
        let is_common_bytes = cursor.read_string()?;
        let is_common = Box::new(Decoder::<bool>::new(is_common_bytes)?);
        let common_bytes = cursor.read_string()?;
        let common = T::read_from(&mut ByteCursor::new(common_bytes))?;
        let others = Box::new(Decoder::<T>::new(cursor.rest())?);
        Ok(Self {
            is_common,
            common,
            others,
            scratch: Vec::new(),
        })
    }

    pub(crate) fn materialize(&mut self, n: u32, out: &mut Vec<T>) -> NimbleResult<()> {
        self.scratch.clear();
        self.is_common.materialize(n as usize, &mut self.scratch)?;
        let uncommon = self.scratch.iter().filter(|c| !**c).count();
        let mut others = Vec::with_capacity(uncommon);
        self.others.materialize(uncommon, &mut others)?;
        let mut next_other = others.into_iter();
        for is_common in &self.scratch {
            if *is_common {
                out.push(self.common.clone());
            } else {
                // The iterator holds exactly as many values as zero bits.
                out.extend(next_other.next());
            }
        }
        Ok(())
    }

    pub(crate) fn skip(&mut self, n: u32) -> NimbleResult<()> {
        self.scratch.clear();
        self.is_common.materialize(n as usize, &mut self.scratch)?;
        let uncommon = self.scratch.iter().filter(|c| !**c).count();
        self.others.skip(uncommon)
    }
}

/// Encode `values` around their dominant value, appending to `out`.
pub(crate) fn encode<T: EncodingValue>(
    selector: &Selector,
    values: &[T],
    stats: &Statistics<T>,
    out: &mut Vec<u8>,
) -> NimbleResult<EncodingLayout> {
    let Some((common, _)) = &stats.most_common else {
        nimble_bail!("mainly-constant encoding requires a dominant value");
    };
    let is_common: Vec<bool> = values.iter().map(|v| v == common).collect();
    let others: Vec<T> = values.iter().filter(|v| *v != common).cloned().collect();

    EncodingPrefix {
        kind: EncodingKind::MainlyConstant,
        data_type: T::DATA_TYPE,
        row_count: values.len() as u32,
    }
    .write(out);

    let encoded_is_common = encode_values(&selector.child(NestedStream::IsCommon), &is_common)?;
    write_string(&encoded_is_common.bytes, out);

    let mut common_bytes = Vec::new();
    common.write_to(&mut common_bytes);
    write_string(&common_bytes, out);

    let encoded_others = encode_values(&selector.child(NestedStream::OtherValues), &others)?;
    out.extend_from_slice(&encoded_others.bytes);

    Ok(EncodingLayout::with_children(
        EncodingKind::MainlyConstant,
        vec![Some(encoded_is_common.layout), Some(encoded_others.layout)],
    ))
}
