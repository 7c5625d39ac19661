use std::collections::HashMap;

use nimble_common::{ByteCursor, write_string};
use nimble_error::{NimbleResult, nimble_bail};

use crate::selection::{NestedStream, Selector, encode_values};
use crate::{Decoder, EncodingKind, EncodingLayout, EncodingPrefix, EncodingValue};

/// Dictionary encoding: a nested alphabet of unique values plus a nested
/// `u32` index stream. The alphabet is materialised eagerly at construction;
/// indices stream lazily.
pub struct DictionaryDecoder<T: EncodingValue> {
    alphabet: Vec<T>,
    indices: Box<Decoder<u32>>,
    scratch: Vec<u32>,
}

impl<T: EncodingValue> DictionaryDecoder<T> {
    pub(crate) fn new(_prefix: &EncodingPrefix, mut cursor: ByteCursor) -> NimbleResult<Self> {
        let alphabet_bytes = cursor.read_string()?;
        let mut alphabet_decoder = Decoder::<T>::new(alphabet_bytes)?;
        let mut alphabet = Vec::with_capacity(alphabet_decoder.row_count() as usize);
        alphabet_decoder.materialize(alphabet_decoder.row_count() as usize, &mut alphabet)?;
        let indices = Box::new(Decoder::<u32>::new(cursor.rest())?);
        Ok(Self {
            alphabet,
            indices,
            scratch: Vec::new(),
        })
    }

    pub(crate) fn materialize(&mut self, n: u32, out: &mut Vec<T>) -> NimbleResult<()> {
        self.scratch.clear();
        self.indices.materialize(n as usize, &mut self.scratch)?;
        for index in &self.scratch {
            let value = self.alphabet.get(*index as usize).ok_or_else(|| {
                nimble_error::nimble_err!(
                    MalformedEncoding: "dictionary index {} out of range ({} entries)",
                    index,
                    self.alphabet.len()
                )
            })?;
            out.push(value.clone());
        }
        Ok(())
    }

    pub(crate) fn skip(&mut self, n: u32) -> NimbleResult<()> {
        self.indices.skip(n as usize)
    }
}

/// Dictionary-encode `values`, appending to `out`. The alphabet holds unique
/// values in first-occurrence order.
pub(crate) fn encode<T: EncodingValue>(
    selector: &Selector,
    values: &[T],
    out: &mut Vec<u8>,
) -> NimbleResult<EncodingLayout> {
    let mut alphabet: Vec<T> = Vec::new();
    let mut positions: HashMap<T::Key, u32> = HashMap::new();
    let mut indices: Vec<u32> = Vec::with_capacity(values.len());
    for value in values {
        let next = alphabet.len() as u32;
        let index = *positions.entry(value.key()).or_insert_with(|| {
            alphabet.push(value.clone());
            next
        });
        indices.push(index);
    }
    if alphabet.len() > u32::MAX as usize {
        nimble_bail!("dictionary alphabet exceeds u32 range");
    }

    EncodingPrefix {
        kind: EncodingKind::Dictionary,
        data_type: T::DATA_TYPE,
        row_count: values.len() as u32,
    }
    .write(out);

    let encoded_alphabet =
        encode_values(&selector.child(NestedStream::DictionaryAlphabet), &alphabet)?;
    write_string(&encoded_alphabet.bytes, out);
    let encoded_indices =
        encode_values(&selector.child(NestedStream::DictionaryIndices), &indices)?;
    out.extend_from_slice(&encoded_indices.bytes);

    Ok(EncodingLayout::with_children(
        EncodingKind::Dictionary,
        vec![Some(encoded_alphabet.layout), Some(encoded_indices.layout)],
    ))
}
