use nimble_common::{ByteCursor, write_string};
use nimble_error::{NimbleResult, nimble_bail};

use crate::selection::{NestedStream, Selector, encode_values};
use crate::{DataType, Decoder, EncodingKind, EncodingLayout, EncodingPrefix, EncodingValue};

/// Run-length encoding. Run lengths are a nested `u32` encoding; run values
/// are a nested encoding for scalars and strings. Bool runs alternate, so
/// only the first value is stored.
pub struct RleDecoder<T: EncodingValue> {
    run_lengths: Box<Decoder<u32>>,
    values: RunValues<T>,
    copies_remaining: u32,
    current: T,
    scratch: Vec<u32>,
}

enum RunValues<T: EncodingValue> {
    Typed(Box<Decoder<T>>),
    Alternating { next: bool },
}

impl<T: EncodingValue> RleDecoder<T> {
    pub(crate) fn new(prefix: &EncodingPrefix, mut cursor: ByteCursor) -> NimbleResult<Self> {
        let run_lengths_bytes = cursor.read_string()?;
        let run_lengths = Box::new(Decoder::<u32>::new(run_lengths_bytes)?);
        let values = if prefix.data_type == DataType::Bool {
            let first = cursor.read_u8()? != 0;
            RunValues::Alternating { next: first }
        } else {
            RunValues::Typed(Box::new(Decoder::<T>::new(cursor.rest())?))
        };
        Ok(Self {
            run_lengths,
            values,
            copies_remaining: 0,
            current: T::default(),
            scratch: Vec::with_capacity(1),
        })
    }

    fn advance_run(&mut self) -> NimbleResult<()> {
        self.scratch.clear();
        self.run_lengths.materialize(1, &mut self.scratch)?;
        self.copies_remaining = self.scratch[0];
        self.current = match &mut self.values {
            RunValues::Typed(decoder) => {
                let mut value = Vec::with_capacity(1);
                decoder.materialize(1, &mut value)?;
                value.remove(0)
            }
            RunValues::Alternating { next } => {
                let value = *next;
                *next = !value;
                T::from_bool(value)
            }
        };
        Ok(())
    }

    pub(crate) fn materialize(&mut self, n: u32, out: &mut Vec<T>) -> NimbleResult<()> {
        let mut rows_left = n;
        while rows_left > 0 {
            if self.copies_remaining == 0 {
                self.advance_run()?;
                continue;
            }
            let take = rows_left.min(self.copies_remaining);
            for _ in 0..take {
                out.push(self.current.clone());
            }
            self.copies_remaining -= take;
            rows_left -= take;
        }
        Ok(())
    }

    pub(crate) fn skip(&mut self, n: u32) -> NimbleResult<()> {
        let mut rows_left = n;
        while rows_left > 0 {
            if self.copies_remaining == 0 {
                self.advance_run()?;
                continue;
            }
            let take = rows_left.min(self.copies_remaining);
            self.copies_remaining -= take;
            rows_left -= take;
        }
        Ok(())
    }
}

/// Split `values` into maximal runs of equal values.
pub(crate) fn compute_runs<T: EncodingValue>(values: &[T]) -> (Vec<u32>, Vec<T>) {
    let mut run_lengths = Vec::new();
    let mut run_values = Vec::new();
    let Some(first) = values.first() else {
        return (run_lengths, run_values);
    };
    let mut current = first.clone();
    let mut length = 1u32;
    for value in &values[1..] {
        if *value == current {
            length += 1;
        } else {
            run_lengths.push(length);
            run_values.push(std::mem::replace(&mut current, value.clone()));
            length = 1;
        }
    }
    run_lengths.push(length);
    run_values.push(current);
    (run_lengths, run_values)
}

/// Run-length encode `values`, appending to `out`.
pub(crate) fn encode<T: EncodingValue>(
    selector: &Selector,
    values: &[T],
    out: &mut Vec<u8>,
) -> NimbleResult<EncodingLayout> {
    if values.len() > u32::MAX as usize {
        nimble_bail!("row count {} exceeds u32", values.len());
    }
    let (run_lengths, run_values) = compute_runs(values);

    EncodingPrefix {
        kind: EncodingKind::Rle,
        data_type: T::DATA_TYPE,
        row_count: values.len() as u32,
    }
    .write(out);

    let encoded_lengths = encode_values(&selector.child(NestedStream::RunLengths), &run_lengths)?;
    write_string(&encoded_lengths.bytes, out);

    if T::DATA_TYPE == DataType::Bool {
        // Runs alternate, so only the first value is needed.
        out.push(run_values.first().map(T::to_bool).unwrap_or(false) as u8);
        Ok(EncodingLayout::with_children(
            EncodingKind::Rle,
            vec![Some(encoded_lengths.layout), None],
        ))
    } else {
        let encoded_values = encode_values(&selector.child(NestedStream::RunValues), &run_values)?;
        out.extend_from_slice(&encoded_values.bytes);
        Ok(EncodingLayout::with_children(
            EncodingKind::Rle,
            vec![Some(encoded_lengths.layout), Some(encoded_values.layout)],
        ))
    }
}
