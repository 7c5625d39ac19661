use nimble_common::FixedBitArray;
use nimble_error::{NimbleResult, nimble_bail};

use crate::statistics::Statistics;
use crate::{
    DataType, EncodingKind, EncodingLayout, EncodingValue, constant, dictionary, fixed_bit_width,
    mainly_constant, nullable, rle, sparse_bool, trivial,
};

/// Nested streams bottom out after this many levels of recursion.
const MAX_NESTING_DEPTH: u32 = 3;

/// The sub-streams an encoding may recurse into, with their position in the
/// parent's child-layout list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedStream {
    TrivialLengths,
    RunLengths,
    RunValues,
    DictionaryAlphabet,
    DictionaryIndices,
    IsCommon,
    OtherValues,
    NullableValues,
    NullableNulls,
    SparseIndices,
}

impl NestedStream {
    fn parent_kind(self) -> EncodingKind {
        match self {
            Self::TrivialLengths => EncodingKind::Trivial,
            Self::RunLengths | Self::RunValues => EncodingKind::Rle,
            Self::DictionaryAlphabet | Self::DictionaryIndices => EncodingKind::Dictionary,
            Self::IsCommon | Self::OtherValues => EncodingKind::MainlyConstant,
            Self::NullableValues | Self::NullableNulls => EncodingKind::Nullable,
            Self::SparseIndices => EncodingKind::SparseBool,
        }
    }

    fn child_index(self) -> usize {
        match self {
            Self::TrivialLengths
            | Self::RunLengths
            | Self::DictionaryAlphabet
            | Self::IsCommon
            | Self::NullableValues
            | Self::SparseIndices => 0,
            Self::RunValues
            | Self::DictionaryIndices
            | Self::OtherValues
            | Self::NullableNulls => 1,
        }
    }
}

/// An encoded payload plus the captured layout of the choices made.
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub layout: EncodingLayout,
}

/// Chooses an encoding for a value sequence, recursively.
///
/// The learned selector is statistics-driven. A replay selector follows a
/// previously captured [`EncodingLayout`] wherever the recorded choice still
/// fits the data, and falls back to the learned policy where it does not.
#[derive(Clone, Default)]
pub struct Selector {
    replay: Option<EncodingLayout>,
    depth: u32,
    /// Set while descending into a dictionary's own sub-streams, where
    /// re-dictionarising cannot pay off.
    no_dictionary: bool,
}

impl Selector {
    pub fn learned() -> Self {
        Self::default()
    }

    pub fn replay(layout: EncodingLayout) -> Self {
        Self {
            replay: Some(layout),
            ..Self::default()
        }
    }

    /// The selector for one of this encoding's sub-streams.
    pub(crate) fn child(&self, stream: NestedStream) -> Selector {
        let replay = self
            .replay
            .as_ref()
            .filter(|layout| layout.kind == stream.parent_kind())
            .and_then(|layout| layout.child(stream.child_index()).cloned());
        Selector {
            replay,
            depth: self.depth + 1,
            no_dictionary: matches!(
                stream,
                NestedStream::DictionaryAlphabet | NestedStream::DictionaryIndices
            ),
        }
    }

    fn choose<T: EncodingValue>(&self, stats: &Statistics<T>) -> EncodingKind {
        if stats.row_count == 0 {
            return EncodingKind::Trivial;
        }
        if let Some(layout) = &self.replay {
            if replay_compatible::<T>(layout.kind, stats) {
                return layout.kind;
            }
            log::debug!(
                "replayed encoding {} does not fit; falling back to learned selection",
                layout.kind
            );
        }
        choose_learned::<T>(stats, self.depth, self.no_dictionary)
    }
}

fn replay_compatible<T: EncodingValue>(kind: EncodingKind, stats: &Statistics<T>) -> bool {
    // Single-valued data always collapses to Constant, whatever was recorded.
    if stats.distinct_count <= 1 {
        return kind == EncodingKind::Constant && stats.distinct_count == 1;
    }
    match kind {
        EncodingKind::Trivial | EncodingKind::Rle | EncodingKind::Dictionary => true,
        EncodingKind::Constant => false,
        EncodingKind::SparseBool => T::DATA_TYPE == DataType::Bool,
        EncodingKind::FixedBitWidth => T::IS_INTEGER,
        EncodingKind::MainlyConstant => stats.most_common.is_some(),
        // Nullability is decided by the stream's presence bits, not here.
        EncodingKind::Nullable => false,
    }
}

/// Whether bit-packing saves at least one byte per value over trivial.
fn narrow_bit_width<T: EncodingValue>(stats: &Statistics<T>) -> bool {
    if !T::IS_INTEGER {
        return false;
    }
    let Some((min, max)) = stats.packed_range else {
        return false;
    };
    let Some(width) = T::DATA_TYPE.fixed_width() else {
        return false;
    };
    FixedBitArray::required_bit_width(max - min) + 8 <= width * 8
}

fn choose_learned<T: EncodingValue>(
    stats: &Statistics<T>,
    depth: u32,
    no_dictionary: bool,
) -> EncodingKind {
    let n = stats.row_count;
    if stats.distinct_count == 1 {
        return EncodingKind::Constant;
    }
    if depth >= MAX_NESTING_DEPTH {
        return if narrow_bit_width(stats) {
            EncodingKind::FixedBitWidth
        } else {
            EncodingKind::Trivial
        };
    }
    if T::DATA_TYPE == DataType::Bool {
        let minority = stats.true_count.min(n - stats.true_count);
        if minority * 8 <= n {
            return EncodingKind::SparseBool;
        }
        if stats.run_count * 4 <= n {
            return EncodingKind::Rle;
        }
        return EncodingKind::Trivial;
    }
    if stats.dominance_permille() >= 700 {
        return EncodingKind::MainlyConstant;
    }
    if stats.run_count * 4 <= n {
        return EncodingKind::Rle;
    }
    if !no_dictionary && stats.distinct_count * 4 <= n {
        return EncodingKind::Dictionary;
    }
    if narrow_bit_width(stats) {
        return EncodingKind::FixedBitWidth;
    }
    EncodingKind::Trivial
}

/// Select an encoding for `values` and produce its payload.
pub fn encode_values<T: EncodingValue>(selector: &Selector, values: &[T]) -> NimbleResult<Encoded> {
    if values.len() > u32::MAX as usize {
        nimble_bail!("row count {} exceeds u32", values.len());
    }
    let stats = Statistics::gather(values);
    let kind = selector.choose(&stats);
    let mut bytes = Vec::new();
    let layout = match kind {
        EncodingKind::Trivial => trivial::encode(selector, values, &mut bytes)?,
        EncodingKind::Rle => rle::encode(selector, values, &mut bytes)?,
        EncodingKind::Dictionary => dictionary::encode(selector, values, &mut bytes)?,
        EncodingKind::FixedBitWidth => fixed_bit_width::encode(values, &mut bytes)?,
        EncodingKind::MainlyConstant => {
            mainly_constant::encode(selector, values, &stats, &mut bytes)?
        }
        EncodingKind::SparseBool => sparse_bool::encode(selector, values, &mut bytes)?,
        EncodingKind::Constant => constant::encode(values, &mut bytes)?,
        EncodingKind::Nullable => {
            nimble_bail!("nullable encoding is not selectable at value level")
        }
    };
    Ok(Encoded { bytes, layout })
}

/// Encode a stream that may contain nulls. `values` holds the non-null
/// values in row order; `presence` holds one bit per logical row. Streams
/// with no nulls skip the nullable wrapper entirely.
pub fn encode_nullable_values<T: EncodingValue>(
    selector: &Selector,
    values: &[T],
    presence: &[bool],
) -> NimbleResult<Encoded> {
    if presence.len() > u32::MAX as usize {
        nimble_bail!("row count {} exceeds u32", presence.len());
    }
    if presence.iter().all(|p| *p) {
        return encode_values(selector, values);
    }
    let mut bytes = Vec::new();
    let layout = nullable::encode(selector, values, presence, &mut bytes)?;
    Ok(Encoded { bytes, layout })
}
