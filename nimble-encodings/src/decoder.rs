use bytes::Bytes;
use nimble_common::ByteCursor;
use nimble_error::{NimbleResult, nimble_bail};

use crate::constant::ConstantDecoder;
use crate::dictionary::DictionaryDecoder;
use crate::fixed_bit_width::FixedBitWidthDecoder;
use crate::mainly_constant::MainlyConstantDecoder;
use crate::nullable::NullableDecoder;
use crate::rle::RleDecoder;
use crate::sparse_bool::SparseBoolDecoder;
use crate::trivial::TrivialDecoder;
use crate::{DataType, EncodingKind, EncodingPrefix, EncodingValue};

/// A positioned decoder over one encoded payload.
///
/// The decoder owns a zero-copy slice of the chunk it was created from and
/// tracks how many logical rows remain. All per-variant state (buffered run
/// values, dictionary alphabets, sparse lookahead) is rebuilt by
/// [`reset`](Decoder::reset), which returns the decoder to row zero.
pub struct Decoder<T: EncodingValue> {
    data: Bytes,
    prefix: EncodingPrefix,
    remaining: u32,
    inner: DecoderInner<T>,
}

enum DecoderInner<T: EncodingValue> {
    Trivial(TrivialDecoder<T>),
    Rle(RleDecoder<T>),
    Dictionary(DictionaryDecoder<T>),
    FixedBitWidth(FixedBitWidthDecoder<T>),
    Nullable(NullableDecoder<T>),
    SparseBool(SparseBoolDecoder<T>),
    MainlyConstant(MainlyConstantDecoder<T>),
    Constant(ConstantDecoder<T>),
}

impl<T: EncodingValue> Decoder<T> {
    /// Decode the prefix of `data` and construct the matching decoder.
    pub fn new(data: Bytes) -> NimbleResult<Self> {
        let mut cursor = ByteCursor::new(data.clone());
        let prefix = EncodingPrefix::read(&mut cursor)?;
        if !T::accepts(prefix.data_type) {
            nimble_bail!(
                UnsupportedDataType: "payload holds {}, decoder expects {}",
                prefix.data_type,
                T::DATA_TYPE
            );
        }
        let inner = match prefix.kind {
            EncodingKind::Trivial => {
                DecoderInner::Trivial(TrivialDecoder::new(&prefix, cursor)?)
            }
            EncodingKind::Rle => DecoderInner::Rle(RleDecoder::new(&prefix, cursor)?),
            EncodingKind::Dictionary => {
                DecoderInner::Dictionary(DictionaryDecoder::new(&prefix, cursor)?)
            }
            EncodingKind::FixedBitWidth => {
                if !T::IS_INTEGER {
                    nimble_bail!(
                        UnsupportedDataType: "fixed-bit-width encoding over non-integer {}",
                        prefix.data_type
                    );
                }
                DecoderInner::FixedBitWidth(FixedBitWidthDecoder::new(&prefix, cursor)?)
            }
            EncodingKind::Nullable => DecoderInner::Nullable(NullableDecoder::new(&prefix, cursor)?),
            EncodingKind::SparseBool => {
                if prefix.data_type != DataType::Bool {
                    nimble_bail!(
                        UnsupportedDataType: "sparse-bool encoding over {}",
                        prefix.data_type
                    );
                }
                DecoderInner::SparseBool(SparseBoolDecoder::new(&prefix, cursor)?)
            }
            EncodingKind::MainlyConstant => {
                DecoderInner::MainlyConstant(MainlyConstantDecoder::new(&prefix, cursor)?)
            }
            EncodingKind::Constant => DecoderInner::Constant(ConstantDecoder::new(&prefix, cursor)?),
        };
        Ok(Self {
            data,
            prefix,
            remaining: prefix.row_count,
            inner,
        })
    }

    pub fn kind(&self) -> EncodingKind {
        self.prefix.kind
    }

    pub fn data_type(&self) -> DataType {
        self.prefix.data_type
    }

    /// Total logical rows in this payload.
    pub fn row_count(&self) -> u32 {
        self.prefix.row_count
    }

    /// Rows not yet consumed.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    fn take(&mut self, row_count: usize) -> NimbleResult<u32> {
        let row_count = u32::try_from(row_count)
            .map_err(|_| nimble_error::nimble_err!("row count {} exceeds u32", row_count))?;
        if row_count > self.remaining {
            nimble_bail!(
                DecoderStateExhausted: "requested {} rows, {} remain",
                row_count,
                self.remaining
            );
        }
        self.remaining -= row_count;
        Ok(row_count)
    }

    /// Append the next `row_count` values to `out`.
    pub fn materialize(&mut self, row_count: usize, out: &mut Vec<T>) -> NimbleResult<()> {
        let n = self.take(row_count)?;
        self.inner.materialize(n, out)
    }

    /// Append the next `row_count` values to `out` and their presence bits to
    /// `nulls` (`true` = present). Absent positions hold `T::default()`.
    pub fn materialize_nullable(
        &mut self,
        row_count: usize,
        out: &mut Vec<T>,
        nulls: &mut Vec<bool>,
    ) -> NimbleResult<()> {
        let n = self.take(row_count)?;
        match &mut self.inner {
            DecoderInner::Nullable(d) => d.materialize_nullable(n, out, nulls),
            inner => {
                inner.materialize(n, out)?;
                nulls.extend(std::iter::repeat(true).take(n as usize));
                Ok(())
            }
        }
    }

    /// Advance by `row_count` values without materialising them.
    pub fn skip(&mut self, row_count: usize) -> NimbleResult<()> {
        let n = self.take(row_count)?;
        self.inner.skip(n)
    }

    /// Return to row zero.
    pub fn reset(&mut self) -> NimbleResult<()> {
        *self = Self::new(self.data.clone())?;
        Ok(())
    }
}

impl<T: EncodingValue> DecoderInner<T> {
    fn materialize(&mut self, n: u32, out: &mut Vec<T>) -> NimbleResult<()> {
        match self {
            Self::Trivial(d) => d.materialize(n, out),
            Self::Rle(d) => d.materialize(n, out),
            Self::Dictionary(d) => d.materialize(n, out),
            Self::FixedBitWidth(d) => d.materialize(n, out),
            Self::Nullable(d) => d.materialize(n, out),
            Self::SparseBool(d) => d.materialize(n, out),
            Self::MainlyConstant(d) => d.materialize(n, out),
            Self::Constant(d) => d.materialize(n, out),
        }
    }

    fn skip(&mut self, n: u32) -> NimbleResult<()> {
        match self {
            Self::Trivial(d) => d.skip(n),
            Self::Rle(d) => d.skip(n),
            Self::Dictionary(d) => d.skip(n),
            Self::FixedBitWidth(d) => d.skip(n),
            Self::Nullable(d) => d.skip(n),
            Self::SparseBool(d) => d.skip(n),
            Self::MainlyConstant(d) => d.skip(n),
            Self::Constant(d) => d.skip(n),
        }
    }
}
