//! The in-memory value representation exchanged with readers and writers.
//!
//! A [`ColumnVector`] holds one column over a span of rows. Nested data
//! follows the storage discipline: child entries exist only for *present*
//! rows, so a vector's `data` always holds exactly
//! `row_count - null_count` entries. Flat maps additionally gate their value
//! subtrees on per-key in-map bits.

use bytes::Bytes;
use nimble_error::{NimbleResult, nimble_bail};
use nimble_schema::ScalarKind;

/// Typed scalar values, one entry per present row.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValues {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    String(Vec<Bytes>),
    Binary(Vec<Bytes>),
}

impl ScalarValues {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::I8(_) => ScalarKind::Int8,
            Self::U8(_) => ScalarKind::UInt8,
            Self::I16(_) => ScalarKind::Int16,
            Self::U16(_) => ScalarKind::UInt16,
            Self::I32(_) => ScalarKind::Int32,
            Self::U32(_) => ScalarKind::UInt32,
            Self::I64(_) => ScalarKind::Int64,
            Self::U64(_) => ScalarKind::UInt64,
            Self::F32(_) => ScalarKind::Float32,
            Self::F64(_) => ScalarKind::Float64,
            Self::Bool(_) => ScalarKind::Bool,
            Self::String(_) => ScalarKind::String,
            Self::Binary(_) => ScalarKind::Binary,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::U64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Binary(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn empty(kind: ScalarKind) -> NimbleResult<Self> {
        Ok(match kind {
            ScalarKind::Int8 => Self::I8(Vec::new()),
            ScalarKind::UInt8 => Self::U8(Vec::new()),
            ScalarKind::Int16 => Self::I16(Vec::new()),
            ScalarKind::UInt16 => Self::U16(Vec::new()),
            ScalarKind::Int32 => Self::I32(Vec::new()),
            ScalarKind::UInt32 => Self::U32(Vec::new()),
            ScalarKind::Int64 => Self::I64(Vec::new()),
            ScalarKind::UInt64 => Self::U64(Vec::new()),
            ScalarKind::Float32 => Self::F32(Vec::new()),
            ScalarKind::Float64 => Self::F64(Vec::new()),
            ScalarKind::Bool => Self::Bool(Vec::new()),
            ScalarKind::String => Self::String(Vec::new()),
            ScalarKind::Binary => Self::Binary(Vec::new()),
            ScalarKind::Undefined => {
                nimble_bail!(UnsupportedDataType: "cannot build values of undefined kind")
            }
        })
    }

    /// Approximate in-memory byte size, used for flush accounting.
    pub fn raw_byte_size(&self) -> u64 {
        match self {
            Self::I8(v) => v.len() as u64,
            Self::U8(v) => v.len() as u64,
            Self::I16(v) => v.len() as u64 * 2,
            Self::U16(v) => v.len() as u64 * 2,
            Self::I32(v) => v.len() as u64 * 4,
            Self::U32(v) => v.len() as u64 * 4,
            Self::I64(v) => v.len() as u64 * 8,
            Self::U64(v) => v.len() as u64 * 8,
            Self::F32(v) => v.len() as u64 * 4,
            Self::F64(v) => v.len() as u64 * 8,
            Self::Bool(v) => v.len() as u64,
            Self::String(v) | Self::Binary(v) => {
                v.iter().map(|b| b.len() as u64 + 4).sum()
            }
        }
    }
}

/// One materialised flat-map key within a [`ColumnData::FlatMap`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlatMapEntry {
    pub name: String,
    /// One bit per row of the flat-map vector; rows where the map itself is
    /// null carry `false`.
    pub in_map: Vec<bool>,
    /// Values for rows with `in_map = true`, in row order.
    pub values: ColumnVector,
}

/// The shape-specific payload of a [`ColumnVector`].
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Scalar(ScalarValues),
    /// `lengths` has one entry per present row; `elements` holds
    /// `sum(lengths)` rows.
    Array {
        lengths: Vec<u32>,
        elements: Box<ColumnVector>,
    },
    /// `keys` and `values` each hold `sum(lengths)` rows.
    Map {
        lengths: Vec<u32>,
        keys: Box<ColumnVector>,
        values: Box<ColumnVector>,
    },
    /// Each child holds one row per present row of the struct.
    Row { children: Vec<ColumnVector> },
    FlatMap { entries: Vec<FlatMapEntry> },
}

/// One column over a span of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnVector {
    pub row_count: usize,
    /// `true` = present; `None` = all rows present.
    pub nulls: Option<Vec<bool>>,
    pub data: ColumnData,
}

impl ColumnVector {
    /// Number of present rows.
    pub fn present_count(&self) -> usize {
        match &self.nulls {
            None => self.row_count,
            Some(nulls) => nulls.iter().filter(|p| **p).count(),
        }
    }

    pub fn scalar(values: ScalarValues) -> Self {
        Self {
            row_count: values.len(),
            nulls: None,
            data: ColumnData::Scalar(values),
        }
    }

    pub fn nullable_scalar(values: ScalarValues, nulls: Vec<bool>) -> Self {
        Self {
            row_count: nulls.len(),
            nulls: Some(nulls),
            data: ColumnData::Scalar(values),
        }
    }

    /// Presence bits with the all-present case expanded.
    pub fn presence(&self) -> Vec<bool> {
        match &self.nulls {
            None => vec![true; self.row_count],
            Some(nulls) => nulls.clone(),
        }
    }

    /// Validate the present-rows-only discipline of this vector, recursively.
    pub fn validate(&self) -> NimbleResult<()> {
        let present = self.present_count();
        if let Some(nulls) = &self.nulls {
            if nulls.len() != self.row_count {
                nimble_bail!(
                    "null bitmap holds {} bits for {} rows",
                    nulls.len(),
                    self.row_count
                );
            }
        }
        match &self.data {
            ColumnData::Scalar(values) => {
                if values.len() != present {
                    nimble_bail!(
                        "scalar column holds {} values for {} present rows",
                        values.len(),
                        present
                    );
                }
            }
            ColumnData::Array { lengths, elements } => {
                if lengths.len() != present {
                    nimble_bail!(
                        "array column holds {} lengths for {} present rows",
                        lengths.len(),
                        present
                    );
                }
                let total: u64 = lengths.iter().map(|l| u64::from(*l)).sum();
                if elements.row_count as u64 != total {
                    nimble_bail!(
                        "array elements hold {} rows, lengths sum to {}",
                        elements.row_count,
                        total
                    );
                }
                elements.validate()?;
            }
            ColumnData::Map {
                lengths,
                keys,
                values,
            } => {
                if lengths.len() != present {
                    nimble_bail!(
                        "map column holds {} lengths for {} present rows",
                        lengths.len(),
                        present
                    );
                }
                let total: u64 = lengths.iter().map(|l| u64::from(*l)).sum();
                if keys.row_count as u64 != total || values.row_count as u64 != total {
                    nimble_bail!("map keys/values do not match the lengths sum");
                }
                keys.validate()?;
                values.validate()?;
            }
            ColumnData::Row { children } => {
                for child in children {
                    if child.row_count != present {
                        nimble_bail!(
                            "struct child holds {} rows for {} present rows",
                            child.row_count,
                            present
                        );
                    }
                    child.validate()?;
                }
            }
            ColumnData::FlatMap { entries } => {
                for entry in entries {
                    if entry.in_map.len() != self.row_count {
                        nimble_bail!(
                            "flat-map entry '{}' holds {} in-map bits for {} rows",
                            entry.name,
                            entry.in_map.len(),
                            self.row_count
                        );
                    }
                    let in_rows = entry.in_map.iter().filter(|b| **b).count();
                    if entry.values.row_count != in_rows {
                        nimble_bail!(
                            "flat-map entry '{}' holds {} values for {} in-map rows",
                            entry.name,
                            entry.values.row_count,
                            in_rows
                        );
                    }
                    entry.values.validate()?;
                }
            }
        }
        Ok(())
    }

    /// Approximate in-memory byte size, used for flush accounting.
    pub fn raw_byte_size(&self) -> u64 {
        let nulls = self.nulls.as_ref().map_or(0, |n| n.len() as u64 / 8 + 1);
        nulls
            + match &self.data {
                ColumnData::Scalar(values) => values.raw_byte_size(),
                ColumnData::Array { lengths, elements } => {
                    lengths.len() as u64 * 4 + elements.raw_byte_size()
                }
                ColumnData::Map {
                    lengths,
                    keys,
                    values,
                } => lengths.len() as u64 * 4 + keys.raw_byte_size() + values.raw_byte_size(),
                ColumnData::Row { children } => {
                    children.iter().map(ColumnVector::raw_byte_size).sum()
                }
                ColumnData::FlatMap { entries } => entries
                    .iter()
                    .map(|e| e.in_map.len() as u64 / 8 + 1 + e.values.raw_byte_size())
                    .sum(),
            }
    }
}

/// A top-level batch: the root struct's columns over a span of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub row_count: usize,
    pub root: ColumnVector,
}

impl Batch {
    /// Build a batch from named columns; the root struct has no nulls.
    pub fn from_columns<I: IntoIterator<Item = ColumnVector>>(
        row_count: usize,
        columns: I,
    ) -> Self {
        Self {
            row_count,
            root: ColumnVector {
                row_count,
                nulls: None,
                data: ColumnData::Row {
                    children: columns.into_iter().collect(),
                },
            },
        }
    }

    pub fn columns(&self) -> &[ColumnVector] {
        match &self.root.data {
            ColumnData::Row { children } => children,
            _ => &[],
        }
    }
}
