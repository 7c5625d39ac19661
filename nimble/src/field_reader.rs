//! Per-schema-node decoding on the read path.
//!
//! A [`FieldReader`] tree mirrors the selected part of the file schema for
//! one stripe. Structural streams (nulls, lengths, in-map bits) are always
//! materialised, because child row counts depend on them; value streams
//! below unselected nodes are never touched, so their byte ranges are never
//! read from the file.

use bytes::Bytes;
use nimble_encodings::DataType;
use nimble_error::{NimbleResult, nimble_bail};
use nimble_schema::{ScalarKind, SchemaNode, StreamOffset};
use nimble_tablet::ChunkedDecoder;

use crate::{ColumnData, ColumnVector, FlatMapEntry, ScalarValues};

/// Fetches a stream's bytes by descriptor offset. Returns `None` when the
/// stripe does not carry the stream.
pub(crate) type StreamFetch<'a> = dyn FnMut(StreamOffset) -> NimbleResult<Option<Bytes>> + 'a;

/// How a flat-map column materialises.
#[derive(Debug, Clone)]
pub struct FlatMapReadSpec {
    /// Read as a struct of the selected features instead of a generic map.
    pub as_struct: bool,
    pub selector: Option<FeatureSelector>,
}

/// An include or exclude list of flat-map feature names.
#[derive(Debug, Clone)]
pub struct FeatureSelector {
    pub mode: SelectionMode,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Include,
    Exclude,
}

impl FeatureSelector {
    fn selects(&self, name: &str) -> bool {
        let listed = self.features.iter().any(|f| f == name);
        match self.mode {
            SelectionMode::Include => listed,
            SelectionMode::Exclude => !listed,
        }
    }
}

pub(crate) enum FieldReader {
    Scalar(ScalarFieldReader),
    Array(ArrayFieldReader),
    ArrayWithOffsets(ArrayWithOffsetsFieldReader),
    Map(MapFieldReader),
    Row(RowFieldReader),
    FlatMap(FlatMapFieldReader),
}

impl FieldReader {
    /// Build the reader tree for `node`, fetching the streams it needs.
    /// `target` overrides the produced scalar kind (numeric up-casts only).
    pub(crate) fn new(
        node: &SchemaNode,
        fetch: &mut StreamFetch<'_>,
        target: Option<ScalarKind>,
        flat_map: Option<&FlatMapReadSpec>,
    ) -> NimbleResult<Self> {
        Ok(match node {
            SchemaNode::Scalar { kind, values } => FieldReader::Scalar(ScalarFieldReader::new(
                *kind,
                target.unwrap_or(*kind),
                fetch(*values)?,
            )?),
            SchemaNode::Array { lengths, elements } => FieldReader::Array(ArrayFieldReader {
                lengths: decoder_for(fetch(*lengths)?),
                elements: Box::new(FieldReader::new(elements, fetch, None, None)?),
            }),
            SchemaNode::ArrayWithOffsets {
                offsets,
                lengths,
                elements,
            } => FieldReader::ArrayWithOffsets(ArrayWithOffsetsFieldReader {
                offsets: decoder_for(fetch(*offsets)?),
                lengths: decoder_for(fetch(*lengths)?),
                elements: Box::new(FieldReader::new(elements, fetch, None, None)?),
                last_offset: None,
                last: None,
            }),
            SchemaNode::Map {
                lengths,
                keys,
                values,
            } => FieldReader::Map(MapFieldReader {
                lengths: decoder_for(fetch(*lengths)?),
                keys: Box::new(FieldReader::new(keys, fetch, None, None)?),
                values: Box::new(FieldReader::new(values, fetch, None, None)?),
            }),
            SchemaNode::SlidingWindowMap { .. } => {
                nimble_bail!(UnsupportedDataType: "sliding-window-map columns are not readable")
            }
            SchemaNode::Row {
                nulls, children, ..
            } => FieldReader::Row(RowFieldReader {
                nulls: fetch(*nulls)?.map(ChunkedDecoder::new),
                children: children
                    .iter()
                    .map(|child| FieldReader::new(child, fetch, None, None))
                    .collect::<NimbleResult<Vec<_>>>()?,
            }),
            SchemaNode::FlatMap { nulls, children } => {
                let spec = flat_map.cloned().unwrap_or(FlatMapReadSpec {
                    as_struct: false,
                    selector: None,
                });
                let mut features = Vec::new();
                for child in children {
                    let selected = spec
                        .selector
                        .as_ref()
                        .map_or(true, |s| s.selects(&child.name));
                    if !selected {
                        continue;
                    }
                    features.push(FlatMapFeatureReader {
                        name: child.name.clone(),
                        in_map: fetch(child.in_map)?.map(ChunkedDecoder::new),
                        value: Box::new(FieldReader::new(&child.value, fetch, None, None)?),
                    });
                }
                FieldReader::FlatMap(FlatMapFieldReader {
                    nulls: fetch(*nulls)?.map(ChunkedDecoder::new),
                    features,
                    as_struct: spec.as_struct,
                })
            }
        })
    }

    /// Produce the next `row_count` rows of this subtree.
    pub(crate) fn read(&mut self, row_count: usize) -> NimbleResult<ColumnVector> {
        match self {
            FieldReader::Scalar(r) => r.read(row_count),
            FieldReader::Array(r) => r.read(row_count),
            FieldReader::ArrayWithOffsets(r) => r.read(row_count),
            FieldReader::Map(r) => r.read(row_count),
            FieldReader::Row(r) => r.read(row_count),
            FieldReader::FlatMap(r) => r.read(row_count),
        }
    }

    /// Advance this subtree by `row_count` rows without materialising
    /// values. Structural streams are still consulted to find the child row
    /// counts to skip.
    pub(crate) fn skip(&mut self, row_count: usize) -> NimbleResult<()> {
        match self {
            FieldReader::Scalar(r) => r.skip(row_count),
            FieldReader::Array(r) => r.skip(row_count),
            // Repeated rows may reference the array being skipped over, so
            // the dedup cache must stay warm.
            FieldReader::ArrayWithOffsets(r) => r.read(row_count).map(|_| ()),
            FieldReader::Map(r) => r.skip(row_count),
            FieldReader::Row(r) => r.skip(row_count),
            FieldReader::FlatMap(r) => r.skip(row_count),
        }
    }
}

fn decoder_for<T: nimble_encodings::EncodingValue>(bytes: Option<Bytes>) -> ChunkedDecoder<T> {
    match bytes {
        Some(bytes) => ChunkedDecoder::new(bytes),
        None => ChunkedDecoder::empty(),
    }
}

/// Split a nullable materialisation into present-only values plus an
/// optional null bitmap.
fn compact_nulls<T>(values: Vec<T>, nulls: Vec<bool>) -> (Vec<T>, Option<Vec<bool>>) {
    if nulls.iter().all(|p| *p) {
        return (values, None);
    }
    let compacted = values
        .into_iter()
        .zip(&nulls)
        .filter(|(_, present)| **present)
        .map(|(value, _)| value)
        .collect();
    (compacted, Some(nulls))
}

pub(crate) struct ScalarFieldReader {
    stored: ScalarKind,
    target: ScalarKind,
    decoder: TypedDecoder,
}

enum TypedDecoder {
    I8(ChunkedDecoder<i8>),
    U8(ChunkedDecoder<u8>),
    I16(ChunkedDecoder<i16>),
    U16(ChunkedDecoder<u16>),
    I32(ChunkedDecoder<i32>),
    U32(ChunkedDecoder<u32>),
    I64(ChunkedDecoder<i64>),
    U64(ChunkedDecoder<u64>),
    F32(ChunkedDecoder<f32>),
    F64(ChunkedDecoder<f64>),
    Bool(ChunkedDecoder<bool>),
    Bytes(ChunkedDecoder<Bytes>),
}

impl ScalarFieldReader {
    fn new(stored: ScalarKind, target: ScalarKind, bytes: Option<Bytes>) -> NimbleResult<Self> {
        if !stored.upcasts_to(target) {
            nimble_bail!(
                TypeMismatch: "column stores {} which cannot be read as {}",
                stored,
                target
            );
        }
        let bytes = bytes.unwrap_or_default();
        let decoder = match stored.data_type() {
            DataType::I8 => TypedDecoder::I8(ChunkedDecoder::new(bytes)),
            DataType::U8 => TypedDecoder::U8(ChunkedDecoder::new(bytes)),
            DataType::I16 => TypedDecoder::I16(ChunkedDecoder::new(bytes)),
            DataType::U16 => TypedDecoder::U16(ChunkedDecoder::new(bytes)),
            DataType::I32 => TypedDecoder::I32(ChunkedDecoder::new(bytes)),
            DataType::U32 => TypedDecoder::U32(ChunkedDecoder::new(bytes)),
            DataType::I64 => TypedDecoder::I64(ChunkedDecoder::new(bytes)),
            DataType::U64 => TypedDecoder::U64(ChunkedDecoder::new(bytes)),
            DataType::F32 => TypedDecoder::F32(ChunkedDecoder::new(bytes)),
            DataType::F64 => TypedDecoder::F64(ChunkedDecoder::new(bytes)),
            DataType::Bool => TypedDecoder::Bool(ChunkedDecoder::new(bytes)),
            DataType::String | DataType::Binary => TypedDecoder::Bytes(ChunkedDecoder::new(bytes)),
            DataType::Undefined => {
                nimble_bail!(UnsupportedDataType: "cannot read undefined scalars")
            }
        };
        Ok(Self {
            stored,
            target,
            decoder,
        })
    }

    fn read(&mut self, row_count: usize) -> NimbleResult<ColumnVector> {
        let mut nulls = Vec::with_capacity(row_count);
        let values = match &mut self.decoder {
            TypedDecoder::I8(d) => read_scalars(d, row_count, &mut nulls, ScalarValues::I8)?,
            TypedDecoder::U8(d) => read_scalars(d, row_count, &mut nulls, ScalarValues::U8)?,
            TypedDecoder::I16(d) => read_scalars(d, row_count, &mut nulls, ScalarValues::I16)?,
            TypedDecoder::U16(d) => read_scalars(d, row_count, &mut nulls, ScalarValues::U16)?,
            TypedDecoder::I32(d) => read_scalars(d, row_count, &mut nulls, ScalarValues::I32)?,
            TypedDecoder::U32(d) => read_scalars(d, row_count, &mut nulls, ScalarValues::U32)?,
            TypedDecoder::I64(d) => read_scalars(d, row_count, &mut nulls, ScalarValues::I64)?,
            TypedDecoder::U64(d) => read_scalars(d, row_count, &mut nulls, ScalarValues::U64)?,
            TypedDecoder::F32(d) => read_scalars(d, row_count, &mut nulls, ScalarValues::F32)?,
            TypedDecoder::F64(d) => read_scalars(d, row_count, &mut nulls, ScalarValues::F64)?,
            TypedDecoder::Bool(d) => read_scalars(d, row_count, &mut nulls, ScalarValues::Bool)?,
            TypedDecoder::Bytes(d) => {
                let mut values = Vec::with_capacity(row_count);
                d.materialize_nullable(row_count, &mut values, &mut nulls)?;
                let (values, nulls) = compact_nulls(values, std::mem::take(&mut nulls));
                let values = if self.stored == ScalarKind::Binary {
                    ScalarValues::Binary(values)
                } else {
                    ScalarValues::String(values)
                };
                return Ok(ColumnVector {
                    row_count,
                    nulls,
                    data: ColumnData::Scalar(values),
                });
            }
        };
        let (values, nulls) = split_scalars(values, nulls);
        let values = upcast_scalars(values, self.target)?;
        Ok(ColumnVector {
            row_count,
            nulls,
            data: ColumnData::Scalar(values),
        })
    }

    fn skip(&mut self, row_count: usize) -> NimbleResult<()> {
        match &mut self.decoder {
            TypedDecoder::I8(d) => d.skip(row_count),
            TypedDecoder::U8(d) => d.skip(row_count),
            TypedDecoder::I16(d) => d.skip(row_count),
            TypedDecoder::U16(d) => d.skip(row_count),
            TypedDecoder::I32(d) => d.skip(row_count),
            TypedDecoder::U32(d) => d.skip(row_count),
            TypedDecoder::I64(d) => d.skip(row_count),
            TypedDecoder::U64(d) => d.skip(row_count),
            TypedDecoder::F32(d) => d.skip(row_count),
            TypedDecoder::F64(d) => d.skip(row_count),
            TypedDecoder::Bool(d) => d.skip(row_count),
            TypedDecoder::Bytes(d) => d.skip(row_count),
        }
    }
}

fn read_scalars<T: nimble_encodings::EncodingValue>(
    decoder: &mut ChunkedDecoder<T>,
    row_count: usize,
    nulls: &mut Vec<bool>,
    wrap: impl FnOnce(Vec<T>) -> ScalarValues,
) -> NimbleResult<ScalarValues> {
    let mut values = Vec::with_capacity(row_count);
    decoder.materialize_nullable(row_count, &mut values, nulls)?;
    Ok(wrap(values))
}

/// Compact an all-rows materialisation into present-only values.
fn split_scalars(values: ScalarValues, nulls: Vec<bool>) -> (ScalarValues, Option<Vec<bool>>) {
    if nulls.iter().all(|p| *p) {
        return (values, None);
    }
    let compacted = match values {
        ScalarValues::I8(v) => ScalarValues::I8(filter_present(v, &nulls)),
        ScalarValues::U8(v) => ScalarValues::U8(filter_present(v, &nulls)),
        ScalarValues::I16(v) => ScalarValues::I16(filter_present(v, &nulls)),
        ScalarValues::U16(v) => ScalarValues::U16(filter_present(v, &nulls)),
        ScalarValues::I32(v) => ScalarValues::I32(filter_present(v, &nulls)),
        ScalarValues::U32(v) => ScalarValues::U32(filter_present(v, &nulls)),
        ScalarValues::I64(v) => ScalarValues::I64(filter_present(v, &nulls)),
        ScalarValues::U64(v) => ScalarValues::U64(filter_present(v, &nulls)),
        ScalarValues::F32(v) => ScalarValues::F32(filter_present(v, &nulls)),
        ScalarValues::F64(v) => ScalarValues::F64(filter_present(v, &nulls)),
        ScalarValues::Bool(v) => ScalarValues::Bool(filter_present(v, &nulls)),
        ScalarValues::String(v) => ScalarValues::String(filter_present(v, &nulls)),
        ScalarValues::Binary(v) => ScalarValues::Binary(filter_present(v, &nulls)),
    };
    (compacted, Some(nulls))
}

fn filter_present<T>(values: Vec<T>, nulls: &[bool]) -> Vec<T> {
    values
        .into_iter()
        .zip(nulls)
        .filter(|(_, present)| **present)
        .map(|(value, _)| value)
        .collect()
}

/// Widen `values` to `target`. The caller has already validated the cast.
fn upcast_scalars(values: ScalarValues, target: ScalarKind) -> NimbleResult<ScalarValues> {
    if values.kind() == target {
        return Ok(values);
    }
    Ok(match values {
        ScalarValues::I8(v) => widen_ints(v.into_iter().map(i128::from), target)?,
        ScalarValues::U8(v) => widen_ints(v.into_iter().map(i128::from), target)?,
        ScalarValues::I16(v) => widen_ints(v.into_iter().map(i128::from), target)?,
        ScalarValues::U16(v) => widen_ints(v.into_iter().map(i128::from), target)?,
        ScalarValues::I32(v) => widen_ints(v.into_iter().map(i128::from), target)?,
        ScalarValues::U32(v) => widen_ints(v.into_iter().map(i128::from), target)?,
        ScalarValues::Bool(v) => widen_ints(v.into_iter().map(i128::from), target)?,
        ScalarValues::F32(v) => {
            if target != ScalarKind::Float64 {
                nimble_bail!(TypeMismatch: "f32 can only widen to f64");
            }
            ScalarValues::F64(v.into_iter().map(f64::from).collect())
        }
        other => nimble_bail!(
            TypeMismatch: "column stores {} which cannot be read as {}",
            other.kind(),
            target
        ),
    })
}

fn widen_ints(values: impl Iterator<Item = i128>, target: ScalarKind) -> NimbleResult<ScalarValues> {
    Ok(match target {
        ScalarKind::Int8 => ScalarValues::I8(values.map(|v| v as i8).collect()),
        ScalarKind::UInt8 => ScalarValues::U8(values.map(|v| v as u8).collect()),
        ScalarKind::Int16 => ScalarValues::I16(values.map(|v| v as i16).collect()),
        ScalarKind::UInt16 => ScalarValues::U16(values.map(|v| v as u16).collect()),
        ScalarKind::Int32 => ScalarValues::I32(values.map(|v| v as i32).collect()),
        ScalarKind::UInt32 => ScalarValues::U32(values.map(|v| v as u32).collect()),
        ScalarKind::Int64 => ScalarValues::I64(values.map(|v| v as i64).collect()),
        ScalarKind::UInt64 => ScalarValues::U64(values.map(|v| v as u64).collect()),
        other => nimble_bail!(TypeMismatch: "cannot widen integers to {}", other),
    })
}

pub(crate) struct ArrayFieldReader {
    lengths: ChunkedDecoder<u32>,
    elements: Box<FieldReader>,
}

impl ArrayFieldReader {
    fn lengths_for(&mut self, row_count: usize) -> NimbleResult<(Vec<u32>, Option<Vec<bool>>)> {
        let mut lengths = Vec::with_capacity(row_count);
        let mut nulls = Vec::with_capacity(row_count);
        self.lengths
            .materialize_nullable(row_count, &mut lengths, &mut nulls)?;
        Ok(compact_nulls(lengths, nulls))
    }

    fn read(&mut self, row_count: usize) -> NimbleResult<ColumnVector> {
        let (lengths, nulls) = self.lengths_for(row_count)?;
        let total: usize = lengths.iter().map(|l| *l as usize).sum();
        let elements = self.elements.read(total)?;
        Ok(ColumnVector {
            row_count,
            nulls,
            data: ColumnData::Array {
                lengths,
                elements: Box::new(elements),
            },
        })
    }

    fn skip(&mut self, row_count: usize) -> NimbleResult<()> {
        let (lengths, _) = self.lengths_for(row_count)?;
        let total: usize = lengths.iter().map(|l| *l as usize).sum();
        self.elements.skip(total)
    }
}

pub(crate) struct MapFieldReader {
    lengths: ChunkedDecoder<u32>,
    keys: Box<FieldReader>,
    values: Box<FieldReader>,
}

impl MapFieldReader {
    fn lengths_for(&mut self, row_count: usize) -> NimbleResult<(Vec<u32>, Option<Vec<bool>>)> {
        let mut lengths = Vec::with_capacity(row_count);
        let mut nulls = Vec::with_capacity(row_count);
        self.lengths
            .materialize_nullable(row_count, &mut lengths, &mut nulls)?;
        Ok(compact_nulls(lengths, nulls))
    }

    fn read(&mut self, row_count: usize) -> NimbleResult<ColumnVector> {
        let (lengths, nulls) = self.lengths_for(row_count)?;
        let total: usize = lengths.iter().map(|l| *l as usize).sum();
        let keys = self.keys.read(total)?;
        let values = self.values.read(total)?;
        Ok(ColumnVector {
            row_count,
            nulls,
            data: ColumnData::Map {
                lengths,
                keys: Box::new(keys),
                values: Box::new(values),
            },
        })
    }

    fn skip(&mut self, row_count: usize) -> NimbleResult<()> {
        let (lengths, _) = self.lengths_for(row_count)?;
        let total: usize = lengths.iter().map(|l| *l as usize).sum();
        self.keys.skip(total)?;
        self.values.skip(total)
    }
}

pub(crate) struct RowFieldReader {
    pub(crate) nulls: Option<ChunkedDecoder<bool>>,
    pub(crate) children: Vec<FieldReader>,
}

impl RowFieldReader {
    pub(crate) fn presence_for(&mut self, row_count: usize) -> NimbleResult<Option<Vec<bool>>> {
        let Some(nulls) = &mut self.nulls else {
            return Ok(None);
        };
        let mut presence = Vec::with_capacity(row_count);
        nulls.materialize(row_count, &mut presence)?;
        if presence.iter().all(|p| *p) {
            Ok(None)
        } else {
            Ok(Some(presence))
        }
    }

    pub(crate) fn read(&mut self, row_count: usize) -> NimbleResult<ColumnVector> {
        let presence = self.presence_for(row_count)?;
        let present = presence
            .as_ref()
            .map_or(row_count, |p| p.iter().filter(|b| **b).count());
        let children = self
            .children
            .iter_mut()
            .map(|child| child.read(present))
            .collect::<NimbleResult<Vec<_>>>()?;
        Ok(ColumnVector {
            row_count,
            nulls: presence,
            data: ColumnData::Row { children },
        })
    }

    fn skip(&mut self, row_count: usize) -> NimbleResult<()> {
        let presence = self.presence_for(row_count)?;
        let present = presence
            .as_ref()
            .map_or(row_count, |p| p.iter().filter(|b| **b).count());
        for child in &mut self.children {
            child.skip(present)?;
        }
        Ok(())
    }
}

struct FlatMapFeatureReader {
    name: String,
    in_map: Option<ChunkedDecoder<bool>>,
    value: Box<FieldReader>,
}

impl FlatMapFeatureReader {
    fn in_map_for(&mut self, row_count: usize) -> NimbleResult<Vec<bool>> {
        match &mut self.in_map {
            // The stripe predates this key; the key is absent everywhere.
            None => Ok(vec![false; row_count]),
            Some(decoder) => {
                let mut bits = Vec::with_capacity(row_count);
                decoder.materialize(row_count, &mut bits)?;
                Ok(bits)
            }
        }
    }
}

pub(crate) struct FlatMapFieldReader {
    nulls: Option<ChunkedDecoder<bool>>,
    features: Vec<FlatMapFeatureReader>,
    as_struct: bool,
}

impl FlatMapFieldReader {
    fn presence_for(&mut self, row_count: usize) -> NimbleResult<Option<Vec<bool>>> {
        let Some(nulls) = &mut self.nulls else {
            return Ok(None);
        };
        let mut presence = Vec::with_capacity(row_count);
        nulls.materialize(row_count, &mut presence)?;
        if presence.iter().all(|p| *p) {
            Ok(None)
        } else {
            Ok(Some(presence))
        }
    }

    fn read(&mut self, row_count: usize) -> NimbleResult<ColumnVector> {
        let presence = self.presence_for(row_count)?;
        let mut entries = Vec::with_capacity(self.features.len());
        for feature in &mut self.features {
            let in_map = feature.in_map_for(row_count)?;
            let in_rows = in_map.iter().filter(|b| **b).count();
            let values = feature.value.read(in_rows)?;
            entries.push(FlatMapEntry {
                name: feature.name.clone(),
                in_map,
                values,
            });
        }
        if self.as_struct {
            as_struct(row_count, presence, entries)
        } else {
            as_map(row_count, presence, entries)
        }
    }

    fn skip(&mut self, row_count: usize) -> NimbleResult<()> {
        if let Some(nulls) = &mut self.nulls {
            nulls.skip(row_count)?;
        }
        for feature in &mut self.features {
            let in_map = feature.in_map_for(row_count)?;
            let in_rows = in_map.iter().filter(|b| **b).count();
            feature.value.skip(in_rows)?;
        }
        Ok(())
    }
}

/// Materialise a flat map as a struct whose fields are the selected
/// features; a field is null wherever its in-map bit is clear.
fn as_struct(
    row_count: usize,
    presence: Option<Vec<bool>>,
    entries: Vec<FlatMapEntry>,
) -> NimbleResult<ColumnVector> {
    let present_rows: Vec<usize> = match &presence {
        None => (0..row_count).collect(),
        Some(p) => p
            .iter()
            .enumerate()
            .filter(|(_, present)| **present)
            .map(|(i, _)| i)
            .collect(),
    };
    let children = entries
        .into_iter()
        .map(|entry| {
            let inner_presence = entry.values.presence();
            let mut inner = inner_presence.iter();
            let merged: Vec<bool> = present_rows
                .iter()
                .map(|row| {
                    if entry.in_map[*row] {
                        *inner.next().unwrap_or(&false)
                    } else {
                        false
                    }
                })
                .collect();
            ColumnVector {
                row_count: present_rows.len(),
                nulls: Some(merged),
                data: entry.values.data,
            }
        })
        .collect();
    Ok(ColumnVector {
        row_count,
        nulls: presence,
        data: ColumnData::Row { children },
    })
}

/// Materialise a flat map as a generic map. Requires scalar feature values.
fn as_map(
    row_count: usize,
    presence: Option<Vec<bool>>,
    entries: Vec<FlatMapEntry>,
) -> NimbleResult<ColumnVector> {
    struct FeatureState {
        name: Bytes,
        in_map: Vec<bool>,
        presence: Vec<bool>,
        values: ScalarValues,
        /// Cursors into `presence` and `values`.
        row: usize,
        value: usize,
    }

    let mut states = entries
        .into_iter()
        .map(|entry| {
            let ColumnData::Scalar(values) = entry.values.data else {
                nimble_bail!(
                    UnsupportedDataType: "flat-map '{}' has nested values; read it as a struct",
                    entry.name
                );
            };
            Ok(FeatureState {
                name: Bytes::from(entry.name.into_bytes()),
                in_map: entry.in_map,
                presence: entry.values.nulls.unwrap_or_default(),
                values,
                row: 0,
                value: 0,
            })
        })
        .collect::<NimbleResult<Vec<_>>>()?;

    let value_kind = states
        .first()
        .map(|s| s.values.kind())
        .unwrap_or(ScalarKind::Int64);
    let mut lengths: Vec<u32> = Vec::new();
    let mut keys: Vec<Bytes> = Vec::new();
    let mut out_values = ScalarValues::empty(value_kind)?;
    let mut out_presence: Vec<bool> = Vec::new();

    for row in 0..row_count {
        let row_present = presence.as_ref().map_or(true, |p| p[row]);
        let mut length = 0u32;
        for state in &mut states {
            if !state.in_map[row] {
                continue;
            }
            length += 1;
            keys.push(state.name.clone());
            let value_present = state.presence.is_empty() || state.presence[state.row];
            state.row += 1;
            out_presence.push(value_present);
            if value_present {
                out_values.push_from(&state.values, state.value)?;
                state.value += 1;
            }
        }
        if row_present {
            lengths.push(length);
        }
    }

    let total = keys.len();
    let values_nulls = if out_presence.iter().all(|p| *p) {
        None
    } else {
        Some(out_presence)
    };
    Ok(ColumnVector {
        row_count,
        nulls: presence,
        data: ColumnData::Map {
            lengths,
            keys: Box::new(ColumnVector::scalar(ScalarValues::String(keys))),
            values: Box::new(ColumnVector {
                row_count: total,
                nulls: values_nulls,
                data: ColumnData::Scalar(out_values),
            }),
        },
    })
}

pub(crate) struct ArrayWithOffsetsFieldReader {
    offsets: ChunkedDecoder<u32>,
    lengths: ChunkedDecoder<u32>,
    elements: Box<FieldReader>,
    last_offset: Option<u32>,
    last: Option<(u32, ScalarValues)>,
}

impl ArrayWithOffsetsFieldReader {
    /// Deduplicated arrays are reconstructed row by row: a repeated offset
    /// replays the cached last array, a new offset pulls the next unique
    /// array's length and elements.
    fn read(&mut self, row_count: usize) -> NimbleResult<ColumnVector> {
        let mut offset_values = Vec::with_capacity(row_count);
        let mut offset_nulls = Vec::with_capacity(row_count);
        self.offsets
            .materialize_nullable(row_count, &mut offset_values, &mut offset_nulls)?;
        let (offsets, nulls) = compact_nulls(offset_values, offset_nulls);

        let mut lengths = Vec::with_capacity(offsets.len());
        let mut elements: Option<ScalarValues> = None;
        for offset in offsets {
            if self.last_offset != Some(offset) {
                let mut length = Vec::with_capacity(1);
                self.lengths.materialize(1, &mut length)?;
                let unique = self.read_unique_elements(length[0] as usize)?;
                self.last = Some((length[0], unique));
                self.last_offset = Some(offset);
            }
            let Some((length, values)) = &self.last else {
                nimble_bail!(MalformedEncoding: "offsets-array references no cached array");
            };
            lengths.push(*length);
            match &mut elements {
                Some(elements) => elements.append(values),
                None => elements = Some(values.clone()),
            }
        }

        let elements = match elements {
            Some(elements) => ColumnVector::scalar(elements),
            None => {
                // Zero present rows; produce an empty elements vector of the
                // right type by reading zero rows.
                self.elements.read(0)?
            }
        };
        Ok(ColumnVector {
            row_count,
            nulls,
            data: ColumnData::Array {
                lengths,
                elements: Box::new(elements),
            },
        })
    }

    fn read_unique_elements(&mut self, length: usize) -> NimbleResult<ScalarValues> {
        let unique = self.elements.read(length)?;
        let ColumnData::Scalar(values) = unique.data else {
            nimble_bail!(UnsupportedDataType: "offsets-array elements must be scalars");
        };
        Ok(values)
    }
}

impl ScalarValues {
    fn append(&mut self, other: &ScalarValues) {
        match (self, other) {
            (Self::I8(dst), Self::I8(src)) => dst.extend_from_slice(src),
            (Self::U8(dst), Self::U8(src)) => dst.extend_from_slice(src),
            (Self::I16(dst), Self::I16(src)) => dst.extend_from_slice(src),
            (Self::U16(dst), Self::U16(src)) => dst.extend_from_slice(src),
            (Self::I32(dst), Self::I32(src)) => dst.extend_from_slice(src),
            (Self::U32(dst), Self::U32(src)) => dst.extend_from_slice(src),
            (Self::I64(dst), Self::I64(src)) => dst.extend_from_slice(src),
            (Self::U64(dst), Self::U64(src)) => dst.extend_from_slice(src),
            (Self::F32(dst), Self::F32(src)) => dst.extend_from_slice(src),
            (Self::F64(dst), Self::F64(src)) => dst.extend_from_slice(src),
            (Self::Bool(dst), Self::Bool(src)) => dst.extend_from_slice(src),
            (Self::String(dst), Self::String(src)) => dst.extend_from_slice(src),
            (Self::Binary(dst), Self::Binary(src)) => dst.extend_from_slice(src),
            _ => {}
        }
    }

    fn push_from(&mut self, other: &ScalarValues, index: usize) -> NimbleResult<()> {
        match (self, other) {
            (Self::I8(dst), Self::I8(src)) => dst.push(src[index]),
            (Self::U8(dst), Self::U8(src)) => dst.push(src[index]),
            (Self::I16(dst), Self::I16(src)) => dst.push(src[index]),
            (Self::U16(dst), Self::U16(src)) => dst.push(src[index]),
            (Self::I32(dst), Self::I32(src)) => dst.push(src[index]),
            (Self::U32(dst), Self::U32(src)) => dst.push(src[index]),
            (Self::I64(dst), Self::I64(src)) => dst.push(src[index]),
            (Self::U64(dst), Self::U64(src)) => dst.push(src[index]),
            (Self::F32(dst), Self::F32(src)) => dst.push(src[index]),
            (Self::F64(dst), Self::F64(src)) => dst.push(src[index]),
            (Self::Bool(dst), Self::Bool(src)) => dst.push(src[index]),
            (Self::String(dst), Self::String(src)) => dst.push(src[index].clone()),
            (Self::Binary(dst), Self::Binary(src)) => dst.push(src[index].clone()),
            _ => nimble_bail!(TypeMismatch: "mixed value kinds across flat-map features"),
        }
        Ok(())
    }
}
