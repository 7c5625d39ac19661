//! Per-schema-node stream accumulation on the write path.
//!
//! A [`FieldWriter`] tree mirrors the logical type. Every batch write
//! scatters column data into per-stream buffers; closing a chunk drains the
//! buffers into encode jobs, and flushing a stripe drains the framed chunks
//! into the tablet writer. Stream descriptor offsets are allocated from a
//! shared monotonic counter as the tree is built, and lazily for flat-map
//! keys as the writer first observes them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use nimble_common::{CompressionOptions, MemoryPool, Vector};
use nimble_encodings::{EncodingLayout, Selector, encode_nullable_values, encode_values};
use nimble_error::{NimbleResult, nimble_bail};
use nimble_schema::{
    EncodingLayoutTree, FlatMapChild, LogicalType, ScalarKind, SchemaNode, StreamOffset,
    stream_ids,
};
use nimble_tablet::write_chunk;

use crate::{ColumnData, ColumnVector, ScalarValues};

/// Allocates stream descriptor offsets, monotonically across the schema.
pub(crate) struct OffsetAllocator {
    next: AtomicU32,
}

impl OffsetAllocator {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU32::new(0),
        }
    }

    fn allocate(&self) -> StreamOffset {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Pool-accounted accumulation for one physical stream.
struct StreamBuffer {
    id: StreamOffset,
    values: ScalarBuffer,
    /// Presence bits for nullable streams; `None` for structural bool
    /// streams (nulls, in-map), whose values are the bits themselves.
    presence: Option<Vec<bool>>,
    replay: Option<EncodingLayout>,
    pool: MemoryPool,
}

impl StreamBuffer {
    fn new(
        id: StreamOffset,
        kind: ScalarKind,
        nullable: bool,
        replay: Option<EncodingLayout>,
        pool: &MemoryPool,
    ) -> NimbleResult<Self> {
        Ok(Self {
            id,
            values: ScalarBuffer::new(kind, pool)?,
            presence: nullable.then(Vec::new),
            replay,
            pool: pool.clone(),
        })
    }

    fn row_count(&self) -> usize {
        match &self.presence {
            Some(presence) => presence.len(),
            None => self.values.len(),
        }
    }

    /// Move the accumulated rows out as an encode job, leaving the buffer
    /// empty for the next chunk.
    fn take_chunk(&mut self, jobs: &mut Vec<PendingChunk>) -> NimbleResult<()> {
        if self.row_count() == 0 {
            return Ok(());
        }
        let values = self.values.take(&self.pool)?;
        let presence = self.presence.as_mut().map(std::mem::take);
        jobs.push(PendingChunk {
            id: self.id,
            values,
            presence,
            replay: self.replay.clone(),
        });
        Ok(())
    }
}

/// One stream's drained chunk, ready to encode. Self-contained and `Send`,
/// so chunks can be encoded on a parallel executor.
pub(crate) struct PendingChunk {
    pub(crate) id: StreamOffset,
    values: ScalarBuffer,
    presence: Option<Vec<bool>>,
    replay: Option<EncodingLayout>,
}

impl PendingChunk {
    /// Encode and frame this chunk, returning the stream id and frame bytes.
    pub(crate) fn encode(
        self,
        options: &CompressionOptions,
    ) -> NimbleResult<(StreamOffset, Vec<u8>)> {
        let selector = match self.replay {
            Some(layout) => Selector::replay(layout),
            None => Selector::learned(),
        };
        let encoded = match &self.values {
            ScalarBuffer::I8(v) => encode_buffer(&selector, v, &self.presence)?,
            ScalarBuffer::U8(v) => encode_buffer(&selector, v, &self.presence)?,
            ScalarBuffer::I16(v) => encode_buffer(&selector, v, &self.presence)?,
            ScalarBuffer::U16(v) => encode_buffer(&selector, v, &self.presence)?,
            ScalarBuffer::I32(v) => encode_buffer(&selector, v, &self.presence)?,
            ScalarBuffer::U32(v) => encode_buffer(&selector, v, &self.presence)?,
            ScalarBuffer::I64(v) => encode_buffer(&selector, v, &self.presence)?,
            ScalarBuffer::U64(v) => encode_buffer(&selector, v, &self.presence)?,
            ScalarBuffer::F32(v) => encode_buffer(&selector, v, &self.presence)?,
            ScalarBuffer::F64(v) => encode_buffer(&selector, v, &self.presence)?,
            ScalarBuffer::Bool(v) => encode_buffer(&selector, v, &self.presence)?,
            ScalarBuffer::Bytes(v) => encode_buffer(&selector, v, &self.presence)?,
        };
        let mut frame = Vec::with_capacity(encoded.len() + nimble_tablet::CHUNK_FRAME_SIZE);
        write_chunk(&encoded, options, &mut frame)?;
        Ok((self.id, frame))
    }
}

fn encode_buffer<T: nimble_encodings::EncodingValue>(
    selector: &Selector,
    values: &Vector<T>,
    presence: &Option<Vec<bool>>,
) -> NimbleResult<Vec<u8>> {
    let encoded = match presence {
        Some(presence) => encode_nullable_values(selector, values, presence)?,
        None => encode_values(selector, values)?,
    };
    Ok(encoded.bytes)
}

/// Typed, pool-accounted value accumulation.
enum ScalarBuffer {
    I8(Vector<i8>),
    U8(Vector<u8>),
    I16(Vector<i16>),
    U16(Vector<u16>),
    I32(Vector<i32>),
    U32(Vector<u32>),
    I64(Vector<i64>),
    U64(Vector<u64>),
    F32(Vector<f32>),
    F64(Vector<f64>),
    Bool(Vector<bool>),
    Bytes(Vector<Bytes>),
}

impl ScalarBuffer {
    fn new(kind: ScalarKind, pool: &MemoryPool) -> NimbleResult<Self> {
        Ok(match kind {
            ScalarKind::Int8 => Self::I8(Vector::new(pool)),
            ScalarKind::UInt8 => Self::U8(Vector::new(pool)),
            ScalarKind::Int16 => Self::I16(Vector::new(pool)),
            ScalarKind::UInt16 => Self::U16(Vector::new(pool)),
            ScalarKind::Int32 => Self::I32(Vector::new(pool)),
            ScalarKind::UInt32 => Self::U32(Vector::new(pool)),
            ScalarKind::Int64 => Self::I64(Vector::new(pool)),
            ScalarKind::UInt64 => Self::U64(Vector::new(pool)),
            ScalarKind::Float32 => Self::F32(Vector::new(pool)),
            ScalarKind::Float64 => Self::F64(Vector::new(pool)),
            ScalarKind::Bool => Self::Bool(Vector::new(pool)),
            ScalarKind::String | ScalarKind::Binary => Self::Bytes(Vector::new(pool)),
            ScalarKind::Undefined => {
                nimble_bail!(UnsupportedDataType: "cannot buffer undefined scalars")
            }
        })
    }

    fn len(&self) -> usize {
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
            Self::Bytes(v) => v.len(),
        }
    }

    /// Replace `self` with an empty buffer of the same type, returning the
    /// accumulated values.
    fn take(&mut self, pool: &MemoryPool) -> NimbleResult<ScalarBuffer> {
        let empty = match self {
            Self::I8(_) => Self::I8(Vector::new(pool)),
            Self::U8(_) => Self::U8(Vector::new(pool)),
            Self::I16(_) => Self::I16(Vector::new(pool)),
            Self::U16(_) => Self::U16(Vector::new(pool)),
            Self::I32(_) => Self::I32(Vector::new(pool)),
            Self::U32(_) => Self::U32(Vector::new(pool)),
            Self::I64(_) => Self::I64(Vector::new(pool)),
            Self::U64(_) => Self::U64(Vector::new(pool)),
            Self::F32(_) => Self::F32(Vector::new(pool)),
            Self::F64(_) => Self::F64(Vector::new(pool)),
            Self::Bool(_) => Self::Bool(Vector::new(pool)),
            Self::Bytes(_) => Self::Bytes(Vector::new(pool)),
        };
        Ok(std::mem::replace(self, empty))
    }

    fn append_scalars(&mut self, values: &ScalarValues) -> NimbleResult<()> {
        match (self, values) {
            (Self::I8(buf), ScalarValues::I8(v)) => buf.extend_from_slice(v),
            (Self::U8(buf), ScalarValues::U8(v)) => buf.extend_from_slice(v),
            (Self::I16(buf), ScalarValues::I16(v)) => buf.extend_from_slice(v),
            (Self::U16(buf), ScalarValues::U16(v)) => buf.extend_from_slice(v),
            (Self::I32(buf), ScalarValues::I32(v)) => buf.extend_from_slice(v),
            (Self::U32(buf), ScalarValues::U32(v)) => buf.extend_from_slice(v),
            (Self::I64(buf), ScalarValues::I64(v)) => buf.extend_from_slice(v),
            (Self::U64(buf), ScalarValues::U64(v)) => buf.extend_from_slice(v),
            (Self::F32(buf), ScalarValues::F32(v)) => buf.extend_from_slice(v),
            (Self::F64(buf), ScalarValues::F64(v)) => buf.extend_from_slice(v),
            (Self::Bool(buf), ScalarValues::Bool(v)) => buf.extend_from_slice(v),
            (Self::Bytes(buf), ScalarValues::String(v) | ScalarValues::Binary(v)) => {
                buf.extend_from_slice(v)
            }
            (buffer, values) => nimble_bail!(
                TypeMismatch: "column supplies {} values where {} is stored",
                values.kind(),
                buffer.kind_name()
            ),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::I8(_) => "i8",
            Self::U8(_) => "u8",
            Self::I16(_) => "i16",
            Self::U16(_) => "u16",
            Self::I32(_) => "i32",
            Self::U32(_) => "u32",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
        }
    }
}

fn layout_for(tree: Option<&EncodingLayoutTree>, id: u8) -> Option<EncodingLayout> {
    tree.and_then(|t| t.encoding_layout(id)).cloned()
}

/// The write-side mirror of one schema node.
pub(crate) enum FieldWriter {
    Scalar(ScalarFieldWriter),
    Array(ArrayFieldWriter),
    ArrayWithOffsets(ArrayWithOffsetsFieldWriter),
    Map(MapFieldWriter),
    Row(RowFieldWriter),
    FlatMap(FlatMapFieldWriter),
}

impl FieldWriter {
    /// Build the writer tree for `logical`, allocating stream offsets in
    /// schema order. `replay` aligns a trained layout tree with this node.
    pub(crate) fn new(
        logical: &LogicalType,
        alloc: &Arc<OffsetAllocator>,
        pool: &MemoryPool,
        replay: Option<&EncodingLayoutTree>,
    ) -> NimbleResult<Self> {
        Ok(match logical {
            LogicalType::Scalar(kind) => FieldWriter::Scalar(ScalarFieldWriter {
                kind: *kind,
                values: StreamBuffer::new(
                    alloc.allocate(),
                    *kind,
                    true,
                    layout_for(replay, stream_ids::MAIN),
                    pool,
                )?,
            }),
            LogicalType::Array(elements) => FieldWriter::Array(ArrayFieldWriter {
                lengths: StreamBuffer::new(
                    alloc.allocate(),
                    ScalarKind::UInt32,
                    true,
                    layout_for(replay, stream_ids::MAIN),
                    pool,
                )?,
                elements: Box::new(FieldWriter::new(
                    elements,
                    alloc,
                    pool,
                    replay.and_then(|t| t.child(0)),
                )?),
            }),
            LogicalType::ArrayWithOffsets(elements) => {
                FieldWriter::ArrayWithOffsets(ArrayWithOffsetsFieldWriter {
                    offsets: StreamBuffer::new(
                        alloc.allocate(),
                        ScalarKind::UInt32,
                        true,
                        layout_for(replay, stream_ids::MAIN),
                        pool,
                    )?,
                    lengths: StreamBuffer::new(
                        alloc.allocate(),
                        ScalarKind::UInt32,
                        false,
                        layout_for(replay, stream_ids::SECONDARY),
                        pool,
                    )?,
                    elements: Box::new(FieldWriter::new(
                        elements,
                        alloc,
                        pool,
                        replay.and_then(|t| t.child(0)),
                    )?),
                    next_offset: 0,
                    last: None,
                })
            }
            LogicalType::Map(keys, values) => FieldWriter::Map(MapFieldWriter {
                lengths: StreamBuffer::new(
                    alloc.allocate(),
                    ScalarKind::UInt32,
                    true,
                    layout_for(replay, stream_ids::MAIN),
                    pool,
                )?,
                keys: Box::new(FieldWriter::new(
                    keys,
                    alloc,
                    pool,
                    replay.and_then(|t| t.child(0)),
                )?),
                values: Box::new(FieldWriter::new(
                    values,
                    alloc,
                    pool,
                    replay.and_then(|t| t.child(1)),
                )?),
            }),
            LogicalType::Row { names, children } => {
                let nulls = StreamBuffer::new(
                    alloc.allocate(),
                    ScalarKind::Bool,
                    false,
                    layout_for(replay, stream_ids::MAIN),
                    pool,
                )?;
                let children = names
                    .iter()
                    .zip(children)
                    .enumerate()
                    .map(|(i, (_, child))| {
                        FieldWriter::new(child, alloc, pool, replay.and_then(|t| t.child(i)))
                    })
                    .collect::<NimbleResult<Vec<_>>>()?;
                FieldWriter::Row(RowFieldWriter {
                    nulls,
                    names: names.clone(),
                    children,
                })
            }
            LogicalType::FlatMap(value) => FieldWriter::FlatMap(FlatMapFieldWriter {
                nulls: StreamBuffer::new(
                    alloc.allocate(),
                    ScalarKind::Bool,
                    false,
                    layout_for(replay, stream_ids::MAIN),
                    pool,
                )?,
                value_type: (**value).clone(),
                children: Vec::new(),
                by_name: HashMap::new(),
                rows_seen: 0,
                alloc: alloc.clone(),
                pool: pool.clone(),
                replay: replay.cloned(),
            }),
        })
    }

    /// Scatter one column vector into this subtree's stream buffers.
    pub(crate) fn ingest(&mut self, column: &ColumnVector) -> NimbleResult<()> {
        match self {
            FieldWriter::Scalar(w) => w.ingest(column),
            FieldWriter::Array(w) => w.ingest(column),
            FieldWriter::ArrayWithOffsets(w) => w.ingest(column),
            FieldWriter::Map(w) => w.ingest(column),
            FieldWriter::Row(w) => w.ingest(column),
            FieldWriter::FlatMap(w) => w.ingest(column),
        }
    }

    /// Drain every non-empty stream buffer into `jobs`.
    pub(crate) fn close_chunks(&mut self, jobs: &mut Vec<PendingChunk>) -> NimbleResult<()> {
        match self {
            FieldWriter::Scalar(w) => w.values.take_chunk(jobs),
            FieldWriter::Array(w) => {
                w.lengths.take_chunk(jobs)?;
                w.elements.close_chunks(jobs)
            }
            FieldWriter::ArrayWithOffsets(w) => {
                w.offsets.take_chunk(jobs)?;
                w.lengths.take_chunk(jobs)?;
                w.elements.close_chunks(jobs)
            }
            FieldWriter::Map(w) => {
                w.lengths.take_chunk(jobs)?;
                w.keys.close_chunks(jobs)?;
                w.values.close_chunks(jobs)
            }
            FieldWriter::Row(w) => {
                w.nulls.take_chunk(jobs)?;
                for child in &mut w.children {
                    child.close_chunks(jobs)?;
                }
                Ok(())
            }
            FieldWriter::FlatMap(w) => {
                w.nulls.take_chunk(jobs)?;
                for child in &mut w.children {
                    child.in_map.take_chunk(jobs)?;
                    child.value.close_chunks(jobs)?;
                }
                Ok(())
            }
        }
    }

    /// Reset per-stripe state after a stripe flush.
    pub(crate) fn finish_stripe(&mut self) {
        match self {
            FieldWriter::Scalar(_) => {}
            FieldWriter::Array(w) => w.elements.finish_stripe(),
            FieldWriter::ArrayWithOffsets(w) => {
                w.next_offset = 0;
                w.last = None;
                w.elements.finish_stripe();
            }
            FieldWriter::Map(w) => {
                w.keys.finish_stripe();
                w.values.finish_stripe();
            }
            FieldWriter::Row(w) => {
                for child in &mut w.children {
                    child.finish_stripe();
                }
            }
            FieldWriter::FlatMap(w) => {
                w.rows_seen = 0;
                for child in &mut w.children {
                    child.value.finish_stripe();
                }
            }
        }
    }

    /// The schema node this writer materialised, with its stream offsets.
    pub(crate) fn schema_node(&self) -> SchemaNode {
        match self {
            FieldWriter::Scalar(w) => SchemaNode::Scalar {
                kind: w.kind,
                values: w.values.id,
            },
            FieldWriter::Array(w) => SchemaNode::Array {
                lengths: w.lengths.id,
                elements: Box::new(w.elements.schema_node()),
            },
            FieldWriter::ArrayWithOffsets(w) => SchemaNode::ArrayWithOffsets {
                offsets: w.offsets.id,
                lengths: w.lengths.id,
                elements: Box::new(w.elements.schema_node()),
            },
            FieldWriter::Map(w) => SchemaNode::Map {
                lengths: w.lengths.id,
                keys: Box::new(w.keys.schema_node()),
                values: Box::new(w.values.schema_node()),
            },
            FieldWriter::Row(w) => SchemaNode::Row {
                nulls: w.nulls.id,
                names: w.names.clone(),
                children: w.children.iter().map(FieldWriter::schema_node).collect(),
            },
            FieldWriter::FlatMap(w) => SchemaNode::FlatMap {
                nulls: w.nulls.id,
                children: w
                    .children
                    .iter()
                    .map(|child| FlatMapChild {
                        name: child.name.clone(),
                        in_map: child.in_map.id,
                        value: child.value.schema_node(),
                    })
                    .collect(),
            },
        }
    }
}

pub(crate) struct ScalarFieldWriter {
    kind: ScalarKind,
    values: StreamBuffer,
}

impl ScalarFieldWriter {
    fn ingest(&mut self, column: &ColumnVector) -> NimbleResult<()> {
        let ColumnData::Scalar(values) = &column.data else {
            nimble_bail!(SchemaMismatch: "scalar column expected, got {} data", column.data_kind());
        };
        if values.kind() != self.kind {
            nimble_bail!(
                TypeMismatch: "column supplies {} where schema stores {}",
                values.kind(),
                self.kind
            );
        }
        self.values.values.append_scalars(values)?;
        if let Some(presence) = &mut self.values.presence {
            presence.extend(column.presence());
        }
        Ok(())
    }
}

pub(crate) struct ArrayFieldWriter {
    lengths: StreamBuffer,
    elements: Box<FieldWriter>,
}

impl ArrayFieldWriter {
    fn ingest(&mut self, column: &ColumnVector) -> NimbleResult<()> {
        let ColumnData::Array { lengths, elements } = &column.data else {
            nimble_bail!(SchemaMismatch: "array column expected, got {} data", column.data_kind());
        };
        let ScalarBuffer::U32(buf) = &mut self.lengths.values else {
            nimble_bail!("array lengths buffer must be u32");
        };
        buf.extend_from_slice(lengths)?;
        if let Some(presence) = &mut self.lengths.presence {
            presence.extend(column.presence());
        }
        self.elements.ingest(elements)
    }
}

pub(crate) struct MapFieldWriter {
    lengths: StreamBuffer,
    keys: Box<FieldWriter>,
    values: Box<FieldWriter>,
}

impl MapFieldWriter {
    fn ingest(&mut self, column: &ColumnVector) -> NimbleResult<()> {
        let ColumnData::Map {
            lengths,
            keys,
            values,
        } = &column.data
        else {
            nimble_bail!(SchemaMismatch: "map column expected, got {} data", column.data_kind());
        };
        let ScalarBuffer::U32(buf) = &mut self.lengths.values else {
            nimble_bail!("map lengths buffer must be u32");
        };
        buf.extend_from_slice(lengths)?;
        if let Some(presence) = &mut self.lengths.presence {
            presence.extend(column.presence());
        }
        self.keys.ingest(keys)?;
        self.values.ingest(values)
    }
}

pub(crate) struct RowFieldWriter {
    nulls: StreamBuffer,
    names: Vec<String>,
    children: Vec<FieldWriter>,
}

impl RowFieldWriter {
    fn ingest(&mut self, column: &ColumnVector) -> NimbleResult<()> {
        let ColumnData::Row { children } = &column.data else {
            nimble_bail!(SchemaMismatch: "struct column expected, got {} data", column.data_kind());
        };
        if children.len() != self.children.len() {
            nimble_bail!(
                SchemaMismatch: "struct supplies {} children, schema has {}",
                children.len(),
                self.children.len()
            );
        }
        let ScalarBuffer::Bool(buf) = &mut self.nulls.values else {
            nimble_bail!("struct nulls buffer must be bool");
        };
        buf.extend_from_slice(&column.presence())?;
        for (writer, child) in self.children.iter_mut().zip(children) {
            writer.ingest(child)?;
        }
        Ok(())
    }
}

struct LastArray {
    values: ScalarValues,
}

pub(crate) struct ArrayWithOffsetsFieldWriter {
    offsets: StreamBuffer,
    /// Lengths of the deduplicated arrays; one entry per unique array.
    lengths: StreamBuffer,
    elements: Box<FieldWriter>,
    /// Count of unique arrays emitted in the open stripe.
    next_offset: u32,
    last: Option<LastArray>,
}

impl ArrayWithOffsetsFieldWriter {
    fn ingest(&mut self, column: &ColumnVector) -> NimbleResult<()> {
        let ColumnData::Array { lengths, elements } = &column.data else {
            nimble_bail!(
                SchemaMismatch: "array column expected for offsets-array, got {} data",
                column.data_kind()
            );
        };

        if let Some(presence) = &mut self.offsets.presence {
            presence.extend(column.presence());
        }

        // Consecutive identical arrays of scalar elements share one unique
        // entry; anything else becomes a new unique array.
        let scalar_elements = match &elements.data {
            ColumnData::Scalar(values) if elements.nulls.is_none() => Some(values),
            _ => None,
        };

        let mut start = 0usize;
        for length in lengths {
            let length = *length as usize;
            let this = scalar_elements.map(|values| values.slice(start, length));
            let repeated = match (&this, &self.last) {
                (Some(current), Some(last)) => *current == last.values,
                _ => false,
            };
            if repeated {
                self.push_offset(self.next_offset - 1)?;
            } else {
                self.push_offset(self.next_offset)?;
                let ScalarBuffer::U32(buf) = &mut self.lengths.values else {
                    nimble_bail!("offsets-array lengths buffer must be u32");
                };
                buf.push(length as u32)?;
                self.elements.ingest(&ColumnVector {
                    row_count: length,
                    nulls: None,
                    data: slice_column_data(elements, start, length)?,
                })?;
                self.next_offset += 1;
                self.last = this.map(|values| LastArray { values });
            }
            start += length;
        }
        Ok(())
    }

    fn push_offset(&mut self, offset: u32) -> NimbleResult<()> {
        let ScalarBuffer::U32(buf) = &mut self.offsets.values else {
            nimble_bail!("offsets buffer must be u32");
        };
        buf.push(offset)
    }
}

/// Slice `column` rows `[start, start + length)`. Only scalar element data
/// supports slicing; nested element types must arrive one unique array at a
/// time (no deduplication applies to them).
fn slice_column_data(
    column: &ColumnVector,
    start: usize,
    length: usize,
) -> NimbleResult<ColumnData> {
    match &column.data {
        ColumnData::Scalar(values) if column.nulls.is_none() => {
            Ok(ColumnData::Scalar(values.slice(start, length)))
        }
        _ => nimble_bail!(
            UnsupportedDataType: "offsets-array columns require non-null scalar elements"
        ),
    }
}

struct FlatMapChildWriter {
    name: String,
    in_map: StreamBuffer,
    value: FieldWriter,
}

pub(crate) struct FlatMapFieldWriter {
    nulls: StreamBuffer,
    value_type: LogicalType,
    children: Vec<FlatMapChildWriter>,
    by_name: HashMap<String, usize>,
    /// Rows ingested in the open stripe; new keys backfill this many
    /// `false` in-map bits.
    rows_seen: usize,
    alloc: Arc<OffsetAllocator>,
    pool: MemoryPool,
    replay: Option<EncodingLayoutTree>,
}

impl FlatMapFieldWriter {
    fn ingest(&mut self, column: &ColumnVector) -> NimbleResult<()> {
        let ColumnData::FlatMap { entries } = &column.data else {
            nimble_bail!(
                SchemaMismatch: "flat-map column expected, got {} data",
                column.data_kind()
            );
        };
        let ScalarBuffer::Bool(buf) = &mut self.nulls.values else {
            nimble_bail!("flat-map nulls buffer must be bool");
        };
        buf.extend_from_slice(&column.presence())?;

        let mut touched = vec![false; self.children.len()];
        for entry in entries {
            if entry.in_map.len() != column.row_count {
                nimble_bail!(
                    "flat-map entry '{}' carries {} in-map bits for {} rows",
                    entry.name,
                    entry.in_map.len(),
                    column.row_count
                );
            }
            let index = self.child_index(&entry.name)?;
            if index < touched.len() {
                touched[index] = true;
            }
            let child = &mut self.children[index];
            let ScalarBuffer::Bool(in_map) = &mut child.in_map.values else {
                nimble_bail!("in-map buffer must be bool");
            };
            in_map.extend_from_slice(&entry.in_map)?;
            child.value.ingest(&entry.values)?;
        }

        // Keys that did not appear in this batch still advance their in-map
        // streams.
        for (child, touched) in self.children.iter_mut().zip(&touched) {
            if !touched {
                let ScalarBuffer::Bool(in_map) = &mut child.in_map.values else {
                    nimble_bail!("in-map buffer must be bool");
                };
                for _ in 0..column.row_count {
                    in_map.push(false)?;
                }
            }
        }
        self.rows_seen += column.row_count;
        Ok(())
    }

    fn child_index(&mut self, name: &str) -> NimbleResult<usize> {
        if let Some(index) = self.by_name.get(name) {
            return Ok(*index);
        }
        let replay_child = self
            .replay
            .as_ref()
            .and_then(|tree| tree.child_named(name));
        let in_map = StreamBuffer::new(
            self.alloc.allocate(),
            ScalarKind::Bool,
            false,
            replay_child.and_then(|t| t.encoding_layout(stream_ids::IN_MAP)).cloned(),
            &self.pool,
        )?;
        let value = FieldWriter::new(&self.value_type, &self.alloc, &self.pool, replay_child)?;
        let mut child = FlatMapChildWriter {
            name: name.to_string(),
            in_map,
            value,
        };
        // Backfill rows this key was absent from.
        let ScalarBuffer::Bool(bits) = &mut child.in_map.values else {
            nimble_bail!("in-map buffer must be bool");
        };
        for _ in 0..self.rows_seen {
            bits.push(false)?;
        }
        self.children.push(child);
        let index = self.children.len() - 1;
        self.by_name.insert(name.to_string(), index);
        Ok(index)
    }
}

impl ColumnVector {
    fn data_kind(&self) -> &'static str {
        match &self.data {
            ColumnData::Scalar(_) => "scalar",
            ColumnData::Array { .. } => "array",
            ColumnData::Map { .. } => "map",
            ColumnData::Row { .. } => "struct",
            ColumnData::FlatMap { .. } => "flat-map",
        }
    }
}

impl ScalarValues {
    /// Copy rows `[start, start + length)`.
    pub(crate) fn slice(&self, start: usize, length: usize) -> ScalarValues {
        let end = start + length;
        match self {
            Self::I8(v) => Self::I8(v[start..end].to_vec()),
            Self::U8(v) => Self::U8(v[start..end].to_vec()),
            Self::I16(v) => Self::I16(v[start..end].to_vec()),
            Self::U16(v) => Self::U16(v[start..end].to_vec()),
            Self::I32(v) => Self::I32(v[start..end].to_vec()),
            Self::U32(v) => Self::U32(v[start..end].to_vec()),
            Self::I64(v) => Self::I64(v[start..end].to_vec()),
            Self::U64(v) => Self::U64(v[start..end].to_vec()),
            Self::F32(v) => Self::F32(v[start..end].to_vec()),
            Self::F64(v) => Self::F64(v[start..end].to_vec()),
            Self::Bool(v) => Self::Bool(v[start..end].to_vec()),
            Self::String(v) => Self::String(v[start..end].to_vec()),
            Self::Binary(v) => Self::Binary(v[start..end].to_vec()),
        }
    }
}
