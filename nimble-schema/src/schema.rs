use crate::{ScalarKind, SchemaKind, StreamOffset};

/// A materialised flat-map key: its name, in-map stream, and value subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatMapChild {
    pub name: String,
    pub in_map: StreamOffset,
    pub value: SchemaNode,
}

/// The decoded schema tree. Every node names the stream descriptors it owns;
/// descriptor offsets are unique across the whole tree and stable for the
/// lifetime of the file.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Scalar {
        kind: ScalarKind,
        values: StreamOffset,
    },
    Array {
        lengths: StreamOffset,
        elements: Box<SchemaNode>,
    },
    ArrayWithOffsets {
        offsets: StreamOffset,
        lengths: StreamOffset,
        elements: Box<SchemaNode>,
    },
    Map {
        lengths: StreamOffset,
        keys: Box<SchemaNode>,
        values: Box<SchemaNode>,
    },
    SlidingWindowMap {
        offsets: StreamOffset,
        lengths: StreamOffset,
        keys: Box<SchemaNode>,
        values: Box<SchemaNode>,
    },
    Row {
        nulls: StreamOffset,
        names: Vec<String>,
        children: Vec<SchemaNode>,
    },
    FlatMap {
        nulls: StreamOffset,
        children: Vec<FlatMapChild>,
    },
}

impl SchemaNode {
    pub fn kind(&self) -> SchemaKind {
        match self {
            Self::Scalar { .. } => SchemaKind::Scalar,
            Self::Array { .. } => SchemaKind::Array,
            Self::ArrayWithOffsets { .. } => SchemaKind::ArrayWithOffsets,
            Self::Map { .. } => SchemaKind::Map,
            Self::SlidingWindowMap { .. } => SchemaKind::SlidingWindowMap,
            Self::Row { .. } => SchemaKind::Row,
            Self::FlatMap { .. } => SchemaKind::FlatMap,
        }
    }

    /// Append every stream descriptor of this subtree in schema preorder:
    /// a node's own streams first, then each child subtree in order.
    pub fn append_stream_offsets(&self, out: &mut Vec<StreamOffset>) {
        match self {
            Self::Scalar { values, .. } => out.push(*values),
            Self::Array { lengths, elements } => {
                out.push(*lengths);
                elements.append_stream_offsets(out);
            }
            Self::ArrayWithOffsets {
                offsets,
                lengths,
                elements,
            } => {
                out.push(*offsets);
                out.push(*lengths);
                elements.append_stream_offsets(out);
            }
            Self::Map {
                lengths,
                keys,
                values,
            } => {
                out.push(*lengths);
                keys.append_stream_offsets(out);
                values.append_stream_offsets(out);
            }
            Self::SlidingWindowMap {
                offsets,
                lengths,
                keys,
                values,
            } => {
                out.push(*offsets);
                out.push(*lengths);
                keys.append_stream_offsets(out);
                values.append_stream_offsets(out);
            }
            Self::Row {
                nulls, children, ..
            } => {
                out.push(*nulls);
                for child in children {
                    child.append_stream_offsets(out);
                }
            }
            Self::FlatMap { nulls, children } => {
                out.push(*nulls);
                for child in children {
                    out.push(child.in_map);
                    child.value.append_stream_offsets(out);
                }
            }
        }
    }

    /// All stream descriptors of this subtree, in schema preorder.
    pub fn stream_offsets(&self) -> Vec<StreamOffset> {
        let mut out = Vec::new();
        self.append_stream_offsets(&mut out);
        out
    }

    /// One past the highest descriptor offset in this subtree.
    pub fn stream_count(&self) -> u32 {
        self.stream_offsets()
            .iter()
            .map(|offset| offset + 1)
            .max()
            .unwrap_or(0)
    }
}
