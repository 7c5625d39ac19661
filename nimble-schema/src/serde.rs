//! Footer serialisation of the schema tree: a recursive preorder walk with
//! little-endian descriptor offsets and `u16`-length-prefixed names.

use nimble_common::ByteCursor;
use nimble_error::{NimbleResult, nimble_bail};

use crate::{FlatMapChild, ScalarKind, SchemaKind, SchemaNode};

/// Serialise `schema`, appending to `out`.
pub fn write_schema(schema: &SchemaNode, out: &mut Vec<u8>) -> NimbleResult<()> {
    out.push(schema.kind() as u8);
    match schema {
        SchemaNode::Scalar { kind, values } => {
            out.push(*kind as u8);
            out.extend_from_slice(&values.to_le_bytes());
        }
        SchemaNode::Array { lengths, elements } => {
            out.extend_from_slice(&lengths.to_le_bytes());
            write_schema(elements, out)?;
        }
        SchemaNode::ArrayWithOffsets {
            offsets,
            lengths,
            elements,
        } => {
            out.extend_from_slice(&offsets.to_le_bytes());
            out.extend_from_slice(&lengths.to_le_bytes());
            write_schema(elements, out)?;
        }
        SchemaNode::Map {
            lengths,
            keys,
            values,
        } => {
            out.extend_from_slice(&lengths.to_le_bytes());
            write_schema(keys, out)?;
            write_schema(values, out)?;
        }
        SchemaNode::SlidingWindowMap {
            offsets,
            lengths,
            keys,
            values,
        } => {
            out.extend_from_slice(&offsets.to_le_bytes());
            out.extend_from_slice(&lengths.to_le_bytes());
            write_schema(keys, out)?;
            write_schema(values, out)?;
        }
        SchemaNode::Row {
            nulls,
            names,
            children,
        } => {
            out.extend_from_slice(&nulls.to_le_bytes());
            out.extend_from_slice(&(children.len() as u32).to_le_bytes());
            for (name, child) in names.iter().zip(children) {
                write_name(name, out)?;
                write_schema(child, out)?;
            }
        }
        SchemaNode::FlatMap { nulls, children } => {
            out.extend_from_slice(&nulls.to_le_bytes());
            out.extend_from_slice(&(children.len() as u32).to_le_bytes());
            for child in children {
                write_name(&child.name, out)?;
                out.extend_from_slice(&child.in_map.to_le_bytes());
                write_schema(&child.value, out)?;
            }
        }
    }
    Ok(())
}

fn write_name(name: &str, out: &mut Vec<u8>) -> NimbleResult<()> {
    if name.len() > u16::MAX as usize {
        nimble_bail!("schema name exceeds u16 length: {}", name.len());
    }
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

fn read_name(cursor: &mut ByteCursor) -> NimbleResult<String> {
    let len = cursor.read_u16()? as usize;
    let bytes = cursor.read_bytes(len)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| nimble_error::nimble_err!(MalformedFile: "schema name is not utf-8"))
}

/// Parse one schema tree from `cursor`.
pub fn read_schema(cursor: &mut ByteCursor) -> NimbleResult<SchemaNode> {
    let kind = SchemaKind::from_u8(cursor.read_u8()?)?;
    Ok(match kind {
        SchemaKind::Scalar => SchemaNode::Scalar {
            kind: ScalarKind::from_u8(cursor.read_u8()?)?,
            values: cursor.read_u32()?,
        },
        SchemaKind::Array => SchemaNode::Array {
            lengths: cursor.read_u32()?,
            elements: Box::new(read_schema(cursor)?),
        },
        SchemaKind::ArrayWithOffsets => SchemaNode::ArrayWithOffsets {
            offsets: cursor.read_u32()?,
            lengths: cursor.read_u32()?,
            elements: Box::new(read_schema(cursor)?),
        },
        SchemaKind::Map => SchemaNode::Map {
            lengths: cursor.read_u32()?,
            keys: Box::new(read_schema(cursor)?),
            values: Box::new(read_schema(cursor)?),
        },
        SchemaKind::SlidingWindowMap => SchemaNode::SlidingWindowMap {
            offsets: cursor.read_u32()?,
            lengths: cursor.read_u32()?,
            keys: Box::new(read_schema(cursor)?),
            values: Box::new(read_schema(cursor)?),
        },
        SchemaKind::Row => {
            let nulls = cursor.read_u32()?;
            let child_count = cursor.read_u32()? as usize;
            let mut names = Vec::with_capacity(child_count);
            let mut children = Vec::with_capacity(child_count);
            for _ in 0..child_count {
                names.push(read_name(cursor)?);
                children.push(read_schema(cursor)?);
            }
            SchemaNode::Row {
                nulls,
                names,
                children,
            }
        }
        SchemaKind::FlatMap => {
            let nulls = cursor.read_u32()?;
            let child_count = cursor.read_u32()? as usize;
            let mut children = Vec::with_capacity(child_count);
            for _ in 0..child_count {
                let name = read_name(cursor)?;
                let in_map = cursor.read_u32()?;
                let value = read_schema(cursor)?;
                children.push(FlatMapChild {
                    name,
                    in_map,
                    value,
                });
            }
            SchemaNode::FlatMap { nulls, children }
        }
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn round_trip_nested() {
        let schema = SchemaNode::Row {
            nulls: 0,
            names: vec!["id".into(), "tags".into(), "features".into(), "pairs".into()],
            children: vec![
                SchemaNode::Scalar {
                    kind: ScalarKind::Int64,
                    values: 1,
                },
                SchemaNode::ArrayWithOffsets {
                    offsets: 2,
                    lengths: 3,
                    elements: Box::new(SchemaNode::Scalar {
                        kind: ScalarKind::String,
                        values: 4,
                    }),
                },
                SchemaNode::FlatMap {
                    nulls: 5,
                    children: vec![FlatMapChild {
                        name: "x".into(),
                        in_map: 6,
                        value: SchemaNode::Scalar {
                            kind: ScalarKind::Float64,
                            values: 7,
                        },
                    }],
                },
                SchemaNode::Map {
                    lengths: 8,
                    keys: Box::new(SchemaNode::Scalar {
                        kind: ScalarKind::String,
                        values: 9,
                    }),
                    values: Box::new(SchemaNode::Scalar {
                        kind: ScalarKind::Int32,
                        values: 10,
                    }),
                },
            ],
        };
        let mut bytes = Vec::new();
        write_schema(&schema, &mut bytes).unwrap();
        let mut cursor = ByteCursor::new(Bytes::from(bytes));
        assert_eq!(read_schema(&mut cursor).unwrap(), schema);
        assert!(cursor.is_empty());
    }

    #[test]
    fn truncated_schema_rejected() {
        let schema = SchemaNode::Scalar {
            kind: ScalarKind::Int8,
            values: 0,
        };
        let mut bytes = Vec::new();
        write_schema(&schema, &mut bytes).unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(read_schema(&mut ByteCursor::new(Bytes::from(bytes))).is_err());
    }
}
