//! Encoding-layout training: replay an existing file through the selector
//! and capture the choices as a schema-aligned tree.

use std::collections::BTreeMap;
use std::sync::Arc;

use nimble_encodings::{
    EncodingLayout, EncodingValue, Selector, encode_nullable_values, match_each_data_type,
};
use nimble_error::NimbleResult;
use nimble_schema::{EncodingLayoutTree, ScalarKind, SchemaNode, StreamOffset, stream_ids};
use nimble_tablet::{ChunkedDecoder, ReadFile, Tablet};

/// Train on `file`: for every stream, concatenate the decoded values of all
/// its chunks across all stripes, run the selector once, and record the
/// resulting layout.
pub fn train_file(file: Arc<dyn ReadFile>) -> NimbleResult<EncodingLayoutTree> {
    let tablet = Tablet::open(file)?;
    let schema = tablet.schema().clone();
    train_node(&tablet, &schema, String::new())
}

fn train_node(
    tablet: &Tablet,
    node: &SchemaNode,
    name: String,
) -> NimbleResult<EncodingLayoutTree> {
    let mut layouts = BTreeMap::new();
    let mut children = Vec::new();
    match node {
        SchemaNode::Scalar { kind, values } => {
            if let Some(layout) = train_scalar_stream(tablet, *values, *kind)? {
                layouts.insert(stream_ids::MAIN, layout);
            }
        }
        SchemaNode::Array { lengths, elements } => {
            if let Some(layout) = train_stream::<u32>(tablet, *lengths)? {
                layouts.insert(stream_ids::MAIN, layout);
            }
            children.push(train_node(tablet, elements, String::new())?);
        }
        SchemaNode::ArrayWithOffsets {
            offsets,
            lengths,
            elements,
        } => {
            if let Some(layout) = train_stream::<u32>(tablet, *offsets)? {
                layouts.insert(stream_ids::MAIN, layout);
            }
            if let Some(layout) = train_stream::<u32>(tablet, *lengths)? {
                layouts.insert(stream_ids::SECONDARY, layout);
            }
            children.push(train_node(tablet, elements, String::new())?);
        }
        SchemaNode::Map {
            lengths,
            keys,
            values,
        }
        | SchemaNode::SlidingWindowMap {
            lengths,
            keys,
            values,
            ..
        } => {
            if let Some(layout) = train_stream::<u32>(tablet, *lengths)? {
                layouts.insert(stream_ids::MAIN, layout);
            }
            children.push(train_node(tablet, keys, String::new())?);
            children.push(train_node(tablet, values, String::new())?);
        }
        SchemaNode::Row {
            nulls,
            names,
            children: child_nodes,
        } => {
            if let Some(layout) = train_stream::<bool>(tablet, *nulls)? {
                layouts.insert(stream_ids::MAIN, layout);
            }
            for (child_name, child) in names.iter().zip(child_nodes) {
                children.push(train_node(tablet, child, child_name.clone())?);
            }
        }
        SchemaNode::FlatMap {
            nulls,
            children: map_children,
        } => {
            if let Some(layout) = train_stream::<bool>(tablet, *nulls)? {
                layouts.insert(stream_ids::MAIN, layout);
            }
            for child in map_children {
                let mut tree = train_node(tablet, &child.value, child.name.clone())?;
                if let Some(layout) = train_stream::<bool>(tablet, child.in_map)? {
                    tree.insert_layout(stream_ids::IN_MAP, layout);
                }
                children.push(tree);
            }
        }
    }
    EncodingLayoutTree::new(node.kind(), name, layouts, children)
}

fn train_scalar_stream(
    tablet: &Tablet,
    id: StreamOffset,
    kind: ScalarKind,
) -> NimbleResult<Option<EncodingLayout>> {
    if kind == ScalarKind::Undefined {
        return Ok(None);
    }
    match_each_data_type!(kind.data_type(), |$T| train_stream::<$T>(tablet, id))
}

/// Decode every chunk of `id` across all stripes, then run the learned
/// selector once over the whole sequence.
fn train_stream<T: EncodingValue>(
    tablet: &Tablet,
    id: StreamOffset,
) -> NimbleResult<Option<EncodingLayout>> {
    let mut values: Vec<T> = Vec::new();
    let mut presence: Vec<bool> = Vec::new();
    for stripe in 0..tablet.stripe_count() {
        let mut handles = tablet.load(stripe, &[id])?;
        let Some(handle) = handles.pop().flatten() else {
            continue;
        };
        let mut decoder = ChunkedDecoder::<T>::new(handle.bytes()?);
        decoder.materialize_all(&mut values, &mut presence)?;
    }
    if presence.is_empty() {
        return Ok(None);
    }
    let present: Vec<T> = values
        .into_iter()
        .zip(&presence)
        .filter(|(_, p)| **p)
        .map(|(v, _)| v)
        .collect();
    let encoded = encode_nullable_values(&Selector::learned(), &present, &presence)?;
    Ok(Some(encoded.layout))
}
