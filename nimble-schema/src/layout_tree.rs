use std::collections::BTreeMap;

use nimble_common::ByteCursor;
use nimble_encodings::EncodingLayout;
use nimble_error::{NimbleResult, nimble_bail};

use crate::SchemaKind;

/// The smallest serialised node: kind, empty name, zero layouts, zero children.
const MIN_NODE_SIZE: usize = 8;

/// A schema-aligned tree of captured encoding choices.
///
/// Every node mirrors a schema node and maps its node-local stream
/// identifiers (see [`stream_ids`](crate::stream_ids)) to the
/// [`EncodingLayout`] a training pass settled on. Writers consult the tree to
/// seed encoding selection for matching streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingLayoutTree {
    kind: SchemaKind,
    name: String,
    encoding_layouts: BTreeMap<u8, EncodingLayout>,
    children: Vec<EncodingLayoutTree>,
}

impl EncodingLayoutTree {
    pub fn new(
        kind: SchemaKind,
        name: String,
        encoding_layouts: BTreeMap<u8, EncodingLayout>,
        children: Vec<EncodingLayoutTree>,
    ) -> NimbleResult<Self> {
        if encoding_layouts.len() >= u8::MAX as usize {
            nimble_bail!("too many encoding layout streams: {}", encoding_layouts.len());
        }
        Ok(Self {
            kind,
            name,
            encoding_layouts,
            children,
        })
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The captured layout for a node-local stream identifier, if any.
    pub fn encoding_layout(&self, identifier: u8) -> Option<&EncodingLayout> {
        self.encoding_layouts.get(&identifier)
    }

    /// Record a layout for a node-local stream identifier.
    pub fn insert_layout(&mut self, identifier: u8, layout: EncodingLayout) {
        self.encoding_layouts.insert(identifier, layout);
    }

    pub fn children(&self) -> &[EncodingLayoutTree] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<&EncodingLayoutTree> {
        self.children.get(index)
    }

    /// Find a child by name; flat-map feature trees are keyed this way.
    pub fn child_named(&self, name: &str) -> Option<&EncodingLayoutTree> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Serialise recursively, appending to `out`. Layout per node:
    /// `kind (1B)`, `name length (2B LE)`, `name`, `layout count (1B)`, then
    /// per layout `identifier (1B)`, `layout length (2B LE)`, `layout bytes`,
    /// then `child count (4B LE)` and the children.
    pub fn serialize(&self, out: &mut Vec<u8>) -> NimbleResult<usize> {
        let start = out.len();
        if self.name.len() > u16::MAX as usize {
            nimble_bail!("encoding layout tree name exceeds u16 length");
        }
        out.push(self.kind as u8);
        out.extend_from_slice(&(self.name.len() as u16).to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());

        out.push(self.encoding_layouts.len() as u8);
        for (identifier, layout) in &self.encoding_layouts {
            out.push(*identifier);
            let length_at = out.len();
            out.extend_from_slice(&0u16.to_le_bytes());
            let layout_size = layout.serialize(out)?;
            if layout_size > u16::MAX as usize {
                nimble_bail!("encoding layout exceeds u16 length: {}", layout_size);
            }
            out[length_at..length_at + 2].copy_from_slice(&(layout_size as u16).to_le_bytes());
        }

        out.extend_from_slice(&(self.children.len() as u32).to_le_bytes());
        for child in &self.children {
            child.serialize(out)?;
        }
        Ok(out.len() - start)
    }

    /// Parse one tree from `cursor`.
    pub fn deserialize(cursor: &mut ByteCursor) -> NimbleResult<Self> {
        if cursor.remaining() < MIN_NODE_SIZE {
            nimble_bail!(MalformedFile: "captured encoding tree buffer too small");
        }
        let kind = SchemaKind::from_u8(cursor.read_u8()?)?;
        let name_length = cursor.read_u16()? as usize;
        if cursor.remaining() < name_length + MIN_NODE_SIZE - 3 {
            nimble_bail!(MalformedFile: "captured encoding tree buffer too small");
        }
        let name = String::from_utf8(cursor.read_bytes(name_length)?.to_vec())
            .map_err(|_| nimble_error::nimble_err!(MalformedFile: "tree name is not utf-8"))?;

        let layout_count = cursor.read_u8()? as usize;
        let mut encoding_layouts = BTreeMap::new();
        for _ in 0..layout_count {
            let identifier = cursor.read_u8()?;
            let layout_length = cursor.read_u16()? as usize;
            let before = cursor.position();
            let layout = EncodingLayout::deserialize(cursor)?;
            if cursor.position() - before != layout_length {
                nimble_bail!(
                    MalformedFile: "captured encoding layout size mismatch: declared {}, read {}",
                    layout_length,
                    cursor.position() - before
                );
            }
            encoding_layouts.insert(identifier, layout);
        }

        let child_count = cursor.read_u32()? as usize;
        let mut children = Vec::with_capacity(child_count.min(1024));
        for _ in 0..child_count {
            children.push(Self::deserialize(cursor)?);
        }
        Ok(Self {
            kind,
            name,
            encoding_layouts,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use nimble_encodings::EncodingKind;

    use super::*;
    use crate::stream_ids;

    fn sample_tree() -> EncodingLayoutTree {
        let scalar = EncodingLayoutTree::new(
            SchemaKind::Scalar,
            "value".into(),
            BTreeMap::from([(
                stream_ids::MAIN,
                EncodingLayout::with_children(
                    EncodingKind::Rle,
                    vec![Some(EncodingLayout::new(EncodingKind::FixedBitWidth)), None],
                ),
            )]),
            Vec::new(),
        )
        .unwrap();
        EncodingLayoutTree::new(
            SchemaKind::Row,
            String::new(),
            BTreeMap::from([(stream_ids::MAIN, EncodingLayout::new(EncodingKind::Trivial))]),
            vec![scalar],
        )
        .unwrap()
    }

    #[test]
    fn round_trip() {
        let tree = sample_tree();
        let mut bytes = Vec::new();
        let written = tree.serialize(&mut bytes).unwrap();
        assert_eq!(written, bytes.len());

        let mut cursor = ByteCursor::new(Bytes::from(bytes.clone()));
        let parsed = EncodingLayoutTree::deserialize(&mut cursor).unwrap();
        assert_eq!(parsed, tree);
        assert!(cursor.is_empty());

        // Serialisation is byte-stable.
        let mut again = Vec::new();
        parsed.serialize(&mut again).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn lookup() {
        let tree = sample_tree();
        assert!(tree.encoding_layout(stream_ids::MAIN).is_some());
        assert!(tree.encoding_layout(stream_ids::IN_MAP).is_none());
        assert_eq!(tree.child(0).unwrap().name(), "value");
        assert!(tree.child_named("value").is_some());
        assert!(tree.child_named("missing").is_none());
    }

    #[test]
    fn small_buffer_rejected() {
        let mut cursor = ByteCursor::new(Bytes::from_static(&[0u8; 4]));
        assert!(EncodingLayoutTree::deserialize(&mut cursor).is_err());
    }
}
