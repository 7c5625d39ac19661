use nimble_common::{ByteCursor, CompressionKind};
use nimble_error::{NimbleResult, nimble_bail};

use crate::EncodingKind;

/// A captured encoding choice: the kind, the chunk compression applied over
/// it, and the choices made for its nested streams, in the positional order
/// each encoding defines (e.g. RLE: run lengths, then run values).
///
/// Layout trees recorded from a training run are fed back into
/// [`Selector::replay`](crate::Selector::replay) to pin the choices of a
/// future writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingLayout {
    pub kind: EncodingKind,
    pub compression: CompressionKind,
    pub children: Vec<Option<EncodingLayout>>,
}

impl EncodingLayout {
    pub fn new(kind: EncodingKind) -> Self {
        Self {
            kind,
            compression: CompressionKind::Uncompressed,
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: EncodingKind, children: Vec<Option<EncodingLayout>>) -> Self {
        Self {
            kind,
            compression: CompressionKind::Uncompressed,
            children,
        }
    }

    pub fn with_compression(mut self, compression: CompressionKind) -> Self {
        self.compression = compression;
        self
    }

    pub fn child(&self, index: usize) -> Option<&EncodingLayout> {
        self.children.get(index).and_then(|c| c.as_ref())
    }

    /// Serialise recursively: `kind (1B)`, `compression (1B)`,
    /// `child count (1B)`, then per child an exists byte followed by the
    /// child's serialisation.
    pub fn serialize(&self, out: &mut Vec<u8>) -> NimbleResult<usize> {
        if self.children.len() > u8::MAX as usize {
            nimble_bail!("encoding layout has too many children: {}", self.children.len());
        }
        let start = out.len();
        out.push(self.kind as u8);
        out.push(self.compression as u8);
        out.push(self.children.len() as u8);
        for child in &self.children {
            match child {
                Some(child) => {
                    out.push(1);
                    child.serialize(out)?;
                }
                None => out.push(0),
            }
        }
        Ok(out.len() - start)
    }

    /// Parse one layout, returning it and the bytes consumed.
    pub fn deserialize(cursor: &mut ByteCursor) -> NimbleResult<Self> {
        let kind = EncodingKind::from_u8(cursor.read_u8()?)?;
        let compression = CompressionKind::from_u8(cursor.read_u8()?)?;
        let child_count = cursor.read_u8()? as usize;
        let mut children = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            let exists = cursor.read_u8()? != 0;
            children.push(if exists {
                Some(Self::deserialize(cursor)?)
            } else {
                None
            });
        }
        Ok(Self {
            kind,
            compression,
            children,
        })
    }
}
