use nimble_common::ByteCursor;
use nimble_error::{NimbleResult, nimble_bail};

/// Size of the prefix every encoded payload starts with:
/// `kind (1) + data type (1) + row count (4, LE)`.
pub const PREFIX_SIZE: usize = 6;

/// The closed set of value codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EncodingKind {
    Trivial = 0,
    Rle = 1,
    Dictionary = 2,
    FixedBitWidth = 3,
    Nullable = 4,
    SparseBool = 5,
    MainlyConstant = 6,
    Constant = 7,
}

impl EncodingKind {
    pub fn from_u8(value: u8) -> NimbleResult<Self> {
        Ok(match value {
            0 => Self::Trivial,
            1 => Self::Rle,
            2 => Self::Dictionary,
            3 => Self::FixedBitWidth,
            4 => Self::Nullable,
            5 => Self::SparseBool,
            6 => Self::MainlyConstant,
            7 => Self::Constant,
            other => nimble_bail!(MalformedEncoding: "unknown encoding kind {}", other),
        })
    }
}

impl std::fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Trivial => "Trivial",
            Self::Rle => "RLE",
            Self::Dictionary => "Dictionary",
            Self::FixedBitWidth => "FixedBitWidth",
            Self::Nullable => "Nullable",
            Self::SparseBool => "SparseBool",
            Self::MainlyConstant => "MainlyConstant",
            Self::Constant => "Constant",
        };
        write!(f, "{name}")
    }
}

/// Physical data type tag carried by every encoding prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    I8 = 0,
    U8 = 1,
    I16 = 2,
    U16 = 3,
    I32 = 4,
    U32 = 5,
    I64 = 6,
    U64 = 7,
    F32 = 8,
    F64 = 9,
    Bool = 10,
    String = 11,
    Binary = 12,
    Undefined = 13,
}

impl DataType {
    pub fn from_u8(value: u8) -> NimbleResult<Self> {
        Ok(match value {
            0 => Self::I8,
            1 => Self::U8,
            2 => Self::I16,
            3 => Self::U16,
            4 => Self::I32,
            5 => Self::U32,
            6 => Self::I64,
            7 => Self::U64,
            8 => Self::F32,
            9 => Self::F64,
            10 => Self::Bool,
            11 => Self::String,
            12 => Self::Binary,
            13 => Self::Undefined,
            other => nimble_bail!(MalformedEncoding: "unknown data type {}", other),
        })
    }

    /// Width in bytes for fixed-width types; `None` for var-width and bool.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            Self::I8 | Self::U8 => Some(1),
            Self::I16 | Self::U16 => Some(2),
            Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 => Some(8),
            Self::Bool | Self::String | Self::Binary | Self::Undefined => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Binary => "binary",
            Self::Undefined => "undefined",
        };
        write!(f, "{name}")
    }
}

/// The decoded prefix of an encoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingPrefix {
    pub kind: EncodingKind,
    pub data_type: DataType,
    pub row_count: u32,
}

impl EncodingPrefix {
    pub fn read(cursor: &mut ByteCursor) -> NimbleResult<Self> {
        let kind = EncodingKind::from_u8(cursor.read_u8()?)?;
        let data_type = DataType::from_u8(cursor.read_u8()?)?;
        let row_count = cursor.read_u32()?;
        Ok(Self {
            kind,
            data_type,
            row_count,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(self.kind as u8);
        out.push(self.data_type as u8);
        out.extend_from_slice(&self.row_count.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn prefix_round_trip() {
        let prefix = EncodingPrefix {
            kind: EncodingKind::Rle,
            data_type: DataType::U32,
            row_count: 1234,
        };
        let mut out = Vec::new();
        prefix.write(&mut out);
        assert_eq!(out.len(), PREFIX_SIZE);
        let mut cursor = ByteCursor::new(Bytes::from(out));
        assert_eq!(EncodingPrefix::read(&mut cursor).unwrap(), prefix);
    }

    #[test]
    fn unknown_tags_rejected() {
        assert!(EncodingKind::from_u8(200).is_err());
        assert!(DataType::from_u8(200).is_err());
    }
}
