use nimble_encodings::DataType;
use nimble_error::{NimbleResult, nimble_bail};

/// The dense integer identifier of a physical stream within a file.
pub type StreamOffset = u32;

/// Logical scalar kinds. The physical storage type is width-based; the
/// logical kind additionally drives read-time up-casts and formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ScalarKind {
    Int8 = 0,
    UInt8 = 1,
    Int16 = 2,
    UInt16 = 3,
    Int32 = 4,
    UInt32 = 5,
    Int64 = 6,
    UInt64 = 7,
    Float32 = 8,
    Float64 = 9,
    Bool = 10,
    String = 11,
    Binary = 12,
    Undefined = 13,
}

impl ScalarKind {
    pub fn from_u8(value: u8) -> NimbleResult<Self> {
        Ok(match value {
            0 => Self::Int8,
            1 => Self::UInt8,
            2 => Self::Int16,
            3 => Self::UInt16,
            4 => Self::Int32,
            5 => Self::UInt32,
            6 => Self::Int64,
            7 => Self::UInt64,
            8 => Self::Float32,
            9 => Self::Float64,
            10 => Self::Bool,
            11 => Self::String,
            12 => Self::Binary,
            13 => Self::Undefined,
            other => nimble_bail!(MalformedFile: "unknown scalar kind {}", other),
        })
    }

    /// The physical data type streams of this kind are encoded with.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int8 => DataType::I8,
            Self::UInt8 => DataType::U8,
            Self::Int16 => DataType::I16,
            Self::UInt16 => DataType::U16,
            Self::Int32 => DataType::I32,
            Self::UInt32 => DataType::U32,
            Self::Int64 => DataType::I64,
            Self::UInt64 => DataType::U64,
            Self::Float32 => DataType::F32,
            Self::Float64 => DataType::F64,
            Self::Bool => DataType::Bool,
            Self::String => DataType::String,
            Self::Binary => DataType::Binary,
            Self::Undefined => DataType::Undefined,
        }
    }

    /// Whether values stored as `self` may be read as `target` without loss.
    ///
    /// Only strictly widening numeric casts are allowed: a wider integer of
    /// the same signedness, an unsigned integer into a strictly wider signed
    /// one, `f32` into `f64`, and `bool` into any integer.
    pub fn upcasts_to(&self, target: ScalarKind) -> bool {
        use ScalarKind::*;
        if *self == target {
            return true;
        }
        match self {
            Int8 => matches!(target, Int16 | Int32 | Int64),
            Int16 => matches!(target, Int32 | Int64),
            Int32 => matches!(target, Int64),
            UInt8 => matches!(target, UInt16 | UInt32 | UInt64 | Int16 | Int32 | Int64),
            UInt16 => matches!(target, UInt32 | UInt64 | Int32 | Int64),
            UInt32 => matches!(target, UInt64 | Int64),
            Float32 => matches!(target, Float64),
            Bool => matches!(
                target,
                Int8 | UInt8 | Int16 | UInt16 | Int32 | UInt32 | Int64 | UInt64
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.data_type())
    }
}

/// Node kinds of the schema tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SchemaKind {
    Scalar = 0,
    Row = 1,
    Array = 2,
    ArrayWithOffsets = 3,
    Map = 4,
    FlatMap = 5,
    SlidingWindowMap = 6,
}

impl SchemaKind {
    pub fn from_u8(value: u8) -> NimbleResult<Self> {
        Ok(match value {
            0 => Self::Scalar,
            1 => Self::Row,
            2 => Self::Array,
            3 => Self::ArrayWithOffsets,
            4 => Self::Map,
            5 => Self::FlatMap,
            6 => Self::SlidingWindowMap,
            other => nimble_bail!(MalformedFile: "unknown schema kind {}", other),
        })
    }
}

/// A logical type, as supplied to the writer. Flat-map value types describe
/// the per-key subtree; keys materialise as the writer observes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalType {
    Scalar(ScalarKind),
    Array(Box<LogicalType>),
    ArrayWithOffsets(Box<LogicalType>),
    Map(Box<LogicalType>, Box<LogicalType>),
    Row {
        names: Vec<String>,
        children: Vec<LogicalType>,
    },
    FlatMap(Box<LogicalType>),
}

impl LogicalType {
    pub fn row<I: IntoIterator<Item = (S, LogicalType)>, S: Into<String>>(fields: I) -> Self {
        let (names, children) = fields
            .into_iter()
            .map(|(name, child)| (name.into(), child))
            .unzip();
        Self::Row { names, children }
    }

    pub fn scalar(kind: ScalarKind) -> Self {
        Self::Scalar(kind)
    }
}

/// Node-local stream identifiers used by [`EncodingLayoutTree`](crate::EncodingLayoutTree).
///
/// `MAIN` addresses a node's primary stream (scalar values, row/flat-map
/// nulls, array/map lengths, array-with-offsets offsets). `SECONDARY` is the
/// lengths stream of an array-with-offsets node. `IN_MAP` addresses the
/// in-map stream on a flat-map child's root.
pub mod stream_ids {
    pub const MAIN: u8 = 0;
    pub const SECONDARY: u8 = 1;
    pub const IN_MAP: u8 = 2;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ScalarKind::Int8, ScalarKind::Int64, true)]
    #[case(ScalarKind::Int8, ScalarKind::Int8, true)]
    #[case(ScalarKind::UInt8, ScalarKind::Int16, true)]
    #[case(ScalarKind::UInt32, ScalarKind::Int32, false)]
    #[case(ScalarKind::Int16, ScalarKind::Int8, false)]
    #[case(ScalarKind::Float32, ScalarKind::Float64, true)]
    #[case(ScalarKind::Float64, ScalarKind::Float32, false)]
    #[case(ScalarKind::Bool, ScalarKind::Int32, true)]
    #[case(ScalarKind::Int8, ScalarKind::String, false)]
    #[case(ScalarKind::String, ScalarKind::Binary, false)]
    #[case(ScalarKind::Int32, ScalarKind::Float64, false)]
    fn upcasts(#[case] from: ScalarKind, #[case] to: ScalarKind, #[case] allowed: bool) {
        assert_eq!(from.upcasts_to(to), allowed);
    }

    #[test]
    fn scalar_kind_round_trip() {
        for raw in 0..14u8 {
            assert_eq!(ScalarKind::from_u8(raw).unwrap() as u8, raw);
        }
        assert!(ScalarKind::from_u8(14).is_err());
    }
}
