use std::hash::Hash;

use bytes::Bytes;
use nimble_common::ByteCursor;
use nimble_error::{NimbleResult, nimble_panic};

use crate::DataType;

/// A value that can flow through the encoding family.
///
/// Implemented for the fixed-width scalars, `bool`, and [`Bytes`] (strings
/// and binaries). The integer and bool hooks have panicking defaults; they
/// are only reachable for encodings whose construction already validated the
/// data type (fixed-bit packing for integers, sparse/alternating-run logic
/// for bools).
pub trait EncodingValue: Clone + PartialEq + Default + Send + Sync + 'static {
    /// Data type tag written into encoding prefixes.
    const DATA_TYPE: DataType;
    /// Whether fixed-bit packing applies to this type.
    const IS_INTEGER: bool = false;

    /// Hashable identity for distinct-value statistics. For floats this is
    /// the bit pattern, so `-0.0` and `0.0` count as distinct values.
    type Key: Hash + Eq + Clone;

    fn key(&self) -> Self::Key;

    /// Serialise in the type's wire format: fixed-width LE for scalars, one
    /// byte for bool, `u32`-length-prefixed bytes for strings.
    fn write_to(&self, out: &mut Vec<u8>);

    fn read_from(cursor: &mut ByteCursor) -> NimbleResult<Self>;

    /// Whether a payload tagged `data_type` may be decoded as `Self`.
    fn accepts(data_type: DataType) -> bool {
        data_type == Self::DATA_TYPE
    }

    /// The unsigned bit pattern, zero-extended to 64 bits.
    fn packed(&self) -> u64 {
        nimble_panic!(UnsupportedDataType: "{} is not bit-packable", Self::DATA_TYPE)
    }

    fn from_packed(_word: u64) -> Self {
        nimble_panic!(UnsupportedDataType: "{} is not bit-packable", Self::DATA_TYPE)
    }

    fn from_bool(_value: bool) -> Self {
        nimble_panic!(UnsupportedDataType: "{} is not a bool", Self::DATA_TYPE)
    }

    fn to_bool(&self) -> bool {
        nimble_panic!(UnsupportedDataType: "{} is not a bool", Self::DATA_TYPE)
    }

    /// Content length in bytes, without the length prefix. Var-width only.
    fn var_len(&self) -> usize {
        nimble_panic!(UnsupportedDataType: "{} is not var-width", Self::DATA_TYPE)
    }

    /// Append the content bytes without a length prefix. Var-width only.
    fn append_raw(&self, _out: &mut Vec<u8>) {
        nimble_panic!(UnsupportedDataType: "{} is not var-width", Self::DATA_TYPE)
    }

    /// Construct from content bytes. Var-width only.
    fn from_raw(_bytes: Bytes) -> Self {
        nimble_panic!(UnsupportedDataType: "{} is not var-width", Self::DATA_TYPE)
    }
}

macro_rules! integer_value {
    ($T:ty, $U:ty, $data_type:ident, $read:ident) => {
        impl EncodingValue for $T {
            const DATA_TYPE: DataType = DataType::$data_type;
            const IS_INTEGER: bool = true;

            type Key = $T;

            fn key(&self) -> $T {
                *self
            }

            fn write_to(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_from(cursor: &mut ByteCursor) -> NimbleResult<Self> {
                cursor.$read()
            }

            fn packed(&self) -> u64 {
                *self as $U as u64
            }

            fn from_packed(word: u64) -> Self {
                word as $U as $T
            }
        }
    };
}

integer_value!(i8, u8, I8, read_i8);
integer_value!(u8, u8, U8, read_u8);
integer_value!(i16, u16, I16, read_i16);
integer_value!(u16, u16, U16, read_u16);
integer_value!(i32, u32, I32, read_i32);
integer_value!(u32, u32, U32, read_u32);
integer_value!(i64, u64, I64, read_i64);
integer_value!(u64, u64, U64, read_u64);

macro_rules! float_value {
    ($T:ty, $Bits:ty, $data_type:ident, $read:ident) => {
        impl EncodingValue for $T {
            const DATA_TYPE: DataType = DataType::$data_type;

            type Key = $Bits;

            fn key(&self) -> $Bits {
                self.to_bits()
            }

            fn write_to(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_from(cursor: &mut ByteCursor) -> NimbleResult<Self> {
                cursor.$read()
            }
        }
    };
}

float_value!(f32, u32, F32, read_f32);
float_value!(f64, u64, F64, read_f64);

impl EncodingValue for bool {
    const DATA_TYPE: DataType = DataType::Bool;

    type Key = bool;

    fn key(&self) -> bool {
        *self
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }

    fn read_from(cursor: &mut ByteCursor) -> NimbleResult<Self> {
        Ok(cursor.read_u8()? != 0)
    }

    fn from_bool(value: bool) -> Self {
        value
    }

    fn to_bool(&self) -> bool {
        *self
    }
}

/// Strings and binaries share the `Bytes` physical representation; the
/// logical distinction lives in the schema, not the encoding prefix.
impl EncodingValue for Bytes {
    const DATA_TYPE: DataType = DataType::String;

    type Key = Bytes;

    fn key(&self) -> Bytes {
        self.clone()
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        nimble_common::write_string(self, out);
    }

    fn read_from(cursor: &mut ByteCursor) -> NimbleResult<Self> {
        cursor.read_string()
    }

    fn accepts(data_type: DataType) -> bool {
        matches!(data_type, DataType::String | DataType::Binary)
    }

    fn var_len(&self) -> usize {
        self.len()
    }

    fn append_raw(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }

    fn from_raw(bytes: Bytes) -> Self {
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_packing_uses_unsigned_bit_patterns() {
        assert_eq!(5i8.packed(), 5);
        assert_eq!((-1i8).packed(), 0xFF);
        assert_eq!(i8::from_packed(0xFF), -1);
        assert_eq!((-1i64).packed(), u64::MAX);
        assert_eq!(u32::from_packed(7), 7u32);
    }

    #[test]
    fn bytes_accepts_both_logical_kinds() {
        assert!(Bytes::accepts(DataType::String));
        assert!(Bytes::accepts(DataType::Binary));
        assert!(!Bytes::accepts(DataType::U8));
    }

    #[test]
    fn float_keys_are_bit_patterns() {
        assert_ne!(0.0f64.key(), (-0.0f64).key());
        assert_eq!(1.5f32.key(), 1.5f32.key());
    }

    #[test]
    fn wire_round_trip() {
        let mut out = Vec::new();
        42u16.write_to(&mut out);
        (-3i32).write_to(&mut out);
        true.write_to(&mut out);
        Bytes::from_static(b"abc").write_to(&mut out);
        let mut cursor = ByteCursor::new(Bytes::from(out));
        assert_eq!(u16::read_from(&mut cursor).unwrap(), 42);
        assert_eq!(i32::read_from(&mut cursor).unwrap(), -3);
        assert!(bool::read_from(&mut cursor).unwrap());
        assert_eq!(Bytes::read_from(&mut cursor).unwrap().as_ref(), b"abc");
    }
}
