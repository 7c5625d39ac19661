//! The Nimble encoding family.
//!
//! Every encoded payload starts with a 6-byte prefix (`kind`, `data type`,
//! `row count`) from which a [`Decoder`] recovers shape and type. Encodings
//! compose by value: recursive kinds (RLE, dictionary, mainly-constant,
//! nullable) fully contain their children's payloads, so the whole tree is
//! decodable from one byte slice.
//!
//! [`Selector`] drives encoding choice, recursing into sub-streams and
//! bottoming out at trivial or fixed-bit-width payloads. Every encode call
//! captures the chosen tree as an [`EncodingLayout`], which can be replayed
//! to pin a future writer's choices.

pub use decoder::*;
pub use kind::*;
pub use layout::*;
pub use selection::{Encoded, NestedStream, Selector, encode_nullable_values, encode_values};
pub use statistics::Statistics;
pub use value::*;

// Re-exported for the `match_each_data_type` macro.
pub use bytes::Bytes;

mod constant;
mod decoder;
mod dictionary;
mod fixed_bit_width;
mod kind;
mod layout;
mod mainly_constant;
mod nullable;
mod rle;
mod selection;
mod sparse_bool;
mod statistics;
#[cfg(test)]
mod tests;
mod trivial;
mod value;

/// Match over a [`DataType`], binding the corresponding Rust type.
///
/// String and binary both bind [`Bytes`]; matching `Undefined` panics.
#[macro_export]
macro_rules! match_each_data_type {
    ($self:expr, | $_:tt $T:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $T:ident ) => ( $($body)* )}
        match $self {
            $crate::DataType::I8 => __with__! { i8 },
            $crate::DataType::U8 => __with__! { u8 },
            $crate::DataType::I16 => __with__! { i16 },
            $crate::DataType::U16 => __with__! { u16 },
            $crate::DataType::I32 => __with__! { i32 },
            $crate::DataType::U32 => __with__! { u32 },
            $crate::DataType::I64 => __with__! { i64 },
            $crate::DataType::U64 => __with__! { u64 },
            $crate::DataType::F32 => __with__! { f32 },
            $crate::DataType::F64 => __with__! { f64 },
            $crate::DataType::Bool => __with__! { bool },
            $crate::DataType::String | $crate::DataType::Binary => {
                type __Bytes = $crate::Bytes;
                __with__! { __Bytes }
            }
            $crate::DataType::Undefined => panic!("unsupported data type: undefined"),
        }
    })
}
