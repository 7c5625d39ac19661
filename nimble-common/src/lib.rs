//! Byte-level primitives shared by the Nimble encoding and tablet layers.
//!
//! * [`MemoryPool`] parents every allocation made by readers and writers, so
//!   that dropping one deterministically returns its bytes.
//! * [`Vector<T>`] is a pool-backed growable sequence whose growth is routed
//!   through an [`InputBufferGrowthPolicy`].
//! * [`FixedBitArray`] packs integers at `k` bits per value.
//! * [`ByteCursor`] and the `write_*` helpers implement the little-endian
//!   wire primitives every on-disk structure is built from.

pub use bits::*;
pub use checksum::*;
pub use compression::*;
pub use cursor::*;
pub use fixed_bit_array::*;
pub use growth::*;
pub use pool::*;
pub use vector::*;

mod bits;
mod checksum;
mod compression;
mod cursor;
mod fixed_bit_array;
mod growth;
mod pool;
mod vector;
