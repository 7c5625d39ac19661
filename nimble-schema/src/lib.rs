//! The Nimble schema model.
//!
//! A [`SchemaNode`] tree maps a nested logical type onto physical streams:
//! every node owns one or more [stream descriptors](StreamOffset), dense
//! integers allocated monotonically across the whole schema. The tree is
//! serialised into the file footer and decoded back on open.
//!
//! [`EncodingLayoutTree`] is the schema-aligned record of encoding choices
//! produced by a training pass and consumed by future writers.

pub use layout_tree::*;
pub use schema::*;
pub use serde::*;
pub use types::*;

mod layout_tree;
mod schema;
mod serde;
mod types;
