//! Stripe and tablet (file) layout.
//!
//! A tablet is a sequence of append-only stripes followed by a footer that
//! records the schema, the stripe index, and per-stripe stream tables. Each
//! stream is a concatenation of self-describing chunks; [`ChunkedDecoder`]
//! iterates them lazily, holding only the current chunk's decoding state.

pub use chunked::*;
pub use footer::*;
pub use io::*;
pub use tablet::*;
pub use writer::*;

mod chunked;
mod footer;
mod io;
mod tablet;
mod writer;
