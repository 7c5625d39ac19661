//! Nimble: a columnar file format for nested, strongly-typed tabular data.
//!
//! A file (a *tablet*) is a sequence of append-only *stripes* plus a footer.
//! Within a stripe, every schema stream is a sequence of self-describing
//! encoded *chunks*. The encoding family (trivial, RLE, dictionary,
//! mainly-constant, sparse-bool, nullable, fixed-bit-packed) composes
//! recursively, and selection is statistics-driven with optional replay of a
//! trained [`EncodingLayoutTree`](nimble_schema::EncodingLayoutTree).
//!
//! # Writing
//!
//! ```
//! use nimble::{Batch, ColumnVector, ScalarValues, Writer, WriteOptions};
//! use nimble_common::MemoryPool;
//! use nimble_schema::{LogicalType, ScalarKind};
//! use nimble_tablet::InMemoryFile;
//!
//! let pool = MemoryPool::default();
//! let schema = LogicalType::row([("id", LogicalType::scalar(ScalarKind::Int64))]);
//! let mut writer =
//!     Writer::new(&pool, &schema, InMemoryFile::new(), WriteOptions::default()).unwrap();
//! let batch = Batch::from_columns(
//!     3,
//!     [ColumnVector::scalar(ScalarValues::I64(vec![1, 2, 3]))],
//! );
//! writer.write(&batch).unwrap();
//! let file = writer.close().unwrap();
//! # assert!(file.into_bytes().len() > 0);
//! ```
//!
//! # Reading
//!
//! ```
//! # use nimble::{Batch, ColumnVector, ScalarValues, Writer, WriteOptions};
//! # use nimble_common::MemoryPool;
//! # use nimble_schema::{LogicalType, ScalarKind};
//! # use nimble_tablet::InMemoryFile;
//! use std::sync::Arc;
//! use nimble::{ReadParams, Reader};
//!
//! # let pool = MemoryPool::default();
//! # let schema = LogicalType::row([("id", LogicalType::scalar(ScalarKind::Int64))]);
//! # let mut writer =
//! #     Writer::new(&pool, &schema, InMemoryFile::new(), WriteOptions::default()).unwrap();
//! # writer
//! #     .write(&Batch::from_columns(
//! #         3,
//! #         [ColumnVector::scalar(ScalarValues::I64(vec![1, 2, 3]))],
//! #     ))
//! #     .unwrap();
//! # let bytes = writer.close().unwrap().into_bytes();
//! let mut reader = Reader::new(&pool, Arc::new(bytes), ReadParams::default()).unwrap();
//! let batch = reader.next(100).unwrap();
//! assert_eq!(batch.row_count, 3);
//! ```

pub use batch::*;
pub use executor::*;
pub use field_reader::{FeatureSelector, FlatMapReadSpec, SelectionMode};
pub use flush::*;
pub use layout_planner::*;
pub use reader::*;
pub use train::*;
pub use writer::*;

// The sub-crates, re-exported for one-stop imports.
pub use nimble_common as common;
pub use nimble_encodings as encodings;
pub use nimble_error as error;
pub use nimble_schema as schema;
pub use nimble_tablet as tablet;

mod batch;
mod executor;
mod field_reader;
mod field_writer;
mod flush;
mod layout_planner;
mod reader;
mod train;
mod writer;
