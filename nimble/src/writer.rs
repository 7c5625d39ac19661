use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use nimble_common::{CompressionOptions, MemoryPool};
use nimble_error::{NimbleResult, nimble_bail};
use nimble_schema::{EncodingLayoutTree, LogicalType, SchemaNode};
use nimble_tablet::{StripeStream, TabletWriter, WriteFile};

use crate::field_writer::{FieldWriter, OffsetAllocator, PendingChunk};
use crate::{
    Batch, Executor, FlatMapLayoutPlanner, FlushDecision, FlushPolicy, RawStripeSizeFlushPolicy,
    StripeProgress,
};

/// Writer configuration.
pub struct WriteOptions {
    /// Top-level map columns stored as flat maps. Batches must supply
    /// flat-map data for them.
    pub flat_map_columns: HashSet<String>,
    /// Top-level array columns stored with consecutive-duplicate
    /// deduplication (offsets + unique arrays).
    pub dictionary_array_columns: HashSet<String>,
    pub metadata: Vec<(String, String)>,
    pub compression: CompressionOptions,
    pub flush_policy: Box<dyn FlushPolicy>,
    /// When off, `FlushDecision::Chunk` is ignored and every stream holds
    /// one chunk per stripe.
    pub enable_chunking: bool,
    /// A trained layout tree seeding encoding selection.
    pub encoding_layout_tree: Option<EncodingLayoutTree>,
    pub layout_planner: FlatMapLayoutPlanner,
    pub executor: Executor,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            flat_map_columns: HashSet::new(),
            dictionary_array_columns: HashSet::new(),
            metadata: Vec::new(),
            compression: CompressionOptions::default(),
            flush_policy: Box::new(RawStripeSizeFlushPolicy::default()),
            enable_chunking: true,
            encoding_layout_tree: None,
            layout_planner: FlatMapLayoutPlanner::schema_order(),
            executor: Executor::Inline,
        }
    }
}

impl WriteOptions {
    pub fn with_flat_map_column(mut self, name: impl Into<String>) -> Self {
        self.flat_map_columns.insert(name.into());
        self
    }

    pub fn with_dictionary_array_column(mut self, name: impl Into<String>) -> Self {
        self.dictionary_array_columns.insert(name.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn with_flush_policy(mut self, policy: Box<dyn FlushPolicy>) -> Self {
        self.flush_policy = policy;
        self
    }

    pub fn with_encoding_layout_tree(mut self, tree: EncodingLayoutTree) -> Self {
        self.encoding_layout_tree = Some(tree);
        self
    }

    pub fn with_layout_planner(mut self, planner: FlatMapLayoutPlanner) -> Self {
        self.layout_planner = planner;
        self
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }
}

/// Writes batches into a Nimble tablet.
///
/// Batches accumulate in per-stream buffers until the flush policy closes a
/// chunk or a stripe. A stripe is fully encoded (optionally on the parallel
/// executor) and laid out before its bytes are appended; stripes are
/// immutable once written.
pub struct Writer<W: WriteFile> {
    options: WriteOptions,
    root: FieldWriter,
    tablet: TabletWriter<W>,
    stream_contents: HashMap<u32, Vec<u8>>,
    stripe_rows: u64,
    raw_stripe_size: u64,
    stripe_opened: Instant,
    closed: bool,
}

impl<W: WriteFile> Writer<W> {
    pub fn new(
        pool: &MemoryPool,
        schema: &LogicalType,
        file: W,
        options: WriteOptions,
    ) -> NimbleResult<Self> {
        let storage_type = storage_type(schema, &options)?;
        let alloc = Arc::new(OffsetAllocator::new());
        let root = FieldWriter::new(
            &storage_type,
            &alloc,
            pool,
            options.encoding_layout_tree.as_ref(),
        )?;
        Ok(Self {
            options,
            root,
            tablet: TabletWriter::new(file),
            stream_contents: HashMap::new(),
            stripe_rows: 0,
            raw_stripe_size: 0,
            stripe_opened: Instant::now(),
            closed: false,
        })
    }

    /// Append one batch, consulting the flush policy afterwards.
    pub fn write(&mut self, batch: &Batch) -> NimbleResult<()> {
        if self.closed {
            nimble_bail!("writer is closed");
        }
        if batch.root.row_count != batch.row_count {
            nimble_bail!(
                "batch declares {} rows but root holds {}",
                batch.row_count,
                batch.root.row_count
            );
        }
        batch.root.validate()?;
        self.root.ingest(&batch.root)?;
        self.stripe_rows += batch.row_count as u64;
        self.raw_stripe_size += batch.root.raw_byte_size();

        let progress = StripeProgress {
            raw_stripe_size: self.raw_stripe_size,
            stripe_row_count: self.stripe_rows,
            stripe_age: self.stripe_opened.elapsed(),
        };
        match self.options.flush_policy.should_flush(&progress) {
            FlushDecision::None => Ok(()),
            FlushDecision::Chunk => {
                if self.options.enable_chunking {
                    self.close_chunks()
                } else {
                    Ok(())
                }
            }
            FlushDecision::Stripe => self.flush(),
        }
    }

    /// Close the open chunk on every stream without closing the stripe.
    fn close_chunks(&mut self) -> NimbleResult<()> {
        let mut jobs: Vec<PendingChunk> = Vec::new();
        self.root.close_chunks(&mut jobs)?;
        if jobs.is_empty() {
            return Ok(());
        }
        let compression = self.options.compression.clone();
        let tasks: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let compression = compression.clone();
                move || job.encode(&compression)
            })
            .collect();
        // Tasks are independent per stream; the first error wins after all
        // in-flight work settles.
        let results = self.options.executor.run_all(tasks);
        for result in results {
            let (id, frame) = result?;
            self.stream_contents.entry(id).or_default().extend(frame);
        }
        Ok(())
    }

    /// Close and emit the open stripe, if it holds any rows.
    pub fn flush(&mut self) -> NimbleResult<()> {
        if self.closed {
            nimble_bail!("writer is closed");
        }
        self.close_chunks()?;
        if self.stripe_rows == 0 {
            return Ok(());
        }
        let streams: Vec<StripeStream> = self
            .stream_contents
            .drain()
            .map(|(id, content)| StripeStream { id, content })
            .collect();
        let schema = self.root.schema_node();
        let planned = self.options.layout_planner.plan(&schema, streams)?;
        let row_count = u32::try_from(self.stripe_rows)
            .map_err(|_| nimble_error::nimble_err!("stripe exceeds u32 rows"))?;
        self.tablet.write_stripe(row_count, &planned)?;

        self.root.finish_stripe();
        self.stripe_rows = 0;
        self.raw_stripe_size = 0;
        self.stripe_opened = Instant::now();
        Ok(())
    }

    /// Flush, write the footer, and return the underlying file.
    pub fn close(mut self) -> NimbleResult<W> {
        self.flush()?;
        self.closed = true;
        self.options.flush_policy.on_close();
        let schema = self.root.schema_node();
        self.tablet.finish(
            &schema,
            std::mem::take(&mut self.options.metadata),
            self.options.encoding_layout_tree.take(),
        )
    }

    /// The schema as materialised so far (flat-map keys appear as observed).
    pub fn schema(&self) -> SchemaNode {
        self.root.schema_node()
    }
}

/// Resolve the storage-side logical type: flat-map and dictionary-array
/// options rewrite the top-level columns they name.
fn storage_type(schema: &LogicalType, options: &WriteOptions) -> NimbleResult<LogicalType> {
    let LogicalType::Row { names, children } = schema else {
        nimble_bail!(SchemaMismatch: "writer schema root must be a struct");
    };
    let children = names
        .iter()
        .zip(children)
        .map(|(name, child)| {
            if options.flat_map_columns.contains(name) {
                match child {
                    LogicalType::Map(_, values) => Ok(LogicalType::FlatMap(values.clone())),
                    LogicalType::FlatMap(_) => Ok(child.clone()),
                    _ => nimble_bail!(
                        SchemaMismatch: "flat-map column '{}' must be a map",
                        name
                    ),
                }
            } else if options.dictionary_array_columns.contains(name) {
                match child {
                    LogicalType::Array(elements) => {
                        Ok(LogicalType::ArrayWithOffsets(elements.clone()))
                    }
                    LogicalType::ArrayWithOffsets(_) => Ok(child.clone()),
                    _ => nimble_bail!(
                        SchemaMismatch: "dictionary-array column '{}' must be an array",
                        name
                    ),
                }
            } else {
                Ok(child.clone())
            }
        })
        .collect::<NimbleResult<Vec<_>>>()?;
    Ok(LogicalType::Row {
        names: names.clone(),
        children,
    })
}
