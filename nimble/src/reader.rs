use std::collections::HashMap;
use std::sync::Arc;

use nimble_common::MemoryPool;
use nimble_error::{NimbleResult, nimble_bail};
use nimble_schema::{ScalarKind, SchemaNode};
use nimble_tablet::{ChunkedDecoder, ReadFile, Tablet};

use crate::field_reader::{FieldReader, StreamFetch};
use crate::{Batch, ColumnData, ColumnVector, Executor, FlatMapReadSpec};

/// Reader configuration.
#[derive(Default)]
pub struct ReadParams {
    /// Restrict reads to stripes whose offset falls in
    /// `[file_range_start_offset, file_range_end_offset)`.
    pub file_range_start_offset: Option<u64>,
    pub file_range_end_offset: Option<u64>,
    /// Top-level columns to materialise; `None` reads them all.
    pub columns: Option<Vec<String>>,
    /// Per-column scalar up-cast targets.
    pub column_types: HashMap<String, ScalarKind>,
    /// Flat-map columns read as structs of their selected features.
    pub read_flat_map_field_as_struct: std::collections::HashSet<String>,
    /// Per-column feature selection for flat maps.
    pub flat_map_feature_selector: HashMap<String, crate::FeatureSelector>,
    pub decoding_executor: Executor,
}

impl ReadParams {
    pub fn with_range(mut self, start: u64, end: u64) -> Self {
        self.file_range_start_offset = Some(start);
        self.file_range_end_offset = Some(end);
        self
    }

    pub fn with_columns<I: IntoIterator<Item = S>, S: Into<String>>(mut self, columns: I) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_column_type(mut self, column: impl Into<String>, kind: ScalarKind) -> Self {
        self.column_types.insert(column.into(), kind);
        self
    }

    pub fn with_flat_map_as_struct(mut self, column: impl Into<String>) -> Self {
        self.read_flat_map_field_as_struct.insert(column.into());
        self
    }

    pub fn with_feature_selector(
        mut self,
        column: impl Into<String>,
        selector: crate::FeatureSelector,
    ) -> Self {
        self.flat_map_feature_selector.insert(column.into(), selector);
        self
    }

    pub fn with_decoding_executor(mut self, executor: Executor) -> Self {
        self.decoding_executor = executor;
        self
    }
}

/// Pool accounting for one stripe's fetched stream bytes; released when the
/// stripe's decode state is dropped.
struct PoolReservation {
    pool: MemoryPool,
    bytes: usize,
}

impl PoolReservation {
    fn new(pool: &MemoryPool, bytes: usize) -> NimbleResult<Self> {
        pool.reserve(bytes)?;
        Ok(Self {
            pool: pool.clone(),
            bytes,
        })
    }
}

impl Drop for PoolReservation {
    fn drop(&mut self) {
        self.pool.release(self.bytes);
    }
}

/// One stripe's decoding state: the root nulls stream plus the selected
/// columns' reader trees.
struct StripeState {
    nulls: Option<ChunkedDecoder<bool>>,
    columns: Vec<FieldReader>,
    _reservation: PoolReservation,
}

/// Reads batches out of a Nimble tablet.
///
/// A reader is a single-threaded state machine; [`next`](Reader::next)
/// stops at stripe boundaries, so callers loop for a full count. Dropping
/// the reader drops all decode state and buffers.
pub struct Reader {
    pool: MemoryPool,
    tablet: Tablet,
    params: ReadParams,
    /// Names and schema indices of the selected top-level columns.
    selected_columns: Vec<(String, usize)>,
    /// Stripe indices admitted by the byte range.
    stripes: Vec<usize>,
    /// Rows per admitted stripe.
    stripe_rows: Vec<u64>,
    total_rows: u64,
    /// Position within the admitted range.
    cursor_stripe: usize,
    row_in_stripe: u64,
    state: Option<StripeState>,
}

impl Reader {
    pub fn new(
        pool: &MemoryPool,
        file: Arc<dyn ReadFile>,
        params: ReadParams,
    ) -> NimbleResult<Self> {
        let tablet = Tablet::open(file)?;

        let SchemaNode::Row { names, .. } = tablet.schema() else {
            nimble_bail!(SchemaMismatch: "tablet schema root must be a struct");
        };
        let selected_columns = match &params.columns {
            None => names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect(),
            Some(columns) => columns
                .iter()
                .map(|wanted| {
                    names
                        .iter()
                        .position(|name| name == wanted)
                        .map(|i| (wanted.clone(), i))
                        .ok_or_else(|| {
                            nimble_error::nimble_err!(
                                SchemaMismatch: "column '{}' is not in the schema",
                                wanted
                            )
                        })
                })
                .collect::<NimbleResult<Vec<_>>>()?,
        };

        let start = params.file_range_start_offset.unwrap_or(0);
        let end = params.file_range_end_offset.unwrap_or(u64::MAX);
        let stripes: Vec<usize> = (0..tablet.stripe_count())
            .filter(|i| {
                let offset = tablet.stripe_offset(*i);
                offset >= start && offset < end
            })
            .collect();
        let stripe_rows: Vec<u64> = stripes
            .iter()
            .map(|i| u64::from(tablet.stripe_row_count(*i)))
            .collect();
        let total_rows = stripe_rows.iter().sum();

        Ok(Self {
            pool: pool.clone(),
            tablet,
            params,
            selected_columns,
            stripes,
            stripe_rows,
            total_rows,
            cursor_stripe: 0,
            row_in_stripe: 0,
            state: None,
        })
    }

    /// The decoded schema.
    pub fn schema(&self) -> &SchemaNode {
        self.tablet.schema()
    }

    /// File metadata key/value pairs.
    pub fn metadata(&self) -> &[(String, String)] {
        self.tablet.metadata()
    }

    /// Rows readable within the admitted range.
    pub fn row_count(&self) -> u64 {
        self.total_rows
    }

    fn open_stripe(&mut self, stripe_index: usize) -> NimbleResult<StripeState> {
        let stripe = self.stripes[stripe_index];
        let SchemaNode::Row {
            nulls, children, ..
        } = self.tablet.schema()
        else {
            nimble_bail!(SchemaMismatch: "tablet schema root must be a struct");
        };

        let tablet = &self.tablet;
        let mut fetched_bytes = 0usize;
        let mut fetch = |id| -> NimbleResult<Option<bytes::Bytes>> {
            let mut handles = tablet.load(stripe, &[id])?;
            match handles.pop().flatten() {
                Some(handle) => {
                    let bytes = handle.bytes()?;
                    fetched_bytes += bytes.len();
                    Ok(Some(bytes))
                }
                None => Ok(None),
            }
        };

        let root_nulls = fetch(*nulls)?.map(ChunkedDecoder::new);
        let mut columns = Vec::with_capacity(self.selected_columns.len());
        for (name, index) in &self.selected_columns {
            let node = &children[*index];
            let spec = flat_map_spec(&self.params, name);
            let target = self.params.column_types.get(name).copied();
            let fetch_ref: &mut StreamFetch<'_> = &mut fetch;
            columns.push(FieldReader::new(node, fetch_ref, target, spec.as_ref())?);
        }
        drop(fetch);
        Ok(StripeState {
            nulls: root_nulls,
            columns,
            _reservation: PoolReservation::new(&self.pool, fetched_bytes)?,
        })
    }

    fn ensure_stripe(&mut self) -> NimbleResult<bool> {
        loop {
            if self.cursor_stripe >= self.stripes.len() {
                return Ok(false);
            }
            if self.row_in_stripe >= self.stripe_rows[self.cursor_stripe] {
                self.cursor_stripe += 1;
                self.row_in_stripe = 0;
                self.state = None;
                continue;
            }
            if self.state.is_none() {
                let state = self.open_stripe(self.cursor_stripe)?;
                self.state = Some(state);
                // A freshly opened stripe starts at row zero; skip up to the
                // current position (non-zero after a seek).
                if self.row_in_stripe > 0 {
                    let skip = self.row_in_stripe as usize;
                    let state = self.state.as_mut().ok_or_else(|| {
                        nimble_error::nimble_err!("stripe state missing after open")
                    })?;
                    skip_stripe_rows(state, skip)?;
                }
            }
            return Ok(true);
        }
    }

    /// Produce up to `row_count` rows. Stops at stripe boundaries and
    /// returns an empty batch at end of range.
    pub fn next(&mut self, row_count: usize) -> NimbleResult<Batch> {
        if row_count == 0 || !self.ensure_stripe()? {
            return Ok(Batch::from_columns(0, Vec::new()));
        }
        let remaining = self.stripe_rows[self.cursor_stripe] - self.row_in_stripe;
        let take = (row_count as u64).min(remaining) as usize;
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| nimble_error::nimble_err!("stripe state missing"))?;

        let presence = match &mut state.nulls {
            None => None,
            Some(nulls) => {
                let mut bits = Vec::with_capacity(take);
                nulls.materialize(take, &mut bits)?;
                if bits.iter().all(|p| *p) {
                    None
                } else {
                    Some(bits)
                }
            }
        };
        let present = presence
            .as_ref()
            .map_or(take, |p| p.iter().filter(|b| **b).count());

        let tasks: Vec<_> = state
            .columns
            .iter_mut()
            .map(|reader| move || reader.read(present))
            .collect();
        let mut columns = Vec::with_capacity(tasks.len());
        let mut first_error = None;
        for result in self.params.decoding_executor.run_all(tasks) {
            match result {
                Ok(column) => columns.push(column),
                Err(e) => {
                    // Surface the first error; later tasks already ran to
                    // completion and their results are discarded.
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        self.row_in_stripe += take as u64;
        Ok(Batch {
            row_count: take,
            root: ColumnVector {
                row_count: take,
                nulls: presence,
                data: ColumnData::Row { children: columns },
            },
        })
    }

    /// Advance without materialising; returns the rows actually skipped
    /// (fewer than requested at end of range).
    pub fn skip_rows(&mut self, row_count: u64) -> NimbleResult<u64> {
        let mut skipped = 0u64;
        while skipped < row_count {
            if !self.ensure_stripe()? {
                break;
            }
            let remaining = self.stripe_rows[self.cursor_stripe] - self.row_in_stripe;
            let take = (row_count - skipped).min(remaining);
            let state = self
                .state
                .as_mut()
                .ok_or_else(|| nimble_error::nimble_err!("stripe state missing"))?;
            skip_stripe_rows(state, take as usize)?;
            self.row_in_stripe += take;
            skipped += take;
        }
        Ok(skipped)
    }

    /// Seek to an absolute row within the admitted range; out-of-bounds
    /// positions clamp. Returns the row seeked to.
    pub fn seek_to_row(&mut self, row: u64) -> NimbleResult<u64> {
        let row = row.min(self.total_rows);
        // Locate the stripe containing `row` and restart it from zero.
        let mut first_row = 0u64;
        let mut stripe = 0usize;
        while stripe < self.stripe_rows.len() && first_row + self.stripe_rows[stripe] <= row {
            first_row += self.stripe_rows[stripe];
            stripe += 1;
        }
        self.cursor_stripe = stripe;
        self.row_in_stripe = row - first_row;
        self.state = None;
        Ok(row)
    }
}

fn skip_stripe_rows(state: &mut StripeState, row_count: usize) -> NimbleResult<()> {
    let presence = match &mut state.nulls {
        None => None,
        Some(nulls) => {
            let mut bits = Vec::with_capacity(row_count);
            nulls.materialize(row_count, &mut bits)?;
            Some(bits)
        }
    };
    let present = presence
        .as_ref()
        .map_or(row_count, |p| p.iter().filter(|b| **b).count());
    for column in &mut state.columns {
        column.skip(present)?;
    }
    Ok(())
}

fn flat_map_spec(params: &ReadParams, column: &str) -> Option<FlatMapReadSpec> {
    let as_struct = params.read_flat_map_field_as_struct.contains(column);
    let selector = params.flat_map_feature_selector.get(column).cloned();
    if !as_struct && selector.is_none() {
        return None;
    }
    Some(FlatMapReadSpec {
        as_struct,
        selector,
    })
}
