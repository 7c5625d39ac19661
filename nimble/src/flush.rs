use std::time::Duration;

/// Accumulated state of the open stripe, handed to the flush policy after
/// every batch write.
#[derive(Debug, Clone, Copy)]
pub struct StripeProgress {
    /// Raw (pre-encoding) bytes accumulated in the open stripe.
    pub raw_stripe_size: u64,
    pub stripe_row_count: u64,
    /// Time since the stripe was opened.
    pub stripe_age: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Keep accumulating.
    None,
    /// Close the current chunk on every open stream; keep the stripe open.
    Chunk,
    /// Close and emit the stripe.
    Stripe,
}

pub trait FlushPolicy: Send {
    fn should_flush(&mut self, progress: &StripeProgress) -> FlushDecision;

    fn on_close(&mut self) {}
}

/// Emits a stripe once the raw accumulated bytes reach a threshold.
pub struct RawStripeSizeFlushPolicy {
    raw_stripe_size: u64,
}

impl RawStripeSizeFlushPolicy {
    pub fn new(raw_stripe_size: u64) -> Self {
        Self { raw_stripe_size }
    }
}

impl Default for RawStripeSizeFlushPolicy {
    fn default() -> Self {
        // 64 MiB of raw values per stripe.
        Self::new(64 << 20)
    }
}

impl FlushPolicy for RawStripeSizeFlushPolicy {
    fn should_flush(&mut self, progress: &StripeProgress) -> FlushDecision {
        if progress.raw_stripe_size >= self.raw_stripe_size {
            FlushDecision::Stripe
        } else {
            FlushDecision::None
        }
    }
}

/// Emits a stripe every `row_count` rows. Useful in tests and for
/// row-aligned downstream consumers.
pub struct RowCountFlushPolicy {
    row_count: u64,
}

impl RowCountFlushPolicy {
    pub fn new(row_count: u64) -> Self {
        Self { row_count }
    }
}

impl FlushPolicy for RowCountFlushPolicy {
    fn should_flush(&mut self, progress: &StripeProgress) -> FlushDecision {
        if progress.stripe_row_count >= self.row_count {
            FlushDecision::Stripe
        } else {
            FlushDecision::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(raw: u64, rows: u64) -> StripeProgress {
        StripeProgress {
            raw_stripe_size: raw,
            stripe_row_count: rows,
            stripe_age: Duration::ZERO,
        }
    }

    #[test]
    fn raw_size_policy() {
        let mut policy = RawStripeSizeFlushPolicy::new(1000);
        assert_eq!(policy.should_flush(&progress(999, 5)), FlushDecision::None);
        assert_eq!(policy.should_flush(&progress(1000, 5)), FlushDecision::Stripe);
    }

    #[test]
    fn row_count_policy() {
        let mut policy = RowCountFlushPolicy::new(10);
        assert_eq!(policy.should_flush(&progress(0, 9)), FlushDecision::None);
        assert_eq!(policy.should_flush(&progress(0, 10)), FlushDecision::Stripe);
    }
}
