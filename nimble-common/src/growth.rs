use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps `(requested_size, current_capacity)` to a new capacity.
///
/// Implementations must return a capacity that covers both the request and
/// the current capacity; shrinking is never requested through this interface.
pub trait InputBufferGrowthPolicy: Send + Sync {
    /// The capacity to grow to so that `new_size` items fit.
    fn extended_capacity(&self, new_size: usize, capacity: usize) -> usize;
}

/// Growth policy with per-size-range growth factors.
///
/// The factor applied is the one of the highest range whose lower bound is at
/// most `new_size`; capacity starts from `max(capacity, min_capacity)` and is
/// multiplied by the factor until it covers the request. Small requests grow
/// aggressively, large ones conservatively.
pub struct DefaultInputBufferGrowthPolicy {
    min_capacity: usize,
    range_configs: BTreeMap<usize, f64>,
}

impl DefaultInputBufferGrowthPolicy {
    pub fn new(min_capacity: usize, range_configs: BTreeMap<usize, f64>) -> Self {
        debug_assert!(
            range_configs.values().all(|factor| *factor > 1.0),
            "growth factors must be greater than one"
        );
        Self {
            min_capacity,
            range_configs,
        }
    }
}

impl Default for DefaultInputBufferGrowthPolicy {
    fn default() -> Self {
        Self::new(
            16,
            BTreeMap::from([(16usize, 4.0), (1024, 2.0), (1 << 20, 1.25)]),
        )
    }
}

impl InputBufferGrowthPolicy for DefaultInputBufferGrowthPolicy {
    fn extended_capacity(&self, new_size: usize, capacity: usize) -> usize {
        if new_size <= capacity {
            return capacity;
        }

        let factor = self
            .range_configs
            .range(..=new_size)
            .next_back()
            .or_else(|| self.range_configs.iter().next())
            .map(|(_, factor)| *factor)
            .unwrap_or(2.0);

        // Item counts stay well below 2^53, so f64 arithmetic is exact enough.
        let mut extended = capacity.max(self.min_capacity).max(1) as f64;
        while (extended as usize) < new_size {
            extended *= factor;
        }
        extended as usize
    }
}

/// Grows to exactly the requested size. Used where the final size is known
/// up front and over-allocation only wastes pool reservation.
pub struct ExactGrowthPolicy;

impl InputBufferGrowthPolicy for ExactGrowthPolicy {
    fn extended_capacity(&self, new_size: usize, capacity: usize) -> usize {
        new_size.max(capacity)
    }
}

/// The policy used when none is supplied.
pub fn default_growth_policy() -> Arc<dyn InputBufferGrowthPolicy> {
    Arc::new(DefaultInputBufferGrowthPolicy::default())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(10, 0, 16)]
    #[case(10, 32, 32)] // already large enough
    #[case(17, 0, 64)] // 16 * 4
    #[case(100, 0, 256)] // 16 * 4 * 4
    #[case(1500, 1024, 2048)] // mid range factor 2
    #[case(5000, 0, 8192)]
    fn default_policy(#[case] new_size: usize, #[case] capacity: usize, #[case] expected: usize) {
        let policy = DefaultInputBufferGrowthPolicy::default();
        assert_eq!(policy.extended_capacity(new_size, capacity), expected);
    }

    #[test]
    fn capacity_always_covers_request() {
        let policy = DefaultInputBufferGrowthPolicy::default();
        for new_size in [1usize, 15, 16, 17, 1023, 1024, 1025, 1 << 21] {
            for capacity in [0usize, 1, 16, 4096] {
                let grown = policy.extended_capacity(new_size, capacity);
                assert!(grown >= new_size);
                assert!(grown >= capacity);
            }
        }
    }

    #[test]
    fn exact_policy() {
        assert_eq!(ExactGrowthPolicy.extended_capacity(100, 10), 100);
        assert_eq!(ExactGrowthPolicy.extended_capacity(10, 100), 100);
    }
}
