use std::collections::HashMap;

use itertools::Itertools;

use crate::{DataType, EncodingValue};

/// Sample statistics driving encoding selection, gathered in one pass.
pub struct Statistics<T: EncodingValue> {
    pub row_count: usize,
    pub distinct_count: usize,
    /// Number of maximal runs of equal values.
    pub run_count: usize,
    pub most_common: Option<(T, usize)>,
    /// `(min, max)` of the unsigned bit patterns; integers only.
    pub packed_range: Option<(u64, u64)>,
    /// Bool streams only; zero otherwise.
    pub true_count: usize,
}

impl<T: EncodingValue> Statistics<T> {
    pub fn gather(values: &[T]) -> Self {
        let mut counts: HashMap<T::Key, (T, usize)> = HashMap::new();
        for value in values {
            let entry = counts
                .entry(value.key())
                .or_insert_with(|| (value.clone(), 0));
            entry.1 += 1;
        }
        let run_count = values.iter().dedup().count();

        let most_common = counts
            .values()
            .max_by_key(|(_, count)| *count)
            .map(|(value, count)| (value.clone(), *count));

        let packed_range = if T::IS_INTEGER && !values.is_empty() {
            let mut min = u64::MAX;
            let mut max = 0u64;
            for value in values {
                let packed = value.packed();
                min = min.min(packed);
                max = max.max(packed);
            }
            Some((min, max))
        } else {
            None
        };

        let true_count = if T::DATA_TYPE == DataType::Bool {
            values.iter().filter(|v| v.to_bool()).count()
        } else {
            0
        };

        Self {
            row_count: values.len(),
            distinct_count: counts.len(),
            run_count,
            most_common,
            packed_range,
            true_count,
        }
    }

    /// Fraction of rows holding the most common value, in permille.
    pub fn dominance_permille(&self) -> usize {
        match (&self.most_common, self.row_count) {
            (Some((_, count)), n) if n > 0 => count * 1000 / n,
            _ => 0,
        }
    }
}
