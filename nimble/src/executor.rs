use std::sync::Arc;

use rayon::prelude::*;

/// Where per-column encode/decode work runs.
///
/// The inline executor runs tasks on the calling thread. The parallel
/// executor fans them out on a rayon pool and joins before returning, so
/// borrowed state never outlives the call.
#[derive(Clone, Default)]
pub enum Executor {
    #[default]
    Inline,
    Parallel(Arc<rayon::ThreadPool>),
}

impl Executor {
    /// A parallel executor over a dedicated pool of `threads` workers.
    pub fn parallel(threads: usize) -> Self {
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => Self::Parallel(Arc::new(pool)),
            Err(e) => {
                log::debug!("falling back to inline execution: {e}");
                Self::Inline
            }
        }
    }

    /// Run every task to completion and return their results in order.
    pub fn run_all<T, F>(&self, tasks: Vec<F>) -> Vec<T>
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        match self {
            Self::Inline => tasks.into_iter().map(|task| task()).collect(),
            Self::Parallel(pool) => {
                pool.install(|| tasks.into_par_iter().map(|task| task()).collect())
            }
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline => write!(f, "Executor::Inline"),
            Self::Parallel(pool) => write!(f, "Executor::Parallel({})", pool.current_num_threads()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_keep_task_order() {
        for executor in [Executor::Inline, Executor::parallel(4)] {
            let tasks: Vec<_> = (0..32).map(|i| move || i * 2).collect();
            assert_eq!(
                executor.run_all(tasks),
                (0..32).map(|i| i * 2).collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn borrows_are_scoped() {
        let data: Vec<u64> = (0..100).collect();
        let chunks: Vec<&[u64]> = data.chunks(10).collect();
        let tasks: Vec<_> = chunks
            .into_iter()
            .map(|chunk| move || chunk.iter().sum::<u64>())
            .collect();
        let sums = Executor::parallel(2).run_all(tasks);
        assert_eq!(sums.iter().sum::<u64>(), data.iter().sum::<u64>());
    }
}
