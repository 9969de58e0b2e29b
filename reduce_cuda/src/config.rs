use crate::error::{ReduceError, Result};
use reduce_gpu::{Strategy, MAX_THREADS_PER_BLOCK};

/// True iff `n` is positive and has exactly one set bit.
pub fn is_power_of_two(n: i64) -> bool {
    n > 0 && n & (n - 1) == 0
}

pub(crate) fn is_power_of_two_len(len: usize) -> bool {
    i64::try_from(len).map_or(false, is_power_of_two)
}

/// The grid of one kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchShape {
    /// Number of blocks.
    pub grid: usize,
    /// Threads per block.
    pub block: usize,
}

impl LaunchShape {
    pub fn threads(&self) -> usize {
        self.grid * self.block
    }
}

/// The two launches that reduce an input of a given length.
///
/// Stage 1 writes one partial sum per block. Stage 2 folds those partials
/// with a single block, so stage 1 can never produce more blocks than it has
/// threads per block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPlan {
    pub len: usize,
    pub strategy: Strategy,
    pub stage1: LaunchShape,
    pub stage2: LaunchShape,
}

impl LaunchPlan {
    pub fn new(len: usize, max_threads_per_block: usize, strategy: Strategy) -> Result<Self> {
        if !is_power_of_two_len(max_threads_per_block)
            || max_threads_per_block > MAX_THREADS_PER_BLOCK
        {
            return Err(ReduceError::InvalidBlockSize {
                threads: max_threads_per_block,
                max: MAX_THREADS_PER_BLOCK,
            });
        }
        if !is_power_of_two_len(len) {
            return Err(ReduceError::InvalidInput { len });
        }

        let per_thread = strategy.elements_per_thread();
        let block = (len / per_thread).clamp(1, max_threads_per_block);
        let grid = (len / (block * per_thread)).max(1);
        if grid > block {
            return Err(ReduceError::TooManyBlocks {
                blocks: grid,
                threads: block,
            });
        }

        let stage1 = LaunchShape { grid, block };
        let stage2 = LaunchShape {
            grid: 1,
            block: (grid / per_thread).max(1),
        };
        Ok(Self {
            len,
            strategy,
            stage1,
            stage2,
        })
    }

    /// Length of the intermediate buffer that stage 1 fills.
    pub fn partials_len(&self) -> usize {
        self.stage1.grid
    }

    /// The longest input this configuration can reduce in two stages.
    pub fn max_len(max_threads_per_block: usize, strategy: Strategy) -> usize {
        max_threads_per_block * max_threads_per_block * strategy.elements_per_thread()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn powers_of_two() {
        for bit in 0..63 {
            assert!(is_power_of_two(1 << bit));
        }
        for n in [0, -1, -2, -1024, 3, 6, 12, 1023, 1025, i64::MAX, i64::MIN] {
            assert!(!is_power_of_two(n), "{n}");
        }
    }

    #[test]
    fn lengths() {
        assert!(is_power_of_two_len(1));
        assert!(is_power_of_two_len(1 << 40));
        for len in [0, 3, 1000, usize::MAX] {
            assert!(!is_power_of_two_len(len), "{len}");
        }
    }

    #[test]
    fn small_inputs_use_one_block() {
        let plan = LaunchPlan::new(8, 1024, Strategy::Sequential).unwrap();
        assert_eq!(plan.stage1, LaunchShape { grid: 1, block: 8 });
        assert_eq!(plan.stage2, LaunchShape { grid: 1, block: 1 });

        let plan = LaunchPlan::new(8, 1024, Strategy::FusedLoad).unwrap();
        assert_eq!(plan.stage1, LaunchShape { grid: 1, block: 4 });
        assert_eq!(plan.stage2, LaunchShape { grid: 1, block: 1 });
    }

    #[test]
    fn fused_load_halves_both_dimensions() {
        let plain = LaunchPlan::new(1 << 18, 512, Strategy::Sequential).unwrap();
        assert_eq!(plain.stage1, LaunchShape { grid: 512, block: 512 });
        assert_eq!(plain.stage2, LaunchShape { grid: 1, block: 512 });
        let fused = LaunchPlan::new(1 << 18, 512, Strategy::FusedLoad).unwrap();
        assert_eq!(fused.stage1, LaunchShape { grid: 256, block: 512 });
        assert_eq!(fused.stage2, LaunchShape { grid: 1, block: 128 });
    }

    #[test]
    fn single_element() {
        for strategy in Strategy::ALL {
            let plan = LaunchPlan::new(1, 1024, strategy).unwrap();
            assert_eq!(plan.stage1, LaunchShape { grid: 1, block: 1 });
            assert_eq!(plan.stage2, LaunchShape { grid: 1, block: 1 });
        }
    }

    #[test]
    fn rejects_bad_block_sizes() {
        for threads in [0, 3, 2048] {
            assert!(matches!(
                LaunchPlan::new(1024, threads, Strategy::Sequential),
                Err(ReduceError::InvalidBlockSize { .. })
            ));
        }
    }

    #[test]
    fn rejects_bad_lengths() {
        for len in [0, 3, 1000] {
            assert!(matches!(
                LaunchPlan::new(len, 1024, Strategy::Sequential),
                Err(ReduceError::InvalidInput { .. })
            ));
        }
    }

    #[test]
    fn stage_one_never_outgrows_stage_two() {
        for strategy in Strategy::ALL {
            for threads_log2 in 0..=10 {
                let threads = 1 << threads_log2;
                for len_log2 in 0..=24 {
                    let len = 1usize << len_log2;
                    match LaunchPlan::new(len, threads, strategy) {
                        Ok(plan) => {
                            assert!(plan.stage1.grid <= plan.stage1.block);
                            assert!(plan.stage2.block <= threads);
                            assert_eq!(
                                plan.stage1.threads() * strategy.elements_per_thread(),
                                len.max(strategy.elements_per_thread())
                            );
                            assert!(len <= LaunchPlan::max_len(threads, strategy));
                        }
                        Err(ReduceError::TooManyBlocks { blocks, threads }) => {
                            assert!(blocks > threads);
                            assert!(len > LaunchPlan::max_len(threads, strategy));
                        }
                        Err(e) => panic!("unexpected error {e}"),
                    }
                }
            }
        }
    }
}
