use crate::strategy::Strategy;

/// The block-local staging area shared by the threads of one block.
pub trait Staging {
    fn load(&mut self, i: usize) -> i32;
    fn store(&mut self, i: usize, value: i32);
}

/// One block of cooperating threads.
///
/// Code between two calls to [`BlockScope::sync_threads`] is a phase. Within
/// a phase the threads run in no particular order, so a thread must not read
/// a slot that another thread writes in the same phase.
pub trait BlockScope {
    type Shared: Staging;

    fn block_idx(&self) -> usize;

    fn block_dim(&self) -> usize;

    /// Runs `f` as every thread of the block, passing each thread its local
    /// index.
    fn for_each_thread<F>(&mut self, f: F)
    where
        F: FnMut(usize, &mut Self::Shared);

    /// Waits until every thread of the block has reached this point.
    fn sync_threads(&mut self);
}

/// Reduces the block's span of `src` to a single sum.
///
/// The span starts at `block_idx * block_dim * elements_per_thread`. Indices
/// past the end of `src` load as zero. Returns the sum on the thread with
/// local index 0, `None` on every other thread.
pub fn reduce_block<B>(block: &mut B, strategy: Strategy, src: &[i32]) -> Option<i32>
where
    B: BlockScope,
{
    let b_dim = block.block_dim();
    let start = block.block_idx() * b_dim * strategy.elements_per_thread();
    let fused = strategy.elements_per_thread() > 1;

    // Copy the block's span of global memory into the staging area. The fused
    // strategy adds a second element that sits one block further along.
    block.for_each_thread(|t_idx, xys| {
        let g_idx = start + t_idx;
        let mut x = src.get(g_idx).copied().unwrap_or(0);
        if fused {
            x = x.wrapping_add(src.get(g_idx + b_dim).copied().unwrap_or(0));
        }
        xys.store(t_idx, x);
    });
    block.sync_threads();

    for stride in strategy.strides(b_dim) {
        block.for_each_thread(|t_idx, xys| {
            if let Some((dst, other)) = strategy.pair(t_idx, stride, b_dim) {
                let sum = xys.load(dst).wrapping_add(xys.load(other));
                xys.store(dst, sum);
            }
        });
        block.sync_threads();
    }

    let mut total = None;
    block.for_each_thread(|t_idx, xys| {
        if t_idx == 0 {
            total = Some(xys.load(0));
        }
    });
    total
}
