use crate::block::{reduce_block, BlockScope, Staging};
use crate::strategy::Strategy;
use crate::MAX_THREADS_PER_BLOCK;
use cuda_std::{kernel, shared_array, thread};

/// Sums each `block_dim`-sized section of `src` into `dst[block_idx]`, leaving
/// active lanes scattered across each warp.
#[kernel]
#[allow(improper_ctypes_definitions, clippy::missing_safety_doc)]
pub unsafe fn reduce_divergent(src: &[i32], dst: *mut i32) {
    reduce_section(Strategy::Divergent, src, dst)
}

/// Sums each `block_dim`-sized section of `src` into `dst[block_idx]` with
/// strided shared-memory indices.
#[kernel]
#[allow(improper_ctypes_definitions, clippy::missing_safety_doc)]
pub unsafe fn reduce_bank_conflict(src: &[i32], dst: *mut i32) {
    reduce_section(Strategy::BankConflict, src, dst)
}

/// Sums each `block_dim`-sized section of `src` into `dst[block_idx]` with
/// contiguous active threads.
#[kernel]
#[allow(improper_ctypes_definitions, clippy::missing_safety_doc)]
pub unsafe fn reduce_sequential(src: &[i32], dst: *mut i32) {
    reduce_section(Strategy::Sequential, src, dst)
}

/// Sums each `2 * block_dim`-sized section of `src` into `dst[block_idx]`.
/// The launch should use half as many threads and blocks as the other
/// kernels for the same input.
#[kernel]
#[allow(improper_ctypes_definitions, clippy::missing_safety_doc)]
pub unsafe fn reduce_fused_load(src: &[i32], dst: *mut i32) {
    reduce_section(Strategy::FusedLoad, src, dst)
}

unsafe fn reduce_section(strategy: Strategy, src: &[i32], dst: *mut i32) {
    // Width of the largest block and shared by the entire block.
    let xys = shared_array![i32; MAX_THREADS_PER_BLOCK];
    let mut block = ThreadBlock {
        t_idx: thread::thread_idx_x() as usize,
        b_idx: thread::block_idx_x() as usize,
        b_dim: thread::block_dim_x() as usize,
        xys: SharedSlots(xys),
    };

    if let Some(total) = reduce_block(&mut block, strategy, src) {
        *(&mut *dst.add(block.b_idx)) = total;
    }
}

struct SharedSlots(*mut i32);

impl Staging for SharedSlots {
    #[inline(always)]
    fn load(&mut self, i: usize) -> i32 {
        unsafe { *self.0.add(i) }
    }

    #[inline(always)]
    fn store(&mut self, i: usize, value: i32) {
        unsafe { *(&mut *self.0.add(i)) = value }
    }
}

/// The calling thread's view of its block. Every thread runs the whole
/// reduction, so a phase is just the calling thread's own step.
struct ThreadBlock {
    t_idx: usize,
    b_idx: usize,
    b_dim: usize,
    xys: SharedSlots,
}

impl BlockScope for ThreadBlock {
    type Shared = SharedSlots;

    #[inline(always)]
    fn block_idx(&self) -> usize {
        self.b_idx
    }

    #[inline(always)]
    fn block_dim(&self) -> usize {
        self.b_dim
    }

    #[inline(always)]
    fn for_each_thread<F>(&mut self, mut f: F)
    where
        F: FnMut(usize, &mut Self::Shared),
    {
        f(self.t_idx, &mut self.xys)
    }

    #[inline(always)]
    fn sync_threads(&mut self) {
        thread::sync_threads();
    }
}
