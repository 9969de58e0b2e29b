//! Host emulation of SIMT kernel launches.
//!
//! A launch runs its blocks in parallel on the rayon pool, in whatever order
//! the pool picks. Inside a block, each phase between two barriers runs every
//! thread to completion in turn, which matches real hardware only when no
//! thread reads a slot another thread writes in the same phase. The
//! instrumented emulator checks exactly that and also measures the two costs
//! the reduction strategies trade against each other:
//!
//! - divergent warps: 32-lane warps where some lanes touch shared memory in a
//!   phase and others sit it out,
//! - bank conflicts: lanes of a warp hitting distinct words in the same one of
//!   32 four-byte banks within one access, which serializes the access.

use crate::config::LaunchShape;
use crate::error::{ReduceError, Result};
use itertools::Itertools;
use rayon::prelude::*;
use reduce_gpu::{reduce_block, BlockScope, Staging, Strategy, MAX_THREADS_PER_BLOCK};
use std::ops::Add;

pub const WARP_SIZE: usize = 32;
pub const BANK_COUNT: usize = 32;

/// Counters gathered from one or more launches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchStats {
    pub launches: usize,
    pub blocks: usize,
    /// Barriers reached, counted once per block.
    pub barriers: usize,
    /// Only counted by an instrumented emulator.
    pub races: usize,
    /// Only counted by an instrumented emulator.
    pub divergent_warps: usize,
    /// Extra serialized shared-memory accesses. Only counted by an
    /// instrumented emulator.
    pub bank_conflicts: usize,
}

impl Add for LaunchStats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            launches: self.launches + other.launches,
            blocks: self.blocks + other.blocks,
            barriers: self.barriers + other.barriers,
            races: self.races + other.races,
            divergent_warps: self.divergent_warps + other.divergent_warps,
            bank_conflicts: self.bank_conflicts + other.bank_conflicts,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Emulator {
    instrumented: bool,
}

impl Emulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An emulator that tracks every shared-memory access. Much slower.
    pub fn instrumented() -> Self {
        Self { instrumented: true }
    }

    pub fn is_instrumented(&self) -> bool {
        self.instrumented
    }

    /// Runs `strategy` over `shape`, writing block `i`'s sum to `dst[i]`.
    pub fn launch(
        &self,
        strategy: Strategy,
        shape: LaunchShape,
        src: &[i32],
        dst: &mut [i32],
    ) -> Result<LaunchStats> {
        let invalid = |reason| ReduceError::InvalidLaunch {
            grid: shape.grid,
            block: shape.block,
            reason,
        };
        if shape.grid == 0 {
            return Err(invalid("empty grid"));
        }
        if !shape.block.is_power_of_two() || shape.block > MAX_THREADS_PER_BLOCK {
            return Err(invalid("block size is not a power of two within the staging area"));
        }
        if dst.len() < shape.grid {
            return Err(invalid("destination is shorter than the grid"));
        }

        let stats = dst[..shape.grid]
            .par_iter_mut()
            .enumerate()
            .map(|(b_idx, slot)| {
                let mut block = EmulatedBlock::new(b_idx, shape.block, self.instrumented);
                if let Some(total) = reduce_block(&mut block, strategy, src) {
                    *slot = total;
                }
                block.finish()
            })
            .reduce(LaunchStats::default, |a, b| a + b);

        Ok(LaunchStats {
            launches: 1,
            ..stats
        })
    }
}

struct EmulatedBlock {
    b_idx: usize,
    b_dim: usize,
    xys: EmulatedStaging,
    stats: LaunchStats,
}

impl EmulatedBlock {
    fn new(b_idx: usize, b_dim: usize, instrumented: bool) -> Self {
        Self {
            b_idx,
            b_dim,
            xys: EmulatedStaging {
                slots: vec![0; b_dim],
                tracker: instrumented.then(|| PhaseTracker::new(b_dim)),
            },
            stats: LaunchStats {
                blocks: 1,
                ..LaunchStats::default()
            },
        }
    }

    /// Closes the trailing phase and returns the block's counters.
    fn finish(mut self) -> LaunchStats {
        self.close_phase();
        self.stats
    }

    fn close_phase(&mut self) {
        if let Some(tracker) = &mut self.xys.tracker {
            let phase = tracker.close_phase();
            self.stats = self.stats + phase;
        }
    }
}

impl BlockScope for EmulatedBlock {
    type Shared = EmulatedStaging;

    fn block_idx(&self) -> usize {
        self.b_idx
    }

    fn block_dim(&self) -> usize {
        self.b_dim
    }

    fn for_each_thread<F>(&mut self, mut f: F)
    where
        F: FnMut(usize, &mut Self::Shared),
    {
        for t_idx in 0..self.b_dim {
            if let Some(tracker) = &mut self.xys.tracker {
                tracker.thread = t_idx;
            }
            f(t_idx, &mut self.xys);
        }
    }

    fn sync_threads(&mut self) {
        self.stats.barriers += 1;
        self.close_phase();
    }
}

struct EmulatedStaging {
    slots: Vec<i32>,
    tracker: Option<PhaseTracker>,
}

impl Staging for EmulatedStaging {
    fn load(&mut self, i: usize) -> i32 {
        if let Some(tracker) = &mut self.tracker {
            tracker.record(i, false);
        }
        self.slots[i]
    }

    fn store(&mut self, i: usize, value: i32) {
        if let Some(tracker) = &mut self.tracker {
            tracker.record(i, true);
        }
        self.slots[i] = value;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SlotUse {
    first: Option<usize>,
    shared: bool,
    written: bool,
}

/// Shared-memory accesses of the current phase.
struct PhaseTracker {
    thread: usize,
    slots: Vec<SlotUse>,
    /// Addresses touched by each thread, in program order.
    accesses: Vec<Vec<usize>>,
}

impl PhaseTracker {
    fn new(b_dim: usize) -> Self {
        Self {
            thread: 0,
            slots: vec![SlotUse::default(); b_dim],
            accesses: vec![Vec::new(); b_dim],
        }
    }

    fn record(&mut self, slot: usize, write: bool) {
        let t_idx = self.thread;
        let slot_use = &mut self.slots[slot];
        match slot_use.first {
            None => slot_use.first = Some(t_idx),
            Some(first) if first != t_idx => slot_use.shared = true,
            Some(_) => {}
        }
        slot_use.written |= write;
        self.accesses[t_idx].push(slot);
    }

    fn close_phase(&mut self) -> LaunchStats {
        let races = self
            .slots
            .iter()
            .filter(|slot_use| slot_use.shared && slot_use.written)
            .count();

        let mut divergent_warps = 0;
        let mut bank_conflicts = 0;
        for warp in self.accesses.chunks(WARP_SIZE) {
            let active = warp.iter().filter(|lane| !lane.is_empty()).count();
            if active > 0 && active < warp.len() {
                divergent_warps += 1;
            }

            // The j-th access of every lane issues together.
            let depth = warp.iter().map(Vec::len).max().unwrap_or(0);
            for j in 0..depth {
                let ways = warp
                    .iter()
                    .filter_map(|lane| lane.get(j).copied())
                    .map(|addr| (addr % BANK_COUNT, addr))
                    .into_group_map()
                    .into_values()
                    .map(|addrs| addrs.into_iter().unique().count())
                    .max()
                    .unwrap_or(1);
                bank_conflicts += ways - 1;
            }
        }

        self.slots.iter_mut().for_each(|slot_use| *slot_use = SlotUse::default());
        self.accesses.iter_mut().for_each(Vec::clear);

        LaunchStats {
            races,
            divergent_warps,
            bank_conflicts,
            ..LaunchStats::default()
        }
    }
}
