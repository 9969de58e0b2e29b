use crate::step::{div_step, mult_step, Strides};

/// The addressing policy a block uses to fold its staging area.
///
/// All four strategies run the same rounds-and-barriers skeleton and produce
/// the same sum. They differ only in which threads add which pair of slots
/// each round, plus the fused first load of [`Strategy::FusedLoad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// Interleaved addressing where a thread is active iff its index is a
    /// multiple of `2 * stride`. Active lanes are scattered within a warp.
    Divergent,
    /// Interleaved addressing with a computed index `2 * stride * thread`.
    /// Active lanes are contiguous but their slots collide in the same banks.
    BankConflict,
    /// Sequential addressing where the first `stride` threads are active and
    /// the stride halves each round.
    #[default]
    Sequential,
    /// Sequential addressing where each thread adds two elements while
    /// loading, so a block covers twice its size.
    FusedLoad,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Divergent,
        Strategy::BankConflict,
        Strategy::Sequential,
        Strategy::FusedLoad,
    ];

    /// Maps the numeric selectors `0..=3` onto strategies.
    pub fn from_selector(selector: u32) -> Option<Self> {
        match selector {
            0 => Some(Strategy::Divergent),
            1 => Some(Strategy::BankConflict),
            2 => Some(Strategy::Sequential),
            3 => Some(Strategy::FusedLoad),
            _ => None,
        }
    }

    pub fn selector(self) -> u32 {
        match self {
            Strategy::Divergent => 0,
            Strategy::BankConflict => 1,
            Strategy::Sequential => 2,
            Strategy::FusedLoad => 3,
        }
    }

    /// How many source elements each thread adds into its staging slot.
    pub fn elements_per_thread(self) -> usize {
        match self {
            Strategy::FusedLoad => 2,
            _ => 1,
        }
    }

    /// Name of the device entry point that runs this strategy.
    pub fn kernel_name(self) -> &'static str {
        match self {
            Strategy::Divergent => "reduce_divergent",
            Strategy::BankConflict => "reduce_bank_conflict",
            Strategy::Sequential => "reduce_sequential",
            Strategy::FusedLoad => "reduce_fused_load",
        }
    }

    /// The stride of every reduction round for a block of `block_dim`
    /// threads. There are exactly `log2(block_dim)` rounds.
    pub fn strides(self, block_dim: usize) -> Strides {
        match self {
            Strategy::Divergent | Strategy::BankConflict => {
                Strides::Up(mult_step(1, 2, block_dim))
            }
            Strategy::Sequential | Strategy::FusedLoad => Strides::Down(div_step(block_dim / 2, 2)),
        }
    }

    /// Returns the `(dst, src)` staging slots that `thread` adds in the round
    /// with the given stride, or `None` if the thread sits the round out.
    #[inline(always)]
    pub fn pair(self, thread: usize, stride: usize, block_dim: usize) -> Option<(usize, usize)> {
        match self {
            Strategy::Divergent => {
                if thread % (2 * stride) == 0 {
                    Some((thread, thread + stride))
                } else {
                    None
                }
            }
            Strategy::BankConflict => {
                let idx = 2 * stride * thread;
                if idx + stride < block_dim {
                    Some((idx, idx + stride))
                } else {
                    None
                }
            }
            Strategy::Sequential | Strategy::FusedLoad => {
                if thread < stride {
                    Some((thread, thread + stride))
                } else {
                    None
                }
            }
        }
    }
}
