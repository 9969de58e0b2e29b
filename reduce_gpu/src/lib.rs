#![cfg_attr(
    target_os = "cuda",
    no_std,
    feature(register_attr),
    register_attr(nvvm_internal)
)]

mod block;
#[cfg(target_os = "cuda")]
pub mod kernels;
mod step;
mod strategy;

pub use block::{reduce_block, BlockScope, Staging};
pub use step::{div_step, mult_step, DivStep, MultStep, Strides};
pub use strategy::Strategy;

/// The size of the block-local staging area. Every launch must use a block
/// size no larger than this.
pub const MAX_THREADS_PER_BLOCK: usize = 1024;
