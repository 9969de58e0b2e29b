use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReduceError>;

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("input length must be a positive power of two, got {len}")]
    InvalidInput { len: usize },

    #[error("iteration count must be positive")]
    NoIterations,

    #[error("threads per block must be a power of two no larger than {max}, got {threads}")]
    InvalidBlockSize { threads: usize, max: usize },

    #[error("{blocks} partial sums cannot be folded by one block of {threads} threads")]
    TooManyBlocks { blocks: usize, threads: usize },

    #[error("empty range [{min}, {max}]")]
    InvalidRange { min: i32, max: i32 },

    #[error("invalid launch of {grid} blocks x {block} threads: {reason}")]
    InvalidLaunch {
        grid: usize,
        block: usize,
        reason: &'static str,
    },

    #[error("device allocation of {len} elements failed: {reason}")]
    Allocation { len: usize, reason: String },

    #[error("buffer holds {actual} elements, expected {expected}")]
    BufferLength { expected: usize, actual: usize },

    #[error("unrecognized strategy selector {0}")]
    UnknownStrategy(u32),

    #[cfg(feature = "cuda")]
    #[error("CUDA error: {0}")]
    Cuda(#[from] cust::error::CudaError),
}
