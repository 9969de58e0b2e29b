use crate::config::LaunchShape;
use crate::error::Result;
use reduce_gpu::Strategy;

/// A compute device that can hold integer buffers and run the reduction
/// kernels.
///
/// Buffers release their device memory when dropped. Launches on one device
/// run in submission order, and [`Device::download`] blocks until every
/// earlier launch has finished.
pub trait Device {
    type Buffer;

    fn name(&self) -> &str;

    /// Allocates a zeroed buffer of `len` elements.
    fn alloc(&self, len: usize) -> Result<Self::Buffer>;

    /// Copies `src` into `dst`, which must be exactly as long.
    fn upload(&self, dst: &mut Self::Buffer, src: &[i32]) -> Result<()>;

    /// Runs the `strategy` kernel over `shape`, writing one sum per block of
    /// `src` into `dst`.
    fn launch(
        &self,
        strategy: Strategy,
        shape: LaunchShape,
        src: &Self::Buffer,
        dst: &mut Self::Buffer,
    ) -> Result<()>;

    /// Waits for all submitted launches to finish.
    fn synchronize(&self) -> Result<()>;

    /// Copies `src` into `dst`, which must be exactly as long.
    fn download(&self, src: &Self::Buffer, dst: &mut [i32]) -> Result<()>;
}
