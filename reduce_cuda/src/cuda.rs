use crate::config::LaunchShape;
use crate::device::Device;
use crate::error::{ReduceError, Result};
use cust::prelude::*;
use reduce_gpu::Strategy;
use tracing::debug;

static PTX: &str = include_str!("../../resources/reduce_gpu.ptx");

/// Runs the reduction kernels on the first CUDA device.
pub struct CudaDevice {
    name: String,
    module: Module,
    stream: Stream,
    // Dropped last so the module and stream are torn down inside it.
    _context: Context,
}

impl CudaDevice {
    pub fn new() -> Result<Self> {
        let context = cust::quick_init()?;
        let name = cust::device::Device::get_device(0)?.name()?;
        let module = Module::from_ptx(PTX, &[])?;
        let stream = Stream::new(StreamFlags::NON_BLOCKING, None)?;
        debug!(%name, "initialized CUDA device");

        Ok(Self {
            name,
            module,
            stream,
            _context: context,
        })
    }
}

impl Device for CudaDevice {
    type Buffer = DeviceBuffer<i32>;

    fn name(&self) -> &str {
        &self.name
    }

    fn alloc(&self, len: usize) -> Result<DeviceBuffer<i32>> {
        DeviceBuffer::zeroed(len).map_err(|e| ReduceError::Allocation {
            len,
            reason: e.to_string(),
        })
    }

    fn upload(&self, dst: &mut DeviceBuffer<i32>, src: &[i32]) -> Result<()> {
        if dst.len() != src.len() {
            return Err(ReduceError::BufferLength {
                expected: dst.len(),
                actual: src.len(),
            });
        }
        dst.copy_from(src)?;
        Ok(())
    }

    fn launch(
        &self,
        strategy: Strategy,
        shape: LaunchShape,
        src: &DeviceBuffer<i32>,
        dst: &mut DeviceBuffer<i32>,
    ) -> Result<()> {
        let kernel = self.module.get_function(strategy.kernel_name())?;
        let stream = &self.stream;
        unsafe {
            launch!(
                kernel<<<shape.grid as u32, shape.block as u32, 0, stream>>>(
                    src.as_device_ptr(),
                    src.len(),
                    dst.as_device_ptr()
                )
            )?;
        }
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        self.stream.synchronize()?;
        Ok(())
    }

    fn download(&self, src: &DeviceBuffer<i32>, dst: &mut [i32]) -> Result<()> {
        if src.len() != dst.len() {
            return Err(ReduceError::BufferLength {
                expected: src.len(),
                actual: dst.len(),
            });
        }
        src.copy_to(dst)?;
        Ok(())
    }
}
