pub mod config;
#[cfg(feature = "cuda")]
mod cuda;
mod device;
mod driver;
mod emulated;
pub mod emulator;
mod error;
pub mod input;

pub use config::{is_power_of_two, LaunchPlan, LaunchShape};
#[cfg(feature = "cuda")]
pub use cuda::CudaDevice;
pub use device::Device;
pub use driver::{ReduceReport, TwoStageReducer};
pub use emulated::{EmulatedBuffer, EmulatedDevice, Ledger};
pub use emulator::{Emulator, LaunchStats};
pub use error::{ReduceError, Result};
pub use reduce_gpu::{Strategy, MAX_THREADS_PER_BLOCK};
