use crate::config::LaunchShape;
use crate::device::Device;
use crate::emulator::{Emulator, LaunchStats};
use crate::error::{ReduceError, Result};
use reduce_gpu::Strategy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Running totals of the resources an [`EmulatedDevice`] hands out.
#[derive(Debug, Default)]
pub struct Ledger {
    allocations: AtomicUsize,
    releases: AtomicUsize,
    live_elements: AtomicUsize,
    launches: AtomicUsize,
}

impl Ledger {
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn live_buffers(&self) -> usize {
        self.allocations() - self.releases()
    }

    pub fn live_elements(&self) -> usize {
        self.live_elements.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

/// Device memory backed by host memory.
#[derive(Debug)]
pub struct EmulatedBuffer {
    data: Vec<i32>,
    ledger: Arc<Ledger>,
}

impl EmulatedBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }
}

impl Drop for EmulatedBuffer {
    fn drop(&mut self) {
        self.ledger.releases.fetch_add(1, Ordering::SeqCst);
        self.ledger
            .live_elements
            .fetch_sub(self.data.len(), Ordering::SeqCst);
        trace!(len = self.data.len(), "released emulated buffer");
    }
}

/// A [`Device`] that runs kernels on the host [`Emulator`].
///
/// Launches complete before `launch` returns, so `synchronize` has nothing to
/// wait for.
#[derive(Debug, Default)]
pub struct EmulatedDevice {
    emulator: Emulator,
    ledger: Arc<Ledger>,
    capacity: Option<usize>,
    stats: Mutex<LaunchStats>,
}

impl EmulatedDevice {
    pub fn new(emulator: Emulator) -> Self {
        Self {
            emulator,
            ..Self::default()
        }
    }

    /// Limits live device memory to `elements` integers. Allocations past the
    /// limit fail.
    pub fn with_capacity(mut self, elements: usize) -> Self {
        self.capacity = Some(elements);
        self
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        Arc::clone(&self.ledger)
    }

    /// Counters of every launch so far.
    pub fn stats(&self) -> LaunchStats {
        *self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ReduceError::BufferLength { expected, actual });
    }
    Ok(())
}

impl Device for EmulatedDevice {
    type Buffer = EmulatedBuffer;

    fn name(&self) -> &str {
        if self.emulator.is_instrumented() {
            "emulated (instrumented)"
        } else {
            "emulated"
        }
    }

    fn alloc(&self, len: usize) -> Result<EmulatedBuffer> {
        let capacity = self.capacity;
        self.ledger
            .live_elements
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                let next = live.checked_add(len)?;
                match capacity {
                    Some(capacity) if next > capacity => None,
                    _ => Some(next),
                }
            })
            .map_err(|live| ReduceError::Allocation {
                len,
                reason: format!(
                    "out of device memory ({live} of {} elements in use)",
                    capacity.unwrap_or(usize::MAX)
                ),
            })?;
        self.ledger.allocations.fetch_add(1, Ordering::SeqCst);
        trace!(len, "allocated emulated buffer");

        Ok(EmulatedBuffer {
            data: vec![0; len],
            ledger: Arc::clone(&self.ledger),
        })
    }

    fn upload(&self, dst: &mut EmulatedBuffer, src: &[i32]) -> Result<()> {
        check_len(dst.len(), src.len())?;
        dst.data.copy_from_slice(src);
        Ok(())
    }

    fn launch(
        &self,
        strategy: Strategy,
        shape: LaunchShape,
        src: &EmulatedBuffer,
        dst: &mut EmulatedBuffer,
    ) -> Result<()> {
        let stats = self.emulator.launch(strategy, shape, &src.data, &mut dst.data)?;
        self.ledger.launches.fetch_add(1, Ordering::SeqCst);
        let mut total = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *total = *total + stats;
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        Ok(())
    }

    fn download(&self, src: &EmulatedBuffer, dst: &mut [i32]) -> Result<()> {
        check_len(src.len(), dst.len())?;
        dst.copy_from_slice(&src.data);
        Ok(())
    }
}
