use crate::config::{is_power_of_two_len, LaunchPlan};
use crate::device::Device;
use crate::error::{ReduceError, Result};
use reduce_gpu::{Strategy, MAX_THREADS_PER_BLOCK};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The outcome of one call to [`TwoStageReducer::reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReduceReport {
    pub strategy: Strategy,
    pub plan: LaunchPlan,
    pub iterations: usize,
    /// The sum the device computed.
    pub sum: i32,
    /// The sum the caller expected.
    pub expected: i32,
    /// Time spent in the launch loop, excluding transfers.
    pub elapsed: Duration,
}

impl ReduceReport {
    pub fn matches(&self) -> bool {
        self.sum == self.expected
    }

    /// Average time of one two-stage reduction.
    pub fn average(&self) -> Duration {
        self.elapsed.div_f64(self.iterations as f64)
    }
}

/// The three device buffers of one reduction. A slot stays `None` until its
/// allocation succeeds, so dropping the set releases exactly what was
/// acquired.
struct Buffers<B> {
    input: Option<B>,
    partials: Option<B>,
    output: Option<B>,
}

impl<B> Buffers<B> {
    fn empty() -> Self {
        Self {
            input: None,
            partials: None,
            output: None,
        }
    }
}

impl<B> Drop for Buffers<B> {
    fn drop(&mut self) {
        let released = [
            self.output.take().is_some(),
            self.partials.take().is_some(),
            self.input.take().is_some(),
        ];
        debug!(
            buffers = released.iter().filter(|&&r| r).count(),
            "released device buffers"
        );
    }
}

/// Sums an array on a [`Device`] with two dependent launches: one block per
/// section of the input, then a single block over the partial sums.
pub struct TwoStageReducer<D> {
    device: D,
    max_threads_per_block: usize,
}

impl<D: Device> TwoStageReducer<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            max_threads_per_block: MAX_THREADS_PER_BLOCK,
        }
    }

    /// Caps the block size of the first stage. Must be a power of two no
    /// larger than [`MAX_THREADS_PER_BLOCK`].
    pub fn with_max_threads_per_block(mut self, threads: usize) -> Self {
        self.max_threads_per_block = threads;
        self
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn max_threads_per_block(&self) -> usize {
        self.max_threads_per_block
    }

    /// Runs `iterations` full reductions of `input` with the strategy named by
    /// `selector` and checks the final sum against `expected`.
    ///
    /// Invalid inputs fail before the device is touched. An unrecognized
    /// selector fails after the buffers are set up but before any launch. A
    /// wrong sum is logged and reported, not returned as an error.
    pub fn reduce(
        &self,
        input: &[i32],
        expected: i32,
        selector: u32,
        iterations: usize,
    ) -> Result<ReduceReport> {
        let len = input.len();
        if !is_power_of_two_len(len) {
            return Err(ReduceError::InvalidInput { len });
        }
        if iterations == 0 {
            return Err(ReduceError::NoIterations);
        }
        let strategy = Strategy::from_selector(selector);
        // An unknown selector never launches. It is planned with the layout
        // that accepts the longest inputs, so the error names the selector.
        let plan = LaunchPlan::new(
            len,
            self.max_threads_per_block,
            strategy.unwrap_or(Strategy::FusedLoad),
        )?;
        debug!(device = self.device.name(), ?plan, "planned reduction");

        let mut buffers = Buffers::empty();
        let dev_input = buffers.input.insert(self.device.alloc(len)?);
        let dev_partials = buffers.partials.insert(self.device.alloc(plan.partials_len())?);
        let dev_output = buffers.output.insert(self.device.alloc(1)?);

        self.device.upload(dev_input, input)?;

        let Some(strategy) = strategy else {
            warn!(selector, "unrecognized strategy selector, nothing launched");
            return Err(ReduceError::UnknownStrategy(selector));
        };

        let now = Instant::now();
        for _ in 0..iterations {
            self.device
                .launch(strategy, plan.stage1, dev_input, dev_partials)?;
            self.device
                .launch(strategy, plan.stage2, dev_partials, dev_output)?;
        }
        self.device.synchronize()?;
        let elapsed = now.elapsed();

        let mut sum = [0i32];
        self.device.download(dev_output, &mut sum)?;
        let sum = sum[0];

        if sum != expected {
            warn!(?strategy, sum, expected, "device sum does not match");
        }
        debug!(?strategy, iterations, ?elapsed, "reduction finished");

        Ok(ReduceReport {
            strategy,
            plan,
            iterations,
            sum,
            expected,
            elapsed,
        })
    }
}
