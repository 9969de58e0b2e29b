use anyhow::Context;
use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand_hc::Hc128Rng;
use reduce_cuda::input::{random_input, serial_sum};
use reduce_cuda::{
    Device, EmulatedDevice, Emulator, ReduceError, Strategy, TwoStageReducer,
    MAX_THREADS_PER_BLOCK,
};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Host SIMT emulator.
    Emulated,
    /// Host SIMT emulator that also counts races, divergence and bank conflicts.
    Instrumented,
    /// First CUDA device. Needs the `cuda` feature.
    Cuda,
}

/// Sums a random array with four tree-reduction strategies and times each.
#[derive(Debug, Parser)]
struct Args {
    /// The input holds 2^LOG2_LEN integers.
    #[arg(long, default_value_t = 20)]
    log2_len: u32,

    /// Full reductions per strategy.
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Maximum threads per block.
    #[arg(long, default_value_t = MAX_THREADS_PER_BLOCK)]
    threads: usize,

    /// Strategy selector (0-3). Repeat to run several; defaults to all four.
    #[arg(long = "strategy", value_name = "SELECTOR")]
    strategies: Vec<u32>,

    /// Seed for the input. Drawn from entropy if omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Smallest input value.
    #[arg(long, default_value_t = -1000, allow_hyphen_values = true)]
    min: i32,

    /// Largest input value.
    #[arg(long, default_value_t = 1000, allow_hyphen_values = true)]
    max: i32,

    #[arg(long, value_enum, default_value_t = Backend::Emulated)]
    device: Backend,
}

fn main() -> anyhow::Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .init();

    let args = Args::parse();
    let len = 1usize
        .checked_shl(args.log2_len)
        .context("input length does not fit in usize")?;
    let selectors = if args.strategies.is_empty() {
        Strategy::ALL.iter().map(|s| s.selector()).collect()
    } else {
        args.strategies.clone()
    };

    let mut rng = match args.seed {
        Some(seed) => Hc128Rng::seed_from_u64(seed),
        None => Hc128Rng::from_entropy(),
    };
    let now = Instant::now();
    let xs = random_input(&mut rng, len, args.min, args.max)?;
    let expected = serial_sum(&xs);
    println!("generated {} integers:\t{:.2?}", len, now.elapsed());

    match args.device {
        Backend::Emulated | Backend::Instrumented => {
            let instrumented = args.device == Backend::Instrumented;
            for &selector in &selectors {
                let emulator = if instrumented {
                    Emulator::instrumented()
                } else {
                    Emulator::new()
                };
                let reducer = TwoStageReducer::new(EmulatedDevice::new(emulator))
                    .with_max_threads_per_block(args.threads);
                if run(&reducer, &xs, expected, selector, args.iterations)? && instrumented {
                    let stats = reducer.device().stats();
                    println!(
                        "\tbarriers: {}\traces: {}\tdivergent warps: {}\tbank conflicts: {}",
                        stats.barriers, stats.races, stats.divergent_warps, stats.bank_conflicts
                    );
                }
            }
        }
        Backend::Cuda => run_cuda(&args, &xs, expected, &selectors)?,
    }

    Ok(())
}

/// Parses `RUST_LOG`-style directives, showing warnings when none are given
/// or they do not parse.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

#[cfg(feature = "cuda")]
fn run_cuda(args: &Args, xs: &[i32], expected: i32, selectors: &[u32]) -> anyhow::Result<()> {
    let device = reduce_cuda::CudaDevice::new()?;
    let reducer = TwoStageReducer::new(device).with_max_threads_per_block(args.threads);
    for &selector in selectors {
        run(&reducer, xs, expected, selector, args.iterations)?;
    }
    Ok(())
}

#[cfg(not(feature = "cuda"))]
fn run_cuda(_: &Args, _: &[i32], _: i32, _: &[u32]) -> anyhow::Result<()> {
    anyhow::bail!("built without the `cuda` feature")
}

/// Runs one strategy and prints its timing. Returns false if the selector was
/// not recognized.
fn run<D: Device>(
    reducer: &TwoStageReducer<D>,
    xs: &[i32],
    expected: i32,
    selector: u32,
    iterations: usize,
) -> anyhow::Result<bool> {
    match reducer.reduce(xs, expected, selector, iterations) {
        Ok(report) => {
            println!(
                "{:?} on {}:\t{:.2?} per iteration\t(sum {}{})",
                report.strategy,
                reducer.device().name(),
                report.average(),
                report.sum,
                if report.matches() { "" } else { ", MISMATCH" }
            );
            Ok(true)
        }
        Err(ReduceError::UnknownStrategy(_)) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logged_with(directives: Option<&str>, f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(log_filter(directives))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn unknown_selector_is_logged_without_rust_log() {
        let reducer = TwoStageReducer::new(EmulatedDevice::default());
        let logged = logged_with(None, || {
            assert!(!run(&reducer, &[1; 8], 8, 9, 1).unwrap());
        });
        assert!(logged.contains("unrecognized strategy selector"), "{logged}");
        assert!(logged.contains("selector=9"), "{logged}");
    }

    #[test]
    fn explicit_directives_override_the_default() {
        let reducer = TwoStageReducer::new(EmulatedDevice::default());
        let logged = logged_with(Some("error"), || {
            assert!(!run(&reducer, &[1; 8], 8, 9, 1).unwrap());
        });
        assert!(logged.is_empty(), "{logged}");

        let logged = logged_with(Some("debug"), || {
            assert!(run(&reducer, &[1; 8], 8, 2, 1).unwrap());
        });
        assert!(logged.contains("planned reduction"), "{logged}");
    }
}
