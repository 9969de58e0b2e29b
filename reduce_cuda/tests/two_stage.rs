use proptest::collection::vec;
use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest, Just, ProptestConfig};
use proptest::strategy::Strategy as _;
use reduce_cuda::input::serial_sum;
use reduce_cuda::{
    EmulatedDevice, Emulator, LaunchPlan, ReduceError, Strategy, TwoStageReducer,
};

fn reducer(threads: usize) -> TwoStageReducer<EmulatedDevice> {
    TwoStageReducer::new(EmulatedDevice::default()).with_max_threads_per_block(threads)
}

/// A block size and an input whose length is a power of two.
fn sized_input() -> impl proptest::strategy::Strategy<Value = (usize, Vec<i32>)> {
    (0u32..=7, 0u32..=12).prop_flat_map(|(threads_log2, len_log2)| {
        (Just(1usize << threads_log2), vec(any::<i32>(), 1usize << len_log2))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn device_sum_matches_serial_sum((threads, xs) in sized_input()) {
        let reducer = reducer(threads);
        let expected = serial_sum(&xs);
        for strategy in Strategy::ALL {
            match LaunchPlan::new(xs.len(), threads, strategy) {
                Ok(plan) => {
                    prop_assert!(plan.stage1.grid <= plan.stage1.block);
                    let report = reducer.reduce(&xs, expected, strategy.selector(), 1).unwrap();
                    prop_assert_eq!(report.sum, expected);
                    prop_assert_eq!(report.plan, plan);
                }
                Err(ReduceError::TooManyBlocks { .. }) => {
                    let result = reducer.reduce(&xs, expected, strategy.selector(), 1);
                    let rejected = matches!(result, Err(ReduceError::TooManyBlocks { .. }));
                    prop_assert!(rejected, "expected TooManyBlocks, got {:?}", result);
                }
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        prop_assert_eq!(reducer.device().ledger().live_buffers(), 0);
    }

    #[test]
    fn repeated_iterations_agree(xs in vec(-50i32..50, 256), iterations in 1usize..6) {
        let reducer = reducer(64);
        let expected = serial_sum(&xs);
        for strategy in Strategy::ALL {
            let once = reducer.reduce(&xs, expected, strategy.selector(), 1).unwrap();
            let many = reducer.reduce(&xs, expected, strategy.selector(), iterations).unwrap();
            prop_assert_eq!(once.sum, many.sum);
            prop_assert!(many.matches());
        }
    }

    #[test]
    fn phases_never_race(len_log2 in 0u32..=11) {
        let xs: Vec<i32> = (0..1i32 << len_log2).collect();
        let reducer = TwoStageReducer::new(EmulatedDevice::new(Emulator::instrumented()))
            .with_max_threads_per_block(64);
        for strategy in Strategy::ALL {
            reducer.reduce(&xs, serial_sum(&xs), strategy.selector(), 1).unwrap();
        }
        prop_assert_eq!(reducer.device().stats().races, 0);
    }
}

#[test]
fn eight_ones() {
    let xs = [1; 8];
    let reducer = reducer(8);
    for strategy in Strategy::ALL {
        let report = reducer.reduce(&xs, 8, strategy.selector(), 1).unwrap();
        assert_eq!(report.sum, 8);
        assert!(report.matches());
        let threads = if strategy == Strategy::FusedLoad { 4 } else { 8 };
        assert_eq!(report.plan.stage1.block, threads);
        assert_eq!(report.plan.stage1.grid, 1);
    }
}

#[test]
fn single_block_sequential_handles_signs() {
    let reducer = reducer(1024);
    let zeros = vec![0; 1024];
    let negatives = vec![-3; 1024];
    let mixed: Vec<i32> = (0..1024).map(|i| if i % 3 == 0 { -i } else { i / 2 }).collect();
    for xs in [zeros, negatives, mixed] {
        let expected = serial_sum(&xs);
        let report = reducer.reduce(&xs, expected, 2, 3).unwrap();
        assert_eq!(report.plan.stage1.grid, 1);
        assert_eq!(report.sum, expected);
    }
    let report = reducer.reduce(&vec![-3; 1024], -3072, 2, 1).unwrap();
    assert_eq!(report.sum, -3072);
}

#[test]
fn invalid_inputs_acquire_nothing() {
    let reducer = reducer(1024);
    let ledger = reducer.device().ledger();
    for len in [0, 5, 6, 7, 100, 1023] {
        let xs = vec![1; len];
        assert!(matches!(
            reducer.reduce(&xs, len as i32, 2, 1),
            Err(ReduceError::InvalidInput { .. })
        ));
    }
    assert_eq!(ledger.allocations(), 0);
    assert_eq!(ledger.launches(), 0);
}

#[test]
fn unknown_selectors_launch_nothing() {
    let reducer = reducer(1024);
    let ledger = reducer.device().ledger();
    for selector in [4, 5, 100, u32::MAX] {
        assert!(matches!(
            reducer.reduce(&[1; 64], 64, selector, 1),
            Err(ReduceError::UnknownStrategy(s)) if s == selector
        ));
    }
    assert_eq!(ledger.launches(), 0);
    assert_eq!(ledger.allocations(), ledger.releases());
    assert_eq!(ledger.live_elements(), 0);
}

#[test]
fn largest_two_stage_input() {
    let threads = 32;
    for strategy in Strategy::ALL {
        let len = LaunchPlan::max_len(threads, strategy);
        let xs = vec![1; len];
        let report = reducer(threads)
            .reduce(&xs, len as i32, strategy.selector(), 1)
            .unwrap();
        assert!(report.matches(), "{strategy:?}");
        assert_eq!(report.plan.stage1.grid, threads);

        assert!(matches!(
            reducer(threads).reduce(&vec![1; 2 * len], 2 * len as i32, strategy.selector(), 1),
            Err(ReduceError::TooManyBlocks { .. })
        ));
    }
}
