//! Property-based tests for delta extraction and window smoothing
//!
//! Properties covered:
//! 1. Deltas reproduce the cumulative stream for any monotonic reads
//! 2. Windows hold exactly the most recent min(k, N) samples
//! 3. Full and partial weighted averages match the closed form

mod utils;

use nix::unistd::Pid;
use proptest::prelude::*;
use utils::ScriptedBackend;
use walkmon::counter::Metric;
use walkmon::group::CounterGroup;
use walkmon::window::{SlidingWindow, WeightVector};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_deltas_match_monotonic_reads(deltas in prop::collection::vec(0u64..1 << 40, 1..40)) {
        let mut backend = ScriptedBackend::new().script(Metric::Cycles, deltas.clone());
        let mut group =
            CounterGroup::open(&[Metric::Cycles.spec()], Pid::from_raw(1), &mut backend).unwrap();
        group.enable().unwrap();

        for expected in &deltas {
            let read = group.read_all().unwrap();
            prop_assert_eq!(read, vec![*expected]);
        }

        // No further activity: repeated reads yield zero, not the last delta.
        prop_assert_eq!(group.read_all().unwrap(), vec![0]);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_window_holds_most_recent(
        capacity in 1usize..16,
        samples in prop::collection::vec(any::<u32>(), 0..64),
    ) {
        let mut window = SlidingWindow::new(capacity);
        for &s in &samples {
            window.push(u64::from(s));
        }

        let kept = samples.len().min(capacity);
        prop_assert_eq!(window.filled(), kept);

        let expected: Vec<u64> = samples[samples.len() - kept..]
            .iter()
            .map(|&s| u64::from(s))
            .collect();
        prop_assert_eq!(window.iter().collect::<Vec<_>>(), expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_weighted_average_uses_first_c_weights(
        weights in prop::collection::vec(0.5f64..10.0, 1..10),
        fill in 1usize..10,
        seed in prop::collection::vec(0u64..1_000_000, 10),
    ) {
        let capacity = weights.len();
        let samples = &seed[..fill.min(capacity)];
        let weight_vector = WeightVector::new(weights.clone()).unwrap();

        let mut window = SlidingWindow::new(capacity);
        for &s in samples {
            window.push(s);
        }

        let applied = &weights[..samples.len()];
        let expected = samples
            .iter()
            .zip(applied)
            .map(|(&s, &w)| s as f64 * w)
            .sum::<f64>()
            / applied.iter().sum::<f64>();

        let actual = window.weighted_average(&weight_vector);
        prop_assert!((actual - expected).abs() <= expected.abs() * 1e-9 + 1e-9);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_weighted_average_within_sample_range(
        samples in prop::collection::vec(0u64..1_000_000, 1..20),
    ) {
        let capacity = 5;
        let mut window = SlidingWindow::new(capacity);
        for &s in &samples {
            window.push(s);
        }

        let avg = window.weighted_average(&WeightVector::ascending(capacity));
        let min = window.iter().min().unwrap() as f64;
        let max = window.iter().max().unwrap() as f64;
        prop_assert!(avg >= min - 1e-6 && avg <= max + 1e-6);
    }
}
