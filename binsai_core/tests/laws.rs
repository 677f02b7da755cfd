//! Property tests for the classification, alert and filter laws.

use binsai_config::Thresholds;
use binsai_core::alert::{AlertContext, AlertDecision, AlertEngine};
use binsai_core::filter::RollingMean;
use binsai_core::{Capacity, WasteClass, classify, fill_percent};
use proptest::prelude::*;

fn ctx(now_ms: u64) -> AlertContext {
    AlertContext {
        now_ms,
        dialog_idle: true,
        gsm_ok: true,
    }
}

proptest! {
    #[test]
    fn fill_is_bounded(distance in -100.0f32..1000.0, height in 1.0f32..400.0) {
        let f = fill_percent(distance, height);
        prop_assert!((0.0..=100.0).contains(&f));
    }

    #[test]
    fn classification_is_pure_and_idempotent(fill in 0.0f32..=100.0, ppm in 0.0f32..=2000.0) {
        let a = classify(fill, ppm);
        let b = classify(a.fill_percent, a.ppm);
        prop_assert_eq!(a, b);
        prop_assert_eq!(a.priority, a.waste_class.priority());
        prop_assert_eq!(a.capacity, Capacity::from_fill(fill));
        prop_assert_eq!(a.waste_class, WasteClass::from_ppm(ppm));
    }

    /// A sustained critical condition fires exactly once.
    #[test]
    fn edge_triggered_once(steps in 1usize..200, fill in 90.5f32..=100.0, ppm in 801.0f32..2000.0) {
        let mut e = AlertEngine::new(&Thresholds::default(), 300_000);
        let fired = (0..steps)
            .filter(|i| matches!(e.evaluate(fill, ppm, ctx(*i as u64 * 2_000)), AlertDecision::Sms(_)))
            .count();
        prop_assert_eq!(fired, 1);
    }

    /// While fill stays at or above reset_below the latch never clears.
    #[test]
    fn rearm_requires_drop_below_reset(fills in prop::collection::vec(80.0f32..=100.0, 1..100)) {
        let mut e = AlertEngine::new(&Thresholds::default(), 0);
        e.evaluate(95.0, 900.0, ctx(0));
        prop_assert!(e.armed());
        for (i, f) in fills.iter().enumerate() {
            e.evaluate(*f, 900.0, ctx(i as u64 + 1));
            prop_assert!(e.armed());
        }
        e.evaluate(79.0, 900.0, ctx(1_000));
        prop_assert!(!e.armed());
    }

    /// Batches are separated by at least the cooldown, whatever the input.
    #[test]
    fn cooldown_respected(samples in prop::collection::vec((0.0f32..=100.0, 0.0f32..=2000.0), 1..300)) {
        let cooldown = 60_000;
        let mut e = AlertEngine::new(&Thresholds::default(), cooldown);
        let mut last: Option<u64> = None;
        for (i, (fill, ppm)) in samples.into_iter().enumerate() {
            let now = i as u64 * 2_000;
            if let AlertDecision::Sms(_) = e.evaluate(fill, ppm, ctx(now)) {
                if let Some(prev) = last {
                    prop_assert!(now - prev >= cooldown);
                }
                last = Some(now);
            }
        }
    }

    #[test]
    fn rolling_mean_stays_within_sample_range(
        samples in prop::collection::vec(prop::option::of(2.0f32..400.0), 1..50)
    ) {
        let mut f = RollingMean::<10>::new();
        for s in &samples {
            f.push(*s);
        }
        if let Some(m) = f.mean() {
            let held: Vec<f32> = f.samples().collect();
            let lo = held.iter().copied().fold(f32::INFINITY, f32::min);
            let hi = held.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            prop_assert!(m >= lo - 1e-3 && m <= hi + 1e-3);
            prop_assert!(held.len() <= 10);
        } else {
            prop_assert!(samples.iter().all(Option::is_none));
        }
    }
}
