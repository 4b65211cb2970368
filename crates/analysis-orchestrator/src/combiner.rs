use analysis_core::{ModuleResult, Signal};
use std::collections::BTreeMap;

pub const NO_RESULTS_REASON: &str = "No analysis results available";

/// Provisional direction produced from the weighted module results
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedSignal {
    pub signal: Signal,
    /// Winning normalized score, or the larger of the two when no side wins
    pub strength: f64,
    pub long_score: f64,
    pub short_score: f64,
    pub norm_long: f64,
    pub norm_short: f64,
    pub total_weight: f64,
    pub modules_scored: usize,
    /// One line per module, in module-name order
    pub reasons: Vec<String>,
}

impl CombinedSignal {
    fn empty(reasons: Vec<String>) -> Self {
        let mut reasons = reasons;
        reasons.push(NO_RESULTS_REASON.to_string());
        Self {
            signal: Signal::Hold,
            strength: 0.0,
            long_score: 0.0,
            short_score: 0.0,
            norm_long: 0.0,
            norm_short: 0.0,
            total_weight: 0.0,
            modules_scored: 0,
            reasons,
        }
    }
}

/// Weighted vote over module results.
///
/// Only healthy, well-formed results with a positive weight are scored, and
/// only their weights enter the denominator. A side wins when its normalized
/// score is strictly above both the other side and `threshold`.
pub fn combine_signals(
    results: &BTreeMap<String, ModuleResult>,
    weights: &BTreeMap<String, f64>,
    threshold: f64,
) -> CombinedSignal {
    let mut long_score = 0.0;
    let mut short_score = 0.0;
    let mut total_weight = 0.0;
    let mut modules_scored = 0;
    let mut reasons = Vec::with_capacity(results.len());

    for (name, result) in results {
        let weight = weights.get(name).copied().unwrap_or(0.0);
        if !(weight > 0.0) {
            continue;
        }
        if !result.is_well_formed() {
            tracing::warn!("Skipping {}: malformed result (score {}, contrib {})", name, result.score(), result.contrib());
            reasons.push(format!("{}: skipped, malformed result", name));
            continue;
        }
        if !result.is_ok() {
            reasons.push(format!("{}: skipped, {:?} - {}", name, result.status(), result.reason()));
            continue;
        }

        let score = result.score();
        match result.state().direction() {
            Some(Signal::Long) => long_score += score * weight,
            Some(Signal::Short) => short_score += score * weight,
            _ => {}
        }
        total_weight += weight;
        modules_scored += 1;
        reasons.push(format!("{}: {} ({:.2})", name, result.state().label(), score));
    }

    if modules_scored == 0 {
        return CombinedSignal::empty(reasons);
    }

    let norm_long = long_score / total_weight;
    let norm_short = short_score / total_weight;

    let (signal, strength) = if norm_long > norm_short && norm_long > threshold {
        (Signal::Long, norm_long)
    } else if norm_short > norm_long && norm_short > threshold {
        (Signal::Short, norm_short)
    } else {
        (Signal::Hold, norm_long.max(norm_short))
    };

    CombinedSignal {
        signal,
        strength,
        long_score,
        short_score,
        norm_long,
        norm_short,
        total_weight,
        modules_scored,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::SignalState;
    use proptest::prelude::*;

    fn results(entries: &[(&str, ModuleResult)]) -> BTreeMap<String, ModuleResult> {
        entries
            .iter()
            .map(|(name, r)| (name.to_string(), r.clone()))
            .collect()
    }

    fn weights(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(n, w)| (n.to_string(), *w)).collect()
    }

    #[test]
    fn test_single_long_module() {
        let r = results(&[("a", ModuleResult::ok(SignalState::Long, 0.8, 0.8, "x"))]);
        let combined = combine_signals(&r, &weights(&[("a", 1.0)]), 0.3);

        assert_eq!(combined.signal, Signal::Long);
        assert!((combined.norm_long - 0.8).abs() < 1e-12);
        assert!((combined.strength - 0.8).abs() < 1e-12);
        assert_eq!(combined.reasons, vec!["a: LONG (0.80)".to_string()]);
    }

    #[test]
    fn test_equal_disagreement_is_hold() {
        let r = results(&[
            ("a", ModuleResult::ok(SignalState::Long, 0.5, 0.25, "x")),
            ("b", ModuleResult::ok(SignalState::Short, 0.5, 0.25, "y")),
        ]);
        let combined = combine_signals(&r, &weights(&[("a", 0.5), ("b", 0.5)]), 0.3);

        assert_eq!(combined.norm_long, combined.norm_short);
        assert_eq!(combined.signal, Signal::Hold);
        assert_eq!(combined.reasons.len(), 2);
    }

    #[test]
    fn test_no_results() {
        let combined = combine_signals(&BTreeMap::new(), &weights(&[("a", 1.0)]), 0.3);
        assert_eq!(combined.signal, Signal::Hold);
        assert_eq!(combined.strength, 0.0);
        assert_eq!(combined.reasons, vec![NO_RESULTS_REASON.to_string()]);
    }

    #[test]
    fn test_zero_weights_is_no_results() {
        let r = results(&[("a", ModuleResult::ok(SignalState::Long, 0.9, 0.0, "x"))]);
        let combined = combine_signals(&r, &weights(&[("a", 0.0)]), 0.3);
        assert_eq!(combined.signal, Signal::Hold);
        assert_eq!(combined.reasons, vec![NO_RESULTS_REASON.to_string()]);
    }

    #[test]
    fn test_failed_modules_do_not_dilute() {
        let r = results(&[
            ("a", ModuleResult::ok(SignalState::Long, 0.8, 0.8, "x")),
            ("b", ModuleResult::error("boom")),
        ]);
        let combined = combine_signals(&r, &weights(&[("a", 0.5), ("b", 0.5)]), 0.3);

        assert_eq!(combined.total_weight, 0.5);
        assert_eq!(combined.modules_scored, 1);
        assert!((combined.norm_long - 0.8).abs() < 1e-12);
        assert_eq!(combined.signal, Signal::Long);
        assert!(combined.reasons[1].starts_with("b: skipped"));
    }

    #[test]
    fn test_hold_modules_count_in_denominator() {
        let r = results(&[
            ("a", ModuleResult::ok(SignalState::Long, 0.8, 0.4, "x")),
            ("b", ModuleResult::hold("nothing")),
        ]);
        let combined = combine_signals(&r, &weights(&[("a", 0.5), ("b", 0.5)]), 0.3);

        assert!((combined.norm_long - 0.4).abs() < 1e-12);
        assert_eq!(combined.signal, Signal::Long);
        assert_eq!(combined.reasons[1], "b: HOLD (0.00)");
    }

    #[test]
    fn test_below_threshold_reports_max() {
        let r = results(&[("a", ModuleResult::ok(SignalState::Short, 0.25, 0.25, "x"))]);
        let combined = combine_signals(&r, &weights(&[("a", 1.0)]), 0.3);
        assert_eq!(combined.signal, Signal::Hold);
        assert!((combined.strength - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_strict() {
        let r = results(&[("a", ModuleResult::ok(SignalState::Long, 0.3, 0.3, "x"))]);
        let combined = combine_signals(&r, &weights(&[("a", 1.0)]), 0.3);
        assert_eq!(combined.signal, Signal::Hold);
    }

    #[test]
    fn test_up_down_states_vote() {
        let r = results(&[("a", ModuleResult::ok(SignalState::Down, 0.9, 0.9, "x"))]);
        let combined = combine_signals(&r, &weights(&[("a", 1.0)]), 0.3);
        assert_eq!(combined.signal, Signal::Short);
    }

    #[test]
    fn test_malformed_result_skipped() {
        let malformed: ModuleResult = serde_json::from_str(
            r#"{"status":"OK","state":"LONG","score":7.5,"contrib":0.5,"reason":"bad"}"#,
        )
        .unwrap();
        let r = results(&[
            ("a", malformed),
            ("b", ModuleResult::ok(SignalState::Short, 0.6, 0.6, "y")),
        ]);
        let combined = combine_signals(&r, &weights(&[("a", 1.0), ("b", 1.0)]), 0.3);

        assert_eq!(combined.signal, Signal::Short);
        assert_eq!(combined.total_weight, 1.0);
        assert_eq!(combined.reasons[0], "a: skipped, malformed result");
    }

    fn arb_state() -> impl Strategy<Value = SignalState> {
        prop_oneof![
            Just(SignalState::Long),
            Just(SignalState::Short),
            Just(SignalState::Hold),
            Just(SignalState::Up),
            Just(SignalState::Down),
            Just(SignalState::Neutral),
        ]
    }

    proptest! {
        #[test]
        fn prop_combiner_is_deterministic(
            entries in prop::collection::vec((arb_state(), 0.0f64..=1.0, 0.0f64..=1.0), 0..8),
            threshold in 0.0f64..=1.0,
        ) {
            let r: BTreeMap<String, ModuleResult> = entries
                .iter()
                .enumerate()
                .map(|(i, (s, score, _))| (format!("m{}", i), ModuleResult::ok(*s, *score, *score, "p")))
                .collect();
            let w: BTreeMap<String, f64> = entries
                .iter()
                .enumerate()
                .map(|(i, (_, _, weight))| (format!("m{}", i), *weight))
                .collect();

            let first = combine_signals(&r, &w, threshold);
            let second = combine_signals(&r, &w, threshold);
            prop_assert_eq!(&first, &second);
            prop_assert!(first.norm_long >= 0.0 && first.norm_long <= 1.0 + 1e-9);
            prop_assert!(first.norm_short >= 0.0 && first.norm_short <= 1.0 + 1e-9);
            if first.signal != Signal::Hold {
                prop_assert!(first.strength > threshold);
            }
        }
    }
}
