use analysis_core::{Bar, WeeklyTailParams};
use serde::{Deserialize, Serialize};

/// Prevailing multi-week trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendRegime {
    /// Price rose at least the bull threshold over the look-back
    Bull,
    /// Price fell at least the bear threshold over the look-back
    Bear,
    /// Anything in between, or not enough history to tell
    Neutral,
}

impl TrendRegime {
    pub fn name(&self) -> &'static str {
        match self {
            TrendRegime::Bull => "BULL",
            TrendRegime::Bear => "BEAR",
            TrendRegime::Neutral => "NEUTRAL",
        }
    }
}

/// Regime detection result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeDetectionResult {
    pub regime: TrendRegime,
    /// Fractional close-to-close change over the look-back, when computable
    pub price_change: Option<f64>,
    pub lookback: usize,
    pub reasoning: String,
}

/// Classifies BULL / BEAR / NEUTRAL from the close-to-close change over a
/// fixed look-back, using only bars up to the as-of index.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendRegimeDetector {
    lookback: usize,
    bull_threshold: f64,
    bear_threshold: f64,
}

impl TrendRegimeDetector {
    pub fn new(lookback: usize, bull_threshold: f64, bear_threshold: f64) -> Self {
        Self {
            lookback,
            bull_threshold,
            bear_threshold,
        }
    }

    pub fn from_params(params: &WeeklyTailParams) -> Self {
        Self::new(
            params.lookback_weeks,
            params.bull_market_threshold,
            params.bear_market_threshold,
        )
    }

    /// Classify the regime as of bar `as_of` (inclusive).
    pub fn detect(&self, bars: &[Bar], as_of: usize) -> RegimeDetectionResult {
        if self.lookback == 0 || as_of >= bars.len() || as_of < self.lookback {
            return RegimeDetectionResult {
                regime: TrendRegime::Neutral,
                price_change: None,
                lookback: self.lookback,
                reasoning: format!(
                    "Insufficient data: {} bars up to index {} (need {})",
                    (as_of + 1).min(bars.len()),
                    as_of,
                    self.lookback + 1
                ),
            };
        }

        let start = bars[as_of - self.lookback].close;
        let end = bars[as_of].close;
        if !(start > 0.0) || !end.is_finite() {
            return RegimeDetectionResult {
                regime: TrendRegime::Neutral,
                price_change: None,
                lookback: self.lookback,
                reasoning: "Invalid closes in look-back window".to_string(),
            };
        }

        let change = end / start - 1.0;
        let regime = self.classify(change);

        tracing::debug!(
            "Trend regime {} over {} bars (change {:.2}%)",
            regime.name(),
            self.lookback,
            change * 100.0
        );

        RegimeDetectionResult {
            regime,
            price_change: Some(change),
            lookback: self.lookback,
            reasoning: format!(
                "{} ({:+.2}% over {} bars)",
                regime.name(),
                change * 100.0,
                self.lookback
            ),
        }
    }

    /// Regime for a known fractional change
    pub fn classify(&self, change: f64) -> TrendRegime {
        if change >= self.bull_threshold {
            TrendRegime::Bull
        } else if change <= self.bear_threshold {
            TrendRegime::Bear
        } else {
            TrendRegime::Neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::weeks(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_bull_bear_neutral() {
        let detector = TrendRegimeDetector::new(4, 0.10, -0.10);

        let up = bars_from_closes(&[100.0, 102.0, 105.0, 108.0, 112.0]);
        assert_eq!(detector.detect(&up, 4).regime, TrendRegime::Bull);

        let down = bars_from_closes(&[100.0, 97.0, 95.0, 92.0, 89.0]);
        assert_eq!(detector.detect(&down, 4).regime, TrendRegime::Bear);

        let flat = bars_from_closes(&[100.0, 101.0, 99.0, 102.0, 103.0]);
        assert_eq!(detector.detect(&flat, 4).regime, TrendRegime::Neutral);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let detector = TrendRegimeDetector::new(1, 0.10, -0.10);
        assert_eq!(detector.classify(0.10), TrendRegime::Bull);
        assert_eq!(detector.classify(-0.10), TrendRegime::Bear);
        assert_eq!(detector.classify(0.0999), TrendRegime::Neutral);
    }

    #[test]
    fn test_insufficient_history_is_neutral() {
        let detector = TrendRegimeDetector::new(8, 0.10, -0.10);
        let bars = bars_from_closes(&[100.0, 150.0, 200.0]);
        let result = detector.detect(&bars, 2);

        assert_eq!(result.regime, TrendRegime::Neutral);
        assert!(result.price_change.is_none());
        assert!(result.reasoning.contains("Insufficient data"));
    }

    #[test]
    fn test_ignores_bars_after_as_of() {
        let detector = TrendRegimeDetector::new(2, 0.10, -0.10);
        let bars = bars_from_closes(&[100.0, 101.0, 102.0, 300.0]);
        assert_eq!(detector.detect(&bars, 2).regime, TrendRegime::Neutral);
    }
}
