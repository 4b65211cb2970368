use analysis_core::{
    AnalysisContext, AnalysisError, Analyzer, CandleTable, ModuleResult, SignalState, FIBONACCI,
};

/// Swing measured over the recent weekly window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swing {
    pub high: f64,
    pub low: f64,
    /// Low printed before the high
    pub upward: bool,
}

impl Swing {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Price at retracement `ratio` of the swing
    pub fn retracement(&self, ratio: f64) -> f64 {
        if self.upward {
            self.high - ratio * self.range()
        } else {
            self.low + ratio * self.range()
        }
    }
}

/// Highest high and lowest low of the window, with their order.
pub fn find_swing(bars: &[analysis_core::Bar]) -> Option<Swing> {
    let (high_idx, high) = bars
        .iter()
        .enumerate()
        .map(|(i, b)| (i, b.high))
        .fold(None, |best: Option<(usize, f64)>, (i, h)| match best {
            Some((_, bh)) if bh >= h => best,
            _ => Some((i, h)),
        })?;
    let (low_idx, low) = bars
        .iter()
        .enumerate()
        .map(|(i, b)| (i, b.low))
        .fold(None, |best: Option<(usize, f64)>, (i, l)| match best {
            Some((_, bl)) if bl <= l => best,
            _ => Some((i, l)),
        })?;

    Some(Swing {
        high,
        low,
        upward: low_idx < high_idx,
    })
}

/// Retracement-level analyzer: a pullback into a Fibonacci level of an
/// up-swing is a LONG, a bounce into one of a down-swing a SHORT.
#[derive(Debug, Default, Clone, Copy)]
pub struct FibonacciAnalyzer;

impl FibonacciAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for FibonacciAnalyzer {
    fn name(&self) -> &'static str {
        FIBONACCI
    }

    fn evaluate(
        &self,
        daily: &CandleTable,
        weekly: &CandleTable,
        ctx: &AnalysisContext<'_>,
    ) -> Result<ModuleResult, AnalysisError> {
        let params = &ctx.config.thresholds.fibonacci;
        let ts = ctx.analysis_timestamp;
        if !weekly.validate_no_lookahead(ts) || !daily.validate_no_lookahead(ts) {
            return Err(AnalysisError::LookAhead(
                "candle table extends past analysis time".to_string(),
            ));
        }
        if !weekly.is_closed_at(ts) || !daily.is_closed_at(ts) {
            return Err(AnalysisError::LookAhead(
                "candle still open at analysis time".to_string(),
            ));
        }
        if weekly.len() < params.swing_weeks {
            return Err(AnalysisError::InsufficientData(format!(
                "Need at least {} weekly bars for swing detection, have {}",
                params.swing_weeks,
                weekly.len()
            )));
        }

        let window = &weekly.bars()[weekly.len() - params.swing_weeks..];
        let swing = find_swing(window)
            .ok_or_else(|| AnalysisError::CalculationError("no swing found".to_string()))?;
        if swing.range() <= 0.0 {
            return Ok(ModuleResult::hold("Flat swing, no retracement levels"));
        }

        let price = daily
            .last_close()
            .or_else(|| weekly.last_close())
            .ok_or_else(|| AnalysisError::InsufficientData("no closing price".to_string()))?;

        let nearest = params
            .levels
            .iter()
            .map(|&ratio| {
                let level = swing.retracement(ratio);
                (ratio, level, (price - level).abs() / swing.range())
            })
            .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

        let (ratio, level, distance) = match nearest {
            Some(n) => n,
            None => return Ok(ModuleResult::hold("No retracement levels configured")),
        };

        let result = if distance <= params.tolerance {
            let score = 0.5 + 0.5 * (1.0 - distance / params.tolerance.max(f64::EPSILON));
            let contrib = score * ctx.module_weight(FIBONACCI);
            let (state, side) = if swing.upward {
                (SignalState::Long, "support")
            } else {
                (SignalState::Short, "resistance")
            };
            ModuleResult::ok(
                state,
                score,
                contrib,
                format!("Price {:.2} at {:.1}% retracement {} {:.2}", price, ratio * 100.0, side, level),
            )
        } else {
            ModuleResult::hold(format!(
                "Price {:.2} not at a retracement level (nearest {:.1}% at {:.2})",
                price,
                ratio * 100.0,
                level
            ))
        };

        Ok(result
            .with_meta("swing_high", swing.high)
            .with_meta("swing_low", swing.low)
            .with_meta("upward", swing.upward)
            .with_meta("nearest_level", level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{Bar, EngineConfig, ModuleStatus, Timeframe};
    use chrono::{Duration, TimeZone, Utc};

    fn weekly(closes: &[f64]) -> CandleTable {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::weeks(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000.0,
            })
            .collect();
        CandleTable::new(Timeframe::Week1, bars).unwrap()
    }

    fn run(table: &CandleTable) -> ModuleResult {
        let mut config = EngineConfig::default();
        config.thresholds.fibonacci.swing_weeks = 5;
        let ts = table.last().unwrap().timestamp + Duration::weeks(1);
        let ctx = AnalysisContext::new(&config, ts);
        FibonacciAnalyzer::new().analyze(&CandleTable::empty(Timeframe::Day1), table, &ctx)
    }

    #[test]
    fn test_swing_direction() {
        let table = weekly(&[100.0, 120.0, 200.0, 150.0]);
        let swing = find_swing(table.bars()).unwrap();
        assert!(swing.upward);
        assert_eq!(swing.range(), 100.0);
        assert!((swing.retracement(0.5) - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_pullback_in_upswing_is_long() {
        // 100 -> 200, pulled back to the 50% level
        let result = run(&weekly(&[100.0, 140.0, 200.0, 170.0, 150.0]));
        assert_eq!(result.state(), SignalState::Long);
        assert!((result.score() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounce_in_downswing_is_short() {
        let result = run(&weekly(&[200.0, 160.0, 100.0, 130.0, 138.2]));
        assert_eq!(result.state(), SignalState::Short);
    }

    #[test]
    fn test_away_from_levels_is_hold() {
        let result = run(&weekly(&[100.0, 140.0, 200.0, 195.0, 190.0]));
        assert_eq!(result.state(), SignalState::Hold);
        assert_eq!(result.contrib(), 0.0);
    }

    #[test]
    fn test_insufficient_weeks() {
        let result = run(&weekly(&[100.0, 110.0]));
        assert_eq!(result.status(), ModuleStatus::Error);
    }

    #[test]
    fn test_open_week_is_lookahead() {
        let table = weekly(&[100.0, 140.0, 200.0, 170.0, 150.0]);
        let mut config = EngineConfig::default();
        config.thresholds.fibonacci.swing_weeks = 5;
        let ts = table.last().unwrap().timestamp + Duration::days(3);
        let ctx = AnalysisContext::new(&config, ts);

        let result = FibonacciAnalyzer::new().analyze(&CandleTable::empty(Timeframe::Day1), &table, &ctx);
        assert_eq!(result.status(), ModuleStatus::Error);
        assert!(result.reason().contains("Look-ahead"));
    }
}
