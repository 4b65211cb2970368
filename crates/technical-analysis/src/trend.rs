use analysis_core::{
    AnalysisContext, AnalysisError, Analyzer, CandleTable, ModuleResult, SignalState, TREND,
};

use crate::indicators::sma;

/// Daily moving-average stack: price > fast > slow is an uptrend, the mirror
/// image a downtrend.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrendAnalyzer;

impl TrendAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for TrendAnalyzer {
    fn name(&self) -> &'static str {
        TREND
    }

    fn evaluate(
        &self,
        daily: &CandleTable,
        _weekly: &CandleTable,
        ctx: &AnalysisContext<'_>,
    ) -> Result<ModuleResult, AnalysisError> {
        let params = &ctx.config.thresholds.trend;
        if !daily.validate_no_lookahead(ctx.analysis_timestamp) {
            return Err(AnalysisError::LookAhead(
                "daily table extends past analysis time".to_string(),
            ));
        }
        if !daily.is_closed_at(ctx.analysis_timestamp) {
            return Err(AnalysisError::LookAhead(
                "daily candle still open at analysis time".to_string(),
            ));
        }
        if daily.len() < params.slow_period {
            return Err(AnalysisError::InsufficientData(format!(
                "Need at least {} daily bars for trend analysis, have {}",
                params.slow_period,
                daily.len()
            )));
        }

        let closes = daily.closes();
        let (fast, slow, price) = match (
            sma(&closes, params.fast_period).last(),
            sma(&closes, params.slow_period).last(),
            closes.last(),
        ) {
            (Some(&f), Some(&s), Some(&p)) if p > 0.0 => (f, s, p),
            _ => {
                return Err(AnalysisError::CalculationError(
                    "moving averages unavailable".to_string(),
                ))
            }
        };

        let spread = (fast - slow) / price;
        let score = (0.5 + spread.abs() / (10.0 * params.min_spread)).min(1.0);
        let weight = ctx.module_weight(TREND);

        let result = if price > fast && fast > slow && spread >= params.min_spread {
            ModuleResult::ok(
                SignalState::Long,
                score,
                score * weight,
                format!("Uptrend: price above SMA{} above SMA{} (spread {:.2}%)",
                    params.fast_period, params.slow_period, spread * 100.0),
            )
        } else if price < fast && fast < slow && -spread >= params.min_spread {
            ModuleResult::ok(
                SignalState::Short,
                score,
                score * weight,
                format!("Downtrend: price below SMA{} below SMA{} (spread {:.2}%)",
                    params.fast_period, params.slow_period, spread * 100.0),
            )
        } else {
            ModuleResult::hold(format!("No clear trend (spread {:.2}%)", spread * 100.0))
        };

        Ok(result
            .with_meta("sma_fast", fast)
            .with_meta("sma_slow", slow)
            .with_meta("spread", spread))
    }
}
