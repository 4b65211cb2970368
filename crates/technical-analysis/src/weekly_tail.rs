//! Weekly lower-wick (tail) strength engine.
//!
//! A week qualifies when its candle rejected the downside: a long lower
//! wick, measured against the ATR of the weeks before it, on a bullish
//! body that closed in the upper part of its range. Every rolling statistic
//! is taken as of the previous week so the evaluated candle never feeds its
//! own normalization.

use analysis_core::{
    AnalysisContext, AnalysisError, Analyzer, Bar, CandleTable, ModuleResult, SignalState,
    WeeklyTailParams, WEEKLY_TAIL,
};
use market_regime_detector::{TrendRegime, TrendRegimeDetector};
use serde::Serialize;

use crate::indicators::{mean_before, shifted_atr, shifted_sma};

/// Strength value that maps to full confidence
pub const MAX_TAIL_STRENGTH: f64 = 5.0;
/// Multiplier applied to LONG tails in a BEAR regime
pub const BEAR_DAMPENING: f64 = 0.7;
/// Lower wick must reach this fraction of the high
const WICK_NOISE_FLOOR: f64 = 0.01;
const EPSILON_SCALE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TailState {
    Long,
    Hold,
}

/// Why a week produced no signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    InvalidCandle,
    InsufficientHistory,
    NonPositiveAtr,
    NumericOverflow,
    WickTooSmall,
    FailedValidation,
    NotBullishTail,
    DampenedBelowThreshold,
}

impl Rejection {
    /// Not enough history to measure the week. Every other rejection is a
    /// HOLD with zero strength.
    pub fn is_missing_data(&self) -> bool {
        matches!(self, Rejection::InsufficientHistory)
    }
}

/// Per-week measurements. Built for one evaluation and dropped with it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TailCandidate {
    pub body: f64,
    pub lower_wick: f64,
    pub upper_wick: f64,
    pub atr: f64,
    pub vol_sma: f64,
    pub tail_ratio: f64,
    pub body_factor: f64,
    pub vol_factor: f64,
    pub tail_strength: f64,
    pub body_atr: f64,
    pub close_position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TailSignal {
    pub state: TailState,
    pub strength: f64,
    pub confidence: f64,
    pub reason: String,
    pub regime: TrendRegime,
    pub candidate: Option<TailCandidate>,
    pub rejection: Option<Rejection>,
}

impl TailSignal {
    fn empty(rejection: Rejection, reason: String, candidate: Option<TailCandidate>) -> Self {
        Self {
            state: TailState::Hold,
            strength: 0.0,
            confidence: 0.0,
            reason,
            regime: TrendRegime::Neutral,
            candidate,
            rejection: Some(rejection),
        }
    }

    pub fn is_long(&self) -> bool {
        self.state == TailState::Long
    }
}

fn confidence_for(strength: f64) -> f64 {
    (strength / MAX_TAIL_STRENGTH).min(1.0)
}

/// Measure week `t` against the weeks before it. Returns the candidate or
/// the empty signal explaining why none could be built.
pub fn build_candidate(
    bars: &[Bar],
    t: usize,
    params: &WeeklyTailParams,
) -> Result<TailCandidate, TailSignal> {
    let bar = bars.get(t).ok_or_else(|| {
        TailSignal::empty(
            Rejection::InsufficientHistory,
            format!("No weekly candle at index {}", t),
            None,
        )
    })?;

    let (open, high, low, close, volume) = (bar.open, bar.high, bar.low, bar.close, bar.volume);
    let prices_ok = [open, high, low, close].iter().all(|v| v.is_finite() && *v > 0.0);
    if !prices_ok || !volume.is_finite() || volume <= 0.0 {
        return Err(TailSignal::empty(
            Rejection::InvalidCandle,
            "Invalid candle data: non-positive price or volume".to_string(),
            None,
        ));
    }

    let body = bar.body();
    let lower_wick = bar.lower_wick();
    let upper_wick = bar.upper_wick();
    let noise_floor = WICK_NOISE_FLOOR * high;
    if lower_wick <= 0.0 || lower_wick < noise_floor {
        return Err(TailSignal::empty(
            Rejection::WickTooSmall,
            format!(
                "Lower wick too small: {:.4} (noise floor {:.4})",
                lower_wick.max(0.0),
                noise_floor
            ),
            None,
        ));
    }

    let atr = shifted_atr(bars, t, params.atr_period).ok_or_else(|| {
        TailSignal::empty(
            Rejection::InsufficientHistory,
            format!(
                "Insufficient history for ATR: need {} prior weeks, have {}",
                params.atr_period, t
            ),
            None,
        )
    })?;
    if !(atr > 0.0) {
        return Err(TailSignal::empty(
            Rejection::NonPositiveAtr,
            format!("Non-positive ATR ({})", atr),
            None,
        ));
    }

    let volumes: Vec<f64> = bars[..t].iter().map(|b| b.volume).collect();
    let vol_sma = shifted_sma(&volumes, t, params.volume_ma_period)
        .or_else(|| mean_before(&volumes, t))
        .unwrap_or(volume);

    let epsilon = EPSILON_SCALE * close;
    let atr_guarded = atr.max(epsilon);
    let tail_ratio = lower_wick / atr_guarded;
    let body_atr = body / atr_guarded;
    let body_factor = 1.0 - 0.5 * body_atr.min(1.0);
    let vol_factor = (volume / vol_sma.max(epsilon)).clamp(0.5, 2.0);
    let tail_strength = tail_ratio * body_factor * vol_factor;
    let close_position = (close - low) / (high - low).max(epsilon);

    let candidate = TailCandidate {
        body,
        lower_wick,
        upper_wick,
        atr,
        vol_sma,
        tail_ratio,
        body_factor,
        vol_factor,
        tail_strength,
        body_atr,
        close_position,
    };

    if !tail_strength.is_finite() || !close_position.is_finite() {
        return Err(TailSignal::empty(
            Rejection::NumericOverflow,
            format!("Numeric overflow computing tail strength ({})", tail_strength),
            Some(candidate),
        ));
    }

    Ok(candidate)
}

/// Names of the validation rules the candidate fails
pub fn failed_checks(candidate: &TailCandidate, params: &WeeklyTailParams) -> Vec<String> {
    let mut failed = Vec::new();
    if candidate.tail_ratio < params.min_tail_ratio {
        failed.push(format!(
            "tail_ratio {:.2} < {:.2}",
            candidate.tail_ratio, params.min_tail_ratio
        ));
    }
    if candidate.tail_strength < params.min_tail_strength {
        failed.push(format!(
            "tail_strength {:.2} < {:.2}",
            candidate.tail_strength, params.min_tail_strength
        ));
    }
    if candidate.body_atr > params.max_body_atr {
        failed.push(format!(
            "body/ATR {:.2} > {:.2}",
            candidate.body_atr, params.max_body_atr
        ));
    }
    if candidate.close_position < params.min_close_pos {
        failed.push(format!(
            "close_position {:.2} < {:.2}",
            candidate.close_position, params.min_close_pos
        ));
    }
    failed
}

/// Evaluate week `t` without any regime adjustment.
pub fn evaluate_week(bars: &[Bar], t: usize, params: &WeeklyTailParams) -> TailSignal {
    let candidate = match build_candidate(bars, t, params) {
        Ok(c) => c,
        Err(empty) => return empty,
    };

    let failed = failed_checks(&candidate, params);
    if !failed.is_empty() {
        return TailSignal::empty(
            Rejection::FailedValidation,
            format!("Tail validation failed: {}", failed.join("; ")),
            Some(candidate),
        );
    }

    let bar = &bars[t];
    if !bar.is_bullish() || candidate.lower_wick <= candidate.upper_wick {
        return TailSignal::empty(
            Rejection::NotBullishTail,
            "Not a bullish lower-wick candle".to_string(),
            Some(candidate),
        );
    }

    TailSignal {
        state: TailState::Long,
        strength: candidate.tail_strength,
        confidence: confidence_for(candidate.tail_strength),
        reason: format!(
            "Bullish lower-wick rejection: strength {:.2}, tail/ATR {:.2}",
            candidate.tail_strength, candidate.tail_ratio
        ),
        regime: TrendRegime::Neutral,
        candidate: Some(candidate),
        rejection: None,
    }
}

/// Scale a LONG signal by the prevailing regime. Non-LONG signals pass
/// through untouched apart from the recorded regime.
pub fn apply_regime_weighting(
    mut signal: TailSignal,
    regime: TrendRegime,
    params: &WeeklyTailParams,
) -> TailSignal {
    signal.regime = regime;
    if !signal.is_long() {
        return signal;
    }

    match regime {
        TrendRegime::Bull => {
            let amp = params.long_tail_amplification;
            signal.strength = (signal.strength * amp).min(MAX_TAIL_STRENGTH);
            signal.confidence = (signal.confidence * amp).min(1.0);
        }
        TrendRegime::Bear => {
            signal.strength *= BEAR_DAMPENING;
            signal.confidence *= BEAR_DAMPENING;
            if signal.strength < params.min_tail_strength {
                let candidate = signal.candidate;
                let mut dampened = TailSignal::empty(
                    Rejection::DampenedBelowThreshold,
                    format!(
                        "Tail strength {:.2} below {:.2} after BEAR dampening",
                        signal.strength, params.min_tail_strength
                    ),
                    candidate,
                );
                dampened.regime = regime;
                return dampened;
            }
        }
        TrendRegime::Neutral => {}
    }

    signal.reason = format!("{} ({} regime)", signal.reason, regime.name());
    signal
}

/// Full evaluation of week `t`: shape, validation, then regime weighting
/// when enabled. The regime only sees weeks up to `t`.
pub fn evaluate_with_regime(bars: &[Bar], t: usize, params: &WeeklyTailParams) -> TailSignal {
    let signal = evaluate_week(bars, t, params);
    if !params.trend_weighting {
        return signal;
    }
    let regime = TrendRegimeDetector::from_params(params).detect(bars, t).regime;
    apply_regime_weighting(signal, regime, params)
}

/// Evaluate every week of the table, oldest first.
pub fn scan_weekly_tails(bars: &[Bar], params: &WeeklyTailParams) -> Vec<(usize, TailSignal)> {
    (0..bars.len())
        .map(|t| (t, evaluate_with_regime(bars, t, params)))
        .collect()
}

/// Weekly-tail module: evaluates the most recent closed weekly candle.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeeklyTailAnalyzer;

impl WeeklyTailAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Weekly close must be positive and, when daily data exists, within
    /// `max_price_deviation` of the latest daily close.
    fn price_level_ok(weekly_close: f64, daily: &CandleTable, params: &WeeklyTailParams) -> bool {
        if !(weekly_close > 0.0) || !weekly_close.is_finite() {
            return false;
        }
        match daily.last_close() {
            Some(daily_close) if daily_close > 0.0 => {
                ((weekly_close - daily_close) / daily_close).abs() <= params.max_price_deviation
            }
            Some(_) => false,
            None => true,
        }
    }
}

impl Analyzer for WeeklyTailAnalyzer {
    fn name(&self) -> &'static str {
        WEEKLY_TAIL
    }

    fn evaluate(
        &self,
        daily: &CandleTable,
        weekly: &CandleTable,
        ctx: &AnalysisContext<'_>,
    ) -> Result<ModuleResult, AnalysisError> {
        let params = &ctx.config.thresholds.weekly_tail;
        let bars = weekly.bars();
        let t = bars.len().checked_sub(1).ok_or_else(|| {
            AnalysisError::InsufficientData("no weekly candles".to_string())
        })?;

        if !weekly.validate_no_lookahead(ctx.analysis_timestamp) {
            return Err(AnalysisError::LookAhead(format!(
                "weekly candle {} is after analysis time {}",
                bars[t].timestamp, ctx.analysis_timestamp
            )));
        }
        if !weekly.is_closed_at(ctx.analysis_timestamp) || !daily.is_closed_at(ctx.analysis_timestamp) {
            return Err(AnalysisError::LookAhead(format!(
                "candle still open at analysis time {}",
                ctx.analysis_timestamp
            )));
        }

        let signal = evaluate_with_regime(bars, t, params);
        tracing::debug!("weekly tail at {}: {:?} ({})", bars[t].timestamp, signal.state, signal.reason);

        if signal.rejection.is_some_and(|r| r.is_missing_data()) {
            return Err(AnalysisError::InsufficientData(signal.reason));
        }

        let mut result = if signal.is_long() && Self::price_level_ok(bars[t].close, daily, params) {
            let score = signal.confidence;
            let contrib = score * ctx.module_weight(WEEKLY_TAIL);
            ModuleResult::ok(SignalState::Long, score, contrib, signal.reason.clone())
        } else if signal.is_long() {
            ModuleResult::hold("Weekly close failed price-level sanity check")
        } else {
            ModuleResult::hold(signal.reason.clone())
        };

        result = result
            .with_meta("week", bars[t].timestamp.to_rfc3339())
            .with_meta("regime", signal.regime.name())
            .with_meta("tail_strength", signal.strength);
        if let Some(c) = signal.candidate {
            result = result
                .with_meta("tail_ratio", c.tail_ratio)
                .with_meta("body_factor", c.body_factor)
                .with_meta("vol_factor", c.vol_factor)
                .with_meta("atr", c.atr);
        }
        Ok(result)
    }
}
