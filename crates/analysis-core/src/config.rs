//! Engine configuration.
//!
//! A single `EngineConfig` is loaded once per run (JSON document, then
//! environment overrides) and handed to every analyzer by reference. Nothing
//! in the engine mutates it after `validate()`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::AnalysisError;

pub const WEEKLY_TAIL: &str = "weekly_tail";
pub const TREND: &str = "trend";
pub const FIBONACCI: &str = "fibonacci";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Module name -> weight in [0, 1]. Need not sum to 1.
    pub weights: BTreeMap<String, f64>,
    pub thresholds: Thresholds,
    pub anchors: AnchorModules,
    /// Modules switched off by the operator; they report DISABLED.
    pub disabled: BTreeSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let weights = [(WEEKLY_TAIL, 0.35), (FIBONACCI, 0.25), (TREND, 0.40)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            weights,
            thresholds: Thresholds::default(),
            anchors: AnchorModules::default(),
            disabled: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Normalized score a direction must exceed to be emitted
    pub confidence_min: f64,
    /// Agreeing modules expected before the confidence penalty applies
    pub min_confirmations: usize,
    pub weekly_tail: WeeklyTailParams,
    pub trend: TrendParams,
    pub fibonacci: FibonacciParams,
    pub volume: VolumeParams,
    pub alignment: AlignmentParams,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence_min: 0.3,
            min_confirmations: 2,
            weekly_tail: WeeklyTailParams::default(),
            trend: TrendParams::default(),
            fibonacci: FibonacciParams::default(),
            volume: VolumeParams::default(),
            alignment: AlignmentParams::default(),
        }
    }
}

/// Tunables of the weekly lower-wick detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklyTailParams {
    pub lookback_weeks: usize,
    pub min_tail_strength: f64,
    pub atr_period: usize,
    pub volume_ma_period: usize,
    pub min_tail_ratio: f64,
    pub max_body_atr: f64,
    pub min_close_pos: f64,
    pub bull_market_threshold: f64,
    pub bear_market_threshold: f64,
    pub long_tail_amplification: f64,
    /// Apply the BULL/BEAR regime multiplier
    pub trend_weighting: bool,
    /// Largest relative gap tolerated between weekly and daily closes
    pub max_price_deviation: f64,
}

impl Default for WeeklyTailParams {
    fn default() -> Self {
        Self {
            lookback_weeks: 8,
            min_tail_strength: 1.0,
            atr_period: 14,
            volume_ma_period: 10,
            min_tail_ratio: 0.5,
            max_body_atr: 1.5,
            min_close_pos: 0.5,
            bull_market_threshold: 0.10,
            bear_market_threshold: -0.10,
            long_tail_amplification: 1.3,
            trend_weighting: true,
            max_price_deviation: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendParams {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Minimum fast/slow MA spread, relative to price, to call a trend
    pub min_spread: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            fast_period: 20,
            slow_period: 50,
            min_spread: 0.005,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FibonacciParams {
    pub swing_weeks: usize,
    /// Distance to a level, relative to the swing range, that counts as a touch
    pub tolerance: f64,
    pub levels: Vec<f64>,
}

impl Default for FibonacciParams {
    fn default() -> Self {
        Self {
            swing_weeks: 26,
            tolerance: 0.03,
            levels: vec![0.382, 0.5, 0.618],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeParams {
    pub ma_period: usize,
    pub strong_ratio: f64,
    pub moderate_ratio: f64,
}

impl Default for VolumeParams {
    fn default() -> Self {
        Self {
            ma_period: 20,
            strong_ratio: 1.5,
            moderate_ratio: 1.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentParams {
    /// SMA windows checked on each timeframe
    pub windows: Vec<usize>,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            windows: vec![5, 10, 20],
        }
    }
}

/// Modules whose agreement earns the confluence bonus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorModules {
    pub wick_module: String,
    pub level_module: String,
    pub trend_module: String,
}

impl Default for AnchorModules {
    fn default() -> Self {
        Self {
            wick_module: WEEKLY_TAIL.to_string(),
            level_module: FIBONACCI.to_string(),
            trend_module: TREND.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, AnalysisError> {
        let config: EngineConfig = serde_json::from_str(raw)
            .map_err(|e| AnalysisError::Configuration(format!("invalid config document: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Apply `FUSION_*` environment variables on top of the loaded document.
    pub fn apply_env_overrides(&mut self) -> Result<(), AnalysisError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Recognized keys:
    /// `FUSION_CONFIDENCE_MIN`, `FUSION_MIN_CONFIRMATIONS`,
    /// `FUSION_TREND_WEIGHTING` and `FUSION_WEIGHT_<MODULE>` for every
    /// module already present in `weights`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), AnalysisError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FUSION_CONFIDENCE_MIN") {
            self.thresholds.confidence_min = parse_var("FUSION_CONFIDENCE_MIN", &v)?;
        }
        if let Some(v) = lookup("FUSION_MIN_CONFIRMATIONS") {
            self.thresholds.min_confirmations = parse_var("FUSION_MIN_CONFIRMATIONS", &v)?;
        }
        if let Some(v) = lookup("FUSION_TREND_WEIGHTING") {
            self.thresholds.weekly_tail.trend_weighting = parse_var("FUSION_TREND_WEIGHTING", &v)?;
        }
        for (module, weight) in self.weights.iter_mut() {
            let key = format!("FUSION_WEIGHT_{}", module.to_uppercase());
            if let Some(v) = lookup(&key) {
                *weight = parse_var(&key, &v)?;
            }
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        for (module, weight) in &self.weights {
            if !weight.is_finite() || !(0.0..=1.0).contains(weight) {
                return Err(AnalysisError::Configuration(format!(
                    "weight for {} must be in [0, 1], got {}",
                    module, weight
                )));
            }
        }

        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.confidence_min) {
            return Err(AnalysisError::Configuration(format!(
                "confidence_min must be in [0, 1], got {}",
                t.confidence_min
            )));
        }

        let wt = &t.weekly_tail;
        if wt.atr_period == 0 || wt.volume_ma_period == 0 || wt.lookback_weeks == 0 {
            return Err(AnalysisError::Configuration(
                "weekly_tail periods must be positive".to_string(),
            ));
        }
        if wt.bear_market_threshold > wt.bull_market_threshold {
            return Err(AnalysisError::Configuration(format!(
                "bear_market_threshold ({}) exceeds bull_market_threshold ({})",
                wt.bear_market_threshold, wt.bull_market_threshold
            )));
        }
        if !wt.long_tail_amplification.is_finite() || wt.long_tail_amplification <= 0.0 {
            return Err(AnalysisError::Configuration(
                "long_tail_amplification must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&wt.min_close_pos) {
            return Err(AnalysisError::Configuration(
                "min_close_pos must be in [0, 1]".to_string(),
            ));
        }

        if t.trend.fast_period == 0 || t.trend.fast_period >= t.trend.slow_period {
            return Err(AnalysisError::Configuration(
                "trend.fast_period must be positive and below slow_period".to_string(),
            ));
        }
        if !t.trend.min_spread.is_finite() || t.trend.min_spread <= 0.0 {
            return Err(AnalysisError::Configuration(format!(
                "trend.min_spread must be positive, got {}",
                t.trend.min_spread
            )));
        }
        if !t.fibonacci.tolerance.is_finite() || t.fibonacci.tolerance < 0.0 {
            return Err(AnalysisError::Configuration(format!(
                "fibonacci.tolerance must be non-negative, got {}",
                t.fibonacci.tolerance
            )));
        }
        if t.fibonacci.swing_weeks < 2 {
            return Err(AnalysisError::Configuration(
                "fibonacci.swing_weeks must be at least 2".to_string(),
            ));
        }
        if t.volume.ma_period == 0 || t.volume.moderate_ratio > t.volume.strong_ratio {
            return Err(AnalysisError::Configuration(
                "volume.ma_period must be positive and moderate_ratio <= strong_ratio".to_string(),
            ));
        }
        if t.alignment.windows.iter().any(|&w| w == 0) {
            return Err(AnalysisError::Configuration(
                "alignment windows must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Configured weight, 0.0 for unknown modules
    pub fn module_weight(&self, module: &str) -> f64 {
        self.weights.get(module).copied().unwrap_or(0.0)
    }

    pub fn is_enabled(&self, module: &str) -> bool {
        !self.disabled.contains(module)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AnalysisError> {
    value
        .trim()
        .parse()
        .map_err(|_| AnalysisError::Configuration(format!("{} has unparseable value {:?}", key, value)))
}
