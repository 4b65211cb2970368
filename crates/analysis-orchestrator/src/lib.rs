use analysis_core::{
    AnalysisContext, AnalysisError, CandleTable, DecisionMetrics, DecisionResult, EngineConfig,
    ModuleResult, Signal,
};
use chrono::{DateTime, Utc};
use multi_timeframe::MultiTimeframeAnalyzer;
use rayon::prelude::*;
use std::collections::BTreeMap;
use technical_analysis::classify_volume;

pub mod combiner;
pub mod confidence;
pub mod registry;

pub use combiner::{combine_signals, CombinedSignal, NO_RESULTS_REASON};
pub use confidence::{calculate_confidence, ConfidenceBreakdown, ConfidenceInputs};
pub use registry::AnalyzerRegistry;

/// Decision together with the module results that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionReport {
    pub decision: DecisionResult,
    pub modules: BTreeMap<String, ModuleResult>,
}

/// Runs every registered analyzer, combines their results and scores the
/// confidence of the combined signal.
pub struct DecisionEngine {
    config: EngineConfig,
    registry: AnalyzerRegistry,
}

impl DecisionEngine {
    /// Engine with the default analyzers
    pub fn new(config: EngineConfig) -> Result<Self, AnalysisError> {
        Self::with_registry(config, AnalyzerRegistry::with_defaults())
    }

    pub fn with_registry(config: EngineConfig, registry: AnalyzerRegistry) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        &self.registry
    }

    /// Decide at `analysis_timestamp`. Either the full decision or a single
    /// error is returned.
    pub fn decide(
        &self,
        daily: &CandleTable,
        weekly: &CandleTable,
        analysis_timestamp: DateTime<Utc>,
    ) -> Result<DecisionResult, AnalysisError> {
        self.decide_with_modules(daily, weekly, analysis_timestamp)
            .map(|report| report.decision)
    }

    /// Same as `decide`, also returning the per-module results.
    pub fn decide_with_modules(
        &self,
        daily: &CandleTable,
        weekly: &CandleTable,
        analysis_timestamp: DateTime<Utc>,
    ) -> Result<DecisionReport, AnalysisError> {
        for table in [daily, weekly] {
            if !table.validate_no_lookahead(analysis_timestamp) {
                return Err(AnalysisError::LookAhead(format!(
                    "{} candles extend past {}",
                    table.timeframe().name(),
                    analysis_timestamp
                )));
            }
            if !table.is_closed_at(analysis_timestamp) {
                return Err(AnalysisError::LookAhead(format!(
                    "{} candle is still open at {}",
                    table.timeframe().name(),
                    analysis_timestamp
                )));
            }
        }

        let price_level = daily
            .last_close()
            .or_else(|| weekly.last_close())
            .ok_or_else(|| AnalysisError::InsufficientData("no candles to price the decision".to_string()))?;

        let ctx = AnalysisContext::new(&self.config, analysis_timestamp);
        let modules = self.registry.run_all(daily, weekly, &ctx);

        let thresholds = &self.config.thresholds;
        let combined = combine_signals(&modules, &self.config.weights, thresholds.confidence_min);

        let volume = classify_volume(daily.bars(), &thresholds.volume).map(|v| v.signal);
        let alignment = MultiTimeframeAnalyzer::from_params(&thresholds.alignment)
            .analyze_trend_alignment(&[daily, weekly])
            .score_for(combined.signal);

        let breakdown = calculate_confidence(
            &combined,
            &ConfidenceInputs {
                results: &modules,
                anchors: &self.config.anchors,
                min_confirmations: thresholds.min_confirmations,
                volume,
                alignment,
            },
        )?;

        tracing::info!(
            "Decision at {}: {} (confidence {:.2}, long {:.3}, short {:.3}, {} modules scored)",
            analysis_timestamp,
            combined.signal.label(),
            breakdown.confidence,
            combined.norm_long,
            combined.norm_short,
            combined.modules_scored
        );

        let metrics = DecisionMetrics {
            long_score: combined.long_score,
            short_score: combined.short_score,
            norm_long: combined.norm_long,
            norm_short: combined.norm_short,
            total_weight: combined.total_weight,
            modules_scored: combined.modules_scored,
            base_strength: combined.strength,
            confirmations: breakdown.confirmations,
            confluence_bonus: breakdown.confluence_bonus,
            volume_bonus: breakdown.volume_bonus,
            timeframe_bonus: breakdown.timeframe_bonus,
            confirmation_penalty: breakdown.confirmation_penalty,
        };

        Ok(DecisionReport {
            decision: DecisionResult {
                signal: combined.signal,
                confidence: breakdown.confidence,
                reasons: combined.reasons,
                metrics,
                analysis_timestamp,
                price_level,
            },
            modules,
        })
    }

    /// Decide at every weekly close, oldest first. Each instant only sees
    /// candles closed by then; instants are independent and run in parallel.
    pub fn replay(
        &self,
        daily: &CandleTable,
        weekly: &CandleTable,
    ) -> Result<Vec<DecisionResult>, AnalysisError> {
        let period = weekly.timeframe().duration();
        let instants: Vec<DateTime<Utc>> = weekly.bars().iter().map(|b| b.timestamp + period).collect();

        tracing::info!("Replaying {} weekly closes", instants.len());

        instants
            .par_iter()
            .map(|&ts| self.decide(&daily.closed_as_of(ts), &weekly.closed_as_of(ts), ts))
            .collect()
    }

    /// Non-HOLD decisions from a replay
    pub fn replay_signals(
        &self,
        daily: &CandleTable,
        weekly: &CandleTable,
    ) -> Result<Vec<DecisionResult>, AnalysisError> {
        Ok(self
            .replay(daily, weekly)?
            .into_iter()
            .filter(|d| d.signal != Signal::Hold)
            .collect())
    }
}
