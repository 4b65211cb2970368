use analysis_core::{AnalysisError, AnchorModules, ModuleResult, Signal};
use std::collections::BTreeMap;
use technical_analysis::VolumeSignal;

use crate::combiner::CombinedSignal;

const ANCHOR_CONFLUENCE_BONUS: f64 = 0.15;
const TREND_CONFLUENCE_BONUS: f64 = 0.10;
const STRONG_VOLUME_BONUS: f64 = 0.05;
const MODERATE_VOLUME_BONUS: f64 = 0.03;
const HIGH_ALIGNMENT_BONUS: f64 = 0.10;
const PARTIAL_ALIGNMENT_BONUS: f64 = 0.05;
const CONFIRMATION_PENALTY: f64 = 0.1;

/// Everything the confidence stage reads besides the combined signal
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInputs<'a> {
    pub results: &'a BTreeMap<String, ModuleResult>,
    pub anchors: &'a AnchorModules,
    pub min_confirmations: usize,
    pub volume: Option<VolumeSignal>,
    /// Timeframe alignment credited to the provisional direction, in [0, 1]
    pub alignment: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfidenceBreakdown {
    pub confidence: f64,
    pub base_strength: f64,
    pub confirmations: usize,
    pub confluence_bonus: f64,
    pub volume_bonus: f64,
    pub timeframe_bonus: f64,
    pub confirmation_penalty: f64,
}

fn agrees(results: &BTreeMap<String, ModuleResult>, module: &str, signal: Signal) -> bool {
    results
        .get(module)
        .map(|r| r.is_ok() && r.state().agrees_with(signal))
        .unwrap_or(false)
}

pub fn confluence_bonus(
    results: &BTreeMap<String, ModuleResult>,
    anchors: &AnchorModules,
    signal: Signal,
) -> f64 {
    let wick = agrees(results, &anchors.wick_module, signal);
    let level = agrees(results, &anchors.level_module, signal);
    let trend = agrees(results, &anchors.trend_module, signal);

    let mut bonus = 0.0;
    if wick && level {
        bonus += ANCHOR_CONFLUENCE_BONUS;
    }
    if trend && (wick || level) {
        bonus += TREND_CONFLUENCE_BONUS;
    }
    bonus
}

pub fn volume_bonus(volume: Option<VolumeSignal>) -> f64 {
    match volume {
        Some(VolumeSignal::Strong) => STRONG_VOLUME_BONUS,
        Some(VolumeSignal::Moderate) => MODERATE_VOLUME_BONUS,
        _ => 0.0,
    }
}

pub fn timeframe_bonus(alignment: f64) -> f64 {
    if alignment > 0.8 {
        HIGH_ALIGNMENT_BONUS
    } else if alignment > 0.6 {
        PARTIAL_ALIGNMENT_BONUS
    } else {
        0.0
    }
}

/// Final confidence for a provisional signal.
///
/// HOLD short-circuits to 0. For a direction, bonuses are added to the
/// combiner's winning score, a penalty applies per missing confirmation, and
/// the result is clamped to [0, 1]. Inputs that cannot describe a valid
/// decision are an error rather than a low confidence.
pub fn calculate_confidence(
    combined: &CombinedSignal,
    inputs: &ConfidenceInputs<'_>,
) -> Result<ConfidenceBreakdown, AnalysisError> {
    if combined.signal == Signal::Hold {
        return Ok(ConfidenceBreakdown::default());
    }

    let base_strength = combined.strength;
    if !base_strength.is_finite() || !(0.0..=1.0).contains(&base_strength) {
        return Err(AnalysisError::Confidence(format!(
            "combined strength {} outside [0, 1]",
            base_strength
        )));
    }
    if !inputs.alignment.is_finite() || !(0.0..=1.0).contains(&inputs.alignment) {
        return Err(AnalysisError::Confidence(format!(
            "timeframe alignment {} outside [0, 1]",
            inputs.alignment
        )));
    }

    let confirmations = inputs
        .results
        .values()
        .filter(|r| r.is_ok() && r.state().agrees_with(combined.signal))
        .count();
    if confirmations == 0 {
        return Err(AnalysisError::Confidence(format!(
            "{} signal without any agreeing module",
            combined.signal.label()
        )));
    }

    let confluence = confluence_bonus(inputs.results, inputs.anchors, combined.signal);
    let volume = volume_bonus(inputs.volume);
    let timeframe = timeframe_bonus(inputs.alignment);
    let penalty =
        CONFIRMATION_PENALTY * inputs.min_confirmations.saturating_sub(confirmations) as f64;

    let confidence = (base_strength + confluence + volume + timeframe - penalty).clamp(0.0, 1.0);

    Ok(ConfidenceBreakdown {
        confidence,
        base_strength,
        confirmations,
        confluence_bonus: confluence,
        volume_bonus: volume,
        timeframe_bonus: timeframe,
        confirmation_penalty: penalty,
    })
}
