use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AnalysisError;

/// OHLCV bar data. `timestamp` is the open time of the period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// Timeframe of a candle table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    Day1,
    Week1,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::Day1 => 1440,
            Timeframe::Week1 => 10080,
        }
    }

    /// Length of one period
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.to_minutes())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Timeframe::Day1 => "daily",
            Timeframe::Week1 => "weekly",
        }
    }
}

/// Ordered, gap-free table of closed candles for one timeframe.
///
/// Construction validates ordering, spacing and price sanity, so every
/// analyzer can index into `bars()` without re-checking the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCandleTable")]
pub struct CandleTable {
    timeframe: Timeframe,
    bars: Vec<Bar>,
}

#[derive(Deserialize)]
struct RawCandleTable {
    timeframe: Timeframe,
    bars: Vec<Bar>,
}

impl TryFrom<RawCandleTable> for CandleTable {
    type Error = AnalysisError;

    fn try_from(raw: RawCandleTable) -> Result<Self, Self::Error> {
        CandleTable::new(raw.timeframe, raw.bars)
    }
}

impl CandleTable {
    pub fn new(timeframe: Timeframe, bars: Vec<Bar>) -> Result<Self, AnalysisError> {
        let step = timeframe.duration();

        for (i, bar) in bars.iter().enumerate() {
            validate_bar(bar).map_err(|msg| {
                AnalysisError::InvalidData(format!(
                    "{} bar {} ({}): {}",
                    timeframe.name(),
                    i,
                    bar.timestamp,
                    msg
                ))
            })?;
        }

        for pair in bars.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            if curr.timestamp <= prev.timestamp {
                return Err(AnalysisError::InvalidData(format!(
                    "{} table not strictly ascending at {}",
                    timeframe.name(),
                    curr.timestamp
                )));
            }
            if curr.timestamp - prev.timestamp != step {
                return Err(AnalysisError::InvalidData(format!(
                    "{} table has a gap between {} and {}",
                    timeframe.name(),
                    prev.timestamp,
                    curr.timestamp
                )));
            }
        }

        Ok(Self { timeframe, bars })
    }

    pub fn empty(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            bars: Vec::new(),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Candles whose period has fully ended at `as_of`.
    pub fn closed_as_of(&self, as_of: DateTime<Utc>) -> CandleTable {
        let step = self.timeframe.duration();
        let end = self
            .bars
            .partition_point(|b| b.timestamp + step <= as_of);
        CandleTable {
            timeframe: self.timeframe,
            bars: self.bars[..end].to_vec(),
        }
    }

    /// True when an analysis at `analysis_timestamp` may use every row of the
    /// table, i.e. the timestamp is at or after the last indexed candle.
    pub fn validate_no_lookahead(&self, analysis_timestamp: DateTime<Utc>) -> bool {
        match self.bars.last() {
            Some(last) => analysis_timestamp >= last.timestamp,
            None => true,
        }
    }

    /// True when every candle's period has ended by `as_of`, i.e. the table
    /// holds no in-progress candle at that instant.
    pub fn is_closed_at(&self, as_of: DateTime<Utc>) -> bool {
        match self.bars.last() {
            Some(last) => last.timestamp + self.timeframe.duration() <= as_of,
            None => true,
        }
    }
}

fn validate_bar(bar: &Bar) -> Result<(), &'static str> {
    let values = [bar.open, bar.high, bar.low, bar.close, bar.volume];
    if values.iter().any(|v| !v.is_finite()) {
        return Err("non-finite value");
    }
    if bar.low < 0.0 {
        return Err("negative low");
    }
    if bar.high < bar.open.max(bar.close) {
        return Err("high below body");
    }
    if bar.low > bar.open.min(bar.close) {
        return Err("low above body");
    }
    if bar.volume < 0.0 {
        return Err("negative volume");
    }
    Ok(())
}

/// Final directional decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Long,
    Short,
    Hold,
}

impl Signal {
    pub fn label(&self) -> &'static str {
        match self {
            Signal::Long => "LONG",
            Signal::Short => "SHORT",
            Signal::Hold => "HOLD",
        }
    }
}

/// Health of a module's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleStatus {
    Ok,
    Disabled,
    Error,
    Degraded,
}

/// State reported by a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalState {
    Long,
    Short,
    Hold,
    Up,
    Down,
    Neutral,
}

impl SignalState {
    pub fn label(&self) -> &'static str {
        match self {
            SignalState::Long => "LONG",
            SignalState::Short => "SHORT",
            SignalState::Hold => "HOLD",
            SignalState::Up => "UP",
            SignalState::Down => "DOWN",
            SignalState::Neutral => "NEUTRAL",
        }
    }

    /// Directional reading of the state. UP/DOWN count as LONG/SHORT.
    pub fn direction(&self) -> Option<Signal> {
        match self {
            SignalState::Long | SignalState::Up => Some(Signal::Long),
            SignalState::Short | SignalState::Down => Some(Signal::Short),
            SignalState::Hold | SignalState::Neutral => None,
        }
    }

    pub fn agrees_with(&self, signal: Signal) -> bool {
        signal != Signal::Hold && self.direction() == Some(signal)
    }
}

/// Standardized output of every analyzer.
///
/// Fields are private so the `status != OK => contrib == 0, state == NEUTRAL`
/// rule holds for every instance, including deserialized ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawModuleResult")]
pub struct ModuleResult {
    status: ModuleStatus,
    state: SignalState,
    score: f64,
    contrib: f64,
    reason: String,
    meta: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawModuleResult {
    status: ModuleStatus,
    state: SignalState,
    score: f64,
    contrib: f64,
    reason: String,
    #[serde(default)]
    meta: Map<String, Value>,
}

impl From<RawModuleResult> for ModuleResult {
    fn from(raw: RawModuleResult) -> Self {
        let mut result = ModuleResult {
            status: raw.status,
            state: raw.state,
            score: raw.score,
            contrib: raw.contrib,
            reason: non_empty(raw.reason),
            meta: raw.meta,
        };
        if result.status != ModuleStatus::Ok {
            result.state = SignalState::Neutral;
            result.contrib = 0.0;
        }
        result
    }
}

fn non_empty(reason: String) -> String {
    if reason.trim().is_empty() {
        "no reason given".to_string()
    } else {
        reason
    }
}

impl ModuleResult {
    /// Healthy result. Score and contribution are clamped to [0, 1].
    pub fn ok(state: SignalState, score: f64, contrib: f64, reason: impl Into<String>) -> Self {
        Self {
            status: ModuleStatus::Ok,
            state,
            score: score.clamp(0.0, 1.0),
            contrib: contrib.clamp(0.0, 1.0),
            reason: non_empty(reason.into()),
            meta: Map::new(),
        }
    }

    /// Healthy result with no opinion
    pub fn hold(reason: impl Into<String>) -> Self {
        Self::ok(SignalState::Hold, 0.0, 0.0, reason)
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::inactive(ModuleStatus::Error, reason)
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self::inactive(ModuleStatus::Disabled, reason)
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::inactive(ModuleStatus::Degraded, reason)
    }

    pub fn from_failure(err: &AnalysisError) -> Self {
        Self::error(err.to_string())
    }

    fn inactive(status: ModuleStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            state: SignalState::Neutral,
            score: 0.0,
            contrib: 0.0,
            reason: non_empty(reason.into()),
            meta: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    pub fn status(&self) -> ModuleStatus {
        self.status
    }

    pub fn state(&self) -> SignalState {
        self.state
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn contrib(&self) -> f64 {
        self.contrib
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn is_ok(&self) -> bool {
        self.status == ModuleStatus::Ok
    }

    /// Score and contribution are finite and inside [0, 1].
    pub fn is_well_formed(&self) -> bool {
        let unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        unit(self.score) && unit(self.contrib)
    }
}

/// Figures the combiner and confidence calculator used to reach a decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub long_score: f64,
    pub short_score: f64,
    pub norm_long: f64,
    pub norm_short: f64,
    pub total_weight: f64,
    pub modules_scored: usize,
    pub base_strength: f64,
    pub confirmations: usize,
    pub confluence_bonus: f64,
    pub volume_bonus: f64,
    pub timeframe_bonus: f64,
    pub confirmation_penalty: f64,
}

/// Final output handed to persistence/reporting collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub signal: Signal,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub metrics: DecisionMetrics,
    pub analysis_timestamp: DateTime<Utc>,
    pub price_level: f64,
}
