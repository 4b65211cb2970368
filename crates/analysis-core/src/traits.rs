use chrono::{DateTime, Utc};

use crate::{AnalysisError, CandleTable, EngineConfig, ModuleResult};

/// Everything an analyzer may read besides the candles.
/// Passed by reference into each call; analyzers keep no state of their own.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub config: &'a EngineConfig,
    pub analysis_timestamp: DateTime<Utc>,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(config: &'a EngineConfig, analysis_timestamp: DateTime<Utc>) -> Self {
        Self {
            config,
            analysis_timestamp,
        }
    }

    pub fn module_weight(&self, module: &str) -> f64 {
        self.config.module_weight(module)
    }
}

/// Contract shared by every analysis module.
///
/// Implementors supply `evaluate`; `analyze` is the boundary that turns
/// configuration switches and internal failures into a `ModuleResult`, so no
/// error ever escapes a module.
pub trait Analyzer: Send + Sync {
    /// Registry key, also the key used in `weights`
    fn name(&self) -> &'static str;

    fn evaluate(
        &self,
        daily: &CandleTable,
        weekly: &CandleTable,
        ctx: &AnalysisContext<'_>,
    ) -> Result<ModuleResult, AnalysisError>;

    fn analyze(
        &self,
        daily: &CandleTable,
        weekly: &CandleTable,
        ctx: &AnalysisContext<'_>,
    ) -> ModuleResult {
        if !ctx.config.is_enabled(self.name()) {
            return ModuleResult::disabled(format!("{} disabled by configuration", self.name()));
        }
        match self.evaluate(daily, weekly, ctx) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("{} analysis failed: {}", self.name(), e);
                ModuleResult::from_failure(&e)
            }
        }
    }
}
