use analysis_core::{AnalysisContext, Analyzer, CandleTable, ModuleResult};
use rayon::prelude::*;
use std::collections::BTreeMap;
use technical_analysis::{FibonacciAnalyzer, TrendAnalyzer, WeeklyTailAnalyzer};

/// Set of analyzers consulted for every decision, keyed by `Analyzer::name`.
pub struct AnalyzerRegistry {
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self {
            analyzers: Vec::new(),
        }
    }

    /// Weekly tail, trend and Fibonacci analyzers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(WeeklyTailAnalyzer::new());
        registry.register(TrendAnalyzer::new());
        registry.register(FibonacciAnalyzer::new());
        registry
    }

    /// Add an analyzer, replacing any registered under the same name.
    pub fn register<A: Analyzer + 'static>(&mut self, analyzer: A) {
        let name = analyzer.name();
        self.analyzers.retain(|a| a.name() != name);
        self.analyzers.push(Box::new(analyzer));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.analyzers.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Run every analyzer on the same inputs. Analyzers are independent, so
    /// they run in parallel; the map is the join point.
    pub fn run_all(
        &self,
        daily: &CandleTable,
        weekly: &CandleTable,
        ctx: &AnalysisContext<'_>,
    ) -> BTreeMap<String, ModuleResult> {
        self.analyzers
            .par_iter()
            .map(|analyzer| {
                let result = analyzer.analyze(daily, weekly, ctx);
                tracing::debug!(
                    "{}: {:?} {} ({:.2}) - {}",
                    analyzer.name(),
                    result.status(),
                    result.state().label(),
                    result.score(),
                    result.reason()
                );
                (analyzer.name().to_string(), result)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{
        AnalysisError, EngineConfig, ModuleStatus, SignalState, Timeframe, TREND, WEEKLY_TAIL,
    };
    use chrono::Utc;

    struct Fixed(&'static str, SignalState);

    impl Analyzer for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn evaluate(
            &self,
            _daily: &CandleTable,
            _weekly: &CandleTable,
            _ctx: &AnalysisContext<'_>,
        ) -> Result<ModuleResult, AnalysisError> {
            Ok(ModuleResult::ok(self.1, 0.9, 0.9, "fixed"))
        }
    }

    #[test]
    fn test_defaults_registered() {
        let registry = AnalyzerRegistry::with_defaults();
        assert_eq!(registry.len(), 3);
        assert!(registry.names().contains(&WEEKLY_TAIL));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = AnalyzerRegistry::with_defaults();
        registry.register(Fixed(TREND, SignalState::Short));
        assert_eq!(registry.len(), 3);

        let config = EngineConfig::default();
        let ctx = AnalysisContext::new(&config, Utc::now());
        let results = registry.run_all(
            &CandleTable::empty(Timeframe::Day1),
            &CandleTable::empty(Timeframe::Week1),
            &ctx,
        );
        assert_eq!(results[TREND].state(), SignalState::Short);
        assert_eq!(results[WEEKLY_TAIL].status(), ModuleStatus::Error);
    }

    #[test]
    fn test_empty_registry() {
        let registry = AnalyzerRegistry::new();
        let config = EngineConfig::default();
        let ctx = AnalysisContext::new(&config, Utc::now());
        let results = registry.run_all(
            &CandleTable::empty(Timeframe::Day1),
            &CandleTable::empty(Timeframe::Week1),
            &ctx,
        );
        assert!(registry.is_empty());
        assert!(results.is_empty());
    }
}
