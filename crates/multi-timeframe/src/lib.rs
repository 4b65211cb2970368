use analysis_core::{AlignmentParams, CandleTable, Signal, Timeframe};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Trend alignment across multiple timeframes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAlignment {
    /// Majority trend per timeframe (true = uptrend). Timeframes without a
    /// single usable window are absent.
    pub trends: BTreeMap<Timeframe, bool>,
    /// 0.0 = votes split evenly, 1.0 = every check points the same way
    pub alignment_score: f64,
    pub overall_trend: Signal,
    pub votes: usize,
}

impl TrendAlignment {
    fn empty() -> Self {
        Self {
            trends: BTreeMap::new(),
            alignment_score: 0.0,
            overall_trend: Signal::Hold,
            votes: 0,
        }
    }

    /// Alignment credited to `signal`: the score when the overall trend
    /// points the same way, otherwise 0.
    pub fn score_for(&self, signal: Signal) -> f64 {
        if signal != Signal::Hold && self.overall_trend == signal {
            self.alignment_score
        } else {
            0.0
        }
    }
}

/// Multi-timeframe analyzer: on every table, the latest close is compared
/// with its simple moving average over each configured window.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiTimeframeAnalyzer {
    windows: Vec<usize>,
}

impl MultiTimeframeAnalyzer {
    pub fn new(windows: Vec<usize>) -> Self {
        Self { windows }
    }

    pub fn from_params(params: &AlignmentParams) -> Self {
        Self::new(params.windows.clone())
    }

    /// Up/down votes for one table. Flat comparisons do not vote.
    fn table_votes(&self, table: &CandleTable) -> Vec<bool> {
        let closes = table.closes();
        let Some(&last) = closes.last() else {
            return Vec::new();
        };

        self.windows
            .iter()
            .filter(|&&w| w > 0 && closes.len() >= w)
            .filter_map(|&w| {
                let avg = closes[closes.len() - w..].iter().sum::<f64>() / w as f64;
                if last > avg {
                    Some(true)
                } else if last < avg {
                    Some(false)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Analyze trend alignment across the given tables
    pub fn analyze_trend_alignment(&self, tables: &[&CandleTable]) -> TrendAlignment {
        let mut trends = BTreeMap::new();
        let mut up = 0usize;
        let mut total = 0usize;

        for table in tables {
            let votes = self.table_votes(table);
            if votes.is_empty() {
                debug!("No alignment votes for {} table", table.timeframe().name());
                continue;
            }
            let table_up = votes.iter().filter(|&&v| v).count();
            trends.insert(table.timeframe(), table_up * 2 > votes.len());
            up += table_up;
            total += votes.len();
        }

        if total == 0 {
            return TrendAlignment::empty();
        }

        let up_fraction = up as f64 / total as f64;
        let alignment_score = (up_fraction - 0.5).abs() * 2.0;
        let overall_trend = if up_fraction > 0.6 {
            Signal::Long
        } else if up_fraction < 0.4 {
            Signal::Short
        } else {
            Signal::Hold
        };

        TrendAlignment {
            trends,
            alignment_score,
            overall_trend,
            votes: total,
        }
    }
}
