use analysis_core::{Bar, VolumeParams};
use serde::{Deserialize, Serialize};

use crate::indicators::shifted_sma;

/// Participation behind the latest bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolumeSignal {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeReading {
    pub signal: VolumeSignal,
    /// Latest volume over the average of the bars before it
    pub ratio: f64,
}

/// Compare the last bar's volume with the average of the `ma_period` bars
/// before it. `None` without enough history or with a zero average.
pub fn classify_volume(bars: &[Bar], params: &VolumeParams) -> Option<VolumeReading> {
    let last = bars.len().checked_sub(1)?;
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let avg = shifted_sma(&volumes, last, params.ma_period)?;
    if !(avg > 0.0) {
        return None;
    }

    let ratio = volumes[last] / avg;
    let signal = if ratio >= params.strong_ratio {
        VolumeSignal::Strong
    } else if ratio >= params.moderate_ratio {
        VolumeSignal::Moderate
    } else {
        VolumeSignal::Weak
    };
    Some(VolumeReading { signal, ratio })
}
