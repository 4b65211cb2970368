use analysis_core::Bar;

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(sum / period as f64);
    }
    result
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// True Range series.
/// TR[0] = high - low (no previous close).
/// TR[t] = max(high-low, |high-prev_close|, |low-prev_close|).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let high_low = bar.high - bar.low;
            if i == 0 {
                return high_low;
            }
            let prev_close = bars[i - 1].close;
            high_low
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        })
        .collect()
}

/// Mean of `values[as_of - period .. as_of]`.
///
/// The window ends one step before `as_of`, so the value stored at `as_of`
/// is never read. `None` when fewer than `period` earlier values exist.
pub fn shifted_sma(values: &[f64], as_of: usize, period: usize) -> Option<f64> {
    if period == 0 || as_of < period || as_of > values.len() {
        return None;
    }
    mean(&values[as_of - period..as_of])
}

/// Average True Range over the `period` bars strictly before `as_of`.
pub fn shifted_atr(bars: &[Bar], as_of: usize, period: usize) -> Option<f64> {
    if as_of > bars.len() {
        return None;
    }
    // TR of bar i only needs bars i-1 and i, so truncating first keeps
    // bar `as_of` out of the computation entirely.
    let tr = true_range(&bars[..as_of]);
    shifted_sma(&tr, as_of, period)
}

/// Mean of every value strictly before `as_of`
pub fn mean_before(values: &[f64], as_of: usize) -> Option<f64> {
    mean(&values[..as_of.min(values.len())])
}
