#[cfg(test)]
mod tests {
    use super::super::indicators::*;
    use analysis_core::Bar;
    use chrono::{Duration, TimeZone, Utc};

    fn sample_prices() -> Vec<f64> {
        vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ]
    }

    fn sample_bars() -> Vec<Bar> {
        let prices = vec![
            (100.0, 102.0, 99.0, 101.0),
            (101.0, 103.0, 100.0, 102.0),
            (102.0, 104.0, 101.0, 103.0),
            (103.0, 105.0, 102.0, 104.0),
            (104.0, 106.0, 103.0, 105.0),
            (105.0, 110.0, 95.0, 100.0),
        ];
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        prices
            .into_iter()
            .enumerate()
            .map(|(i, (open, high, low, close))| Bar {
                timestamp: start + Duration::weeks(i as i64),
                open,
                high,
                low,
                close,
                volume: 1_000_000.0,
            })
            .collect()
    }

    #[test]
    fn test_sma_basic() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&data, 3);

        assert_eq!(result.len(), 3);
        assert!((result[0] - 2.0).abs() < 0.001);
        assert!((result[1] - 3.0).abs() < 0.001);
        assert!((result[2] - 4.0).abs() < 0.001);
    }

    #[test]
    fn test_sma_insufficient_data() {
        let data = vec![1.0, 2.0];
        assert!(sma(&data, 5).is_empty());
        assert!(sma(&data, 0).is_empty());
    }

    #[test]
    fn test_sma_real_prices() {
        let prices = sample_prices();
        let result = sma(&prices, 5);

        let expected_first = (44.34 + 44.09 + 44.15 + 43.61 + 44.33) / 5.0;
        assert!((result[0] - expected_first).abs() < 0.01);
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let bars = sample_bars();
        let tr = true_range(&bars);

        assert_eq!(tr.len(), bars.len());
        assert!((tr[0] - 3.0).abs() < 1e-12);
        // Last bar: high-low = 15 dominates the gaps to prev close 105
        assert!((tr[5] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_shifted_sma_excludes_current_value() {
        let mut values = vec![1.0, 2.0, 3.0, 4.0, 10.0];
        let before = shifted_sma(&values, 4, 3).unwrap();
        assert!((before - 3.0).abs() < 1e-12);

        // The shift happens before any read: changing the as-of value
        // cannot move the statistic.
        values[4] = 1.0e9;
        assert_eq!(shifted_sma(&values, 4, 3), Some(before));
    }

    #[test]
    fn test_shifted_sma_requires_full_window() {
        let values = vec![1.0, 2.0, 3.0];
        assert_eq!(shifted_sma(&values, 2, 3), None);
        assert_eq!(shifted_sma(&values, 4, 2), None);
        assert_eq!(shifted_sma(&values, 3, 3), Some(2.0));
    }

    #[test]
    fn test_shifted_atr_ignores_as_of_bar() {
        let bars = sample_bars();
        let atr = shifted_atr(&bars, 5, 3).unwrap();

        // TR of bars 2..=4 is 3.0 each
        assert!((atr - 3.0).abs() < 1e-12);

        let mut spiked = bars.clone();
        spiked[5].high = 500.0;
        spiked[5].low = 1.0;
        assert_eq!(shifted_atr(&spiked, 5, 3), Some(atr));
    }

    #[test]
    fn test_shifted_atr_insufficient_history() {
        let bars = sample_bars();
        assert_eq!(shifted_atr(&bars, 2, 3), None);
        assert_eq!(shifted_atr(&bars, 10, 3), None);
    }

    #[test]
    fn test_mean_before() {
        let values = vec![2.0, 4.0, 600.0];
        assert_eq!(mean_before(&values, 2), Some(3.0));
        assert_eq!(mean_before(&values, 0), None);
    }
}
