//! Trailing simple moving average.

/// Simple moving average of `values` over `period` points.
///
/// Entry `i` is the mean of `values[i + 1 - period..=i]`, or `None` while
/// fewer than `period` values are available. Only past and current values
/// contribute to each entry.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                let window = &values[i + 1 - period..=i];
                Some(window.iter().sum::<f64>() / period as f64)
            }
        })
        .collect()
}
