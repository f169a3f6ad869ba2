//! Backtest performance metrics.

use super::portfolio::EquityPoint;

/// `(final - initial) / initial * 100`.
pub fn total_return_pct(initial_capital: f64, final_value: f64) -> f64 {
    if initial_capital > 0.0 {
        (final_value - initial_capital) / initial_capital * 100.0
    } else {
        0.0
    }
}

/// Compound annual growth over `years`, in percent.
pub fn annualized_return_pct(initial_capital: f64, final_value: f64, years: u32) -> f64 {
    if initial_capital <= 0.0 || years == 0 {
        return 0.0;
    }
    ((final_value / initial_capital).powf(1.0 / f64::from(years)) - 1.0) * 100.0
}

/// Largest peak-to-trough decline of the curve, in percent.
pub fn max_drawdown_pct(equity_curve: &[EquityPoint]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.value;
    let mut max_dd = 0.0_f64;

    for point in equity_curve {
        if point.value > peak {
            peak = point.value;
        } else if peak > 0.0 {
            let dd = (peak - point.value) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    max_dd * 100.0
}
