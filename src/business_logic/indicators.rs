use crate::models::candle::Candle;

/// Default Wilder period for the directional-strength indicator
pub const ADX_PERIOD: usize = 14;
/// Shortest period the indicator is allowed to shrink to for short windows
pub const ADX_MIN_PERIOD: usize = 5;

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: impl ExactSizeIterator<Item = f64>) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    Some(values.sum::<f64>() / n as f64)
}

/// True Range of `candle` given the previous close
pub fn true_range(candle: &Candle, prev_close: Option<f64>) -> f64 {
    let hl = candle.high - candle.low;
    match prev_close {
        Some(pc) => {
            let hpc = (candle.high - pc).abs();
            let lpc = (candle.low - pc).abs();
            hl.max(hpc).max(lpc)
        }
        None => hl,
    }
}

/// Absolute least-squares slope of `closes` per candle, divided by `avg_price`.
pub fn slope_pct(closes: &[f64], avg_price: f64) -> Option<f64> {
    let n = closes.len();
    if n < 2 || avg_price == 0.0 {
        return None;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = closes.iter().sum::<f64>() / n as f64;

    let (mut cov, mut var) = (0.0, 0.0);
    for (i, y) in closes.iter().enumerate() {
        let dx = i as f64 - x_mean;
        cov += dx * (y - y_mean);
        var += dx * dx;
    }

    let slope = (cov / var).abs() / avg_price;
    slope.is_finite().then_some(slope)
}

/// Fraction of consecutive close-to-close moves that reverse direction.
///
/// Trending series sit around 0.10-0.25, pure chop around 0.45-0.60.
pub fn choppiness(closes: &[f64]) -> f64 {
    if closes.len() < 3 {
        return 0.0;
    }

    let signs: Vec<i8> = closes.windows(2).map(|w| sign(w[1] - w[0])).collect();
    let changes = signs.windows(2).filter(|s| s[0] != s[1]).count();
    changes as f64 / (signs.len() - 1) as f64
}

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

/// Wilder-style ADX of the final candle in `candles`.
///
/// The period shrinks in steps of two (not below [`ADX_MIN_PERIOD`]) until the window
/// holds at least `2 * period + 1` candles. Returns `None` when even that is too long.
pub fn adx(candles: &[Candle], period: usize) -> Option<f64> {
    let n = candles.len();
    let mut period = period;
    while period > ADX_MIN_PERIOD && n < period * 2 + 1 {
        period = ADX_MIN_PERIOD.max(period - 2);
    }
    if period == 0 || n < period * 2 + 1 {
        return None;
    }

    let mut tr = vec![0.0; n];
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];

    for i in 1..n {
        let (cur, prev) = (&candles[i], &candles[i - 1]);
        tr[i] = true_range(cur, Some(prev.close));

        let up = cur.high - prev.high;
        let down = prev.low - cur.low;
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
    }

    let atr = wilder_sum(&tr, period);
    let smoothed_plus = wilder_sum(&plus_dm, period);
    let smoothed_minus = wilder_sum(&minus_dm, period);

    let dx: Vec<f64> = (0..n)
        .map(|i| {
            let (p_di, m_di) = if atr[i] > 0.0 {
                (
                    100.0 * smoothed_plus[i] / atr[i],
                    100.0 * smoothed_minus[i] / atr[i],
                )
            } else {
                (0.0, 0.0)
            };
            let total = p_di + m_di;
            if total > 0.0 {
                100.0 * (p_di - m_di).abs() / total
            } else {
                0.0
            }
        })
        .collect();

    // Seed with the mean DX over [period, 2 * period], then smooth
    let start = 2 * period;
    let seed = dx[period..=start].iter().sum::<f64>() / (period + 1) as f64;
    let value = dx[start + 1..]
        .iter()
        .fold(seed, |prev, d| (prev * (period - 1) as f64 + d) / period as f64);

    value.is_finite().then_some(value)
}

/// Wilder running sum: seeded with the sum of `values[1..=period]`.
fn wilder_sum(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![0.0; n];
    out[period] = values[1..=period].iter().sum();
    for i in period + 1..n {
        out[i] = out[i - 1] - out[i - 1] / period as f64 + values[i];
    }
    out
}
