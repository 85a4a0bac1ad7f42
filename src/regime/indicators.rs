//! Technical indicators over completed bars.
//!
//! All functions are pure and take plain slices so they stay trivially
//! testable. Series-returning functions yield one value per input bar.

/// OHLC view of a bar for indicator math.
#[derive(Debug, Clone, Copy)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u32,
}

/// Exponential moving average. Values before `period` are padded with the
/// initial SMA seed, so the output has the same length as the input.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    if values.len() < period {
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        return vec![avg; values.len()];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let sma = values[..period].iter().sum::<f64>() / period as f64;
    let mut result = vec![sma; period];
    for &v in &values[period..] {
        let prev = result[result.len() - 1];
        result.push((v - prev) * multiplier + prev);
    }
    result
}

/// True range per bar; the first bar uses its own high-low.
pub fn true_range(bars: &[Ohlc]) -> Vec<f64> {
    let mut result = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let tr = if i == 0 {
            bar.high - bar.low
        } else {
            let prev_close = bars[i - 1].close;
            (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        };
        result.push(tr);
    }
    result
}

/// Average true range as an EMA of true range.
pub fn atr(bars: &[Ohlc], period: usize) -> Vec<f64> {
    ema(&true_range(bars), period)
}

/// Average directional index. Returns zeros until `2 * period` bars exist.
pub fn adx(bars: &[Ohlc], period: usize) -> Vec<f64> {
    if bars.len() < period * 2 {
        return vec![0.0; bars.len()];
    }

    let mut plus_dm = vec![0.0];
    let mut minus_dm = vec![0.0];
    for i in 1..bars.len() {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
    }

    let smoothed_tr = ema(&true_range(bars), period);
    let smoothed_plus = ema(&plus_dm, period);
    let smoothed_minus = ema(&minus_dm, period);

    let mut dx = Vec::with_capacity(bars.len());
    for i in 0..bars.len() {
        let (pdi, mdi) = if smoothed_tr[i] > 0.0 {
            (
                100.0 * smoothed_plus[i] / smoothed_tr[i],
                100.0 * smoothed_minus[i] / smoothed_tr[i],
            )
        } else {
            (0.0, 0.0)
        };
        let sum = pdi + mdi;
        dx.push(if sum > 0.0 {
            100.0 * (pdi - mdi).abs() / sum
        } else {
            0.0
        });
    }

    ema(&dx, period)
}

/// Session VWAP, cumulative from the first bar.
pub fn vwap(bars: &[Ohlc]) -> Vec<f64> {
    let mut result = Vec::with_capacity(bars.len());
    let mut cum_volume = 0u64;
    let mut cum_pv = 0.0;
    for bar in bars {
        let typical = (bar.high + bar.low + bar.close) / 3.0;
        cum_pv += typical * bar.volume as f64;
        cum_volume += bar.volume as u64;
        result.push(if cum_volume > 0 {
            cum_pv / cum_volume as f64
        } else {
            typical
        });
    }
    result
}

/// Least-squares slope of the last `period` values.
pub fn slope(values: &[f64], period: usize) -> f64 {
    let start = values.len().saturating_sub(period);
    let recent = &values[start..];
    let n = recent.len();
    if n < 2 {
        return 0.0;
    }

    let nf = n as f64;
    let sum_x: f64 = (0..n).map(|i| i as f64).sum();
    let sum_y: f64 = recent.iter().sum();
    let sum_xy: f64 = recent.iter().enumerate().map(|(i, v)| i as f64 * v).sum();
    let sum_xx: f64 = (0..n).map(|i| (i * i) as f64).sum();

    let denominator = nf * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        0.0
    } else {
        (nf * sum_xy - sum_x * sum_y) / denominator
    }
}

/// Percentile rank (0-100) of `value` within `values`.
pub fn percentile(value: f64, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 50.0;
    }
    let below = values.iter().filter(|v| **v < value).count();
    below as f64 / values.len() as f64 * 100.0
}

/// Most recent high exceeds every prior high in the lookback.
pub fn higher_highs(highs: &[f64], lookback: usize) -> bool {
    extreme_break(highs, lookback, |last, rest| {
        rest.iter().all(|v| last > *v)
    })
}

/// Most recent low sits above the lowest prior low in the lookback.
pub fn higher_lows(lows: &[f64], lookback: usize) -> bool {
    extreme_break(lows, lookback, |last, rest| {
        last > rest.iter().copied().fold(f64::MAX, f64::min)
    })
}

pub fn lower_highs(highs: &[f64], lookback: usize) -> bool {
    extreme_break(highs, lookback, |last, rest| {
        last < rest.iter().copied().fold(f64::MIN, f64::max)
    })
}

pub fn lower_lows(lows: &[f64], lookback: usize) -> bool {
    extreme_break(lows, lookback, |last, rest| {
        rest.iter().all(|v| last < *v)
    })
}

fn extreme_break(values: &[f64], lookback: usize, check: impl Fn(f64, &[f64]) -> bool) -> bool {
    if values.len() < lookback {
        return false;
    }
    let recent = &values[values.len() - lookback..];
    check(recent[recent.len() - 1], &recent[..recent.len() - 1])
}

/// How many of the last `lookback` bars stayed inside the first bar's
/// range, expanded by 10% on each side.
pub fn range_bound_bars(highs: &[f64], lows: &[f64], lookback: usize) -> usize {
    if highs.len() < lookback || lows.len() < lookback {
        return 0;
    }
    let recent_highs = &highs[highs.len() - lookback..];
    let recent_lows = &lows[lows.len() - lookback..];

    let size = recent_highs[0] - recent_lows[0];
    let range_high = recent_highs[0] + size * 0.1;
    let range_low = recent_lows[0] - size * 0.1;

    recent_highs
        .iter()
        .zip(recent_lows)
        .filter(|(h, l)| **l >= range_low && **h <= range_high)
        .count()
}

/// Mean high-low range of the last `period` bars.
pub fn avg_bar_range(bars: &[Ohlc], period: usize) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    let start = bars.len().saturating_sub(period);
    let recent = &bars[start..];
    recent.iter().map(|b| b.high - b.low).sum::<f64>() / recent.len() as f64
}
