// Utility helpers for parsing and basic statistics.
//
// Missing values travel as `Option<f64>` everywhere; the helpers here
// skip `None` the same way the analysis tables treat empty cells.
use num_format::{Locale, ToFormattedString};
use std::cmp::Ordering;

/// Parse a CSV cell into `f64`.
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Trims whitespace and strips thousands separators.
/// - Empty cells, `NaN` and infinities become `None`.
/// - Returns `Err(())` for text that is present but not numeric, so the
///   loader can report the offending cell.
pub fn parse_f64_cell(s: Option<&str>) -> Result<Option<f64>, ()> {
    let Some(s) = s.map(str::trim) else {
        return Ok(None);
    };
    if s.is_empty() {
        return Ok(None);
    }
    let cleaned = s.replace(',', "");
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        Ok(_) => Ok(None),
        Err(_) => Err(()),
    }
}

/// Parse a year/period cell. Float renderings such as `2020.0` are accepted.
pub fn parse_i32_cell(s: Option<&str>) -> Result<Option<i32>, ()> {
    match parse_f64_cell(s)? {
        None => Ok(None),
        Some(v) if v.fract() == 0.0 && v.abs() < i32::MAX as f64 => Ok(Some(v as i32)),
        Some(_) => Err(()),
    }
}

/// Arithmetic mean over a slice; `None` for an empty slice.
pub fn mean(v: &[f64]) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    Some(v.iter().sum::<f64>() / v.len() as f64)
}

/// Mean of the present values, ignoring `None`.
pub fn mean_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let present: Vec<f64> = values.into_iter().flatten().collect();
    mean(&present)
}

pub fn median(mut v: Vec<f64>) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        Some(v[mid])
    } else {
        Some((v[mid - 1] + v[mid]) / 2.0)
    }
}

/// Sample standard deviation (n - 1 denominator); `None` below two values.
pub fn sample_std(v: &[f64]) -> Option<f64> {
    if v.len() < 2 {
        return None;
    }
    let m = mean(v)?;
    let ss: f64 = v.iter().map(|x| (x - m).powi(2)).sum();
    Some((ss / (v.len() - 1) as f64).sqrt())
}

/// Population standard deviation (n denominator).
pub fn population_std(v: &[f64]) -> Option<f64> {
    let m = mean(v)?;
    let ss: f64 = v.iter().map(|x| (x - m).powi(2)).sum();
    Some((ss / v.len() as f64).sqrt())
}

/// Slope of the least-squares line through `(i, v[i])`.
///
/// Returns `None` below two points.
pub fn linear_slope(v: &[f64]) -> Option<f64> {
    if v.len() < 2 {
        return None;
    }
    let n = v.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = v.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in v.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    Some(num / den)
}

/// Trailing window `[i + 1 - window, i]` (clamped at 0) of the present values.
pub fn trailing_present(series: &[Option<f64>], i: usize, window: usize) -> Vec<f64> {
    let start = (i + 1).saturating_sub(window);
    series[start..=i].iter().flatten().copied().collect()
}

/// Trailing rolling mean with a minimum of one present observation.
pub fn rolling_mean(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|i| mean(&trailing_present(series, i, window)))
        .collect()
}

/// Trailing rolling sample standard deviation; `None` below two observations.
pub fn rolling_std(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|i| sample_std(&trailing_present(series, i, window)))
        .collect()
}

/// Causal trend: slope over the present values of the trailing window,
/// 0 when fewer than two are present.
pub fn rolling_trend(series: &[Option<f64>], window: usize) -> Vec<f64> {
    (0..series.len())
        .map(|i| linear_slope(&trailing_present(series, i, window)).unwrap_or(0.0))
        .collect()
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals plus thousands separators (e.g. `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}
