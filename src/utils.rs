use crate::{Array1, Array2};
use anyhow::{anyhow, Context, Error, Result};
use average::Variance;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

/// Compute the arithmetic mean of an array.
pub fn mean(arr: &[f64]) -> Result<f64, Error> {
    if arr.is_empty() {
        return Err(anyhow!("Can't take mean of empty array"));
    }
    let sum = arr.iter().sum::<f64>();
    let count = arr.len() as f64;
    Ok(sum / count)
}

/// Compute the sample variance of an array using Bessel's correction.
pub fn sample_variance(arr: &[f64]) -> Result<f64, Error> {
    let xbar = mean(arr)?;
    Ok(arr.iter().map(|x| (x - xbar).powi(2)).sum::<f64>() / (arr.len() as f64 - 1.0))
}

/// Compute the population variance of an array (no Bessel's correction).
pub fn population_variance(arr: &[f64]) -> Result<f64, Error> {
    if arr.is_empty() {
        return Err(anyhow!("Can't take variance of empty array"));
    }
    let var: Variance = arr.iter().copied().collect();
    let n = var.len() as f64;
    if n < 2.0 {
        return Ok(0.0);
    }
    Ok(var.sample_variance() * (n - 1.0) / n)
}

/// `num` evenly spaced values over the closed interval `[start, stop]`.
///
/// The last value is exactly `stop`.
pub fn linspace(start: f64, stop: f64, num: usize) -> Array1 {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            let mut out: Array1 = (0..num).map(|i| start + step * i as f64).collect();
            out[num - 1] = stop;
            out
        }
    }
}

/// Piecewise linear interpolation of `(x, y)` evaluated at `xnew`.
///
/// `x` must be ascending. Points outside `[x[0], x[last]]` are an error
/// rather than an extrapolation.
pub fn interp_linear(x: &[f64], y: &[f64], xnew: &[f64]) -> Result<Array1, Error> {
    if x.len() != y.len() {
        return Err(anyhow!(
            "x and y must have the same length ({} != {})",
            x.len(),
            y.len()
        ));
    }
    if x.len() < 2 {
        return Err(anyhow!("Need at least 2 points to interpolate"));
    }
    let (first, last) = (x[0], x[x.len() - 1]);
    let mut out = Vec::with_capacity(xnew.len());
    for &xi in xnew {
        if !(first..=last).contains(&xi) {
            return Err(anyhow!(
                "{} is outside the interpolation range [{}, {}]",
                xi,
                first,
                last
            ));
        }
        // index of the first knot >= xi, clipped so that [hi - 1, hi] is a valid segment
        let hi = x.partition_point(|&v| v < xi).clamp(1, x.len() - 1);
        let lo = hi - 1;
        let span = x[hi] - x[lo];
        let slope = if span > 0.0 {
            (y[hi] - y[lo]) / span
        } else {
            0.0
        };
        out.push(y[lo] + slope * (xi - x[lo]));
    }
    Ok(out)
}

/// Read comma separated numeric values column-wise: `result[j]` holds the
/// `j`-th column. The first `skip_rows` lines are ignored, as are lines
/// starting with `#`. At most `n_rows` data lines are read when given.
pub fn read_csv(path: &Path, skip_rows: usize, n_rows: Option<usize>) -> Result<Array2, Error> {
    let mut result: Array2 = Vec::new();
    let f = File::open(path).with_context(|| format!("Can't open {}", path.display()))?;
    let f = BufReader::new(f);
    let lines = f
        .lines()
        .skip(skip_rows)
        .filter(|line| match line {
            Ok(l) => !l.trim_start().starts_with('#') && !l.trim().is_empty(),
            Err(_) => true,
        })
        .take(n_rows.unwrap_or(usize::MAX));
    for (row, line) in lines.enumerate() {
        let line = line.with_context(|| format!("Can't read {}", path.display()))?;
        for (idx, value) in line.split(',').enumerate() {
            if idx >= result.len() {
                if row > 0 {
                    return Err(anyhow!("Row {} of {} has extra columns", row, path.display()));
                }
                result.push(Vec::new())
            }
            let parsed = value.trim().parse::<f64>().map_err(|_| {
                anyhow!(
                    "Can't parse {:?} as a number (row {}, column {}) in {}",
                    value,
                    row,
                    idx,
                    path.display()
                )
            })?;
            result[idx].push(parsed);
        }
    }
    if let Some(len) = result.first().map(|c| c.len()) {
        if result.iter().any(|c| c.len() != len) {
            return Err(anyhow!("Ragged columns in {}", path.display()));
        }
    }
    Ok(result)
}
