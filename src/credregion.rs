use crate::kde::{BandwidthRule, GaussianKde};
use crate::utils::{interp_linear, linspace};
use crate::Array1;
use log::debug;
use serde::Deserialize;
use std::cmp::Ordering;
use thiserror::Error;

/// Number of fine grid points per coarse KDE evaluation point.
pub const UPSAMPLE: usize = 100;

/// 1, 2 and 3 sigma equivalents.
pub const DEFAULT_MASSES: [f64; 3] = [0.6827, 0.9545, 0.9973];

/// Errors raised by the credible-region estimator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CredRegionError {
    #[error("no samples to estimate a density from")]
    EmptySamples,
    #[error("sample {index} is not finite ({value})")]
    NonFiniteSample { index: usize, value: f64 },
    #[error("degenerate distribution: samples have zero variance (value={value})")]
    DegenerateDistribution { value: f64 },
    #[error("probability mass {mass} is outside the open interval (0, 1)")]
    InvalidMass { mass: f64 },
    #[error("need at least 2 grid points, got {0}")]
    InvalidGrid(usize),
    #[error("estimated density vanishes over [{lo}, {hi}]")]
    ZeroDensity { lo: f64, hi: f64 },
    #[error("density has {density} values but the grid has {grid}")]
    GridMismatch { density: usize, grid: usize },
}

/// Optional physical limits of a parameter. They only ever widen the
/// evaluation domain beyond the sample range, never clip it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct DomainBounds {
    #[serde(default)]
    pub lo: Option<f64>,
    #[serde(default)]
    pub hi: Option<f64>,
}

impl DomainBounds {
    pub fn new(lo: Option<f64>, hi: Option<f64>) -> Self {
        DomainBounds { lo, hi }
    }

    /// Domain covering both the sample range `[min, max]` and the bounds.
    pub fn widen(&self, min: f64, max: f64) -> (f64, f64) {
        let lo = self.lo.map_or(min, |b| min.min(b));
        let hi = self.hi.map_or(max, |b| max.max(b));
        (lo, hi)
    }
}

/// Tuning knobs of [`credregion`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CredRegionOptions {
    pub bounds: DomainBounds,
    /// Points at which the KDE is evaluated before upsampling
    pub grid_points: usize,
    pub bandwidth: BandwidthRule,
}

impl Default for CredRegionOptions {
    fn default() -> Self {
        CredRegionOptions {
            bounds: DomainBounds::default(),
            grid_points: 100,
            bandwidth: BandwidthRule::Scott,
        }
    }
}

/// Estimated density and the credible regions found in it.
#[derive(Debug, Clone, PartialEq)]
pub struct CredibleRegions {
    /// Density on the fine grid
    pub pdf: Array1,
    /// The fine grid
    pub grid: Array1,
    /// Lower bounds of the disjoint intervals, one list per requested mass
    pub lower: Vec<Array1>,
    /// Upper bounds of the disjoint intervals, one list per requested mass
    pub upper: Vec<Array1>,
}

impl CredibleRegions {
    /// Intervals `(lo, hi)` of the `i`-th requested mass, in ascending order.
    pub fn intervals(&self, i: usize) -> Vec<(f64, f64)> {
        match (self.lower.get(i), self.upper.get(i)) {
            (Some(lo), Some(hi)) => lo.iter().copied().zip(hi.iter().copied()).collect(),
            _ => Vec::new(),
        }
    }

    /// Summed length of the intervals of the `i`-th requested mass.
    pub fn total_width(&self, i: usize) -> f64 {
        self.intervals(i).iter().map(|(lo, hi)| hi - lo).sum()
    }

    /// Number of requested masses.
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }
}

/// Highest posterior density credible regions of a one-dimensional posterior.
///
/// A Gaussian KDE is evaluated at `options.grid_points` points spanning the
/// sample range (widened by `options.bounds`), linearly resampled onto
/// `UPSAMPLE` times as many points, and thresholded so that the retained
/// points hold each requested fraction of the summed density. A region may be
/// several disjoint intervals for a multimodal posterior.
///
/// Mass is measured against the plain sum of the fine-grid densities rather
/// than an integral over x. On an evenly spaced grid the two agree up to the
/// trapezoid end corrections; region boundaries depend on this choice.
pub fn credregion(
    samples: &[f64],
    masses: &[f64],
    options: &CredRegionOptions,
) -> Result<CredibleRegions, CredRegionError> {
    if let Some(&mass) = masses.iter().find(|&&p| !(p > 0.0 && p < 1.0)) {
        return Err(CredRegionError::InvalidMass { mass });
    }
    if options.grid_points < 2 {
        return Err(CredRegionError::InvalidGrid(options.grid_points));
    }
    let kde = GaussianKde::new(samples, options.bandwidth)?;

    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = options.bounds.widen(min, max);
    debug!(
        "KDE over [{}, {}] with {} points, bandwidth {}",
        lo,
        hi,
        options.grid_points,
        kde.bandwidth()
    );

    let x = linspace(lo, hi, options.grid_points);
    let density = kde.evaluate(&x);
    let grid = linspace(lo, hi, UPSAMPLE * options.grid_points);
    let pdf = interp_linear(&x, &density, &grid).map_err(|_| CredRegionError::GridMismatch {
        density: density.len(),
        grid: x.len(),
    })?;

    let (sorted, cumulative) = sorted_cumulative(&pdf);
    let total = cumulative.last().copied().unwrap_or(0.0);
    if !(total.is_finite() && total > 0.0) {
        return Err(CredRegionError::ZeroDensity { lo, hi });
    }
    let mut lower = Vec::with_capacity(masses.len());
    let mut upper = Vec::with_capacity(masses.len());
    for &mass in masses {
        let threshold = hpd_threshold(&sorted, &cumulative, mass);
        let regions = contiguous_regions(&pdf, threshold);
        lower.push(regions.iter().map(|&(start, _)| grid[start]).collect());
        upper.push(regions.iter().map(|&(_, end)| grid[end]).collect());
    }

    Ok(CredibleRegions {
        pdf,
        grid,
        lower,
        upper,
    })
}

/// Densities sorted in descending order, and their running sum.
fn sorted_cumulative(pdf: &[f64]) -> (Array1, Array1) {
    let mut sorted = pdf.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    let cumulative = sorted
        .iter()
        .scan(0.0, |acc, &v| {
            *acc += v;
            Some(*acc)
        })
        .collect();
    (sorted, cumulative)
}

/// Lowest density still inside the region holding `mass` of the total.
///
/// With `i` the first index where the running sum reaches `mass * total`,
/// this is the smallest of the first `i` sorted densities. When the largest
/// density alone already reaches the target it is the threshold itself.
fn hpd_threshold(sorted: &[f64], cumulative: &[f64], mass: f64) -> f64 {
    let total = cumulative.last().copied().unwrap_or(0.0);
    let target = mass * total;
    let i = cumulative
        .iter()
        .position(|&c| c >= target)
        .unwrap_or(cumulative.len());
    sorted[i.max(1) - 1]
}

/// Inclusive `(start, end)` index runs where `pdf >= threshold`.
fn contiguous_regions(pdf: &[f64], threshold: f64) -> Vec<(usize, usize)> {
    let mut regions = Vec::new();
    let mut start = None;
    for (i, &v) in pdf.iter().enumerate() {
        match (v >= threshold, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                regions.push((s, i - 1));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        regions.push((s, pdf.len() - 1));
    }
    regions
}
