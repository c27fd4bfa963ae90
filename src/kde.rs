use crate::credregion::CredRegionError;
use crate::utils::sample_variance;
use crate::Array1;
use std::f64::consts::PI;

/// Rule for the kernel bandwidth factor. The kernel standard deviation is the
/// factor times the sample standard deviation (Bessel's correction).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BandwidthRule {
    /// Scott's rule, `n^(-1/5)`
    #[default]
    Scott,
    /// Silverman's rule, `(3n/4)^(-1/5)`
    Silverman,
    /// A fixed factor
    Factor(f64),
}

impl BandwidthRule {
    /// Bandwidth factor for `n` one-dimensional samples.
    pub fn factor(&self, n: usize) -> f64 {
        let n = n as f64;
        match self {
            BandwidthRule::Scott => n.powf(-0.2),
            BandwidthRule::Silverman => (n * 3.0 / 4.0).powf(-0.2),
            BandwidthRule::Factor(f) => *f,
        }
    }
}

/// One-dimensional Gaussian kernel density estimate: the average of equally
/// weighted normal kernels centred on each sample.
#[derive(Debug, Clone)]
pub struct GaussianKde {
    samples: Array1,
    bandwidth: f64,
}

impl GaussianKde {
    /// Fit a kernel density estimate to `samples`.
    ///
    /// Fails on empty or non-finite input, and when the samples have zero
    /// variance (the kernel would collapse to a point mass).
    pub fn new(samples: &[f64], rule: BandwidthRule) -> Result<Self, CredRegionError> {
        if samples.is_empty() {
            return Err(CredRegionError::EmptySamples);
        }
        if let Some((index, value)) = samples.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(CredRegionError::NonFiniteSample {
                index,
                value: *value,
            });
        }
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if samples.len() < 2 || min == max {
            return Err(CredRegionError::DegenerateDistribution {
                value: samples[0],
            });
        }
        let variance = sample_variance(samples).unwrap_or(0.0);
        let factor = rule.factor(samples.len());
        let bandwidth = variance.sqrt() * factor;
        if variance <= 0.0 || !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(CredRegionError::DegenerateDistribution {
                value: samples[0],
            });
        }
        Ok(GaussianKde {
            samples: samples.to_vec(),
            bandwidth,
        })
    }

    /// Standard deviation of each Gaussian kernel.
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Number of samples the estimate was fitted to.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the estimate has no samples; `new` never builds one.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Density at a single point.
    pub fn density(&self, x: f64) -> f64 {
        let inv_h = 1.0 / self.bandwidth;
        let norm = inv_h / ((2.0 * PI).sqrt() * self.samples.len() as f64);
        let sum: f64 = self
            .samples
            .iter()
            .map(|&xi| {
                let z = (x - xi) * inv_h;
                (-0.5 * z * z).exp()
            })
            .sum();
        sum * norm
    }

    /// Density at every point of `xs`.
    pub fn evaluate(&self, xs: &[f64]) -> Array1 {
        xs.iter().map(|&x| self.density(x)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::linspace;

    #[test]
    fn test_bandwidth_factors() {
        assert_abs_diff_eq!(BandwidthRule::Scott.factor(32), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(
            BandwidthRule::Silverman.factor(32),
            24.0_f64.powf(-0.2),
            epsilon = 1e-12
        );
        assert_eq!(BandwidthRule::Factor(0.3).factor(1000), 0.3);
    }

    #[test]
    fn test_two_point_density() {
        // samples -1 and 1: sample std is sqrt(2), Scott factor is 2^(-1/5)
        let kde = GaussianKde::new(&[-1.0, 1.0], BandwidthRule::Scott).unwrap();
        let h = 2.0_f64.sqrt() * 2.0_f64.powf(-0.2);
        assert_abs_diff_eq!(kde.bandwidth(), h, epsilon = 1e-12);

        let normal = |z: f64| (-0.5 * z * z).exp() / (2.0 * PI).sqrt();
        let expected = 0.5 * (normal(1.0 / h) + normal(1.0 / h)) / h;
        assert_abs_diff_eq!(kde.density(0.0), expected, epsilon = 1e-12);
        assert_eq!(kde.len(), 2);
    }

    #[test]
    fn test_density_integrates_to_one() {
        let samples = vec![0.1, 0.4, 0.45, 0.9, 1.3, 2.2, 2.4];
        let kde = GaussianKde::new(&samples, BandwidthRule::Scott).unwrap();
        let x = linspace(-10.0, 12.0, 20001);
        let dx = x[1] - x[0];
        let integral: f64 = kde.evaluate(&x).iter().sum::<f64>() * dx;
        assert_abs_diff_eq!(integral, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_degenerate_input() {
        assert!(matches!(
            GaussianKde::new(&[], BandwidthRule::Scott),
            Err(CredRegionError::EmptySamples)
        ));
        assert!(matches!(
            GaussianKde::new(&[3.0; 10], BandwidthRule::Scott),
            Err(CredRegionError::DegenerateDistribution { .. })
        ));
        // means of these are inexact, leaving a tiny positive variance
        for value in [0.1, 4.2, 0.7, 1e-6, 123.456] {
            for n in [2, 3, 10, 50, 1000] {
                assert_eq!(
                    GaussianKde::new(&vec![value; n], BandwidthRule::Scott).unwrap_err(),
                    CredRegionError::DegenerateDistribution { value }
                );
            }
        }
        assert!(matches!(
            GaussianKde::new(&[3.0], BandwidthRule::Scott),
            Err(CredRegionError::DegenerateDistribution { .. })
        ));
        assert!(matches!(
            GaussianKde::new(&[1.0, f64::INFINITY], BandwidthRule::Scott),
            Err(CredRegionError::NonFiniteSample { index: 1, .. })
        ));
        assert!(matches!(
            GaussianKde::new(&[1.0, 2.0], BandwidthRule::Factor(0.0)),
            Err(CredRegionError::DegenerateDistribution { .. })
        ));
    }
}
