use crate::rhat::{find_convergence, num_parameters, Convergence};
use crate::{Array1, Array3};
use anyhow::{anyhow, Error, Result};
use arima::acf;
use log::debug;

/// Autocorrelation below which later lags are ignored.
pub const AUTOCORRELATION_CUTOFF: f64 = 0.01;

/// Credible-region probabilities of the 1, 1.5, 2, 2.5 and 3 sigma equivalents.
pub const DEFAULT_UNCERTAINTY_MASSES: [f64; 5] = [0.68269, 0.86639, 0.95450, 0.98758, 0.99730];

/// Normalized autocorrelation of `chain` at lags `0..chain.len()`.
///
/// Lag 0 is exactly 1. Errors on constant or non-finite input.
pub fn autocorrelation(chain: &[f64]) -> Result<Array1, Error> {
    if chain.len() < 2 {
        return Err(anyhow!("Need at least 2 samples for an autocorrelation"));
    }
    if chain.iter().any(|x| !x.is_finite()) {
        return Err(anyhow!("All values must be finite to compute an autocorrelation"));
    }
    let acov = acf::acf(chain, None, true)
        .map_err(|_| anyhow!("Autocovariance of {} samples failed", chain.len()))?;
    let var = acov[0];
    if !(var > 0.0) {
        return Err(anyhow!(
            "No autocorrelation when elements are all constant (value={})",
            chain[0]
        ));
    }
    Ok(acov.iter().map(|c| c / var).collect())
}

/// Integrated autocorrelation time of one chain: `1 + 2 * sum(rho[..cutoff])`
/// where `cutoff` is the first lag whose autocorrelation falls below
/// [`AUTOCORRELATION_CUTOFF`]. The sum starts at lag 0. If no lag falls below
/// the cutoff the sum runs over every lag but the last.
pub fn integrated_autocorrelation_time(chain: &[f64]) -> Result<f64, Error> {
    let rho = autocorrelation(chain)?;
    let cutoff = rho
        .iter()
        .position(|&r| r < AUTOCORRELATION_CUTOFF)
        .unwrap_or(rho.len() - 1);
    Ok(1.0 + 2.0 * rho[..cutoff].iter().sum::<f64>())
}

/// Samples per independent sample: the ceiling of the largest integrated
/// autocorrelation time over every chain and parameter, using the leading
/// `iterations` draws of each chain.
pub fn samples_per_independent_sample(chains: &Array3, iterations: usize) -> Result<usize, Error> {
    num_parameters(chains)?;
    let mut worst: f64 = 0.0;
    for (c, chain) in chains.iter().enumerate() {
        for (p, param) in chain.iter().enumerate() {
            if param.len() < iterations {
                return Err(anyhow!(
                    "Chain {} parameter {} has {} draws, fewer than {}",
                    c,
                    p,
                    param.len(),
                    iterations
                ));
            }
            let tau = integrated_autocorrelation_time(&param[..iterations])
                .map_err(|e| anyhow!("Chain {} parameter {}: {}", c, p, e))?;
            debug!("chain {} parameter {}: tau = {}", c, p, tau);
            worst = worst.max(tau);
        }
    }
    Ok(worst.ceil() as usize)
}

/// Result of [`effective_sample_size`].
#[derive(Debug, Clone, PartialEq)]
pub struct EssReport {
    /// Samples per independent sample
    pub speis: usize,
    /// Post burn-in iterations summed over chains
    pub total_iterations: usize,
    /// Where the Gelman-Rubin scan settled; its prefix is used for the autocorrelation
    pub convergence: Convergence,
}

impl EssReport {
    /// Effective sample size, `total_iterations / speis` rounded down.
    pub fn ess(&self) -> usize {
        self.total_iterations / self.speis.max(1)
    }

    /// Effective sample size without rounding, as used for uncertainties.
    pub fn ess_f64(&self) -> f64 {
        self.total_iterations as f64 / self.speis.max(1) as f64
    }
}

/// Effective sample size of burned-in chains (chains x parameters x iterations).
///
/// Convergence is first located with [`find_convergence`] in steps of `step`
/// iterations; the autocorrelation is then measured over that converged
/// prefix of every chain.
pub fn effective_sample_size(chains: &Array3, step: usize, threshold: f64) -> Result<EssReport, Error> {
    let convergence = find_convergence(chains, step, threshold)?;
    let speis = samples_per_independent_sample(chains, convergence.iterations)?;
    let iterations = chains
        .iter()
        .flat_map(|c| c.iter().map(|p| p.len()))
        .min()
        .unwrap_or(0);
    Ok(EssReport {
        speis,
        total_iterations: iterations * chains.len(),
        convergence,
    })
}

/// Uncertainty of credible-region probabilities estimated from `ess`
/// independent samples: `sqrt((1 - p) p / (ess + 3))` for each `p`.
pub fn credible_region_uncertainty(ess: f64, masses: &[f64]) -> Array1 {
    masses
        .iter()
        .map(|p| ((1.0 - p) * p / (ess + 3.0)).sqrt())
        .collect()
}
