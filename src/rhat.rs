use crate::utils::{mean, population_variance};
use crate::{Array1, Array2, Array3};
use anyhow::{anyhow, Error, Result};
use log::{debug, info, warn};

/// PSRF below which a parameter is considered converged.
pub const DEFAULT_THRESHOLD: f64 = 1.01;

/// Computes the Gelman & Rubin (1992) potential scale reduction factor for
/// one parameter. Chains are trimmed from the back to match the length of
/// the shortest chain.
///
/// With `m` chains of `n` draws, `W` the mean within-chain variance (no
/// Bessel's correction) and `B = n/(m-1) * sum((mean_j - mean)^2)`:
///
/// `V = W (n-1)/n + B (m+1)/(n m)` and `psrf = sqrt(V / W)`.
///
/// # Arguments
/// * `chains` - Reference to a vector of chains, each of which is a vector of samples for
///              the same parameter
pub fn potential_scale_reduction_factor(chains: &Array2) -> Result<f64, Error> {
    let m = chains.len();
    if m < 2 {
        return Err(anyhow!("Need at least 2 chains for Rhat, got {}", m));
    }
    let n = chains.iter().map(|c| c.len()).min().unwrap_or(0);
    if n < 2 {
        return Err(anyhow!("Need at least 2 draws per chain for Rhat, got {}", n));
    }

    let mut chain_mean: Array1 = Vec::with_capacity(m);
    let mut chain_var: Array1 = Vec::with_capacity(m);
    for chain in chains.iter() {
        let chain = &chain[..n];
        chain_mean.push(mean(chain)?);
        chain_var.push(population_variance(chain)?);
    }

    let var_within = mean(&chain_var)?;
    if var_within <= 0.0 {
        return Err(anyhow!("No Rhat when every chain is constant"));
    }
    let grand_mean = mean(&chain_mean)?;
    let (m, n) = (m as f64, n as f64);
    let var_between = n / (m - 1.0)
        * chain_mean
            .iter()
            .map(|x| (x - grand_mean).powi(2))
            .sum::<f64>();
    let var_marginal = var_within * (n - 1.0) / n + var_between * (m + 1.0) / (n * m);

    Ok((var_marginal / var_within).sqrt())
}

/// Potential scale reduction factor of every parameter of an
/// (chains x parameters x iterations) array, in parameter order.
pub fn convergence_test(chains: &Array3) -> Result<Array1, Error> {
    let num_params = num_parameters(chains)?;
    (0..num_params)
        .map(|p| {
            let param: Array2 = chains.iter().map(|c| c[p].clone()).collect();
            potential_scale_reduction_factor(&param)
                .map_err(|e| anyhow!("Rhat of parameter {}: {}", p, e))
        })
        .collect()
}

/// Outcome of [`find_convergence`].
#[derive(Debug, Clone, PartialEq)]
pub struct Convergence {
    /// Number of leading iterations per chain the result refers to
    pub iterations: usize,
    /// Whether every PSRF is below the threshold
    pub converged: bool,
    /// PSRF per parameter at `iterations`, empty if nothing could be tested
    pub psrf: Array1,
}

/// Repeats [`convergence_test`] on the leading `step`, `2*step`, ...
/// iterations of every chain (strictly fewer than the chain length) and stops
/// at the first prefix whose PSRFs are all below `threshold`.
///
/// When no prefix converges the last tested one is reported. When the chains
/// are too short for any prefix the full length is reported, untested.
pub fn find_convergence(chains: &Array3, step: usize, threshold: f64) -> Result<Convergence, Error> {
    if step == 0 {
        return Err(anyhow!("Convergence step must be positive"));
    }
    num_parameters(chains)?;
    let length = chains.iter().flat_map(|c| c.iter().map(|p| p.len())).min().unwrap_or(0);

    let mut last: Option<Convergence> = None;
    let mut iterations = step;
    while iterations < length {
        let prefix: Array3 = chains
            .iter()
            .map(|c| c.iter().map(|p| p[..iterations].to_vec()).collect())
            .collect();
        let psrf = convergence_test(&prefix)?;
        let converged = psrf.iter().all(|&r| r < threshold);
        debug!("Rhat after {} iterations: {:?}", iterations, psrf);
        let result = Convergence {
            iterations,
            converged,
            psrf,
        };
        if converged {
            info!("All parameters converged to within {} at iteration {}", threshold, iterations);
            return Ok(result);
        }
        last = Some(result);
        iterations += step;
    }

    match last {
        Some(result) => {
            warn!(
                "Chains did not converge to within {}; using the first {} iterations",
                threshold, result.iterations
            );
            Ok(result)
        }
        None => {
            warn!(
                "Chains of {} iterations are too short for a step of {}; using all of them",
                length, step
            );
            Ok(Convergence {
                iterations: length,
                converged: false,
                psrf: Vec::new(),
            })
        }
    }
}

/// Number of parameters, checking every chain has the same count.
pub(crate) fn num_parameters(chains: &Array3) -> Result<usize, Error> {
    let first = chains
        .first()
        .ok_or_else(|| anyhow!("No chains given"))?
        .len();
    if chains.iter().any(|c| c.len() != first) {
        return Err(anyhow!("Chains have differing numbers of parameters"));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_potential_scale_reduction_factor() {
        // W = 2/3, B = 1.5, V = 4/9 + 3/4
        let chains = vec![vec![1.0, 2.0, 3.0], vec![2.0, 3.0, 4.0]];
        let actual = potential_scale_reduction_factor(&chains).unwrap();
        assert_abs_diff_eq!(actual, 1.3385315336840842, epsilon = 1e-12);

        // identical chains: B = 0 and V = W (n-1)/n
        let chains = vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0]];
        let actual = potential_scale_reduction_factor(&chains).unwrap();
        assert_abs_diff_eq!(actual, (2.0_f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_trims_to_shortest_chain() {
        let chains = vec![vec![1.0, 2.0, 3.0, 100.0], vec![2.0, 3.0, 4.0]];
        let actual = potential_scale_reduction_factor(&chains).unwrap();
        assert_abs_diff_eq!(actual, 1.3385315336840842, epsilon = 1e-12);
    }

    #[test]
    fn test_rhat_errors() {
        assert!(potential_scale_reduction_factor(&vec![vec![1.0, 2.0]]).is_err());
        assert!(potential_scale_reduction_factor(&vec![vec![1.0], vec![2.0]]).is_err());
        assert!(potential_scale_reduction_factor(&vec![vec![1.0, 1.0], vec![2.0, 2.0]]).is_err());
    }

    #[test]
    fn test_convergence_test_per_parameter() {
        let chains = vec![
            vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0]],
            vec![vec![2.0, 3.0, 4.0], vec![1.0, 2.0, 3.0]],
        ];
        let psrf = convergence_test(&chains).unwrap();
        assert_eq!(psrf.len(), 2);
        assert_abs_diff_eq!(psrf[0], 1.3385315336840842, epsilon = 1e-12);
        assert_abs_diff_eq!(psrf[1], (2.0_f64 / 3.0).sqrt(), epsilon = 1e-12);

        let ragged = vec![vec![vec![1.0, 2.0]], vec![vec![1.0, 2.0], vec![3.0, 4.0]]];
        assert!(convergence_test(&ragged).is_err());
        assert!(convergence_test(&vec![]).is_err());
    }

    #[test]
    fn test_find_convergence() {
        // both chains repeat the same pattern, so every prefix has B = 0
        let pattern = [1.0, 2.0, 3.0, 4.0];
        let chain: Array1 = pattern.iter().cycle().take(40).copied().collect();
        let chains = vec![vec![chain.clone()], vec![chain]];
        let result = find_convergence(&chains, 8, DEFAULT_THRESHOLD).unwrap();
        assert!(result.converged);
        assert_eq!(result.iterations, 8);
        assert_eq!(result.psrf.len(), 1);
    }

    #[test]
    fn test_find_convergence_never_converges() {
        let a: Array1 = (0..30).map(|i| i as f64).collect();
        let b: Array1 = (0..30).map(|i| i as f64 + 100.0).collect();
        let chains = vec![vec![a], vec![b]];
        let result = find_convergence(&chains, 10, DEFAULT_THRESHOLD).unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 20);
    }

    #[test]
    fn test_find_convergence_short_chains() {
        let chains = vec![vec![vec![1.0, 2.0, 3.0]], vec![vec![2.0, 3.0, 1.0]]];
        let result = find_convergence(&chains, 10, DEFAULT_THRESHOLD).unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 3);
        assert!(result.psrf.is_empty());
        assert!(find_convergence(&chains, 0, DEFAULT_THRESHOLD).is_err());
    }
}
