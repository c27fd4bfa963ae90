use crate::rhat::num_parameters;
use crate::utils::read_csv;
use crate::{Array2, Array3};
use anyhow::{anyhow, Context, Error, Result};
use log::{debug, info};
use ndarray::Array3 as NdArray3;
use ndarray_npy::read_npy;
use std::path::{Path, PathBuf};

/// Read an MC3 output file: a float64 `.npy` array shaped
/// (chains, parameters, iterations).
pub fn read_chains_npy(path: &Path) -> Result<Array3, Error> {
    let arr: NdArray3<f64> =
        read_npy(path).with_context(|| format!("Can't read {} as a 3-D float64 array", path.display()))?;
    let (nchains, nparams, niter) = arr.dim();
    info!(
        "{}: {} chains, {} parameters, {} iterations",
        path.display(),
        nchains,
        nparams,
        niter
    );
    Ok(arr
        .outer_iter()
        .map(|chain| chain.outer_iter().map(|param| param.to_vec()).collect())
        .collect())
}

/// Read one chain per CSV file; columns are parameters and rows iterations.
pub fn read_chains_csv(paths: &[PathBuf], skip_rows: usize) -> Result<Array3, Error> {
    let mut chains = Vec::with_capacity(paths.len());
    for path in paths {
        let chain = read_csv(path, skip_rows, None)?;
        debug!(
            "{}: {} parameters, {} iterations",
            path.display(),
            chain.len(),
            chain.first().map_or(0, |c| c.len())
        );
        chains.push(chain);
    }
    num_parameters(&chains)?;
    Ok(chains)
}

/// Read chains from a single `.npy` file or from one CSV file per chain.
pub fn read_chains(paths: &[PathBuf], csv_skip_rows: usize) -> Result<Array3, Error> {
    match paths {
        [] => Err(anyhow!("No input files given")),
        [path] if is_npy(path) => read_chains_npy(path),
        _ if paths.iter().any(|p| is_npy(p)) => {
            Err(anyhow!("A .npy input must be the only file of a run"))
        }
        _ => read_chains_csv(paths, csv_skip_rows),
    }
}

fn is_npy(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("npy"))
}

/// Discard the first `burnin` iterations of every chain.
pub fn discard_burnin(chains: &Array3, burnin: usize) -> Result<Array3, Error> {
    num_parameters(chains)?;
    chains
        .iter()
        .enumerate()
        .map(|(c, chain)| {
            chain
                .iter()
                .map(|param| {
                    if burnin >= param.len() {
                        Err(anyhow!(
                            "Burn-in of {} leaves no samples in chain {} ({} iterations)",
                            burnin,
                            c,
                            param.len()
                        ))
                    } else {
                        Ok(param[burnin..].to_vec())
                    }
                })
                .collect::<Result<Array2, Error>>()
        })
        .collect()
}

/// Flatten chains into a (parameters, samples) posterior: burn-in is dropped
/// from each chain and the rest concatenated in chain order.
///
/// `log_shifts` lines up with the trailing parameters; every `Some(reference)`
/// adds `log10(reference)` to that parameter, turning abundances fitted
/// relative to a uniform reference profile into log abundances.
pub fn stack_posterior(chains: &Array3, burnin: usize, log_shifts: &[Option<f64>]) -> Result<Array2, Error> {
    let burned = discard_burnin(chains, burnin)?;
    let num_params = num_parameters(&burned)?;
    if log_shifts.len() > num_params {
        return Err(anyhow!(
            "{} log-abundance references for only {} parameters",
            log_shifts.len(),
            num_params
        ));
    }

    let mut posterior: Array2 = vec![Vec::new(); num_params];
    for chain in burned {
        for (row, samples) in posterior.iter_mut().zip(chain) {
            row.extend(samples);
        }
    }

    let first_shifted = num_params - log_shifts.len();
    for (k, shift) in log_shifts.iter().enumerate() {
        if let Some(reference) = shift {
            if !(*reference > 0.0) {
                return Err(anyhow!(
                    "Log-abundance reference must be positive, got {}",
                    reference
                ));
            }
            let offset = reference.log10();
            for x in posterior[first_shifted + k].iter_mut() {
                *x += offset;
            }
        }
    }
    Ok(posterior)
}
