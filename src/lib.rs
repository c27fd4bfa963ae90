//! Posterior analysis for MCMC atmospheric retrievals: highest posterior density
//! credible regions, Gelman Rubin potential scale reduction factor, an
//! autocorrelation based effective sample size, and batch reporting over MC3
//! `output.npy` files.
//!
//! The numerical routines work on plain vectors and are independent of the
//! sampler that produced the chains.
#[cfg(test)]
#[macro_use]
extern crate approx;

/// Batch run configuration
pub mod config;
/// Highest posterior density credible regions
pub mod credregion;
/// Effective Sample Size (ESS) from the integrated autocorrelation time
pub mod ess;
/// Gaussian kernel density estimation
pub mod kde;
/// Loading chains and stacking them into a flat posterior
pub mod posterior;
/// Console formatting and batch drivers
pub mod report;
/// Gelman-Rubin potential scale reduction factor (Rhat)
pub mod rhat;
/// Summary statistics, grids, interpolation and lightweight CSV reading
pub mod utils;

/// One-dimensional vector of numeric values
pub type Array1 = Vec<f64>;
/// Two dimensional vector of vectors of numeric values
pub type Array2 = Vec<Array1>;
/// Chains x parameters x iterations, the layout of an MC3 output file
pub type Array3 = Vec<Array2>;

pub use credregion::{credregion, CredRegionError, CredRegionOptions, CredibleRegions, DomainBounds};
pub use kde::{BandwidthRule, GaussianKde};
