use crate::config::RunConfig;
use crate::credregion::{credregion, CredRegionOptions, CredibleRegions};
use crate::ess::{credible_region_uncertainty, effective_sample_size, EssReport};
use crate::kde::BandwidthRule;
use crate::posterior::{discard_burnin, read_chains, stack_posterior};
use anyhow::{Error, Result};
use log::{info, warn};
use std::io::Write;

/// Analysis settings shared by every run of a credible-region batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CredRegionSettings {
    pub masses: Vec<f64>,
    pub grid_points: usize,
    pub bandwidth: BandwidthRule,
}

/// Analysis settings shared by every run of an ESS batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EssSettings {
    /// Iterations added between Gelman-Rubin tests
    pub step: usize,
    pub threshold: f64,
    /// Probabilities whose uncertainty is reported
    pub masses: Vec<f64>,
}

/// Scientific notation with a signed two-digit exponent, right aligned to
/// `width` (`1.2346e-03` rather than `1.2346e-3`).
pub fn format_sci(value: f64, width: usize, precision: usize) -> String {
    let text = if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        (if value > 0.0 { "inf" } else { "-inf" }).to_string()
    } else {
        let raw = format!("{:.*e}", precision, value);
        match raw.split_once('e') {
            Some((mantissa, exponent)) => {
                let exponent: i32 = exponent.parse().unwrap_or(0);
                let sign = if exponent < 0 { '-' } else { '+' };
                format!("{}e{}{:02}", mantissa, sign, exponent.abs())
            }
            None => raw,
        }
    };
    format!("{:>width$}", text, width = width)
}

/// A region as a union of intervals: `(lo, hi) U (lo, hi)`.
pub fn format_region(intervals: &[(f64, f64)]) -> String {
    intervals
        .iter()
        .map(|(lo, hi)| format!("({}, {})", format_sci(*lo, 10, 4), format_sci(*hi, 10, 4)))
        .collect::<Vec<_>>()
        .join(" U ")
}

/// Probability as a percentage label, e.g. `68.27%`.
pub fn format_mass(mass: f64) -> String {
    format!("{:.2}%", mass * 100.0)
}

/// Write one parameter's credible regions, one line per mass.
pub fn write_regions<W: Write>(
    out: &mut W,
    name: &str,
    masses: &[f64],
    regions: &CredibleRegions,
) -> Result<(), Error> {
    writeln!(out, "  {}", name)?;
    for (i, &mass) in masses.iter().enumerate() {
        writeln!(out, "  {}: {}", format_mass(mass), format_region(&regions.intervals(i)))?;
    }
    Ok(())
}

/// Credible regions of every parameter of a run.
///
/// A parameter whose regions can't be estimated is logged and reported as
/// failed; the remaining parameters are still processed. Errors loading the
/// run itself are returned.
pub fn report_credible_regions<W: Write>(
    out: &mut W,
    run: &RunConfig,
    settings: &CredRegionSettings,
) -> Result<(), Error> {
    info!("Credible regions of {}", run.name);
    let chains = read_chains(&run.files, run.csv_skip_rows)?;
    let posterior = stack_posterior(&chains, run.burnin, &run.log_shift)?;
    if !run.parameters.is_empty() && run.parameters.len() != posterior.len() {
        warn!(
            "{}: {} parameter names for {} parameters",
            run.name,
            run.parameters.len(),
            posterior.len()
        );
    }

    writeln!(out, "{}", run.name)?;
    for (p, samples) in posterior.iter().enumerate() {
        let name = run.parameter_name(p);
        let options = CredRegionOptions {
            bounds: run.bounds_for(&name),
            grid_points: settings.grid_points,
            bandwidth: settings.bandwidth,
        };
        match credregion(samples, &settings.masses, &options) {
            Ok(regions) => write_regions(out, &name, &settings.masses, &regions)?,
            Err(e) => {
                warn!("{}: parameter {} failed: {}", run.name, name, e);
                writeln!(out, "  {}", name)?;
                writeln!(out, "  failed: {}", e)?;
            }
        }
    }
    writeln!(out)?;
    Ok(())
}

/// Write an ESS report and the uncertainty of each probability in `masses`.
pub fn write_ess<W: Write>(
    out: &mut W,
    report: &EssReport,
    threshold: f64,
    masses: &[f64],
) -> Result<(), Error> {
    let convergence = &report.convergence;
    if convergence.converged {
        writeln!(
            out,
            "  All parameters converged to within {} at iteration {}",
            threshold, convergence.iterations
        )?;
    } else {
        writeln!(
            out,
            "  Not converged to within {}; using {} iterations",
            threshold, convergence.iterations
        )?;
    }
    writeln!(out, "  SPEIS: {}", report.speis)?;
    writeln!(out, "  ESS  : {}", report.ess())?;
    let sigma = credible_region_uncertainty(report.ess_f64(), masses);
    for (p, s) in masses.iter().zip(sigma.iter()) {
        writeln!(out, "  {}\u{00B1}{}", p, s)?;
    }
    Ok(())
}

/// Effective sample size of a run.
pub fn report_ess<W: Write>(out: &mut W, run: &RunConfig, settings: &EssSettings) -> Result<(), Error> {
    info!("Effective sample size of {}", run.name);
    let chains = read_chains(&run.files, run.csv_skip_rows)?;
    let burned = discard_burnin(&chains, run.burnin)?;
    let report = effective_sample_size(&burned, settings.step, settings.threshold)?;

    writeln!(out, "{}", run.name)?;
    write_ess(out, &report, settings.threshold, &settings.masses)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credregion::DEFAULT_MASSES;
    use crate::ess::DEFAULT_UNCERTAINTY_MASSES;
    use crate::rhat::Convergence;
    use std::path::PathBuf;

    #[test]
    fn test_format_sci() {
        assert_eq!(format_sci(0.00123457, 10, 4), "1.2346e-03");
        assert_eq!(format_sci(-12345.0, 10, 4), "-1.2345e+04");
        assert_eq!(format_sci(0.0, 10, 4), "0.0000e+00");
        assert_eq!(format_sci(1.5, 12, 2), "    1.50e+00");
        assert_eq!(format_sci(f64::NAN, 5, 4), "  nan");
    }

    #[test]
    fn test_format_region() {
        assert_eq!(format_region(&[]), "");
        assert_eq!(
            format_region(&[(-1.0, 2.5), (3.0, 40.0)]),
            "(-1.0000e+00, 2.5000e+00) U (3.0000e+00, 4.0000e+01)"
        );
        assert_eq!(format_mass(0.6827), "68.27%");
        assert_eq!(format_mass(0.9973), "99.73%");
    }

    #[test]
    fn test_write_ess() {
        let report = EssReport {
            speis: 3,
            total_iterations: 80,
            convergence: Convergence {
                iterations: 10,
                converged: true,
                psrf: vec![0.95],
            },
        };
        let mut out = Vec::new();
        write_ess(&mut out, &report, 1.01, &[0.5]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("converged to within 1.01 at iteration 10"));
        assert!(text.contains("  SPEIS: 3\n"));
        assert!(text.contains("  ESS  : 26\n"));
        assert!(text.contains("  0.5\u{00B1}0.0"));
    }

    fn csv_run(dir: &std::path::Path) -> RunConfig {
        let mut files = Vec::new();
        for c in 0..2 {
            let path = dir.join(format!("chain{}.csv", c));
            let mut f = std::fs::File::create(&path).unwrap();
            for i in 0..400 {
                let x = ((i * 37 + c * 11) % 101) as f64 / 10.0;
                writeln!(f, "{},7.0,{}", x, (i % 5) as f64).unwrap();
            }
            files.push(path);
        }
        RunConfig {
            name: "synthetic".to_string(),
            files,
            burnin: 100,
            log_shift: vec![Some(10.0)],
            parameters: vec!["kappa".to_string(), "flat".to_string()],
            bounds: Default::default(),
            csv_skip_rows: 0,
        }
    }

    #[test]
    fn test_report_credible_regions() {
        let dir = tempfile::tempdir().unwrap();
        let run = csv_run(dir.path());
        let settings = CredRegionSettings {
            masses: DEFAULT_MASSES.to_vec(),
            grid_points: 20,
            bandwidth: BandwidthRule::Scott,
        };
        let mut out = Vec::new();
        report_credible_regions(&mut out, &run, &settings).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "synthetic");
        assert_eq!(lines[1], "  kappa");
        assert!(lines[2].starts_with("  68.27%: ("));
        assert!(lines[4].starts_with("  99.73%: ("));
        // the constant parameter fails alone
        assert_eq!(lines[5], "  flat");
        assert!(lines[6].starts_with("  failed: degenerate distribution"));
        assert_eq!(lines[7], "  p2");
        assert!(lines[8].starts_with("  68.27%: ("));
    }

    #[test]
    fn test_report_ess() {
        let dir = tempfile::tempdir().unwrap();
        let mut run = csv_run(dir.path());
        // drop the constant column, which has no autocorrelation
        for (c, file) in run.files.iter().enumerate() {
            let mut f = std::fs::File::create(file).unwrap();
            for i in 0..400 {
                let x = ((i * 37 + c * 11) % 101) as f64 / 10.0;
                writeln!(f, "{},{}", x, ((i * 13 + c) % 7) as f64).unwrap();
            }
        }
        run.log_shift.clear();
        let settings = EssSettings {
            step: 100,
            threshold: 1.01,
            masses: DEFAULT_UNCERTAINTY_MASSES.to_vec(),
        };
        let mut out = Vec::new();
        report_ess(&mut out, &run, &settings).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("synthetic\n"));
        assert!(text.contains("  SPEIS: "));
        assert!(text.contains("  0.68269\u{00B1}"));
    }

    #[test]
    fn test_report_missing_file() {
        let run = RunConfig {
            name: "missing".to_string(),
            files: vec![PathBuf::from("/nonexistent/output.npy")],
            burnin: 0,
            log_shift: vec![],
            parameters: vec![],
            bounds: Default::default(),
            csv_skip_rows: 0,
        };
        let settings = CredRegionSettings {
            masses: DEFAULT_MASSES.to_vec(),
            grid_points: 20,
            bandwidth: BandwidthRule::Scott,
        };
        let mut out = Vec::new();
        assert!(report_credible_regions(&mut out, &run, &settings).is_err());
    }
}
