use crate::credregion::DomainBounds;
use anyhow::{anyhow, Context, Error, Result};
use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::Path, path::PathBuf};

/// A set of retrieval runs to analyse.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    pub runs: Vec<RunConfig>,
}

/// One retrieval run.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Label printed above the run's results
    pub name: String,
    /// A single `.npy` file, or one CSV file per chain
    pub files: Vec<PathBuf>,
    /// Leading iterations of each chain to discard
    #[serde(default)]
    pub burnin: usize,
    /// Reference abundances of the trailing parameters; `null` leaves a parameter as is
    #[serde(default)]
    pub log_shift: Vec<Option<f64>>,
    /// Parameter names, in file order
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Physical limits, by parameter name
    #[serde(default)]
    pub bounds: BTreeMap<String, DomainBounds>,
    /// Leading CSV lines to skip (e.g. a header row)
    #[serde(default)]
    pub csv_skip_rows: usize,
}

impl RunConfig {
    /// Name of parameter `index`, `p<index>` when not configured.
    pub fn parameter_name(&self, index: usize) -> String {
        self.parameters
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("p{}", index))
    }

    /// Domain bounds of the named parameter, none when not configured.
    pub fn bounds_for(&self, name: &str) -> DomainBounds {
        self.bounds.get(name).copied().unwrap_or_default()
    }

    /// Resolve relative input paths against `dir`.
    pub fn rebase(&mut self, dir: &Path) {
        for file in self.files.iter_mut() {
            if file.is_relative() {
                *file = dir.join(&*file);
            }
        }
    }
}

impl BatchConfig {
    /// Parse a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let config: BatchConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file. Relative input paths are taken
    /// relative to the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text =
            fs::read_to_string(path).with_context(|| format!("Can't read config {}", path.display()))?;
        let mut config =
            Self::from_json(&text).with_context(|| format!("Invalid config {}", path.display()))?;
        if let Some(dir) = path.parent() {
            for run in config.runs.iter_mut() {
                run.rebase(dir);
            }
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.runs.is_empty() {
            return Err(anyhow!("Config lists no runs"));
        }
        for run in &self.runs {
            if run.files.is_empty() {
                return Err(anyhow!("Run {} lists no input files", run.name));
            }
        }
        Ok(())
    }
}
