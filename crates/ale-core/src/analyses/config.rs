use serde::{Deserialize, Serialize};

use crate::template::Grid;

/// Parameters recognized by the analysis operations. Defaults match the
/// conventional ALE settings; a project file overrides individual fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AleConfig {
    /// Compute TFCE-corrected maps alongside vFWE/cFWE.
    pub tfce_enabled: bool,
    /// Take cutoffs from a predictor instead of Monte Carlo simulation.
    pub cutoff_predict_enabled: bool,
    /// Histogram bin width for null PDF estimation.
    pub bin_steps: f64,
    /// Cluster-forming threshold, as a p-value.
    pub cluster_forming_threshold: f64,
    /// Monte Carlo iterations for the simulated null.
    pub monte_carlo_iterations: usize,
    /// Worker threads for simulation and permutation loops.
    pub nprocesses: usize,
    /// Number of subsamples drawn for probabilistic ALE.
    pub subsample_n: usize,
    /// Significance level for contrast thresholds.
    pub significance_threshold: f64,
    /// Label permutations for contrast nulls.
    pub contrast_permutations: usize,
    /// Paired subsample draws for the balanced contrast observed map.
    pub difference_iterations: usize,
    /// Base seed; per-iteration seeds derive from it, so repeated runs
    /// reproduce bit-identical null distributions.
    pub seed: u64,
    /// Analysis grid; defaults to MNI152 at 2 mm.
    pub grid: Grid,
}

impl Default for AleConfig {
    fn default() -> Self {
        Self {
            tfce_enabled: true,
            cutoff_predict_enabled: false,
            bin_steps: 0.0001,
            cluster_forming_threshold: 0.001,
            monte_carlo_iterations: 5000,
            nprocesses: 2,
            subsample_n: 2500,
            significance_threshold: 0.05,
            contrast_permutations: 10_000,
            difference_iterations: 1000,
            seed: 0,
            grid: Grid::default(),
        }
    }
}

impl AleConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::AleError;
        if !(self.bin_steps > 0.0 && self.bin_steps < 1.0) {
            return Err(AleError::Config(format!(
                "bin_steps must be in (0, 1), got {}",
                self.bin_steps
            )));
        }
        if !(self.cluster_forming_threshold > 0.0 && self.cluster_forming_threshold < 1.0) {
            return Err(AleError::Config(format!(
                "cluster_forming_threshold must be in (0, 1), got {}",
                self.cluster_forming_threshold
            )));
        }
        if !(self.significance_threshold > 0.0 && self.significance_threshold < 1.0) {
            return Err(AleError::Config(format!(
                "significance_threshold must be in (0, 1), got {}",
                self.significance_threshold
            )));
        }
        if self.monte_carlo_iterations == 0 {
            return Err(AleError::Config(
                "monte_carlo_iterations must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Parameters for experiment clustering.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Largest number of clusters considered when scoring k.
    pub max_clusters: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self { max_clusters: 8 }
    }
}
