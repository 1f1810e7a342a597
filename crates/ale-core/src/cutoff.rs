use crate::error::Result;
use crate::experiment::Experiment;

/// Multiple-comparisons-corrected significance cutoffs for one analysis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cutoffs {
    /// Voxel-wise FWE threshold on the ALE scale.
    pub voxel: f64,
    /// Cluster-wise FWE threshold on cluster z-mass.
    pub cluster: f64,
    /// TFCE threshold, when TFCE is enabled.
    pub tfce: Option<f64>,
}

/// A source of corrected cutoffs that stands in for Monte Carlo
/// simulation, e.g. a pretrained regression over experiment summary
/// statistics. The model itself lives outside the engine; this is the
/// seam it plugs into.
pub trait CutoffPredictor: Send + Sync {
    fn predict(&self, experiments: &[Experiment]) -> Result<Cutoffs>;
}

/// Returns the same cutoffs for any experiment set. Useful in tests and
/// for externally supplied fixed thresholds.
#[derive(Clone, Copy, Debug)]
pub struct FixedCutoffs(pub Cutoffs);

impl CutoffPredictor for FixedCutoffs {
    fn predict(&self, _experiments: &[Experiment]) -> Result<Cutoffs> {
        Ok(self.0)
    }
}
