use ndarray::{Array2, Array3};

use crate::consts::{HISTOGRAM_MARGIN, MIN_TAIL_P};
use crate::error::{AleError, Result};
use crate::kernel::max_ale_value;
use crate::stats::z_from_p;

/// Discretization of the ALE value range for null-distribution
/// estimation. A value maps to bin `round(value * step)`; centers are
/// spaced `1/step` apart from 0 up past the largest attainable ALE score.
#[derive(Clone, Debug)]
pub struct HistogramBins {
    pub centers: Vec<f64>,
    pub step: usize,
}

impl HistogramBins {
    /// Size bins for a set of experiment kernels. `bin_steps` is the bin
    /// width (default 1e-4).
    pub fn for_kernels(kernels: &[Array3<f64>], bin_steps: f64) -> Result<Self> {
        if kernels.is_empty() {
            return Err(AleError::EmptyExperimentSet);
        }
        if !(bin_steps > 0.0 && bin_steps < 1.0) {
            return Err(AleError::Histogram(format!(
                "bin_steps must be in (0, 1), got {bin_steps}"
            )));
        }
        let step = (1.0 / bin_steps).round() as usize;
        let max_ale = max_ale_value(kernels);
        let n_bins = ((max_ale + HISTOGRAM_MARGIN) * step as f64).ceil() as usize + 1;
        let centers = (0..n_bins).map(|i| i as f64 / step as f64).collect();
        Ok(Self { centers, step })
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// Bin index of a value, clamped to the bin range.
    pub fn index_of(&self, v: f64) -> usize {
        let idx = (v * self.step as f64).round();
        if idx < 0.0 {
            0
        } else {
            (idx as usize).min(self.centers.len() - 1)
        }
    }
}

/// Histogram one MA volume's voxel values into a bin-count row.
pub fn hx_row(ma: &Array3<f64>, bins: &HistogramBins) -> Vec<f64> {
    let mut row = vec![0.0f64; bins.len()];
    for &v in ma.iter() {
        row[bins.index_of(v)] += 1.0;
    }
    row
}

/// Per-experiment voxel-value histograms: a discrete approximation of
/// each experiment's MA distribution under the null, where focus
/// locations carry no information.
pub fn compute_hx(ma: &[Array3<f64>], bins: &HistogramBins) -> Array2<f64> {
    let mut hx = Array2::<f64>::zeros((ma.len(), bins.len()));
    for (i, vol) in ma.iter().enumerate() {
        let row = hx_row(vol, bins);
        for (j, v) in row.into_iter().enumerate() {
            hx[[i, j]] = v;
        }
    }
    hx
}

fn normalized_row(hx: &Array2<f64>, row: usize) -> Result<Vec<f64>> {
    let total: f64 = hx.row(row).sum();
    if total <= 0.0 {
        return Err(AleError::Histogram(format!("histogram row {row} is empty")));
    }
    Ok(hx.row(row).iter().map(|&v| v / total).collect())
}

fn nonzero_indices(v: &[f64]) -> Vec<usize> {
    v.iter()
        .enumerate()
        .filter(|(_, &p)| p > 0.0)
        .map(|(i, _)| i)
        .collect()
}

/// Null PMF of the combined ALE statistic over a chosen subset of
/// experiments, by iterated discrete convolution of the per-experiment
/// histograms under the ALE combination rule. This replaces a
/// brute-force spatial permutation per voxel.
///
/// The result sums to 1 (it is a probability mass function).
pub fn hx_conv_subset(
    hx: &Array2<f64>,
    subset: &[usize],
    bins: &HistogramBins,
) -> Result<Vec<f64>> {
    let mut iter = subset.iter();
    let &first = iter.next().ok_or(AleError::EmptyExperimentSet)?;
    let mut ale_hist = normalized_row(hx, first)?;

    for &row in iter {
        let v2 = normalized_row(hx, row)?;
        let da1 = nonzero_indices(&ale_hist);
        let da2 = nonzero_indices(&v2);

        let mut next = vec![0.0f64; bins.len()];
        for &i in &da2 {
            let ci = bins.centers[i];
            let pi = v2[i];
            for &j in &da1 {
                // Combined score of two independent contributions.
                let score = 1.0 - (1.0 - ci) * (1.0 - bins.centers[j]);
                next[bins.index_of(score)] += pi * ale_hist[j];
            }
        }
        ale_hist = next;
    }
    Ok(ale_hist)
}

/// Null PMF over all experiments.
pub fn compute_hx_conv(hx: &Array2<f64>, bins: &HistogramBins) -> Result<Vec<f64>> {
    let all: Vec<usize> = (0..hx.nrows()).collect();
    hx_conv_subset(hx, &all, bins)
}

/// Right-tail survival function of a PMF: `out[i] = P(score >= center_i)`.
pub fn survival_function(pmf: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0f64; pmf.len()];
    let mut acc = 0.0;
    for i in (0..pmf.len()).rev() {
        acc += pmf[i];
        out[i] = acc;
    }
    out
}

/// Convert an ALE volume into one-sided z-scores against the convolved
/// null PMF. ALE values of exactly 0 map to z = 0; values past the last
/// bin clamp to the last bin; tail probabilities floor at `MIN_TAIL_P`
/// so z stays finite.
pub fn compute_z(ale: &Array3<f64>, hx_conv: &[f64], step: usize) -> Array3<f64> {
    let survival = survival_function(hx_conv);
    let last = survival.len() - 1;
    ale.mapv(|v| {
        if v <= 0.0 {
            return 0.0;
        }
        let idx = ((v * step as f64).round() as usize).min(last);
        let p = survival[idx].clamp(MIN_TAIL_P, 1.0);
        if p >= 1.0 {
            0.0
        } else {
            z_from_p(p)
        }
    })
}
