use std::collections::HashSet;

use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use tracing::warn;

use crate::ale::compute_ale_subset;
use crate::clusters::compute_clusters;
use crate::error::{AleError, Result};
use crate::histogram::{compute_z, hx_conv_subset, HistogramBins};

/// Number of distinct k-subsets of an n-set, saturating to infinity once
/// it stops mattering for capping purposes.
fn n_combinations(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    let mut c = 1.0f64;
    for i in 0..k {
        c = c * (n - i) as f64 / (i + 1) as f64;
        if c > 1e15 {
            return f64::INFINITY;
        }
    }
    c
}

/// Draw `sample_n` subsets of size `target_n` from `{0, .., total_n-1}`:
/// no repeated index within a subset, no two identical subsets across the
/// batch. When `sample_n` exceeds the number of combinatorially distinct
/// subsets the batch is capped with a warning.
pub fn generate_unique_subsamples(
    total_n: usize,
    target_n: usize,
    sample_n: usize,
    rng: &mut StdRng,
) -> Result<Vec<Vec<usize>>> {
    if target_n == 0 || target_n > total_n {
        return Err(AleError::InvalidSubsample { total_n, target_n });
    }

    let distinct = n_combinations(total_n, target_n);
    let mut wanted = sample_n;
    if (sample_n as f64) > distinct {
        warn!(
            sample_n,
            distinct, "requested more subsamples than distinct subsets exist; capping"
        );
        wanted = distinct as usize;
    }

    let mut seen: HashSet<Vec<usize>> = HashSet::with_capacity(wanted);
    let mut out: Vec<Vec<usize>> = Vec::with_capacity(wanted);
    let mut pool: Vec<usize> = (0..total_n).collect();

    while out.len() < wanted {
        // Partial Fisher-Yates, then sort so duplicates collide.
        for i in 0..target_n {
            let j = rng.random_range(i..total_n);
            pool.swap(i, j);
        }
        let mut subset: Vec<usize> = pool[..target_n].to_vec();
        subset.sort_unstable();
        if seen.insert(subset.clone()) {
            out.push(subset);
        }
    }
    Ok(out)
}

/// Probabilistic (subsampled) ALE consensus map.
///
/// For each subset: ALE restricted to the subset's MA volumes, the
/// subset's own convolved null, z, cluster thresholding at the supplied
/// cFWE cutoff; the surviving-cluster map is binarized. The result is the
/// voxel-wise mean of those maps across subsets: the fraction of
/// subsamples in which each voxel reached significance.
///
/// `hx` holds the precomputed per-experiment histogram rows for the full
/// experiment set; rows depend only on single MA volumes, so subsets
/// re-convolve without re-histogramming.
pub fn compute_sub_ale(
    samples: &[Vec<usize>],
    ma: &[Array3<f64>],
    hx: &Array2<f64>,
    cfwe_threshold: f64,
    bins: &HistogramBins,
    cluster_forming_threshold: f64,
) -> Result<Array3<f64>> {
    if samples.is_empty() {
        return Err(AleError::EmptyExperimentSet);
    }
    let dim = ma[0].dim();

    let sum = samples
        .par_iter()
        .map(|subset| {
            let ale = compute_ale_subset(ma, subset)?;
            let hx_conv = hx_conv_subset(hx, subset, bins)?;
            let z = compute_z(&ale, &hx_conv, bins.step);
            let (map, _) = compute_clusters(&z, cluster_forming_threshold, cfwe_threshold);
            Ok::<_, AleError>(map.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }))
        })
        .try_reduce(
            || Array3::zeros(dim),
            |mut acc, m| {
                acc += &m;
                Ok(acc)
            },
        )?;

    Ok(sum / samples.len() as f64)
}
