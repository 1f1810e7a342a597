use ndarray::Array3;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::debug;

use crate::ale::compute_ale_subset;
use crate::error::{AleError, Result};
use crate::stats::percentile;

/// Mixing constant for deriving independent per-repeat seeds.
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Outcome of a (balanced) contrast: the observed difference map, the map
/// thresholded against the permutation null, and the null itself.
#[derive(Clone, Debug)]
pub struct ContrastResult {
    pub observed: Array3<f64>,
    pub significant: Array3<f64>,
    /// Per-repeat maximum absolute difference under label permutation.
    pub null_max_diff: Vec<f64>,
    pub threshold: f64,
}

fn pooled_volumes(ma_a: &[Array3<f64>], ma_b: &[Array3<f64>]) -> Vec<Array3<f64>> {
    ma_a.iter().chain(ma_b.iter()).cloned().collect()
}

fn max_abs(v: &Array3<f64>) -> f64 {
    v.iter().fold(0.0f64, |acc, &x| acc.max(x.abs()))
}

fn scoped_pool(nprocesses: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(nprocesses)
        .build()
        .map_err(|e| AleError::ThreadPool(e.to_string()))
}

/// Voxel-wise difference of two independent ALE analyses with a
/// label-permutation null: pool both experiment sets, re-split into
/// groups of the original sizes, record the extreme difference per
/// repeat. The caller must have removed experiments shared between the
/// pools beforehand.
pub fn compute_contrast(
    ma_a: &[Array3<f64>],
    ma_b: &[Array3<f64>],
    significance_threshold: f64,
    null_repeats: usize,
    nprocesses: usize,
    seed: u64,
) -> Result<ContrastResult> {
    if ma_a.is_empty() || ma_b.is_empty() {
        return Err(AleError::EmptyExperimentSet);
    }
    if null_repeats == 0 {
        return Err(AleError::Config("null_repeats must be positive".into()));
    }
    let n_a = ma_a.len();
    let pooled = pooled_volumes(ma_a, ma_b);
    let n = pooled.len();

    let idx_a: Vec<usize> = (0..n_a).collect();
    let idx_b: Vec<usize> = (n_a..n).collect();
    let observed = &compute_ale_subset(&pooled, &idx_a)? - &compute_ale_subset(&pooled, &idx_b)?;

    debug!(n_a, n_b = n - n_a, null_repeats, "permuting contrast labels");
    let null_max_diff: Vec<f64> = scoped_pool(nprocesses)?.install(|| {
        (0..null_repeats as u64)
            .into_par_iter()
            .map(|r| {
                let mut rng = StdRng::seed_from_u64(derive_seed(seed, r));
                let mut order: Vec<usize> = (0..n).collect();
                order.shuffle(&mut rng);
                let diff = &compute_ale_subset(&pooled, &order[..n_a])?
                    - &compute_ale_subset(&pooled, &order[n_a..])?;
                Ok(max_abs(&diff))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    Ok(threshold_contrast(
        observed,
        null_max_diff,
        significance_threshold,
    ))
}

/// Subsample-matched contrast: both sides are represented by repeated
/// random draws of `target_n` experiments, so a size imbalance between
/// the pools cannot drive the difference. The null re-splits the pooled
/// set into two disjoint groups of `target_n`.
pub fn compute_balanced_contrast(
    ma_a: &[Array3<f64>],
    ma_b: &[Array3<f64>],
    target_n: usize,
    significance_threshold: f64,
    difference_iterations: usize,
    null_repeats: usize,
    nprocesses: usize,
    seed: u64,
) -> Result<ContrastResult> {
    let smaller = ma_a.len().min(ma_b.len());
    if target_n == 0 || target_n > smaller {
        return Err(AleError::InvalidSubsample {
            total_n: smaller,
            target_n,
        });
    }
    if difference_iterations == 0 || null_repeats == 0 {
        return Err(AleError::Config(
            "difference_iterations and null_repeats must be positive".into(),
        ));
    }
    let n_a = ma_a.len();
    let pooled = pooled_volumes(ma_a, ma_b);
    let n = pooled.len();
    let dim = pooled[0].dim();

    let pool = scoped_pool(nprocesses)?;

    // Observed: mean difference over paired target_n draws.
    let observed_sum: Array3<f64> = pool.install(|| {
        (0..difference_iterations as u64)
            .into_par_iter()
            .map(|r| {
                let mut rng = StdRng::seed_from_u64(derive_seed(seed, r));
                let sub_a = draw(&mut rng, 0, n_a, target_n);
                let sub_b = draw(&mut rng, n_a, n, target_n);
                Ok::<_, AleError>(&compute_ale_subset(&pooled, &sub_a)?
                    - &compute_ale_subset(&pooled, &sub_b)?)
            })
            .try_reduce(
                || Array3::zeros(dim),
                |mut acc, d| {
                    acc += &d;
                    Ok(acc)
                },
            )
    })?;
    let observed = observed_sum / difference_iterations as f64;

    debug!(target_n, null_repeats, "permuting balanced contrast labels");
    let null_max_diff: Vec<f64> = pool.install(|| {
        (0..null_repeats as u64)
            .into_par_iter()
            .map(|r| {
                let mut rng = StdRng::seed_from_u64(derive_seed(seed ^ SEED_MIX, r));
                let mut order: Vec<usize> = (0..n).collect();
                order.shuffle(&mut rng);
                let diff = &compute_ale_subset(&pooled, &order[..target_n])?
                    - &compute_ale_subset(&pooled, &order[target_n..2 * target_n])?;
                Ok(max_abs(&diff))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    Ok(threshold_contrast(
        observed,
        null_max_diff,
        significance_threshold,
    ))
}

fn draw(rng: &mut StdRng, lo: usize, hi: usize, k: usize) -> Vec<usize> {
    let mut pool: Vec<usize> = (lo..hi).collect();
    pool.shuffle(rng);
    pool.truncate(k);
    pool
}

fn threshold_contrast(
    observed: Array3<f64>,
    null_max_diff: Vec<f64>,
    significance_threshold: f64,
) -> ContrastResult {
    let threshold = percentile(&null_max_diff, (1.0 - significance_threshold) * 100.0);
    let significant = observed.mapv(|v| if v.abs() > threshold { v } else { 0.0 });
    ContrastResult {
        observed,
        significant,
        null_max_diff,
        threshold,
    }
}

fn derive_seed(base: u64, repeat: u64) -> u64 {
    base.wrapping_add(repeat.wrapping_add(1).wrapping_mul(SEED_MIX))
}
