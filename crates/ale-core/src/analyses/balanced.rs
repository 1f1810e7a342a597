use tracing::info;

use crate::analyses::config::AleConfig;
use crate::analyses::contrast::{ma_for_pool, remove_shared_experiments};
use crate::analyses::probabilistic::probabilistic_ale;
use crate::contrast::compute_balanced_contrast;
use crate::error::{AleError, Result};
use crate::experiment::Experiment;
use crate::io::store::ResultStore;

/// Default subsample size when the project file leaves it unset:
/// bounded by the smaller pool (minus headroom) and pulled toward the
/// conventional size of 17.
pub fn default_target_n(n_a: usize, n_b: usize) -> usize {
    let smaller = n_a.min(n_b);
    let pulled = ((smaller as f64 + 17.0) / 2.0).floor() as usize;
    pulled.min(smaller.saturating_sub(2)).max(1)
}

/// Balanced (subsample-matched) contrast between two pools: both sides
/// are represented by repeated draws of `target_n` experiments, with a
/// pooled-relabel permutation null. Subsampled ALE maps are run first
/// when missing.
pub fn balanced_contrast(
    store: &dyn ResultStore,
    pools: &[Vec<Experiment>; 2],
    names: &[String; 2],
    target_n: usize,
    config: &AleConfig,
    on_progress: Option<&(dyn Fn(usize) + Sync)>,
) -> Result<()> {
    let result_key = format!("{}_vs_{}_balanced_{target_n}", names[0], names[1]);
    if store.exists(&result_key) {
        info!(contrast = %result_key, "balanced contrast results already exist");
        return Ok(());
    }

    // Prerequisite recovery: subsampled ALE per pool at this target_n.
    for (pool, name) in pools.iter().zip(names) {
        if !store.exists(&format!("{name}_sub_ale_{target_n}")) {
            info!(
                meta_name = %name,
                target_n,
                "running subsampled ALE as prerequisite for balanced contrast"
            );
            probabilistic_ale(
                store,
                pool,
                name,
                target_n,
                config.subsample_n,
                config,
                on_progress,
            )?;
        }
    }

    let (pool_a, pool_b) = remove_shared_experiments(&pools[0], &pools[1]);
    if pool_a.is_empty() || pool_b.is_empty() {
        return Err(AleError::EmptyExperimentSet);
    }
    info!(
        contrast = %result_key,
        n_a = pool_a.len(),
        n_b = pool_b.len(),
        target_n,
        "running balanced contrast analysis"
    );

    let ma_a = ma_for_pool(&pool_a, config)?;
    let ma_b = ma_for_pool(&pool_b, config)?;

    let result = compute_balanced_contrast(
        &ma_a,
        &ma_b,
        target_n,
        config.significance_threshold,
        config.difference_iterations,
        config.contrast_permutations,
        config.nprocesses,
        config.seed,
    )?;

    let affine = config.grid.affine;
    store.save_volume(&result_key, &result.observed, &affine)?;
    store.save_volume(&format!("{result_key}_sig"), &result.significant, &affine)?;
    store.save_table(&format!("{result_key}_null"), &[result.null_max_diff.clone()])?;
    info!(
        contrast = %result_key,
        threshold = result.threshold,
        "balanced contrast done"
    );
    Ok(())
}
