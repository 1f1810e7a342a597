use std::collections::HashSet;

use tracing::info;

use crate::analyses::config::AleConfig;
use crate::analyses::main_effect::main_effect;
use crate::contrast::compute_contrast;
use crate::cutoff::CutoffPredictor;
use crate::error::{AleError, Result};
use crate::experiment::Experiment;
use crate::io::store::ResultStore;
use crate::kernel::kernel_array;
use crate::ma::compute_ma;

/// Drop experiments appearing in both pools; a contrast must compare
/// disjoint evidence.
pub fn remove_shared_experiments(
    pool_a: &[Experiment],
    pool_b: &[Experiment],
) -> (Vec<Experiment>, Vec<Experiment>) {
    let articles_a: HashSet<&str> = pool_a.iter().map(|e| e.article.as_str()).collect();
    let articles_b: HashSet<&str> = pool_b.iter().map(|e| e.article.as_str()).collect();
    let shared: HashSet<&str> = articles_a.intersection(&articles_b).copied().collect();

    let keep = |pool: &[Experiment]| {
        pool.iter()
            .filter(|e| !shared.contains(e.article.as_str()))
            .cloned()
            .collect::<Vec<_>>()
    };
    (keep(pool_a), keep(pool_b))
}

pub(crate) fn ma_for_pool(
    pool: &[Experiment],
    config: &AleConfig,
) -> Result<Vec<ndarray::Array3<f64>>> {
    let kernels = kernel_array(pool, config.grid.voxel_size_mm)?;
    let foci: Vec<Vec<[usize; 3]>> = pool.iter().map(|e| e.foci.clone()).collect();
    Ok(compute_ma(&foci, &kernels, &config.grid))
}

/// Contrast between two meta-analyses: main effects are run first when
/// their maps are missing, shared experiments are removed, then the
/// observed ALE difference is tested against a label-permutation null.
pub fn contrast(
    store: &dyn ResultStore,
    pools: &[Vec<Experiment>; 2],
    names: &[String; 2],
    config: &AleConfig,
    predictor: Option<&dyn CutoffPredictor>,
    on_progress: Option<&(dyn Fn(usize) + Sync)>,
) -> Result<()> {
    let result_key = format!("{}_vs_{}", names[0], names[1]);
    if store.exists(&result_key) {
        info!(contrast = %result_key, "contrast results already exist");
        return Ok(());
    }

    // Prerequisite recovery: a contrast needs both main effects.
    for (pool, name) in pools.iter().zip(names) {
        if !store.exists(&format!("{name}_cfwe")) {
            info!(
                meta_name = %name,
                "running main effect as prerequisite for contrast analysis"
            );
            main_effect(store, pool, name, config, predictor, on_progress)?;
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
        "running contrast analysis"
    );

    let ma_a = ma_for_pool(&pool_a, config)?;
    let ma_b = ma_for_pool(&pool_b, config)?;

    let result = compute_contrast(
        &ma_a,
        &ma_b,
        config.significance_threshold,
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
        "contrast analysis done"
    );
    Ok(())
}
