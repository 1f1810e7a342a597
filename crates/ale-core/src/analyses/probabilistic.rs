use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::analyses::config::AleConfig;
use crate::analyses::main_effect::monte_carlo_cached;
use crate::error::{AleError, Result};
use crate::experiment::Experiment;
use crate::histogram::{compute_hx, HistogramBins};
use crate::io::store::ResultStore;
use crate::kernel::kernel_array;
use crate::ma::compute_ma;
use crate::stats::percentile;
use crate::subsample::{compute_sub_ale, generate_unique_subsamples};

/// Probabilistic (subsampled) ALE: a cluster cutoff from a subsampled
/// Monte Carlo null, then the consensus map over `sample_n` unique
/// subsamples of `target_n` experiments. Skips when the consensus map
/// already exists.
pub fn probabilistic_ale(
    store: &dyn ResultStore,
    experiments: &[Experiment],
    meta_name: &str,
    target_n: usize,
    sample_n: usize,
    config: &AleConfig,
    on_progress: Option<&(dyn Fn(usize) + Sync)>,
) -> Result<()> {
    let result_key = format!("{meta_name}_sub_ale_{target_n}");
    if store.exists(&result_key) {
        info!(meta_name, target_n, "probabilistic ALE results already exist");
        return Ok(());
    }
    if experiments.is_empty() {
        return Err(AleError::EmptyExperimentSet);
    }
    if target_n == 0 || target_n > experiments.len() {
        return Err(AleError::InvalidSubsample {
            total_n: experiments.len(),
            target_n,
        });
    }

    info!(meta_name, target_n, sample_n, "running probabilistic ALE");
    let kernels = kernel_array(experiments, config.grid.voxel_size_mm)?;
    let bins = HistogramBins::for_kernels(&kernels, config.bin_steps)?;

    // Subsampled cluster cutoff; TFCE plays no role in the subsampled
    // consensus map.
    let null = monte_carlo_cached(
        store,
        &format!("{meta_name}_montecarlo_{target_n}"),
        experiments,
        &kernels,
        &bins,
        config,
        Some(target_n),
        false,
        on_progress,
    )?;
    let cfwe_threshold = percentile(&null.max_cluster, 95.0);

    let foci: Vec<Vec<[usize; 3]>> = experiments.iter().map(|e| e.foci.clone()).collect();
    let ma = compute_ma(&foci, &kernels, &config.grid);
    let hx = compute_hx(&ma, &bins);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let samples =
        generate_unique_subsamples(experiments.len(), target_n, sample_n, &mut rng)?;
    let consensus = compute_sub_ale(
        &samples,
        &ma,
        &hx,
        cfwe_threshold,
        &bins,
        config.cluster_forming_threshold,
    )?;

    store.save_volume(&result_key, &consensus, &config.grid.affine)?;
    info!(meta_name, target_n, "probabilistic ALE done");
    Ok(())
}
