use ndarray::Array3;
use tracing::{debug, info};

use crate::ale::compute_ale;
use crate::analyses::config::AleConfig;
use crate::clusters::compute_clusters;
use crate::cutoff::{CutoffPredictor, Cutoffs};
use crate::error::{AleError, Result};
use crate::experiment::Experiment;
use crate::histogram::{compute_hx, compute_hx_conv, compute_z, HistogramBins};
use crate::io::store::ResultStore;
use crate::kernel::kernel_array;
use crate::ma::{compute_ma, illustrate_foci};
use crate::montecarlo::{compute_monte_carlo_null, MonteCarloNull, MonteCarloParams};
use crate::stats::percentile;
use crate::template::SamplingMask;
use crate::tfce::compute_tfce;

/// Corrected cutoffs are the 95th percentile of the simulated extreme
/// values: one-sided FWE at alpha = 0.05.
const FWE_PERCENTILE: f64 = 95.0;

fn foci_of(experiments: &[Experiment]) -> Vec<Vec<[usize; 3]>> {
    experiments.iter().map(|e| e.foci.clone()).collect()
}

fn focus_counts_of(experiments: &[Experiment]) -> Vec<usize> {
    experiments.iter().map(|e| e.focus_count()).collect()
}

/// Load a cached Monte Carlo null or simulate and cache it. The store
/// entry is a whole-result memoization: present means complete.
#[allow(clippy::too_many_arguments)]
pub(crate) fn monte_carlo_cached(
    store: &dyn ResultStore,
    key: &str,
    experiments: &[Experiment],
    kernels: &[Array3<f64>],
    bins: &HistogramBins,
    config: &AleConfig,
    target_n: Option<usize>,
    tfce_enabled: bool,
    on_progress: Option<&(dyn Fn(usize) + Sync)>,
) -> Result<MonteCarloNull> {
    if store.exists(key) {
        info!(key, "loading cached null distribution");
        let rows = store.load_table(key)?;
        if rows.len() < 2 {
            return Err(AleError::InvalidVolume(format!(
                "null table {key} has {} rows, expected at least 2",
                rows.len()
            )));
        }
        let mut rows = rows.into_iter();
        let null = MonteCarloNull {
            max_ale: rows.next().unwrap_or_default(),
            max_cluster: rows.next().unwrap_or_default(),
            max_tfce: rows.next().unwrap_or_default(),
        };
        if null.max_ale.is_empty() || null.max_cluster.is_empty() {
            return Err(AleError::InvalidVolume(format!(
                "null table {key} has empty distributions"
            )));
        }
        return Ok(null);
    }

    info!(key, iterations = config.monte_carlo_iterations, "simulating null distribution");
    let mask = SamplingMask::full(&config.grid);
    let focus_counts = focus_counts_of(experiments);
    let params = MonteCarloParams {
        focus_counts: &focus_counts,
        kernels,
        bins,
        grid: &config.grid,
        mask: &mask,
        cluster_forming_threshold: config.cluster_forming_threshold,
        target_n,
        tfce_enabled,
        iterations: config.monte_carlo_iterations,
        nprocesses: config.nprocesses,
        seed: config.seed,
    };
    let null = compute_monte_carlo_null(&params, on_progress)?;

    store.save_table(
        key,
        &[
            null.max_ale.clone(),
            null.max_cluster.clone(),
            null.max_tfce.clone(),
        ],
    )?;
    Ok(null)
}

/// Compute and persist the main-effect map for one meta-analysis:
/// MA and ALE volumes, the histogram-based null PDF, z and TFCE maps,
/// corrected cutoffs (simulated or predicted), and the thresholded
/// vFWE/cFWE/TFCE maps. Skips entirely when the cFWE result exists.
pub fn main_effect(
    store: &dyn ResultStore,
    experiments: &[Experiment],
    meta_name: &str,
    config: &AleConfig,
    predictor: Option<&dyn CutoffPredictor>,
    on_progress: Option<&(dyn Fn(usize) + Sync)>,
) -> Result<()> {
    let cfwe_key = format!("{meta_name}_cfwe");
    if store.exists(&cfwe_key) {
        info!(meta_name, "main effect results already exist");
        return Ok(());
    }
    if experiments.is_empty() {
        return Err(AleError::EmptyExperimentSet);
    }

    let total_foci: usize = experiments.iter().map(|e| e.focus_count()).sum();
    info!(
        meta_name,
        experiments = experiments.len(),
        total_foci,
        "running main-effect analysis"
    );
    for e in experiments {
        debug!(
            meta_name,
            article = %e.article,
            subjects = e.subjects,
            foci = e.focus_count(),
            "included experiment"
        );
    }

    let kernels = kernel_array(experiments, config.grid.voxel_size_mm)?;
    let bins = HistogramBins::for_kernels(&kernels, config.bin_steps)?;
    let foci = foci_of(experiments);
    let affine = config.grid.affine;

    let foci_key = format!("{meta_name}_foci");
    if !store.exists(&foci_key) {
        store.save_volume(&foci_key, &illustrate_foci(&foci, &config.grid), &affine)?;
    }

    let ma = compute_ma(&foci, &kernels, &config.grid);

    let ale_key = format!("{meta_name}_ale");
    let ale = if store.exists(&ale_key) {
        info!(meta_name, "loading ALE volume");
        store.load_volume(&ale_key)?
    } else {
        let ale = compute_ale(&ma)?;
        store.save_volume(&ale_key, &ale, &affine)?;
        ale
    };

    let hx = compute_hx(&ma, &bins);
    let hx_conv = compute_hx_conv(&hx, &bins)?;

    let z_key = format!("{meta_name}_z");
    let z = if store.exists(&z_key) {
        info!(meta_name, "loading z volume");
        store.load_volume(&z_key)?
    } else {
        let z = compute_z(&ale, &hx_conv, bins.step);
        store.save_volume(&z_key, &z, &affine)?;
        z
    };

    let tfce = if config.tfce_enabled {
        let tfce_key = format!("{meta_name}_tfce_uncorrected");
        if store.exists(&tfce_key) {
            Some(store.load_volume(&tfce_key)?)
        } else {
            let tfce = compute_tfce(&z);
            store.save_volume(&tfce_key, &tfce, &affine)?;
            Some(tfce)
        }
    } else {
        None
    };

    let cutoffs = if config.cutoff_predict_enabled {
        match predictor {
            Some(p) => {
                info!(meta_name, "predicting cutoffs");
                p.predict(experiments)?
            }
            None => {
                return Err(AleError::Config(
                    "cutoff_predict_enabled but no predictor supplied".into(),
                ))
            }
        }
    } else {
        let null = monte_carlo_cached(
            store,
            &format!("{meta_name}_montecarlo"),
            experiments,
            &kernels,
            &bins,
            config,
            None,
            config.tfce_enabled,
            on_progress,
        )?;
        Cutoffs {
            voxel: percentile(&null.max_ale, FWE_PERCENTILE),
            cluster: percentile(&null.max_cluster, FWE_PERCENTILE),
            tfce: if null.max_tfce.is_empty() {
                None
            } else {
                Some(percentile(&null.max_tfce, FWE_PERCENTILE))
            },
        }
    };

    // Voxel-wise family-wise error correction.
    let vfwe_map = ale.mapv(|v| if v > cutoffs.voxel { v } else { 0.0 });
    store.save_volume(&format!("{meta_name}_vfwe"), &vfwe_map, &affine)?;
    if ale.iter().any(|&v| v > cutoffs.voxel) {
        info!(meta_name, threshold = cutoffs.voxel, "vFWE: significant effect found");
    }

    // Cluster-wise family-wise error correction.
    let (cfwe_map, max_mass) =
        compute_clusters(&z, config.cluster_forming_threshold, cutoffs.cluster);
    store.save_volume(&cfwe_key, &cfwe_map, &affine)?;
    if max_mass > cutoffs.cluster {
        info!(meta_name, threshold = cutoffs.cluster, "cFWE: significant effect found");
    }

    if let (Some(tfce), Some(tfce_cutoff)) = (&tfce, cutoffs.tfce) {
        let tfce_map = tfce.mapv(|v| if v > tfce_cutoff { v } else { 0.0 });
        store.save_volume(&format!("{meta_name}_tfce"), &tfce_map, &affine)?;
        if tfce.iter().any(|&v| v > tfce_cutoff) {
            info!(meta_name, threshold = tfce_cutoff, "TFCE: significant effect found");
        }
    }

    info!(meta_name, "main-effect analysis done");
    Ok(())
}
