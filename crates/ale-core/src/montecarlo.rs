use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::clusters::max_cluster_mass;
use crate::error::{AleError, Result};
use crate::histogram::{compute_z, hx_conv_subset, hx_row, HistogramBins};
use crate::ma::ma_volume;
use crate::stats::z_from_p;
use crate::template::{Grid, SamplingMask};
use crate::tfce::compute_tfce;

/// Mixing constant for deriving independent per-iteration seeds.
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Extreme values recorded by one null iteration.
#[derive(Clone, Copy, Debug)]
pub struct NullSample {
    pub max_ale: f64,
    pub max_cluster_mass: f64,
    pub max_tfce: Option<f64>,
}

/// Empirical null distributions collected across iterations. Iteration
/// order is not meaningful; only the collection as a whole is.
#[derive(Clone, Debug, Default)]
pub struct MonteCarloNull {
    pub max_ale: Vec<f64>,
    pub max_cluster: Vec<f64>,
    /// Empty when TFCE was disabled.
    pub max_tfce: Vec<f64>,
}

impl MonteCarloNull {
    pub fn from_samples(samples: Vec<NullSample>) -> Self {
        let mut null = Self::default();
        for s in &samples {
            null.max_ale.push(s.max_ale);
            null.max_cluster.push(s.max_cluster_mass);
            if let Some(t) = s.max_tfce {
                null.max_tfce.push(t);
            }
        }
        null
    }

    pub fn len(&self) -> usize {
        self.max_ale.len()
    }

    pub fn is_empty(&self) -> bool {
        self.max_ale.is_empty()
    }
}

/// Inputs shared by every null iteration. Kernels and focus counts are
/// read-only across workers; each iteration owns its RNG and volumes.
pub struct MonteCarloParams<'a> {
    pub focus_counts: &'a [usize],
    pub kernels: &'a [Array3<f64>],
    pub bins: &'a HistogramBins,
    pub grid: &'a Grid,
    pub mask: &'a SamplingMask,
    pub cluster_forming_threshold: f64,
    /// When set, each iteration draws this many experiments at random
    /// before injecting foci (subsampled null for probabilistic ALE).
    pub target_n: Option<usize>,
    pub tfce_enabled: bool,
    pub iterations: usize,
    pub nprocesses: usize,
    pub seed: u64,
}

fn random_foci(rng: &mut StdRng, mask: &SamplingMask, count: usize) -> Vec<[usize; 3]> {
    (0..count)
        .map(|_| mask.voxel(rng.random_range(0..mask.len())))
        .collect()
}

/// Draw `target_n` distinct experiment indices by partial Fisher-Yates.
fn random_subset(rng: &mut StdRng, total_n: usize, target_n: usize) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..total_n).collect();
    for i in 0..target_n {
        let j = rng.random_range(i..total_n);
        pool.swap(i, j);
    }
    pool.truncate(target_n);
    pool
}

/// One null iteration: same per-experiment focus counts, fully random
/// locations within the sampling mask. Recomputes the MA -> ALE ->
/// histogram-null -> z pipeline and records the volume-wide extremes.
pub fn simulate_iteration(params: &MonteCarloParams, seed: u64) -> Result<NullSample> {
    if params.mask.is_empty() {
        return Err(AleError::Config("sampling mask is empty".into()));
    }
    let mut rng = StdRng::seed_from_u64(seed);

    let selected: Vec<usize> = match params.target_n {
        Some(t) => random_subset(&mut rng, params.focus_counts.len(), t),
        None => (0..params.focus_counts.len()).collect(),
    };

    // Stream experiments: fold the ALE complement and histogram each MA
    // volume, then drop it. Avoids holding all MA volumes per iteration.
    let mut complement = params.grid.zeros();
    complement.fill(1.0);
    let mut hx = Array2::<f64>::zeros((selected.len(), params.bins.len()));

    for (row, &exp) in selected.iter().enumerate() {
        let foci = random_foci(&mut rng, params.mask, params.focus_counts[exp]);
        let ma = ma_volume(&foci, &params.kernels[exp], params.grid);
        for (col, v) in hx_row(&ma, params.bins).into_iter().enumerate() {
            hx[[row, col]] = v;
        }
        complement.zip_mut_with(&ma, |c, &m| *c *= 1.0 - m);
    }
    let ale = complement.mapv(|c| 1.0 - c);

    let rows: Vec<usize> = (0..selected.len()).collect();
    let hx_conv = hx_conv_subset(&hx, &rows, params.bins)?;
    let z = compute_z(&ale, &hx_conv, params.bins.step);

    let max_ale = ale.iter().cloned().fold(0.0f64, f64::max);
    let z_threshold = z_from_p(params.cluster_forming_threshold);
    let max_mass = max_cluster_mass(&z, z_threshold);
    let max_tfce = if params.tfce_enabled {
        Some(compute_tfce(&z).iter().cloned().fold(0.0f64, f64::max))
    } else {
        None
    };

    Ok(NullSample {
        max_ale,
        max_cluster_mass: max_mass,
        max_tfce,
    })
}

/// Run the full Monte Carlo simulation: `iterations` independent
/// iterations on a worker pool of `nprocesses` threads, unordered
/// collection. Any failing iteration aborts the whole batch, since the
/// null's validity depends on the exact iteration count.
///
/// `on_progress` is called with the number of completed iterations.
pub fn compute_monte_carlo_null(
    params: &MonteCarloParams,
    on_progress: Option<&(dyn Fn(usize) + Sync)>,
) -> Result<MonteCarloNull> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.nprocesses)
        .build()
        .map_err(|e| AleError::ThreadPool(e.to_string()))?;

    debug!(
        iterations = params.iterations,
        workers = params.nprocesses,
        target_n = ?params.target_n,
        "starting Monte Carlo null simulation"
    );

    let done = AtomicUsize::new(0);
    let samples: Vec<NullSample> = pool.install(|| {
        (0..params.iterations as u64)
            .into_par_iter()
            .map(|i| {
                let sample = simulate_iteration(params, derive_seed(params.seed, i))?;
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(progress) = on_progress {
                    progress(n);
                }
                Ok(sample)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    Ok(MonteCarloNull::from_samples(samples))
}

fn derive_seed(base: u64, iteration: u64) -> u64 {
    base.wrapping_add(iteration.wrapping_add(1).wrapping_mul(SEED_MIX))
}
