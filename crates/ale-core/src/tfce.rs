use ndarray::Array3;
use rayon::prelude::*;

use crate::clusters::cluster_stats;
use crate::consts::{TFCE_E, TFCE_H, TFCE_STEPS};

/// Threshold-free cluster enhancement: integrate cluster support over a
/// sweep of forming thresholds,
/// `TFCE(v) = sum_h extent_h(v)^E * h^H * dh`,
/// removing the need to pick a single forming threshold. Thresholds are
/// independent, so the sweep runs in parallel.
///
/// Non-decreasing in z at a voxel as long as the voxel stays inside its
/// cluster at every threshold.
pub fn compute_tfce(z: &Array3<f64>) -> Array3<f64> {
    let z_max = z.iter().cloned().fold(0.0f64, f64::max);
    if z_max <= 0.0 {
        return Array3::zeros(z.dim());
    }
    let dh = z_max / TFCE_STEPS as f64;

    (1..=TFCE_STEPS)
        .into_par_iter()
        .map(|s| {
            let h = s as f64 * dh;
            let (labels, stats) = cluster_stats(z, h);
            // extent^E * h^H, shared by every voxel of a cluster.
            let weights: std::collections::HashMap<u32, f64> = stats
                .iter()
                .map(|c| (c.label, (c.size as f64).powf(TFCE_E) * h.powf(TFCE_H) * dh))
                .collect();

            let mut contribution = Array3::<f64>::zeros(z.dim());
            for ((i, j, k), &lbl) in labels.indexed_iter() {
                if lbl != 0 {
                    contribution[[i, j, k]] = weights[&lbl];
                }
            }
            contribution
        })
        .reduce(
            || Array3::zeros(z.dim()),
            |mut acc, c| {
                acc += &c;
                acc
            },
        )
}
