use approx::assert_relative_eq;
use ndarray::Array3;

use ale_core::clusters::{cluster_stats, compute_clusters, max_cluster_mass};
use ale_core::stats::z_from_p;

/// A block of voxels at constant z, all other voxels zero.
fn block_map(
    shape: (usize, usize, usize),
    corner: [usize; 3],
    size: [usize; 3],
    z: f64,
) -> Array3<f64> {
    let mut map = Array3::<f64>::zeros(shape);
    for i in corner[0]..corner[0] + size[0] {
        for j in corner[1]..corner[1] + size[1] {
            for k in corner[2]..corner[2] + size[2] {
                map[[i, j, k]] = z;
            }
        }
    }
    map
}

#[test]
fn test_single_cluster_stats() {
    let z = block_map((16, 16, 16), [2, 2, 2], [3, 3, 3], 4.0);
    let (labels, stats) = cluster_stats(&z, 3.0);

    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].size, 27);
    assert_relative_eq!(stats[0].mass, 27.0 * 4.0, epsilon = 1e-9);
    assert_eq!(labels[[2, 2, 2]], stats[0].label);
    assert_eq!(labels[[0, 0, 0]], 0);
}

#[test]
fn test_diagonal_voxels_are_26_connected() {
    let mut z = Array3::<f64>::zeros((8, 8, 8));
    z[[2, 2, 2]] = 5.0;
    z[[3, 3, 3]] = 5.0; // touches only at a corner
    let (_, stats) = cluster_stats(&z, 1.0);
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].size, 2);
}

#[test]
fn test_separate_blocks_get_separate_labels() {
    let mut z = block_map((16, 16, 16), [1, 1, 1], [2, 2, 2], 4.0);
    let far = block_map((16, 16, 16), [10, 10, 10], [2, 2, 2], 6.0);
    z.zip_mut_with(&far, |a, &b| *a = a.max(b));

    let (_, stats) = cluster_stats(&z, 3.0);
    assert_eq!(stats.len(), 2);
    // Sorted by mass descending: the z=6 block leads.
    assert_relative_eq!(stats[0].mass, 8.0 * 6.0, epsilon = 1e-9);
    assert_relative_eq!(stats[1].mass, 8.0 * 4.0, epsilon = 1e-9);
}

#[test]
fn test_u_shape_merges_into_one_cluster() {
    // Two arms joined at the bottom; provisional labels must be unified.
    let mut z = Array3::<f64>::zeros((10, 10, 10));
    for i in 0..5 {
        z[[i, 0, 0]] = 4.0; // left arm
        z[[i, 4, 0]] = 4.0; // right arm
    }
    for j in 0..5 {
        z[[4, j, 0]] = 4.0; // bottom bar
    }
    let (_, stats) = cluster_stats(&z, 3.0);
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].size, 13);
}

#[test]
fn test_max_cluster_mass_empty_map() {
    let z = Array3::<f64>::zeros((8, 8, 8));
    assert_eq!(max_cluster_mass(&z, 1.0), 0.0);
}

#[test]
fn test_cluster_survives_cfwe_threshold() {
    // Forming threshold p=0.001 -> z ~ 3.09; block z=4 survives forming.
    let z = block_map((16, 16, 16), [4, 4, 4], [3, 3, 3], 4.0);
    let mass = 27.0 * 4.0;

    let (map, max_mass) = compute_clusters(&z, 0.001, mass / 2.0);
    assert_relative_eq!(max_mass, mass, epsilon = 1e-9);
    // The surviving cluster is returned unchanged.
    assert_eq!(&map, &z);
}

#[test]
fn test_cluster_dropped_at_cfwe_threshold() {
    let z = block_map((16, 16, 16), [4, 4, 4], [3, 3, 3], 4.0);
    let mass = 27.0 * 4.0;

    // Mass is compared strictly: a cluster exactly at the threshold drops.
    let (map, max_mass) = compute_clusters(&z, 0.001, mass);
    assert_relative_eq!(max_mass, mass, epsilon = 1e-9);
    assert!(map.iter().all(|&v| v == 0.0));
}

#[test]
fn test_subthreshold_voxels_form_no_cluster() {
    // z = 2 is below the p=0.001 forming threshold of ~3.09.
    let z = block_map((16, 16, 16), [4, 4, 4], [3, 3, 3], 2.0);
    let (map, max_mass) = compute_clusters(&z, 0.001, 0.0);
    assert_eq!(max_mass, 0.0);
    assert!(map.iter().all(|&v| v == 0.0));
}

#[test]
fn test_forming_threshold_is_p_value() {
    // Sanity-check the p -> z conversion used by compute_clusters.
    assert!(z_from_p(0.001) > 3.0 && z_from_p(0.001) < 3.2);
}
