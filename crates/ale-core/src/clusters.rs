use std::collections::{HashMap, HashSet};

use ndarray::Array3;

use crate::stats::z_from_p;

/// Statistics for a single connected component of supra-threshold voxels.
#[derive(Clone, Debug)]
pub struct ClusterStats {
    /// Resolved label of this component.
    pub label: u32,
    /// Number of voxels in the component (extent).
    pub size: usize,
    /// Summed z inside the component (mass).
    pub mass: f64,
}

/// Offsets of the 13 neighbors already visited when scanning in
/// (i, j, k) order; together with their mirrors they make up
/// 26-connectivity.
const PRIOR_NEIGHBORS: [[isize; 3]; 13] = [
    [-1, -1, -1],
    [-1, -1, 0],
    [-1, -1, 1],
    [-1, 0, -1],
    [-1, 0, 0],
    [-1, 0, 1],
    [-1, 1, -1],
    [-1, 1, 0],
    [-1, 1, 1],
    [0, -1, -1],
    [0, -1, 0],
    [0, -1, 1],
    [0, 0, -1],
];

/// Label 26-connected components of `z > z_threshold` using two-pass
/// union-find. Returns the resolved label volume (0 = background) and
/// component stats sorted by mass descending.
pub fn cluster_stats(z: &Array3<f64>, z_threshold: f64) -> (Array3<u32>, Vec<ClusterStats>) {
    let (sx, sy, sz) = z.dim();
    let mut labels = Array3::<u32>::zeros((sx, sy, sz));
    let mut next_label: u32 = 1;
    // Union-find parent array. Index 0 unused; labels start at 1.
    let mut parent: Vec<u32> = vec![0; 64];

    // Pass 1: assign provisional labels, merging across earlier neighbors.
    for i in 0..sx {
        for j in 0..sy {
            for k in 0..sz {
                if z[[i, j, k]] <= z_threshold {
                    continue;
                }

                let mut assigned: u32 = 0;
                for d in PRIOR_NEIGHBORS {
                    let ni = i as isize + d[0];
                    let nj = j as isize + d[1];
                    let nk = k as isize + d[2];
                    if ni < 0 || nj < 0 || nk < 0 {
                        continue;
                    }
                    let (ni, nj, nk) = (ni as usize, nj as usize, nk as usize);
                    if ni >= sx || nj >= sy || nk >= sz {
                        continue;
                    }
                    let nl = labels[[ni, nj, nk]];
                    if nl == 0 {
                        continue;
                    }
                    if assigned == 0 {
                        assigned = nl;
                    } else if assigned != nl {
                        union(&mut parent, assigned, nl);
                    }
                }

                if assigned == 0 {
                    if next_label as usize >= parent.len() {
                        parent.resize(parent.len() * 2, 0);
                    }
                    parent[next_label as usize] = next_label;
                    assigned = next_label;
                    next_label += 1;
                }
                labels[[i, j, k]] = assigned;
            }
        }
    }

    // Flatten parent references.
    for i in 1..next_label as usize {
        parent[i] = find(&parent, i as u32);
    }

    // Pass 2: resolve labels and accumulate stats.
    let mut stats_map = HashMap::<u32, ClusterStats>::new();
    for i in 0..sx {
        for j in 0..sy {
            for k in 0..sz {
                let lbl = labels[[i, j, k]];
                if lbl == 0 {
                    continue;
                }
                let root = parent[lbl as usize];
                labels[[i, j, k]] = root;

                let entry = stats_map.entry(root).or_insert(ClusterStats {
                    label: root,
                    size: 0,
                    mass: 0.0,
                });
                entry.size += 1;
                entry.mass += z[[i, j, k]];
            }
        }
    }

    let mut stats: Vec<ClusterStats> = stats_map.into_values().collect();
    stats.sort_unstable_by(|a, b| b.mass.total_cmp(&a.mass));
    (labels, stats)
}

/// Mass of the largest cluster after thresholding at `z_threshold`;
/// 0 when no voxel survives.
pub fn max_cluster_mass(z: &Array3<f64>, z_threshold: f64) -> f64 {
    let (_, stats) = cluster_stats(z, z_threshold);
    stats.first().map(|s| s.mass).unwrap_or(0.0)
}

/// Cluster-wise inference: threshold the z-map at the cluster-forming
/// p-value, keep only the clusters whose mass strictly exceeds
/// `cfwe_threshold` (equal-mass clusters stand or fall together), zero
/// elsewhere. Returns the surviving-cluster map and the maximum mass.
pub fn compute_clusters(
    z: &Array3<f64>,
    cluster_forming_threshold: f64,
    cfwe_threshold: f64,
) -> (Array3<f64>, f64) {
    let z_threshold = z_from_p(cluster_forming_threshold);
    let (labels, stats) = cluster_stats(z, z_threshold);
    let max_mass = stats.first().map(|s| s.mass).unwrap_or(0.0);

    let surviving: HashSet<u32> = stats
        .iter()
        .filter(|s| s.mass > cfwe_threshold)
        .map(|s| s.label)
        .collect();

    let mut out = Array3::<f64>::zeros(z.dim());
    if !surviving.is_empty() {
        for ((i, j, k), &lbl) in labels.indexed_iter() {
            if lbl != 0 && surviving.contains(&lbl) {
                out[[i, j, k]] = z[[i, j, k]];
            }
        }
    }
    (out, max_mass)
}

fn find(parent: &[u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[big as usize] = small;
    }
}
