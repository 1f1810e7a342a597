use tracing::info;

use crate::analyses::config::{AleConfig, ClusteringConfig};
use crate::analyses::contrast::ma_for_pool;
use crate::error::{AleError, Result};
use crate::experiment::Experiment;
use crate::io::store::ResultStore;
use crate::stats::pearson;

/// Pairwise correlation distance (1 - Pearson r) between the
/// experiments' flattened MA volumes.
fn distance_matrix(ma: &[ndarray::Array3<f64>]) -> Vec<Vec<f64>> {
    let flat: Vec<Vec<f64>> = ma.iter().map(|v| v.iter().cloned().collect()).collect();
    let n = flat.len();
    let mut dist = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in i + 1..n {
            let d = 1.0 - pearson(&flat[i], &flat[j]);
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }
    dist
}

/// Average distance between two clusters of experiment indices.
fn linkage(dist: &[Vec<f64>], a: &[usize], b: &[usize]) -> f64 {
    let mut sum = 0.0;
    for &i in a {
        for &j in b {
            sum += dist[i][j];
        }
    }
    sum / (a.len() * b.len()) as f64
}

/// Average-linkage agglomerative clustering cut at `k` clusters.
/// Returns a label per experiment in 0..k.
fn cluster_at_k(dist: &[Vec<f64>], k: usize) -> Vec<usize> {
    let n = dist.len();
    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    while clusters.len() > k {
        let mut best = (0usize, 1usize);
        let mut best_d = f64::INFINITY;
        for a in 0..clusters.len() {
            for b in a + 1..clusters.len() {
                let d = linkage(dist, &clusters[a], &clusters[b]);
                if d < best_d {
                    best_d = d;
                    best = (a, b);
                }
            }
        }
        let merged = clusters.swap_remove(best.1);
        clusters[best.0].extend(merged);
    }

    let mut labels = vec![0usize; n];
    for (c, members) in clusters.iter().enumerate() {
        for &m in members {
            labels[m] = c;
        }
    }
    labels
}

/// Mean silhouette coefficient of a labeling under the given distances.
fn silhouette(dist: &[Vec<f64>], labels: &[usize], k: usize) -> f64 {
    let n = labels.len();
    let mut total = 0.0;
    for i in 0..n {
        let mut within_sum = 0.0;
        let mut within_n = 0usize;
        let mut between = vec![(0.0f64, 0usize); k];
        for j in 0..n {
            if i == j {
                continue;
            }
            if labels[j] == labels[i] {
                within_sum += dist[i][j];
                within_n += 1;
            } else {
                let e = &mut between[labels[j]];
                e.0 += dist[i][j];
                e.1 += 1;
            }
        }
        let a = if within_n > 0 {
            within_sum / within_n as f64
        } else {
            0.0
        };
        let b = between
            .iter()
            .filter(|(_, c)| *c > 0)
            .map(|(s, c)| s / *c as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 && b.is_finite() {
            total += (b - a) / denom;
        }
    }
    total / n as f64
}

/// Group experiments by the similarity of their modeled-activation maps:
/// correlation distance, average-linkage agglomeration, k chosen by the
/// best silhouette score in `2..=max_clusters`. Labels are persisted as
/// a table row alongside the chosen k and its score.
pub fn ma_clustering(
    store: &dyn ResultStore,
    experiments: &[Experiment],
    meta_name: &str,
    config: &AleConfig,
    clustering: &ClusteringConfig,
) -> Result<()> {
    let result_key = format!("{meta_name}_clustering");
    if store.exists(&result_key) {
        info!(meta_name, "clustering results already exist");
        return Ok(());
    }
    if experiments.len() < 3 {
        return Err(AleError::Config(format!(
            "clustering needs at least 3 experiments, got {}",
            experiments.len()
        )));
    }

    let mean_subjects: f64 = experiments.iter().map(|e| e.subjects as f64).sum::<f64>()
        / experiments.len() as f64;
    info!(
        meta_name,
        experiments = experiments.len(),
        mean_subjects,
        "running MA clustering"
    );

    let ma = ma_for_pool(experiments, config)?;
    let dist = distance_matrix(&ma);

    let k_max = clustering.max_clusters.min(experiments.len() - 1).max(2);
    let mut best: Option<(usize, f64, Vec<usize>)> = None;
    for k in 2..=k_max {
        let labels = cluster_at_k(&dist, k);
        let score = silhouette(&dist, &labels, k);
        if best.as_ref().map_or(true, |(_, s, _)| score > *s) {
            best = Some((k, score, labels));
        }
    }
    let (k, score, labels) = best.expect("at least one k was scored");

    store.save_table(
        &result_key,
        &[
            vec![k as f64, score],
            labels.iter().map(|&l| l as f64).collect(),
        ],
    )?;
    info!(meta_name, k, score, "MA clustering done");
    Ok(())
}
