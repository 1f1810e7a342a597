use ndarray::Array3;

use ale_core::contrast::{compute_balanced_contrast, compute_contrast};
use ale_core::error::AleError;
use ale_core::kernel::smoothing_kernel;
use ale_core::ma::ma_volume;
use ale_core::template::Grid;

fn pool_at(grid: &Grid, focus: [usize; 3], subjects: &[u32]) -> Vec<Array3<f64>> {
    subjects
        .iter()
        .map(|&n| ma_volume(&[focus], &smoothing_kernel(n, 2.0).unwrap(), grid))
        .collect()
}

#[test]
fn test_identical_pools_give_zero_difference() {
    let grid = Grid::new([16, 16, 16], 2.0);
    let pool = pool_at(&grid, [8, 8, 8], &[15, 22, 30]);

    let result = compute_contrast(&pool, &pool, 0.05, 40, 2, 11).unwrap();
    for &v in result.observed.iter() {
        assert!(v.abs() < 1e-12, "observed difference should be zero, got {v}");
    }
    // Nothing can be significant when the observed map is zero.
    assert!(result.significant.iter().all(|&v| v == 0.0));
    assert_eq!(result.null_max_diff.len(), 40);
    assert!(result.null_max_diff.iter().all(|&v| v.is_finite() && v >= 0.0));
    assert!(result.threshold >= 0.0);
}

#[test]
fn test_disjoint_pools_show_signed_difference() {
    let grid = Grid::new([24, 24, 24], 2.0);
    let pool_a = pool_at(&grid, [6, 6, 6], &[20, 25, 30]);
    let pool_b = pool_at(&grid, [18, 18, 18], &[20, 25, 30]);

    let result = compute_contrast(&pool_a, &pool_b, 0.05, 40, 2, 11).unwrap();
    assert!(result.observed[[6, 6, 6]] > 0.0);
    assert!(result.observed[[18, 18, 18]] < 0.0);
}

#[test]
fn test_contrast_deterministic_under_seed() {
    let grid = Grid::new([12, 12, 12], 2.0);
    let pool_a = pool_at(&grid, [4, 4, 4], &[15, 20]);
    let pool_b = pool_at(&grid, [8, 8, 8], &[18, 24]);

    let a = compute_contrast(&pool_a, &pool_b, 0.05, 25, 2, 5).unwrap();
    let b = compute_contrast(&pool_a, &pool_b, 0.05, 25, 2, 5).unwrap();
    assert_eq!(a.null_max_diff, b.null_max_diff);
    assert_eq!(a.threshold, b.threshold);
}

#[test]
fn test_contrast_empty_pool_is_error() {
    let grid = Grid::new([8, 8, 8], 2.0);
    let pool = pool_at(&grid, [4, 4, 4], &[15]);
    assert!(matches!(
        compute_contrast(&pool, &[], 0.05, 10, 2, 0).unwrap_err(),
        AleError::EmptyExperimentSet
    ));
}

#[test]
fn test_balanced_contrast_rejects_oversized_target() {
    let grid = Grid::new([8, 8, 8], 2.0);
    let pool_a = pool_at(&grid, [3, 3, 3], &[15, 20]);
    let pool_b = pool_at(&grid, [5, 5, 5], &[18, 24, 30]);
    assert!(matches!(
        compute_balanced_contrast(&pool_a, &pool_b, 3, 0.05, 10, 10, 2, 0).unwrap_err(),
        AleError::InvalidSubsample { .. }
    ));
}

#[test]
fn test_balanced_contrast_identical_pools_near_zero() {
    let grid = Grid::new([12, 12, 12], 2.0);
    let pool = pool_at(&grid, [6, 6, 6], &[15, 20, 26, 31]);

    let result =
        compute_balanced_contrast(&pool, &pool, 2, 0.05, 30, 30, 2, 17).unwrap();
    // Subsamples differ per draw, but both sides sample the same pool of
    // near-identical maps; the mean difference stays small.
    let peak = result
        .observed
        .iter()
        .fold(0.0f64, |acc, &v| acc.max(v.abs()));
    assert!(peak < 0.2, "balanced difference unexpectedly large: {peak}");
    assert_eq!(result.null_max_diff.len(), 30);
}
