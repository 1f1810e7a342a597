use approx::assert_relative_eq;
use ndarray::Array3;

use ale_core::ale::compute_ale;
use ale_core::histogram::{
    compute_hx, compute_hx_conv, compute_z, survival_function, HistogramBins,
};
use ale_core::kernel::smoothing_kernel;
use ale_core::ma::ma_volume;
use ale_core::template::Grid;

fn grid() -> Grid {
    Grid::new([24, 24, 24], 2.0)
}

fn sample_ma(grid: &Grid) -> Vec<Array3<f64>> {
    let kernels = [
        smoothing_kernel(15, 2.0).unwrap(),
        smoothing_kernel(25, 2.0).unwrap(),
        smoothing_kernel(40, 2.0).unwrap(),
    ];
    vec![
        ma_volume(&[[12, 12, 12], [6, 6, 6]], &kernels[0], grid),
        ma_volume(&[[12, 12, 12]], &kernels[1], grid),
        ma_volume(&[[18, 18, 18], [12, 10, 12]], &kernels[2], grid),
    ]
}

fn sample_bins() -> HistogramBins {
    let kernels = vec![
        smoothing_kernel(15, 2.0).unwrap(),
        smoothing_kernel(25, 2.0).unwrap(),
        smoothing_kernel(40, 2.0).unwrap(),
    ];
    HistogramBins::for_kernels(&kernels, 0.0001).unwrap()
}

// ---------------------------------------------------------------------------
// HistogramBins
// ---------------------------------------------------------------------------

#[test]
fn test_bins_cover_max_ale() {
    let bins = sample_bins();
    assert_eq!(bins.step, 10_000);
    // Last center must sit past the largest attainable ALE value.
    let kernels = vec![
        smoothing_kernel(15, 2.0).unwrap(),
        smoothing_kernel(25, 2.0).unwrap(),
        smoothing_kernel(40, 2.0).unwrap(),
    ];
    let max_ale = ale_core::kernel::max_ale_value(&kernels);
    assert!(*bins.centers.last().unwrap() >= max_ale);
}

#[test]
fn test_bins_reject_bad_step() {
    let kernels = vec![smoothing_kernel(15, 2.0).unwrap()];
    assert!(HistogramBins::for_kernels(&kernels, 0.0).is_err());
    assert!(HistogramBins::for_kernels(&kernels, 1.5).is_err());
    assert!(HistogramBins::for_kernels(&[], 0.0001).is_err());
}

#[test]
fn test_bin_index_round_trips_centers() {
    let bins = sample_bins();
    for idx in [0usize, 1, 10, bins.len() - 1] {
        assert_eq!(bins.index_of(bins.centers[idx]), idx);
    }
    // Values past the range clamp to the last bin.
    assert_eq!(bins.index_of(2.0), bins.len() - 1);
    assert_eq!(bins.index_of(-0.5), 0);
}

// ---------------------------------------------------------------------------
// compute_hx / compute_hx_conv
// ---------------------------------------------------------------------------

#[test]
fn test_hx_rows_count_every_voxel() {
    let grid = grid();
    let ma = sample_ma(&grid);
    let bins = sample_bins();
    let hx = compute_hx(&ma, &bins);

    assert_eq!(hx.nrows(), 3);
    let voxels = grid.voxel_count() as f64;
    for row in 0..hx.nrows() {
        assert_relative_eq!(hx.row(row).sum(), voxels, epsilon = 1e-6);
    }
}

#[test]
fn test_hx_conv_is_probability_mass_function() {
    let grid = grid();
    let ma = sample_ma(&grid);
    let bins = sample_bins();
    let hx = compute_hx(&ma, &bins);
    let pmf = compute_hx_conv(&hx, &bins).unwrap();

    let total: f64 = pmf.iter().sum();
    assert_relative_eq!(total, 1.0, epsilon = 1e-9);
    assert!(pmf.iter().all(|&p| p >= 0.0));
}

#[test]
fn test_survival_function_decreasing_from_one() {
    let pmf = [0.5, 0.25, 0.15, 0.1];
    let s = survival_function(&pmf);
    assert_relative_eq!(s[0], 1.0, epsilon = 1e-12);
    for w in s.windows(2) {
        assert!(w[0] >= w[1]);
    }
    assert_relative_eq!(s[3], 0.1, epsilon = 1e-12);
}

// ---------------------------------------------------------------------------
// compute_z
// ---------------------------------------------------------------------------

#[test]
fn test_z_zero_ale_maps_to_zero() {
    let grid = grid();
    let ma = sample_ma(&grid);
    let bins = sample_bins();
    let hx = compute_hx(&ma, &bins);
    let pmf = compute_hx_conv(&hx, &bins).unwrap();

    let ale = Array3::<f64>::zeros((4, 4, 4));
    let z = compute_z(&ale, &pmf, bins.step);
    assert!(z.iter().all(|&v| v == 0.0));
}

#[test]
fn test_z_finite_at_and_past_histogram_maximum() {
    let grid = grid();
    let ma = sample_ma(&grid);
    let bins = sample_bins();
    let hx = compute_hx(&ma, &bins);
    let pmf = compute_hx_conv(&hx, &bins).unwrap();

    let mut ale = Array3::<f64>::zeros((2, 2, 2));
    ale[[0, 0, 0]] = *bins.centers.last().unwrap();
    ale[[1, 1, 1]] = 1.0; // past every bin
    let z = compute_z(&ale, &pmf, bins.step);
    assert!(z[[0, 0, 0]].is_finite());
    assert!(z[[1, 1, 1]].is_finite());
    assert!(z[[1, 1, 1]] > 0.0);
}

#[test]
fn test_z_increases_with_ale() {
    let grid = grid();
    let ma = sample_ma(&grid);
    let bins = sample_bins();
    let hx = compute_hx(&ma, &bins);
    let pmf = compute_hx_conv(&hx, &bins).unwrap();

    let ale = compute_ale(&ma).unwrap();
    let z = compute_z(&ale, &pmf, bins.step);

    // The strongest convergence voxel carries the largest z.
    let (argmax_ale, _) = ale
        .indexed_iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .unwrap();
    let (argmax_z, _) = z.indexed_iter().max_by(|a, b| a.1.total_cmp(b.1)).unwrap();
    assert_eq!(argmax_ale, argmax_z);
}
