use ndarray::Array3;

use ale_core::tfce::compute_tfce;

#[test]
fn test_tfce_zero_map_is_zero() {
    let z = Array3::<f64>::zeros((8, 8, 8));
    let tfce = compute_tfce(&z);
    assert!(tfce.iter().all(|&v| v == 0.0));
}

#[test]
fn test_tfce_positive_inside_cluster_zero_outside() {
    let mut z = Array3::<f64>::zeros((12, 12, 12));
    for i in 4..8 {
        for j in 4..8 {
            for k in 4..8 {
                z[[i, j, k]] = 3.0;
            }
        }
    }
    let tfce = compute_tfce(&z);
    assert!(tfce[[5, 5, 5]] > 0.0);
    assert_eq!(tfce[[0, 0, 0]], 0.0);
    assert!(tfce.iter().all(|&v| v.is_finite() && v >= 0.0));
}

#[test]
fn test_tfce_higher_peak_scores_higher() {
    // Same extent, different heights: the taller cluster must dominate.
    let mut z = Array3::<f64>::zeros((16, 16, 16));
    for i in 2..5 {
        for j in 2..5 {
            for k in 2..5 {
                z[[i, j, k]] = 2.0;
            }
        }
    }
    for i in 10..13 {
        for j in 10..13 {
            for k in 10..13 {
                z[[i, j, k]] = 4.0;
            }
        }
    }
    let tfce = compute_tfce(&z);
    assert!(tfce[[11, 11, 11]] > tfce[[3, 3, 3]]);
}

#[test]
fn test_tfce_larger_extent_scores_higher_at_equal_height() {
    let mut z = Array3::<f64>::zeros((20, 20, 20));
    // 2x2x2 block.
    for i in 2..4 {
        for j in 2..4 {
            for k in 2..4 {
                z[[i, j, k]] = 3.0;
            }
        }
    }
    // 5x5x5 block, same height.
    for i in 10..15 {
        for j in 10..15 {
            for k in 10..15 {
                z[[i, j, k]] = 3.0;
            }
        }
    }
    let tfce = compute_tfce(&z);
    assert!(tfce[[12, 12, 12]] > tfce[[3, 3, 3]]);
}

#[test]
fn test_tfce_monotone_under_voxel_increase() {
    // Raising z at a voxel inside a cluster never lowers its TFCE score.
    let mut z = Array3::<f64>::zeros((10, 10, 10));
    for i in 3..7 {
        for j in 3..7 {
            for k in 3..7 {
                z[[i, j, k]] = 2.5;
            }
        }
    }
    let before = compute_tfce(&z);

    let mut raised = z.clone();
    raised[[5, 5, 5]] = 3.5;
    let after = compute_tfce(&raised);

    assert!(after[[5, 5, 5]] >= before[[5, 5, 5]] - 1e-9);
}
