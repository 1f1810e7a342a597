use ndarray::Array3;
use rayon::prelude::*;

use crate::template::Grid;

/// Modeled-activation volume for one experiment: the kernel placed at
/// each focus, combined by voxel-wise maximum. Overlapping foci within
/// one experiment must not multiply evidence, so this is a max and not a
/// sum; combination *across* experiments happens in `compute_ale`.
pub fn ma_volume(foci: &[[usize; 3]], kernel: &Array3<f64>, grid: &Grid) -> Array3<f64> {
    let mut ma = grid.zeros();
    let ksize = kernel.dim().0;
    let r = (ksize / 2) as isize;
    let [sx, sy, sz] = grid.shape;

    for focus in foci {
        let [fx, fy, fz] = *focus;
        for ki in 0..ksize {
            let x = fx as isize + ki as isize - r;
            if x < 0 || x >= sx as isize {
                continue;
            }
            for kj in 0..ksize {
                let y = fy as isize + kj as isize - r;
                if y < 0 || y >= sy as isize {
                    continue;
                }
                for kk in 0..ksize {
                    let z = fz as isize + kk as isize - r;
                    if z < 0 || z >= sz as isize {
                        continue;
                    }
                    let target = [x as usize, y as usize, z as usize];
                    let v = kernel[[ki, kj, kk]];
                    if v > ma[target] {
                        ma[target] = v;
                    }
                }
            }
        }
    }
    ma
}

/// MA volumes for all experiments, computed in parallel. `foci[i]` pairs
/// with `kernels[i]`.
pub fn compute_ma(
    foci: &[Vec<[usize; 3]>],
    kernels: &[Array3<f64>],
    grid: &Grid,
) -> Vec<Array3<f64>> {
    debug_assert_eq!(foci.len(), kernels.len());
    foci.par_iter()
        .zip(kernels.par_iter())
        .map(|(f, k)| ma_volume(f, k, grid))
        .collect()
}

/// Integer count of raw foci per voxel, for inspection volumes.
pub fn illustrate_foci(foci: &[Vec<[usize; 3]>], grid: &Grid) -> Array3<f64> {
    let mut out = grid.zeros();
    for experiment in foci {
        for &f in experiment {
            out[f] += 1.0;
        }
    }
    out
}
