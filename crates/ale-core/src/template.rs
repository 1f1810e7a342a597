use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::consts::{EPSILON, MNI_SHAPE, MNI_VOXEL_SIZE_MM};

/// 4x4 homogeneous affine matrix, row-major.
pub type Affine = [[f64; 4]; 4];

/// Affine of the MNI152 template at 2 mm (SPM convention).
pub const MNI_AFFINE: Affine = [
    [-2.0, 0.0, 0.0, 90.0],
    [0.0, 2.0, 0.0, -126.0],
    [0.0, 0.0, 2.0, -72.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// The voxel grid an analysis runs on.
///
/// The shape is an explicit configuration value; the default is the
/// MNI152 grid at 2 mm. All volumes of one analysis share a grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub shape: [usize; 3],
    pub voxel_size_mm: f64,
    #[serde(default = "default_affine")]
    pub affine: Affine,
}

fn default_affine() -> Affine {
    MNI_AFFINE
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            shape: MNI_SHAPE,
            voxel_size_mm: MNI_VOXEL_SIZE_MM,
            affine: MNI_AFFINE,
        }
    }
}

impl Grid {
    pub fn new(shape: [usize; 3], voxel_size_mm: f64) -> Self {
        Self {
            shape,
            voxel_size_mm,
            affine: MNI_AFFINE,
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.shape[0] * self.shape[1] * self.shape[2]
    }

    pub fn contains(&self, v: [i64; 3]) -> bool {
        (0..3).all(|a| v[a] >= 0 && (v[a] as usize) < self.shape[a])
    }

    /// Clamp a voxel coordinate to the grid bounds. Returns the clamped
    /// coordinate and whether clamping was necessary.
    pub fn clamp(&self, v: [i64; 3]) -> ([usize; 3], bool) {
        let mut out = [0usize; 3];
        let mut clamped = false;
        for a in 0..3 {
            let hi = self.shape[a] as i64 - 1;
            let c = v[a].clamp(0, hi);
            if c != v[a] {
                clamped = true;
            }
            out[a] = c as usize;
        }
        (out, clamped)
    }

    pub fn zeros(&self) -> Array3<f64> {
        Array3::zeros((self.shape[0], self.shape[1], self.shape[2]))
    }
}

/// Apply an affine to a 3D point in homogeneous coordinates.
pub fn apply_affine(m: &Affine, p: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0f64; 3];
    for (row, o) in out.iter_mut().enumerate() {
        *o = m[row][0] * p[0] + m[row][1] * p[1] + m[row][2] * p[2] + m[row][3];
    }
    out
}

/// Invert a 4x4 affine by Gauss-Jordan elimination.
///
/// Returns `None` for singular matrices; every anatomical affine used
/// here is invertible.
pub fn invert_affine(m: &Affine) -> Option<Affine> {
    let mut a = *m;
    let mut inv: Affine = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    for col in 0..4 {
        // Partial pivot.
        let mut pivot = col;
        for row in col + 1..4 {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < EPSILON {
            return None;
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);

        let diag = a[col][col];
        for k in 0..4 {
            a[col][k] /= diag;
            inv[col][k] /= diag;
        }
        for row in 0..4 {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            for k in 0..4 {
                a[row][k] -= factor * a[col][k];
                inv[row][k] -= factor * inv[col][k];
            }
        }
    }
    Some(inv)
}

/// Transform a millimeter-space coordinate into a voxel coordinate on the
/// grid, rounding up as the original pipeline does. Coordinates landing
/// outside the grid are clamped to the boundary with a warning; the
/// analysis proceeds.
pub fn mm_to_voxel(grid: &Grid, mm: [f64; 3]) -> [usize; 3] {
    let inv = invert_affine(&grid.affine).expect("anatomical affine is invertible");
    let v = apply_affine(&inv, mm);
    let ijk = [
        v[0].ceil() as i64,
        v[1].ceil() as i64,
        v[2].ceil() as i64,
    ];
    let (clamped, was_clamped) = grid.clamp(ijk);
    if was_clamped {
        warn!(
            mm = ?mm,
            voxel = ?ijk,
            bounds = ?grid.shape,
            "coordinate outside grid, clamped to boundary"
        );
    }
    clamped
}

/// The set of voxels random foci may land on during null simulation.
#[derive(Clone, Debug)]
pub struct SamplingMask {
    voxels: Vec<[usize; 3]>,
}

impl SamplingMask {
    /// Every voxel of the grid is eligible.
    pub fn full(grid: &Grid) -> Self {
        let mut voxels = Vec::with_capacity(grid.voxel_count());
        for i in 0..grid.shape[0] {
            for j in 0..grid.shape[1] {
                for k in 0..grid.shape[2] {
                    voxels.push([i, j, k]);
                }
            }
        }
        Self { voxels }
    }

    /// Eligible voxels are the nonzero voxels of a mask volume.
    pub fn from_volume(mask: &Array3<f64>) -> Self {
        let voxels = mask
            .indexed_iter()
            .filter(|(_, &v)| v > 0.0)
            .map(|((i, j, k), _)| [i, j, k])
            .collect();
        Self { voxels }
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn voxel(&self, idx: usize) -> [usize; 3] {
        self.voxels[idx]
    }
}
