/// MNI152 grid at 2 mm resolution, the default analysis grid.
pub const MNI_SHAPE: [usize; 3] = [91, 109, 91];

/// Voxel edge length of the default grid, in millimeters.
pub const MNI_VOXEL_SIZE_MM: f64 = 2.0;

/// Side length of the cubic bounding box holding a smoothing kernel.
/// Odd so the kernel has an exact center voxel.
pub const KERNEL_SIZE: usize = 31;

/// Spatial uncertainty attributed to template normalization, in mm
/// (Eickhoff et al. 2009).
pub const TEMPLATE_UNCERTAINTY_MM: f64 = 5.7;

/// Per-subject spatial uncertainty, in mm; shrinks with sqrt(N)
/// (Eickhoff et al. 2009).
pub const SUBJECT_UNCERTAINTY_MM: f64 = 11.6;

/// TFCE extent exponent.
pub const TFCE_E: f64 = 0.6;

/// TFCE height exponent.
pub const TFCE_H: f64 = 2.0;

/// Number of integration steps for the TFCE threshold sweep.
pub const TFCE_STEPS: usize = 100;

/// Smallest right-tail probability used in z conversion; keeps z finite
/// when an observed ALE value exceeds every bin of the null PMF.
pub const MIN_TAIL_P: f64 = 1e-16;

/// Margin added above the maximum attainable ALE value when sizing
/// histogram bins, so rounding never lands past the last bin.
pub const HISTOGRAM_MARGIN: f64 = 0.001;

/// Small epsilon for floating-point comparisons.
pub const EPSILON: f64 = 1e-10;
