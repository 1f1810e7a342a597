use std::f64::consts::{LN_2, PI};

use ndarray::Array3;
use rayon::prelude::*;

use crate::consts::{
    KERNEL_SIZE, SUBJECT_UNCERTAINTY_MM, TEMPLATE_UNCERTAINTY_MM,
};
use crate::error::{AleError, Result};
use crate::experiment::Experiment;

/// Full width at half maximum of the smoothing Gaussian for an experiment
/// with `subjects` participants, in millimeters.
///
/// Combines the empirical between-template and between-subject
/// localization uncertainties (Eickhoff et al. 2009); the subject term
/// shrinks with sqrt(N), so larger studies get tighter kernels.
pub fn kernel_fwhm_mm(subjects: u32) -> Result<f64> {
    if subjects == 0 {
        return Err(AleError::InvalidSubjects(0));
    }
    let ed_scale = (8.0 * LN_2).sqrt() / (2.0 * (2.0 / PI).sqrt());
    let template = TEMPLATE_UNCERTAINTY_MM * ed_scale;
    let subject = SUBJECT_UNCERTAINTY_MM * ed_scale / (subjects as f64).sqrt();
    Ok((template * template + subject * subject).sqrt())
}

/// Build the smoothing kernel for an experiment: an isotropic Gaussian in
/// a fixed KERNEL_SIZE^3 box, normalized to unit mass so MA values read as
/// probabilities. Deterministic in `subjects`.
pub fn smoothing_kernel(subjects: u32, voxel_size_mm: f64) -> Result<Array3<f64>> {
    let fwhm_mm = kernel_fwhm_mm(subjects)?;
    let sigma_vox = fwhm_mm / (8.0 * LN_2).sqrt() / voxel_size_mm;
    let s2 = 2.0 * sigma_vox * sigma_vox;

    let r = (KERNEL_SIZE / 2) as isize;
    let mut kernel = Array3::<f64>::zeros((KERNEL_SIZE, KERNEL_SIZE, KERNEL_SIZE));
    let mut sum = 0.0;
    for i in 0..KERNEL_SIZE {
        for j in 0..KERNEL_SIZE {
            for k in 0..KERNEL_SIZE {
                let di = (i as isize - r) as f64;
                let dj = (j as isize - r) as f64;
                let dk = (k as isize - r) as f64;
                let v = (-(di * di + dj * dj + dk * dk) / s2).exp();
                kernel[[i, j, k]] = v;
                sum += v;
            }
        }
    }
    kernel.mapv_inplace(|v| v / sum);
    Ok(kernel)
}

/// One kernel per experiment.
pub fn kernel_array(
    experiments: &[Experiment],
    voxel_size_mm: f64,
) -> Result<Vec<Array3<f64>>> {
    experiments
        .par_iter()
        .map(|e| smoothing_kernel(e.subjects, voxel_size_mm))
        .collect()
}

/// The largest ALE value the given kernels can produce: every experiment
/// contributing its peak at the same voxel.
pub fn max_ale_value(kernels: &[Array3<f64>]) -> f64 {
    let complement: f64 = kernels
        .iter()
        .map(|k| 1.0 - k.iter().cloned().fold(0.0f64, f64::max))
        .product();
    1.0 - complement
}
