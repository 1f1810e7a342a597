use ndarray::Array3;

use crate::error::{AleError, Result};

/// Combine MA volumes into the ALE statistic:
/// `ALE(v) = 1 - prod_i(1 - MA_i(v))`.
///
/// Monotone in every input; 0 exactly where every MA is 0.
pub fn compute_ale(ma: &[Array3<f64>]) -> Result<Array3<f64>> {
    let mut iter = ma.iter();
    let first = iter.next().ok_or(AleError::EmptyExperimentSet)?;

    let mut complement = first.mapv(|v| 1.0 - v);
    for vol in iter {
        complement.zip_mut_with(vol, |c, &m| *c *= 1.0 - m);
    }
    complement.mapv_inplace(|c| 1.0 - c);
    Ok(complement)
}

/// ALE over a subset of the MA volumes, given by index.
pub fn compute_ale_subset(ma: &[Array3<f64>], subset: &[usize]) -> Result<Array3<f64>> {
    let mut iter = subset.iter();
    let &first = iter.next().ok_or(AleError::EmptyExperimentSet)?;

    let mut complement = ma[first].mapv(|v| 1.0 - v);
    for &i in iter {
        complement.zip_mut_with(&ma[i], |c, &m| *c *= 1.0 - m);
    }
    complement.mapv_inplace(|c| 1.0 - c);
    Ok(complement)
}
