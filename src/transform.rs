// src/transform.rs
//! Missing-aware value transforms applied before or after imputation.
//!
//! Every transform leaves missing cells missing and computes its parameters from the observed
//! values of each slice only. Slices follow the same convention as [`crate::substitute`]:
//! `dim = None` is the whole array, `Some(Axis(k))` is every lane running along axis `k`.

use crate::error::{DegenerateSpreadPolicy, ImputationError, Result};
use crate::mask::observed_values;
use crate::stats::{mean, median, median_absolute_deviation};
use crate::substitute::check_axis;
use log::{debug, warn};
use ndarray::{Array, ArrayBase, Axis, Data, Dimension};
use serde::{Deserialize, Serialize};

/// Consistency constant that makes the MAD estimate the standard deviation of normal data.
const MAD_TO_SD: f64 = 1.4826;

/// Parameters for [`huberize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HuberConfig {
    /// Clipping half-width in robust standard deviations.
    pub alpha: f64,
    pub on_degenerate_spread: DegenerateSpreadPolicy,
}

impl Default for HuberConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            on_degenerate_spread: DegenerateSpreadPolicy::Fail,
        }
    }
}

impl HuberConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha.is_finite()) {
            return Err(ImputationError::invalid_argument(
                "alpha",
                format!("must be positive and finite, got {}", self.alpha),
            ));
        }
        Ok(())
    }
}

/// Computes per-slice parameters with `params` and rewrites every observed value with `apply`.
fn transform_slices<D, T, P, M>(data: &mut Array<Option<f64>, D>, dim: Option<Axis>, params: P, apply: M) -> Result<()>
where
    D: Dimension,
    P: Fn(&[f64], usize) -> Result<T>,
    M: Fn(f64, &T) -> f64,
{
    match dim {
        None => {
            let observed = observed_values(data.iter());
            if observed.is_empty() {
                return Err(ImputationError::AllMissingSlice { axis: None, index: 0 });
            }
            let param = params(&observed, 0)?;
            data.iter_mut().flatten().for_each(|v| *v = apply(*v, &param));
        }
        Some(axis) => {
            check_axis(axis, data.ndim())?;
            for (index, mut lane) in data.lanes_mut(axis).into_iter().enumerate() {
                let observed = observed_values(lane.iter());
                if observed.is_empty() {
                    return Err(ImputationError::AllMissingSlice {
                        axis: Some(axis.index()),
                        index,
                    });
                }
                let param = params(&observed, index)?;
                lane.iter_mut().flatten().for_each(|v| *v = apply(*v, &param));
            }
        }
    }
    Ok(())
}

/// Logarithm in `base` of every observed value, in place.
///
/// # Errors
/// `InvalidArgument` if `base` is not a positive finite number other than 1, or if an observed
/// value is not strictly positive. The array is unchanged on error.
pub fn log_transform_inplace<D: Dimension>(data: &mut Array<Option<f64>, D>, base: f64) -> Result<&mut Array<Option<f64>, D>> {
    if !(base > 0.0 && base.is_finite() && base != 1.0) {
        return Err(ImputationError::invalid_argument(
            "base",
            format!("must be positive, finite and not 1, got {}", base),
        ));
    }
    if let Some(bad) = data.iter().flatten().find(|v| !(**v > 0.0)) {
        return Err(ImputationError::invalid_argument(
            "data",
            format!("log transform needs strictly positive values, found {}", bad),
        ));
    }
    debug!("Log-transforming {} cells with base {}.", data.len(), base);
    data.iter_mut().flatten().for_each(|v| *v = v.log(base));
    Ok(data)
}

/// Non-mutating form of [`log_transform_inplace`].
pub fn log_transform<S, D>(data: &ArrayBase<S, D>, base: f64) -> Result<Array<Option<f64>, D>>
where
    S: Data<Elem = Option<f64>>,
    D: Dimension,
{
    let mut working = data.to_owned();
    log_transform_inplace(&mut working, base)?;
    Ok(working)
}

/// Subtracts each slice's observed mean from its observed values, in place.
pub fn mean_center_inplace<D: Dimension>(data: &mut Array<Option<f64>, D>, dim: Option<Axis>) -> Result<&mut Array<Option<f64>, D>> {
    transform_slices(
        data,
        dim,
        |observed, _| Ok(mean(observed).unwrap_or(f64::NAN)),
        |v, centre| v - centre,
    )?;
    Ok(data)
}

/// Non-mutating form of [`mean_center_inplace`].
pub fn mean_center<S, D>(data: &ArrayBase<S, D>, dim: Option<Axis>) -> Result<Array<Option<f64>, D>>
where
    S: Data<Elem = Option<f64>>,
    D: Dimension,
{
    let mut working = data.to_owned();
    mean_center_inplace(&mut working, dim)?;
    Ok(working)
}

/// Clips each slice's observed values to `median ± alpha · 1.4826 · MAD`, in place.
///
/// A slice with zero MAD follows `config.on_degenerate_spread`; under `PropagateNan` its
/// observed values become `NaN`.
pub fn huberize_inplace<'a, D: Dimension>(
    data: &'a mut Array<Option<f64>, D>,
    dim: Option<Axis>,
    config: &HuberConfig,
) -> Result<&'a mut Array<Option<f64>, D>> {
    config.validate()?;
    transform_slices(
        data,
        dim,
        |observed, index| {
            let centre = median(observed).unwrap_or(f64::NAN);
            let scale = MAD_TO_SD * median_absolute_deviation(observed).unwrap_or(f64::NAN);
            if scale > 0.0 && scale.is_finite() {
                let half_width = config.alpha * scale;
                return Ok(Some((centre - half_width, centre + half_width)));
            }
            match config.on_degenerate_spread {
                DegenerateSpreadPolicy::Fail => Err(ImputationError::NumericDegeneracy {
                    context: "Huberization",
                    index: Some(index),
                    detail: format!("median absolute deviation is {}", scale / MAD_TO_SD),
                }),
                DegenerateSpreadPolicy::PropagateNan => {
                    warn!("Slice {}: zero median absolute deviation; Huberized values set to NaN.", index);
                    Ok(None)
                }
            }
        },
        |v, bounds| match bounds {
            Some((low, high)) => v.clamp(*low, *high),
            None => f64::NAN,
        },
    )?;
    Ok(data)
}

/// Non-mutating form of [`huberize_inplace`].
pub fn huberize<S, D>(data: &ArrayBase<S, D>, dim: Option<Axis>, config: &HuberConfig) -> Result<Array<Option<f64>, D>>
where
    S: Data<Elem = Option<f64>>,
    D: Dimension,
{
    let mut working = data.to_owned();
    huberize_inplace(&mut working, dim, config)?;
    Ok(working)
}

/// Divides each slice's observed values by their sum, in place.
///
/// # Errors
/// `NumericDegeneracy` if a slice sums to zero or to a non-finite value.
pub fn normalize_by_sum_inplace<D: Dimension>(data: &mut Array<Option<f64>, D>, dim: Option<Axis>) -> Result<&mut Array<Option<f64>, D>> {
    transform_slices(
        data,
        dim,
        |observed, index| {
            let total: f64 = observed.iter().sum();
            if total == 0.0 || !total.is_finite() {
                return Err(ImputationError::NumericDegeneracy {
                    context: "sum normalization",
                    index: Some(index),
                    detail: format!("observed values sum to {}", total),
                });
            }
            Ok(total)
        },
        |v, total| v / total,
    )?;
    Ok(data)
}

/// Non-mutating form of [`normalize_by_sum_inplace`].
pub fn normalize_by_sum<S, D>(data: &ArrayBase<S, D>, dim: Option<Axis>) -> Result<Array<Option<f64>, D>>
where
    S: Data<Elem = Option<f64>>,
    D: Dimension,
{
    let mut working = data.to_owned();
    normalize_by_sum_inplace(&mut working, dim)?;
    Ok(working)
}
