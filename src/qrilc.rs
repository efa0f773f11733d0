// src/qrilc.rs
//! Quantile-regression imputation for left-censored data (QRILC).
//!
//! Each sample is assumed to come from a normal distribution whose lower tail was censored.
//! The distribution is estimated by regressing the sample's empirical quantiles on standard
//! normal quantiles shifted by the missing fraction; missing cells are then drawn from that
//! normal truncated above at the quantile matching the missing fraction.

use crate::error::{DegenerateSpreadPolicy, ImputationError, Result};
use crate::mask::{into_complete, observed_values};
use crate::orientation::SampleAxis;
use crate::stats::{
    fit_line, linspace, normal_quantile, quantile_sorted, seeded_rng, sorted_copy, standard_normal_quantile,
    UpperTruncatedNormal,
};
use log::{debug, info, trace, warn};
use ndarray::{Array2, ArrayBase, Data, Ix2};
use rand::Rng;
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};

const QUANTILE_LEVELS: usize = 100;
const UPPER_LEVEL: f64 = 0.99;

/// Parameters for [`impute_qrilc`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrilcConfig {
    pub sample_axis: SampleAxis,
    /// Scales the fitted standard deviation of the imputation distribution; in `[0, 1]`.
    pub tune_sigma: f64,
    /// Offset added to the quantile levels; in `(0, 0.01)`.
    pub eps: f64,
    /// Seed for the generator created by [`impute_qrilc`]. Ignored by the `_with_rng` forms.
    pub random_seed: Option<u64>,
    pub on_degenerate_spread: DegenerateSpreadPolicy,
}

impl QrilcConfig {
    /// Config with `tune_sigma = 1`, `eps = 0.005`, an entropy-seeded generator and
    /// failing on degenerate fits.
    pub fn new(sample_axis: SampleAxis) -> Self {
        Self {
            sample_axis,
            tune_sigma: 1.0,
            eps: 0.005,
            random_seed: None,
            on_degenerate_spread: DegenerateSpreadPolicy::Fail,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.tune_sigma) {
            return Err(ImputationError::invalid_argument(
                "tune_sigma",
                format!("must lie in [0, 1], got {}", self.tune_sigma),
            ));
        }
        if !(self.eps > 0.0 && self.eps < 0.01) {
            return Err(ImputationError::invalid_argument(
                "eps",
                format!("must lie in (0, 0.01), got {}", self.eps),
            ));
        }
        Ok(())
    }
}

/// Normal distribution fitted to one left-censored sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CensoredNormalFit {
    pub mean: f64,
    /// Untuned standard deviation.
    pub sd: f64,
    /// Upper truncation bound for imputed values: the `(missing_fraction + eps)` quantile
    /// of `N(mean, sd)`.
    pub bound: f64,
}

/// Fits the complete-data normal distribution of a sample from its observed values.
///
/// Returns `None` when the fit is degenerate: a singular regression, zero fitted spread, or
/// non-finite quantiles (e.g. a missing fraction so close to 1 that the levels reach 1).
pub fn fit_censored_normal(observed: &[f64], missing_fraction: f64, eps: f64) -> Option<CensoredNormalFit> {
    if observed.is_empty() {
        return None;
    }
    let lower = missing_fraction + eps;
    let upper = UPPER_LEVEL + eps;
    let q_normal: Vec<f64> = linspace(lower, upper, QUANTILE_LEVELS)
        .into_iter()
        .map(standard_normal_quantile)
        .collect();
    if q_normal.iter().any(|q| !q.is_finite()) {
        return None;
    }
    let sorted = sorted_copy(observed);
    let q_sample: Vec<f64> = linspace(eps, upper, QUANTILE_LEVELS)
        .into_iter()
        .map(|p| quantile_sorted(&sorted, p))
        .collect();

    let line = fit_line(&q_normal, &q_sample)?;
    let mean = line.intercept;
    let sd = line.slope.abs();
    if !mean.is_finite() || !sd.is_finite() || sd == 0.0 {
        return None;
    }
    let bound = normal_quantile(lower, mean, sd);
    bound.is_finite().then_some(CensoredNormalFit { mean, sd, bound })
}

/// Imputes missing cells by QRILC, returning a completed copy.
///
/// Uses a generator seeded from `config.random_seed`, or from OS entropy when unset.
///
/// Samples without missing cells are not fitted and take nothing from the generator. Every
/// other sample takes one draw per cell, observed or not, so a sample's draws depend only on
/// the incomplete samples before it.
///
/// # Errors
/// - `InvalidArgument` for an invalid config.
/// - `AllMissingSlice` if a sample with missing cells has no observed values.
/// - `NumericDegeneracy` for a degenerate fit under [`DegenerateSpreadPolicy::Fail`].
pub fn impute_qrilc<S>(data: &ArrayBase<S, Ix2>, config: &QrilcConfig) -> Result<Array2<f64>>
where
    S: Data<Elem = Option<f64>>,
{
    let mut rng = seeded_rng(config.random_seed);
    impute_qrilc_with_rng(data, config, &mut rng)
}

/// As [`impute_qrilc`], drawing from `rng`.
pub fn impute_qrilc_with_rng<S, R>(data: &ArrayBase<S, Ix2>, config: &QrilcConfig, rng: &mut R) -> Result<Array2<f64>>
where
    S: Data<Elem = Option<f64>>,
    R: Rng + ?Sized,
{
    let mut working = data.to_owned();
    impute_qrilc_inplace_with_rng(&mut working, config, rng)?;
    into_complete(working)
}

/// In-place form of [`impute_qrilc`].
pub fn impute_qrilc_inplace<'a>(data: &'a mut Array2<Option<f64>>, config: &QrilcConfig) -> Result<&'a mut Array2<Option<f64>>> {
    let mut rng = seeded_rng(config.random_seed);
    impute_qrilc_inplace_with_rng(data, config, &mut rng)
}

/// In-place form of [`impute_qrilc_with_rng`].
pub fn impute_qrilc_inplace_with_rng<'a, R>(
    data: &'a mut Array2<Option<f64>>,
    config: &QrilcConfig,
    rng: &mut R,
) -> Result<&'a mut Array2<Option<f64>>>
where
    R: Rng + ?Sized,
{
    config.validate()?;
    let lane_axis = config.sample_axis.lane_axis().index();
    let mut samples = config.sample_axis.samples_as_rows_mut(data.view_mut());
    info!(
        "QRILC imputation over {} samples x {} features (tune_sigma = {}, eps = {}).",
        samples.nrows(),
        samples.ncols(),
        config.tune_sigma,
        config.eps
    );

    let mut imputed = 0usize;
    let mut propagated = 0usize;
    for (index, mut sample) in samples.rows_mut().into_iter().enumerate() {
        let n = sample.len();
        let observed = observed_values(sample.iter());
        if observed.len() == n {
            trace!("Sample {} is complete; skipping.", index);
            continue;
        }
        if observed.is_empty() {
            return Err(ImputationError::AllMissingSlice {
                axis: Some(lane_axis),
                index,
            });
        }
        let n_missing = n - observed.len();
        let missing_fraction = n_missing as f64 / n as f64;

        let fitted = fit_censored_normal(&observed, missing_fraction, config.eps).and_then(|fit| {
            UpperTruncatedNormal::new(fit.mean, fit.sd * config.tune_sigma, fit.bound).map(|dist| (fit, dist))
        });
        let draws: Vec<f64> = match fitted {
            Some((fit, dist)) => {
                debug!(
                    "Sample {}: {:.1}% missing, fitted mean {:.4}, sd {:.4}, truncation bound {:.4}.",
                    index,
                    100.0 * missing_fraction,
                    fit.mean,
                    fit.sd,
                    fit.bound
                );
                (0..n).map(|_| dist.sample(rng)).collect()
            }
            None => match config.on_degenerate_spread {
                DegenerateSpreadPolicy::Fail => {
                    return Err(ImputationError::NumericDegeneracy {
                        context: "QRILC",
                        index: Some(index),
                        detail: format!(
                            "quantile regression over {} observed value(s) gave no usable spread",
                            observed.len()
                        ),
                    })
                }
                DegenerateSpreadPolicy::PropagateNan => {
                    warn!("Sample {}: degenerate QRILC fit; filling {} missing cell(s) with NaN.", index, n_missing);
                    propagated += n_missing;
                    vec![f64::NAN; n]
                }
            },
        };

        for (cell, draw) in sample.iter_mut().zip(draws) {
            if cell.is_none() {
                *cell = Some(draw);
                imputed += 1;
            }
        }
    }

    info!("QRILC imputation finished: {} cell(s) filled, {} of them with NaN.", imputed, propagated);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::Normal;

    /// Samples as rows drawn from `N(10, 2)`, with each row's lowest `censored` values removed.
    fn censored_matrix(n_samples: usize, n_features: usize, censored: usize, seed: u64) -> Array2<Option<f64>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let normal = Normal::new(10.0, 2.0).unwrap();
        let mut data = Array2::from_shape_fn((n_samples, n_features), |_| Some(normal.sample(&mut rng)));
        for mut row in data.rows_mut() {
            let values: Vec<f64> = row.iter().map(|c| c.unwrap()).collect();
            let cutoff = sorted_copy(&values)[censored];
            row.mapv_inplace(|c| c.filter(|v| *v >= cutoff));
        }
        data
    }

    fn seeded(sample_axis: SampleAxis, seed: u64) -> QrilcConfig {
        QrilcConfig {
            random_seed: Some(seed),
            ..QrilcConfig::new(sample_axis)
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let data = array![[Some(1.0), None, Some(2.0)]];
        for tune_sigma in [-0.1, 1.5, f64::NAN] {
            let config = QrilcConfig { tune_sigma, ..seeded(SampleAxis::Rows, 1) };
            assert!(matches!(
                impute_qrilc(&data, &config),
                Err(ImputationError::InvalidArgument { parameter: "tune_sigma", .. })
            ));
        }
        for eps in [0.0, 0.01, 0.2] {
            let config = QrilcConfig { eps, ..seeded(SampleAxis::Rows, 1) };
            assert!(matches!(
                impute_qrilc(&data, &config),
                Err(ImputationError::InvalidArgument { parameter: "eps", .. })
            ));
        }
    }

    #[test]
    fn fit_recovers_censored_normal_parameters() {
        let data = censored_matrix(1, 400, 80, 3);
        let observed = observed_values(data.iter());
        let fit = fit_censored_normal(&observed, 0.2, 0.005).unwrap();
        assert!((fit.mean - 10.0).abs() < 1.0, "mean {}", fit.mean);
        assert!((fit.sd - 2.0).abs() < 0.7, "sd {}", fit.sd);
        assert!(fit.bound < fit.mean);
    }

    #[test]
    fn imputed_values_never_exceed_the_truncation_bound() {
        let data = censored_matrix(4, 200, 40, 21);
        let config = seeded(SampleAxis::Rows, 99);
        let filled = impute_qrilc(&data, &config).unwrap();
        for (i, row) in data.rows().into_iter().enumerate() {
            let observed = observed_values(row.iter());
            let fraction = (row.len() - observed.len()) as f64 / row.len() as f64;
            let fit = fit_censored_normal(&observed, fraction, config.eps).unwrap();
            for (j, cell) in row.iter().enumerate() {
                match cell {
                    Some(v) => assert_eq!(filled[[i, j]], *v),
                    None => assert!(filled[[i, j]] <= fit.bound, "{} above {}", filled[[i, j]], fit.bound),
                }
            }
        }
    }

    #[test]
    fn zero_tune_sigma_collapses_onto_the_bound() {
        let data = censored_matrix(1, 100, 30, 5);
        let config = QrilcConfig { tune_sigma: 0.0, ..seeded(SampleAxis::Rows, 1) };
        let filled = impute_qrilc(&data, &config).unwrap();
        let observed = observed_values(data.iter());
        let fit = fit_censored_normal(&observed, 0.3, config.eps).unwrap();
        for (cell, value) in data.iter().zip(filled.iter()) {
            if cell.is_none() {
                assert_eq!(*value, fit.bound.min(fit.mean));
            }
        }
    }

    #[test]
    fn same_seed_gives_same_draws_and_orientation_is_respected() {
        let data = censored_matrix(3, 50, 10, 8);
        let by_rows = impute_qrilc(&data, &seeded(SampleAxis::Rows, 17)).unwrap();
        let again = impute_qrilc(&data, &seeded(SampleAxis::Rows, 17)).unwrap();
        assert_eq!(by_rows, again);

        let transposed = data.t().to_owned();
        let by_columns = impute_qrilc(&transposed, &seeded(SampleAxis::Columns, 17)).unwrap();
        assert_eq!(by_columns, by_rows.t());
    }

    #[test]
    fn constant_sample_follows_degeneracy_policy() {
        let data = array![[Some(5.0), Some(5.0), Some(5.0), None], [Some(1.0), Some(2.0), Some(3.0), Some(4.0)]];
        let failing = seeded(SampleAxis::Rows, 2);
        assert!(matches!(
            impute_qrilc(&data, &failing),
            Err(ImputationError::NumericDegeneracy { context: "QRILC", index: Some(0), .. })
        ));

        let propagating = QrilcConfig {
            on_degenerate_spread: DegenerateSpreadPolicy::PropagateNan,
            ..failing
        };
        let filled = impute_qrilc(&data, &propagating).unwrap();
        assert!(filled[[0, 3]].is_nan());
        assert_eq!(filled.row(1), array![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn complete_samples_take_no_draws() {
        let incomplete = censored_matrix(2, 40, 8, 13);
        let complete_row = Array2::from_shape_fn((1, 40), |(_, j)| Some(j as f64));
        let mut with_complete = Array2::from_elem((3, 40), None);
        with_complete.row_mut(0).assign(&incomplete.row(0));
        with_complete.row_mut(1).assign(&complete_row.row(0));
        with_complete.row_mut(2).assign(&incomplete.row(1));

        let config = seeded(SampleAxis::Rows, 31);
        let baseline = impute_qrilc(&incomplete, &config).unwrap();
        let filled = impute_qrilc(&with_complete, &config).unwrap();
        assert_eq!(filled.row(0), baseline.row(0));
        assert_eq!(filled.row(2), baseline.row(1));
        assert_eq!(filled.row(1), complete_row.mapv(|c| c.unwrap()).row(0));
    }

    #[test]
    fn all_missing_sample_is_an_error() {
        let data = array![[Some(1.0), Some(2.0)], [None, None]];
        assert!(matches!(
            impute_qrilc(&data, &seeded(SampleAxis::Rows, 1)),
            Err(ImputationError::AllMissingSlice { axis: Some(1), index: 1 })
        ));
    }

    #[test]
    fn inplace_with_rng_matches_value_form() {
        let data = censored_matrix(2, 60, 12, 4);
        let config = QrilcConfig::new(SampleAxis::Rows);
        let expected = impute_qrilc_with_rng(&data, &config, &mut ChaCha8Rng::seed_from_u64(6)).unwrap();
        let mut working = data.clone();
        impute_qrilc_inplace_with_rng(&mut working, &config, &mut ChaCha8Rng::seed_from_u64(6)).unwrap();
        assert_eq!(working.mapv(|c| c.unwrap()), expected);
    }
}
