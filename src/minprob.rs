// src/minprob.rs
//! Minimum-probability imputation for values missing below a detection limit.
//!
//! Each sample's missing cells are drawn from a normal centred on a low quantile of that
//! sample's observed values. The spread is shared by all samples: the median standard
//! deviation of the well-observed features, scaled by `tune_sigma`.

use crate::error::{DegenerateSpreadPolicy, ImputationError, Result};
use crate::mask::{has_missing, into_complete, observed_values};
use crate::orientation::SampleAxis;
use crate::stats::{median, quantile, sample_sd, seeded_rng};
use log::{debug, info, warn};
use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayBase, ArrayView2, Axis, Data, Ix2};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Smallest observed fraction (exclusive) for a feature to contribute to the pooled spread.
const MIN_OBSERVED_FRACTION: f64 = 0.5;

/// Parameters for [`impute_minprob`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinProbConfig {
    pub sample_axis: SampleAxis,
    /// Quantile of each sample's observed values used as the centre; in `(0, 1)`.
    pub q: f64,
    /// Scales the pooled standard deviation; in `[0, 1]`.
    pub tune_sigma: f64,
    /// Seed for the generator created by [`impute_minprob`]. Ignored by the `_with_rng` forms.
    pub random_seed: Option<u64>,
    pub on_degenerate_spread: DegenerateSpreadPolicy,
}

impl MinProbConfig {
    /// Config with `q = 0.01`, `tune_sigma = 1`, an entropy-seeded generator and failing on
    /// a degenerate pooled spread.
    pub fn new(sample_axis: SampleAxis) -> Self {
        Self {
            sample_axis,
            q: 0.01,
            tune_sigma: 1.0,
            random_seed: None,
            on_degenerate_spread: DegenerateSpreadPolicy::Fail,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.q > 0.0 && self.q < 1.0) {
            return Err(ImputationError::invalid_argument("q", format!("must lie in (0, 1), got {}", self.q)));
        }
        if !(0.0..=1.0).contains(&self.tune_sigma) {
            return Err(ImputationError::invalid_argument(
                "tune_sigma",
                format!("must lie in [0, 1], got {}", self.tune_sigma),
            ));
        }
        Ok(())
    }
}

/// Median sample standard deviation over features observed in more than half of the samples
/// (and at least twice). `None` if no feature qualifies.
///
/// `samples` has samples as rows.
pub fn pooled_feature_sd(samples: ArrayView2<Option<f64>>) -> Option<f64> {
    let n_samples = samples.nrows();
    let sds: Vec<f64> = samples
        .axis_iter(Axis(1))
        .into_par_iter()
        .filter_map(|feature| {
            let observed = observed_values(feature.iter());
            let fraction = observed.len() as f64 / n_samples as f64;
            if fraction > MIN_OBSERVED_FRACTION {
                sample_sd(&observed)
            } else {
                None
            }
        })
        .collect();
    debug!("{} of {} features contribute to the pooled spread.", sds.len(), samples.ncols());
    median(&sds)
}

/// Imputes missing cells by MinProb, returning a completed copy.
///
/// Uses a generator seeded from `config.random_seed`, or from OS entropy when unset.
///
/// # Errors
/// - `InvalidArgument` for an invalid config.
/// - `AllMissingSlice` if a sample has no observed values.
/// - `NumericDegeneracy` if the pooled spread is zero or undefined under
///   [`DegenerateSpreadPolicy::Fail`].
pub fn impute_minprob<S>(data: &ArrayBase<S, Ix2>, config: &MinProbConfig) -> Result<Array2<f64>>
where
    S: Data<Elem = Option<f64>>,
{
    let mut rng = seeded_rng(config.random_seed);
    impute_minprob_with_rng(data, config, &mut rng)
}

/// As [`impute_minprob`], drawing from `rng`.
pub fn impute_minprob_with_rng<S, R>(data: &ArrayBase<S, Ix2>, config: &MinProbConfig, rng: &mut R) -> Result<Array2<f64>>
where
    S: Data<Elem = Option<f64>>,
    R: Rng + ?Sized,
{
    let mut working = data.to_owned();
    impute_minprob_inplace_with_rng(&mut working, config, rng)?;
    into_complete(working)
}

/// In-place form of [`impute_minprob`].
pub fn impute_minprob_inplace<'a>(data: &'a mut Array2<Option<f64>>, config: &MinProbConfig) -> Result<&'a mut Array2<Option<f64>>> {
    let mut rng = seeded_rng(config.random_seed);
    impute_minprob_inplace_with_rng(data, config, &mut rng)
}

/// In-place form of [`impute_minprob_with_rng`].
pub fn impute_minprob_inplace_with_rng<'a, R>(
    data: &'a mut Array2<Option<f64>>,
    config: &MinProbConfig,
    rng: &mut R,
) -> Result<&'a mut Array2<Option<f64>>>
where
    R: Rng + ?Sized,
{
    config.validate()?;
    let lane_axis = config.sample_axis.lane_axis().index();
    let samples = config.sample_axis.samples_as_rows(data.view());
    info!(
        "MinProb imputation over {} samples x {} features (q = {}, tune_sigma = {}).",
        samples.nrows(),
        samples.ncols(),
        config.q,
        config.tune_sigma
    );

    let mut centres = Vec::with_capacity(samples.nrows());
    for (index, sample) in samples.rows().into_iter().enumerate() {
        let observed = observed_values(sample.iter());
        match quantile(&observed, config.q) {
            Some(centre) => centres.push(centre),
            None => {
                return Err(ImputationError::AllMissingSlice {
                    axis: Some(lane_axis),
                    index,
                })
            }
        }
    }
    if !has_missing(&samples) {
        return Ok(data);
    }

    let untuned_sd = pooled_feature_sd(samples);
    let sd = match untuned_sd {
        Some(sd) if sd.is_finite() && sd > 0.0 => Some(sd * config.tune_sigma),
        _ => match config.on_degenerate_spread {
            DegenerateSpreadPolicy::Fail => {
                return Err(ImputationError::NumericDegeneracy {
                    context: "MinProb",
                    index: None,
                    detail: match untuned_sd {
                        Some(sd) => format!("pooled feature standard deviation is {}", sd),
                        None => "no feature is observed in more than half of the samples".to_string(),
                    },
                })
            }
            DegenerateSpreadPolicy::PropagateNan => {
                warn!("Pooled spread is degenerate ({:?}); missing cells are filled with NaN.", untuned_sd);
                None
            }
        },
    };
    debug!("Pooled standard deviation after tuning: {:?}.", sd);

    let mut samples = config.sample_axis.samples_as_rows_mut(data.view_mut());
    let mut imputed = 0usize;
    for (index, mut sample) in samples.rows_mut().into_iter().enumerate() {
        let centre = centres[index];
        let normal = match sd {
            Some(sd) => Some(Normal::new(centre, sd).map_err(|e| ImputationError::NumericDegeneracy {
                context: "MinProb",
                index: Some(index),
                detail: format!("cannot build N({}, {}): {}", centre, sd, e),
            })?),
            None => None,
        };
        for cell in sample.iter_mut().filter(|cell| cell.is_none()) {
            *cell = Some(match &normal {
                Some(normal) => normal.sample(rng),
                None => f64::NAN,
            });
            imputed += 1;
        }
    }

    info!("MinProb imputation finished: {} cell(s) filled.", imputed);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn seeded(sample_axis: SampleAxis, seed: u64) -> MinProbConfig {
        MinProbConfig {
            random_seed: Some(seed),
            ..MinProbConfig::new(sample_axis)
        }
    }

    /// 4 samples (rows) x 6 features with distinct per-feature spreads.
    fn example() -> Array2<Option<f64>> {
        array![
            [Some(10.0), Some(20.0), None, Some(5.0), Some(7.0), None],
            [Some(11.0), Some(22.0), Some(3.0), Some(5.5), None, None],
            [Some(12.0), None, Some(4.0), Some(6.0), Some(8.0), None],
            [Some(13.0), Some(26.0), Some(5.0), None, Some(9.0), Some(1.0)]
        ]
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let data = example();
        for q in [0.0, 1.0, -0.5] {
            let config = MinProbConfig { q, ..seeded(SampleAxis::Rows, 1) };
            assert!(matches!(
                impute_minprob(&data, &config),
                Err(ImputationError::InvalidArgument { parameter: "q", .. })
            ));
        }
        let config = MinProbConfig { tune_sigma: 2.0, ..seeded(SampleAxis::Rows, 1) };
        assert!(matches!(
            impute_minprob(&data, &config),
            Err(ImputationError::InvalidArgument { parameter: "tune_sigma", .. })
        ));
    }

    #[test]
    fn pooled_sd_uses_well_observed_features_only() {
        let data = example();
        // Features 0, 1, 2, 3 and 4 are at least 3/4 observed; feature 5 is 1/4 observed.
        let expected_sds = [
            sample_sd(&[10.0, 11.0, 12.0, 13.0]).unwrap(),
            sample_sd(&[20.0, 22.0, 26.0]).unwrap(),
            sample_sd(&[3.0, 4.0, 5.0]).unwrap(),
            sample_sd(&[5.0, 5.5, 6.0]).unwrap(),
            sample_sd(&[7.0, 8.0, 9.0]).unwrap(),
        ];
        assert_eq!(pooled_feature_sd(data.view()), median(&expected_sds));
    }

    #[test]
    fn zero_tune_sigma_fills_with_the_low_quantile() {
        let data = example();
        let config = MinProbConfig { tune_sigma: 0.0, ..seeded(SampleAxis::Rows, 3) };
        let filled = impute_minprob(&data, &config).unwrap();
        for (i, row) in data.rows().into_iter().enumerate() {
            let centre = quantile(&observed_values(row.iter()), config.q).unwrap();
            for (j, cell) in row.iter().enumerate() {
                match cell {
                    Some(v) => assert_eq!(filled[[i, j]], *v),
                    None => assert_eq!(filled[[i, j]], centre),
                }
            }
        }
    }

    #[test]
    fn column_samples_match_transposed_row_samples() {
        let data = example();
        let by_rows = impute_minprob(&data, &seeded(SampleAxis::Rows, 12)).unwrap();
        let by_columns = impute_minprob(&data.t().to_owned(), &seeded(SampleAxis::Columns, 12)).unwrap();
        assert_eq!(by_columns, by_rows.t());
    }

    #[test]
    fn degenerate_pooled_spread_follows_policy() {
        // Only feature 0 is well observed and it is constant.
        let data = array![[Some(1.0), None], [Some(1.0), Some(4.0)], [Some(1.0), None]];
        let failing = seeded(SampleAxis::Rows, 1);
        assert!(matches!(
            impute_minprob(&data, &failing),
            Err(ImputationError::NumericDegeneracy { context: "MinProb", index: None, .. })
        ));
        let propagating = MinProbConfig {
            on_degenerate_spread: DegenerateSpreadPolicy::PropagateNan,
            ..failing
        };
        let filled = impute_minprob(&data, &propagating).unwrap();
        assert!(filled[[0, 1]].is_nan() && filled[[2, 1]].is_nan());
        assert_eq!(filled[[1, 1]], 4.0);
    }

    #[test]
    fn all_missing_sample_is_an_error() {
        let data = array![[Some(1.0), Some(2.0)], [None, None], [Some(2.0), Some(3.0)]];
        assert!(matches!(
            impute_minprob(&data, &seeded(SampleAxis::Rows, 1)),
            Err(ImputationError::AllMissingSlice { axis: Some(1), index: 1 })
        ));
    }

    #[test]
    fn complete_matrix_is_left_alone() {
        let data = array![[Some(1.0), Some(2.0)], [Some(3.0), Some(4.0)]];
        let filled = impute_minprob(&data, &seeded(SampleAxis::Columns, 1)).unwrap();
        assert_eq!(filled, array![[1.0, 2.0], [3.0, 4.0]]);
    }
}
