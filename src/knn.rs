// src/knn.rs
//! Nearest-neighbour imputation.
//!
//! Every observation (a row or a column, per [`SampleAxis`]) is a point. Missing coordinates
//! get a temporary fill with the coordinate's mean across observations, which is only used to
//! build the k-d tree and measure distances. Each missing coordinate is then replaced by the
//! inverse-distance-weighted mean of that coordinate over the `k` nearest other observations,
//! counting only neighbours that actually observed it.

use crate::error::{ImputationError, Result};
use crate::mask::{count_missing, into_complete};
use crate::orientation::SampleAxis;
use crate::spatial::{DistanceMetric, KdTree, Neighbor};
use crate::substitute::substitute_inplace;
use log::{debug, info, trace, warn};
use ndarray::{Array2, ArrayBase, ArrayView2, Axis, Data, Ix2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Parameters for [`impute_knn`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnConfig {
    /// Number of neighbours, excluding the observation itself. Must be at least 1.
    pub k: usize,
    /// Largest fraction of the `k` neighbours that may lack a coordinate before that coordinate
    /// is left at its temporary fill. Must lie strictly between 0 and 1.
    pub threshold: f64,
    /// Which axis enumerates observations.
    pub sample_axis: SampleAxis,
    pub metric: DistanceMetric,
}

impl KnnConfig {
    /// Config with `k = 10`, `threshold = 0.5` and Euclidean distance.
    pub fn new(sample_axis: SampleAxis) -> Self {
        Self {
            k: 10,
            threshold: 0.5,
            sample_axis,
            metric: DistanceMetric::Euclidean,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.k < 1 {
            return Err(ImputationError::invalid_argument("k", "must be at least 1"));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(ImputationError::invalid_argument(
                "threshold",
                format!("must lie in (0, 1), got {}", self.threshold),
            ));
        }
        self.metric.validate()
    }
}

/// Outcome counts for one imputation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KnnReport {
    /// Missing coordinates replaced by a neighbour average.
    pub imputed: usize,
    /// Missing coordinates left at the temporary mean fill.
    pub left_at_mean: usize,
}

/// Imputes missing cells from nearest neighbours, returning a completed copy.
///
/// # Errors
/// - `InvalidArgument` for an invalid config.
/// - `AllMissingSlice` if some coordinate is missing in every observation.
pub fn impute_knn<S>(data: &ArrayBase<S, Ix2>, config: &KnnConfig) -> Result<Array2<f64>>
where
    S: Data<Elem = Option<f64>>,
{
    impute_knn_with_report(data, config).map(|(filled, _)| filled)
}

/// As [`impute_knn`], also reporting how many coordinates were imputed or skipped.
pub fn impute_knn_with_report<S>(data: &ArrayBase<S, Ix2>, config: &KnnConfig) -> Result<(Array2<f64>, KnnReport)>
where
    S: Data<Elem = Option<f64>>,
{
    config.validate()?;
    let observations = config.sample_axis.samples_as_rows(data.view());
    let (filled, report) = fill_observations(observations, config)?;
    let filled = match config.sample_axis {
        SampleAxis::Rows => filled,
        SampleAxis::Columns => filled.reversed_axes(),
    };
    Ok((filled, report))
}

/// In-place form of [`impute_knn`]: every missing cell of `data` is filled.
pub fn impute_knn_inplace<'a>(data: &'a mut Array2<Option<f64>>, config: &KnnConfig) -> Result<&'a mut Array2<Option<f64>>> {
    let (filled, _) = impute_knn_with_report(data, config)?;
    data.zip_mut_with(&filled, |cell, &value| {
        if cell.is_none() {
            *cell = Some(value);
        }
    });
    Ok(data)
}

/// Works on observations as rows; returns the completed matrix in the same orientation.
fn fill_observations(observations: ArrayView2<Option<f64>>, config: &KnnConfig) -> Result<(Array2<f64>, KnnReport)> {
    let (n_obs, n_coords) = observations.dim();
    let total_missing = count_missing(&observations);
    info!(
        "KNN imputation over {} observations x {} coordinates ({} missing, k = {}, metric = {:?}).",
        n_obs, n_coords, total_missing, config.k, config.metric
    );

    // Temporary fill: per-coordinate mean across observations. Errors are reported against the
    // caller's orientation, where a coordinate runs along the sample axis.
    let mut working = observations.to_owned();
    substitute_inplace(
        &mut working,
        |values| values.iter().sum::<f64>() / values.len() as f64,
        Some(Axis(0)),
    )
    .map_err(|err| match err {
        ImputationError::AllMissingSlice { index, .. } => ImputationError::AllMissingSlice {
            axis: Some(config.sample_axis.axis().index()),
            index,
        },
        other => other,
    })?;
    let mut filled = into_complete(working)?;

    if total_missing == 0 {
        return Ok((filled, KnnReport::default()));
    }

    let available = n_obs.saturating_sub(1);
    if available == 0 {
        warn!("Only one observation; all {} missing coordinates keep their mean fill.", total_missing);
        return Ok((
            filled,
            KnnReport {
                imputed: 0,
                left_at_mean: total_missing,
            },
        ));
    }
    let k = if config.k > available {
        warn!("k = {} exceeds the {} other observations available; using k = {}.", config.k, available, available);
        available
    } else {
        config.k
    };

    let tree = KdTree::build(filled.view(), config.metric)?;
    debug!("Built k-d tree over {} observations.", tree.len());

    let rows_with_missing: Vec<usize> = observations
        .rows()
        .into_iter()
        .enumerate()
        .filter(|(_, row)| row.iter().any(|cell| cell.is_none()))
        .map(|(i, _)| i)
        .collect();

    let per_row: Vec<(usize, Vec<(usize, f64)>, usize)> = rows_with_missing
        .par_iter()
        .map(|&row| {
            let neighbors = tree.nearest(filled.row(row), k + 1, Some(row));
            check_self_match(row, &neighbors)?;
            let mut fills = Vec::new();
            let mut skipped = 0usize;
            for (coord, cell) in observations.row(row).iter().enumerate() {
                if cell.is_some() {
                    continue;
                }
                match weighted_neighbor_mean(observations, &neighbors[1..], coord, k, config.threshold) {
                    Some(value) => fills.push((coord, value)),
                    None => skipped += 1,
                }
            }
            trace!("Observation {}: {} coordinate(s) imputed, {} skipped.", row, fills.len(), skipped);
            Ok((row, fills, skipped))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut report = KnnReport::default();
    for (row, fills, skipped) in per_row {
        report.imputed += fills.len();
        report.left_at_mean += skipped;
        for (coord, value) in fills {
            filled[[row, coord]] = value;
        }
    }

    if report.left_at_mean > 0 {
        warn!(
            "{} missing coordinate(s) had too few observed neighbours and keep their mean fill.",
            report.left_at_mean
        );
    }
    info!("KNN imputation finished: {} imputed, {} left at mean.", report.imputed, report.left_at_mean);
    Ok((filled, report))
}

fn check_self_match(row: usize, neighbors: &[Neighbor]) -> Result<()> {
    match neighbors.first() {
        Some(first) if first.index == row && first.distance == 0.0 => Ok(()),
        Some(first) => Err(ImputationError::InvariantViolation(format!(
            "observation {} is not its own nearest neighbour (got {} at distance {})",
            row, first.index, first.distance
        ))),
        None => Err(ImputationError::InvariantViolation(format!(
            "neighbour query for observation {} returned nothing",
            row
        ))),
    }
}

/// Inverse-distance-weighted mean of `coord` over the neighbours that observed it.
///
/// `None` when more than `threshold` of the `k` neighbours lack the coordinate, or when the
/// weights are degenerate (a non-self neighbour at distance zero, or nothing left to average).
fn weighted_neighbor_mean(
    observations: ArrayView2<Option<f64>>,
    neighbors: &[Neighbor],
    coord: usize,
    k: usize,
    threshold: f64,
) -> Option<f64> {
    let mut excluded = 0usize;
    let mut weight_sum = 0.0;
    let mut weighted_values = 0.0;
    for neighbor in neighbors {
        match observations[[neighbor.index, coord]] {
            None => excluded += 1,
            Some(value) => {
                let weight = 1.0 / neighbor.distance;
                weight_sum += weight;
                weighted_values += weight * value;
            }
        }
    }
    if excluded as f64 / k as f64 > threshold {
        return None;
    }
    if weight_sum == 0.0 || !weight_sum.is_finite() {
        return None;
    }
    let value = weighted_values / weight_sum;
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn rows_config(k: usize, threshold: f64) -> KnnConfig {
        KnnConfig {
            k,
            threshold,
            sample_axis: SampleAxis::Rows,
            metric: DistanceMetric::Euclidean,
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let data = array![[Some(1.0), None], [Some(2.0), Some(3.0)]];
        assert!(matches!(
            impute_knn(&data, &rows_config(0, 0.5)),
            Err(ImputationError::InvalidArgument { parameter: "k", .. })
        ));
        for threshold in [0.0, 1.0, -0.2, f64::NAN] {
            assert!(matches!(
                impute_knn(&data, &rows_config(1, threshold)),
                Err(ImputationError::InvalidArgument { parameter: "threshold", .. })
            ));
        }
    }

    #[test]
    fn weighted_mean_uses_inverse_distances() {
        // Observations are rows. Row 3 misses coordinate 1; its temporary fill is the column
        // mean (2.0), so its position is (1.0, 2.0).
        let data = array![
            [Some(0.0), Some(0.0)],
            [Some(1.0), Some(4.0)],
            [Some(4.0), Some(2.0)],
            [Some(1.0), None]
        ];
        let (filled, report) = impute_knn_with_report(&data, &rows_config(2, 0.5)).unwrap();
        // Nearest two: row 1 at distance 2, row 0 at distance sqrt(5).
        let w1 = 1.0 / 2.0;
        let w0 = 1.0 / 5.0f64.sqrt();
        let expected = (w1 * 4.0 + w0 * 0.0) / (w1 + w0);
        assert_abs_diff_eq!(filled[[3, 1]], expected, epsilon = 1e-12);
        assert_eq!(report, KnnReport { imputed: 1, left_at_mean: 0 });
    }

    #[test]
    fn coordinate_missing_in_too_many_neighbours_keeps_mean_fill() {
        let data = array![
            [Some(0.0), Some(10.0), None],
            [Some(0.1), None, Some(1.0)],
            [Some(0.2), None, Some(2.0)],
            [Some(5.0), Some(30.0), Some(3.0)]
        ];
        // With k = 2, rows 1 and 2 are each other's nearest neighbour and both lack
        // coordinate 1, so half of their neighbours are excluded. Row 0's neighbours are rows
        // 1 and 2, which both observed coordinate 2.
        let (filled, report) = impute_knn_with_report(&data, &rows_config(2, 0.4)).unwrap();
        let column_one_mean = (10.0 + 30.0) / 2.0;
        assert_eq!(filled[[1, 1]], column_one_mean);
        assert_eq!(filled[[2, 1]], column_one_mean);
        assert_eq!(report, KnnReport { imputed: 1, left_at_mean: 2 });
        assert!(filled[[0, 2]] >= 1.0 && filled[[0, 2]] <= 2.0);

        // At threshold 0.5 a single excluded neighbour out of two is tolerated.
        let (filled, report) = impute_knn_with_report(&data, &rows_config(2, 0.5)).unwrap();
        assert_eq!(report, KnnReport { imputed: 3, left_at_mean: 0 });
        assert_abs_diff_eq!(filled[[1, 1]], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn column_orientation_matches_transposed_row_orientation() {
        let data = array![
            [Some(1.0), Some(2.0), None, Some(4.0)],
            [Some(1.5), Some(2.5), Some(3.5), None],
            [Some(0.5), None, Some(2.5), Some(3.5)]
        ];
        let mut column_config = rows_config(2, 0.5);
        column_config.sample_axis = SampleAxis::Columns;
        let by_columns = impute_knn(&data, &column_config).unwrap();
        let by_rows = impute_knn(&data.t(), &rows_config(2, 0.5)).unwrap();
        assert_eq!(by_columns, by_rows.t());
    }

    #[test]
    fn duplicate_neighbour_at_zero_distance_is_skipped() {
        // Rows 0 and 1 coincide after the temporary fill, so row 1 sits at distance zero from
        // row 0 and its infinite weight makes the average undefined.
        let data = array![
            [Some(1.0), None],
            [Some(1.0), Some(2.0)],
            [Some(2.0), Some(1.0)],
            [Some(9.0), Some(3.0)]
        ];
        let (filled, report) = impute_knn_with_report(&data, &rows_config(2, 0.5)).unwrap();
        assert_eq!(filled[[0, 1]], 2.0);
        assert_eq!(report.left_at_mean, 1);
    }

    #[test]
    fn inplace_fills_only_missing_cells() {
        let mut data = array![
            [Some(1.0), Some(2.0)],
            [Some(1.1), None],
            [Some(5.0), Some(6.0)]
        ];
        impute_knn_inplace(&mut data, &rows_config(1, 0.5)).unwrap();
        assert_eq!(data[[0, 0]], Some(1.0));
        assert_eq!(data[[1, 1]], Some(2.0));
        assert_eq!(data[[2, 1]], Some(6.0));
    }

    #[test]
    fn coordinate_missing_everywhere_is_an_error() {
        let data = array![[Some(1.0), None], [Some(2.0), None]];
        assert!(matches!(
            impute_knn(&data, &rows_config(1, 0.5)),
            Err(ImputationError::AllMissingSlice { axis: Some(0), index: 1 })
        ));
    }
}
