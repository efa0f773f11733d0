// src/svd.rs
//! Iterative low-rank SVD imputation.
//!
//! Missing cells start at a median fill. Each iteration takes a rank-`k` reconstruction of
//! the working matrix and copies it into the missing cells only, so observed cells are never
//! touched. When no fixed rank is given the rank grows by one per iteration, which fits the
//! dominant structure first.

use crate::error::{ImputationError, Result};
use crate::linalg_backends::{BackendSVD, LinAlgBackendProvider};
use crate::mask::into_complete;
use crate::stats;
use crate::substitute::{check_axis, substitute_inplace};
use log::{debug, info, warn};
use ndarray::{s, Array2, ArrayBase, Axis, Data, Ix2};
use serde::{Deserialize, Serialize};

/// Parameters for [`impute_svd`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvdConfig {
    /// Fixed reconstruction rank. `None` grows the rank by one per iteration, up to
    /// `min(n_rows, n_cols) - 1`.
    pub rank: Option<usize>,
    /// Stop once the relative change at the missing cells falls below this.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Optional `(low, high)` clamp applied to every reconstruction.
    pub limits: Option<(f64, f64)>,
    /// Axis index for the initial median fill; `None` uses the median of the whole matrix.
    pub fill_dim: Option<usize>,
}

impl Default for SvdConfig {
    fn default() -> Self {
        Self {
            rank: None,
            tolerance: 1e-10,
            max_iterations: 100,
            limits: None,
            fill_dim: None,
        }
    }
}

impl SvdConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rank == Some(0) {
            return Err(ImputationError::invalid_argument("rank", "must be at least 1"));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(ImputationError::invalid_argument(
                "tolerance",
                format!("must be positive and finite, got {}", self.tolerance),
            ));
        }
        if self.max_iterations == 0 {
            return Err(ImputationError::invalid_argument("max_iterations", "must be at least 1"));
        }
        if let Some((low, high)) = self.limits {
            if !(low <= high) {
                return Err(ImputationError::invalid_argument(
                    "limits",
                    format!("lower bound {} must not exceed upper bound {}", low, high),
                ));
            }
        }
        if let Some(dim) = self.fill_dim {
            check_axis(Axis(dim), 2)?;
        }
        Ok(())
    }

    /// Reconstruction rank at 1-based iteration `iteration` for an `n_rows x n_cols` matrix.
    fn rank_at(&self, iteration: usize, n_rows: usize, n_cols: usize) -> usize {
        match self.rank {
            Some(rank) => rank.min(n_rows.min(n_cols)),
            None => iteration
                .min(n_rows.saturating_sub(1))
                .min(n_cols.saturating_sub(1))
                .max(1),
        }
    }
}

/// Per-iteration diagnostics of one SVD imputation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SvdReport {
    pub iterations: usize,
    pub converged: bool,
    pub rank_history: Vec<usize>,
    /// `Σ(old - new)² / Σ old²` over the missing cells; `NaN` where the denominator was zero.
    pub convergence_history: Vec<f64>,
    /// Mean absolute reconstruction error over the observed cells.
    pub observed_mae_history: Vec<f64>,
}

/// Imputes missing cells by iterative low-rank reconstruction, returning a completed copy.
///
/// # Errors
/// - `InvalidArgument` / `InvalidDimension` for an invalid config.
/// - `AllMissingSlice` if the initial median fill has no observed values in some slice.
/// - `Linalg` if the SVD fails (e.g. the matrix contains `NaN`).
pub fn impute_svd<S>(data: &ArrayBase<S, Ix2>, config: &SvdConfig) -> Result<Array2<f64>>
where
    S: Data<Elem = Option<f64>>,
{
    impute_svd_with_report(data, config).map(|(filled, _)| filled)
}

/// In-place form of [`impute_svd`].
pub fn impute_svd_inplace<'a>(data: &'a mut Array2<Option<f64>>, config: &SvdConfig) -> Result<&'a mut Array2<Option<f64>>> {
    let (filled, _) = impute_svd_with_report(data, config)?;
    data.zip_mut_with(&filled, |cell, &value| {
        if cell.is_none() {
            *cell = Some(value);
        }
    });
    Ok(data)
}

/// As [`impute_svd`], also returning the per-iteration diagnostics.
pub fn impute_svd_with_report<S>(data: &ArrayBase<S, Ix2>, config: &SvdConfig) -> Result<(Array2<f64>, SvdReport)>
where
    S: Data<Elem = Option<f64>>,
{
    config.validate()?;
    let (n_rows, n_cols) = data.dim();
    let missing: Vec<(usize, usize)> = data
        .indexed_iter()
        .filter(|(_, cell)| cell.is_none())
        .map(|(idx, _)| idx)
        .collect();
    info!(
        "SVD imputation of a {}x{} matrix with {} missing cells (rank: {:?}, tolerance: {:e}, max iterations: {}).",
        n_rows, n_cols, missing.len(), config.rank, config.tolerance, config.max_iterations
    );

    let mut working = data.to_owned();
    if missing.is_empty() {
        return Ok((
            into_complete(working)?,
            SvdReport {
                converged: true,
                ..SvdReport::default()
            },
        ));
    }
    substitute_inplace(
        &mut working,
        |values| stats::median(values).unwrap_or(f64::NAN),
        config.fill_dim.map(Axis),
    )?;
    let mut working = into_complete(working)?;

    let observed_count = n_rows * n_cols - missing.len();
    let backend = LinAlgBackendProvider::<f64>::new();
    let mut report = SvdReport::default();

    for iteration in 1..=config.max_iterations {
        let rank = config.rank_at(iteration, n_rows, n_cols);
        let mut reconstruction = low_rank_reconstruction(&backend, &working, rank)?;
        if let Some((low, high)) = config.limits {
            reconstruction.mapv_inplace(|v| v.clamp(low, high));
        }

        let mut change = 0.0;
        let mut previous_norm = 0.0;
        for &(i, j) in &missing {
            let old = working[[i, j]];
            let new = reconstruction[[i, j]];
            change += (old - new) * (old - new);
            previous_norm += old * old;
        }
        let convergence = if previous_norm == 0.0 { f64::NAN } else { change / previous_norm };

        let observed_mae = if observed_count == 0 {
            f64::NAN
        } else {
            data.iter()
                .zip(reconstruction.iter())
                .filter_map(|(cell, &new)| cell.map(|old| (old - new).abs()))
                .sum::<f64>()
                / observed_count as f64
        };

        for &(i, j) in &missing {
            working[[i, j]] = reconstruction[[i, j]];
        }

        debug!(
            "SVD iteration {}: rank {}, convergence {:e}, observed MAE {:e}.",
            iteration, rank, convergence, observed_mae
        );
        report.iterations = iteration;
        report.rank_history.push(rank);
        report.convergence_history.push(convergence);
        report.observed_mae_history.push(observed_mae);

        if convergence.is_finite() && convergence < config.tolerance {
            report.converged = true;
            break;
        }
    }

    if report.converged {
        info!("SVD imputation converged after {} iteration(s).", report.iterations);
    } else {
        warn!(
            "SVD imputation stopped after {} iteration(s) without reaching tolerance {:e}.",
            report.iterations, config.tolerance
        );
    }
    Ok((working, report))
}

/// `U[:, :k] · diag(s[:k]) · Vᵗ[:k, :]` of `matrix`.
fn low_rank_reconstruction(backend: &LinAlgBackendProvider<f64>, matrix: &Array2<f64>, rank: usize) -> Result<Array2<f64>> {
    let svd = backend.svd_into(matrix.clone(), true, true)?;
    let (u, vt) = match (svd.u, svd.vt) {
        (Some(u), Some(vt)) => (u, vt),
        _ => {
            return Err(ImputationError::InvariantViolation(
                "SVD backend did not return singular vectors".to_string(),
            ))
        }
    };
    let k = rank.min(svd.s.len());
    let scaled_u = &u.slice(s![.., ..k]) * &svd.s.slice(s![..k]);
    Ok(scaled_u.dot(&vt.slice(s![..k, ..])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn config() -> SvdConfig {
        SvdConfig::default()
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let data = array![[Some(1.0), None], [Some(2.0), Some(3.0)]];
        let cases = [
            SvdConfig { rank: Some(0), ..config() },
            SvdConfig { tolerance: 0.0, ..config() },
            SvdConfig { max_iterations: 0, ..config() },
            SvdConfig { limits: Some((2.0, 1.0)), ..config() },
        ];
        for bad in cases {
            assert!(
                matches!(impute_svd(&data, &bad), Err(ImputationError::InvalidArgument { .. })),
                "config {:?} should be rejected",
                bad
            );
        }
        assert!(matches!(
            impute_svd(&data, &SvdConfig { fill_dim: Some(2), ..config() }),
            Err(ImputationError::InvalidDimension { requested: 2, ndim: 2 })
        ));
    }

    #[test]
    fn growing_rank_schedule_is_capped_below_the_smaller_dimension() {
        let growing = config();
        let ranks: Vec<usize> = (1..=5).map(|t| growing.rank_at(t, 4, 3)).collect();
        assert_eq!(ranks, vec![1, 2, 2, 2, 2]);
        assert_eq!(growing.rank_at(3, 1, 8), 1);
        let fixed = SvdConfig { rank: Some(10), ..config() };
        assert_eq!(fixed.rank_at(1, 4, 3), 3);
    }

    #[test]
    fn complete_matrix_is_returned_unchanged() {
        let data = array![[Some(1.0), Some(2.0)], [Some(3.0), Some(4.0)]];
        let (filled, report) = impute_svd_with_report(&data, &config()).unwrap();
        assert_eq!(filled, array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(report.iterations, 0);
        assert!(report.converged);
    }

    #[test]
    fn rank_one_matrix_is_recovered() {
        // Outer product of (1, 2, 3, 4) and (1, 2, 3).
        let mut data = Array2::from_shape_fn((4, 3), |(i, j)| Some(((i + 1) * (j + 1)) as f64));
        data[[2, 1]] = None;
        let fixed = SvdConfig {
            rank: Some(1),
            tolerance: 1e-20,
            max_iterations: 2000,
            ..config()
        };
        let (filled, report) = impute_svd_with_report(&data, &fixed).unwrap();
        assert_abs_diff_eq!(filled[[2, 1]], 6.0, epsilon = 1e-6);
        assert!(report.rank_history.iter().all(|&r| r == 1));
        for ((i, j), cell) in data.indexed_iter() {
            if let Some(v) = cell {
                assert_eq!(filled[[i, j]], *v);
            }
        }
    }

    #[test]
    fn limits_clamp_imputed_values() {
        let data = array![
            [Some(1.0), Some(2.0), Some(3.0)],
            [Some(2.0), Some(4.0), None],
            [Some(3.0), None, Some(9.0)]
        ];
        let clamped = SvdConfig {
            limits: Some((0.0, 2.5)),
            max_iterations: 20,
            ..config()
        };
        let filled = impute_svd(&data, &clamped).unwrap();
        assert!(filled[[1, 2]] >= 0.0 && filled[[1, 2]] <= 2.5);
        assert!(filled[[2, 1]] >= 0.0 && filled[[2, 1]] <= 2.5);
        assert_eq!(filled[[2, 2]], 9.0);
    }

    #[test]
    fn zero_starting_fill_leaves_convergence_undetermined() {
        let data = array![[Some(0.0), None], [Some(0.0), Some(0.0)]];
        let one_step = SvdConfig { max_iterations: 1, ..config() };
        let (filled, report) = impute_svd_with_report(&data, &one_step).unwrap();
        assert!(report.convergence_history[0].is_nan());
        assert!(!report.converged);
        assert_eq!(filled[[0, 1]], 0.0);
    }

    #[test]
    fn inplace_fills_missing_cells() {
        let mut data = array![[Some(1.0), Some(2.0)], [Some(2.0), None], [Some(3.0), Some(6.0)]];
        impute_svd_inplace(&mut data, &SvdConfig { max_iterations: 50, ..config() }).unwrap();
        assert!(data.iter().all(|cell| cell.is_some()));
        assert_eq!(data[[2, 1]], Some(6.0));
    }
}
