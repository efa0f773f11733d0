// src/summary.rs

use ndarray::{ArrayBase, Axis, Data, Ix2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Missing-value counts of a matrix, overall and per row and column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingnessSummary {
    pub n_rows: usize,
    pub n_columns: usize,
    pub total_missing: usize,
    pub row_missing: Vec<usize>,
    pub column_missing: Vec<usize>,
}

impl MissingnessSummary {
    pub fn from_matrix<S, T>(data: &ArrayBase<S, Ix2>) -> Self
    where
        S: Data<Elem = Option<T>>,
    {
        let row_missing = missing_per_lane(data, Axis(1));
        let column_missing = missing_per_lane(data, Axis(0));
        Self {
            n_rows: data.nrows(),
            n_columns: data.ncols(),
            total_missing: row_missing.iter().sum(),
            row_missing,
            column_missing,
        }
    }

    /// Missing fraction of the whole matrix; `0.0` for an empty matrix.
    pub fn fraction(&self) -> f64 {
        fraction(self.total_missing, self.n_rows * self.n_columns)
    }

    pub fn row_fractions(&self) -> Vec<f64> {
        self.row_missing.iter().map(|&m| fraction(m, self.n_columns)).collect()
    }

    pub fn column_fractions(&self) -> Vec<f64> {
        self.column_missing.iter().map(|&m| fraction(m, self.n_rows)).collect()
    }

    /// Indices of rows with no observed value.
    pub fn fully_missing_rows(&self) -> Vec<usize> {
        fully_missing(&self.row_missing, self.n_columns)
    }

    /// Indices of columns with no observed value.
    pub fn fully_missing_columns(&self) -> Vec<usize> {
        fully_missing(&self.column_missing, self.n_rows)
    }
}

fn missing_per_lane<S, T>(data: &ArrayBase<S, Ix2>, axis: Axis) -> Vec<usize>
where
    S: Data<Elem = Option<T>>,
{
    data.lanes(axis)
        .into_iter()
        .map(|lane| lane.iter().filter(|cell| cell.is_none()).count())
        .collect()
}

fn fraction(missing: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        missing as f64 / total as f64
    }
}

fn fully_missing(counts: &[usize], length: usize) -> Vec<usize> {
    if length == 0 {
        return Vec::new();
    }
    counts
        .iter()
        .enumerate()
        .filter(|&(_, &m)| m == length)
        .map(|(i, _)| i)
        .collect()
}

impl fmt::Display for MissingnessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} x {} matrix, {} missing ({:.2}%)",
            self.n_rows,
            self.n_columns,
            self.total_missing,
            100.0 * self.fraction()
        )?;
        writeln!(f, "{:>8} {:>10} {:>9}", "column", "missing", "percent")?;
        for (index, (&missing, share)) in self.column_missing.iter().zip(self.column_fractions()).enumerate() {
            writeln!(f, "{:>8} {:>10} {:>8.2}%", index, missing, 100.0 * share)?;
        }
        let rows = self.fully_missing_rows();
        if !rows.is_empty() {
            writeln!(f, "fully missing rows: {:?}", rows)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn counts_per_row_and_column() {
        let data = array![[Some(1), None, None], [Some(4), None, Some(6)]];
        let summary = MissingnessSummary::from_matrix(&data);
        assert_eq!(summary.total_missing, 3);
        assert_eq!(summary.row_missing, vec![2, 1]);
        assert_eq!(summary.column_missing, vec![0, 2, 1]);
        assert_eq!(summary.fully_missing_columns(), vec![1]);
        assert!(summary.fully_missing_rows().is_empty());
        assert_eq!(summary.fraction(), 0.5);
        assert_eq!(summary.column_fractions(), vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn display_lists_every_column() {
        let data = array![[None, None], [Some(1.0), None]];
        let text = MissingnessSummary::from_matrix(&data).to_string();
        assert!(text.starts_with("2 x 2 matrix, 3 missing (75.00%)"), "{}", text);
        assert!(text.contains("100.00%"));
        assert!(text.contains("fully missing rows: [0]"));
    }
}
