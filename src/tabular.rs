// src/tabular.rs
//! Column-range imputation on tables that mix numeric and text columns.
//!
//! The numeric imputers never see a table. A container opts in by implementing [`Tabular`];
//! containers that cannot provide a capability get `CapabilityUnavailable` from the default
//! methods. [`Table`] is the in-memory adapter shipped with the crate.

use crate::error::{ImputationError, Result};
use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A container from which a contiguous range of numeric columns can be taken out, transformed
/// as a matrix, and put back.
pub trait Tabular: Sized {
    fn n_columns(&self) -> usize;

    /// Columns `columns` as an `n_rows x columns.len()` matrix.
    fn numeric_block(&self, columns: Range<usize>) -> Result<Array2<Option<f64>>> {
        let _ = columns;
        Err(ImputationError::CapabilityUnavailable {
            capability: "numeric_block",
        })
    }

    /// A new container with columns `columns` replaced by `block`; all other columns are
    /// carried over untouched and in order.
    fn with_numeric_block(&self, columns: Range<usize>, block: Array2<f64>) -> Result<Self> {
        let _ = (columns, block);
        Err(ImputationError::CapabilityUnavailable {
            capability: "with_numeric_block",
        })
    }
}

/// Runs a non-mutating imputer over columns `columns` of `table`.
///
/// ```
/// use omics_impute::{impute_columns, impute_zero, Column, Table};
///
/// let table = Table::new(vec![
///     Column::text("id", vec![Some("a".into()), Some("b".into())]),
///     Column::numeric("x", vec![Some(1.0), None]),
/// ])
/// .unwrap();
/// let imputed = impute_columns(&table, 1..2, |block| impute_zero(block, None)).unwrap();
/// assert_eq!(imputed.column(1).unwrap().numeric_values(), Some(&[Some(1.0), Some(0.0)][..]));
/// ```
pub fn impute_columns<T, F>(table: &T, columns: Range<usize>, imputer: F) -> Result<T>
where
    T: Tabular,
    F: FnOnce(&Array2<Option<f64>>) -> Result<Array2<f64>>,
{
    let block = table.numeric_block(columns.clone())?;
    debug!("Imputing columns {:?} ({} x {} block).", columns, block.nrows(), block.ncols());
    let filled = imputer(&block)?;
    table.with_numeric_block(columns, filled)
}

/// Cell values of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(values) => values.len(),
            ColumnValues::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Text(values),
        }
    }

    pub fn numeric_values(&self) -> Option<&[Option<f64>]> {
        match &self.values {
            ColumnValues::Numeric(values) => Some(values),
            ColumnValues::Text(_) => None,
        }
    }
}

/// An in-memory table of equally long named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// # Errors
    /// `InvalidArgument` if the columns differ in length.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map_or(0, |c| c.values.len());
        if let Some(bad) = columns.iter().find(|c| c.values.len() != n_rows) {
            return Err(ImputationError::invalid_argument(
                "columns",
                format!("column `{}` has {} rows, expected {}", bad.name, bad.values.len(), n_rows),
            ));
        }
        Ok(Self { columns, n_rows })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn check_range(&self, columns: &Range<usize>) -> Result<()> {
        if columns.start >= columns.end || columns.end > self.columns.len() {
            return Err(ImputationError::invalid_argument(
                "columns",
                format!("range {:?} is empty or exceeds the {} columns", columns, self.columns.len()),
            ));
        }
        Ok(())
    }
}

impl Tabular for Table {
    fn n_columns(&self) -> usize {
        self.columns.len()
    }

    fn numeric_block(&self, columns: Range<usize>) -> Result<Array2<Option<f64>>> {
        self.check_range(&columns)?;
        let width = columns.len();
        let mut block = Array2::from_elem((self.n_rows, width), None);
        for (j, column) in self.columns[columns].iter().enumerate() {
            let values = column.numeric_values().ok_or_else(|| {
                ImputationError::invalid_argument("columns", format!("column `{}` is not numeric", column.name))
            })?;
            for (i, value) in values.iter().enumerate() {
                block[[i, j]] = *value;
            }
        }
        Ok(block)
    }

    fn with_numeric_block(&self, columns: Range<usize>, block: Array2<f64>) -> Result<Self> {
        self.check_range(&columns)?;
        if block.dim() != (self.n_rows, columns.len()) {
            return Err(ImputationError::invalid_argument(
                "block",
                format!(
                    "shape {:?} does not match {} rows x {} columns",
                    block.dim(),
                    self.n_rows,
                    columns.len()
                ),
            ));
        }
        let mut rebuilt = Vec::with_capacity(self.columns.len());
        rebuilt.extend_from_slice(&self.columns[..columns.start]);
        for (j, original) in self.columns[columns.clone()].iter().enumerate() {
            rebuilt.push(Column::numeric(
                original.name.clone(),
                block.column(j).iter().map(|&v| Some(v)).collect(),
            ));
        }
        rebuilt.extend_from_slice(&self.columns[columns.end..]);
        Ok(Self {
            columns: rebuilt,
            n_rows: self.n_rows,
        })
    }
}
