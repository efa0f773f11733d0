// src/orientation.rs

use ndarray::{ArrayView2, ArrayViewMut2, Axis};
use serde::{Deserialize, Serialize};

/// Which matrix axis enumerates the units an imputer treats independently: samples for
/// QRILC and MinProb, observations (points) for nearest-neighbour search.
///
/// There is deliberately no default; every call states its orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleAxis {
    /// Each row is one sample; columns are features.
    Rows,
    /// Each column is one sample; rows are features.
    Columns,
}

impl SampleAxis {
    /// View of `data` with samples as rows and features as columns.
    pub fn samples_as_rows<'a, T>(self, data: ArrayView2<'a, T>) -> ArrayView2<'a, T> {
        match self {
            SampleAxis::Rows => data,
            SampleAxis::Columns => data.reversed_axes(),
        }
    }

    /// Mutable form of [`SampleAxis::samples_as_rows`].
    pub fn samples_as_rows_mut<'a, T>(self, data: ArrayViewMut2<'a, T>) -> ArrayViewMut2<'a, T> {
        match self {
            SampleAxis::Rows => data,
            SampleAxis::Columns => data.reversed_axes(),
        }
    }

    /// The ndarray axis whose index selects a sample.
    pub fn axis(self) -> Axis {
        match self {
            SampleAxis::Rows => Axis(0),
            SampleAxis::Columns => Axis(1),
        }
    }

    /// The axis a single sample runs along, as reported in `AllMissingSlice`.
    pub fn lane_axis(self) -> Axis {
        match self {
            SampleAxis::Rows => Axis(1),
            SampleAxis::Columns => Axis(0),
        }
    }
}
