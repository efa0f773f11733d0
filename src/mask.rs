// src/mask.rs
//! Missing-value masks. Always derived from the data on demand; the matrix is the only
//! source of truth for which cells are missing.

use ndarray::{Array, ArrayBase, Data, Dimension};

/// Boolean array with the same shape as `data`, `true` where the cell is missing.
pub fn missing_mask<S, T, D>(data: &ArrayBase<S, D>) -> Array<bool, D>
where
    S: Data<Elem = Option<T>>,
    D: Dimension,
{
    data.map(|cell| cell.is_none())
}

/// Number of missing cells in `data`.
pub fn count_missing<S, T, D>(data: &ArrayBase<S, D>) -> usize
where
    S: Data<Elem = Option<T>>,
    D: Dimension,
{
    data.iter().filter(|cell| cell.is_none()).count()
}

/// `true` if at least one cell of `data` is missing.
pub fn has_missing<S, T, D>(data: &ArrayBase<S, D>) -> bool
where
    S: Data<Elem = Option<T>>,
    D: Dimension,
{
    data.iter().any(|cell| cell.is_none())
}

/// The observed values of `cells`, in iteration order.
pub fn observed_values<'a, T, I>(cells: I) -> Vec<T>
where
    T: Copy + 'a,
    I: IntoIterator<Item = &'a Option<T>>,
{
    cells.into_iter().filter_map(|cell| *cell).collect()
}

/// Converts a matrix in which every cell is observed into its plain numeric form.
///
/// Fails with `Incomplete` if any cell is still missing; imputers use this as the final
/// step of their non-mutating entry points.
pub fn into_complete<T, D>(filled: Array<Option<T>, D>) -> crate::Result<Array<T, D>>
where
    T: Copy,
    D: Dimension,
{
    let remaining = count_missing(&filled);
    if remaining > 0 {
        return Err(crate::ImputationError::Incomplete { remaining });
    }
    let shape = filled.raw_dim();
    let values: Vec<T> = filled.iter().filter_map(|cell| *cell).collect();
    Ok(Array::from_shape_vec(shape, values)?)
}
