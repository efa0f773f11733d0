// src/substitute.rs
//! Slice-statistic substitution and the simple imputers built on it.
//!
//! A slice is either the whole array (`dim = None`) or one 1-D lane running along
//! `dim = Some(Axis(k))`. For a matrix, `Axis(0)` lanes are columns and `Axis(1)` lanes are rows.

use crate::element::Element;
use crate::error::{ImputationError, Result};
use crate::mask::{into_complete, observed_values};
use crate::stats;
use log::{debug, trace};
use ndarray::{Array, Array2, ArrayBase, ArrayViewMut1, Axis, Data, Dimension};

/// Computes `statistic` over the observed values of every slice and writes the result into
/// that slice's missing cells, in place.
///
/// Slices without missing cells are left alone and the statistic is not evaluated for them.
///
/// # Errors
/// - `InvalidDimension` if `dim` is not an axis of `data`.
/// - `AllMissingSlice` if a slice with missing cells has no observed values.
/// - `StatisticTypeMismatch` if the statistic cannot be stored as `T`.
pub fn substitute_inplace<'a, T, D, F>(
    data: &'a mut Array<Option<T>, D>,
    statistic: F,
    dim: Option<Axis>,
) -> Result<&'a mut Array<Option<T>, D>>
where
    T: Element,
    D: Dimension,
    F: Fn(&[T]) -> f64,
{
    match dim {
        None => {
            let observed = observed_values(data.iter());
            if observed.len() < data.len() {
                if observed.is_empty() {
                    return Err(ImputationError::AllMissingSlice { axis: None, index: 0 });
                }
                let value = to_element::<T>(statistic(&observed))?;
                data.iter_mut()
                    .filter(|cell| cell.is_none())
                    .for_each(|cell| *cell = Some(value));
            }
        }
        Some(axis) => {
            check_axis(axis, data.ndim())?;
            for (index, lane) in data.lanes_mut(axis).into_iter().enumerate() {
                fill_lane(lane, &statistic, axis, index)?;
            }
        }
    }
    Ok(data)
}

/// Non-mutating form of [`substitute_inplace`]: works on a copy and returns the completed array.
pub fn substitute<S, T, D, F>(
    data: &ArrayBase<S, D>,
    statistic: F,
    dim: Option<Axis>,
) -> Result<Array<T, D>>
where
    S: Data<Elem = Option<T>>,
    T: Element,
    D: Dimension,
    F: Fn(&[T]) -> f64,
{
    let mut working = data.to_owned();
    substitute_inplace(&mut working, statistic, dim)?;
    into_complete(working)
}

fn fill_lane<T, F>(mut lane: ArrayViewMut1<'_, Option<T>>, statistic: &F, axis: Axis, index: usize) -> Result<()>
where
    T: Element,
    F: Fn(&[T]) -> f64,
{
    let observed = observed_values(lane.iter());
    if observed.len() == lane.len() {
        return Ok(());
    }
    if observed.is_empty() {
        return Err(ImputationError::AllMissingSlice {
            axis: Some(axis.index()),
            index,
        });
    }
    let value = to_element::<T>(statistic(&observed))?;
    trace!("Slice {} along axis {}: substituting {:?}.", index, axis.index(), value);
    lane.iter_mut()
        .filter(|cell| cell.is_none())
        .for_each(|cell| *cell = Some(value));
    Ok(())
}

pub(crate) fn check_axis(axis: Axis, ndim: usize) -> Result<()> {
    if axis.index() >= ndim {
        return Err(ImputationError::InvalidDimension {
            requested: axis.index(),
            ndim,
        });
    }
    Ok(())
}

fn to_element<T: Element>(value: f64) -> Result<T> {
    T::from_statistic(value).ok_or(ImputationError::StatisticTypeMismatch {
        value,
        element: T::TYPE_NAME,
    })
}

fn slice_min<T: Element>(values: &[T]) -> T {
    values
        .iter()
        .copied()
        .fold(values[0], |acc, v| if v < acc { v } else { acc })
}

/// Replaces missing cells with zero.
pub fn impute_zero_inplace<T, D>(data: &mut Array<Option<T>, D>, dim: Option<Axis>) -> Result<&mut Array<Option<T>, D>>
where
    T: Element,
    D: Dimension,
{
    substitute_inplace(data, |_| T::zero().to_f64(), dim)
}

/// Replaces missing cells with zero, returning a completed copy.
pub fn impute_zero<S, T, D>(data: &ArrayBase<S, D>, dim: Option<Axis>) -> Result<Array<T, D>>
where
    S: Data<Elem = Option<T>>,
    T: Element,
    D: Dimension,
{
    substitute(data, |_| T::zero().to_f64(), dim)
}

/// Replaces missing cells with the minimum observed value of their slice.
pub fn impute_min_inplace<T, D>(data: &mut Array<Option<T>, D>, dim: Option<Axis>) -> Result<&mut Array<Option<T>, D>>
where
    T: Element,
    D: Dimension,
{
    substitute_inplace(data, |values| slice_min(values).to_f64(), dim)
}

/// Replaces missing cells with the minimum observed value of their slice, returning a copy.
pub fn impute_min<S, T, D>(data: &ArrayBase<S, D>, dim: Option<Axis>) -> Result<Array<T, D>>
where
    S: Data<Elem = Option<T>>,
    T: Element,
    D: Dimension,
{
    substitute(data, |values| slice_min(values).to_f64(), dim)
}

/// Replaces missing cells with half the slice minimum (floor division for integer types).
pub fn impute_half_min_inplace<T, D>(data: &mut Array<Option<T>, D>, dim: Option<Axis>) -> Result<&mut Array<Option<T>, D>>
where
    T: Element,
    D: Dimension,
{
    substitute_inplace(data, |values| slice_min(values).halve().to_f64(), dim)
}

/// Replaces missing cells with half the slice minimum, returning a copy.
pub fn impute_half_min<S, T, D>(data: &ArrayBase<S, D>, dim: Option<Axis>) -> Result<Array<T, D>>
where
    S: Data<Elem = Option<T>>,
    T: Element,
    D: Dimension,
{
    substitute(data, |values| slice_min(values).halve().to_f64(), dim)
}

/// Recodes every column into three categories, in place.
///
/// Observed values below the column median become `1`, the rest `2`, and missing cells `0`.
/// A column with no observed values becomes all `0`; its median is never computed.
pub fn impute_median_cat_inplace<T: Element>(data: &mut Array2<Option<T>>) -> Result<&mut Array2<Option<T>>> {
    let missing_code = to_element::<T>(0.0)?;
    let below_code = to_element::<T>(1.0)?;
    let above_code = to_element::<T>(2.0)?;

    for (column_index, mut column) in data.columns_mut().into_iter().enumerate() {
        let observed: Vec<f64> = column.iter().filter_map(|cell| cell.map(Element::to_f64)).collect();
        let median = match stats::median(&observed) {
            Some(median) => median,
            None => {
                debug!("Column {} has no observed values; coding it as all-missing.", column_index);
                column.fill(Some(missing_code));
                continue;
            }
        };
        for cell in column.iter_mut() {
            let code = match *cell {
                None => missing_code,
                Some(value) if value.to_f64() < median => below_code,
                Some(_) => above_code,
            };
            *cell = Some(code);
        }
    }
    Ok(data)
}

/// Non-mutating form of [`impute_median_cat_inplace`].
pub fn impute_median_cat<S, T>(data: &ArrayBase<S, ndarray::Ix2>) -> Result<Array2<T>>
where
    S: Data<Elem = Option<T>>,
    T: Element,
{
    let mut working = data.to_owned();
    impute_median_cat_inplace(&mut working)?;
    into_complete(working)
}
