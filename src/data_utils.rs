use crate::error::Result;
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use std::cmp::Ordering;

/// Column values as owned strings; numbers are rendered through a cast.
pub fn string_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(column)?.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
        .collect();
    Ok(values)
}

/// Column values as f64; anything that does not cast becomes `None`.
pub fn float_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(column)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

/// Date or Datetime column values as naive datetimes.
pub fn datetime_values(df: &DataFrame, column: &str) -> Result<Vec<Option<NaiveDateTime>>> {
    let series = df
        .column(column)?
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    let values = series
        .datetime()?
        .into_iter()
        .map(|ms| ms.and_then(DateTime::from_timestamp_millis).map(|dt| dt.naive_utc()))
        .collect();
    Ok(values)
}

/// Reorder rows by a comparator over row indices. `sort_by` is stable, so
/// rows the comparator considers equal keep their current relative order.
pub fn reorder_rows<F>(df: &DataFrame, mut compare: F) -> Result<DataFrame>
where
    F: FnMut(usize, usize) -> Ordering,
{
    let mut order: Vec<usize> = (0..df.height()).collect();
    order.sort_by(|a, b| compare(*a, *b));
    let indices: Vec<IdxSize> = order.into_iter().map(|i| i as IdxSize).collect();
    let idx = IdxCa::from_vec("idx", indices);
    Ok(df.take(&idx)?)
}

/// Stable descending order on a numeric column, nulls last.
pub fn sort_descending_by(df: &DataFrame, column: &str) -> Result<DataFrame> {
    let values = float_values(df, column)?;
    reorder_rows(df, |a, b| match (values[a], values[b]) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

/// Drop the listed columns, ignoring names the frame does not have.
pub fn drop_columns(df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
    let keep: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| !columns.contains(name))
        .map(str::to_string)
        .collect();
    Ok(df.select(keep)?)
}

/// Rows whose value in any of `columns` equals `value` after trimming, the
/// same normalization `string_values` applies. Case is significant.
pub fn filter_equals_any(df: &DataFrame, columns: &[&str], value: &str) -> Result<DataFrame> {
    let mut keep = vec![false; df.height()];
    for column in columns {
        for (flag, cell) in keep.iter_mut().zip(string_values(df, column)?) {
            *flag |= cell.as_deref() == Some(value);
        }
    }
    let mask: BooleanChunked = keep.into_iter().collect();
    Ok(df.filter(&mask)?)
}

pub fn filter_equals(df: &DataFrame, column: &str, value: &str) -> Result<DataFrame> {
    filter_equals_any(df, &[column], value)
}

/// Trim every text column; blank cells become null.
pub fn trim_text_columns(df: &DataFrame) -> Result<DataFrame> {
    let mut out = df.clone();
    for series in df.get_columns() {
        if series.dtype() == &DataType::String {
            let name = series.name();
            out.with_column(Series::new(name, string_values(df, name)?))?;
        }
    }
    Ok(out)
}
