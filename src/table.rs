use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;

/// Fails with a schema-contract violation naming the first absent column.
pub fn require_columns<S: AsRef<str>>(df: &DataFrame, table: &str, columns: &[S]) -> Result<()> {
    let present = df.get_column_names();
    for column in columns {
        let column = column.as_ref();
        if !present.contains(&column) {
            return Err(PipelineError::MissingColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

pub fn column<'a>(df: &'a DataFrame, table: &str, name: &str) -> Result<&'a Series> {
    df.column(name).map_err(|_| PipelineError::MissingColumn {
        table: table.to_string(),
        column: name.to_string(),
    })
}

/// Reads a column as opaque string identifiers. Float-typed ids (a numeric
/// column that picked up nulls upstream) are rendered without a fraction.
pub fn id_values(df: &DataFrame, table: &str, name: &str) -> Result<Vec<Option<String>>> {
    let series = column(df, table, name)?;
    let series = match series.dtype() {
        DataType::Float32 | DataType::Float64 => series.cast(&DataType::Int64)?,
        _ => series.clone(),
    };
    let series = series.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|value| value.map(|v| v.to_string()))
        .collect();
    Ok(values)
}

pub fn str_values(df: &DataFrame, table: &str, name: &str) -> Result<Vec<Option<String>>> {
    let series = column(df, table, name)?.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|value| value.map(|v| v.to_string()))
        .collect();
    Ok(values)
}

pub fn i64_values(df: &DataFrame, table: &str, name: &str) -> Result<Vec<Option<i64>>> {
    let series = column(df, table, name)?.cast(&DataType::Int64)?;
    let values = series.i64()?.into_iter().collect();
    Ok(values)
}

pub fn f64_values(df: &DataFrame, table: &str, name: &str) -> Result<Vec<Option<f64>>> {
    let series = column(df, table, name)?.cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}

/// Boolean flags arrive either typed or as `True`/`False` text depending on
/// how the CSV reader inferred them.
pub fn bool_values(df: &DataFrame, table: &str, name: &str) -> Result<Vec<Option<bool>>> {
    let series = column(df, table, name)?;
    let values = match series.dtype() {
        DataType::Boolean => series.bool()?.into_iter().collect(),
        DataType::String => series
            .str()?
            .into_iter()
            .map(|value| value.and_then(parse_flag))
            .collect(),
        _ => series
            .cast(&DataType::Boolean)?
            .bool()?
            .into_iter()
            .collect(),
    };
    Ok(values)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Unwraps a column that must not contain nulls.
pub fn required<T>(values: Vec<Option<T>>, table: &str, name: &str) -> Result<Vec<T>> {
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| PipelineError::NullValue {
                table: table.to_string(),
                column: name.to_string(),
                row,
            })
        })
        .collect()
}

pub fn write_parquet(df: &mut DataFrame, out_parquet: &Path) -> Result<()> {
    if let Some(parent) = out_parquet.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(out_parquet)?;
    ParquetWriter::new(&mut file).finish(df)?;
    Ok(())
}
