//! 基于 polars 的数据集读写与按列取值

use crate::types::{EtlError, EtlResult};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::io::{Cursor, Write};

/// 与 pandas `read_csv` 默认一致的缺失值标记
const NULL_TOKENS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// 0001-01-01 到 1970-01-01 的天数
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// 读取带表头的 CSV；空单元格与常见缺失标记均为 null，按全部行推断列类型
pub fn read_csv(bytes: impl Into<Vec<u8>>) -> EtlResult<DataFrame> {
    let bytes: Vec<u8> = bytes.into();
    let null_values: Vec<PlSmallStr> = NULL_TOKENS.iter().map(|t| PlSmallStr::from(*t)).collect();

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(move |opts| {
            opts.with_null_values(Some(NullValues::AllColumns(null_values.clone())))
        })
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(df)
}

pub fn write_csv<W: Write>(df: &DataFrame, writer: W) -> EtlResult<()> {
    let mut df = df.clone();
    CsvWriter::new(writer).include_header(true).finish(&mut df)?;
    Ok(())
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

pub fn kind(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::String => "text",
        DataType::Date => "date",
        DataType::Boolean => "boolean",
        dt if dt.is_float() || dt.is_integer() => "number",
        _ => "other",
    }
}

/// 列是否可按数值使用：数值类型，或没有任何非空值
pub fn ensure_numeric(df: &DataFrame, name: &str) -> EtlResult<bool> {
    let Ok(column) = df.column(name) else {
        return Ok(false);
    };
    let dtype = column.dtype();
    if dtype.is_float() || dtype.is_integer() || column.null_count() == column.len() {
        Ok(true)
    } else {
        Err(EtlError::ColumnType {
            column: name.to_string(),
            expected: "number",
            found: kind(dtype),
        })
    }
}

/// 全部为空的非数值列转为 Float64；其他情况返回 None
pub fn blank_as_number(df: &DataFrame, name: &str) -> EtlResult<Option<Series>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let dtype = column.dtype();
    if dtype.is_float() || dtype.is_integer() || column.null_count() != column.len() {
        return Ok(None);
    }
    Ok(Some(column.as_materialized_series().cast(&DataType::Float64)?))
}

pub fn numbers(df: &DataFrame, name: &str) -> EtlResult<Option<Vec<Option<f64>>>> {
    if !ensure_numeric(df, name)? {
        return Ok(None);
    }
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(Some(series.f64()?.into_iter().collect()))
}

/// 以文本取值；数值列按其字符串形式（如邮编 42420）
pub fn texts(df: &DataFrame, name: &str) -> EtlResult<Option<Vec<Option<String>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let series = column.as_materialized_series().cast(&DataType::String)?;
    Ok(Some(
        series.str()?.into_iter().map(|v| v.map(str::to_string)).collect(),
    ))
}

pub fn dates(df: &DataFrame, name: &str) -> EtlResult<Option<Vec<Option<NaiveDate>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    if column.dtype() != &DataType::Date {
        return Err(EtlError::ColumnType {
            column: name.to_string(),
            expected: "date",
            found: kind(column.dtype()),
        });
    }
    let days = column.as_materialized_series().cast(&DataType::Int32)?;
    Ok(Some(
        days.i32()?.into_iter().map(|d| d.and_then(date_from_epoch_days)).collect(),
    ))
}

/// 由日期值构造 polars Date 列
pub fn date_series(name: &str, values: &[Option<NaiveDate>]) -> EtlResult<Series> {
    let days: Vec<Option<i32>> = values
        .iter()
        .map(|d| d.map(|d| d.num_days_from_ce() - EPOCH_DAYS_FROM_CE))
        .collect();
    Ok(Series::new(name.into(), days).cast(&DataType::Date)?)
}

fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    days.checked_add(EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
}
