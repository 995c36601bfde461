//! 数据清洗模块

use crate::frame::{self, has_column};
use crate::types::{EtlError, EtlResult};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;

/// 缺失即丢弃整行的关键列
pub const CRITICAL_COLUMNS: [&str; 4] = ["Order ID", "Product ID", "Customer ID", "Sales"];

/// 日期列
pub const DATE_COLUMNS: [&str; 2] = ["Order Date", "Ship Date"];

/// 缺失值由后续逐行派生规则补齐的列，清洗时不做通用填充
const DEFERRED_COLUMNS: [&str; 4] = ["Profit", "Quantity", "Discount", "Row ID"];

/// 按数值使用的列；整列为空时按数值列对待
const NUMERIC_COLUMNS: [&str; 5] = ["Sales", "Profit", "Quantity", "Discount", "Row ID"];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// 清洗统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleaningStats {
    pub input_rows: usize,
    pub missing_values: usize,
    pub dropped_missing_critical: usize,
    pub dropped_duplicates: usize,
    pub unparseable_dates: usize,
    pub output_rows: usize,
}

/// 数据清洗器
#[derive(Debug, Default, Clone)]
pub struct Cleaner;

impl Cleaner {
    pub fn new() -> Self {
        Self
    }

    /// 清洗：关键列缺失的行丢弃、非关键列补默认值、去重、解析日期
    pub fn clean(&self, raw: &DataFrame) -> EtlResult<(DataFrame, CleaningStats)> {
        tracing::info!("Starting data cleaning process");

        let critical: Vec<&str> = CRITICAL_COLUMNS
            .iter()
            .copied()
            .filter(|c| has_column(raw, c))
            .collect();
        if critical.is_empty() {
            return Err(EtlError::NoCriticalColumns);
        }

        let mut stats = CleaningStats {
            input_rows: raw.height(),
            missing_values: raw.get_columns().iter().map(|c| c.null_count()).sum(),
            ..Default::default()
        };
        tracing::info!("Found {} missing values", stats.missing_values);

        let mut df = raw.clone();
        for name in NUMERIC_COLUMNS {
            if let Some(series) = frame::blank_as_number(&df, name)? {
                df.with_column(series)?;
            }
        }

        let complete = critical
            .iter()
            .fold(lit(true), |acc, name| acc.and(col(*name).is_not_null()));
        let df = df.lazy().filter(complete).collect()?;
        stats.dropped_missing_critical = stats.input_rows - df.height();
        if stats.dropped_missing_critical > 0 {
            tracing::warn!(
                "Dropped {} rows missing critical values",
                stats.dropped_missing_critical
            );
        }

        let before_dedup = df.height();
        let fills = default_fills(&df);
        let mut lazy = df.lazy();
        if !fills.is_empty() {
            lazy = lazy.with_columns(fills);
        }
        let mut df = lazy.unique_stable(None, UniqueKeepStrategy::First).collect()?;
        stats.dropped_duplicates = before_dedup - df.height();
        tracing::info!("Found {} duplicate records", stats.dropped_duplicates);

        for name in DATE_COLUMNS {
            let Some(values) = frame::texts(&df, name)? else {
                continue;
            };
            let parsed: Vec<Option<NaiveDate>> = values
                .iter()
                .map(|v| v.as_deref().and_then(parse_date))
                .collect();
            stats.unparseable_dates += values
                .iter()
                .zip(parsed.iter())
                .filter(|(raw, date)| raw.is_some() && date.is_none())
                .count();
            df.with_column(frame::date_series(name, &parsed)?)?;
        }
        if stats.unparseable_dates > 0 {
            tracing::warn!("{} date values could not be parsed", stats.unparseable_dates);
        }

        stats.output_rows = df.height();
        tracing::info!(
            "Data cleaning completed. Records: {} -> {}",
            stats.input_rows,
            stats.output_rows
        );

        Ok((df, stats))
    }
}

/// 非关键数值列补 0，非关键文本列补 "Unknown"
fn default_fills(df: &DataFrame) -> Vec<Expr> {
    df.get_columns()
        .iter()
        .filter_map(|column| {
            let name = column.name().as_str();
            if CRITICAL_COLUMNS.contains(&name)
                || DEFERRED_COLUMNS.contains(&name)
                || DATE_COLUMNS.contains(&name)
            {
                return None;
            }
            match column.dtype() {
                dt if dt.is_float() => Some(col(name).fill_null(lit(0.0))),
                dt if dt.is_integer() => Some(col(name).fill_null(lit(0))),
                DataType::String => Some(col(name).fill_null(lit("Unknown"))),
                _ => None,
            }
        })
        .collect()
}

/// 解析日期；无法识别时返回 None（缺失日期标记）
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
}
