//! 特征派生模块：日历字段、配送时长、利润与利润率

use crate::frame;
use crate::types::{EtlError, EtlResult};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

/// 缺少实测利润时假定的利润率（近似值，并非实测）
pub const ASSUMED_MARGIN: f64 = 0.2;

pub const DEFAULT_QUANTITY: f64 = 1.0;
pub const DEFAULT_DISCOUNT: f64 = 0.0;

/// 一个日期的日历属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub quarter: u32,
    /// 周一 = 0 .. 周日 = 6
    pub day_of_week: u32,
    pub is_weekend: bool,
}

impl CalendarParts {
    pub fn of(date: NaiveDate) -> Self {
        let day_of_week = date.weekday().num_days_from_monday();
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            quarter: (date.month() - 1) / 3 + 1,
            day_of_week,
            is_weekend: day_of_week >= 5,
        }
    }
}

/// 利润率：sales > 0 时为 profit / sales，否则为 0
pub fn profit_margin(sales: f64, profit: f64) -> f64 {
    if sales > 0.0 {
        profit / sales
    } else {
        0.0
    }
}

/// 特征派生器。只增加列，从不删除行。
#[derive(Debug, Default, Clone)]
pub struct FeatureEnricher;

impl FeatureEnricher {
    pub fn new() -> Self {
        Self
    }

    pub fn enrich(&self, clean: &DataFrame) -> EtlResult<DataFrame> {
        tracing::info!("Starting data transformation process");

        let has_order = date_column(clean, "Order Date")?;
        let has_ship = date_column(clean, "Ship Date")?;
        let has_sales = frame::ensure_numeric(clean, "Sales")?;
        let has_profit = frame::ensure_numeric(clean, "Profit")?;
        let has_quantity = frame::ensure_numeric(clean, "Quantity")?;
        let has_discount = frame::ensure_numeric(clean, "Discount")?;

        let mut derived: Vec<Expr> = Vec::new();
        if has_order {
            let order = || col("Order Date").dt();
            derived.push(order().year().cast(DataType::Int32).alias("Order Year"));
            derived.push(order().month().cast(DataType::Int32).alias("Order Month"));
            derived.push(order().day().cast(DataType::Int32).alias("Order Day"));
            derived.push(order().quarter().cast(DataType::Int32).alias("Order Quarter"));
            // weekday() 为 ISO 编号：周一 1 .. 周日 7
            derived.push(
                (order().weekday().cast(DataType::Int32) - lit(1)).alias("Order Day of Week"),
            );
            derived.push(
                order()
                    .weekday()
                    .cast(DataType::Int32)
                    .gt_eq(lit(6))
                    .cast(DataType::Int32)
                    .alias("Order Is Weekend"),
            );
        }
        if has_ship {
            let ship = || col("Ship Date").dt();
            derived.push(ship().year().cast(DataType::Int32).alias("Ship Year"));
            derived.push(ship().month().cast(DataType::Int32).alias("Ship Month"));
            derived.push(ship().day().cast(DataType::Int32).alias("Ship Day"));
        }
        if has_order && has_ship {
            // Date 的物理值是 epoch 以来的天数
            derived.push(
                (col("Ship Date").cast(DataType::Int32) - col("Order Date").cast(DataType::Int32))
                    .cast(DataType::Int64)
                    .alias("Shipping Duration"),
            );
        }

        if has_sales {
            let sales = col("Sales").cast(DataType::Float64);
            let estimate = sales.clone() * lit(ASSUMED_MARGIN);
            let profit = if has_profit {
                col("Profit").cast(DataType::Float64).fill_null(estimate)
            } else {
                estimate
            };
            derived.push(sales.alias("Sales"));
            derived.push(profit.alias("Profit"));
        }
        derived.push(filled(has_quantity, "Quantity", DEFAULT_QUANTITY));
        derived.push(filled(has_discount, "Discount", DEFAULT_DISCOUNT));

        let mut lazy = clean.clone().lazy().with_columns(derived);
        if has_sales {
            lazy = lazy.with_columns([when(col("Sales").gt(lit(0.0)))
                .then(col("Profit") / col("Sales"))
                .otherwise(lit(0.0))
                .alias("Profit Margin")]);
        }
        let df = lazy.collect()?;

        if let Some(durations) = frame::numbers(&df, "Shipping Duration")? {
            let negative = durations.iter().flatten().filter(|d| **d < 0.0).count();
            if negative > 0 {
                tracing::warn!("{} rows ship before they are ordered", negative);
            }
        }

        tracing::info!("Data transformation completed successfully");
        Ok(df)
    }
}

/// 日期列存在时必须已解析为日期
fn date_column(df: &DataFrame, name: &str) -> EtlResult<bool> {
    match df.column(name) {
        Err(_) => Ok(false),
        Ok(column) if column.dtype() == &DataType::Date => Ok(true),
        Ok(column) => Err(EtlError::ColumnType {
            column: name.to_string(),
            expected: "date",
            found: frame::kind(column.dtype()),
        }),
    }
}

/// 列不存在时整列取默认值；存在时仅补齐缺失单元格
fn filled(present: bool, name: &str, default: f64) -> Expr {
    if present {
        col(name).cast(DataType::Float64).fill_null(lit(default)).alias(name)
    } else {
        lit(default).alias(name)
    }
}
