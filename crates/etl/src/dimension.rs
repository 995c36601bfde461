//! 星型模型拆分：维度表、事实表与日期代理键解析

use crate::enrichment::CalendarParts;
use crate::frame::{self, has_column};
use crate::types::{EtlError, EtlResult};
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

pub const DIM_CUSTOMER: &str = "dim_customer";
pub const DIM_PRODUCT: &str = "dim_product";
pub const DIM_DATE: &str = "dim_date";
pub const FACT_SALES: &str = "fact_sales";

/// 客户维度
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimCustomer {
    pub customer_id: String,
    pub customer_name: String,
    pub segment: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub region: Option<String>,
}

/// 产品维度
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimProduct {
    pub product_id: String,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub product_name: String,
}

/// 日期维度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimDate {
    pub date_id: i64,
    pub date: NaiveDate,
    pub day: u32,
    pub month: u32,
    pub year: i32,
    pub quarter: u32,
    pub day_of_week: u32,
    /// 0 工作日, 1 周末
    pub is_weekend: u8,
}

impl DimDate {
    pub fn new(date_id: i64, date: NaiveDate) -> Self {
        let parts = CalendarParts::of(date);
        Self {
            date_id,
            date,
            day: parts.day,
            month: parts.month,
            year: parts.year,
            quarter: parts.quarter,
            day_of_week: parts.day_of_week,
            is_weekend: parts.is_weekend as u8,
        }
    }
}

/// 销售事实
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactSale {
    pub row_id: i64,
    pub order_id: String,
    pub customer_id: Option<String>,
    pub product_id: Option<String>,
    pub order_date_id: Option<i64>,
    pub ship_date_id: Option<i64>,
    pub ship_mode: Option<String>,
    pub sales: Option<f64>,
    pub quantity: Option<i64>,
    pub discount: Option<f64>,
    pub profit: Option<f64>,
    pub profit_margin: Option<f64>,
    /// 自然日期，仅用于针对库中代理键重新解析，不落库
    #[serde(skip)]
    pub order_date: Option<NaiveDate>,
    #[serde(skip)]
    pub ship_date: Option<NaiveDate>,
}

/// 日期维度：按日期升序、从 1 开始连续编号
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateDimension {
    rows: Vec<DimDate>,
}

impl DateDimension {
    /// 去重、升序排序后分配代理键
    pub fn from_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let unique: BTreeSet<NaiveDate> = dates.into_iter().collect();
        let rows = unique
            .into_iter()
            .zip(1..)
            .map(|(date, id)| DimDate::new(id, date))
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[DimDate] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.iter().map(|r| r.date)
    }
}

/// 日期 -> 代理键映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateKeyResolver {
    keys: HashMap<NaiveDate, i64>,
}

impl DateKeyResolver {
    pub fn from_dimension(dimension: &DateDimension) -> Self {
        Self::from_pairs(dimension.rows.iter().map(|r| (r.date, r.date_id)))
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (NaiveDate, i64)>) -> Self {
        Self {
            keys: pairs.into_iter().collect(),
        }
    }

    /// 不在维度中的日期解析为 None
    pub fn resolve(&self, date: Option<NaiveDate>) -> Option<i64> {
        date.and_then(|d| self.keys.get(&d).copied())
    }

    pub fn apply(&self, facts: &mut [FactSale]) {
        for fact in facts {
            fact.order_date_id = self.resolve(fact.order_date);
            fact.ship_date_id = self.resolve(fact.ship_date);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// 一次运行拆分出的全部表，None 表示该表未构建
#[derive(Debug, Clone, Default)]
pub struct StarSchema {
    pub customers: Option<Vec<DimCustomer>>,
    pub products: Option<Vec<DimProduct>>,
    pub dates: Option<DateDimension>,
    pub facts: Option<Vec<FactSale>>,
    /// 缺少 row id 而被跳过的事实行数
    pub facts_without_row_id: usize,
}

/// 维度构建器
#[derive(Debug, Default, Clone)]
pub struct DimensionBuilder;

impl DimensionBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, df: &DataFrame) -> EtlResult<StarSchema> {
        tracing::info!("Preparing dimensional data");

        let customers = self.customers(df)?;
        let products = self.products(df)?;
        let dates = self.dates(df)?;
        let (mut facts, facts_without_row_id) = match self.facts(df)? {
            Some((facts, skipped)) => (Some(facts), skipped),
            None => (None, 0),
        };

        if let (Some(dates), Some(facts)) = (&dates, facts.as_mut()) {
            DateKeyResolver::from_dimension(dates).apply(facts);
        }

        tracing::info!(
            customers = customers.as_ref().map(Vec::len),
            products = products.as_ref().map(Vec::len),
            dates = dates.as_ref().map(DateDimension::len),
            facts = facts.as_ref().map(Vec::len),
            "Dimensional data preparation completed"
        );

        Ok(StarSchema {
            customers,
            products,
            dates,
            facts,
            facts_without_row_id,
        })
    }

    pub fn customers(&self, df: &DataFrame) -> EtlResult<Option<Vec<DimCustomer>>> {
        if !has_column(df, "Customer ID") || !has_column(df, "Customer Name") {
            tracing::warn!("Customer dimension columns not found in dataframe");
            return Ok(None);
        }
        let ids = Cells::text(df, "Customer ID")?;
        let names = Cells::text(df, "Customer Name")?;
        let segment = Cells::text(df, "Segment")?;
        let country = Cells::text(df, "Country")?;
        let city = Cells::text(df, "City")?;
        let state = Cells::text(df, "State")?;
        let postal_code = Cells::text(df, "Postal Code")?;
        let region = Cells::text(df, "Region")?;

        let mut rows = Vec::new();
        for row in 0..df.height() {
            let (Some(customer_id), Some(customer_name)) = (ids.get(row), names.get(row)) else {
                continue;
            };
            rows.push(DimCustomer {
                customer_id,
                customer_name,
                segment: segment.get(row),
                country: country.get(row),
                city: city.get(row),
                state: state.get(row),
                postal_code: postal_code.get(row),
                region: region.get(row),
            });
        }
        Ok(Some(dedup(rows)))
    }

    pub fn products(&self, df: &DataFrame) -> EtlResult<Option<Vec<DimProduct>>> {
        if !has_column(df, "Product ID") || !has_column(df, "Product Name") {
            tracing::warn!("Product dimension columns not found in dataframe");
            return Ok(None);
        }
        let ids = Cells::text(df, "Product ID")?;
        let names = Cells::text(df, "Product Name")?;
        let category = Cells::text(df, "Category")?;
        let sub_category = Cells::text(df, "Sub-Category")?;

        let mut rows = Vec::new();
        for row in 0..df.height() {
            let (Some(product_id), Some(product_name)) = (ids.get(row), names.get(row)) else {
                continue;
            };
            rows.push(DimProduct {
                product_id,
                category: category.get(row),
                sub_category: sub_category.get(row),
                product_name,
            });
        }
        Ok(Some(dedup(rows)))
    }

    pub fn dates(&self, df: &DataFrame) -> EtlResult<Option<DateDimension>> {
        let mut present = false;
        let mut all = Vec::new();
        for name in ["Order Date", "Ship Date"] {
            if let Some(dates) = frame::dates(df, name)? {
                present = true;
                all.extend(dates.into_iter().flatten());
            }
        }

        if !present {
            tracing::warn!("Date dimension columns not found in dataframe");
            return Ok(None);
        }
        Ok(Some(DateDimension::from_dates(all)))
    }

    /// 事实行；Row ID 或 Order ID 列缺失时不构建
    pub fn facts(&self, df: &DataFrame) -> EtlResult<Option<(Vec<FactSale>, usize)>> {
        if !has_column(df, "Row ID") || !has_column(df, "Order ID") {
            tracing::warn!("Fact table requires Row ID and Order ID columns");
            return Ok(None);
        }
        let row_ids = IntCells::new(df, "Row ID")?;
        let order_ids = Cells::text(df, "Order ID")?;
        let customer_ids = Cells::text(df, "Customer ID")?;
        let product_ids = Cells::text(df, "Product ID")?;
        let ship_mode = Cells::text(df, "Ship Mode")?;
        let quantity = IntCells::new(df, "Quantity")?;
        let sales = Cells::number(df, "Sales")?;
        let discount = Cells::number(df, "Discount")?;
        let profit = Cells::number(df, "Profit")?;
        let margin = Cells::number(df, "Profit Margin")?;
        let order_dates = Cells(frame::dates(df, "Order Date")?);
        let ship_dates = Cells(frame::dates(df, "Ship Date")?);

        let mut facts = Vec::with_capacity(df.height());
        let mut skipped = 0;
        for row in 0..df.height() {
            let (Some(row_id), Some(order_id)) = (row_ids.get(row)?, order_ids.get(row)) else {
                skipped += 1;
                continue;
            };
            facts.push(FactSale {
                row_id,
                order_id,
                customer_id: customer_ids.get(row),
                product_id: product_ids.get(row),
                order_date_id: None,
                ship_date_id: None,
                ship_mode: ship_mode.get(row),
                sales: sales.get(row),
                quantity: quantity.get(row)?,
                discount: discount.get(row),
                profit: profit.get(row),
                profit_margin: margin.get(row),
                order_date: order_dates.get(row),
                ship_date: ship_dates.get(row),
            });
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} fact rows without a row id", skipped);
        }
        Ok(Some((facts, skipped)))
    }
}

/// 按完整元组去重，保留首次出现的顺序
fn dedup<T: Clone + Eq + std::hash::Hash>(rows: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    rows.into_iter().filter(|r| seen.insert(r.clone())).collect()
}

/// 按行取值；列不存在时每行都是 None
struct Cells<T>(Option<Vec<Option<T>>>);

impl<T: Clone> Cells<T> {
    fn get(&self, row: usize) -> Option<T> {
        self.0.as_ref().and_then(|v| v[row].clone())
    }
}

impl Cells<String> {
    fn text(df: &DataFrame, name: &str) -> EtlResult<Self> {
        Ok(Self(frame::texts(df, name)?))
    }
}

impl Cells<f64> {
    fn number(df: &DataFrame, name: &str) -> EtlResult<Self> {
        Ok(Self(frame::numbers(df, name)?))
    }
}

/// 整数字段；带小数部分的值视为无效
struct IntCells<'a> {
    name: &'a str,
    values: Cells<f64>,
}

impl<'a> IntCells<'a> {
    fn new(df: &DataFrame, name: &'a str) -> EtlResult<Self> {
        Ok(Self {
            name,
            values: Cells::number(df, name)?,
        })
    }

    fn get(&self, row: usize) -> EtlResult<Option<i64>> {
        match self.values.get(row) {
            None => Ok(None),
            Some(n) if n.fract() == 0.0 && n.is_finite() => Ok(Some(n as i64)),
            Some(n) => Err(EtlError::InvalidValue {
                column: self.name.to_string(),
                row,
                message: format!("{} is not an integer", n),
            }),
        }
    }
}
