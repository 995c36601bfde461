//! # Retail ETL
//!
//! 将扁平的零售销售明细转换为星型模型，并幂等地写入关系库
//!
//! ## 功能
//!
//! - 数据清洗：关键列缺失丢弃、默认值填充、去重、日期解析
//! - 特征派生：日历字段、配送时长、利润与利润率
//! - 维度拆分：客户/产品/日期维度与销售事实，日期代理键解析
//! - 幂等加载：维度 insert-or-ignore，事实按 row_id 去重插入
//! - 定时调度与运行锁

pub mod cleaning;
pub mod dimension;
pub mod enrichment;
pub mod frame;
pub mod pipeline;
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod storage;
pub mod types;

pub use dimension::{
    DateDimension, DateKeyResolver, DimCustomer, DimDate, DimProduct, DimensionBuilder, FactSale,
    StarSchema,
};
pub use frame::read_csv;
pub use polars::prelude::DataFrame;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use source::{CsvSource, Extraction, FrameSource, SalesSource};
pub use storage::Warehouse;
pub use types::{EtlConfig, EtlError, EtlResult, LoadStatus, RunReport, RunState, TableLoad};
