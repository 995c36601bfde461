//! 原始与处理后数据的 CSV 快照

use crate::dimension::{StarSchema, DIM_CUSTOMER, DIM_DATE, DIM_PRODUCT, FACT_SALES};
use crate::frame;
use crate::types::EtlResult;
use chrono::Local;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

/// 快照归档目录，结构为 `<root>/raw` 与 `<root>/processed`
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn timestamp() -> String {
        Local::now().format("%Y%m%d_%H%M%S").to_string()
    }

    pub fn write_raw(&self, df: &DataFrame, timestamp: &str) -> EtlResult<PathBuf> {
        let path = self.file("raw", &format!("retail_sales_raw_{}", timestamp))?;
        frame::write_csv(df, File::create(&path)?)?;
        tracing::info!("Raw data saved to {}", path.display());
        Ok(path)
    }

    pub fn write_transformed(&self, df: &DataFrame, timestamp: &str) -> EtlResult<PathBuf> {
        let path = self.file("processed", &format!("retail_sales_transformed_{}", timestamp))?;
        frame::write_csv(df, File::create(&path)?)?;
        tracing::info!("Transformed data saved to {}", path.display());
        Ok(path)
    }

    /// 每张已构建的表各写一个文件
    pub fn write_tables(&self, star: &StarSchema, timestamp: &str) -> EtlResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        if let Some(rows) = &star.customers {
            written.push(self.write_rows(DIM_CUSTOMER, rows, timestamp)?);
        }
        if let Some(rows) = &star.products {
            written.push(self.write_rows(DIM_PRODUCT, rows, timestamp)?);
        }
        if let Some(dates) = &star.dates {
            written.push(self.write_rows(DIM_DATE, dates.rows(), timestamp)?);
        }
        if let Some(rows) = &star.facts {
            written.push(self.write_rows(FACT_SALES, rows, timestamp)?);
        }
        Ok(written)
    }

    fn write_rows<T: Serialize>(&self, table: &str, rows: &[T], timestamp: &str) -> EtlResult<PathBuf> {
        let path = self.file("processed", &format!("{}_{}", table, timestamp))?;
        let mut wtr = csv::Writer::from_path(&path)?;
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        tracing::info!("{} saved to {}", table, path.display());
        Ok(path)
    }

    fn file(&self, kind: &str, stem: &str) -> EtlResult<PathBuf> {
        let dir = self.root.join(kind);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{}.csv", stem)))
    }
}
