//! 原始销售数据源

use crate::frame;
use crate::types::EtlResult;
use async_trait::async_trait;
use polars::prelude::DataFrame;
use std::path::{Path, PathBuf};

/// 一次抽取的结果
#[derive(Debug)]
pub enum Extraction {
    /// 读到了数据
    Data(DataFrame),
    /// 数据源可读，但没有任何数据行
    Empty,
    /// 数据源不存在或无法获取
    Unavailable(String),
}

/// 数据源接口
#[async_trait]
pub trait SalesSource: Send + Sync {
    /// 数据源描述（用于日志）
    fn describe(&self) -> String;

    /// 读取完整的一批数据
    async fn extract(&self) -> EtlResult<Extraction>;
}

/// 本地 CSV 文件数据源
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SalesSource for CsvSource {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    async fn extract(&self) -> EtlResult<Extraction> {
        tracing::info!("Starting data extraction from {}", self.path.display());

        if !tokio::fs::try_exists(&self.path).await? {
            tracing::error!("Source file {} does not exist", self.path.display());
            return Ok(Extraction::Unavailable(format!(
                "source file {} does not exist",
                self.path.display()
            )));
        }

        let bytes = tokio::fs::read(&self.path).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            tracing::warn!("Source file {} is empty", self.path.display());
            return Ok(Extraction::Empty);
        }

        let df = frame::read_csv(bytes)?;
        if df.height() == 0 {
            tracing::warn!("Source file {} has a header but no rows", self.path.display());
            return Ok(Extraction::Empty);
        }

        tracing::info!(
            "Successfully extracted {} records ({} columns)",
            df.height(),
            df.width()
        );
        Ok(Extraction::Data(df))
    }
}

/// 内存数据源，便于嵌入调用方已持有的数据集
#[derive(Debug, Clone)]
pub struct FrameSource {
    frame: DataFrame,
}

impl FrameSource {
    pub fn new(frame: DataFrame) -> Self {
        Self { frame }
    }
}

#[async_trait]
impl SalesSource for FrameSource {
    fn describe(&self) -> String {
        format!("memory:{} rows", self.frame.height())
    }

    async fn extract(&self) -> EtlResult<Extraction> {
        if self.frame.height() == 0 {
            Ok(Extraction::Empty)
        } else {
            Ok(Extraction::Data(self.frame.clone()))
        }
    }
}
