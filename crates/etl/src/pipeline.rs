//! ETL 管道
//!
//! EXTRACTED -> CLEANED -> TRANSFORMED -> DECOMPOSED -> PERSISTED，终态 SUCCESS / FAILED。

use crate::cleaning::Cleaner;
use crate::dimension::{DimensionBuilder, StarSchema};
use crate::enrichment::FeatureEnricher;
use crate::snapshot::Archive;
use crate::source::{CsvSource, Extraction, SalesSource};
use crate::storage::{LoadReport, Warehouse};
use crate::types::{EtlConfig, EtlError, EtlResult, LoadStatus, RunReport, RunState, TableLoad};
use chrono::Utc;
use polars::prelude::DataFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// 同一进程内的运行序号，保证 run_id 唯一
static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// 运行过程中的状态与计数
#[derive(Debug)]
struct RunTracker {
    run_id: String,
    stage: RunState,
    rows_extracted: usize,
    rows_cleaned: usize,
    tables: Vec<TableLoad>,
    started: Instant,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            run_id: format!(
                "run-{}-{}-{}",
                std::process::id(),
                Utc::now().timestamp_millis(),
                RUN_SEQ.fetch_add(1, Ordering::Relaxed)
            ),
            stage: RunState::Pending,
            rows_extracted: 0,
            rows_cleaned: 0,
            tables: Vec::new(),
            started: Instant::now(),
        }
    }

    fn advance(&mut self, stage: RunState) {
        tracing::info!(run_id = %self.run_id, "{} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn finish(self, outcome: EtlResult<Option<String>>) -> RunReport {
        let elapsed = self.started.elapsed();
        let (success, state, message) = match outcome {
            Ok(message) => {
                tracing::info!(
                    run_id = %self.run_id,
                    "Pipeline executed successfully in {:.2} seconds",
                    elapsed.as_secs_f64()
                );
                (true, RunState::Success, message)
            }
            Err(e) => {
                tracing::error!(run_id = %self.run_id, stage = %self.stage, "Pipeline failed: {}", e);
                (false, RunState::Failed, Some(e.to_string()))
            }
        };

        RunReport {
            run_id: self.run_id,
            success,
            state,
            last_stage: self.stage,
            message,
            rows_extracted: self.rows_extracted,
            rows_cleaned: self.rows_cleaned,
            tables: self.tables,
            elapsed,
        }
    }
}

/// ETL 管道
pub struct Pipeline {
    config: EtlConfig,
    source: Box<dyn SalesSource>,
    cleaner: Cleaner,
    enricher: FeatureEnricher,
    builder: DimensionBuilder,
    warehouse: Warehouse,
    archive: Option<Archive>,
}

impl Pipeline {
    /// 按配置创建管道：CSV 数据源 + 数据库连接
    pub async fn new(config: EtlConfig) -> EtlResult<Self> {
        let warehouse = Warehouse::connect(&config.database_url, config.max_connections).await?;
        let source = Box::new(CsvSource::new(config.source_path.clone()));
        Ok(Self::with_parts(config, source, warehouse))
    }

    pub fn with_parts(config: EtlConfig, source: Box<dyn SalesSource>, warehouse: Warehouse) -> Self {
        let archive = config.archive_dir.clone().map(Archive::new);
        Self {
            config,
            source,
            cleaner: Cleaner::new(),
            enricher: FeatureEnricher::new(),
            builder: DimensionBuilder::new(),
            warehouse,
            archive,
        }
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    /// 执行一次完整运行。失败体现在报告中，不以错误返回
    pub async fn run_once(&self) -> RunReport {
        let mut tracker = RunTracker::new();
        tracing::info!(run_id = %tracker.run_id, source = %self.source.describe(), "Starting ETL pipeline execution");

        if let Err(e) = self.warehouse.ensure_schema().await {
            return tracker.finish(Err(e));
        }

        let ttl = match self.config.run_lock_ttl() {
            Ok(ttl) => ttl,
            Err(e) => return tracker.finish(Err(e)),
        };
        let lease = match self.warehouse.acquire_run_lock(&tracker.run_id, ttl).await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                let holder = self
                    .warehouse
                    .run_lock_holder()
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| "unknown".to_string());
                return tracker.finish(Err(EtlError::RunLockHeld(holder)));
            }
            Err(e) => return tracker.finish(Err(e)),
        };

        let outcome = self.run_stages(&mut tracker).await;

        if let Err(e) = self.warehouse.release_run_lock(&lease).await {
            tracing::warn!("Failed to release run lock {}: {}", lease.holder, e);
        }
        tracker.finish(outcome)
    }

    async fn run_stages(&self, tracker: &mut RunTracker) -> EtlResult<Option<String>> {
        let raw = match self.source.extract().await? {
            Extraction::Data(frame) => frame,
            Extraction::Empty => {
                tracker.advance(RunState::Extracted);
                tracing::warn!("Source contained no rows; nothing to load");
                return Ok(Some("source contained no rows".to_string()));
            }
            Extraction::Unavailable(reason) => return Err(EtlError::SourceUnavailable(reason)),
        };
        tracker.rows_extracted = raw.height();
        tracker.advance(RunState::Extracted);

        let timestamp = Archive::timestamp();
        self.archive_raw(&raw, &timestamp);

        let (clean, stats) = self.cleaner.clean(&raw)?;
        tracker.rows_cleaned = stats.output_rows;
        tracker.advance(RunState::Cleaned);

        let enriched = self.enricher.enrich(&clean)?;
        tracker.advance(RunState::Transformed);

        let star = self.builder.build(&enriched)?;
        tracker.advance(RunState::Decomposed);
        self.archive_processed(&enriched, &star, &timestamp);

        let LoadReport { tables } = self.warehouse.load(&star).await;
        tracker.tables = tables;
        tracker.advance(RunState::Persisted);

        let failed: Vec<&str> = tracker
            .tables
            .iter()
            .filter(|t| !t.is_committed() && t.status != LoadStatus::NotBuilt)
            .map(|t| t.table.as_str())
            .collect();
        if failed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(format!("tables rolled back: {}", failed.join(", "))))
        }
    }

    fn archive_raw(&self, raw: &DataFrame, timestamp: &str) {
        if let Some(archive) = &self.archive {
            if let Err(e) = archive.write_raw(raw, timestamp) {
                tracing::warn!("Failed to archive raw data: {}", e);
            }
        }
    }

    fn archive_processed(&self, enriched: &DataFrame, star: &StarSchema, timestamp: &str) {
        if let Some(archive) = &self.archive {
            if let Err(e) = archive.write_transformed(enriched, timestamp) {
                tracing::warn!("Failed to archive transformed data: {}", e);
            }
            if let Err(e) = archive.write_tables(star, timestamp) {
                tracing::warn!("Failed to archive dimensional tables: {}", e);
            }
        }
    }

    /// 关闭数据库连接
    pub async fn close(self) {
        self.warehouse.close().await;
    }
}

/// ETL 管道构建器
pub struct PipelineBuilder {
    config: EtlConfig,
    source: Option<Box<dyn SalesSource>>,
    warehouse: Option<Warehouse>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: EtlConfig::default(),
            source: None,
            warehouse: None,
        }
    }

    pub fn with_config(mut self, config: EtlConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_source_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.source_path = path.into();
        self
    }

    pub fn with_source(mut self, source: Box<dyn SalesSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_database(mut self, url: String) -> Self {
        self.config.database_url = url;
        self
    }

    pub fn with_warehouse(mut self, warehouse: Warehouse) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    pub fn with_archive(mut self, dir: Option<std::path::PathBuf>) -> Self {
        self.config.archive_dir = dir;
        self
    }

    pub async fn build(self) -> EtlResult<Pipeline> {
        let warehouse = match self.warehouse {
            Some(warehouse) => warehouse,
            None => Warehouse::connect(&self.config.database_url, self.config.max_connections).await?,
        };
        let source = self
            .source
            .unwrap_or_else(|| Box::new(CsvSource::new(self.config.source_path.clone())));
        Ok(Pipeline::with_parts(self.config, source, warehouse))
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
