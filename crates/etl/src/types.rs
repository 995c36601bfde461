//! 核心类型定义

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV 解析失败: {0}")]
    Csv(#[from] csv::Error),

    #[error("数据处理错误: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据源不可用: {0}")]
    SourceUnavailable(String),

    #[error("输入数据缺少全部关键列 (Order ID / Product ID / Customer ID / Sales)")]
    NoCriticalColumns,

    #[error("列类型错误: {column} 应为 {expected}, 实际为 {found}")]
    ColumnType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("无效的值: {column} 第 {row} 行: {message}")]
    InvalidValue {
        column: String,
        row: usize,
        message: String,
    },

    #[error("运行锁已被占用: {0}")]
    RunLockHeld(String),

    #[error("无效的配置: {0}")]
    Config(String),
}

/// 管道运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    Extracted,
    Cleaned,
    Transformed,
    Decomposed,
    Persisted,
    Success,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Success | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Pending => "PENDING",
            RunState::Extracted => "EXTRACTED",
            RunState::Cleaned => "CLEANED",
            RunState::Transformed => "TRANSFORMED",
            RunState::Decomposed => "DECOMPOSED",
            RunState::Persisted => "PERSISTED",
            RunState::Success => "SUCCESS",
            RunState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// 单表加载结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadStatus {
    /// 事务已提交
    Committed,
    /// 事务已回滚，其余表继续加载
    RolledBack { reason: String },
    /// 本次运行未构建该表（源数据缺少所需列）
    NotBuilt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLoad {
    pub table: String,
    /// 新插入的行数
    pub inserted: u64,
    /// 已存在而被忽略/跳过的行数
    pub existing: u64,
    /// 首次写入优先策略下恒为 0
    pub updated: u64,
    /// 因代理键冲突而重新分配键的日期行数（仅 dim_date）
    pub rekeyed: u64,
    pub status: LoadStatus,
}

impl TableLoad {
    pub fn not_built(table: &str) -> Self {
        Self {
            table: table.to_string(),
            inserted: 0,
            existing: 0,
            updated: 0,
            rekeyed: 0,
            status: LoadStatus::NotBuilt,
        }
    }

    pub fn rolled_back(table: &str, reason: String) -> Self {
        Self {
            status: LoadStatus::RolledBack { reason },
            ..Self::not_built(table)
        }
    }

    pub fn is_committed(&self) -> bool {
        self.status == LoadStatus::Committed
    }
}

/// 一次管道运行的对外结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub success: bool,
    /// 终态: SUCCESS / FAILED
    pub state: RunState,
    /// 到达的最后一个阶段
    pub last_stage: RunState,
    pub message: Option<String>,
    pub rows_extracted: usize,
    pub rows_cleaned: usize,
    pub tables: Vec<TableLoad>,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl RunReport {
    pub fn table(&self, name: &str) -> Option<&TableLoad> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn inserted(&self, name: &str) -> u64 {
        self.table(name).map(|t| t.inserted).unwrap_or(0)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// ETL 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// 原始销售数据 CSV 路径
    pub source_path: PathBuf,
    /// 数据库连接串
    pub database_url: String,
    /// 调度间隔（分钟）
    pub interval_minutes: u64,
    /// 连接池大小
    pub max_connections: u32,
    /// 运行锁租约时长（秒），超时视为过期
    pub run_lock_ttl_secs: u64,
    /// 原始/处理后数据快照目录，None 表示不归档
    pub archive_dir: Option<PathBuf>,
    /// 日志目录
    pub log_dir: PathBuf,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("data/source/retail_sales.csv"),
            database_url: "sqlite:data/retail.db".to_string(),
            interval_minutes: 60,
            max_connections: 5,
            run_lock_ttl_secs: 3600,
            archive_dir: Some(PathBuf::from("data")),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl EtlConfig {
    /// 从环境变量（以及 .env 文件）加载配置
    pub fn from_env() -> EtlResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EtlResult<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup("DATA_SOURCE_PATH") {
            config.source_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(value) = lookup("INGESTION_INTERVAL") {
            config.interval_minutes = parse_var("INGESTION_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("DB_MAX_CONNECTIONS") {
            config.max_connections = parse_var("DB_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = lookup("RUN_LOCK_TTL_SECS") {
            config.run_lock_ttl_secs = parse_var("RUN_LOCK_TTL_SECS", &value)?;
        }
        if let Some(dir) = lookup("ETL_ARCHIVE_DIR") {
            config.archive_dir = if dir.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
        if let Some(dir) = lookup("ETL_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// 检查调度间隔与锁租约能否换算为时长
    pub fn validate(&self) -> EtlResult<()> {
        if self.interval_minutes == 0 {
            return Err(EtlError::Config(
                "INGESTION_INTERVAL must be at least 1 minute".to_string(),
            ));
        }
        if self.interval_minutes.checked_mul(60).is_none() {
            return Err(EtlError::Config(format!(
                "INGESTION_INTERVAL is too large: {} minutes",
                self.interval_minutes
            )));
        }
        self.run_lock_ttl()?;
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn run_lock_ttl(&self) -> EtlResult<chrono::Duration> {
        i64::try_from(self.run_lock_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                EtlError::Config(format!(
                    "RUN_LOCK_TTL_SECS is too large: {}",
                    self.run_lock_ttl_secs
                ))
            })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> EtlResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| EtlError::Config(format!("{} is not a valid number: {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_from_env_overrides_defaults() {
        let config = EtlConfig::from_lookup(lookup_from(&[
            ("DATA_SOURCE_PATH", "/tmp/sales.csv"),
            ("INGESTION_INTERVAL", "15"),
            ("ETL_ARCHIVE_DIR", ""),
        ]))
        .unwrap();

        assert_eq!(config.source_path, PathBuf::from("/tmp/sales.csv"));
        assert_eq!(config.interval_minutes, 15);
        assert_eq!(config.interval(), Duration::from_secs(900));
        assert!(config.archive_dir.is_none());
        assert_eq!(config.database_url, "sqlite:data/retail.db");
    }

    #[test]
    fn test_config_rejects_bad_numbers() {
        let err = EtlConfig::from_lookup(lookup_from(&[("INGESTION_INTERVAL", "hourly")]))
            .unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));

        let err = EtlConfig::from_lookup(lookup_from(&[("INGESTION_INTERVAL", "0")])).unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn test_config_rejects_durations_that_overflow() {
        let huge = u64::MAX.to_string();

        let err = EtlConfig::from_lookup(lookup_from(&[("INGESTION_INTERVAL", huge.as_str())]))
            .unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));

        let err = EtlConfig::from_lookup(lookup_from(&[("RUN_LOCK_TTL_SECS", huge.as_str())]))
            .unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));

        let beyond_chrono = (i64::MAX as u64).to_string();
        let err = EtlConfig::from_lookup(lookup_from(&[("RUN_LOCK_TTL_SECS", beyond_chrono.as_str())]))
            .unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));

        let config =
            EtlConfig::from_lookup(lookup_from(&[("RUN_LOCK_TTL_SECS", "90")])).unwrap();
        assert_eq!(config.run_lock_ttl().unwrap(), chrono::Duration::seconds(90));
    }

    #[test]
    fn test_report_serializes_statuses() {
        let report = RunReport {
            run_id: "r1".to_string(),
            success: true,
            state: RunState::Success,
            last_stage: RunState::Persisted,
            message: None,
            rows_extracted: 3,
            rows_cleaned: 2,
            tables: vec![
                TableLoad::not_built("dim_customer"),
                TableLoad::rolled_back("dim_product", "boom".to_string()),
            ],
            elapsed: Duration::from_millis(12),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "SUCCESS");
        assert_eq!(json["elapsed"], 12);
        assert_eq!(json["tables"][0]["status"]["status"], "not_built");
        assert_eq!(json["tables"][1]["status"]["reason"], "boom");
        assert_eq!(report.inserted("dim_product"), 0);
    }
}
