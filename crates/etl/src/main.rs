//! retail-etl: 定时将零售销售 CSV 加载为星型模型

use clap::Parser;
use retail_etl::scheduler::{run_scheduled, shutdown_signal};
use retail_etl::{EtlConfig, Pipeline};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Parser)]
#[command(name = "retail-etl", about = "Load retail sales extracts into a star schema")]
struct Cli {
    /// 源 CSV 路径（覆盖 DATA_SOURCE_PATH）
    #[arg(long)]
    source: Option<PathBuf>,

    /// 数据库连接串（覆盖 DATABASE_URL）
    #[arg(long)]
    database_url: Option<String>,

    /// 调度间隔，分钟（覆盖 INGESTION_INTERVAL）
    #[arg(long)]
    interval: Option<u64>,

    /// 只运行一次后退出
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match EtlConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(source) = cli.source {
        config.source_path = source;
    }
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    if let Some(minutes) = cli.interval.filter(|m| *m > 0) {
        config.interval_minutes = minutes;
    }

    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {e}");
        return ExitCode::FAILURE;
    }

    let _guard = init_tracing(&config);
    tracing::info!("ETL pipeline scheduler starting");

    let pipeline = match Pipeline::new(config).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!("Failed to initialize pipeline: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = if cli.once {
        let report = pipeline.run_once().await;
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!("Failed to render run report: {}", e),
        }
        if report.success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    } else {
        let interval = pipeline.config().interval();
        let runs = run_scheduled(&pipeline, interval, shutdown_signal()).await;
        tracing::info!("Scheduler finished after {} runs", runs);
        ExitCode::SUCCESS
    };

    pipeline.close().await;
    code
}

/// stderr 可读日志 + 按天滚动的文件日志
fn init_tracing(config: &EtlConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter());

    let (file_layer, guard) = match std::fs::create_dir_all(&config.log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&config.log_dir, "pipeline.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("Failed to create log directory {}: {e}", config.log_dir.display());
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}
