//! 定时调度：启动即运行一次，之后按固定间隔运行

use crate::pipeline::Pipeline;
use crate::types::RunReport;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// 按间隔循环运行管道，直到 shutdown 完成
///
/// 上一次运行未结束时不会开始新的运行；错过的触发直接跳过。
/// 返回已完成的运行次数。
pub async fn run_scheduled<F>(pipeline: &Pipeline, interval: Duration, shutdown: F) -> usize
where
    F: Future<Output = ()>,
{
    tracing::info!("Scheduling pipeline to run every {:?}", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut runs = 0;
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                tracing::info!("Pipeline scheduler stopped");
                break;
            }

            _ = ticker.tick() => {
                let report = pipeline.run_once().await;
                log_report(&report);
                runs += 1;
            }
        }
    }
    runs
}

fn log_report(report: &RunReport) {
    for table in &report.tables {
        tracing::info!(
            run_id = %report.run_id,
            table = %table.table,
            inserted = table.inserted,
            existing = table.existing,
            rekeyed = table.rekeyed,
            status = ?table.status,
            "Table load summary"
        );
    }
    if !report.success {
        tracing::error!(
            run_id = %report.run_id,
            stage = %report.last_stage,
            "Run failed: {}",
            report.message.as_deref().unwrap_or("unknown error")
        );
    }
}

/// 等待 Ctrl-C 或 SIGTERM
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!(signal = "SIGINT", "Signal received");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!(signal = "SIGTERM", "Signal received");
                    }
                }
                return;
            }
            Err(e) => tracing::warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!(signal = "SIGINT", "Signal received");
}
