//! 日志系统配置
//!
//! 控制台输出 + 可选文件持久化（按天滚动），启动时清理过期日志

use crate::config::LogConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "docvault-upload";

/// 初始化日志系统
///
/// 返回的 `WorkerGuard` 必须由调用方持有到进程结束，否则文件日志缓冲会丢失
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    // RUST_LOG 优先，其次取配置文件中的级别
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let timer = ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string());

    let console_layer = fmt::layer()
        .with_timer(timer.clone())
        .with_target(false);

    let (file_layer, guard) = if config.enabled {
        fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("创建日志目录失败: {:?}", config.log_dir))?;

        // 启动时顺手清理过期日志
        match cleanup_expired_logs(&config.log_dir, config.retention_days) {
            Ok(0) => {}
            Ok(n) => info!("已清理 {} 个过期日志文件", n),
            Err(e) => warn!("清理过期日志失败: {}", e),
        }

        let appender =
            tracing_appender::rolling::daily(&config.log_dir, format!("{}.log", LOG_FILE_PREFIX));
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let layer = fmt::layer()
            .with_timer(timer)
            .with_target(false)
            .with_ansi(false)
            .with_writer(non_blocking);

        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "日志系统初始化完成: level={}, 文件输出={}",
        config.level,
        if config.enabled { "启用" } else { "禁用" }
    );

    Ok(guard)
}

/// 删除超过保留天数的日志文件
///
/// # 返回
/// 删除的文件数量
fn cleanup_expired_logs(log_dir: &Path, retention_days: u32) -> std::io::Result<usize> {
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(retention_days as u64 * 24 * 3600))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        let is_log_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_log_file {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        if modified < cutoff {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
    }

    Ok(removed)
}
