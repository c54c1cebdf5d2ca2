// 统一重试策略
//
// 文件 PUT、分片 PUT、完成通知三处共用同一套指数退避逻辑，
// 由 ApiErrorKind::is_retryable 决定是否继续。

use crate::error::ApiError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// 指数退避重试策略
///
/// # 延迟序列（base=500ms 时）
/// - attempt=0: 500ms
/// - attempt=1: 1000ms
/// - attempt=2: 2000ms
/// - 封顶于 max_delay
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次尝试）
    pub max_retries: u32,
    /// 初始退避延迟
    pub base_delay: Duration,
    /// 退避延迟上限
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// 计算第 attempt 次失败后的退避延迟: base × 2^attempt，封顶
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let delay = base.saturating_mul(2u64.saturating_pow(attempt.min(32)));
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }

    /// 执行操作；失败且可重试时退避后重试，不可重试立即返回
    ///
    /// # 参数
    /// * `label` - 日志标签
    /// * `op` - 每次尝试调用一次的操作
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut last_error: Option<ApiError> = None;

        for attempt in 0..=self.max_retries {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    // 客户端错误重试只会浪费预算，立即失败
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    if attempt < self.max_retries {
                        let delay = self.delay_for(attempt);
                        warn!(
                            "{} 失败，{}ms 后重试 ({}/{}): {}",
                            label,
                            delay.as_millis(),
                            attempt + 1,
                            self.max_retries,
                            e
                        );
                        tokio::time::sleep(delay).await;
                    }

                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ApiError::network(format!("{} 失败且无错误信息", label))))
    }
}
