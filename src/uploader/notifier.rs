// 完成通知
//
// 把"字节已入库"的占位记录交接给处理管线。通知成功之前，
// 字节在存储里但对系统其余部分不可见。只有可重试错误（网络、
// 5xx、429、超时）才消耗重试预算；其余 4xx 立即放弃。
// 通知最终失败与传输失败是两类错误：字节是安全的，提示用户
// 重试通知而不是重新上传。

use crate::api::MetadataApi;
use crate::error::UploadError;
use crate::retry::RetryPolicy;
use std::sync::Arc;
use tracing::info;

/// 完成通知器
pub struct CompletionNotifier {
    api: Arc<dyn MetadataApi>,
    retry: RetryPolicy,
}

impl CompletionNotifier {
    pub fn new(api: Arc<dyn MetadataApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    /// 通知服务端这些占位记录已有字节
    ///
    /// # 返回
    /// 进入处理队列的文档数
    pub async fn notify(&self, document_ids: &[String]) -> Result<u32, UploadError> {
        if document_ids.is_empty() {
            return Ok(0);
        }

        let api = self.api.clone();
        let ids: Vec<String> = document_ids.to_vec();
        let result = self
            .retry
            .run("完成通知", || {
                let api = api.clone();
                let ids = ids.clone();
                async move { api.notify_completion(&ids).await }
            })
            .await;

        match result {
            Ok(queued) => {
                info!("完成通知成功: {} 个文档进入处理队列", queued);
                Ok(queued)
            }
            Err(source) => Err(UploadError::NotRegistered {
                count: document_ids.len(),
                document_ids: document_ids.to_vec(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;
    use crate::error::ApiError;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("doc-{}", i)).collect()
    }

    #[tokio::test]
    async fn test_success_returns_queued_count() {
        let api = Arc::new(MockApi::new());
        let notifier = CompletionNotifier::new(api.clone(), RetryPolicy::new(3, 1, 10));

        let queued = notifier.notify(&ids(4)).await.unwrap();
        assert_eq!(queued, 4);
        assert_eq!(api.notify_calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_ids_skip_request() {
        let api = Arc::new(MockApi::new());
        let notifier = CompletionNotifier::new(api.clone(), RetryPolicy::new(3, 1, 10));

        assert_eq!(notifier.notify(&[]).await.unwrap(), 0);
        assert!(api.notify_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_three_server_errors_then_success() {
        // 连续三个 500 之后 200：第 3 次重试成功，共 4 次请求
        let api = Arc::new(MockApi::new());
        for _ in 0..3 {
            api.push_notify_failure(ApiError::status(500, "内部错误"));
        }
        let notifier = CompletionNotifier::new(api.clone(), RetryPolicy::new(3, 1, 10));

        let queued = notifier.notify(&ids(2)).await.unwrap();
        assert_eq!(queued, 2);
        assert_eq!(api.notify_calls.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_client_error_aborts_without_retry() {
        let api = Arc::new(MockApi::new());
        api.push_notify_failure(ApiError::status(400, "参数错误"));
        let notifier = CompletionNotifier::new(api.clone(), RetryPolicy::new(3, 1, 10));

        let err = notifier.notify(&ids(1)).await.unwrap_err();
        assert!(matches!(err, UploadError::NotRegistered { .. }));
        // 4xx 不消耗重试预算
        assert_eq!(api.notify_calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_not_registered() {
        let api = Arc::new(MockApi::new());
        for _ in 0..4 {
            api.push_notify_failure(ApiError::status(503, "服务不可用"));
        }
        let notifier = CompletionNotifier::new(api.clone(), RetryPolicy::new(3, 1, 10));

        match notifier.notify(&ids(3)).await {
            Err(UploadError::NotRegistered {
                count,
                document_ids,
                ..
            }) => {
                assert_eq!(count, 3);
                assert_eq!(document_ids.len(), 3);
            }
            other => panic!("期望 NotRegistered，实际: {:?}", other),
        }
        assert_eq!(api.notify_calls.lock().len(), 4);
    }
}
