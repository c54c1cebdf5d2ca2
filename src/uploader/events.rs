// 进度事件
//
// 进度以事件序列的形式经 channel 发布，而不是回调，
// 测试直接断言收集到的序列。事件只存在于内存，从不持久化。

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// 上传阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    /// 过滤文件
    Filtering,
    /// 分析目录结构
    Analyzing,
    /// 创建目录
    Provisioning,
    /// 申请预签名 URL
    RequestingUrls,
    /// 传输字节
    Transferring,
    /// 完成通知
    Notifying,
    /// 调用成功结束
    Complete,
    /// 调用失败结束
    Error,
}

/// 进度事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: UploadStage,
    pub message: String,
    /// 0-100，同一调用内单调不减
    pub percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// 进度事件发送端
///
/// 每个调用使用 fork() 出的独立副本，百分比在副本内单调不减。
/// 未订阅时为空实现，发送永不阻塞、永不报错。
#[derive(Clone)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    last_percentage: Arc<AtomicU8>,
}

impl ProgressSender {
    /// 创建发送端与接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                last_percentage: Arc::new(AtomicU8::new(0)),
            },
            rx,
        )
    }

    /// 空实现
    pub fn disabled() -> Self {
        Self {
            tx: None,
            last_percentage: Arc::new(AtomicU8::new(0)),
        }
    }

    /// 派生一个新调用的发送端：共享接收方，百分比计数独立归零
    pub fn fork(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            last_percentage: Arc::new(AtomicU8::new(0)),
        }
    }

    pub fn emit(&self, stage: UploadStage, percentage: u8, message: impl Into<String>) {
        self.emit_detail(stage, percentage, message, None);
    }

    pub fn emit_detail(
        &self,
        stage: UploadStage,
        percentage: u8,
        message: impl Into<String>,
        detail: Option<String>,
    ) {
        // 百分比钳制到单调不减
        let percentage = percentage.min(100);
        let clamped = self
            .last_percentage
            .fetch_max(percentage, Ordering::SeqCst)
            .max(percentage);

        if let Some(tx) = &self.tx {
            // 接收端已关闭时静默丢弃
            let _ = tx.send(ProgressEvent {
                stage,
                message: message.into(),
                percentage: clamped,
                detail,
            });
        }
    }
}
