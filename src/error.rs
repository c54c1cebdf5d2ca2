// 错误类型定义
//
// 两层结构：
// - ApiError：传输层错误，带可重试分类（驱动统一重试策略）
// - UploadError：上传引擎对外错误，区分致命/按文件隔离/可续传

use thiserror::Error;

/// 传输层错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// 网络错误（可重试）
    Network,
    /// 超时（可重试，与网络错误同等对待）
    Timeout,
    /// 服务器错误 5xx（可重试）
    ServerError,
    /// 限流 429（可重试）
    RateLimited,
    /// 客户端错误 4xx（不可重试，重试只会浪费预算）
    Client,
    /// 响应格式错误（不可重试）
    Protocol,
}

impl ApiErrorKind {
    /// 是否可重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiErrorKind::Network
                | ApiErrorKind::Timeout
                | ApiErrorKind::ServerError
                | ApiErrorKind::RateLimited
        )
    }

    /// 从 HTTP 状态码分类
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ApiErrorKind::RateLimited,
            500..=599 => ApiErrorKind::ServerError,
            400..=499 => ApiErrorKind::Client,
            _ => ApiErrorKind::Protocol,
        }
    }
}

/// 传输层错误
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    /// 错误分类
    pub kind: ApiErrorKind,
    /// 错误描述
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Timeout, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Protocol, message)
    }

    /// 从 HTTP 状态码构造
    pub fn status(status: u16, detail: impl Into<String>) -> Self {
        Self::new(
            ApiErrorKind::from_status(status),
            format!("HTTP {}: {}", status, detail.into()),
        )
    }

    /// 是否可重试
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::timeout(format!("请求超时: {}", e))
        } else if let Some(status) = e.status() {
            ApiError::status(status.as_u16(), e.to_string())
        } else if e.is_decode() {
            ApiError::protocol(format!("响应解析失败: {}", e))
        } else {
            ApiError::network(format!("网络错误: {}", e))
        }
    }
}

/// 上传引擎错误
#[derive(Debug, Error)]
pub enum UploadError {
    /// 输入校验失败（空文件列表等），立即失败，不重试
    #[error("参数校验失败: {0}")]
    Validation(String),

    /// 目录结构非法（缺少层级路径、根目录名非法等）
    #[error("目录结构非法: {0}")]
    InvalidStructure(String),

    /// 文件夹创建失败，整个调用中止，不会留下被文件引用的半截目录树
    #[error("文件夹创建失败: {0}")]
    FolderProvisioning(ApiError),

    /// 单文件传输失败（重试耗尽，占位记录已回滚），不影响其他文件
    #[error("文件传输失败: {file_name}: {source}")]
    Transfer {
        file_name: String,
        #[source]
        source: ApiError,
    },

    /// 分片传输失败（会话已保留，可续传）
    #[error("分片上传失败: {file_name} 分片#{part_number}: {source}")]
    PartTransfer {
        file_name: String,
        part_number: u32,
        session_id: String,
        #[source]
        source: ApiError,
    },

    /// 字节已入库但完成通知失败；需要重试通知，而不是重新上传
    #[error("上传完成但尚未注册，{count} 个文档待通知: {source}")]
    NotRegistered {
        count: usize,
        document_ids: Vec<String>,
        #[source]
        source: ApiError,
    },

    /// 内容哈希计算超时（发生在该文件任何网络调用之前）
    #[error("内容哈希计算超时: {file_name}")]
    HashTimeout { file_name: String },

    /// 调用被取消；已写入存储的字节不回滚，分片会话保持可续传
    #[error("上传已取消")]
    Cancelled,

    /// 会话不存在或已过期
    #[error("上传会话不存在或已过期: {0}")]
    SessionNotFound(String),

    /// 本地读写失败
    #[error("本地读写失败: {0}")]
    Io(#[from] std::io::Error),

    /// 其他传输层错误（调用级，发生在任何文件传输之前）
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl UploadError {
    /// 是否属于致命错误（中止整个调用，而不是单个文件）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            UploadError::Validation(_)
                | UploadError::InvalidStructure(_)
                | UploadError::FolderProvisioning(_)
                | UploadError::Cancelled
        )
    }
}
