// DocVault 上传引擎核心库
// 客户端驱动：过滤 → 目录分析 → 目录创建 → 预签名直传 → 完成通知
// 大文件走分片路径，会话落盘、断点续传

// 配置管理模块
pub mod config;

// 日志系统
pub mod logging;

// 错误类型
pub mod error;

// 统一重试策略
pub mod retry;

// 文件句柄与字节来源
pub mod handle;

// 内容哈希
pub mod hashing;

// 文件过滤
pub mod filter;

// 目录结构分析
pub mod structure;

// 元数据服务与对象存储访问层
pub mod api;

// 分片上传会话持久化
pub mod session;

// 上传引擎
pub mod uploader;

// 导出常用类型
pub use api::{ApiClient, MetadataApi, ObjectStorage, StorageClient};
pub use config::{LogConfig, UploadConfig};
pub use error::{ApiError, ApiErrorKind, UploadError};
pub use filter::{FileFilter, FilterOutcome, SkippedFile};
pub use handle::{FileHandle, FileSource};
pub use session::{MultipartSession, PartState, SessionStore};
pub use structure::{FileEntry, FolderNode, FolderStructure};
pub use uploader::{
    FileFailure, ProgressEvent, ProgressSender, UploadOrchestrator, UploadReport, UploadStage,
};
