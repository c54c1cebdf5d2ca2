// 元数据服务与对象存储访问层
//
// 网络调用收敛在两个 trait 之后：MetadataApi（元数据服务）与
// ObjectStorage（预签名直传）。上层组件只依赖 trait，测试用内存实现。

pub mod client;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

use crate::error::ApiError;
use async_trait::async_trait;

pub use client::{ApiClient, StorageClient};
pub use types::{
    BulkFolderRequest, BulkFolderResponse, CompleteRequest, CompleteResponse, CompletedPart,
    CreateFolderRequest, CreateFolderResponse, FolderInfo, FolderListResponse,
    FolderTreeNode, MultipartAbortRequest, MultipartCompleteRequest, MultipartInitRequest,
    MultipartInitResponse, PresignedBatchRequest, PresignedBatchResponse, PresignedFileSpec,
};

/// 元数据服务接口
#[async_trait]
pub trait MetadataApi: Send + Sync {
    /// 创建（或复用）文件夹
    async fn create_folder(&self, req: &CreateFolderRequest) -> Result<FolderInfo, ApiError>;

    /// 一次请求批量创建目录树，返回 路径→id 映射
    async fn create_folder_tree(
        &self,
        req: &BulkFolderRequest,
    ) -> Result<BulkFolderResponse, ApiError>;

    /// 列出全部文件夹
    async fn list_folders(&self) -> Result<Vec<FolderInfo>, ApiError>;

    /// 批量申请预签名 URL 与占位记录
    async fn request_presigned_urls(
        &self,
        req: &PresignedBatchRequest,
    ) -> Result<PresignedBatchResponse, ApiError>;

    /// 通知占位记录已有字节，返回进入处理队列的文档数
    async fn notify_completion(&self, document_ids: &[String]) -> Result<u32, ApiError>;

    /// 删除占位记录（传输失败后的补偿回滚）
    async fn delete_document(&self, document_id: &str) -> Result<(), ApiError>;

    /// 初始化分片上传
    async fn init_multipart(
        &self,
        req: &MultipartInitRequest,
    ) -> Result<MultipartInitResponse, ApiError>;

    /// 完成分片上传；parts 必须按 part_number 升序
    async fn complete_multipart(&self, req: &MultipartCompleteRequest) -> Result<(), ApiError>;

    /// 中止存储端分片上传
    async fn abort_multipart(&self, req: &MultipartAbortRequest) -> Result<(), ApiError>;
}

/// 对象存储直传接口
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// PUT 原始字节到预签名 URL
    ///
    /// # 返回
    /// 存储端返回的标签（ETag），分片完成调用需要原样回传
    async fn put_object(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<Option<String>, ApiError>;
}
