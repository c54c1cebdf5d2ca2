// 元数据服务 API 数据类型

use crate::structure::FolderNode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 文件夹信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderInfo {
    /// 服务端分配的目录 id
    pub id: String,

    /// 目录名
    pub name: String,

    /// 父目录 id；None 表示根级目录
    #[serde(
        default,
        rename = "parentFolderId",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_folder_id: Option<String>,
}

/// 创建文件夹请求
#[derive(Debug, Clone, Serialize)]
pub struct CreateFolderRequest {
    pub name: String,

    #[serde(rename = "parentFolderId", skip_serializing_if = "Option::is_none")]
    pub parent_folder_id: Option<String>,

    /// 同名目录已存在时复用而非报错；并发/重试场景下服务端保证至多一次逻辑创建
    #[serde(rename = "reuseExisting")]
    pub reuse_existing: bool,
}

/// 创建文件夹响应
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFolderResponse {
    pub folder: FolderInfo,
}

/// 批量创建目录树的节点
#[derive(Debug, Clone, Serialize)]
pub struct FolderTreeNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "parentPath")]
    pub parent_path: Option<String>,
    pub depth: u32,
}

impl From<&FolderNode> for FolderTreeNode {
    fn from(node: &FolderNode) -> Self {
        Self {
            name: node.name.clone(),
            path: node.path.clone(),
            parent_path: node.parent_path.clone(),
            depth: node.depth,
        }
    }
}

/// 批量创建目录树请求
#[derive(Debug, Clone, Serialize)]
pub struct BulkFolderRequest {
    #[serde(rename = "folderTree")]
    pub folder_tree: Vec<FolderTreeNode>,

    #[serde(rename = "parentFolderId")]
    pub parent_folder_id: String,
}

/// 批量创建目录树响应
#[derive(Debug, Clone, Deserialize)]
pub struct BulkFolderResponse {
    #[serde(default)]
    pub count: u32,

    /// 路径 → 服务端目录 id
    #[serde(rename = "folderMap")]
    pub folder_map: HashMap<String, String>,
}

/// 文件夹列表响应
#[derive(Debug, Clone, Deserialize)]
pub struct FolderListResponse {
    #[serde(default)]
    pub folders: Vec<FolderInfo>,
}

/// 批量预签名请求中的单个文件
#[derive(Debug, Clone, Serialize)]
pub struct PresignedFileSpec {
    #[serde(rename = "fileName")]
    pub file_name: String,

    #[serde(rename = "fileType")]
    pub file_type: String,

    #[serde(rename = "fileSize")]
    pub file_size: u64,

    #[serde(rename = "relativePath", skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,

    #[serde(rename = "folderId", skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

/// 批量预签名请求
#[derive(Debug, Clone, Serialize)]
pub struct PresignedBatchRequest {
    pub files: Vec<PresignedFileSpec>,

    #[serde(rename = "folderId", skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

/// 批量预签名响应
///
/// 服务端可能判定部分文件内容已存在于目标位置并短路：这些文件出现在
/// skipped_files 中，且不占用 presigned_urls / document_ids 的位置。
/// 三个数组之间只有位置对应关系，对齐逻辑见 uploader::broker。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresignedBatchResponse {
    #[serde(rename = "presignedUrls", default)]
    pub presigned_urls: Vec<String>,

    #[serde(rename = "documentIds", default)]
    pub document_ids: Vec<String>,

    #[serde(rename = "skippedFiles", default)]
    pub skipped_files: Vec<String>,
}

/// 完成通知请求
#[derive(Debug, Clone, Serialize)]
pub struct CompleteRequest {
    #[serde(rename = "documentIds")]
    pub document_ids: Vec<String>,
}

/// 完成通知响应
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteResponse {
    /// 进入处理队列的文档数
    #[serde(default)]
    pub queued: u32,
}

/// 分片上传初始化请求
#[derive(Debug, Clone, Serialize)]
pub struct MultipartInitRequest {
    #[serde(rename = "fileName")]
    pub file_name: String,

    #[serde(rename = "fileSize")]
    pub file_size: u64,

    #[serde(rename = "mimeType")]
    pub mime_type: String,

    /// 内容 SHA-256，供服务端去重/续传匹配
    #[serde(rename = "contentHash", skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    #[serde(rename = "folderId", skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,

    /// 只为这些分片签发 URL（续传路径）；None 表示全部分片
    #[serde(rename = "partNumbers", skip_serializing_if = "Option::is_none")]
    pub part_numbers: Option<Vec<u32>>,
}

/// 分片上传初始化响应
#[derive(Debug, Clone, Deserialize)]
pub struct MultipartInitResponse {
    #[serde(rename = "documentId")]
    pub document_id: String,

    /// 存储端分片上传标识
    #[serde(rename = "uploadId")]
    pub upload_id: String,

    #[serde(rename = "storageKey")]
    pub storage_key: String,

    /// 与请求的分片一一对应的预签名 URL
    #[serde(rename = "presignedUrls")]
    pub presigned_urls: Vec<String>,

    #[serde(rename = "totalParts")]
    pub total_parts: u32,

    #[serde(rename = "chunkSize")]
    pub chunk_size: u64,
}

/// 已完成分片（完成调用要求按 part_number 升序）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedPart {
    #[serde(rename = "partNumber")]
    pub part_number: u32,

    /// 存储端返回的分片标签，原样回传
    pub tag: String,
}

/// 分片上传完成请求
#[derive(Debug, Clone, Serialize)]
pub struct MultipartCompleteRequest {
    #[serde(rename = "documentId")]
    pub document_id: String,

    #[serde(rename = "uploadId")]
    pub upload_id: String,

    #[serde(rename = "storageKey")]
    pub storage_key: String,

    pub parts: Vec<CompletedPart>,
}

/// 分片上传中止请求
#[derive(Debug, Clone, Serialize)]
pub struct MultipartAbortRequest {
    #[serde(rename = "documentId")]
    pub document_id: String,

    #[serde(rename = "uploadId")]
    pub upload_id: String,

    #[serde(rename = "storageKey")]
    pub storage_key: String,
}
