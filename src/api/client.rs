// 元数据服务 HTTP 客户端实现

use crate::api::types::*;
use crate::api::{MetadataApi, ObjectStorage};
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, ETAG};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// DocVault 元数据服务客户端
///
/// 所有请求携带 Bearer 凭证；凭证由宿主应用的认证层提供。
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// HTTP 客户端
    client: Client,
    /// 服务地址（不含尾部斜杠）
    base_url: String,
    /// Bearer 凭证
    bearer_token: String,
}

impl ApiClient {
    /// 创建客户端
    ///
    /// # 参数
    /// * `base_url` - 元数据服务地址
    /// * `bearer_token` - 认证凭证
    /// * `timeout` - 每次请求的超时；超时按网络错误分类（可重试）
    pub fn new(
        base_url: impl Into<String>,
        bearer_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(format!("HTTP 客户端初始化失败: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("元数据服务客户端初始化完成: {}", base_url);

        Ok(Self {
            client,
            base_url,
            bearer_token: bearer_token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!("POST {}", path);
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.bearer_token)
            .json(body)
            .send()
            .await?;
        Self::decode(path, response).await
    }

    async fn get_json<R>(&self, path: &str) -> Result<R, ApiError>
    where
        R: DeserializeOwned,
    {
        debug!("GET {}", path);
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        Self::decode(path, response).await
    }

    /// 统一响应解码：非 2xx 带响应体分类报错，2xx 解析 JSON
    async fn decode<R>(path: &str, response: Response) -> Result<R, ApiError>
    where
        R: DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            warn!("{} 返回 {}: {}", path, status, preview);
            return Err(ApiError::status(status.as_u16(), preview));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ApiError::protocol(format!("{} 响应解析失败: {}", path, e)))
    }
}

#[async_trait]
impl MetadataApi for ApiClient {
    async fn create_folder(&self, req: &CreateFolderRequest) -> Result<FolderInfo, ApiError> {
        let resp: CreateFolderResponse = self.post_json("/folders", req).await?;
        Ok(resp.folder)
    }

    async fn create_folder_tree(
        &self,
        req: &BulkFolderRequest,
    ) -> Result<BulkFolderResponse, ApiError> {
        self.post_json("/folders/bulk", req).await
    }

    async fn list_folders(&self) -> Result<Vec<FolderInfo>, ApiError> {
        let resp: FolderListResponse = self.get_json("/folders?includeAll=true").await?;
        Ok(resp.folders)
    }

    async fn request_presigned_urls(
        &self,
        req: &PresignedBatchRequest,
    ) -> Result<PresignedBatchResponse, ApiError> {
        self.post_json("/presigned-urls/bulk", req).await
    }

    async fn notify_completion(&self, document_ids: &[String]) -> Result<u32, ApiError> {
        let req = CompleteRequest {
            document_ids: document_ids.to_vec(),
        };
        let resp: CompleteResponse = self.post_json("/presigned-urls/complete", &req).await?;
        Ok(resp.queued)
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), ApiError> {
        let path = format!("/documents/{}", document_id);
        debug!("DELETE {}", path);
        let response = self
            .client
            .delete(self.url(&path))
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::status(status.as_u16(), body));
        }
        Ok(())
    }

    async fn init_multipart(
        &self,
        req: &MultipartInitRequest,
    ) -> Result<MultipartInitResponse, ApiError> {
        self.post_json("/multipart-upload/init", req).await
    }

    async fn complete_multipart(&self, req: &MultipartCompleteRequest) -> Result<(), ApiError> {
        // 响应体内容不重要，只关心状态码
        let _: serde_json::Value = self.post_json("/multipart-upload/complete", req).await?;
        Ok(())
    }

    async fn abort_multipart(&self, req: &MultipartAbortRequest) -> Result<(), ApiError> {
        let _: serde_json::Value = self.post_json("/multipart-upload/abort", req).await?;
        Ok(())
    }
}

/// 对象存储直传客户端
///
/// 预签名 URL 自带授权，不附加 Bearer 头。
#[derive(Debug, Clone)]
pub struct StorageClient {
    client: Client,
}

impl StorageClient {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(format!("HTTP 客户端初始化失败: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStorage for StorageClient {
    async fn put_object(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<Option<String>, ApiError> {
        let size = body.len();
        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(200).collect();
            return Err(ApiError::status(status.as_u16(), preview));
        }

        // 分片完成调用要求原样回传存储端标签，这里不做任何规整
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        debug!("PUT 完成: {} bytes, etag={:?}", size, etag);
        Ok(etag)
    }
}
