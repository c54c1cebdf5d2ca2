// 测试用内存实现
//
// 记录全部调用，按脚本注入失败；只在 cfg(test) 下编译。

use crate::api::types::*;
use crate::api::{MetadataApi, ObjectStorage};
use crate::error::ApiError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// 元数据服务的内存实现
#[derive(Default)]
pub struct MockApi {
    /// 当前存在的文件夹
    pub folders: Mutex<Vec<FolderInfo>>,
    folder_seq: AtomicU32,
    doc_seq: AtomicU32,

    // 调用记录
    pub create_folder_calls: Mutex<Vec<CreateFolderRequest>>,
    pub bulk_folder_calls: Mutex<Vec<BulkFolderRequest>>,
    pub presigned_requests: Mutex<Vec<PresignedBatchRequest>>,
    pub notify_calls: Mutex<Vec<Vec<String>>>,
    pub deleted_documents: Mutex<Vec<String>>,
    pub init_requests: Mutex<Vec<MultipartInitRequest>>,
    pub complete_requests: Mutex<Vec<MultipartCompleteRequest>>,
    pub abort_requests: Mutex<Vec<MultipartAbortRequest>>,

    // 脚本化行为
    /// 预签名批量请求中按文件名短路（服务端判定内容已存在）
    pub skip_file_names: Mutex<HashSet<String>>,
    /// notify_completion 的失败脚本，按队首顺序弹出
    pub notify_failures: Mutex<VecDeque<ApiError>>,
    /// init_multipart 返回的分片大小
    pub chunk_size: AtomicU64,
    /// 批量建目录直接失败
    pub fail_bulk_folders: Mutex<Option<ApiError>>,
}

impl MockApi {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.chunk_size.store(50 * 1024 * 1024, Ordering::SeqCst);
        mock
    }

    pub fn with_chunk_size(self, chunk_size: u64) -> Self {
        self.chunk_size.store(chunk_size, Ordering::SeqCst);
        self
    }

    pub fn skip_file(&self, name: &str) {
        self.skip_file_names.lock().insert(name.to_string());
    }

    pub fn push_notify_failure(&self, error: ApiError) {
        self.notify_failures.lock().push_back(error);
    }

    fn next_folder_id(&self) -> String {
        format!("folder-{}", self.folder_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn next_document_id(&self) -> String {
        format!("doc-{}", self.doc_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl MetadataApi for MockApi {
    async fn create_folder(&self, req: &CreateFolderRequest) -> Result<FolderInfo, ApiError> {
        self.create_folder_calls.lock().push(req.clone());

        let mut folders = self.folders.lock();
        if req.reuse_existing {
            if let Some(existing) = folders
                .iter()
                .find(|f| f.name == req.name && f.parent_folder_id == req.parent_folder_id)
            {
                return Ok(existing.clone());
            }
        }

        let folder = FolderInfo {
            id: self.next_folder_id(),
            name: req.name.clone(),
            parent_folder_id: req.parent_folder_id.clone(),
        };
        folders.push(folder.clone());
        Ok(folder)
    }

    async fn create_folder_tree(
        &self,
        req: &BulkFolderRequest,
    ) -> Result<BulkFolderResponse, ApiError> {
        self.bulk_folder_calls.lock().push(req.clone());

        if let Some(error) = self.fail_bulk_folders.lock().clone() {
            return Err(error);
        }

        let mut folders = self.folders.lock();
        let mut folder_map = HashMap::new();
        for node in &req.folder_tree {
            let id = self.next_folder_id();
            folders.push(FolderInfo {
                id: id.clone(),
                name: node.name.clone(),
                parent_folder_id: Some(req.parent_folder_id.clone()),
            });
            folder_map.insert(node.path.clone(), id);
        }

        Ok(BulkFolderResponse {
            count: folder_map.len() as u32,
            folder_map,
        })
    }

    async fn list_folders(&self) -> Result<Vec<FolderInfo>, ApiError> {
        Ok(self.folders.lock().clone())
    }

    async fn request_presigned_urls(
        &self,
        req: &PresignedBatchRequest,
    ) -> Result<PresignedBatchResponse, ApiError> {
        self.presigned_requests.lock().push(req.clone());

        let skip = self.skip_file_names.lock().clone();
        let mut resp = PresignedBatchResponse::default();
        for file in &req.files {
            if skip.contains(&file.file_name) {
                resp.skipped_files.push(file.file_name.clone());
            } else {
                resp.presigned_urls
                    .push(format!("https://storage.test/put/{}", file.file_name));
                resp.document_ids.push(self.next_document_id());
            }
        }
        Ok(resp)
    }

    async fn notify_completion(&self, document_ids: &[String]) -> Result<u32, ApiError> {
        self.notify_calls.lock().push(document_ids.to_vec());

        if let Some(error) = self.notify_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(document_ids.len() as u32)
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), ApiError> {
        self.deleted_documents.lock().push(document_id.to_string());
        Ok(())
    }

    async fn init_multipart(
        &self,
        req: &MultipartInitRequest,
    ) -> Result<MultipartInitResponse, ApiError> {
        self.init_requests.lock().push(req.clone());

        let chunk_size = self.chunk_size.load(Ordering::SeqCst);
        let total_parts = ((req.file_size + chunk_size - 1) / chunk_size).max(1) as u32;

        let part_numbers: Vec<u32> = match &req.part_numbers {
            Some(parts) => parts.clone(),
            None => (1..=total_parts).collect(),
        };
        let presigned_urls = part_numbers
            .iter()
            .map(|n| format!("https://storage.test/part/{}/{}", req.file_name, n))
            .collect();

        Ok(MultipartInitResponse {
            document_id: self.next_document_id(),
            upload_id: format!("mp-{}", req.file_name),
            storage_key: format!("store/{}", req.file_name),
            presigned_urls,
            total_parts,
            chunk_size,
        })
    }

    async fn complete_multipart(&self, req: &MultipartCompleteRequest) -> Result<(), ApiError> {
        self.complete_requests.lock().push(req.clone());
        Ok(())
    }

    async fn abort_multipart(&self, req: &MultipartAbortRequest) -> Result<(), ApiError> {
        self.abort_requests.lock().push(req.clone());
        Ok(())
    }
}

/// 对象存储的内存实现
#[derive(Default)]
pub struct MockStorage {
    /// 成功 PUT 的 URL 记录
    pub puts: Mutex<Vec<String>>,
    /// URL 子串 → 剩余失败次数（u32::MAX 表示一直失败）
    pub fail_substrings: Mutex<HashMap<String, u32>>,
    /// 每次 PUT 的人为延迟（用于并发测试）
    pub put_delay: Mutex<Option<Duration>>,
    etag_seq: AtomicU32,
    inflight: AtomicUsize,
    /// 观测到的最大同时在途 PUT 数
    pub peak_inflight: AtomicUsize,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 匹配 URL 子串的前 count 次 PUT 失败
    pub fn fail_times(&self, substring: &str, count: u32) {
        self.fail_substrings
            .lock()
            .insert(substring.to_string(), count);
    }

    /// 匹配 URL 子串的 PUT 永远失败
    pub fn fail_always(&self, substring: &str) {
        self.fail_times(substring, u32::MAX);
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().len()
    }
}

#[async_trait]
impl ObjectStorage for MockStorage {
    async fn put_object(
        &self,
        url: &str,
        _content_type: &str,
        _body: Vec<u8>,
    ) -> Result<Option<String>, ApiError> {
        let current = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_inflight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.put_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = {
            let mut fails = self.fail_substrings.lock();
            let mut hit = false;
            for (substring, remaining) in fails.iter_mut() {
                if url.contains(substring.as_str()) && *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    hit = true;
                    break;
                }
            }
            hit
        };

        self.inflight.fetch_sub(1, Ordering::SeqCst);

        if should_fail {
            return Err(ApiError::network(format!("模拟网络失败: {}", url)));
        }

        self.puts.lock().push(url.to_string());
        let n = self.etag_seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(format!("\"etag-{}\"", n)))
    }
}
