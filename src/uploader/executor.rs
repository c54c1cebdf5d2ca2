// 传输执行器
//
// 把字节送进对象存储。两条路径：
// - 标准路径：整文件单次 PUT，重试耗尽后回滚占位记录
// - 分片路径：先落盘会话再传输，分片逐个重试，失败保留会话可续传
//
// 并发模型：文件按固定大小分批，批次之间不互相等待、全部立即入场；
// 全局同时在途的传输数量由信号量封顶。信号量挂在执行器上，
// 跨调用共享同一个上限。

use crate::api::types::{MultipartAbortRequest, MultipartCompleteRequest, MultipartInitRequest};
use crate::api::{MetadataApi, ObjectStorage};
use crate::config::UploadConfig;
use crate::error::{ApiError, UploadError};
use crate::handle::FileHandle;
use crate::retry::RetryPolicy;
use crate::session::{MultipartSession, SessionStore};
use crate::uploader::events::{ProgressSender, UploadStage};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 标准路径的单文件传输项
#[derive(Debug, Clone)]
pub struct TransferItem {
    pub handle: FileHandle,
    /// 占位记录 id
    pub document_id: String,
    /// 预签名写 URL
    pub url: String,
}

/// 传输计划；按文件大小与阈值的路由由编排器完成
pub enum PlannedTransfer {
    /// 单次 PUT
    Standard(TransferItem),
    /// 分片上传；resume 非空时续传已有会话
    Multipart {
        handle: FileHandle,
        folder_id: Option<String>,
        hash: String,
        resume: Option<MultipartSession>,
    },
}

impl PlannedTransfer {
    fn file_name(&self) -> &str {
        match self {
            PlannedTransfer::Standard(item) => &item.handle.name,
            PlannedTransfer::Multipart { handle, .. } => &handle.name,
        }
    }
}

/// 单文件失败记录
#[derive(Debug)]
pub struct FileFailure {
    pub file_name: String,
    pub error: UploadError,
}

/// 传输结果汇总
#[derive(Debug, Default)]
pub struct TransferReport {
    /// 成功文件的占位记录 id
    pub succeeded: Vec<String>,
    pub failures: Vec<FileFailure>,
}

/// 传输执行器
#[derive(Clone)]
pub struct TransferExecutor {
    api: Arc<dyn MetadataApi>,
    storage: Arc<dyn ObjectStorage>,
    store: Arc<SessionStore>,
    retry: RetryPolicy,
    batch_size: usize,
    /// 全局在途传输上限
    semaphore: Arc<Semaphore>,
}

impl TransferExecutor {
    pub fn new(
        api: Arc<dyn MetadataApi>,
        storage: Arc<dyn ObjectStorage>,
        store: Arc<SessionStore>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            api,
            storage,
            store,
            retry: config.retry_policy(),
            batch_size: config.batch_size.max(1),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_transfers.max(1))),
        }
    }

    /// 执行一组传输
    ///
    /// 单文件失败互不影响；进度按完成文件数在 pct_range 区间内插值。
    pub async fn run(
        &self,
        transfers: Vec<PlannedTransfer>,
        cancel: &CancellationToken,
        progress: &ProgressSender,
        pct_range: (u8, u8),
    ) -> TransferReport {
        let total = transfers.len();
        if total == 0 {
            return TransferReport::default();
        }

        // 固定大小分批
        let mut batches: Vec<Vec<PlannedTransfer>> = Vec::new();
        let mut current = Vec::with_capacity(self.batch_size);
        for transfer in transfers {
            current.push(transfer);
            if current.len() == self.batch_size {
                batches.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }

        info!(
            "开始传输: {} 个文件, {} 个批次, 在途上限 {}",
            total,
            batches.len(),
            self.semaphore.available_permits()
        );

        let mut join_set: JoinSet<(String, Result<String, UploadError>)> = JoinSet::new();

        // 所有批次立即入场，不等待前一批结束
        for (batch_index, batch) in batches.into_iter().enumerate() {
            debug!("批次 {} 入场: {} 个文件", batch_index, batch.len());
            for transfer in batch {
                let executor = self.clone();
                let cancel = cancel.clone();
                join_set.spawn(async move {
                    let file_name = transfer.file_name().to_string();

                    // 取消后不再开始新传输
                    if cancel.is_cancelled() {
                        return (file_name, Err(UploadError::Cancelled));
                    }

                    let permit = match executor.semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return (file_name, Err(UploadError::Cancelled)),
                    };

                    let result = tokio::select! {
                        _ = cancel.cancelled() => Err(UploadError::Cancelled),
                        result = executor.transfer_one(transfer, &cancel) => result,
                    };

                    drop(permit);
                    (file_name, result)
                });
            }
        }

        let mut report = TransferReport::default();
        let mut finished = 0usize;
        let (pct_from, pct_to) = pct_range;

        while let Some(joined) = join_set.join_next().await {
            let (file_name, result) = match joined {
                Ok(value) => value,
                Err(e) => {
                    error!("传输任务异常: {}", e);
                    continue;
                }
            };

            finished += 1;
            let span = pct_to.saturating_sub(pct_from) as usize;
            let pct = pct_from + ((span * finished) / total) as u8;
            progress.emit(
                UploadStage::Transferring,
                pct,
                format!("已处理 {}/{} 个文件", finished, total),
            );

            match result {
                Ok(document_id) => report.succeeded.push(document_id),
                Err(error) => {
                    warn!("文件传输失败: {}: {}", file_name, error);
                    report.failures.push(FileFailure { file_name, error });
                }
            }
        }

        info!(
            "传输结束: 成功 {} 个, 失败 {} 个",
            report.succeeded.len(),
            report.failures.len()
        );
        report
    }

    async fn transfer_one(
        &self,
        transfer: PlannedTransfer,
        cancel: &CancellationToken,
    ) -> Result<String, UploadError> {
        match transfer {
            PlannedTransfer::Standard(item) => self.transfer_standard(item).await,
            PlannedTransfer::Multipart {
                handle,
                folder_id,
                hash,
                resume,
            } => {
                self.transfer_multipart(handle, folder_id, hash, resume, cancel)
                    .await
            }
        }
    }

    /// 标准路径：整文件单次 PUT
    async fn transfer_standard(&self, item: TransferItem) -> Result<String, UploadError> {
        let TransferItem {
            handle,
            document_id,
            url,
        } = item;

        debug!("单次 PUT: {} ({} bytes)", handle.name, handle.size);

        let body = match handle.read_all().await {
            Ok(body) => body,
            Err(e) => {
                // 本地读取失败，占位记录同样不能留下
                self.rollback_placeholder(&handle.name, &document_id).await;
                return Err(UploadError::Io(e));
            }
        };

        let storage = self.storage.clone();
        let content_type = handle.mime_type.clone();
        let put_result = self
            .retry
            .run("文件上传", || {
                let storage = storage.clone();
                let url = url.clone();
                let content_type = content_type.clone();
                let body = body.clone();
                async move { storage.put_object(&url, &content_type, body).await }
            })
            .await;

        match put_result {
            Ok(_) => {
                debug!("上传成功: {}", handle.name);
                Ok(document_id)
            }
            Err(source) => {
                // 重试耗尽：先回滚占位记录，再上报失败，避免元数据指向不存在的字节
                self.rollback_placeholder(&handle.name, &document_id).await;
                Err(UploadError::Transfer {
                    file_name: handle.name,
                    source,
                })
            }
        }
    }

    /// 删除占位记录；回滚失败只告警
    async fn rollback_placeholder(&self, file_name: &str, document_id: &str) {
        match self.api.delete_document(document_id).await {
            Ok(()) => info!("已回滚占位记录: {} (doc={})", file_name, document_id),
            Err(e) => warn!(
                "占位记录回滚失败: {} (doc={}): {}",
                file_name, document_id, e
            ),
        }
    }

    /// 分片路径
    async fn transfer_multipart(
        &self,
        handle: FileHandle,
        folder_id: Option<String>,
        hash: String,
        resume: Option<MultipartSession>,
        cancel: &CancellationToken,
    ) -> Result<String, UploadError> {
        let (mut session, part_urls) = match resume {
            None => self.init_fresh_session(&handle, folder_id, &hash).await?,
            Some(session) => self.refresh_session_urls(&handle, session).await?,
        };

        // 逐分片上传；单会话内的状态更新串行应用
        for (part_number, url) in part_urls {
            if cancel.is_cancelled() {
                // 已写入的字节不回滚，会话保留可续传
                return Err(UploadError::Cancelled);
            }

            let range = session.part_range(part_number).ok_or_else(|| {
                UploadError::Api(ApiError::protocol(format!("分片序号越界: {}", part_number)))
            })?;
            let data = handle.read_range(range).await?;

            let label = format!("分片上传 {}#{}", handle.name, part_number);
            let storage = self.storage.clone();
            let content_type = handle.mime_type.clone();
            let put_result = self
                .retry
                .run(&label, || {
                    let storage = storage.clone();
                    let url = url.clone();
                    let content_type = content_type.clone();
                    let data = data.clone();
                    async move { storage.put_object(&url, &content_type, data).await }
                })
                .await;

            let outcome = match put_result {
                Ok(Some(tag)) => Ok(tag),
                Ok(None) => Err(ApiError::protocol("存储端未返回分片标签")),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(tag) => {
                    session.mark_part_uploaded(part_number, tag);
                    self.store.save(&session)?;
                    debug!(
                        "分片#{} 完成: {} 进度 {:.1}%",
                        part_number,
                        handle.name,
                        session.progress * 100.0
                    );
                }
                Err(source) => {
                    // 会话保留供续传；尽力中止存储端分片上传
                    self.abort_storage_upload(&session).await;
                    return Err(UploadError::PartTransfer {
                        file_name: handle.name.clone(),
                        part_number,
                        session_id: session.session_id.clone(),
                        source,
                    });
                }
            }
        }

        // 全部分片完成：按分片序号升序提交，存储端校验依赖该顺序
        let parts = session.completion_parts().ok_or_else(|| {
            UploadError::Api(ApiError::protocol("存在缺少标签的分片，无法完成"))
        })?;
        let complete_req = MultipartCompleteRequest {
            document_id: session.document_id.clone(),
            upload_id: session.storage_upload_id.clone(),
            storage_key: session.storage_key.clone(),
            parts,
        };

        let api = self.api.clone();
        let complete_result = self
            .retry
            .run("分片合并", || {
                let api = api.clone();
                let request = complete_req.clone();
                async move { api.complete_multipart(&request).await }
            })
            .await;
        if let Err(source) = complete_result {
            // 字节都已入库，保留会话供稍后重试合并
            return Err(UploadError::Transfer {
                file_name: handle.name.clone(),
                source,
            });
        }

        // 成功后删除会话
        self.store.delete(&session.session_id)?;
        info!(
            "分片上传完成: {} ({} 个分片)",
            handle.name,
            session.parts.len()
        );
        Ok(session.document_id.clone())
    }

    /// 初始化新会话；任何字节传输之前先落盘
    async fn init_fresh_session(
        &self,
        handle: &FileHandle,
        folder_id: Option<String>,
        hash: &str,
    ) -> Result<(MultipartSession, Vec<(u32, String)>), UploadError> {
        let request = MultipartInitRequest {
            file_name: handle.name.clone(),
            file_size: handle.size,
            mime_type: handle.mime_type.clone(),
            content_hash: Some(hash.to_string()),
            folder_id: folder_id.clone(),
            part_numbers: None,
        };

        let response = self
            .api
            .init_multipart(&request)
            .await
            .map_err(|source| UploadError::Transfer {
                file_name: handle.name.clone(),
                source,
            })?;

        if response.presigned_urls.len() != response.total_parts as usize {
            return Err(UploadError::Transfer {
                file_name: handle.name.clone(),
                source: ApiError::protocol(format!(
                    "预签名 URL 数量与分片数不一致: {} / {}",
                    response.presigned_urls.len(),
                    response.total_parts
                )),
            });
        }

        let session = MultipartSession::create(
            &handle.name,
            handle.size,
            hash,
            &handle.mime_type,
            folder_id,
            &response,
        );
        self.store.save(&session)?;

        info!(
            "分片会话已创建: {} ({} 个分片, 每片 {} bytes)",
            session.session_id, response.total_parts, response.chunk_size
        );

        let urls = (1..=response.total_parts)
            .zip(response.presigned_urls.into_iter())
            .collect();
        Ok((session, urls))
    }

    /// 续传：只为未完成分片申请新 URL
    async fn refresh_session_urls(
        &self,
        handle: &FileHandle,
        session: MultipartSession,
    ) -> Result<(MultipartSession, Vec<(u32, String)>), UploadError> {
        let pending = session.pending_parts();
        if pending.is_empty() {
            // 分片都在，只差合并调用
            return Ok((session, Vec::new()));
        }

        let request = MultipartInitRequest {
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            mime_type: session.mime_type.clone(),
            content_hash: Some(session.hash.clone()),
            folder_id: session.folder_id.clone(),
            part_numbers: Some(pending.clone()),
        };

        let response = self
            .api
            .init_multipart(&request)
            .await
            .map_err(|source| UploadError::PartTransfer {
                file_name: handle.name.clone(),
                part_number: pending[0],
                session_id: session.session_id.clone(),
                source,
            })?;

        if response.presigned_urls.len() != pending.len() {
            return Err(UploadError::Transfer {
                file_name: handle.name.clone(),
                source: ApiError::protocol(format!(
                    "续传 URL 数量不一致: 申请 {} 个, 返回 {} 个",
                    pending.len(),
                    response.presigned_urls.len()
                )),
            });
        }

        info!(
            "会话续传: {} 还剩 {} 个分片",
            session.session_id,
            pending.len()
        );
        let urls = pending
            .into_iter()
            .zip(response.presigned_urls.into_iter())
            .collect();
        Ok((session, urls))
    }

    /// 尽力中止存储端分片上传；失败只记录，不影响错误上报
    async fn abort_storage_upload(&self, session: &MultipartSession) {
        let request = MultipartAbortRequest {
            document_id: session.document_id.clone(),
            upload_id: session.storage_upload_id.clone(),
            storage_key: session.storage_key.clone(),
        };
        if let Err(e) = self.api.abort_multipart(&request).await {
            warn!("存储端分片上传中止失败（忽略）: {}", e);
        }
    }
}
