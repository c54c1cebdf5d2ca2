// 上传编排
//
// 按调用串联各组件：过滤 → 分析 → 建目录 → 预签名 → 传输 → 完成通知。
// 状态推进伴随进度事件，同一调用内百分比单调不减；进度流一定以
// complete（带计数）或 error（带消息）收尾，部分成功总是可表达的。
//
// 校验/建目录失败中止整个调用；单文件、单分片失败被隔离进聚合结果。
// 进行中的调用登记在编排器自己的注册表里，没有全局共享状态。

use crate::api::{MetadataApi, ObjectStorage};
use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::filter::{FileFilter, SkippedFile};
use crate::handle::FileHandle;
use crate::hashing::ContentHasher;
use crate::session::{MultipartSession, SessionStore};
use crate::structure::{self, FileEntry};
use crate::uploader::broker::UrlBroker;
use crate::uploader::events::{ProgressEvent, ProgressSender, UploadStage};
use crate::uploader::executor::{
    FileFailure, PlannedTransfer, TransferExecutor, TransferItem, TransferReport,
};
use crate::uploader::notifier::CompletionNotifier;
use crate::uploader::provisioner::FolderProvisioner;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// 传输阶段在进度条上占据的区间
const TRANSFER_PCT: (u8, u8) = (15, 90);

/// 进行中调用的注册表项
struct ActiveCall {
    cancel: CancellationToken,
    #[allow(dead_code)]
    started_at: DateTime<Utc>,
}

/// 一次调用的聚合结果
#[derive(Debug)]
pub struct UploadReport {
    /// 调用 id（注册表键，进度事件首条的 detail 也携带）
    pub call_id: String,
    /// 成功文件数（含服务端判定已存在而跳过的）
    pub success_count: usize,
    /// 失败文件数
    pub failure_count: usize,
    /// 服务端判定已存在而跳过的文件名
    pub skipped: Vec<String>,
    /// 过滤阶段剔除的文件及原因
    pub filtered: Vec<SkippedFile>,
    /// 逐文件失败明细
    pub failures: Vec<FileFailure>,
    /// 完成通知后进入处理队列的文档数
    pub queued: u32,
}

/// 上传编排器
pub struct UploadOrchestrator {
    config: UploadConfig,
    store: Arc<SessionStore>,
    filter: FileFilter,
    hasher: ContentHasher,
    broker: UrlBroker,
    provisioner: FolderProvisioner,
    executor: TransferExecutor,
    notifier: CompletionNotifier,
    progress: ProgressSender,
    /// 进行中调用注册表
    active: DashMap<String, ActiveCall>,
}

impl UploadOrchestrator {
    /// 用注入的服务实现构造（测试与自定义传输层）
    pub fn new(
        api: Arc<dyn MetadataApi>,
        storage: Arc<dyn ObjectStorage>,
        config: UploadConfig,
    ) -> Result<Self, UploadError> {
        config.validate()?;

        let filter = FileFilter::from_config(&config)?;
        let store = Arc::new(SessionStore::new(&config.session_dir));
        let retry = config.retry_policy();

        Ok(Self {
            filter,
            hasher: ContentHasher::new(config.hash_timeout()),
            broker: UrlBroker::new(api.clone()),
            provisioner: FolderProvisioner::new(api.clone()),
            executor: TransferExecutor::new(api.clone(), storage, store.clone(), &config),
            notifier: CompletionNotifier::new(api, retry),
            store,
            config,
            progress: ProgressSender::disabled(),
            active: DashMap::new(),
        })
    }

    /// 用真实 HTTP 客户端构造
    ///
    /// # 参数
    /// * `config` - 引擎配置
    /// * `bearer_token` - 认证层提供的凭证
    pub fn connect(
        config: UploadConfig,
        bearer_token: impl Into<String>,
    ) -> Result<Self, UploadError> {
        let timeout = config.request_timeout();
        let api = Arc::new(crate::api::ApiClient::new(
            &config.api_base_url,
            bearer_token,
            timeout,
        )?);
        let storage = Arc::new(crate::api::StorageClient::new(timeout)?);
        Self::new(api, storage, config)
    }

    /// 订阅进度事件；替换之前的订阅
    pub fn progress_channel(&mut self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (sender, receiver) = ProgressSender::channel();
        self.progress = sender;
        receiver
    }

    /// 会话存储（续传提示 UX 用）
    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    /// 所有可续传会话，最新优先
    pub fn pending_sessions(&self) -> Vec<MultipartSession> {
        self.store.list_pending()
    }

    /// 按身份查找可续传会话
    pub fn find_resumable(
        &self,
        file_name: &str,
        file_size: u64,
        folder_id: Option<&str>,
    ) -> Option<MultipartSession> {
        self.store.find_by_identity(file_name, file_size, folder_id)
    }

    /// 取消一个进行中的调用
    ///
    /// 在途请求中断、新批次停止；已写入存储的字节不回滚，
    /// 分片会话保持可续传。
    pub fn cancel(&self, call_id: &str) -> bool {
        match self.active.get(call_id) {
            Some(entry) => {
                entry.cancel.cancel();
                info!("调用已请求取消: {}", call_id);
                true
            }
            None => false,
        }
    }

    /// 取消全部进行中的调用
    pub fn cancel_all(&self) {
        for entry in self.active.iter() {
            entry.cancel.cancel();
        }
    }

    /// 进行中的调用 id 列表
    pub fn active_calls(&self) -> Vec<String> {
        self.active.iter().map(|e| e.key().clone()).collect()
    }

    // =====================================================
    // 调用入口
    // =====================================================

    /// 上传单个文件
    pub async fn upload_file(
        &self,
        handle: FileHandle,
        folder_id: Option<String>,
    ) -> Result<UploadReport, UploadError> {
        self.upload_files(vec![handle], folder_id).await
    }

    /// 上传一组文件到同一目录（不涉及目录创建）
    pub async fn upload_files(
        &self,
        handles: Vec<FileHandle>,
        folder_id: Option<String>,
    ) -> Result<UploadReport, UploadError> {
        let (call_id, cancel, progress) = self.begin_call();
        let result = self
            .run_flat(&call_id, &cancel, &progress, handles, folder_id)
            .await;
        self.finish_call(&call_id, &progress, &result);
        result
    }

    /// 上传整个文件夹，保留目录结构
    ///
    /// # 参数
    /// * `handles` - 带层级路径的文件句柄，共享同一个根段
    /// * `parent_folder_id` - None 表示新建根级分类；Some 表示挂在已有目录下
    pub async fn upload_folder(
        &self,
        handles: Vec<FileHandle>,
        parent_folder_id: Option<String>,
    ) -> Result<UploadReport, UploadError> {
        let (call_id, cancel, progress) = self.begin_call();
        let result = self
            .run_folder(&call_id, &cancel, &progress, handles, parent_folder_id)
            .await;
        self.finish_call(&call_id, &progress, &result);
        result
    }

    /// 续传一个持久化会话
    ///
    /// 调用方重新提供文件句柄（字节来源不持久化），身份必须与会话匹配。
    pub async fn resume_session(
        &self,
        handle: FileHandle,
        session_id: &str,
    ) -> Result<UploadReport, UploadError> {
        let (call_id, cancel, progress) = self.begin_call();
        let result = self
            .run_resume(&call_id, &cancel, &progress, handle, session_id)
            .await;
        self.finish_call(&call_id, &progress, &result);
        result
    }

    // =====================================================
    // 调用生命周期
    // =====================================================

    fn begin_call(&self) -> (String, CancellationToken, ProgressSender) {
        let call_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        self.active.insert(
            call_id.clone(),
            ActiveCall {
                cancel: cancel.clone(),
                started_at: Utc::now(),
            },
        );
        (call_id, cancel, self.progress.fork())
    }

    fn finish_call(
        &self,
        call_id: &str,
        progress: &ProgressSender,
        result: &Result<UploadReport, UploadError>,
    ) {
        self.active.remove(call_id);
        match result {
            Ok(report) => progress.emit(
                UploadStage::Complete,
                100,
                format!(
                    "上传完成: 成功 {} 个, 失败 {} 个",
                    report.success_count, report.failure_count
                ),
            ),
            Err(e) => progress.emit(UploadStage::Error, 0, format!("上传失败: {}", e)),
        }
    }

    // =====================================================
    // 调用实现
    // =====================================================

    /// 平铺上传：所有文件进同一个目录
    async fn run_flat(
        &self,
        call_id: &str,
        cancel: &CancellationToken,
        progress: &ProgressSender,
        handles: Vec<FileHandle>,
        folder_id: Option<String>,
    ) -> Result<UploadReport, UploadError> {
        if handles.is_empty() {
            return Err(UploadError::Validation("文件列表为空".to_string()));
        }

        progress.emit_detail(
            UploadStage::Filtering,
            2,
            format!("过滤 {} 个文件", handles.len()),
            Some(call_id.to_string()),
        );
        let outcome = self.filter.apply(handles);
        if outcome.valid.is_empty() {
            // 全部被过滤也算调用完成，结果里带着每个文件的剔除原因
            return Ok(UploadReport {
                call_id: call_id.to_string(),
                success_count: 0,
                failure_count: 0,
                skipped: Vec::new(),
                filtered: outcome.skipped,
                failures: Vec::new(),
                queued: 0,
            });
        }

        let entries: Vec<FileEntry> = outcome
            .valid
            .iter()
            .map(|handle| FileEntry {
                full_path: handle.name.clone(),
                relative_path: handle.name.clone(),
                file_name: handle.name.clone(),
                depth: 0,
                folder_path: None,
                handle: handle.clone(),
            })
            .collect();

        self.transfer_and_notify(
            call_id,
            cancel,
            progress,
            entries,
            &HashMap::new(),
            folder_id,
            outcome.skipped,
        )
        .await
    }

    /// 文件夹上传：分析结构、创建目录、保留层级
    async fn run_folder(
        &self,
        call_id: &str,
        cancel: &CancellationToken,
        progress: &ProgressSender,
        handles: Vec<FileHandle>,
        parent_folder_id: Option<String>,
    ) -> Result<UploadReport, UploadError> {
        if handles.is_empty() {
            return Err(UploadError::Validation("文件列表为空".to_string()));
        }

        progress.emit_detail(
            UploadStage::Filtering,
            2,
            format!("过滤 {} 个文件", handles.len()),
            Some(call_id.to_string()),
        );
        let outcome = self.filter.apply(handles);
        if outcome.valid.is_empty() {
            return Ok(UploadReport {
                call_id: call_id.to_string(),
                success_count: 0,
                failure_count: 0,
                skipped: Vec::new(),
                filtered: outcome.skipped,
                failures: Vec::new(),
                queued: 0,
            });
        }

        progress.emit(UploadStage::Analyzing, 5, "分析目录结构");
        let structure = structure::analyze(outcome.valid)?;

        // 新建根级分类与挂在已有目录下走同样的创建逻辑，只是父级不同
        progress.emit(
            UploadStage::Provisioning,
            10,
            format!("创建目录: {}", structure.root_name),
        );
        let root = self
            .provisioner
            .ensure_category(&structure.root_name, parent_folder_id.as_deref())
            .await?;
        let folder_map = self
            .provisioner
            .create_subtree(&structure.folders, &root.id)
            .await?;

        self.transfer_and_notify(
            call_id,
            cancel,
            progress,
            structure.entries,
            &folder_map,
            Some(root.id),
            outcome.skipped,
        )
        .await
    }

    /// 预签名、传输、完成通知的公共尾段
    #[allow(clippy::too_many_arguments)]
    async fn transfer_and_notify(
        &self,
        call_id: &str,
        cancel: &CancellationToken,
        progress: &ProgressSender,
        entries: Vec<FileEntry>,
        folder_map: &HashMap<String, String>,
        root_folder_id: Option<String>,
        filtered: Vec<SkippedFile>,
    ) -> Result<UploadReport, UploadError> {
        // 按阈值路由：超过阈值的文件走分片路径
        let threshold = self.config.multipart_threshold_bytes;
        let (multipart_entries, standard_entries): (Vec<FileEntry>, Vec<FileEntry>) =
            entries.into_iter().partition(|e| e.handle.size > threshold);

        progress.emit(
            UploadStage::RequestingUrls,
            15,
            format!("申请 {} 个预签名 URL", standard_entries.len()),
        );
        let broker_result = self
            .broker
            .bulk_request(&standard_entries, folder_map, root_folder_id.as_deref())
            .await?;

        let mut plans: Vec<PlannedTransfer> = Vec::new();
        let mut failures: Vec<FileFailure> = Vec::new();

        for grant in broker_result.grants {
            let entry = &standard_entries[grant.entry_index];
            plans.push(PlannedTransfer::Standard(TransferItem {
                handle: entry.handle.clone(),
                document_id: grant.document_id,
                url: grant.url,
            }));
        }

        // 大文件：先算内容哈希（阻塞线程池、独立超时、顺序执行），
        // 哈希失败的文件在任何网络调用之前出局
        for entry in &multipart_entries {
            let folder_id = match &entry.folder_path {
                Some(path) => match folder_map.get(path) {
                    Some(id) => Some(id.clone()),
                    None => {
                        failures.push(FileFailure {
                            file_name: entry.file_name.clone(),
                            error: UploadError::Api(crate::error::ApiError::protocol(format!(
                                "目录映射缺失: {}",
                                path
                            ))),
                        });
                        continue;
                    }
                },
                None => root_folder_id.clone(),
            };

            match self.hasher.hash(&entry.handle).await {
                Ok(hash) => {
                    // 同身份且内容未变的会话可续传
                    let resume = self
                        .store
                        .find_by_identity(
                            &entry.file_name,
                            entry.handle.size,
                            folder_id.as_deref(),
                        )
                        .filter(|s| s.hash == hash);
                    if let Some(session) = &resume {
                        info!(
                            "发现可续传会话: {} ({}/{} 分片已完成)",
                            entry.file_name,
                            session.parts.iter().filter(|p| p.uploaded).count(),
                            session.parts.len()
                        );
                    }
                    plans.push(PlannedTransfer::Multipart {
                        handle: entry.handle.clone(),
                        folder_id,
                        hash,
                        resume,
                    });
                }
                Err(error) => {
                    warn!("哈希计算失败，文件出局: {}: {}", entry.file_name, error);
                    failures.push(FileFailure {
                        file_name: entry.file_name.clone(),
                        error,
                    });
                }
            }
        }

        let transfer_report = self.executor.run(plans, cancel, progress, TRANSFER_PCT).await;
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let TransferReport {
            succeeded,
            failures: transfer_failures,
        } = transfer_report;
        failures.extend(transfer_failures);

        progress.emit(
            UploadStage::Notifying,
            95,
            format!("通知服务端 {} 个文档", succeeded.len()),
        );
        let queued = self.notifier.notify(&succeeded).await?;

        Ok(UploadReport {
            call_id: call_id.to_string(),
            success_count: succeeded.len() + broker_result.skipped.len(),
            failure_count: failures.len(),
            skipped: broker_result.skipped,
            filtered,
            failures,
            queued,
        })
    }

    /// 续传一个会话到完成并通知
    async fn run_resume(
        &self,
        call_id: &str,
        cancel: &CancellationToken,
        progress: &ProgressSender,
        handle: FileHandle,
        session_id: &str,
    ) -> Result<UploadReport, UploadError> {
        let session = self
            .store
            .load(session_id)
            .ok_or_else(|| UploadError::SessionNotFound(session_id.to_string()))?;

        if session.file_name != handle.name || session.file_size != handle.size {
            return Err(UploadError::Validation(format!(
                "文件与会话身份不匹配: {} ({} bytes)",
                handle.name, handle.size
            )));
        }

        progress.emit_detail(
            UploadStage::Transferring,
            TRANSFER_PCT.0,
            format!(
                "续传: {} ({} 个分片待传)",
                session.file_name,
                session.pending_parts().len()
            ),
            Some(call_id.to_string()),
        );

        let plan = PlannedTransfer::Multipart {
            folder_id: session.folder_id.clone(),
            hash: session.hash.clone(),
            resume: Some(session),
            handle,
        };

        let transfer_report = self
            .executor
            .run(vec![plan], cancel, progress, TRANSFER_PCT)
            .await;
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let TransferReport {
            succeeded,
            failures,
        } = transfer_report;

        progress.emit(
            UploadStage::Notifying,
            95,
            format!("通知服务端 {} 个文档", succeeded.len()),
        );
        let queued = self.notifier.notify(&succeeded).await?;

        Ok(UploadReport {
            call_id: call_id.to_string(),
            success_count: succeeded.len(),
            failure_count: failures.len(),
            skipped: Vec::new(),
            filtered: Vec::new(),
            failures,
            queued,
        })
    }
}
