// 预签名 URL 申请
//
// 服务端可能把内容已存在的文件短路掉：skipped_files 里出现的文件
// 不占用 presigned_urls / document_ids 的位置，三个数组只剩位置对应
// 关系。对齐逻辑集中在 align_grants：剔除被跳过的条目后严格校验
// 数量，再按位置配对；数量不一致直接报错，绝不静默截断。

use crate::api::types::{PresignedBatchRequest, PresignedBatchResponse, PresignedFileSpec};
use crate::api::MetadataApi;
use crate::error::ApiError;
use crate::structure::FileEntry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// 对齐后的单文件预签名授权
#[derive(Debug, Clone)]
pub struct UrlGrant {
    /// 在请求文件列表中的原始下标
    pub entry_index: usize,
    /// 占位记录 id
    pub document_id: String,
    /// 预签名写 URL
    pub url: String,
}

/// 批量申请结果
#[derive(Debug, Default)]
pub struct BrokerResult {
    pub grants: Vec<UrlGrant>,
    /// 服务端判定已存在而跳过的文件名（视为已成功）
    pub skipped: Vec<String>,
}

/// 预签名 URL 申请器
pub struct UrlBroker {
    api: Arc<dyn MetadataApi>,
}

impl UrlBroker {
    pub fn new(api: Arc<dyn MetadataApi>) -> Self {
        Self { api }
    }

    /// 批量申请预签名 URL 与占位记录
    ///
    /// # 参数
    /// * `entries` - 待上传文件
    /// * `folder_map` - 子目录路径 → 目录 id（平铺上传传空映射）
    /// * `root_folder_id` - 目标根目录 id
    pub async fn bulk_request(
        &self,
        entries: &[FileEntry],
        folder_map: &HashMap<String, String>,
        root_folder_id: Option<&str>,
    ) -> Result<BrokerResult, ApiError> {
        if entries.is_empty() {
            return Ok(BrokerResult::default());
        }

        let mut files = Vec::with_capacity(entries.len());
        for entry in entries {
            let folder_id = match &entry.folder_path {
                Some(path) => Some(folder_map.get(path).cloned().ok_or_else(|| {
                    ApiError::protocol(format!("目录映射缺失: {}", path))
                })?),
                None => root_folder_id.map(|s| s.to_string()),
            };

            let relative_path = if entry.relative_path != entry.file_name {
                Some(entry.relative_path.clone())
            } else {
                None
            };

            files.push(PresignedFileSpec {
                file_name: entry.file_name.clone(),
                file_type: entry.handle.mime_type.clone(),
                file_size: entry.handle.size,
                relative_path,
                folder_id,
            });
        }

        let request = PresignedBatchRequest {
            files,
            folder_id: root_folder_id.map(|s| s.to_string()),
        };

        let response = self.api.request_presigned_urls(&request).await?;
        let grants = align_grants(&request.files, &response)?;

        info!(
            "预签名申请完成: 请求 {} 个, 签发 {} 个, 服务端跳过 {} 个",
            entries.len(),
            grants.len(),
            response.skipped_files.len()
        );

        Ok(BrokerResult {
            grants,
            skipped: response.skipped_files,
        })
    }
}

/// 把返回的 URL / 占位记录按位置配对回非跳过的请求条目
///
/// 服务端没有逐文件关联 id，这里是唯一做位置对齐的地方。
fn align_grants(
    requested: &[PresignedFileSpec],
    response: &PresignedBatchResponse,
) -> Result<Vec<UrlGrant>, ApiError> {
    // 被跳过的文件名按出现次数扣减，避免同名文件全部被误剔
    let mut skip_counts: HashMap<&str, usize> = HashMap::new();
    for name in &response.skipped_files {
        *skip_counts.entry(name.as_str()).or_insert(0) += 1;
    }

    let mut remaining_indices = Vec::with_capacity(requested.len());
    for (index, spec) in requested.iter().enumerate() {
        match skip_counts.get_mut(spec.file_name.as_str()) {
            Some(count) if *count > 0 => {
                *count -= 1;
                debug!("服务端跳过: {}", spec.file_name);
            }
            _ => remaining_indices.push(index),
        }
    }

    if remaining_indices.len() != response.presigned_urls.len()
        || remaining_indices.len() != response.document_ids.len()
    {
        return Err(ApiError::protocol(format!(
            "预签名响应数量不一致: 剩余 {} 个文件, {} 个 URL, {} 个占位记录",
            remaining_indices.len(),
            response.presigned_urls.len(),
            response.document_ids.len()
        )));
    }

    Ok(remaining_indices
        .into_iter()
        .zip(response.presigned_urls.iter())
        .zip(response.document_ids.iter())
        .map(|((entry_index, url), document_id)| UrlGrant {
            entry_index,
            document_id: document_id.clone(),
            url: url.clone(),
        })
        .collect())
}
