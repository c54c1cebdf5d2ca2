// 分片上传会话类型
//
// 会话在任何字节传输之前落盘，分片完成后逐次更新，
// 成功后删除；进程崩溃或失败后凭身份 (文件名, 大小, 目录) 续传。

use crate::api::types::{CompletedPart, MultipartInitResponse};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use uuid::Uuid;

/// 会话有效期：创建后 24 小时
pub const SESSION_TTL_HOURS: i64 = 24;

/// 单个分片的持久化状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartState {
    /// 分片序号，从 1 开始（遵循存储端协议）
    pub part_number: u32,
    /// 分片大小（字节）
    pub size: u64,
    /// 存储端返回的分片标签，完成调用需原样回传
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// 是否已上传
    pub uploaded: bool,
}

/// 持久化的分片上传会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartSession {
    /// 会话 ID
    pub session_id: String,
    /// 文件名
    pub file_name: String,
    /// 文件大小
    pub file_size: u64,
    /// 内容 SHA-256
    pub hash: String,
    /// MIME 类型
    pub mime_type: String,
    /// 目标目录 id；None 表示工作区根
    pub folder_id: Option<String>,
    /// 占位记录 id
    pub document_id: String,
    /// 存储端分片上传标识
    pub storage_upload_id: String,
    /// 存储端对象 key
    pub storage_key: String,
    /// 分片状态，按 part_number 升序
    pub parts: Vec<PartState>,
    /// 已上传字节 / 总字节；只在分片完成时重算，从不独立赋值
    pub progress: f64,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 过期时间（创建 + 24h）
    pub expires_at: DateTime<Utc>,
}

impl MultipartSession {
    /// 从初始化响应构造新会话
    pub fn create(
        file_name: impl Into<String>,
        file_size: u64,
        hash: impl Into<String>,
        mime_type: impl Into<String>,
        folder_id: Option<String>,
        init: &MultipartInitResponse,
    ) -> Self {
        let chunk_size = init.chunk_size.max(1);
        let mut parts = Vec::with_capacity(init.total_parts as usize);
        let mut remaining = file_size;
        for part_number in 1..=init.total_parts {
            let size = remaining.min(chunk_size);
            parts.push(PartState {
                part_number,
                size,
                tag: None,
                uploaded: false,
            });
            remaining = remaining.saturating_sub(size);
        }

        let created_at = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            file_size,
            hash: hash.into(),
            mime_type: mime_type.into(),
            folder_id,
            document_id: init.document_id.clone(),
            storage_upload_id: init.upload_id.clone(),
            storage_key: init.storage_key.clone(),
            parts,
            progress: 0.0,
            created_at,
            expires_at: created_at + Duration::hours(SESSION_TTL_HOURS),
        }
    }

    /// 标记分片已上传并记录标签；进度随之重算
    pub fn mark_part_uploaded(&mut self, part_number: u32, tag: String) {
        if let Some(part) = self
            .parts
            .iter_mut()
            .find(|p| p.part_number == part_number)
        {
            part.uploaded = true;
            part.tag = Some(tag);
        }
        self.recompute_progress();
    }

    /// 进度恒等于 已上传字节 / 总字节
    fn recompute_progress(&mut self) {
        if self.file_size == 0 {
            self.progress = 0.0;
            return;
        }
        self.progress = self.uploaded_bytes() as f64 / self.file_size as f64;
    }

    /// 已上传字节数
    pub fn uploaded_bytes(&self) -> u64 {
        self.parts
            .iter()
            .filter(|p| p.uploaded)
            .map(|p| p.size)
            .sum()
    }

    /// 未完成分片的序号，升序
    pub fn pending_parts(&self) -> Vec<u32> {
        self.parts
            .iter()
            .filter(|p| !p.uploaded)
            .map(|p| p.part_number)
            .collect()
    }

    /// 所有分片是否已上传
    pub fn is_complete(&self) -> bool {
        self.parts.iter().all(|p| p.uploaded)
    }

    /// 分片对应的字节范围
    pub fn part_range(&self, part_number: u32) -> Option<Range<u64>> {
        let mut offset = 0u64;
        for part in &self.parts {
            if part.part_number == part_number {
                return Some(offset..offset + part.size);
            }
            offset += part.size;
        }
        None
    }

    /// 完成调用所需的 (序号, 标签) 列表，按分片序号升序
    ///
    /// 任一分片缺少标签时返回 None
    pub fn completion_parts(&self) -> Option<Vec<CompletedPart>> {
        let mut parts = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let tag = part.tag.clone()?;
            parts.push(CompletedPart {
                part_number: part.part_number,
                tag,
            });
        }
        parts.sort_by_key(|p| p.part_number);
        Some(parts)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// 身份匹配：同名、同大小、同目标目录
    pub fn matches_identity(&self, file_name: &str, file_size: u64, folder_id: Option<&str>) -> bool {
        self.file_name == file_name
            && self.file_size == file_size
            && self.folder_id.as_deref() == folder_id
    }
}
