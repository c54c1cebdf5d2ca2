// 文件句柄定义
//
// 调用方以 FileHandle 描述待上传文件：元信息 + 字节来源。
// 句柄不可变，字节读取在阻塞线程池执行，不占用调度协程。

use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// 文件字节来源
#[derive(Debug, Clone)]
pub enum FileSource {
    /// 本地文件路径
    Path(PathBuf),
    /// 内存数据
    Bytes(Arc<Vec<u8>>),
}

/// 调用方提供的待上传文件句柄
#[derive(Debug, Clone)]
pub struct FileHandle {
    /// 文件名（不含路径）
    pub name: String,
    /// 文件大小（字节）
    pub size: u64,
    /// MIME 类型
    pub mime_type: String,
    /// 层级路径：文件夹段 + 文件名；文件夹上传时必填
    pub path_segments: Option<Vec<String>>,
    /// 字节来源
    pub source: FileSource,
}

impl FileHandle {
    /// 从内存数据构造
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            path_segments: None,
            source: FileSource::Bytes(Arc::new(data)),
        }
    }

    /// 从本地文件构造
    pub fn from_path(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            path_segments: None,
            source: FileSource::Path(path.into()),
        }
    }

    /// 附加层级路径（文件夹段 + 文件名）
    pub fn with_path_segments(mut self, segments: Vec<String>) -> Self {
        self.path_segments = Some(segments);
        self
    }

    /// 读取完整内容
    pub async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Bytes(data) => Ok(data.as_ref().clone()),
            FileSource::Path(path) => tokio::fs::read(path).await,
        }
    }

    /// 读取指定字节范围
    ///
    /// # 参数
    /// * `range` - 字节范围 [start, end)
    pub async fn read_range(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        let len = (range.end - range.start) as usize;

        match &self.source {
            FileSource::Bytes(data) => {
                let start = range.start as usize;
                let end = range.end as usize;
                if end > data.len() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("读取范围越界: {}..{} (大小 {})", start, end, data.len()),
                    ));
                }
                Ok(data[start..end].to_vec())
            }
            FileSource::Path(path) => {
                let path = path.clone();
                let start = range.start;

                // 定位 + 读取在阻塞线程池执行
                tokio::task::spawn_blocking(move || {
                    let mut file = std::fs::File::open(&path)?;
                    file.seek(SeekFrom::Start(start))?;

                    let mut buffer = vec![0u8; len];
                    file.read_exact(&mut buffer)?;

                    debug!(
                        "读取文件范围: {:?} bytes={}-{}",
                        path,
                        start,
                        start + len as u64 - 1
                    );
                    Ok(buffer)
                })
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
            }
        }
    }
}
