// 目录结构分析
//
// 把一批带层级路径的文件句柄转换成：根目录名 + 去重后的子目录树 +
// 文件到目录的映射。子目录按深度升序输出，批量创建一趟即可，
// 不会出现父目录晚于子目录的依赖冲突。

use crate::error::UploadError;
use crate::handle::FileHandle;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// 子目录树节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderNode {
    /// 目录名
    pub name: String,
    /// 去掉根段后的完整路径（以 / 连接）
    pub path: String,
    /// 父目录路径；None 表示父级是目标根目录
    pub parent_path: Option<String>,
    /// 深度；0 = 目标根目录的直接子目录
    pub depth: u32,
}

/// 单个待上传文件及其目录归属
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// 文件句柄
    pub handle: FileHandle,
    /// 含根段的完整路径
    pub full_path: String,
    /// 去掉根段后的相对路径
    pub relative_path: String,
    /// 文件名
    pub file_name: String,
    /// 深度；0 = 位于目标根目录
    pub depth: u32,
    /// 所属子目录路径；None 表示位于目标根目录
    pub folder_path: Option<String>,
}

/// 目录结构分析结果
#[derive(Debug)]
pub struct FolderStructure {
    /// 根目录名
    pub root_name: String,
    /// 子目录，深度升序
    pub folders: Vec<FolderNode>,
    /// 文件条目
    pub entries: Vec<FileEntry>,
}

/// 分析文件夹上传的目录结构
///
/// 所有句柄必须携带层级路径，且共享同一个根段。
pub fn analyze(handles: Vec<FileHandle>) -> Result<FolderStructure, UploadError> {
    if handles.is_empty() {
        return Err(UploadError::Validation("文件列表为空".to_string()));
    }

    let mut root_name: Option<String> = None;
    let mut folders: Vec<FolderNode> = Vec::new();
    let mut seen_paths: HashSet<String> = HashSet::new();
    let mut entries: Vec<FileEntry> = Vec::with_capacity(handles.len());

    for handle in handles {
        let segments = handle.path_segments.clone().ok_or_else(|| {
            UploadError::InvalidStructure(format!("文件缺少层级路径: {}", handle.name))
        })?;

        if segments.len() < 2 {
            return Err(UploadError::InvalidStructure(format!(
                "路径缺少根目录段: {}",
                handle.name
            )));
        }

        let root = &segments[0];
        if root.is_empty() || root == "." || root == ".." {
            return Err(UploadError::InvalidStructure(format!(
                "根目录名非法: {:?}",
                root
            )));
        }

        match &root_name {
            None => root_name = Some(root.clone()),
            Some(existing) if existing != root => {
                return Err(UploadError::InvalidStructure(format!(
                    "存在多个根目录: {} / {}",
                    existing, root
                )));
            }
            Some(_) => {}
        }

        // 去掉根段后的剩余路径：中间段为子目录，末段为文件名
        let remaining = &segments[1..];
        let file_name = remaining[remaining.len() - 1].clone();
        let folder_segments = &remaining[..remaining.len() - 1];
        let depth = folder_segments.len() as u32;

        // 为每个严格前缀注册一个去重后的目录节点
        for prefix_len in 1..=folder_segments.len() {
            let prefix = &folder_segments[..prefix_len];
            let path = prefix.join("/");
            if seen_paths.insert(path.clone()) {
                let parent_path = if prefix_len == 1 {
                    None
                } else {
                    Some(prefix[..prefix_len - 1].join("/"))
                };
                folders.push(FolderNode {
                    name: prefix[prefix_len - 1].clone(),
                    path,
                    parent_path,
                    depth: (prefix_len - 1) as u32,
                });
            }
        }

        let folder_path = if folder_segments.is_empty() {
            None
        } else {
            Some(folder_segments.join("/"))
        };

        entries.push(FileEntry {
            full_path: segments.join("/"),
            relative_path: remaining.join("/"),
            file_name,
            depth,
            folder_path,
            handle,
        });
    }

    // 深度升序；稳定排序保持同层目录的输入顺序，结果确定
    folders.sort_by_key(|node| node.depth);

    let root_name = root_name.expect("非空输入必有根目录名");
    debug!(
        "目录结构分析完成: root={}, 子目录 {} 个, 文件 {} 个",
        root_name,
        folders.len(),
        entries.len()
    );

    Ok(FolderStructure {
        root_name,
        folders,
        entries,
    })
}
