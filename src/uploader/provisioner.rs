// 目录创建
//
// 根分类目录：先查后建，建的时候带 reuseExisting，并发/重试场景由
// 服务端保证至多一次逻辑创建。子目录树：单次批量请求创建全部节点。
// 任何目录创建失败都中止整个调用。传输尚未开始，绝不会留下被文件
// 引用的半截目录树。批量端点失败没有逐节点降级路径。

use crate::api::types::{BulkFolderRequest, CreateFolderRequest, FolderInfo, FolderTreeNode};
use crate::api::MetadataApi;
use crate::error::{ApiError, UploadError};
use crate::structure::FolderNode;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// 目录创建器
pub struct FolderProvisioner {
    api: Arc<dyn MetadataApi>,
}

impl FolderProvisioner {
    pub fn new(api: Arc<dyn MetadataApi>) -> Self {
        Self { api }
    }

    /// 幂等创建或复用分类目录
    ///
    /// # 参数
    /// * `name` - 目录名
    /// * `parent_folder_id` - 父目录；None 表示根级分类
    pub async fn ensure_category(
        &self,
        name: &str,
        parent_folder_id: Option<&str>,
    ) -> Result<FolderInfo, UploadError> {
        // 先查已有目录，同名同父级直接复用
        let folders = self
            .api
            .list_folders()
            .await
            .map_err(UploadError::FolderProvisioning)?;

        if let Some(existing) = folders
            .iter()
            .find(|f| f.name == name && f.parent_folder_id.as_deref() == parent_folder_id)
        {
            debug!("复用已有目录: {} (id={})", name, existing.id);
            return Ok(existing.clone());
        }

        let request = CreateFolderRequest {
            name: name.to_string(),
            parent_folder_id: parent_folder_id.map(|s| s.to_string()),
            reuse_existing: true,
        };
        let folder = self
            .api
            .create_folder(&request)
            .await
            .map_err(UploadError::FolderProvisioning)?;

        info!("已创建目录: {} (id={})", name, folder.id);
        Ok(folder)
    }

    /// 一次批量请求创建整棵子目录树
    ///
    /// 节点必须按深度升序（分析阶段保证），服务端单趟创建无依赖冲突。
    ///
    /// # 返回
    /// 路径 → 目录 id 的完整映射
    pub async fn create_subtree(
        &self,
        nodes: &[FolderNode],
        root_folder_id: &str,
    ) -> Result<HashMap<String, String>, UploadError> {
        if nodes.is_empty() {
            return Ok(HashMap::new());
        }

        let request = BulkFolderRequest {
            folder_tree: nodes.iter().map(FolderTreeNode::from).collect(),
            parent_folder_id: root_folder_id.to_string(),
        };

        let response = self
            .api
            .create_folder_tree(&request)
            .await
            .map_err(UploadError::FolderProvisioning)?;

        // 每个节点都必须拿到 id，否则后续文件无法路由
        for node in nodes {
            if !response.folder_map.contains_key(&node.path) {
                return Err(UploadError::FolderProvisioning(ApiError::protocol(
                    format!("批量创建响应缺少目录 id: {}", node.path),
                )));
            }
        }

        info!(
            "子目录树创建完成: {} 个目录 (root={})",
            response.folder_map.len(),
            root_folder_id
        );
        Ok(response.folder_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;

    fn node(path: &str, depth: u32) -> FolderNode {
        let name = path.rsplit('/').next().unwrap().to_string();
        let parent_path = path.rfind('/').map(|i| path[..i].to_string());
        FolderNode {
            name,
            path: path.to_string(),
            parent_path,
            depth,
        }
    }

    #[tokio::test]
    async fn test_ensure_category_idempotent() {
        let api = Arc::new(MockApi::new());
        let provisioner = FolderProvisioner::new(api.clone());

        let first = provisioner.ensure_category("reports", None).await.unwrap();
        let second = provisioner.ensure_category("reports", None).await.unwrap();

        // 两次返回同一个 id
        assert_eq!(first.id, second.id);
        // 第二次走复用路径，不再发创建请求
        assert_eq!(api.create_folder_calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_category_distinguishes_parent() {
        let api = Arc::new(MockApi::new());
        let provisioner = FolderProvisioner::new(api.clone());

        let root_level = provisioner.ensure_category("docs", None).await.unwrap();
        let nested = provisioner
            .ensure_category("docs", Some("folder-parent"))
            .await
            .unwrap();

        // 同名不同父级是两个目录
        assert_ne!(root_level.id, nested.id);
    }

    #[tokio::test]
    async fn test_create_subtree_returns_full_map() {
        let api = Arc::new(MockApi::new());
        let provisioner = FolderProvisioner::new(api.clone());

        let nodes = vec![node("sub", 0), node("sub/inner", 1)];
        let map = provisioner.create_subtree(&nodes, "folder-root").await.unwrap();

        assert_eq!(map.len(), 2);
        assert!(map.contains_key("sub"));
        assert!(map.contains_key("sub/inner"));

        // 只发了一次批量请求
        let calls = api.bulk_folder_calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].parent_folder_id, "folder-root");
    }

    #[tokio::test]
    async fn test_create_subtree_empty_skips_request() {
        let api = Arc::new(MockApi::new());
        let provisioner = FolderProvisioner::new(api.clone());

        let map = provisioner.create_subtree(&[], "folder-root").await.unwrap();
        assert!(map.is_empty());
        assert!(api.bulk_folder_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_failure_is_fatal() {
        let api = Arc::new(MockApi::new());
        *api.fail_bulk_folders.lock() = Some(ApiError::status(500, "内部错误"));
        let provisioner = FolderProvisioner::new(api.clone());

        let result = provisioner
            .create_subtree(&[node("sub", 0)], "folder-root")
            .await;
        assert!(matches!(result, Err(UploadError::FolderProvisioning(_))));
    }
}
