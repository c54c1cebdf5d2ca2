// 配置管理模块

use crate::error::UploadError;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 上传引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 元数据服务地址
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// 网络请求超时（秒），超时与网络错误同等对待（可重试）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 分片上传阈值（字节），超过走分片路径
    ///
    /// 存储后端的最小分片大小各不相同，该阈值必须可配置而非写死
    #[serde(default = "default_multipart_threshold_bytes")]
    pub multipart_threshold_bytes: u64,
    /// 标准路径批次大小（所有批次同时入场，不互相等待）
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 全局同时在途传输数上限
    #[serde(default = "default_max_concurrent_transfers")]
    pub max_concurrent_transfers: usize,
    /// 最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 初始退避延迟（毫秒）
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// 退避延迟上限（毫秒）
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// 哈希计算超时（秒），独立于网络超时
    #[serde(default = "default_hash_timeout_secs")]
    pub hash_timeout_secs: u64,
    /// 分片上传会话持久化目录
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,
    /// 扩展名允许列表（小写，不含点）
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// 额外的文件名排除规则（正则）
    #[serde(default)]
    pub skip_patterns: Vec<String>,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_api_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_multipart_threshold_bytes() -> u64 {
    100 * 1024 * 1024 // 100MB
}

fn default_batch_size() -> usize {
    5
}

fn default_max_concurrent_transfers() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_hash_timeout_secs() -> u64 {
    30
}

fn default_session_dir() -> PathBuf {
    PathBuf::from("upload-sessions")
}

fn default_allowed_extensions() -> Vec<String> {
    [
        "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "md", "csv", "json", "xml",
        "html", "rtf", "odt", "epub", "png", "jpg", "jpeg", "gif", "webp",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            multipart_threshold_bytes: default_multipart_threshold_bytes(),
            batch_size: default_batch_size(),
            max_concurrent_transfers: default_max_concurrent_transfers(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            hash_timeout_secs: default_hash_timeout_secs(),
            session_dir: default_session_dir(),
            allowed_extensions: default_allowed_extensions(),
            skip_patterns: Vec::new(),
            log: LogConfig::default(),
        }
    }
}

impl UploadConfig {
    /// 从 TOML 文件加载配置，缺省字段使用默认值
    pub async fn load(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path))?;
        Ok(config)
    }

    /// 保存配置到 TOML 文件
    pub async fn save(&self, path: &PathBuf) -> Result<()> {
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
        }
        fs::write(path, content)
            .await
            .with_context(|| format!("写入配置文件失败: {:?}", path))?;
        Ok(())
    }

    /// 校验配置有效性
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.multipart_threshold_bytes == 0 {
            return Err(UploadError::Validation("分片阈值必须大于 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(UploadError::Validation("批次大小必须大于 0".to_string()));
        }
        if self.max_concurrent_transfers == 0 {
            return Err(UploadError::Validation("并发上限必须大于 0".to_string()));
        }
        if self.api_base_url.is_empty() {
            return Err(UploadError::Validation("元数据服务地址不能为空".to_string()));
        }
        Ok(())
    }

    /// 构造重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.base_backoff_ms, self.max_backoff_ms)
    }

    /// 网络请求超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 哈希计算超时
    pub fn hash_timeout(&self) -> Duration {
        Duration::from_secs(self.hash_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = UploadConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.multipart_threshold_bytes, 100 * 1024 * 1024);
        assert_eq!(config.max_retries, 3);
        assert!(config.allowed_extensions.contains(&"pdf".to_string()));
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let config = UploadConfig {
            multipart_threshold_bytes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: UploadConfig = toml::from_str(
            r#"
            api_base_url = "https://docvault.example.com/api"
            multipart_threshold_bytes = 1048576
            "#,
        )
        .unwrap();

        assert_eq!(config.api_base_url, "https://docvault.example.com/api");
        assert_eq!(config.multipart_threshold_bytes, 1024 * 1024);
        // 其余字段取默认值
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_concurrent_transfers, 4);
        assert_eq!(config.log.retention_days, 7);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("upload.toml");

        let mut config = UploadConfig::default();
        config.max_retries = 7;
        config.save(&path).await.unwrap();

        let loaded = UploadConfig::load(&path).await.unwrap();
        assert_eq!(loaded.max_retries, 7);
        assert_eq!(loaded.api_base_url, config.api_base_url);
    }
}
