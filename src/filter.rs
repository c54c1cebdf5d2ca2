// 文件过滤
//
// 在哈希和任何网络调用之前剔除隐藏/系统文件与不支持的类型。
// 纯函数，无 I/O；每个被剔除的文件都记录原因。

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::handle::FileHandle;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

/// 固定剔除的系统文件名
const SYSTEM_FILE_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", ".localized"];

/// 固定剔除的目录段
const SYSTEM_DIR_NAMES: &[&str] = &["__MACOSX"];

/// 被剔除的文件及原因
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub file_name: String,
    pub reason: String,
}

/// 过滤结果；valid 与 skipped 数量之和恒等于输入数量
#[derive(Debug)]
pub struct FilterOutcome {
    pub valid: Vec<FileHandle>,
    pub skipped: Vec<SkippedFile>,
}

/// 文件过滤器
pub struct FileFilter {
    /// 允许的扩展名（小写，不含点）
    allowed_extensions: HashSet<String>,
    /// 额外的文件名排除规则
    skip_patterns: Vec<Regex>,
}

impl FileFilter {
    /// 从配置构造；排除规则正则编译失败视为配置校验错误
    pub fn from_config(config: &UploadConfig) -> Result<Self, UploadError> {
        let allowed_extensions = config
            .allowed_extensions
            .iter()
            .map(|e| e.to_lowercase())
            .collect();

        let mut skip_patterns = Vec::with_capacity(config.skip_patterns.len());
        for pattern in &config.skip_patterns {
            let regex = Regex::new(pattern).map_err(|e| {
                UploadError::Validation(format!("排除规则非法: {}: {}", pattern, e))
            })?;
            skip_patterns.push(regex);
        }

        Ok(Self {
            allowed_extensions,
            skip_patterns,
        })
    }

    /// 应用过滤规则
    pub fn apply(&self, handles: Vec<FileHandle>) -> FilterOutcome {
        let mut valid = Vec::with_capacity(handles.len());
        let mut skipped = Vec::new();

        for handle in handles {
            match self.skip_reason(&handle) {
                Some(reason) => {
                    debug!("跳过文件: {} ({})", handle.name, reason);
                    skipped.push(SkippedFile {
                        file_name: handle.name,
                        reason,
                    });
                }
                None => valid.push(handle),
            }
        }

        FilterOutcome { valid, skipped }
    }

    /// 判断是否需要剔除；返回剔除原因
    fn skip_reason(&self, handle: &FileHandle) -> Option<String> {
        let name = handle.name.as_str();

        if SYSTEM_FILE_NAMES.contains(&name) {
            return Some("系统文件".to_string());
        }
        if name.starts_with('.') {
            return Some("隐藏文件".to_string());
        }
        if name.starts_with("~$") {
            return Some("Office 临时锁文件".to_string());
        }

        // 位于隐藏或系统目录下的文件同样剔除
        if let Some(segments) = &handle.path_segments {
            for segment in segments.iter().take(segments.len().saturating_sub(1)) {
                if segment.starts_with('.') || SYSTEM_DIR_NAMES.contains(&segment.as_str()) {
                    return Some(format!("位于隐藏/系统目录: {}", segment));
                }
            }
        }

        for pattern in &self.skip_patterns {
            if pattern.is_match(name) {
                return Some(format!("匹配排除规则: {}", pattern.as_str()));
            }
        }

        match extension_of(name) {
            Some(ext) if self.allowed_extensions.contains(&ext) => None,
            Some(ext) => Some(format!("不支持的文件类型: .{}", ext)),
            None => Some("缺少扩展名".to_string()),
        }
    }
}

/// 提取小写扩展名（不含点）
fn extension_of(name: &str) -> Option<String> {
    let idx = name.rfind('.')?;
    if idx == 0 || idx + 1 == name.len() {
        return None;
    }
    Some(name[idx + 1..].to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn filter_with_defaults() -> FileFilter {
        FileFilter::from_config(&UploadConfig::default()).unwrap()
    }

    fn handle(name: &str) -> FileHandle {
        FileHandle::from_bytes(name, "application/octet-stream", vec![1, 2, 3])
    }

    #[test]
    fn test_valid_document_passes() {
        let filter = filter_with_defaults();
        let outcome = filter.apply(vec![handle("report.pdf"), handle("notes.MD")]);

        assert_eq!(outcome.valid.len(), 2);
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn test_hidden_and_system_files_skipped() {
        let filter = filter_with_defaults();
        let outcome = filter.apply(vec![
            handle(".gitignore"),
            handle(".DS_Store"),
            handle("Thumbs.db"),
            handle("~$draft.docx"),
        ]);

        assert!(outcome.valid.is_empty());
        assert_eq!(outcome.skipped.len(), 4);
        // 每个被剔除的文件都必须有原因
        for skip in &outcome.skipped {
            assert!(!skip.reason.is_empty(), "{} 缺少剔除原因", skip.file_name);
        }
    }

    #[test]
    fn test_disallowed_extension_records_reason() {
        let filter = filter_with_defaults();
        let outcome = filter.apply(vec![handle("malware.exe")]);

        assert_eq!(outcome.skipped.len(), 1);
        assert!(outcome.skipped[0].reason.contains(".exe"));
    }

    #[test]
    fn test_file_inside_hidden_directory_skipped() {
        let filter = filter_with_defaults();
        let inside_git = handle("config.md").with_path_segments(vec![
            "project".to_string(),
            ".git".to_string(),
            "config.md".to_string(),
        ]);
        let inside_macosx = handle("a.pdf").with_path_segments(vec![
            "project".to_string(),
            "__MACOSX".to_string(),
            "a.pdf".to_string(),
        ]);

        let outcome = filter.apply(vec![inside_git, inside_macosx]);
        assert!(outcome.valid.is_empty());
        assert_eq!(outcome.skipped.len(), 2);
    }

    #[test]
    fn test_custom_skip_pattern() {
        let config = UploadConfig {
            skip_patterns: vec![r"^draft-.*".to_string()],
            ..Default::default()
        };
        let filter = FileFilter::from_config(&config).unwrap();

        let outcome = filter.apply(vec![handle("draft-v1.pdf"), handle("final.pdf")]);
        assert_eq!(outcome.valid.len(), 1);
        assert_eq!(outcome.valid[0].name, "final.pdf");
        assert_eq!(outcome.skipped.len(), 1);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = UploadConfig {
            skip_patterns: vec!["([unclosed".to_string()],
            ..Default::default()
        };
        assert!(FileFilter::from_config(&config).is_err());
    }

    #[test]
    fn test_extension_extraction() {
        assert_eq!(extension_of("a.PDF"), Some("pdf".to_string()));
        assert_eq!(extension_of("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("trailing."), None);
        assert_eq!(extension_of(".hidden"), None);
    }

    proptest! {
        /// 过滤是全量的：任何输入都被划入 valid 或 skipped，总数不变
        #[test]
        fn prop_filter_is_total(names in proptest::collection::vec("[a-zA-Z0-9.~_-]{1,16}", 0..40)) {
            let filter = filter_with_defaults();
            let input_len = names.len();
            let handles = names.iter().map(|n| handle(n)).collect();

            let outcome = filter.apply(handles);
            prop_assert_eq!(outcome.valid.len() + outcome.skipped.len(), input_len);
        }
    }
}
