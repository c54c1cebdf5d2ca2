// 内容哈希计算
//
// 哈希用于服务端去重与续传匹配。计算放在阻塞线程池，
// 带独立超时。超时即判该文件失败，发生在任何网络调用之前，
// 避免为注定失败的文件浪费传输。

use crate::error::UploadError;
use crate::handle::{FileHandle, FileSource};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 内容哈希计算器（SHA-256）
pub struct ContentHasher {
    timeout: Duration,
}

impl ContentHasher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 计算文件内容的 SHA-256（十六进制）
    ///
    /// 在阻塞线程池执行，超时返回 HashTimeout
    pub async fn hash(&self, handle: &FileHandle) -> Result<String, UploadError> {
        let file_name = handle.name.clone();

        let task = match &handle.source {
            FileSource::Bytes(data) => {
                let data = data.clone();
                tokio::task::spawn_blocking(move || Ok(hash_bytes(&data)))
            }
            FileSource::Path(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || hash_file_sync(&path))
            }
        };

        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => {
                let hash = joined
                    .map_err(|e| {
                        UploadError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
                    })?
                    .map_err(UploadError::Io)?;
                debug!("内容哈希计算完成: {} sha256={}", file_name, hash);
                Ok(hash)
            }
            Err(_) => Err(UploadError::HashTimeout { file_name }),
        }
    }
}

/// 同步计算文件 SHA-256
fn hash_file_sync(path: &Path) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::with_capacity(1024 * 1024, file);

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536]; // 64KB 缓冲区

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_hash_known_value() {
        // sha256("abc")
        let handle = FileHandle::from_bytes("abc.txt", "text/plain", b"abc".to_vec());
        let hasher = ContentHasher::new(Duration::from_secs(10));

        let hash = hasher.hash(&handle).await.unwrap();
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_hash_path_matches_bytes() {
        let content = b"DocVault upload engine test content";

        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(content).unwrap();
        temp.flush().unwrap();

        let hasher = ContentHasher::new(Duration::from_secs(10));

        let from_path = hasher
            .hash(&FileHandle::from_path(
                "a.txt",
                "text/plain",
                content.len() as u64,
                temp.path(),
            ))
            .await
            .unwrap();
        let from_bytes = hasher
            .hash(&FileHandle::from_bytes("a.txt", "text/plain", content.to_vec()))
            .await
            .unwrap();

        assert_eq!(from_path, from_bytes);
    }

    #[tokio::test]
    async fn test_hash_timeout() {
        let handle = FileHandle::from_bytes("big.bin", "application/octet-stream", vec![0u8; 1024]);
        let hasher = ContentHasher::new(Duration::ZERO);

        match hasher.hash(&handle).await {
            Err(UploadError::HashTimeout { file_name }) => assert_eq!(file_name, "big.bin"),
            other => panic!("期望 HashTimeout，实际: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_hash_missing_file() {
        let handle = FileHandle::from_path(
            "missing.txt",
            "text/plain",
            10,
            "/nonexistent/missing.txt",
        );
        let hasher = ContentHasher::new(Duration::from_secs(10));
        assert!(hasher.hash(&handle).await.is_err());
    }
}
