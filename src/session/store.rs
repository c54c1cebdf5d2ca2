// 会话持久化存储
//
// 每个会话一个 JSON 文件，固定前缀命名，临时文件 + 原子重命名写入。
// 过期清理在每次读写时顺带执行。存储跨调用共享，按会话 id 隔离；
// 写入经互斥锁串行化。

use crate::session::types::MultipartSession;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 会话文件名前缀（命名空间）
const SESSION_FILE_PREFIX: &str = "upload-session-";

/// 上传会话存储
pub struct SessionStore {
    dir: PathBuf,
    /// 写入串行化
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}.json", SESSION_FILE_PREFIX, session_id))
    }

    /// 保存会话（覆盖同 id 的旧状态）
    pub fn save(&self, session: &MultipartSession) -> io::Result<()> {
        let _guard = self.write_lock.lock();

        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }

        // 顺带清理过期会话
        self.sweep_expired_locked();

        let path = self.path_for(&session.session_id);
        let temp_path = path.with_extension("json.tmp");

        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, session).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("序列化会话失败: {}", e))
        })?;
        writer.flush()?;
        drop(writer);

        // 原子重命名，写入中断不会留下损坏的正式文件
        fs::rename(&temp_path, &path)?;

        debug!(
            "已保存会话: {} ({}/{} 分片完成)",
            session.session_id,
            session.parts.iter().filter(|p| p.uploaded).count(),
            session.parts.len()
        );
        Ok(())
    }

    /// 加载会话；过期视为不存在，读取时顺带清理
    pub fn load(&self, session_id: &str) -> Option<MultipartSession> {
        self.clear_expired();

        let path = self.path_for(session_id);
        let session = self.read_file(&path)?;

        if session.is_expired() {
            debug!("会话已过期，清除: {}", session_id);
            let _ = fs::remove_file(&path);
            return None;
        }
        Some(session)
    }

    /// 删除会话（上传成功或显式取消续传）
    pub fn delete(&self, session_id: &str) -> io::Result<()> {
        let path = self.path_for(session_id);
        if path.exists() {
            fs::remove_file(&path)?;
            debug!("已删除会话: {}", session_id);
        }
        Ok(())
    }

    /// 所有未过期、未完成的会话，最新优先
    pub fn list_pending(&self) -> Vec<MultipartSession> {
        let mut sessions: Vec<MultipartSession> = self
            .scan()
            .into_iter()
            .filter(|s| !s.is_expired() && !s.is_complete())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// 清除过期会话
    ///
    /// # 返回
    /// 清除的数量
    pub fn clear_expired(&self) -> usize {
        let _guard = self.write_lock.lock();
        self.sweep_expired_locked()
    }

    /// 按身份查找可续传会话（文件名 + 大小 + 目标目录）
    pub fn find_by_identity(
        &self,
        file_name: &str,
        file_size: u64,
        folder_id: Option<&str>,
    ) -> Option<MultipartSession> {
        self.list_pending()
            .into_iter()
            .find(|s| s.matches_identity(file_name, file_size, folder_id))
    }

    /// 扫描目录下全部会话文件；损坏的文件跳过并告警
    fn scan(&self) -> Vec<MultipartSession> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_session_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(SESSION_FILE_PREFIX) && n.ends_with(".json"))
                .unwrap_or(false);
            if !is_session_file {
                continue;
            }
            if let Some(session) = self.read_file(&path) {
                sessions.push(session);
            }
        }
        sessions
    }

    fn read_file(&self, path: &Path) -> Option<MultipartSession> {
        let file = File::open(path).ok()?;
        let reader = BufReader::new(file);
        match serde_json::from_reader(reader) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("会话文件损坏，跳过 {:?}: {}", path, e);
                None
            }
        }
    }

    /// 删除过期会话文件；调用方需持有写锁
    fn sweep_expired_locked(&self) -> usize {
        let mut removed = 0;
        for session in self.scan() {
            if session.is_expired() {
                let path = self.path_for(&session.session_id);
                if fs::remove_file(&path).is_ok() {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            debug!("清除过期会话 {} 个", removed);
        }
        removed
    }
}
