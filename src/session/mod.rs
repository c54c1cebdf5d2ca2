// 分片上传会话持久化模块
//
// 会话是跨调用共享的唯一资源：按会话 id 隔离，互不竞争；
// 单个会话内的更新串行应用。

pub mod store;
pub mod types;

pub use store::SessionStore;
pub use types::{MultipartSession, PartState, SESSION_TTL_HOURS};
