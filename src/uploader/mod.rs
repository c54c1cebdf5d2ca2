// 上传引擎模块
//
// 组件按数据流排列：
// 预签名申请（broker）→ 目录创建（provisioner）→ 传输（executor）
// → 完成通知（notifier），由编排器（orchestrator）按调用串联，
// 进度以事件序列发布（events）。

pub mod broker;
pub mod events;
pub mod executor;
pub mod notifier;
pub mod orchestrator;
pub mod provisioner;

pub use broker::{BrokerResult, UrlBroker, UrlGrant};
pub use events::{ProgressEvent, ProgressSender, UploadStage};
pub use executor::{
    FileFailure, PlannedTransfer, TransferExecutor, TransferItem, TransferReport,
};
pub use notifier::CompletionNotifier;
pub use orchestrator::{UploadOrchestrator, UploadReport};
pub use provisioner::FolderProvisioner;
