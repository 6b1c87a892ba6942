//! SparkNode - keeps many accounts online through per-node proxies
//!
//! This library re-exports the core node runner and the optional console UI.

// 重导出core库
pub use sparknode_core::{
    Config, ConfigOrigin,
    Error, Result,
    Credential, LabelDecode, load_credentials, mask_account,
    ProxyEntry, ProxyScheme, ProxyPool, ProxySource,
    HttpApi, WsDialer, KeepaliveOptions, random_user_agent,
    Assignment, NodeWorker, PollingWorker, SocketWorker, WorkerExit,
    Dispatcher, DispatchReport, plan,
    LogContext, init_logger,
};

// 启动流程与控制台问答
pub use sparknode_cli::{launch, ProxyMode, RunSettings};

// 可选的命令行界面
#[cfg(feature = "ui")]
pub mod ui;
