//! SparkNode Core - keeps many accounts online through per-node proxies (core functionality)
//!
//! This library loads credentials and proxies, assigns them to nodes and runs
//! every node as an independent, cancellable task.

// 导出模块
pub mod api;
pub mod config;
pub mod credential;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod proxy_pool;
pub mod socket;
pub mod transport;
pub mod worker;

// 从模块导出核心类型
pub use api::{random_user_agent, DeviceApi, HttpApi, Profile, ProfileApi};
pub use config::{Config, ConfigOrigin};
pub use credential::{decode_label, load_credentials, mask_account, Credential, LabelDecode};
pub use dispatcher::{plan, DispatchReport, Dispatcher};
pub use error::{Error, Result};
pub use logging::{init_logger, LogContext};
pub use proxy::{ProxyEntry, ProxyScheme};
pub use proxy_pool::{ProxyPool, ProxySource};
pub use socket::{KeepaliveOptions, WsDialer};
pub use worker::{Assignment, NodeWorker, PollingWorker, SocketWorker, WorkerExit};
