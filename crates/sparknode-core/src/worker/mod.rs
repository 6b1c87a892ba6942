//! 节点任务
//!
//! 每个 (账号, 节点序号) 对应一个长期运行的任务，绑定一个固定的代理（或不使用代理），
//! 出错只记录日志并按固定间隔重试，只有取消信号或放弃注册才会退出。

mod poller;
mod socket;

pub use poller::PollingWorker;
pub use socket::SocketWorker;

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::credential::Credential;
use crate::proxy::{self, ProxyEntry};

/// 单个节点的分配结果，启动时计算一次，之后不再改变
#[derive(Debug, Clone)]
pub struct Assignment {
    pub account_index: usize,
    pub node_index: usize,
    pub credential: Credential,
    pub proxy: Option<ProxyEntry>,
}

impl Assignment {
    /// 日志里使用的节点编号（从1开始）
    pub fn node_number(&self) -> usize {
        self.node_index + 1
    }

    /// `[use***ser@example.com] Node:1 via http://1.2.3.4:80`
    pub fn tag(&self) -> String {
        format!(
            "[{}] Node:{} via {}",
            self.credential.masked_label(),
            self.node_number(),
            proxy::describe(self.proxy.as_ref())
        )
    }
}

/// 节点任务的退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// 收到取消信号
    Cancelled,
    /// 永久放弃该节点（例如获取不到设备ID）
    Abandoned,
}

/// 节点任务
#[async_trait]
pub trait NodeWorker: Send + Sync + 'static {
    /// 运行直到取消或放弃；正常情况下不会返回
    async fn run(&self, assignment: Assignment, cancel: CancellationToken) -> WorkerExit;
}

/// 等待 `duration`，期间收到取消信号返回 `true`
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_uses_masked_label_and_one_based_node() {
        let assignment = Assignment {
            account_index: 0,
            node_index: 2,
            credential: Credential::new("eyJhbGciOiJIUzI1NiJ9.eyJlbWFpbCI6InVzZXJAeC5jb20ifQ.sig"),
            proxy: Some(ProxyEntry::resolve("1.2.3.4:80")),
        };
        assert_eq!(assignment.tag(), "[use***ser@x.com] Node:3 via http://1.2.3.4:80");

        let direct = Assignment { proxy: None, ..assignment };
        assert!(direct.tag().ends_with("via no proxy"));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_short_by_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        assert!(sleep_or_cancel(Duration::from_secs(30), &cancel).await);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert!(sleep_or_cancel(Duration::from_secs(30), &cancel).await);
    }
}
