use async_trait::async_trait;
use colored::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{sleep_or_cancel, Assignment, NodeWorker, WorkerExit};
use crate::api::{self, ProfileApi};
use crate::error::Error;
use crate::proxy::ProxyEntry;

/// 轮询积分接口的节点
///
/// 每轮发一次请求，无论成功、非200还是网络错误，都固定等待 `interval` 后再发下一次。
#[derive(Debug, Clone)]
pub struct PollingWorker<A> {
    api: A,
    interval: Duration,
}

impl<A: ProfileApi> PollingWorker<A> {
    pub fn new(api: A, interval: Duration) -> Self {
        Self { api, interval }
    }
}

/// reqwest无法使用的代理记录一次错误，之后按直连处理
fn usable_proxy(assignment: &Assignment) -> Option<ProxyEntry> {
    let proxy = assignment.proxy.as_ref()?;
    match api::http_proxy(proxy) {
        Ok(_) => Some(proxy.clone()),
        Err(e) => {
            error!("{}", format!("{} | {}", assignment.tag(), e).red());
            None
        }
    }
}

#[async_trait]
impl<A: ProfileApi + 'static> NodeWorker for PollingWorker<A> {
    async fn run(&self, assignment: Assignment, cancel: CancellationToken) -> WorkerExit {
        let proxy = usable_proxy(&assignment);
        let tag = assignment.tag();
        let token = assignment.credential.token();

        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return WorkerExit::Cancelled,
                outcome = self.api.profile(token, proxy.as_ref()) => outcome,
            };

            match outcome {
                Ok(profile) => info!("{}", format!("{} | Points: {}", tag, profile.points()).green()),
                Err(Error::Status(code)) => warn!("{}", format!("{} | HTTP {}", tag, code).yellow()),
                Err(e) => error!("{}", format!("{} | Poll error: {}", tag, e).red()),
            }

            if sleep_or_cancel(self.interval, &cancel).await {
                return WorkerExit::Cancelled;
            }
        }
    }
}
