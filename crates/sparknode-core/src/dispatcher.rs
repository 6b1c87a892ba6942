//! 节点分配与并发调度
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::credential::Credential;
use crate::proxy_pool::ProxyPool;
use crate::worker::{Assignment, NodeWorker, WorkerExit};

/// 计算所有 (账号, 节点) 的分配，账号在外层、节点在内层
///
/// 使用代理时第 `account * nodes + node` 个槽位取 `proxies[slot % len]`；
/// 没有代理池（或代理池为空）时所有节点直连。
pub fn plan(credentials: &[Credential], nodes_per_account: usize, proxies: Option<&ProxyPool>) -> Vec<Assignment> {
    let mut assignments = Vec::with_capacity(credentials.len() * nodes_per_account);
    for (account_index, credential) in credentials.iter().enumerate() {
        for node_index in 0..nodes_per_account {
            let slot = account_index * nodes_per_account + node_index;
            assignments.push(Assignment {
                account_index,
                node_index,
                credential: credential.clone(),
                proxy: proxies.and_then(|pool| pool.at(slot)).cloned(),
            });
        }
    }
    assignments
}

/// 所有节点任务结束后的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub cancelled: usize,
    pub abandoned: usize,
    pub panicked: usize,
    /// 宽限期内没有退出而被强制中止的任务
    pub aborted: usize,
}

impl DispatchReport {
    fn record(&mut self, exit: WorkerExit) {
        match exit {
            WorkerExit::Cancelled => self.cancelled += 1,
            WorkerExit::Abandoned => self.abandoned += 1,
        }
    }
}

/// 并发运行所有节点，持有共享的取消令牌
#[derive(Debug, Clone)]
pub struct Dispatcher {
    cancel: CancellationToken,
    grace: Duration,
}

impl Dispatcher {
    pub fn new(grace: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            grace,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 运行直到所有节点退出（正常情况下不会发生）或令牌被取消
    pub async fn run<W: NodeWorker>(&self, worker: Arc<W>, assignments: Vec<Assignment>) -> DispatchReport {
        self.run_until(worker, assignments, self.cancel.clone().cancelled_owned()).await
    }

    /// 同 `run`，`shutdown` 完成时取消所有节点，给予宽限期后强制中止剩余任务
    pub async fn run_until<W, F>(&self, worker: Arc<W>, assignments: Vec<Assignment>, shutdown: F) -> DispatchReport
    where
        W: NodeWorker,
        F: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();
        let total = assignments.len();
        for assignment in assignments {
            let worker = worker.clone();
            let cancel = self.cancel.child_token();
            tasks.spawn(async move { worker.run(assignment, cancel).await });
        }
        info!("Started {} nodes.", total);

        let mut report = DispatchReport::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(joined) => collect(&mut report, joined),
                    None => return report,
                },
                _ = &mut shutdown => break,
            }
        }

        self.cancel.cancel();
        debug!("Waiting up to {}s for {} nodes to stop", self.grace.as_secs(), tasks.len());

        let drained = tokio::time::timeout(self.grace, async {
            while let Some(joined) = tasks.join_next().await {
                collect(&mut report, joined);
            }
        })
        .await;

        if drained.is_err() {
            report.aborted = tasks.len();
            warn!("{} nodes did not stop in time, aborting.", report.aborted);
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        report
    }
}

fn collect(report: &mut DispatchReport, joined: Result<WorkerExit, tokio::task::JoinError>) {
    match joined {
        Ok(exit) => report.record(exit),
        Err(e) if e.is_panic() => {
            error!("Node task panicked: {}", e);
            report.panicked += 1;
        }
        Err(_) => report.aborted += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyEntry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn credentials(n: usize) -> Vec<Credential> {
        (0..n).map(|i| Credential::new(format!("token-{}", i))).collect()
    }

    fn pool(n: usize) -> ProxyPool {
        ProxyPool::new((0..n).map(|i| ProxyEntry::resolve(&format!("10.0.0.{}:8080", i))).collect())
    }

    #[test]
    fn plan_is_row_major_with_modulo_proxies() {
        let proxies = pool(4);
        let plan = plan(&credentials(2), 3, Some(&proxies));
        assert_eq!(plan.len(), 6);

        let target = plan.iter().find(|a| a.account_index == 1 && a.node_index == 2).unwrap();
        assert_eq!(target.proxy.as_ref(), proxies.at(1));
        assert_eq!(target.credential.token(), "token-1");

        let order: Vec<(usize, usize)> = plan.iter().map(|a| (a.account_index, a.node_index)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
    }

    #[test]
    fn plan_without_proxies_is_direct() {
        let plan = plan(&credentials(3), 1, None);
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|a| a.proxy.is_none()));
    }

    /// token-0 放弃，其他节点一直运行直到取消
    struct Scripted {
        started: AtomicUsize,
    }

    #[async_trait]
    impl NodeWorker for Scripted {
        async fn run(&self, assignment: Assignment, cancel: CancellationToken) -> WorkerExit {
            self.started.fetch_add(1, Ordering::SeqCst);
            if assignment.credential.token() == "token-0" {
                return WorkerExit::Abandoned;
            }
            cancel.cancelled().await;
            WorkerExit::Cancelled
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_running_nodes() {
        let worker = Arc::new(Scripted { started: AtomicUsize::new(0) });
        let dispatcher = Dispatcher::new(Duration::from_secs(5));

        let report = dispatcher
            .run_until(
                worker.clone(),
                plan(&credentials(3), 2, None),
                tokio::time::sleep(Duration::from_secs(60)),
            )
            .await;

        assert_eq!(worker.started.load(Ordering::SeqCst), 6);
        assert_eq!(
            report,
            DispatchReport {
                cancelled: 4,
                abandoned: 2,
                panicked: 0,
                aborted: 0
            }
        );
        assert!(dispatcher.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn run_returns_once_every_node_exits() {
        let worker = Arc::new(Scripted { started: AtomicUsize::new(0) });
        let dispatcher = Dispatcher::new(Duration::from_secs(5));

        let report = dispatcher.run(worker, plan(&credentials(1), 3, None)).await;
        assert_eq!(report.abandoned, 3);
    }

    struct Stubborn;

    #[async_trait]
    impl NodeWorker for Stubborn {
        async fn run(&self, _assignment: Assignment, _cancel: CancellationToken) -> WorkerExit {
            std::future::pending::<()>().await;
            WorkerExit::Cancelled
        }
    }

    #[tokio::test(start_paused = true)]
    async fn nodes_ignoring_cancel_are_aborted_after_grace() {
        let dispatcher = Dispatcher::new(Duration::from_secs(5));
        let started = tokio::time::Instant::now();

        let report = dispatcher
            .run_until(Arc::new(Stubborn), plan(&credentials(2), 1, None), std::future::ready(()))
            .await;

        assert_eq!(report.aborted, 2);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }
}
