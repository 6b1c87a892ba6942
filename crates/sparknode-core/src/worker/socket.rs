use async_trait::async_trait;
use colored::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{sleep_or_cancel, Assignment, NodeWorker, WorkerExit};
use crate::api::{self, DeviceApi};
use crate::proxy::{self, ProxyEntry};
use crate::socket::{run_session, KeepaliveOptions, SessionEnd, SocketDialer};

/// 设备注册 + 持久连接的节点
///
/// 先获取设备ID（有限次数，失败则永久放弃），之后无限重连，每次断开后固定等待 `reconnect_delay`。
#[derive(Debug, Clone)]
pub struct SocketWorker<A, D> {
    devices: A,
    dialer: D,
    device_attempts: u32,
    device_retry_delay: Duration,
    reconnect_delay: Duration,
    keepalive: KeepaliveOptions,
}

enum Registration {
    Device(String),
    Exhausted,
    Cancelled,
}

impl<A: DeviceApi, D: SocketDialer> SocketWorker<A, D> {
    pub fn new(
        devices: A,
        dialer: D,
        device_attempts: u32,
        device_retry_delay: Duration,
        reconnect_delay: Duration,
        keepalive: KeepaliveOptions,
    ) -> Self {
        Self {
            devices,
            dialer,
            device_attempts,
            device_retry_delay,
            reconnect_delay,
            keepalive,
        }
    }

    async fn register(&self, token: &str, proxy: Option<&ProxyEntry>, cancel: &CancellationToken) -> Registration {
        for attempt in 1..=self.device_attempts {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Registration::Cancelled,
                result = self.devices.device_id(token, proxy) => result,
            };

            match result {
                Ok(Some(device_id)) => return Registration::Device(device_id),
                Ok(None) => warn!("{}", format!("[Device] {}: no device registered", proxy::describe(proxy)).yellow()),
                Err(e) => error!("{}", format!("[Device] {}: {}", proxy::describe(proxy), e).red()),
            }

            if attempt < self.device_attempts && sleep_or_cancel(self.device_retry_delay, cancel).await {
                return Registration::Cancelled;
            }
        }
        Registration::Exhausted
    }
}

/// 分别检查代理能否用于HTTP请求和隧道，不能用的一侧按直连处理
fn usable_proxies(assignment: &Assignment) -> (Option<ProxyEntry>, Option<ProxyEntry>) {
    let Some(proxy) = assignment.proxy.as_ref() else {
        return (None, None);
    };

    let for_http = match api::http_proxy(proxy) {
        Ok(_) => Some(proxy.clone()),
        Err(e) => {
            error!("{}", format!("{} | {}", assignment.tag(), e).red());
            None
        }
    };
    let for_socket = match proxy.endpoint() {
        Ok(_) => Some(proxy.clone()),
        Err(e) => {
            error!("{}", format!("{} | {}", assignment.tag(), e).red());
            None
        }
    };
    (for_http, for_socket)
}

#[async_trait]
impl<A, D> NodeWorker for SocketWorker<A, D>
where
    A: DeviceApi + 'static,
    D: SocketDialer + 'static,
{
    async fn run(&self, assignment: Assignment, cancel: CancellationToken) -> WorkerExit {
        let (http_proxy, socket_proxy) = usable_proxies(&assignment);
        let tag = assignment.tag();
        let token = assignment.credential.token();

        let device_id = match self.register(token, http_proxy.as_ref(), &cancel).await {
            Registration::Device(id) => id,
            Registration::Cancelled => return WorkerExit::Cancelled,
            Registration::Exhausted => {
                error!("{}", format!("{} | Could not get device id, skipping node.", tag).red());
                return WorkerExit::Abandoned;
            }
        };

        loop {
            let dialed = tokio::select! {
                _ = cancel.cancelled() => return WorkerExit::Cancelled,
                dialed = self.dialer.dial(token, &device_id, socket_proxy.as_ref()) => dialed,
            };

            match dialed {
                Ok(mut ws) => {
                    info!("{}", format!("{} | Websocket connected", tag).green());
                    match run_session(&mut ws, self.keepalive, &cancel).await {
                        Ok(SessionEnd::Cancelled) => return WorkerExit::Cancelled,
                        Ok(SessionEnd::Closed) => warn!("{}", format!("{} | Websocket closed", tag).yellow()),
                        Err(e) => warn!("{}", format!("{} | Websocket error: {}", tag, e).yellow()),
                    }
                }
                Err(e) => warn!("{}", format!("{} | Websocket error: {}", tag, e).yellow()),
            }

            if sleep_or_cancel(self.reconnect_delay, &cancel).await {
                return WorkerExit::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingSettings;
    use crate::credential::Credential;
    use crate::error::{Error, Result};
    use crate::socket::tests::ws_pair;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::io::DuplexStream;
    use tokio::time::Instant;
    use tokio_tungstenite::WebSocketStream;

    /// 按令牌返回设备ID；不在表里的令牌返回401
    #[derive(Default)]
    struct FakeDevices {
        known: HashMap<String, String>,
        calls: Mutex<Vec<(String, Instant)>>,
        proxies: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl DeviceApi for Arc<FakeDevices> {
        async fn device_id(&self, token: &str, proxy: Option<&ProxyEntry>) -> Result<Option<String>> {
            self.calls.lock().unwrap().push((token.to_string(), Instant::now()));
            self.proxies.lock().unwrap().push(proxy.map(|p| p.to_string()));
            match self.known.get(token) {
                Some(id) => Ok(Some(id.clone())),
                None => Err(Error::Status(401)),
            }
        }
    }

    /// 返回内存中的连接；服务端一直保持打开但不发消息
    #[derive(Default)]
    struct FakeDialer {
        dials: Mutex<Vec<(String, Instant)>>,
        proxies: Mutex<Vec<Option<String>>>,
        servers: Mutex<Vec<WebSocketStream<DuplexStream>>>,
    }

    #[async_trait]
    impl SocketDialer for Arc<FakeDialer> {
        type Conn = DuplexStream;

        async fn dial(&self, _token: &str, device_id: &str, proxy: Option<&ProxyEntry>) -> Result<WebSocketStream<DuplexStream>> {
            self.dials.lock().unwrap().push((device_id.to_string(), Instant::now()));
            self.proxies.lock().unwrap().push(proxy.map(|p| p.to_string()));
            let (client, server) = ws_pair().await;
            self.servers.lock().unwrap().push(server);
            Ok(client)
        }
    }

    fn worker(devices: &Arc<FakeDevices>, dialer: &Arc<FakeDialer>) -> Arc<SocketWorker<Arc<FakeDevices>, Arc<FakeDialer>>> {
        let timing = TimingSettings::default();
        Arc::new(SocketWorker::new(
            devices.clone(),
            dialer.clone(),
            timing.device_attempts,
            timing.device_retry_delay(),
            timing.reconnect_delay(),
            KeepaliveOptions::from_timing(&timing),
        ))
    }

    fn assignment(account_index: usize, token: &str) -> Assignment {
        Assignment {
            account_index,
            node_index: 0,
            credential: Credential::new(token),
            proxy: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_registration_abandons_only_that_node() {
        let devices = Arc::new(FakeDevices {
            known: HashMap::from([("good".to_string(), "dev-1".to_string())]),
            ..Default::default()
        });
        let dialer = Arc::new(FakeDialer::default());
        let worker = worker(&devices, &dialer);
        let cancel = CancellationToken::new();

        let spawn = |a: Assignment| {
            let worker = worker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.run(a, cancel).await })
        };
        let bad = spawn(assignment(0, "bad"));
        let good = spawn(assignment(1, "good"));

        assert_eq!(bad.await.unwrap(), WorkerExit::Abandoned);

        let bad_calls: Vec<Instant> = devices
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(token, _)| token == "bad")
            .map(|(_, at)| *at)
            .collect();
        assert_eq!(bad_calls.len(), 2);
        assert!(bad_calls[1] - bad_calls[0] >= Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!good.is_finished());
        assert_eq!(devices.calls.lock().unwrap().iter().filter(|(t, _)| t == "bad").count(), 2);
        assert!(dialer.dials.lock().unwrap().iter().all(|(id, _)| id == "dev-1"));
        assert!(!dialer.dials.lock().unwrap().is_empty());

        cancel.cancel();
        assert_eq!(good.await.unwrap(), WorkerExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_reconnect_after_fixed_delay() {
        let devices = Arc::new(FakeDevices {
            known: HashMap::from([("tok".to_string(), "dev-9".to_string())]),
            ..Default::default()
        });
        let dialer = Arc::new(FakeDialer::default());
        let worker = worker(&devices, &dialer);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let worker = worker.clone();
            let cancel = cancel.clone();
            async move { worker.run(assignment(0, "tok"), cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(100)).await;

        let dials: Vec<Instant> = dialer.dials.lock().unwrap().iter().map(|(_, at)| *at).collect();
        assert_eq!(dials.len(), 4);
        for pair in dials.windows(2) {
            // 30秒无消息超时 + 2秒重连等待
            assert_eq!(pair[1] - pair[0], Duration::from_secs(32));
        }
        assert_eq!(devices.calls.lock().unwrap().len(), 1);

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), WorkerExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_registration_retry() {
        let devices = Arc::new(FakeDevices::default());
        let dialer = Arc::new(FakeDialer::default());
        let worker = worker(&devices, &dialer);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(worker.run(assignment(0, "x"), cancel).await, WorkerExit::Cancelled);
        assert!(dialer.dials.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_proxy_falls_back_to_direct() {
        let devices = Arc::new(FakeDevices {
            known: HashMap::from([("tok".to_string(), "dev-3".to_string())]),
            ..Default::default()
        });
        let dialer = Arc::new(FakeDialer::default());
        let worker = worker(&devices, &dialer);
        let cancel = CancellationToken::new();

        let node = Assignment {
            proxy: Some(ProxyEntry::resolve("http://[::1")),
            ..assignment(0, "tok")
        };
        let handle = tokio::spawn({
            let worker = worker.clone();
            let cancel = cancel.clone();
            async move { worker.run(node, cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!handle.is_finished());
        assert_eq!(*devices.proxies.lock().unwrap(), vec![None]);
        assert_eq!(*dialer.proxies.lock().unwrap(), vec![None]);

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), WorkerExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn valid_proxy_reaches_both_sides() {
        let devices = Arc::new(FakeDevices {
            known: HashMap::from([("tok".to_string(), "dev-4".to_string())]),
            ..Default::default()
        });
        let dialer = Arc::new(FakeDialer::default());
        let worker = worker(&devices, &dialer);
        let cancel = CancellationToken::new();

        let node = Assignment {
            proxy: Some(ProxyEntry::resolve("socks5://10.0.0.7:1080")),
            ..assignment(0, "tok")
        };
        let handle = tokio::spawn({
            let worker = worker.clone();
            let cancel = cancel.clone();
            async move { worker.run(node, cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        let expected = vec![Some("socks5://10.0.0.7:1080".to_string())];
        assert_eq!(*devices.proxies.lock().unwrap(), expected);
        assert_eq!(*dialer.proxies.lock().unwrap(), expected);

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), WorkerExit::Cancelled);
    }
}
