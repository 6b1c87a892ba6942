//! 持久WebSocket连接：建立、握手和保活
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, ORIGIN, USER_AGENT};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::{ApiSettings, TimingSettings};
use crate::error::{Error, Result};
use crate::proxy::ProxyEntry;
use crate::transport::{self, BoxedConnection};

/// 连接建立后立即发送的握手帧
pub const HANDSHAKE_FRAME: &str = "40";
/// 服务端的心跳帧
pub const PING_FRAME: &str = "2";
/// 对心跳帧的回复
pub const PONG_FRAME: &str = "3";

/// 保活循环的结束方式；出错时走 `Err`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// 服务端关闭或流结束
    Closed,
    /// 收到取消信号
    Cancelled,
}

/// 保活参数
#[derive(Debug, Clone, Copy)]
pub struct KeepaliveOptions {
    /// 协议层Ping间隔
    pub ping_interval: Duration,
    /// 多久没有收到任何帧就放弃本次连接
    pub idle_timeout: Duration,
}

impl KeepaliveOptions {
    pub fn from_timing(timing: &TimingSettings) -> Self {
        Self {
            ping_interval: timing.ping_interval(),
            idle_timeout: timing.idle_timeout(),
        }
    }
}

/// 建立到服务端的WebSocket连接
#[async_trait]
pub trait SocketDialer: Send + Sync {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send;

    async fn dial(&self, token: &str, device_id: &str, proxy: Option<&ProxyEntry>) -> Result<WebSocketStream<Self::Conn>>;
}

/// 带查询参数的连接地址
pub fn session_url(settings: &ApiSettings, token: &str, device_id: &str) -> Result<Url> {
    let mut url = Url::parse(&settings.socket_url)?;
    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("device_id", device_id)
        .append_pair("device_version", &settings.device_version)
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}

/// 基于tokio-tungstenite的连接器，可经由代理建立隧道
#[derive(Debug, Clone)]
pub struct WsDialer {
    settings: ApiSettings,
    user_agent: String,
    connect_timeout: Duration,
}

impl WsDialer {
    pub fn new(settings: ApiSettings, user_agent: String, connect_timeout: Duration) -> Self {
        Self { settings, user_agent, connect_timeout }
    }

    async fn open(&self, url: Url, proxy: Option<&ProxyEntry>) -> Result<WebSocketStream<MaybeTlsStream<BoxedConnection>>> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::Configuration(format!("socket url has no host: {}", url)))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::Configuration(format!("socket url has no port: {}", url)))?;

        let endpoint = proxy.map(ProxyEntry::endpoint).transpose()?;
        let stream = transport::connect(endpoint.as_ref(), &host, port).await?;

        let mut request = url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);
        headers.insert(ORIGIN, header_value(&self.settings.origin)?);

        let (ws, response) = tokio_tungstenite::client_async_tls_with_config(request, stream, None, None).await?;
        debug!("Websocket upgrade complete: {}", response.status());
        Ok(ws)
    }
}

#[async_trait]
impl SocketDialer for WsDialer {
    type Conn = MaybeTlsStream<BoxedConnection>;

    async fn dial(&self, token: &str, device_id: &str, proxy: Option<&ProxyEntry>) -> Result<WebSocketStream<Self::Conn>> {
        let url = session_url(&self.settings, token, device_id)?;
        timeout(self.connect_timeout, self.open(url, proxy))
            .await
            .map_err(|_| Error::Timeout)?
    }
}

/// 发送握手帧后进入保活循环
///
/// 文本帧 `"2"` 回复 `"3"`，其他文本帧忽略；按间隔发送协议层Ping；
/// 超过 `idle_timeout` 没有收到任何帧视为连接失效。
pub async fn run_session<S>(
    ws: &mut WebSocketStream<S>,
    options: KeepaliveOptions,
    cancel: &CancellationToken,
) -> Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::select! {
        _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
        sent = ws.send(Message::Text(HANDSHAKE_FRAME.to_string())) => sent?,
    }

    let mut ping = tokio::time::interval_at(Instant::now() + options.ping_interval, options.ping_interval);
    let mut deadline = Instant::now() + options.idle_timeout;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = timeout(Duration::from_secs(1), ws.close(None)).await;
                return Ok(SessionEnd::Cancelled);
            }
            _ = tokio::time::sleep_until(deadline) => {
                return Err(Error::Socket(format!(
                    "no message received for {}s",
                    options.idle_timeout.as_secs()
                )));
            }
            _ = ping.tick() => {
                if send_frame(ws, Message::Ping(Vec::new()), options, cancel).await? {
                    return Ok(SessionEnd::Cancelled);
                }
            }
            frame = ws.next() => {
                let Some(frame) = frame else {
                    return Ok(SessionEnd::Closed);
                };
                deadline = Instant::now() + options.idle_timeout;
                match frame? {
                    Message::Text(text) if text == PING_FRAME => {
                        if send_frame(ws, Message::Text(PONG_FRAME.to_string()), options, cancel).await? {
                            return Ok(SessionEnd::Cancelled);
                        }
                    }
                    Message::Close(_) => return Ok(SessionEnd::Closed),
                    _ => {}
                }
            }
        }
    }
}

/// 发送一帧；对端不读时最多等 `idle_timeout`，收到取消信号返回 `true`
async fn send_frame<S>(
    ws: &mut WebSocketStream<S>,
    message: Message,
    options: KeepaliveOptions,
    cancel: &CancellationToken,
) -> Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::select! {
        _ = cancel.cancelled() => Ok(true),
        sent = timeout(options.idle_timeout, ws.send(message)) => match sent {
            Ok(sent) => sent.map(|_| false).map_err(Error::from),
            Err(_) => Err(Error::Socket(format!(
                "send stalled for {}s",
                options.idle_timeout.as_secs()
            ))),
        },
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Configuration(format!("invalid header value: {}", e)))
}
