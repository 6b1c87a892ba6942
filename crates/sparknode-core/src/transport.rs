//! Proxy transport layer for the persistent socket
//!
//! Opens a raw TCP stream to the socket host, either directly or tunnelled
//! through the worker's proxy (SOCKS5, SOCKS4 or HTTP CONNECT).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};
use tracing::debug;

use crate::error::{Error, Result};
use crate::proxy::{ProxyEndpoint, ProxyScheme};

/// Byte stream the WebSocket handshake runs over
pub trait ProxyConnection: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ProxyConnection for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub type BoxedConnection = Box<dyn ProxyConnection>;

/// Connect to `target_host:target_port`, through `proxy` when given
pub async fn connect(
    proxy: Option<&ProxyEndpoint>,
    target_host: &str,
    target_port: u16,
) -> Result<BoxedConnection> {
    match proxy {
        None => {
            let stream = TcpStream::connect((target_host, target_port))
                .await
                .map_err(|e| Error::Socket(format!("TCP connect failed: {}", e)))?;
            Ok(Box::new(stream))
        }
        Some(proxy) => match proxy.scheme {
            ProxyScheme::Socks5 => connect_socks5(proxy, target_host, target_port).await,
            ProxyScheme::Socks4 => connect_socks4(proxy, target_host, target_port).await,
            ProxyScheme::Http | ProxyScheme::Https => connect_http(proxy, target_host, target_port).await,
        },
    }
}

async fn connect_socks5(proxy: &ProxyEndpoint, target_host: &str, target_port: u16) -> Result<BoxedConnection> {
    debug!("Connecting to SOCKS5 proxy at {}", proxy.address());
    let address = proxy.address();

    let stream = if let (Some(username), Some(password)) = (&proxy.username, &proxy.password) {
        Socks5Stream::connect_with_password(address.as_str(), (target_host, target_port), username, password).await
    } else {
        Socks5Stream::connect(address.as_str(), (target_host, target_port)).await
    }
    .map_err(|e| Error::ProxyConnection(format!("SOCKS5 connect failed: {}", e)))?;

    Ok(Box::new(stream.into_inner()))
}

async fn connect_socks4(proxy: &ProxyEndpoint, target_host: &str, target_port: u16) -> Result<BoxedConnection> {
    debug!("Connecting to SOCKS4 proxy at {}", proxy.address());
    let address = proxy.address();

    // 域名目标由代理端解析（SOCKS4a扩展）
    let stream = match &proxy.username {
        Some(user_id) => Socks4Stream::connect_with_userid(address.as_str(), (target_host, target_port), user_id).await,
        None => Socks4Stream::connect(address.as_str(), (target_host, target_port)).await,
    }
    .map_err(|e| Error::ProxyConnection(format!("SOCKS4 connect failed: {}", e)))?;

    Ok(Box::new(stream.into_inner()))
}

/// HTTP CONNECT tunnel; `https://` proxies are spoken to in plain HTTP as well
async fn connect_http(proxy: &ProxyEndpoint, target_host: &str, target_port: u16) -> Result<BoxedConnection> {
    debug!("Connecting to HTTP proxy at {}", proxy.address());

    let mut stream = TcpStream::connect(proxy.address())
        .await
        .map_err(|e| Error::ProxyConnection(format!("TCP connect failed: {}", e)))?;

    let request = build_connect_request(proxy, target_host, target_port);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| Error::ProxyConnection(format!("Failed to send CONNECT: {}", e)))?;

    let head = read_response_head(&mut stream).await?;
    let status_line = head.lines().next().unwrap_or_default();
    if !is_connect_success(status_line) {
        return Err(Error::ProxyConnection(format!("CONNECT failed: {}", status_line)));
    }

    debug!("HTTP CONNECT tunnel established");
    Ok(Box::new(stream))
}

fn build_connect_request(proxy: &ProxyEndpoint, target_host: &str, target_port: u16) -> String {
    let mut request = format!(
        "CONNECT {}:{} HTTP/1.1\r\nHost: {}:{}\r\n",
        target_host, target_port, target_host, target_port
    );

    if let Some(username) = &proxy.username {
        let credentials = format!("{}:{}", username, proxy.password.as_deref().unwrap_or_default());
        request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", BASE64.encode(credentials.as_bytes())));
    }

    request.push_str("\r\n");
    request
}

/// 逐字节读到空行为止，避免吞掉隧道里的后续数据
pub(crate) async fn read_response_head<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String> {
    const MAX_HEAD: usize = 8192;
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| Error::ProxyConnection(format!("Failed to read CONNECT response: {}", e)))?;
        if n == 0 {
            return Err(Error::ProxyConnection("proxy closed the connection during CONNECT".to_string()));
        }
        head.push(byte[0]);
        if head.len() > MAX_HEAD {
            return Err(Error::ProxyConnection("CONNECT response too large".to_string()));
        }
    }

    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn is_connect_success(status_line: &str) -> bool {
    let mut parts = status_line.split_whitespace();
    matches!(parts.next(), Some("HTTP/1.1") | Some("HTTP/1.0"))
        && parts.next().map(|code| code.starts_with('2')).unwrap_or(false)
}
