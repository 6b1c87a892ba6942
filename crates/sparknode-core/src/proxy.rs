use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::{Error, Result};

/// 支持的代理协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyScheme {
    Socks5,
    Socks4,
    Http,
    Https,
}

impl ProxyScheme {
    pub const ALL: [ProxyScheme; 4] = [
        ProxyScheme::Socks5,
        ProxyScheme::Socks4,
        ProxyScheme::Http,
        ProxyScheme::Https,
    ];

    /// URI前缀，例如 `socks5://`
    pub fn prefix(&self) -> &'static str {
        match self {
            ProxyScheme::Socks5 => "socks5://",
            ProxyScheme::Socks4 => "socks4://",
            ProxyScheme::Http => "http://",
            ProxyScheme::Https => "https://",
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyScheme::Socks5 => write!(f, "socks5"),
            ProxyScheme::Socks4 => write!(f, "socks4"),
            ProxyScheme::Http => write!(f, "http"),
            ProxyScheme::Https => write!(f, "https"),
        }
    }
}

/// 规范化后的代理地址
///
/// 只保证带有协议前缀，不校验 host:port，格式错误的条目在连接时才会失败。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyEntry {
    uri: String,
}

impl ProxyEntry {
    /// 规范化原始代理字符串：已有已知前缀时原样返回（去掉首尾空白），否则补上 `http://`
    pub fn resolve(raw: &str) -> Self {
        let trimmed = raw.trim();
        let uri = if ProxyScheme::ALL.iter().any(|s| trimmed.starts_with(s.prefix())) {
            trimmed.to_string()
        } else {
            format!("{}{}", ProxyScheme::Http.prefix(), trimmed)
        };
        Self { uri }
    }

    pub fn as_str(&self) -> &str {
        &self.uri
    }

    pub fn scheme(&self) -> ProxyScheme {
        ProxyScheme::ALL
            .into_iter()
            .find(|s| self.uri.starts_with(s.prefix()))
            .unwrap_or(ProxyScheme::Http)
    }

    /// 解析出的代理端点，用于建立隧道
    pub fn endpoint(&self) -> Result<ProxyEndpoint> {
        let url = Url::parse(&self.uri).map_err(|e| Error::InvalidProxy(format!("{}: {}", self.uri, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidProxy(format!("{}: missing host", self.uri)))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidProxy(format!("{}: missing port", self.uri)))?;
        let username = match url.username() {
            "" => None,
            user => Some(user.to_string()),
        };
        Ok(ProxyEndpoint {
            scheme: self.scheme(),
            host,
            port,
            username,
            password: url.password().map(|p| p.to_string()),
        })
    }
}

impl fmt::Display for ProxyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// 代理端点信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    /// 用户名（可选）
    pub username: Option<String>,
    /// 密码（可选）
    pub password: Option<String>,
}

impl ProxyEndpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 日志里展示的代理描述
pub fn describe(proxy: Option<&ProxyEntry>) -> String {
    proxy.map(|p| p.to_string()).unwrap_or_else(|| "no proxy".to_string())
}
