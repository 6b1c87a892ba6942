use std::io;
use std::path::PathBuf;

/// Error type for SparkNode operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO操作错误
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// 令牌文件不存在
    #[error("File '{}' Not Found.", .0.display())]
    CredentialsNotFound(PathBuf),
    /// 需要代理但列表为空
    #[error("No proxies loaded. Exiting.")]
    NoProxies,
    /// 请求错误
    #[error("Request failed: {0}")]
    Request(String),
    /// 超时错误
    #[error("Request timed out")]
    Timeout,
    /// 代理连接错误
    #[error("Proxy connection failed: {0}")]
    ProxyConnection(String),
    /// 代理地址无法解析
    #[error("Invalid proxy {0}")]
    InvalidProxy(String),
    /// 非2xx状态码
    #[error("HTTP {0}")]
    Status(u16),
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// WebSocket错误
    #[error("Websocket error: {0}")]
    Socket(String),
}

/// Result type for SparkNode operations
pub type Result<T> = std::result::Result<T, Error>;

/// 从reqwest错误转换
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else if err.is_connect() {
            Error::ProxyConnection(err.to_string())
        } else if let Some(status) = err.status() {
            Error::Status(status.as_u16())
        } else if err.is_decode() {
            Error::Serialization(err.to_string())
        } else {
            Error::Request(err.to_string())
        }
    }
}

/// 从toml错误转换
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// 从toml序列化错误转换
impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Socket(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Configuration(format!("Invalid URL: {}", err))
    }
}

impl Error {
    /// 是否为服务端返回的非成功状态码
    pub fn is_status(&self) -> bool {
        matches!(self, Error::Status(_))
    }
}
