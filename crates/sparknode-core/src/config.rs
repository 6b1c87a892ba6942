use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::fmt;
use crate::error::Result;
use tracing::warn;

/// 主配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 远端接口设置
    #[serde(default)]
    pub api: ApiSettings,
    /// 本地文件路径
    #[serde(default)]
    pub files: FileSettings,
    /// 公共代理列表来源
    #[serde(default)]
    pub proxy_source: ProxySourceSettings,
    /// 各类间隔与超时
    #[serde(default)]
    pub timing: TimingSettings,
    /// 日志输出设置
    #[serde(default)]
    pub log: LogSettings,
}

/// 接口设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// REST接口根地址
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 积分查询路径
    #[serde(default = "default_profile_path")]
    pub profile_path: String,
    /// 设备列表路径
    #[serde(default = "default_devices_path")]
    pub devices_path: String,
    /// WebSocket地址（不含查询参数）
    #[serde(default = "default_socket_url")]
    pub socket_url: String,
    /// 上报的扩展版本号
    #[serde(default = "default_device_version")]
    pub device_version: String,
    /// WebSocket握手时的Origin
    #[serde(default = "default_origin")]
    pub origin: String,
    /// HTTP请求的Origin/Referer
    #[serde(default = "default_site_origin")]
    pub site_origin: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

fn default_base_url() -> String { "https://api.sparkchain.ai".to_string() }
fn default_profile_path() -> String { "/profile".to_string() }
fn default_devices_path() -> String { "/devices".to_string() }
fn default_socket_url() -> String { "wss://ws-v2.sparkchain.ai/socket.io/".to_string() }
fn default_device_version() -> String { "0.9.2".to_string() }
fn default_origin() -> String { "chrome-extension://jlpniknnodfkbmbgkjelcailjljlecch".to_string() }
fn default_site_origin() -> String { "https://sparkchain.ai".to_string() }
fn default_accept_language() -> String { "id-ID,id;q=0.9,en-US;q=0.8,en;q=0.7".to_string() }

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            profile_path: default_profile_path(),
            devices_path: default_devices_path(),
            socket_url: default_socket_url(),
            device_version: default_device_version(),
            origin: default_origin(),
            site_origin: default_site_origin(),
            accept_language: default_accept_language(),
        }
    }
}

impl ApiSettings {
    pub fn profile_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.profile_path)
    }

    pub fn devices_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.devices_path)
    }
}

/// 文件设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSettings {
    /// 令牌文件，每行一个
    #[serde(default = "default_tokens_file")]
    pub tokens: PathBuf,
    /// 代理缓存文件，每行一个
    #[serde(default = "default_proxy_file")]
    pub proxies: PathBuf,
}

fn default_tokens_file() -> PathBuf { PathBuf::from("tokens.txt") }
fn default_proxy_file() -> PathBuf { PathBuf::from("proxy.txt") }

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            tokens: default_tokens_file(),
            proxies: default_proxy_file(),
        }
    }
}

/// 公共代理列表设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySourceSettings {
    #[serde(default = "default_list_url")]
    pub list_url: String,
    /// 下载超时（秒）
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_list_url() -> String {
    "https://raw.githubusercontent.com/monosans/proxy-list/main/proxies/all.txt".to_string()
}
fn default_fetch_timeout() -> u64 { 30 }

impl Default for ProxySourceSettings {
    fn default() -> Self {
        Self {
            list_url: default_list_url(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

/// 间隔与超时设置（秒）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// 两次积分查询之间的间隔
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// 单次HTTP请求超时
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// 获取设备ID的最大尝试次数
    #[serde(default = "default_device_attempts")]
    pub device_attempts: u32,
    #[serde(default = "default_device_retry_delay")]
    pub device_retry_delay_secs: u64,
    /// 断线重连前的等待
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// 协议层Ping间隔
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// 无消息的最长等待
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// 建立WebSocket连接的超时
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Ctrl+C后等待任务退出的时间
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_poll_interval() -> u64 { 30 }
fn default_request_timeout() -> u64 { 10 }
fn default_device_attempts() -> u32 { 2 }
fn default_device_retry_delay() -> u64 { 1 }
fn default_reconnect_delay() -> u64 { 2 }
fn default_ping_interval() -> u64 { 25 }
fn default_idle_timeout() -> u64 { 30 }
fn default_connect_timeout() -> u64 { 30 }
fn default_shutdown_grace() -> u64 { 5 }

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
            device_attempts: default_device_attempts(),
            device_retry_delay_secs: default_device_retry_delay(),
            reconnect_delay_secs: default_reconnect_delay(),
            ping_interval_secs: default_ping_interval(),
            idle_timeout_secs: default_idle_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl TimingSettings {
    pub fn poll_interval(&self) -> Duration { Duration::from_secs(self.poll_interval_secs) }
    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }
    pub fn device_retry_delay(&self) -> Duration { Duration::from_secs(self.device_retry_delay_secs) }
    pub fn reconnect_delay(&self) -> Duration { Duration::from_secs(self.reconnect_delay_secs) }
    pub fn ping_interval(&self) -> Duration { Duration::from_secs(self.ping_interval_secs) }
    pub fn idle_timeout(&self) -> Duration { Duration::from_secs(self.idle_timeout_secs) }
    pub fn connect_timeout(&self) -> Duration { Duration::from_secs(self.connect_timeout_secs) }
    pub fn shutdown_grace(&self) -> Duration { Duration::from_secs(self.shutdown_grace_secs) }
}

/// 日志设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// 时间戳使用的UTC偏移（小时）
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
    /// 时间戳后缀
    #[serde(default = "default_zone_label")]
    pub zone_label: String,
    /// 是否使用彩色输出
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_utc_offset() -> i32 { 7 }
fn default_zone_label() -> String { "WIB".to_string() }
fn default_color() -> bool { true }

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset(),
            zone_label: default_zone_label(),
            color: default_color(),
        }
    }
}

/// 配置的来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// 从已有文件读取
    File(PathBuf),
    /// 文件不存在，已写出默认配置
    Created(PathBuf),
    /// 读取或写入失败，使用默认配置
    Fallback(String),
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::File(path) => write!(f, "配置已从 {} 加载", path.display()),
            ConfigOrigin::Created(path) => write!(f, "默认配置已保存到 {}", path.display()),
            ConfigOrigin::Fallback(reason) => write!(f, "加载配置失败，使用默认配置: {}", reason),
        }
    }
}

impl Config {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("无法读取配置文件: {}", e);
                return Err(crate::error::Error::Configuration(
                    format!("无法读取配置文件: {}", e)
                ));
            }
        };

        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 读取配置；文件不存在时写出默认配置，读取失败时回退到默认值
    ///
    /// 调用时日志通常还没初始化，来源信息通过 [`ConfigOrigin`] 交给调用方记录。
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> (Self, ConfigOrigin) {
        let path = path.as_ref();
        if path.exists() {
            match Self::from_file(path) {
                Ok(cfg) => (cfg, ConfigOrigin::File(path.to_path_buf())),
                Err(e) => (Self::default(), ConfigOrigin::Fallback(e.to_string())),
            }
        } else {
            let config = Self::default();
            let origin = match config.save_to_file(path) {
                Ok(()) => ConfigOrigin::Created(path.to_path_buf()),
                Err(e) => ConfigOrigin::Fallback(e.to_string()),
            };
            (config, origin)
        }
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let timing = &self.timing;
        let non_zero = [
            ("timing.poll_interval_secs", timing.poll_interval_secs),
            ("timing.request_timeout_secs", timing.request_timeout_secs),
            ("timing.reconnect_delay_secs", timing.reconnect_delay_secs),
            ("timing.ping_interval_secs", timing.ping_interval_secs),
            ("timing.idle_timeout_secs", timing.idle_timeout_secs),
            ("timing.connect_timeout_secs", timing.connect_timeout_secs),
            ("proxy_source.fetch_timeout_secs", self.proxy_source.fetch_timeout_secs),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(crate::error::Error::Configuration(format!("{} must be greater than 0", name)));
        }
        if self.timing.device_attempts == 0 {
            return Err(crate::error::Error::Configuration(
                "timing.device_attempts must be at least 1".to_string(),
            ));
        }
        if !(-12..=14).contains(&self.log.utc_offset_hours) {
            return Err(crate::error::Error::Configuration(format!(
                "log.utc_offset_hours out of range: {}",
                self.log.utc_offset_hours
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_intervals() {
        let config = Config::default();
        assert_eq!(config.timing.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.timing.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.timing.device_attempts, 2);
        assert_eq!(config.timing.device_retry_delay(), Duration::from_secs(1));
        assert_eq!(config.timing.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(config.timing.ping_interval(), Duration::from_secs(25));
        assert_eq!(config.timing.idle_timeout(), Duration::from_secs(30));
        assert_eq!(config.proxy_source.fetch_timeout_secs, 30);
        assert_eq!(config.api.profile_url(), "https://api.sparkchain.ai/profile");
        assert_eq!(config.api.devices_url(), "https://api.sparkchain.ai/devices");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[timing]\npoll_interval_secs = 45\n\n[files]\ntokens = \"accounts.txt\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.timing.poll_interval_secs, 45);
        assert_eq!(config.timing.reconnect_delay_secs, 2);
        assert_eq!(config.files.tokens, PathBuf::from("accounts.txt"));
        assert_eq!(config.files.proxies, PathBuf::from("proxy.txt"));
        assert_eq!(config.log.zone_label, "WIB");
    }

    #[test]
    fn load_or_init_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let (config, origin) = Config::load_or_init(&path);
        assert_eq!(origin, ConfigOrigin::Created(path.clone()));
        assert!(path.exists());
        assert_eq!(config.api.device_version, "0.9.2");

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.api.socket_url, config.api.socket_url);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[timing]\ndevice_attempts = 0\n").unwrap();

        assert!(Config::from_file(&path).is_err());
        let (config, origin) = Config::load_or_init(&path);
        assert!(matches!(origin, ConfigOrigin::Fallback(_)));
        assert_eq!(config.timing.device_attempts, 2);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        for body in [
            "[timing]\nping_interval_secs = 0\n",
            "[timing]\npoll_interval_secs = 0\n",
            "[timing]\nidle_timeout_secs = 0\n",
            "[timing]\nrequest_timeout_secs = 0\n",
            "[timing]\nreconnect_delay_secs = 0\n",
            "[timing]\nconnect_timeout_secs = 0\n",
            "[proxy_source]\nfetch_timeout_secs = 0\n",
        ] {
            fs::write(&path, body).unwrap();
            let err = Config::from_file(&path).unwrap_err();
            assert!(err.to_string().contains("must be greater than 0"), "{}: {}", body, err);
        }

        fs::write(&path, "[timing]\nping_interval_secs = 0\n").unwrap();
        let (config, origin) = Config::load_or_init(&path);
        assert!(matches!(origin, ConfigOrigin::Fallback(_)));
        assert_eq!(config.timing.ping_interval(), Duration::from_secs(25));
    }
}
