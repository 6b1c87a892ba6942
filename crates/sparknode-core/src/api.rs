//! REST接口客户端
//!
//! 每次请求都新建一个 `reqwest::Client`，绑定该节点自己的代理，不在节点之间共享连接。
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::ApiSettings;
use crate::error::{Error, Result};
use crate::proxy::ProxyEntry;

/// 桌面浏览器UA，进程启动时随机选一个
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

pub fn random_user_agent() -> String {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
        .to_string()
}

/// 积分查询结果
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub total_points: Option<Value>,
}

impl Profile {
    /// 日志中展示的积分，缺失时为 `N/A`
    pub fn points(&self) -> String {
        match &self.total_points {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "N/A".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// 积分查询接口
#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// 只有HTTP 200才返回Ok，其他状态码返回 [`Error::Status`]
    async fn profile(&self, token: &str, proxy: Option<&ProxyEntry>) -> Result<Profile>;
}

/// 设备注册接口
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// 设备列表第一项的 `device_id`；列表为空或字段缺失时返回 `Ok(None)`
    async fn device_id(&self, token: &str, proxy: Option<&ProxyEntry>) -> Result<Option<String>>;
}

/// 基于reqwest的接口实现
#[derive(Debug, Clone)]
pub struct HttpApi {
    settings: ApiSettings,
    timeout: Duration,
    user_agent: String,
}

impl HttpApi {
    pub fn new(settings: ApiSettings, timeout: Duration, user_agent: String) -> Self {
        Self { settings, timeout, user_agent }
    }

    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, header_value(&self.settings.accept_language)?);
        headers.insert(ORIGIN, header_value(&self.settings.site_origin)?);
        headers.insert("priority", HeaderValue::from_static("u=1, i"));
        headers.insert(REFERER, header_value(&format!("{}/", self.settings.site_origin.trim_end_matches('/')))?);
        headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("same-site"));
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
        Ok(headers)
    }

    fn client(&self, token: &str, proxy: Option<&ProxyEntry>) -> Result<Client> {
        let builder = Client::builder()
            .timeout(self.timeout)
            .default_headers(self.headers(token)?);

        let builder = match proxy {
            Some(proxy) => builder.proxy(http_proxy(proxy)?),
            None => builder.no_proxy(),
        };
        Ok(builder.build()?)
    }
}

#[async_trait]
impl ProfileApi for HttpApi {
    async fn profile(&self, token: &str, proxy: Option<&ProxyEntry>) -> Result<Profile> {
        let resp = self.client(token, proxy)?
            .get(self.settings.profile_url())
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(Error::Status(resp.status().as_u16()));
        }
        Ok(resp.json::<Profile>().await?)
    }
}

#[async_trait]
impl DeviceApi for HttpApi {
    async fn device_id(&self, token: &str, proxy: Option<&ProxyEntry>) -> Result<Option<String>> {
        let devices = self.client(token, proxy)?
            .get(self.settings.devices_url())
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        Ok(first_device_id(&devices))
    }
}

/// 把代理地址转成reqwest代理，不支持或格式错误时返回 [`Error::InvalidProxy`]
pub fn http_proxy(proxy: &ProxyEntry) -> Result<reqwest::Proxy> {
    reqwest::Proxy::all(proxy.as_str()).map_err(|e| Error::InvalidProxy(format!("{}: {}", proxy, e)))
}

fn first_device_id(devices: &Value) -> Option<String> {
    match devices.as_array()?.first()?.get("device_id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Configuration(format!("invalid header value: {}", e)))
}
