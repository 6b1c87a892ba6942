//! 代理列表的加载与轮询分配
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use colored::*;
use tracing::{info, warn};

use crate::config::ProxySourceSettings;
use crate::error::Result;
use crate::proxy::ProxyEntry;

/// 代理来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxySource {
    /// 下载公共代理列表并写入本地缓存文件
    Remote,
    /// 读取本地缓存文件
    Local,
}

/// 启动时加载一次的代理列表，进程生命周期内不再变化
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Arc<[ProxyEntry]>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<ProxyEntry>) -> Self {
        Self { proxies: proxies.into() }
    }

    /// 把文本内容按行解析为代理列表，空行跳过，保留重复项和原有顺序
    pub fn parse(content: &str) -> Self {
        let proxies = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ProxyEntry::resolve)
            .collect::<Vec<_>>();
        Self::new(proxies)
    }

    /// 按来源加载代理；结果为空只记录警告，由调用方决定是否退出
    pub async fn load(source: ProxySource, settings: &ProxySourceSettings, cache_file: &Path) -> Result<Self> {
        let pool = match source {
            ProxySource::Remote => Self::load_remote(settings, cache_file).await?,
            ProxySource::Local => Self::load_from_file(cache_file)?,
        };

        if pool.is_empty() {
            warn!("{}", "No proxies found!".red());
        } else {
            info!("{} {} {}", "Loaded".green(), pool.len().to_string().yellow().bold(), "proxies.".green());
        }
        Ok(pool)
    }

    /// 下载代理列表，原始内容整体写入缓存文件
    pub async fn load_remote(settings: &ProxySourceSettings, cache_file: &Path) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .build()?;

        let content = client
            .get(&settings.list_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        fs::write(cache_file, &content)?;
        Ok(Self::parse(&content))
    }

    /// 读取本地缓存文件；文件不存在时返回空列表
    pub fn load_from_file(cache_file: &Path) -> Result<Self> {
        match fs::read_to_string(cache_file) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("{} {}", cache_file.display().to_string().red(), "not found!".red());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// 按槽位轮询取代理：`proxies[slot % len]`
    pub fn at(&self, slot: usize) -> Option<&ProxyEntry> {
        if self.proxies.is_empty() {
            return None;
        }
        self.proxies.get(slot % self.proxies.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProxyEntry> {
        self.proxies.iter()
    }
}
