//! SparkNode CLI - console front-end shared by the node runners
//!
//! This library asks the operator how to run, loads accounts and proxies and
//! hands the resulting node plan to the dispatcher.

use anyhow::{bail, Context, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use sparknode_core::{
    load_credentials, plan, Config, DispatchReport, Dispatcher, Error, NodeWorker, ProxyPool, ProxySource,
};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 代理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    /// 下载公共代理列表
    Public,
    /// 使用本地 proxy.txt
    Own,
    /// 直连
    Direct,
}

impl ProxyMode {
    pub fn from_choice(choice: &str) -> Option<Self> {
        match choice.trim() {
            "1" => Some(ProxyMode::Public),
            "2" => Some(ProxyMode::Own),
            "3" => Some(ProxyMode::Direct),
            _ => None,
        }
    }

    /// 需要加载代理时返回对应的来源
    pub fn source(&self) -> Option<ProxySource> {
        match self {
            ProxyMode::Public => Some(ProxySource::Remote),
            ProxyMode::Own => Some(ProxySource::Local),
            ProxyMode::Direct => None,
        }
    }
}

/// 控制台选择的运行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub mode: ProxyMode,
    pub nodes_per_account: usize,
}

const MODE_MENU: [&str; 3] = [
    "1. Run With Free Public Proxy (Monosans List)",
    "2. Run With Your Own Proxy List (proxy.txt)",
    "3. Run Without Proxy",
];
const MODE_PROMPT: &str = "Choose [1/2/3] -> ";
const NODES_PROMPT: &str = "How Many Nodes Do You Want to Run For Each Account? -> ";

/// 读取一行输入；输入结束时报错
fn read_answer<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> Result<String> {
    write!(output, "{}", prompt.bold())?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("input closed before a choice was made");
    }
    Ok(line.trim().to_string())
}

/// 询问代理模式，输入无效时一直重复询问
pub fn prompt_proxy_mode<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<ProxyMode> {
    for line in MODE_MENU {
        writeln!(output, "{}", line.bold())?;
    }
    loop {
        let answer = read_answer(input, output, MODE_PROMPT)?;
        match ProxyMode::from_choice(&answer) {
            Some(mode) => return Ok(mode),
            None => writeln!(output, "{}", "Please enter either 1, 2 or 3.".red().bold())?,
        }
    }
}

/// 询问每个账号的节点数（正整数）
pub fn prompt_node_count<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<usize> {
    loop {
        let answer = read_answer(input, output, NODES_PROMPT)?;
        match answer.parse::<usize>() {
            Ok(count) if count > 0 => return Ok(count),
            Ok(_) => writeln!(output, "{}", "Please enter a positive number.".red().bold())?,
            Err(_) => writeln!(output, "{}", "Invalid input. Enter a number.".red().bold())?,
        }
    }
}

/// 完整的启动问答；直连模式固定每个账号一个节点
pub fn prompt_settings<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<RunSettings> {
    let mode = prompt_proxy_mode(input, output)?;
    let nodes_per_account = match mode {
        ProxyMode::Direct => 1,
        _ => prompt_node_count(input, output)?,
    };
    Ok(RunSettings { mode, nodes_per_account })
}

/// 创建一个标准格式的等待动画
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// 加载代理；必须使用代理时列表为空视为致命错误
async fn load_proxies(config: &Config, source: ProxySource) -> Result<ProxyPool> {
    let spinner = create_spinner("Loading proxies...");
    let loaded = ProxyPool::load(source, &config.proxy_source, Path::new(&config.files.proxies)).await;
    spinner.finish_and_clear();

    let pool = loaded.context("Failed to load proxies")?;
    if pool.is_empty() {
        return Err(Error::NoProxies.into());
    }
    Ok(pool)
}

/// 启动流程：读取账号 → 控制台问答 → 加载代理 → 分配节点 → 运行到 Ctrl+C
pub async fn launch<W: NodeWorker>(config: &Config, worker: Arc<W>) -> Result<DispatchReport> {
    let credentials = load_credentials(Path::new(&config.files.tokens))?;

    let settings = tokio::task::spawn_blocking(|| {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        prompt_settings(&mut input, &mut output)
    })
    .await??;

    let proxies = match settings.mode.source() {
        Some(source) => Some(load_proxies(config, source).await?),
        None => None,
    };

    info!("{}", format!("Account's Total: {}", credentials.len()).bold());

    let assignments = plan(&credentials, settings.nodes_per_account, proxies.as_ref());
    let dispatcher = Dispatcher::new(config.timing.shutdown_grace());

    let report = dispatcher
        .run_until(worker, assignments, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(report)
}
