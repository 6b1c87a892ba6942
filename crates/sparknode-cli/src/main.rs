use anyhow::Result;
use colored::*;
use sparknode_cli::launch;
use sparknode_core::{init_logger, random_user_agent, Config, HttpApi, LogContext, PollingWorker};
use std::sync::Arc;
use tracing::{error, info, warn};

const VERSION: &str = "v0.1.0";
const BANNER: &str = r#"
╔═╗╔═╗╔═╗╦═╗╦╔═  ╔═╗╔═╗╦  ╦
╚═╗╠═╝╠═╣╠╦╝╠╩╗  ╠═╝║ ║║  ║
╚═╝╩  ╩ ╩╩╚═╩ ╩  ╩  ╚═╝╩═╝╩═╝
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载或创建配置
    let (config, origin) = Config::load_or_init("config.toml");

    // 初始化日志
    let context = LogContext::from_settings(&config.log)?;
    init_logger(&context);

    // 显示程序信息
    println!("{} {}", BANNER.cyan().bold(), VERSION);
    match &origin {
        sparknode_core::ConfigOrigin::Fallback(_) => warn!("{}", origin),
        _ => info!("{}", origin),
    }

    let api = HttpApi::new(config.api.clone(), config.timing.request_timeout(), random_user_agent());
    let worker = Arc::new(PollingWorker::new(api, config.timing.poll_interval()));

    match launch(&config, worker).await {
        Ok(report) => info!(
            "{}",
            format!("[ EXIT ] SparkNode poller stopped ({} nodes cancelled).", report.cancelled).yellow()
        ),
        Err(e) => error!("{}", format!("{:#}", e).red()),
    }
    Ok(())
}
