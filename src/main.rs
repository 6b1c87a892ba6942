use anyhow::Result;
use sparknode::{
    init_logger, launch, random_user_agent, Config, ConfigOrigin, HttpApi, KeepaliveOptions, LogContext,
    SocketWorker, WsDialer,
};
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(feature = "ui")]
use sparknode::ui;

const VERSION: &str = "v0.1.0";

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let (config, origin) = Config::load_or_init("config.toml");

    // 初始化日志
    let context = LogContext::from_settings(&config.log)?;
    #[cfg(feature = "ui")]
    {
        ui::init_ui(context.color);
        ui::print_banner(VERSION);
    }
    #[cfg(not(feature = "ui"))]
    println!("SparkNode {}", VERSION);
    init_logger(&context);

    match &origin {
        ConfigOrigin::Fallback(_) => warn!("{}", origin),
        _ => info!("{}", origin),
    }

    // HTTP请求和WebSocket使用同一个UA
    let user_agent = random_user_agent();
    let timing = &config.timing;
    let devices = HttpApi::new(config.api.clone(), timing.request_timeout(), user_agent.clone());
    let dialer = WsDialer::new(config.api.clone(), user_agent, timing.connect_timeout());
    let worker = Arc::new(SocketWorker::new(
        devices,
        dialer,
        timing.device_attempts,
        timing.device_retry_delay(),
        timing.reconnect_delay(),
        KeepaliveOptions::from_timing(timing),
    ));

    match launch(&config, worker).await {
        Ok(report) => {
            let summary = format!(
                "[ EXIT ] SparkNode stopped: {} cancelled, {} abandoned, {} aborted.",
                report.cancelled, report.abandoned, report.aborted
            );
            #[cfg(feature = "ui")]
            ui::print_warning(&summary);
            #[cfg(not(feature = "ui"))]
            println!("{}", summary);
        }
        Err(e) => {
            #[cfg(feature = "ui")]
            ui::print_error(&format!("{:#}", e));
            #[cfg(not(feature = "ui"))]
            eprintln!("{:#}", e);
        }
    }
    Ok(())
}
