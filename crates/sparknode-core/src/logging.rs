//! 日志初始化
//!
//! 时区与颜色设置由 [`LogContext`] 显式传入，不依赖全局时区状态。

use chrono::{DateTime, FixedOffset, Utc};
use colored::*;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogSettings;
use crate::error::{Error, Result};

/// 日志上下文：时区偏移、时区标签与是否彩色输出
#[derive(Debug, Clone)]
pub struct LogContext {
    pub utc_offset: FixedOffset,
    pub zone_label: String,
    pub color: bool,
}

impl LogContext {
    pub fn from_settings(settings: &LogSettings) -> Result<Self> {
        let utc_offset = FixedOffset::east_opt(settings.utc_offset_hours * 3600).ok_or_else(|| {
            Error::Configuration(format!("invalid utc offset: {}", settings.utc_offset_hours))
        })?;
        Ok(Self {
            utc_offset,
            zone_label: settings.zone_label.clone(),
            color: settings.color,
        })
    }

    /// `[ 10/16/26 14:03:22 WIB ]`
    pub fn stamp(&self, at: DateTime<Utc>) -> String {
        let local = at.with_timezone(&self.utc_offset);
        format!("[ {} {} ]", local.format("%x %X"), self.zone_label)
    }
}

/// 按上下文时区格式化的时间戳
#[derive(Debug, Clone)]
pub struct ZonedTimer {
    context: LogContext,
}

impl FormatTime for ZonedTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let stamp = self.context.stamp(Utc::now());
        if self.context.color {
            write!(w, "{}", stamp.cyan().bold())
        } else {
            write!(w, "{}", stamp)
        }
    }
}

/// Initialize the logger from an explicit context
pub fn init_logger(context: &LogContext) {
    colored::control::set_override(context.color);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(false)
        .with_ansi(context.color)
        .with_timer(ZonedTimer { context: context.clone() })
        .try_init();
}
