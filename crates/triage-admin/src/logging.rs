//! 日志初始化

use anyhow::{Context, Result};
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// 构建日志过滤器
///
/// 优先使用 `RUST_LOG`，其次是显式指定的级别，最后是配置中的级别。
pub fn build_filter(config: &LoggingConfig, level_override: Option<&str>) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = level_override.unwrap_or(&config.level);
    EnvFilter::try_new(directive).with_context(|| format!("Invalid log level {:?}", directive))
}

/// 配置加载期间使用的文本订阅者，级别不读取配置文件
///
/// 与 `tracing::subscriber::with_default` 配合，加载配置时产生的日志不会丢失。
pub fn startup_subscriber(level_override: Option<&str>) -> Result<impl Subscriber + Send + Sync> {
    let filter = build_filter(&LoggingConfig::default(), level_override)?;
    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish())
}

/// 初始化全局日志订阅者，只能调用一次
pub fn init_tracing(config: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let filter = build_filter(config, level_override)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
