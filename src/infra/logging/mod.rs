//! 日志系统模块
//!
//! 本模块提供了统一的日志记录功能，使用 `tracing` 库实现。

use std::str::FromStr;
use tracing::{info, Level};

use super::error::{Error, Result};

/// 日志级别
///
/// 从低到高：Trace < Debug < Info < Warn < Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// 最详细的日志级别（调试用）
    Trace,
    /// 调试信息
    Debug,
    /// 一般信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::Config(format!("未知的日志级别: {}", other))),
        }
    }
}

/// 日志格式
///
/// 日志的输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 默认格式（人类可读）
    Default,
    /// JSON 格式（机器可读）
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" | "text" => Ok(LogFormat::Default),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!("未知的日志格式: {}", other))),
        }
    }
}

/// 日志配置
///
/// 配置日志系统的行为
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,
    /// 日志格式
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Default,
        }
    }
}

impl LoggingConfig {
    /// 从配置文件中的日志段构建
    ///
    /// `verbose` 为 true 时强制使用 DEBUG 级别
    pub fn from_section(section: &super::config::LoggingSection, verbose: bool) -> Result<Self> {
        let level = match (&section.level, verbose) {
            (_, true) => LogLevel::Debug,
            (Some(level), false) => level.parse()?,
            (None, false) => LogLevel::Info,
        };
        let format = match &section.format {
            Some(format) => format.parse()?,
            None => LogFormat::Default,
        };
        Ok(Self { level, format })
    }
}

/// 初始化日志系统
///
/// # 参数说明
/// * `config` - 日志配置
///
/// 全局 subscriber 只能设置一次，重复初始化返回配置错误
pub fn init(config: &LoggingConfig) -> Result<()> {
    let level_filter = match config.level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    };

    let result = match config.format {
        LogFormat::Default => {
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(level_filter)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_max_level(level_filter)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
    };

    result.map_err(|e| Error::Config(format!("设置全局日志 subscriber 失败: {}", e)))?;

    info!(level = ?config.level, format = ?config.format, "日志系统初始化完成");
    Ok(())
}

/// 截断日志中的消息文本
///
/// 按字符截断，避免切断多字节字符
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
