use log::LevelFilter;
use std::str::FromStr;

/// 日志适配器，统一初始化 env_logger
pub struct LogAdapter;

impl LogAdapter {
    /// 初始化日志系统
    ///
    /// `default_level` 来自配置文件 (monitor.log_level)，设置了 RUST_LOG 时以环境变量为准。
    /// 重复初始化（例如测试中）会被忽略。
    pub fn init(default_level: &str) {
        let level = Self::parse_level(default_level);

        let mut builder = env_logger::Builder::new();
        builder.filter_level(level);
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }

        if builder.try_init().is_err() {
            log::debug!("日志系统已初始化，跳过");
        }
    }

    /// 解析日志级别，无法识别时回退到 info
    pub fn parse_level(level: &str) -> LevelFilter {
        LevelFilter::from_str(level.trim()).unwrap_or(LevelFilter::Info)
    }
}

/// 强制输出到终端的宏
#[macro_export]
macro_rules! terminal_log {
    ($level:ident, $($arg:tt)*) => {
        {
            println!("[{}] {}", stringify!($level).to_uppercase(), format!($($arg)*));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(LogAdapter::parse_level("debug"), LevelFilter::Debug);
        assert_eq!(LogAdapter::parse_level(" WARN "), LevelFilter::Warn);
        assert_eq!(LogAdapter::parse_level("verbose"), LevelFilter::Info);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        LogAdapter::init("info");
        LogAdapter::init("debug");
    }
}
