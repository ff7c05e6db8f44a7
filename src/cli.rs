use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;

use crate::config::Config;
use crate::log_adapter::LogAdapter;
use crate::realtime_monitor::RealTimeMonitor;
use crate::terminal_log;

// 命令行参数常量
const CONFIG_ARG: &str = "config";
const CHECK_ARG: &str = "check";

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/arbitrage-spy.yaml";

/// CLI应用程序结构
pub struct CliApp {
    config: Config,
}

impl CliApp {
    /// 加载配置并初始化日志
    pub fn new(config_path: &str) -> Result<Self> {
        let config = Config::load(config_path)
            .with_context(|| format!("failed to load config from {}", config_path))?;

        LogAdapter::init(&config.monitor.log_level);
        info!("配置加载完成: {}", config_path);

        Ok(Self { config })
    }

    /// 构建命令行参数解析器
    pub fn build_cli() -> Command {
        Command::new("arbitrage-spy")
            .version(env!("CARGO_PKG_VERSION"))
            .about("跨交易所 DEX 价格监控与套利机会检测")
            .arg(
                Arg::new(CONFIG_ARG)
                    .long(CONFIG_ARG)
                    .short('c')
                    .help("配置文件路径 (yaml/toml/json)")
                    .value_name("FILE")
                    .default_value(DEFAULT_CONFIG_PATH),
            )
            .arg(
                Arg::new(CHECK_ARG)
                    .long(CHECK_ARG)
                    .help("只校验配置并打印摘要")
                    .action(ArgAction::SetTrue),
            )
    }

    /// 配置文件路径
    pub fn config_path(matches: &ArgMatches) -> &str {
        matches
            .get_one::<String>(CONFIG_ARG)
            .map(String::as_str)
            .unwrap_or(DEFAULT_CONFIG_PATH)
    }

    /// 运行CLI应用程序
    pub async fn run(self, matches: &ArgMatches) -> Result<()> {
        if matches.get_flag(CHECK_ARG) {
            self.print_summary();
            return Ok(());
        }

        RealTimeMonitor::new(self.config).start_monitoring().await
    }

    /// 打印配置摘要
    fn print_summary(&self) {
        terminal_log!(info, "配置校验通过");
        for (network, network_config) in &self.config.networks {
            terminal_log!(info, "网络 {} ({})", network, network_config.rpc_url);
            for (exchange, exchange_config) in &network_config.exchanges {
                let fee = exchange_config
                    .fee
                    .map(|fee| format!("{:.4}", fee))
                    .unwrap_or_else(|| "-".to_string());
                terminal_log!(
                    info,
                    "  交易所 {} [{}] 默认费率 {}，{} 个交易对",
                    exchange,
                    exchange_config.kind,
                    fee,
                    exchange_config.pairs.len()
                );
                for pair in &exchange_config.pairs {
                    terminal_log!(info, "    {} @ {}", pair.pair_name(), pair.address);
                }
            }
        }
        terminal_log!(info, "共 {} 个交易对", self.config.total_pairs());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let matches = CliApp::build_cli().get_matches_from(["arbitrage-spy"]);
        assert_eq!(CliApp::config_path(&matches), DEFAULT_CONFIG_PATH);
        assert!(!matches.get_flag(CHECK_ARG));
    }

    #[test]
    fn test_cli_config_and_check() {
        let matches = CliApp::build_cli()
            .get_matches_from(["arbitrage-spy", "-c", "mainnet.toml", "--check"]);
        assert_eq!(CliApp::config_path(&matches), "mainnet.toml");
        assert!(matches.get_flag(CHECK_ARG));
    }

    /// --check 只打印摘要，不连接节点也不等待 Ctrl-C
    #[tokio::test]
    async fn test_check_validates_bundled_config_and_exits() {
        let matches = CliApp::build_cli()
            .get_matches_from(["arbitrage-spy", "-c", DEFAULT_CONFIG_PATH, "--check"]);
        let app = CliApp::new(CliApp::config_path(&matches)).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), app.run(&matches))
            .await
            .expect("--check 不应启动实时监控");
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(CliApp::new("does/not/exist.yaml").is_err());
    }
}
