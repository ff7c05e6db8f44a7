use config::{Environment, File, FileFormat};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::core::types::{PairKind, Token, TradingPair};
use crate::error::ConfigError;
use crate::utils::is_valid_ethereum_address;

/// 环境变量覆盖前缀，例如 ARB_SPY__MONITOR__PRICE_PERIOD_MS=500
pub const ENV_PREFIX: &str = "ARB_SPY";

/// 单个代币允许的最大小数位数
pub const MAX_DECIMALS: u8 = 36;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitoringConfig,
    #[serde(default)]
    pub api: ApiConfig,
    pub networks: BTreeMap<String, NetworkConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_period_ms")]
    pub price_period_ms: u64,
    #[serde(default = "default_period_ms")]
    pub match_period_ms: u64,
    #[serde(default = "default_period_ms")]
    pub engine_period_ms: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default)]
    pub print_table: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    #[serde(default)]
    pub exchanges: BTreeMap<String, ExchangeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub kind: PairKind,
    /// 交易所默认费率，缺省时只能依赖 pair_fees
    #[serde(default)]
    pub fee: Option<f64>,
    #[serde(default)]
    pub pair_fees: Vec<PairFeeConfig>,
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
}

/// 针对单个交易对的费率覆盖
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairFeeConfig {
    pub pair: String,
    pub fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    /// 池子合约地址
    pub address: String,
    /// 覆盖交易所的池子类型
    #[serde(default)]
    pub kind: Option<PairKind>,
    pub token0: TokenConfig,
    pub token1: TokenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
}

fn default_period_ms() -> u64 {
    1000
}

fn default_rpc_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            price_period_ms: default_period_ms(),
            match_period_ms: default_period_ms(),
            engine_period_ms: default_period_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            print_table: false,
            log_level: default_log_level(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
        }
    }
}

impl MonitoringConfig {
    pub fn price_period(&self) -> Duration {
        Duration::from_millis(self.price_period_ms)
    }

    pub fn match_period(&self) -> Duration {
        Duration::from_millis(self.match_period_ms)
    }

    pub fn engine_period(&self) -> Duration {
        Duration::from_millis(self.engine_period_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl PairConfig {
    pub fn pair_name(&self) -> String {
        format!("{}/{}", self.token0.symbol, self.token1.symbol)
    }
}

impl Config {
    /// 从文件加载配置（按扩展名识别 yaml/toml/json），并叠加 ARB_SPY__ 环境变量
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config: Config = config::Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// 从字符串解析配置，不读取环境变量
    pub fn parse(content: &str, format: FileFormat) -> Result<Self, ConfigError> {
        let config: Config = config::Config::builder()
            .add_source(File::from_str(content, format))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// 启动时校验，任何结构性错误都是致命的
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.networks.is_empty() {
            return Err(ConfigError::Invalid("at least one network is required".to_string()));
        }

        let periods = [
            ("monitor.price_period_ms", self.monitor.price_period_ms),
            ("monitor.match_period_ms", self.monitor.match_period_ms),
            ("monitor.engine_period_ms", self.monitor.engine_period_ms),
            ("monitor.rpc_timeout_ms", self.monitor.rpc_timeout_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }

        for (network, network_config) in &self.networks {
            Self::validate_rpc_url(network, &network_config.rpc_url)?;

            for (exchange, exchange_config) in &network_config.exchanges {
                Self::validate_exchange(network, exchange, exchange_config)?;
            }
        }

        Ok(())
    }

    fn validate_rpc_url(network: &str, rpc_url: &str) -> Result<(), ConfigError> {
        let url = Url::parse(rpc_url).map_err(|e| {
            ConfigError::Invalid(format!("network {}: invalid rpc_url {}: {}", network, rpc_url, e))
        })?;

        match url.scheme() {
            "http" | "https" | "ws" | "wss" => Ok(()),
            scheme => Err(ConfigError::Invalid(format!(
                "network {}: unsupported rpc_url scheme {}",
                network, scheme
            ))),
        }
    }

    fn validate_exchange(
        network: &str,
        exchange: &str,
        config: &ExchangeConfig,
    ) -> Result<(), ConfigError> {
        let fees = config
            .fee
            .into_iter()
            .chain(config.pair_fees.iter().map(|override_fee| override_fee.fee));
        for fee in fees {
            if !(0.0..1.0).contains(&fee) {
                return Err(ConfigError::InvalidFee {
                    exchange: exchange.to_string(),
                    fee,
                });
            }
        }

        let mut seen = HashSet::new();
        for pair in &config.pairs {
            let name = pair.pair_name();
            if !seen.insert(name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "network {}: duplicate pair {} on exchange {}",
                    network, name, exchange
                )));
            }

            for address in [&pair.address, &pair.token0.address, &pair.token1.address] {
                if !is_valid_ethereum_address(address) {
                    return Err(ConfigError::InvalidAddress(address.clone()));
                }
            }

            for token in [&pair.token0, &pair.token1] {
                if token.decimals > MAX_DECIMALS {
                    return Err(ConfigError::Invalid(format!(
                        "token {} has {} decimals (max {})",
                        token.symbol, token.decimals, MAX_DECIMALS
                    )));
                }
            }
        }

        Ok(())
    }

    /// 构造某个网络下所有交易对（池子）
    pub fn trading_pairs(&self, network: &str) -> Result<Vec<TradingPair>, ConfigError> {
        let network_config = self
            .networks
            .get(network)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown network {}", network)))?;

        let mut pairs = Vec::new();
        for (exchange, exchange_config) in &network_config.exchanges {
            for pair in &exchange_config.pairs {
                let token0 = Token::new(&pair.token0.symbol, &pair.token0.address, pair.token0.decimals)?;
                let token1 = Token::new(&pair.token1.symbol, &pair.token1.address, pair.token1.decimals)?;
                let pool_address = Address::from_str(&pair.address)
                    .map_err(|_| ConfigError::InvalidAddress(pair.address.clone()))?;
                let kind = pair.kind.unwrap_or(exchange_config.kind);

                pairs.push(TradingPair::new(token0, token1, exchange, pool_address, kind));
            }
        }

        Ok(pairs)
    }

    /// 所有网络名称
    pub fn network_names(&self) -> Vec<String> {
        self.networks.keys().cloned().collect()
    }

    /// 配置的交易对总数
    pub fn total_pairs(&self) -> usize {
        self.networks
            .values()
            .flat_map(|network| network.exchanges.values())
            .map(|exchange| exchange.pairs.len())
            .sum()
    }
}
