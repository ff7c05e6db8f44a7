use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

use crate::error::ConfigError;
use crate::price_calculator::PriceCalculator;
use crate::utils::checksum_address;

/// 代币信息，构造后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Token {
    pub symbol: String,
    /// EIP-55 校验和格式的合约地址
    pub address: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(symbol: &str, address: &str, decimals: u8) -> Result<Self, ConfigError> {
        let address = checksum_address(address)
            .ok_or_else(|| ConfigError::InvalidAddress(address.to_string()))?;

        Ok(Self {
            symbol: symbol.to_string(),
            address,
            decimals,
        })
    }
}

/// 池子类型：决定原始状态的格式与价格推导公式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairKind {
    /// 恒定乘积池 (Uniswap V2 及其分叉)
    #[serde(alias = "amm_v2")]
    ConstantProduct,
    /// 集中流动性池 (Uniswap V3 及其分叉)
    #[serde(alias = "amm_v3")]
    ConcentratedLiquidity,
}

impl fmt::Display for PairKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairKind::ConstantProduct => write!(f, "constant-product"),
            PairKind::ConcentratedLiquidity => write!(f, "concentrated-liquidity"),
        }
    }
}

/// 某个交易所上的一个交易对（池子）
///
/// token0/token1 的顺序与池子合约中的顺序一致，价格含义为 token1/token0。
#[derive(Debug, Clone, PartialEq)]
pub struct TradingPair {
    pub token0: Token,
    pub token1: Token,
    pub exchange: String,
    pub pool_address: Address,
    pub kind: PairKind,
    name: String,
}

impl TradingPair {
    pub fn new(
        token0: Token,
        token1: Token,
        exchange: &str,
        pool_address: Address,
        kind: PairKind,
    ) -> Self {
        let name = format!("{}/{}", token0.symbol, token1.symbol);
        Self {
            token0,
            token1,
            exchange: exchange.to_string(),
            pool_address,
            kind,
            name,
        }
    }

    /// 显示名称 `token0/token1`，也是跨交易所匹配的键
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 从池子合约读取到的原始状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawPoolState {
    /// getReserves() 返回的储备量
    Reserves { reserve0: U256, reserve1: U256 },
    /// slot0() 中的 Q64.96 价格平方根
    SqrtPrice { sqrt_price_x96: U256 },
}

impl RawPoolState {
    pub fn kind(&self) -> PairKind {
        match self {
            RawPoolState::Reserves { .. } => PairKind::ConstantProduct,
            RawPoolState::SqrtPrice { .. } => PairKind::ConcentratedLiquidity,
        }
    }
}

/// 某网络、某交易所、某交易对的最新价格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub network: String,
    pub exchange: String,
    pub pair: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl PricePoint {
    /// 价格必须有限且非负；不满足时返回 None（表示不可用，而不是零价格）
    pub fn new(
        network: &str,
        exchange: &str,
        pair: &str,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        if !price.is_finite() || price < 0.0 {
            return None;
        }

        Some(Self {
            network: network.to_string(),
            exchange: exchange.to_string(),
            pair: pair.to_string(),
            price,
            timestamp,
        })
    }
}

fn display_price(price: &f64) -> String {
    PriceCalculator::format_price(*price)
}

fn display_percentage(value: &Option<f64>) -> String {
    match value {
        Some(percentage) => format!("{:.4}", percentage),
        None => "-".to_string(),
    }
}

fn display_investment(value: &Option<f64>) -> String {
    match value {
        Some(amount) => format!("{:.2}", amount),
        None => "-".to_string(),
    }
}

/// 跨交易所套利机会：在 buy_exchange 买入，在 sell_exchange 卖出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct Opportunity {
    #[tabled(rename = "网络")]
    pub network: String,
    #[tabled(rename = "交易对")]
    pub pair: String,
    #[tabled(rename = "买入DEX")]
    pub buy_exchange: String,
    #[tabled(rename = "卖出DEX")]
    pub sell_exchange: String,
    #[tabled(rename = "买入价格", display_with = "display_price")]
    pub buy_price: f64,
    #[tabled(rename = "卖出价格", display_with = "display_price")]
    pub sell_price: f64,
    /// 相对买入价的价差百分比；买入价为 0 时无定义，为 None，排序时视为无穷大
    #[tabled(rename = "价差%", display_with = "display_percentage")]
    pub spread_percentage: Option<f64>,
    /// 盈亏平衡的最小投入；公式退化（分母 <= 0 或结果非有限）时为 None
    #[tabled(rename = "最小投入", display_with = "display_investment")]
    pub min_investment: Option<f64>,
    #[tabled(rename = "可行")]
    pub viable: bool,
    #[tabled(skip)]
    pub timestamp: DateTime<Utc>,
}
