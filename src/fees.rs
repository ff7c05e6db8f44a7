use std::collections::HashMap;

use crate::config::NetworkConfig;
use crate::error::FeeError;

/// 交易费率表，加载后只读
///
/// 查找顺序：交易对覆盖费率 -> 交易所默认费率 -> UnknownExchangeFee。
/// 未配置的交易所绝不按零费率处理。
#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    defaults: HashMap<String, f64>,
    overrides: HashMap<(String, String), f64>,
}

impl FeeSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从网络配置构建费率表
    pub fn from_network(network: &NetworkConfig) -> Self {
        let mut schedule = Self::new();
        for (exchange, config) in &network.exchanges {
            if let Some(fee) = config.fee {
                schedule = schedule.with_default(exchange, fee);
            }
            for pair_fee in &config.pair_fees {
                schedule = schedule.with_override(exchange, &pair_fee.pair, pair_fee.fee);
            }
        }
        schedule
    }

    pub fn with_default(mut self, exchange: &str, fee: f64) -> Self {
        self.defaults.insert(exchange.to_string(), fee);
        self
    }

    pub fn with_override(mut self, exchange: &str, pair: &str, fee: f64) -> Self {
        self.overrides
            .insert((exchange.to_string(), pair.to_string()), fee);
        self
    }

    /// 获取某交易所某交易对的费率（小数形式，0.003 = 0.3%）
    pub fn fee_for(&self, exchange: &str, pair: &str) -> Result<f64, FeeError> {
        if let Some(fee) = self
            .overrides
            .get(&(exchange.to_string(), pair.to_string()))
        {
            return Ok(*fee);
        }

        self.defaults
            .get(exchange)
            .copied()
            .ok_or_else(|| FeeError::UnknownExchangeFee {
                exchange: exchange.to_string(),
                pair: pair.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExchangeConfig, PairFeeConfig};
    use crate::core::types::PairKind;
    use std::collections::BTreeMap;

    #[test]
    fn test_lookup_order() {
        let fees = FeeSchedule::new()
            .with_default("uniswap_v3", 0.003)
            .with_override("uniswap_v3", "USDC/WETH", 0.0005);

        assert_eq!(fees.fee_for("uniswap_v3", "USDC/WETH"), Ok(0.0005));
        assert_eq!(fees.fee_for("uniswap_v3", "WBTC/WETH"), Ok(0.003));
    }

    #[test]
    fn test_unknown_exchange_is_an_error() {
        let fees = FeeSchedule::new().with_default("uniswap_v2", 0.003);
        assert_eq!(
            fees.fee_for("curve", "USDC/WETH"),
            Err(FeeError::UnknownExchangeFee {
                exchange: "curve".to_string(),
                pair: "USDC/WETH".to_string(),
            })
        );
    }

    #[test]
    fn test_override_without_default() {
        let fees = FeeSchedule::new().with_override("balancer", "USDC/WETH", 0.001);
        assert_eq!(fees.fee_for("balancer", "USDC/WETH"), Ok(0.001));
        assert!(fees.fee_for("balancer", "WBTC/WETH").is_err());
    }

    #[test]
    fn test_from_network() {
        let mut exchanges = BTreeMap::new();
        exchanges.insert(
            "sushiswap".to_string(),
            ExchangeConfig {
                kind: PairKind::ConstantProduct,
                fee: Some(0.003),
                pair_fees: vec![PairFeeConfig {
                    pair: "USDC/WETH".to_string(),
                    fee: 0.0025,
                }],
                pairs: vec![],
            },
        );
        exchanges.insert(
            "no_fee_dex".to_string(),
            ExchangeConfig {
                kind: PairKind::ConstantProduct,
                fee: None,
                pair_fees: vec![],
                pairs: vec![],
            },
        );
        let network = NetworkConfig {
            rpc_url: "http://localhost:8545".to_string(),
            exchanges,
        };

        let fees = FeeSchedule::from_network(&network);
        assert_eq!(fees.fee_for("sushiswap", "USDC/WETH"), Ok(0.0025));
        assert_eq!(fees.fee_for("sushiswap", "DAI/WETH"), Ok(0.003));
        assert!(fees.fee_for("no_fee_dex", "USDC/WETH").is_err());
    }
}
