//! 错误类型定义
//!
//! 按照来源区分：价格推导失败、链上读取失败（瞬时）、费率查找失败和配置错误。
//! 监控任务需要区分前两者，以便采用不同的重试与日志策略。

use std::time::Duration;
use thiserror::Error;

/// 从原始池状态推导价格时的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DerivationError {
    #[error("reserve0 is zero, price is undefined")]
    ZeroReserve,

    #[error("invalid pool state: {0}")]
    InvalidState(String),
}

/// 读取链上池状态时的瞬时错误（RPC 超时、节点错误、合约调用失败）
#[derive(Error, Debug, Clone)]
pub enum PoolStateError {
    #[error("pool state read timed out after {0:?}")]
    Timeout(Duration),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("contract call failed: {0}")]
    Contract(String),
}

/// 费率表查找错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeeError {
    #[error("no fee configured for exchange {exchange} (pair {pair})")]
    UnknownExchangeFee { exchange: String, pair: String },
}

/// 配置加载或校验错误，启动阶段致命
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("invalid fee {fee} for exchange {exchange}: must be in [0, 1)")]
    InvalidFee { exchange: String, fee: f64 },

    #[error("failed to set up pool reader for {network}: {reason}")]
    Reader { network: String, reason: String },
}

/// 单个监控周期的失败原因
#[derive(Error, Debug, Clone)]
pub enum MonitorError {
    #[error("acquisition failed: {0}")]
    Acquisition(#[from] PoolStateError),

    #[error("derivation failed: {0}")]
    Derivation(#[from] DerivationError),
}

impl MonitorError {
    /// 链上读取失败属于瞬时错误，下个周期自然重试
    pub fn is_transient(&self) -> bool {
        matches!(self, MonitorError::Acquisition(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_error_transience() {
        let timeout = MonitorError::from(PoolStateError::Timeout(Duration::from_secs(5)));
        assert!(timeout.is_transient());

        let zero = MonitorError::from(DerivationError::ZeroReserve);
        assert!(!zero.is_transient());
    }

    #[test]
    fn test_fee_error_message() {
        let err = FeeError::UnknownExchangeFee {
            exchange: "curve".to_string(),
            pair: "WETH/USDC".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no fee configured for exchange curve (pair WETH/USDC)"
        );
    }
}
