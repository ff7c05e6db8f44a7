//! Arbitrage Spy - 跨交易所 DEX 价格监控与套利机会检测
//!
//! 周期性读取链上池子状态并推导价格，按交易对跨交易所比价，
//! 扣除双边手续费后计算盈亏平衡的最小投入，通过 HTTP 导出最新快照。

pub mod api;
pub mod arbitrage;
pub mod cli;
pub mod config;
pub mod core;
pub mod dex;
pub mod error;
pub mod fees;
pub mod log_adapter;
pub mod monitor;
pub mod pairs;
pub mod price_calculator;
pub mod price_store;
pub mod realtime_monitor;
pub mod snapshot;
pub mod table_display;
pub mod utils;

// 重新导出常用类型
pub use arbitrage::{min_investment, ArbitrageEngine};
pub use config::Config;
pub use core::types::{Opportunity, PairKind, PricePoint, RawPoolState, Token, TradingPair};
pub use fees::FeeSchedule;
pub use pairs::{MatchedPairTable, PairMatcher};
pub use price_calculator::PriceCalculator;
pub use price_store::{PriceSnapshot, PriceStore};
