use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;

use crate::core::types::TradingPair;
use crate::dex::PoolStateReader;
use crate::error::MonitorError;
use crate::price_calculator::PriceCalculator;
use crate::price_store::PriceStore;

/// 单个交易对的价格监控任务：读取池状态 -> 推导价格 -> 写入价格表
///
/// 每个交易对只有一个监控任务，因此价格表中的每个键只有一个写者。
pub struct PriceMonitor {
    network: String,
    pair: Arc<TradingPair>,
    reader: Arc<dyn PoolStateReader>,
    store: PriceStore,
    period: Duration,
}

impl PriceMonitor {
    pub fn new(
        network: &str,
        pair: Arc<TradingPair>,
        reader: Arc<dyn PoolStateReader>,
        store: PriceStore,
        period: Duration,
    ) -> Self {
        Self {
            network: network.to_string(),
            pair,
            reader,
            store,
            period,
        }
    }

    /// 执行一个监控周期，返回写入的价格
    ///
    /// 失败时价格表中的旧值保持不变（变旧，但不被清除）。
    pub async fn poll_once(&self) -> Result<f64, MonitorError> {
        let raw_state = self.reader.read_pool_state(&self.pair).await?;

        let price = PriceCalculator::derive_price(
            self.pair.kind,
            &raw_state,
            self.pair.token0.decimals,
            self.pair.token1.decimals,
        )?;

        self.store.update(
            &self.network,
            &self.pair.exchange,
            self.pair.name(),
            price,
            Utc::now(),
        );

        Ok(price)
    }

    /// 周期运行直到收到关闭信号，任何单周期错误都只记录日志
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "[{}] 开始监控 {} on {}，读取器 {}，周期 {:?}",
            self.network,
            self.pair.name(),
            self.pair.exchange,
            self.reader.name(),
            self.period
        );
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.log_cycle(self.poll_once().await);
                }
                _ = shutdown.changed() => break,
            }
        }

        info!(
            "[{}] 停止监控 {} on {}",
            self.network,
            self.pair.name(),
            self.pair.exchange
        );
    }

    fn log_cycle(&self, result: Result<f64, MonitorError>) {
        match result {
            Ok(price) => debug!(
                "[{}] {} on {}: {}",
                self.network,
                self.pair.name(),
                self.pair.exchange,
                price
            ),
            Err(e) if e.is_transient() => warn!(
                "[{}] 获取 {} on {} 池状态失败: {}",
                self.network,
                self.pair.name(),
                self.pair.exchange,
                e
            ),
            Err(e) => error!(
                "[{}] 计算 {} on {} 价格失败: {}",
                self.network,
                self.pair.name(),
                self.pair.exchange,
                e
            ),
        }
    }
}
