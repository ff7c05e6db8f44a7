use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;

use crate::price_store::{PriceSnapshot, PriceStore};
use crate::snapshot::Published;

/// 单个网络的跨交易所比价表: pair -> exchange -> price
///
/// 本周期尚未产出价格的交易所不会出现在表中（而不是记为 0）。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MatchedPairTable {
    pub pairs: BTreeMap<String, BTreeMap<String, f64>>,
}

impl MatchedPairTable {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// 至少有两个交易所报价、可以比较的交易对数量
    pub fn comparable_pairs(&self) -> usize {
        self.pairs.values().filter(|prices| prices.len() >= 2).count()
    }
}

/// 所有网络的比价表: network -> MatchedPairTable
pub type MatchedTables = BTreeMap<String, MatchedPairTable>;

/// 交易对匹配器 - 周期性地把价格表投影为比价表
pub struct PairMatcher {
    store: PriceStore,
    networks: Vec<String>,
    output: Published<MatchedTables>,
    period: Duration,
}

impl PairMatcher {
    pub fn new(
        store: PriceStore,
        networks: Vec<String>,
        output: Published<MatchedTables>,
        period: Duration,
    ) -> Self {
        Self {
            store,
            networks,
            output,
            period,
        }
    }

    /// 按交易对名称分组某个网络的价格，纯函数
    pub fn rebuild(snapshot: &PriceSnapshot, network: &str) -> MatchedPairTable {
        let mut table = MatchedPairTable::default();

        if let Some(exchanges) = snapshot.networks.get(network) {
            for (exchange, pairs) in exchanges {
                for (pair, point) in pairs {
                    table
                        .pairs
                        .entry(pair.clone())
                        .or_default()
                        .insert(exchange.clone(), point.price);
                }
            }
        }

        table
    }

    /// 执行一次匹配并发布结果
    pub fn match_once(&self) -> MatchedTables {
        let snapshot = self.store.snapshot();

        let tables: MatchedTables = self
            .networks
            .iter()
            .map(|network| {
                let table = Self::rebuild(&snapshot, network);
                debug!(
                    "[{}] 匹配到 {} 个交易对，其中 {} 个可跨交易所比较",
                    network,
                    table.len(),
                    table.comparable_pairs()
                );
                (network.clone(), table)
            })
            .collect();

        self.output.publish(tables.clone());
        tables
    }

    /// 周期运行直到收到关闭信号
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("交易对匹配任务启动，周期 {:?}", self.period);
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.match_once();
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("交易对匹配任务已停止");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_store() -> PriceStore {
        let store = PriceStore::new();
        let now = Utc::now();
        store.update("ethereum", "uniswap_v2", "WETH/USDC", 2000.0, now);
        store.update("ethereum", "sushiswap", "WETH/USDC", 2004.0, now);
        store.update("ethereum", "uniswap_v3", "WBTC/WETH", 17.5, now);
        store.update("polygon", "quickswap", "WETH/USDC", 1990.0, now);
        store
    }

    #[test]
    fn test_rebuild_groups_by_pair() {
        let snapshot = sample_store().snapshot();
        let table = PairMatcher::rebuild(&snapshot, "ethereum");

        assert_eq!(table.len(), 2);
        assert_eq!(table.pairs["WETH/USDC"].len(), 2);
        assert_eq!(table.pairs["WETH/USDC"]["sushiswap"], 2004.0);
        // 只有一个交易所的交易对保留在表中
        assert_eq!(table.pairs["WBTC/WETH"].len(), 1);
        assert_eq!(table.comparable_pairs(), 1);
        // 其他网络的价格不会混入
        assert!(!table.pairs["WETH/USDC"].contains_key("quickswap"));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let snapshot = sample_store().snapshot();
        let first = PairMatcher::rebuild(&snapshot, "ethereum");
        let second = PairMatcher::rebuild(&snapshot, "ethereum");
        assert_eq!(first, second);
    }

    #[test]
    fn test_rebuild_empty_snapshot() {
        let table = PairMatcher::rebuild(&PriceSnapshot::default(), "ethereum");
        assert!(table.is_empty());
    }

    #[test]
    fn test_match_once_publishes_every_network() {
        let output = Published::default();
        let matcher = PairMatcher::new(
            sample_store(),
            vec!["ethereum".to_string(), "polygon".to_string(), "bsc".to_string()],
            output.clone(),
            Duration::from_millis(100),
        );

        matcher.match_once();

        let published = output.load();
        assert_eq!(published.len(), 3);
        assert_eq!(published["polygon"].pairs["WETH/USDC"]["quickswap"], 1990.0);
        assert!(published["bsc"].is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let output = Published::default();
        let matcher = PairMatcher::new(
            sample_store(),
            vec!["ethereum".to_string()],
            output.clone(),
            Duration::from_millis(10),
        );

        let handle = tokio::spawn(matcher.run(rx));
        time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(output.load()["ethereum"].len(), 2);
    }
}
