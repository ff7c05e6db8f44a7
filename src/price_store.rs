//! 最新价格表
//!
//! 以 (network, exchange, pair) 为键的并发映射，每个监控任务只写自己的键。
//! DashMap 按分片加锁，不同键的写入互不阻塞；整条 `PricePoint` 一次性替换，
//! 读者不会看到只写了一半的记录。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::types::PricePoint;

/// 价格表的复合键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PriceKey {
    pub network: String,
    pub exchange: String,
    pub pair: String,
}

impl PriceKey {
    pub fn new(network: &str, exchange: &str, pair: &str) -> Self {
        Self {
            network: network.to_string(),
            exchange: exchange.to_string(),
            pair: pair.to_string(),
        }
    }
}

/// 某一时刻价格表的只读副本: network -> exchange -> pair -> PricePoint
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PriceSnapshot {
    pub networks: BTreeMap<String, BTreeMap<String, BTreeMap<String, PricePoint>>>,
}

impl PriceSnapshot {
    /// 所有价格点，按 network/exchange/pair 排序
    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.networks
            .values()
            .flat_map(|exchanges| exchanges.values())
            .flat_map(|pairs| pairs.values())
    }

    /// 只保留某个网络
    pub fn for_network(&self, network: &str) -> PriceSnapshot {
        let networks = self
            .networks
            .get(network)
            .map(|exchanges| BTreeMap::from([(network.to_string(), exchanges.clone())]))
            .unwrap_or_default();
        PriceSnapshot { networks }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

/// 线程安全的最新价格表，克隆后共享同一份数据
#[derive(Clone, Default)]
pub struct PriceStore {
    prices: Arc<DashMap<PriceKey, PricePoint>>,
    writes: Arc<AtomicU64>,
}

impl PriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入（覆盖）某个键的最新价格
    ///
    /// 价格非有限或为负时拒绝写入并返回 false，旧值保持不变。
    pub fn update(
        &self,
        network: &str,
        exchange: &str,
        pair: &str,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let Some(point) = PricePoint::new(network, exchange, pair, price, timestamp) else {
            return false;
        };

        self.prices
            .insert(PriceKey::new(network, exchange, pair), point);
        self.writes.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// 获取单个价格点的副本
    pub fn get(&self, network: &str, exchange: &str, pair: &str) -> Option<PricePoint> {
        self.prices
            .get(&PriceKey::new(network, exchange, pair))
            .map(|entry| entry.value().clone())
    }

    /// 复制当前所有价格，得到嵌套的只读快照
    ///
    /// 每个键是原子的，跨键不保证同一时刻。
    pub fn snapshot(&self) -> PriceSnapshot {
        let mut snapshot = PriceSnapshot::default();
        for entry in self.prices.iter() {
            let key = entry.key();
            snapshot
                .networks
                .entry(key.network.clone())
                .or_default()
                .entry(key.exchange.clone())
                .or_default()
                .insert(key.pair.clone(), entry.value().clone());
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// 累计成功写入次数
    pub fn total_writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}
