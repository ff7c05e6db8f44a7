//! 套利机会检测
//!
//! 对每个交易对，枚举所有有序的交易所组合 (买入方, 卖出方)，只保留卖出价高于买入价的方向，
//! 并按盈亏平衡公式计算最小投入：
//!
//! ```text
//! I = pb(1 + fb) / (ps((ps / pb)(1 - fs) - (1 + fb)))
//! ```
//!
//! 分母 <= 0 表示价差不足以覆盖双边费率，此时机会被标记为不可行，而不是输出 NaN 或无穷大。

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;

use crate::core::types::Opportunity;
use crate::error::FeeError;
use crate::fees::FeeSchedule;
use crate::pairs::{MatchedPairTable, MatchedTables};
use crate::snapshot::Published;
use crate::table_display::render_opportunities;
use crate::utils::calculate_percentage_difference;

/// 计算盈亏平衡的最小投入，公式退化时返回 None
pub fn min_investment(buy_price: f64, sell_price: f64, buy_fee: f64, sell_fee: f64) -> Option<f64> {
    if buy_price.is_nan() || buy_price <= 0.0 || !sell_price.is_finite() {
        return None;
    }

    let denominator = sell_price * ((sell_price / buy_price) * (1.0 - sell_fee) - (1.0 + buy_fee));
    if denominator.is_nan() || denominator <= 0.0 {
        return None;
    }

    let investment = buy_price * (1.0 + buy_fee) / denominator;
    (investment.is_finite() && investment > 0.0).then_some(investment)
}

/// 套利引擎：周期性读取比价表，整体替换已发布的机会列表
pub struct ArbitrageEngine {
    matched: Published<MatchedTables>,
    fee_schedules: HashMap<String, FeeSchedule>,
    output: Published<Vec<Opportunity>>,
    period: Duration,
    print_table: bool,
    /// 已告警过缺失费率的 (网络, 交易所)
    warned_fees: HashSet<(String, String)>,
}

impl ArbitrageEngine {
    pub fn new(
        matched: Published<MatchedTables>,
        fee_schedules: HashMap<String, FeeSchedule>,
        output: Published<Vec<Opportunity>>,
        period: Duration,
    ) -> Self {
        Self {
            matched,
            fee_schedules,
            output,
            period,
            print_table: false,
            warned_fees: HashSet::new(),
        }
    }

    /// 每个周期结束后在终端打印机会表格
    pub fn with_table_output(mut self, print_table: bool) -> Self {
        self.print_table = print_table;
        self
    }

    /// 检测某个网络比价表中的所有套利机会
    ///
    /// 某个候选的费率缺失只会丢弃该候选，不影响同一周期的其他候选。
    pub fn detect(table: &MatchedPairTable, fees: &FeeSchedule, network: &str) -> Vec<Opportunity> {
        let (opportunities, missing_fees) = Self::detect_at(table, fees, network, Utc::now());
        for exchange in missing_fees {
            warn!("[{}] 交易所 {} 未配置费率，相关候选已跳过", network, exchange);
        }
        opportunities
    }

    /// 返回检测到的机会以及因缺失费率被跳过的交易所
    fn detect_at(
        table: &MatchedPairTable,
        fees: &FeeSchedule,
        network: &str,
        timestamp: DateTime<Utc>,
    ) -> (Vec<Opportunity>, BTreeSet<String>) {
        let mut opportunities = Vec::new();
        let mut missing_fees = BTreeSet::new();

        for (pair, prices) in &table.pairs {
            if prices.len() < 2 {
                continue;
            }

            for (buy_exchange, &buy_price) in prices {
                for (sell_exchange, &sell_price) in prices {
                    if buy_exchange == sell_exchange || sell_price <= buy_price {
                        continue;
                    }

                    let fee_pair = fees.fee_for(buy_exchange, pair).and_then(|buy_fee| {
                        fees.fee_for(sell_exchange, pair)
                            .map(|sell_fee| (buy_fee, sell_fee))
                    });
                    let (buy_fee, sell_fee) = match fee_pair {
                        Ok(fee_pair) => fee_pair,
                        Err(e) => {
                            debug!(
                                "[{}] 跳过候选 {} {} -> {}: {}",
                                network, pair, buy_exchange, sell_exchange, e
                            );
                            let FeeError::UnknownExchangeFee { exchange, .. } = e;
                            missing_fees.insert(exchange);
                            continue;
                        }
                    };

                    let investment = min_investment(buy_price, sell_price, buy_fee, sell_fee);

                    opportunities.push(Opportunity {
                        network: network.to_string(),
                        pair: pair.clone(),
                        buy_exchange: buy_exchange.clone(),
                        sell_exchange: sell_exchange.clone(),
                        buy_price,
                        sell_price,
                        spread_percentage: calculate_percentage_difference(buy_price, sell_price),
                        min_investment: investment,
                        viable: investment.is_some(),
                        timestamp,
                    });
                }
            }
        }

        sort_opportunities(&mut opportunities);
        (opportunities, missing_fees)
    }

    /// 执行一次检测并发布
    pub fn scan_once(&mut self) -> Vec<Opportunity> {
        let tables = self.matched.load();
        let empty = FeeSchedule::default();
        let timestamp = Utc::now();

        let mut opportunities = Vec::new();
        for (network, table) in tables.iter() {
            let fees = self.fee_schedules.get(network).unwrap_or(&empty);
            let (found, missing_fees) = Self::detect_at(table, fees, network, timestamp);
            opportunities.extend(found);

            for exchange in missing_fees {
                if self.warned_fees.insert((network.clone(), exchange.clone())) {
                    warn!("[{}] 交易所 {} 未配置费率，相关候选已跳过", network, exchange);
                } else {
                    debug!("[{}] 交易所 {} 仍未配置费率", network, exchange);
                }
            }
        }
        sort_opportunities(&mut opportunities);

        let viable = opportunities.iter().filter(|o| o.viable).count();
        info!("发现 {} 个套利机会，其中 {} 个可行", opportunities.len(), viable);

        if self.print_table && !opportunities.is_empty() {
            println!("{}", render_opportunities(&opportunities));
        }

        self.output.publish(opportunities.clone());
        opportunities
    }

    /// 周期运行直到收到关闭信号
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("套利检测任务启动，周期 {:?}", self.period);
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.scan_once();
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("套利检测任务已停止");
    }
}

/// 排序用的价差，无定义的价差视为无穷大
fn spread_rank(opportunity: &Opportunity) -> f64 {
    opportunity.spread_percentage.unwrap_or(f64::INFINITY)
}

/// 按价差降序排序，价差相同时按网络、交易对、买入方、卖出方排序
fn sort_opportunities(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(|a, b| {
        spread_rank(b)
            .partial_cmp(&spread_rank(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.network.cmp(&b.network))
            .then_with(|| a.pair.cmp(&b.pair))
            .then_with(|| a.buy_exchange.cmp(&b.buy_exchange))
            .then_with(|| a.sell_exchange.cmp(&b.sell_exchange))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn table(entries: Vec<(&str, Vec<(&str, f64)>)>) -> MatchedPairTable {
        let mut table = MatchedPairTable::default();
        for (pair, prices) in entries {
            let prices: BTreeMap<String, f64> = prices
                .into_iter()
                .map(|(exchange, price)| (exchange.to_string(), price))
                .collect();
            table.pairs.insert(pair.to_string(), prices);
        }
        table
    }

    #[test]
    fn test_min_investment_break_even() {
        let investment = min_investment(100.0, 101.0, 0.003, 0.003).unwrap();
        assert!((investment - 250.1434).abs() < 1e-3, "实际 {}", investment);
    }

    #[test]
    fn test_min_investment_degenerate_cases() {
        // 价差小于双边费率
        assert_eq!(min_investment(100.0, 100.5, 0.003, 0.003), None);
        // 分母恰好为零
        assert_eq!(min_investment(100.0, 100.0, 0.0, 0.0), None);
        assert_eq!(min_investment(0.0, 101.0, 0.003, 0.003), None);
        assert_eq!(min_investment(f64::NAN, 101.0, 0.003, 0.003), None);
        assert_eq!(min_investment(100.0, f64::INFINITY, 0.003, 0.003), None);
    }

    #[test]
    fn test_min_investment_zero_fees() {
        // 无费率时任何正价差都可行
        let investment = min_investment(100.0, 110.0, 0.0, 0.0).unwrap();
        assert!((investment - 100.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_min_investment_random_inputs_never_leak_non_finite() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let buy_price = rng.gen_range(0.0..1_000.0);
            let sell_price = buy_price * rng.gen_range(0.9..1.2);
            let buy_fee = rng.gen_range(0.0..0.05);
            let sell_fee = rng.gen_range(0.0..0.05);

            if let Some(investment) = min_investment(buy_price, sell_price, buy_fee, sell_fee) {
                assert!(investment.is_finite() && investment > 0.0);
            }
        }
    }

    #[test]
    fn test_detect_single_direction() {
        let fees = FeeSchedule::new()
            .with_default("X", 0.003)
            .with_default("Y", 0.003);
        let opportunities =
            ArbitrageEngine::detect(&table(vec![("A/B", vec![("X", 100.0), ("Y", 101.0)])]), &fees, "testnet");

        assert_eq!(opportunities.len(), 1);
        let opportunity = &opportunities[0];
        assert_eq!(opportunity.buy_exchange, "X");
        assert_eq!(opportunity.sell_exchange, "Y");
        assert_eq!(opportunity.network, "testnet");
        assert!(opportunity.viable);
        let investment = opportunity.min_investment.unwrap();
        assert!(investment.is_finite() && investment > 0.0);
        assert!((opportunity.spread_percentage.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_detect_marks_fee_dominated_spread_non_viable() {
        let fees = FeeSchedule::new()
            .with_default("X", 0.01)
            .with_default("Y", 0.01);
        let opportunities =
            ArbitrageEngine::detect(&table(vec![("A/B", vec![("X", 100.0), ("Y", 101.0)])]), &fees, "testnet");

        assert_eq!(opportunities.len(), 1);
        assert!(!opportunities[0].viable);
        assert_eq!(opportunities[0].min_investment, None);
    }

    #[test]
    fn test_detect_equal_prices_yield_nothing() {
        let fees = FeeSchedule::new()
            .with_default("X", 0.003)
            .with_default("Y", 0.003);
        let opportunities =
            ArbitrageEngine::detect(&table(vec![("A/B", vec![("X", 100.0), ("Y", 100.0)])]), &fees, "testnet");
        assert!(opportunities.is_empty());
    }

    #[test]
    fn test_detect_drops_only_candidates_with_unknown_fee() {
        let fees = FeeSchedule::new()
            .with_default("X", 0.003)
            .with_default("Y", 0.003);
        let opportunities = ArbitrageEngine::detect(
            &table(vec![("A/B", vec![("X", 100.0), ("Y", 101.0), ("Z", 102.0)])]),
            &fees,
            "testnet",
        );

        // X->Y 保留；X->Z 与 Y->Z 因 Z 无费率被丢弃
        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].buy_exchange, "X");
        assert_eq!(opportunities[0].sell_exchange, "Y");
    }

    #[test]
    fn test_detect_never_emits_sell_below_buy() {
        let fees = FeeSchedule::new()
            .with_default("a", 0.001)
            .with_default("b", 0.002)
            .with_default("c", 0.003)
            .with_default("d", 0.0);
        let opportunities = ArbitrageEngine::detect(
            &table(vec![
                ("P/Q", vec![("a", 10.0), ("b", 10.5), ("c", 9.8), ("d", 10.5)]),
                ("R/S", vec![("a", 0.0), ("b", 1.0)]),
                ("T/U", vec![("c", 5.0)]),
            ]),
            &fees,
            "testnet",
        );

        assert!(!opportunities.is_empty());
        for opportunity in &opportunities {
            assert!(opportunity.sell_price > opportunity.buy_price);
            assert_eq!(opportunity.viable, opportunity.min_investment.is_some());
            if let Some(investment) = opportunity.min_investment {
                assert!(investment.is_finite() && investment > 0.0);
            }
        }
        // 零买入价的候选被标记为不可行
        let zero_buy = opportunities.iter().find(|o| o.pair == "R/S").unwrap();
        assert!(!zero_buy.viable);
        assert_eq!(zero_buy.spread_percentage, None);
        // 按价差降序，无定义的价差排在最前
        assert_eq!(opportunities[0].pair, "R/S");
        for window in opportunities.windows(2) {
            assert!(spread_rank(&window[0]) >= spread_rank(&window[1]));
        }
    }

    #[test]
    fn test_scan_once_replaces_published_list() {
        let matched = Published::default();
        let output = Published::new(vec![]);
        let mut fee_schedules = HashMap::new();
        fee_schedules.insert(
            "testnet".to_string(),
            FeeSchedule::new().with_default("X", 0.003).with_default("Y", 0.003),
        );
        let mut engine = ArbitrageEngine::new(
            matched.clone(),
            fee_schedules,
            output.clone(),
            Duration::from_millis(100),
        );

        let mut tables = MatchedTables::new();
        tables.insert("testnet".to_string(), table(vec![("A/B", vec![("X", 100.0), ("Y", 101.0)])]));
        matched.publish(tables);
        engine.scan_once();
        assert_eq!(output.load().len(), 1);

        // 价格收敛后，上个周期的机会不会残留
        let mut tables = MatchedTables::new();
        tables.insert("testnet".to_string(), table(vec![("A/B", vec![("X", 100.0), ("Y", 100.0)])]));
        matched.publish(tables);
        engine.scan_once();
        assert!(output.load().is_empty());
    }

    #[test]
    fn test_scan_once_warns_missing_fee_once_per_exchange() {
        let matched = Published::default();
        let mut fee_schedules = HashMap::new();
        fee_schedules.insert(
            "testnet".to_string(),
            FeeSchedule::new().with_default("X", 0.003).with_default("Y", 0.003),
        );
        let mut engine = ArbitrageEngine::new(
            matched.clone(),
            fee_schedules,
            Published::new(vec![]),
            Duration::from_millis(100),
        );

        let mut tables = MatchedTables::new();
        tables.insert(
            "testnet".to_string(),
            table(vec![
                ("A/B", vec![("X", 100.0), ("Y", 101.0), ("Z", 102.0)]),
                ("C/D", vec![("X", 1.0), ("Z", 2.0)]),
            ]),
        );
        matched.publish(tables);

        for _ in 0..3 {
            assert_eq!(engine.scan_once().len(), 1);
        }
        assert_eq!(engine.warned_fees.len(), 1);
        assert!(engine
            .warned_fees
            .contains(&("testnet".to_string(), "Z".to_string())));
    }

    #[test]
    fn test_equal_spreads_are_ordered_by_network_pair_and_exchanges() {
        let now = Utc::now();
        let opportunity = |network: &str, pair: &str, buy: &str, sell: &str| Opportunity {
            network: network.to_string(),
            pair: pair.to_string(),
            buy_exchange: buy.to_string(),
            sell_exchange: sell.to_string(),
            buy_price: 100.0,
            sell_price: 101.0,
            spread_percentage: Some(1.0),
            min_investment: None,
            viable: false,
            timestamp: now,
        };
        let mut opportunities = vec![
            opportunity("polygon", "A/B", "x", "y"),
            opportunity("ethereum", "C/D", "x", "y"),
            opportunity("ethereum", "A/B", "y", "x"),
            opportunity("ethereum", "A/B", "x", "z"),
            opportunity("ethereum", "A/B", "x", "y"),
        ];

        sort_opportunities(&mut opportunities);

        let order: Vec<(&str, &str, &str, &str)> = opportunities
            .iter()
            .map(|o| {
                (
                    o.network.as_str(),
                    o.pair.as_str(),
                    o.buy_exchange.as_str(),
                    o.sell_exchange.as_str(),
                )
            })
            .collect();
        assert_eq!(
            order,
            vec![
                ("ethereum", "A/B", "x", "y"),
                ("ethereum", "A/B", "x", "z"),
                ("ethereum", "A/B", "y", "x"),
                ("ethereum", "C/D", "x", "y"),
                ("polygon", "A/B", "x", "y"),
            ]
        );
    }
}
