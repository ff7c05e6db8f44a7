use anyhow::{Context, Result};
use futures::future::join_all;
use log::{error, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::{self, ApiState};
use crate::arbitrage::ArbitrageEngine;
use crate::config::Config;
use crate::dex::ReaderRegistry;
use crate::error::ConfigError;
use crate::fees::FeeSchedule;
use crate::monitor::PriceMonitor;
use crate::pairs::PairMatcher;
use crate::price_store::PriceStore;
use crate::snapshot::Published;

/// 运行中的监控流水线：每个交易对一个监控任务，外加匹配任务与套利任务
pub struct Pipeline {
    state: ApiState,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// 创建共享状态并启动所有周期任务
    ///
    /// 任一交易对找不到对应的读取器都是启动期致命错误。
    pub fn spawn(config: &Config, registries: &HashMap<String, ReaderRegistry>) -> Result<Self> {
        let store = PriceStore::new();
        let matched = Published::default();
        let opportunities = Published::new(Vec::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let mut monitors = Vec::new();
        let mut fee_schedules = HashMap::new();
        for (network, network_config) in &config.networks {
            let registry = registries.get(network).ok_or_else(|| ConfigError::Reader {
                network: network.clone(),
                reason: "no pool reader registry".to_string(),
            })?;

            for pair in config.trading_pairs(network)? {
                let reader = registry.reader_for(pair.kind).ok_or_else(|| ConfigError::Reader {
                    network: network.clone(),
                    reason: format!("no reader for {} pools ({})", pair.kind, pair.name()),
                })?;

                monitors.push(PriceMonitor::new(
                    network,
                    Arc::new(pair),
                    reader,
                    store.clone(),
                    config.monitor.price_period(),
                ));
            }

            fee_schedules.insert(network.clone(), FeeSchedule::from_network(network_config));
        }

        let mut handles: Vec<JoinHandle<()>> = monitors
            .into_iter()
            .map(|monitor| tokio::spawn(monitor.run(shutdown_rx.clone())))
            .collect();
        info!("已启动 {} 个价格监控任务", handles.len());

        let matcher = PairMatcher::new(
            store.clone(),
            config.network_names(),
            matched.clone(),
            config.monitor.match_period(),
        );
        handles.push(tokio::spawn(matcher.run(shutdown_rx.clone())));

        let engine = ArbitrageEngine::new(
            matched.clone(),
            fee_schedules,
            opportunities.clone(),
            config.monitor.engine_period(),
        )
        .with_table_output(config.monitor.print_table);
        handles.push(tokio::spawn(engine.run(shutdown_rx)));

        Ok(Self {
            state: ApiState {
                prices: store,
                matched,
                opportunities,
            },
            shutdown,
            handles,
        })
    }

    /// 导出层使用的只读句柄
    pub fn state(&self) -> ApiState {
        self.state.clone()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn add_task(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    /// 发出关闭信号并等待所有任务在各自的周期边界退出
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                error!("任务异常退出: {}", e);
            }
        }
    }
}

/// 实时监控系统：连接各网络节点，启动流水线和快照接口，直到 Ctrl-C
pub struct RealTimeMonitor {
    config: Config,
}

impl RealTimeMonitor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn start_monitoring(self) -> Result<()> {
        info!("启动实时监控系统...");

        let mut registries = HashMap::new();
        for (network, network_config) in &self.config.networks {
            info!("[{}] 正在连接 {}", network, network_config.rpc_url);
            let registry = ReaderRegistry::connect(
                network,
                &network_config.rpc_url,
                self.config.monitor.rpc_timeout(),
            )
            .await?;
            registries.insert(network.clone(), registry);
        }

        let mut pipeline = Pipeline::spawn(&self.config, &registries)?;

        if self.config.api.enabled {
            let bind = self.config.api.bind.clone();
            let state = pipeline.state();
            let shutdown = pipeline.subscribe_shutdown();
            pipeline.add_task(tokio::spawn(async move {
                if let Err(e) = api::serve(&bind, state, shutdown).await {
                    error!("快照接口错误: {:#}", e);
                }
            }));
        }

        info!("实时监控系统已启动，按 Ctrl+C 退出");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;

        info!("收到退出信号，正在停止所有任务...");
        pipeline.shutdown().await;
        info!("实时监控系统已停止");
        Ok(())
    }
}
