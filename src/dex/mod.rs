pub mod uniswap_v2;
pub mod uniswap_v3;

use async_trait::async_trait;
use ethers::contract::ContractError;
use ethers::providers::{Http, Middleware, Provider, Ws};
use log::{error, info};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::core::types::{PairKind, RawPoolState, TradingPair};
use crate::error::{ConfigError, PoolStateError};

pub use uniswap_v2::ConstantProductReader;
pub use uniswap_v3::ConcentratedLiquidityReader;

/// 读取池子原始状态的能力，由链上合约调用实现
#[async_trait]
pub trait PoolStateReader: Send + Sync {
    /// 读取器名称，用于日志
    fn name(&self) -> &str;

    /// 读取一次池子状态；超时与 RPC 错误都返回 PoolStateError
    async fn read_pool_state(&self, pair: &TradingPair) -> Result<RawPoolState, PoolStateError>;
}

/// 按池子类型解析出的读取器表，配置加载时构建
#[derive(Clone, Default)]
pub struct ReaderRegistry {
    readers: HashMap<PairKind, Arc<dyn PoolStateReader>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为一个 RPC 客户端注册所有池子类型的读取器
    pub fn for_client<M: Middleware + 'static>(
        client: Arc<M>,
        timeout: Duration,
    ) -> Result<Self, PoolStateError> {
        let mut registry = Self::new();
        for kind in [PairKind::ConstantProduct, PairKind::ConcentratedLiquidity] {
            let reader: Arc<dyn PoolStateReader> = match kind {
                PairKind::ConstantProduct => {
                    Arc::new(ConstantProductReader::new(client.clone(), timeout)?)
                }
                PairKind::ConcentratedLiquidity => {
                    Arc::new(ConcentratedLiquidityReader::new(client.clone(), timeout)?)
                }
            };
            registry.insert(kind, reader);
        }
        Ok(registry)
    }

    /// 连接网络节点（http(s) 或 ws(s)），检查连通性并构建读取器
    pub async fn connect(
        network: &str,
        rpc_url: &str,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let reader_error = |reason: String| ConfigError::Reader {
            network: network.to_string(),
            reason,
        };

        let registry = if rpc_url.starts_with("ws") {
            let provider = with_timeout(timeout, async {
                Provider::<Ws>::connect(rpc_url)
                    .await
                    .map_err(|e| PoolStateError::Rpc(e.to_string()))
            })
            .await
            .map_err(|e| reader_error(e.to_string()))?;
            let client = Arc::new(provider);
            health_check(network, client.as_ref(), timeout).await;
            Self::for_client(client, timeout)
        } else {
            let provider = Provider::<Http>::try_from(rpc_url)
                .map_err(|e| reader_error(e.to_string()))?;
            let client = Arc::new(provider);
            health_check(network, client.as_ref(), timeout).await;
            Self::for_client(client, timeout)
        };

        registry.map_err(|e| reader_error(e.to_string()))
    }

    pub fn insert(&mut self, kind: PairKind, reader: Arc<dyn PoolStateReader>) {
        self.readers.insert(kind, reader);
    }

    pub fn reader_for(&self, kind: PairKind) -> Option<Arc<dyn PoolStateReader>> {
        self.readers.get(&kind).cloned()
    }
}

/// 检查区块链连接是否正常，失败只记录日志，监控任务会在各自周期中重试
pub async fn health_check<M: Middleware>(network: &str, client: &M, timeout: Duration) {
    match tokio::time::timeout(timeout, client.get_block_number()).await {
        Ok(Ok(block)) => info!("[{}] 区块链连接健康检查通过，当前区块 {}", network, block),
        Ok(Err(e)) => error!("[{}] 区块链连接健康检查失败: {}", network, e),
        Err(_) => error!("[{}] 区块链连接健康检查超时 ({:?})", network, timeout),
    }
}

/// 为一次链上读取加上超时
pub async fn with_timeout<T, F>(timeout: Duration, future: F) -> Result<T, PoolStateError>
where
    F: Future<Output = Result<T, PoolStateError>>,
{
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| PoolStateError::Timeout(timeout))?
}

/// 区分节点错误与合约调用错误
pub(crate) fn classify_contract_error<M: Middleware>(err: ContractError<M>) -> PoolStateError {
    match err {
        ContractError::MiddlewareError { e } => PoolStateError::Rpc(e.to_string()),
        ContractError::ProviderError { e } => PoolStateError::Rpc(e.to_string()),
        other => PoolStateError::Contract(other.to_string()),
    }
}
