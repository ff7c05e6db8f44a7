use async_trait::async_trait;
use ethers::{
    abi::Abi,
    contract::Contract,
    providers::Middleware,
    types::U256,
};
use log::debug;
use std::sync::Arc;
use std::time::Duration;

use crate::core::types::{RawPoolState, TradingPair};
use crate::dex::{classify_contract_error, with_timeout, PoolStateReader};
use crate::error::PoolStateError;

// Uniswap V2 Pair ABI（SushiSwap 等分叉兼容）
const PAIR_ABI: &str = r#"[
    {
        "constant": true,
        "inputs": [],
        "name": "getReserves",
        "outputs": [
            {"name": "reserve0", "type": "uint112"},
            {"name": "reserve1", "type": "uint112"},
            {"name": "blockTimestampLast", "type": "uint32"}
        ],
        "type": "function"
    }
]"#;

/// 恒定乘积池读取器，调用 getReserves()
pub struct ConstantProductReader<M> {
    client: Arc<M>,
    abi: Abi,
    timeout: Duration,
}

impl<M: Middleware + 'static> ConstantProductReader<M> {
    pub fn new(client: Arc<M>, timeout: Duration) -> Result<Self, PoolStateError> {
        let abi: Abi = serde_json::from_str(PAIR_ABI)
            .map_err(|e| PoolStateError::Contract(format!("invalid pair ABI: {}", e)))?;

        Ok(Self {
            client,
            abi,
            timeout,
        })
    }

    async fn get_reserves(&self, pair: &TradingPair) -> Result<RawPoolState, PoolStateError> {
        let pair_contract = Contract::new(pair.pool_address, self.abi.clone(), self.client.clone());

        let (reserve0, reserve1, _): (U256, U256, u32) = pair_contract
            .method::<_, (U256, U256, u32)>("getReserves", ())
            .map_err(|e| PoolStateError::Contract(e.to_string()))?
            .call()
            .await
            .map_err(classify_contract_error)?;

        debug!(
            "{} @ {:?}: reserve0={}, reserve1={}",
            pair.name(),
            pair.pool_address,
            reserve0,
            reserve1
        );

        Ok(RawPoolState::Reserves { reserve0, reserve1 })
    }
}

#[async_trait]
impl<M: Middleware + 'static> PoolStateReader for ConstantProductReader<M> {
    fn name(&self) -> &str {
        "constant-product"
    }

    async fn read_pool_state(&self, pair: &TradingPair) -> Result<RawPoolState, PoolStateError> {
        with_timeout(self.timeout, self.get_reserves(pair)).await
    }
}
