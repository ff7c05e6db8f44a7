use async_trait::async_trait;
use ethers::{
    abi::Abi,
    contract::Contract,
    providers::Middleware,
    types::{I256, U256},
};
use log::debug;
use std::sync::Arc;
use std::time::Duration;

use crate::core::types::{RawPoolState, TradingPair};
use crate::dex::{classify_contract_error, with_timeout, PoolStateReader};
use crate::error::PoolStateError;

// Uniswap V3 Pool ABI，只包含 slot0
const POOL_ABI: &str = r#"[
    {
        "inputs": [],
        "name": "slot0",
        "outputs": [
            {"name": "sqrtPriceX96", "type": "uint160"},
            {"name": "tick", "type": "int24"},
            {"name": "observationIndex", "type": "uint16"},
            {"name": "observationCardinality", "type": "uint16"},
            {"name": "observationCardinalityNext", "type": "uint16"},
            {"name": "feeProtocol", "type": "uint8"},
            {"name": "unlocked", "type": "bool"}
        ],
        "stateMutability": "view",
        "type": "function"
    }
]"#;

type Slot0 = (U256, I256, U256, U256, U256, U256, bool);

/// 集中流动性池读取器，调用 slot0() 并取 sqrtPriceX96
pub struct ConcentratedLiquidityReader<M> {
    client: Arc<M>,
    abi: Abi,
    timeout: Duration,
}

impl<M: Middleware + 'static> ConcentratedLiquidityReader<M> {
    pub fn new(client: Arc<M>, timeout: Duration) -> Result<Self, PoolStateError> {
        let abi: Abi = serde_json::from_str(POOL_ABI)
            .map_err(|e| PoolStateError::Contract(format!("invalid pool ABI: {}", e)))?;

        Ok(Self {
            client,
            abi,
            timeout,
        })
    }

    async fn get_slot0(&self, pair: &TradingPair) -> Result<RawPoolState, PoolStateError> {
        let pool_contract = Contract::new(pair.pool_address, self.abi.clone(), self.client.clone());

        let (sqrt_price_x96, tick, ..): Slot0 = pool_contract
            .method::<_, Slot0>("slot0", ())
            .map_err(|e| PoolStateError::Contract(e.to_string()))?
            .call()
            .await
            .map_err(classify_contract_error)?;

        debug!(
            "{} @ {:?}: sqrtPriceX96={}, tick={}",
            pair.name(),
            pair.pool_address,
            sqrt_price_x96,
            tick
        );

        Ok(RawPoolState::SqrtPrice { sqrt_price_x96 })
    }
}

#[async_trait]
impl<M: Middleware + 'static> PoolStateReader for ConcentratedLiquidityReader<M> {
    fn name(&self) -> &str {
        "concentrated-liquidity"
    }

    async fn read_pool_state(&self, pair: &TradingPair) -> Result<RawPoolState, PoolStateError> {
        with_timeout(self.timeout, self.get_slot0(pair)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{Http, Provider};

    #[test]
    fn test_pool_abi_has_slot0() {
        let provider = Arc::new(Provider::<Http>::try_from("http://localhost:8545").unwrap());
        let reader = ConcentratedLiquidityReader::new(provider, Duration::from_secs(1)).unwrap();

        let function = reader.abi.function("slot0").unwrap();
        assert_eq!(function.outputs.len(), 7);
        assert_eq!(function.outputs[0].name, "sqrtPriceX96");
    }
}
