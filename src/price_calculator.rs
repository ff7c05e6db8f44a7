use bigdecimal::BigDecimal;
use ethers::types::U256;
use std::str::FromStr;

use crate::core::types::{PairKind, RawPoolState};
use crate::error::DerivationError;
use crate::utils::scale_by_pow10;

/// 价格计算工具
pub struct PriceCalculator;

impl PriceCalculator {
    /// Uniswap V3 Q64.96 格式的常量 (2^96)
    const Q96: &'static str = "79228162514264337593543950336";

    /// 从原始池状态推导 token1/token0 价格
    ///
    /// # 参数
    /// * `kind` - 池子类型，必须与 `raw_state` 的格式一致
    /// * `raw_state` - 从合约读取的储备量或价格平方根
    /// * `decimals0` - token0 的小数位数
    /// * `decimals1` - token1 的小数位数
    ///
    /// 纯函数，相同输入总是得到相同输出。
    pub fn derive_price(
        kind: PairKind,
        raw_state: &RawPoolState,
        decimals0: u8,
        decimals1: u8,
    ) -> Result<f64, DerivationError> {
        let raw_price = match (kind, raw_state) {
            (PairKind::ConstantProduct, RawPoolState::Reserves { reserve0, reserve1 }) => {
                Self::ratio_from_reserves(reserve0, reserve1)?
            }
            (PairKind::ConcentratedLiquidity, RawPoolState::SqrtPrice { sqrt_price_x96 }) => {
                Self::ratio_from_sqrt_price(sqrt_price_x96)?
            }
            (kind, state) => {
                return Err(DerivationError::InvalidState(format!(
                    "{} pool cannot be priced from {} state",
                    kind,
                    state.kind()
                )))
            }
        };

        // 调整小数位数差异: price * 10^(decimals0 - decimals1)
        let decimals_diff = decimals0 as i32 - decimals1 as i32;
        let price = scale_by_pow10(&raw_price, decimals_diff);

        let price = price
            .normalized()
            .to_string()
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite())
            .ok_or_else(|| DerivationError::InvalidState(format!("price {} is not representable", price)))?;

        Ok(price)
    }

    /// 格式化价格为显示字符串
    pub fn format_price(price: f64) -> String {
        format!("{:.6}", price)
    }

    fn ratio_from_reserves(reserve0: &U256, reserve1: &U256) -> Result<BigDecimal, DerivationError> {
        if reserve0.is_zero() {
            return Err(DerivationError::ZeroReserve);
        }

        let reserve0_bd = Self::to_big_decimal(reserve0)?;
        let reserve1_bd = Self::to_big_decimal(reserve1)?;

        Ok(reserve1_bd / reserve0_bd)
    }

    fn ratio_from_sqrt_price(sqrt_price_x96: &U256) -> Result<BigDecimal, DerivationError> {
        if sqrt_price_x96.is_zero() {
            return Err(DerivationError::InvalidState(
                "sqrtPriceX96 must be positive".to_string(),
            ));
        }

        let sqrt_price_bd = Self::to_big_decimal(sqrt_price_x96)?;
        let q96 = BigDecimal::from_str(Self::Q96)
            .map_err(|e| DerivationError::InvalidState(format!("invalid Q96 constant: {}", e)))?;

        // 价格 = (sqrtPriceX96 / 2^96)^2，先平方再相除以保留精度
        Ok((&sqrt_price_bd * &sqrt_price_bd) / (&q96 * &q96))
    }

    fn to_big_decimal(value: &U256) -> Result<BigDecimal, DerivationError> {
        BigDecimal::from_str(&value.to_string())
            .map_err(|e| DerivationError::InvalidState(format!("invalid integer {}: {}", value, e)))
    }
}
