use bigdecimal::BigDecimal;
use ethers::types::Address;
use ethers::utils::to_checksum;
use num_traits::Zero;
use std::str::FromStr;

/// 将数值乘以 10^exp（exp 可为负）
pub fn scale_by_pow10(value: &BigDecimal, exp: i32) -> BigDecimal {
    if exp == 0 || value.is_zero() {
        return value.clone();
    }

    let ten = BigDecimal::from(10);
    let magnitude = (0..exp.unsigned_abs()).fold(BigDecimal::from(1), |acc, _| acc * &ten);

    if exp > 0 {
        value * magnitude
    } else {
        value / magnitude
    }
}

/// 计算百分比差异 (to - from) / from * 100
///
/// 基准价格非正时相对差异无定义，返回 None。
pub fn calculate_percentage_difference(from: f64, to: f64) -> Option<f64> {
    if from.is_nan() || from <= 0.0 {
        return None;
    }

    let difference = (to - from) / from * 100.0;
    difference.is_finite().then_some(difference)
}

/// 验证以太坊地址格式
pub fn is_valid_ethereum_address(address: &str) -> bool {
    if !address.starts_with("0x") {
        return false;
    }

    if address.len() != 42 {
        return false;
    }

    address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// 解析地址并返回 EIP-55 校验和形式；格式不合法时返回 None
pub fn checksum_address(address: &str) -> Option<String> {
    if !is_valid_ethereum_address(address) {
        return None;
    }

    Address::from_str(address)
        .ok()
        .map(|parsed| to_checksum(&parsed, None))
}
