//! 金额换算，统一模型使用元（Decimal），渠道报文使用分

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::utils::error::PayError;

const MAX_SCALE: u32 = 2;

/// 校验金额为正且最多两位小数
pub fn validate_amount(amount: Decimal) -> Result<(), PayError> {
    if amount <= Decimal::ZERO {
        return Err(PayError::invalid_amount(format!("amount must be positive, got {amount}")));
    }
    if amount.normalize().scale() > MAX_SCALE {
        return Err(PayError::invalid_amount(format!(
            "amount supports at most {MAX_SCALE} decimal places, got {amount}"
        )));
    }
    Ok(())
}

/// 元 -> 分
pub fn to_minor_units(amount: Decimal) -> Result<i64, PayError> {
    validate_amount(amount)?;
    (amount * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| PayError::invalid_amount(format!("amount out of range: {amount}")))
}

/// 分 -> 元
pub fn from_minor_units(fen: i64) -> Decimal {
    Decimal::new(fen, MAX_SCALE)
}

/// 元，固定两位小数的字符串形式（支付宝报文使用）
pub fn format_major_units(amount: Decimal) -> String {
    format!("{:.2}", amount)
}
