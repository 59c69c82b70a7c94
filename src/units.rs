/*!
 * 原子单位 / 人类单位换算 (Atomic / Human Unit Conversion)
 *
 * 链上金额是整数（token 最小单位），数学在人类单位中进行。
 * 规则：每次跨越交换腿边界时，金额必须经过 floor 转回原子单位，
 * 保守记账，不允许舍入凭空产生价值。
 */

use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};
use thiserror::Error;

/// 原子金额：token 最小单位的非负整数（SPL 链上为 u64）
pub type Atomic = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("negative amount cannot convert to atomic units")]
    NegativeAtomic,

    #[error("atomic conversion lost precision: {0}")]
    PrecisionLoss(String),
}

/// 10^decimals，精确构造
pub fn pow10(decimals: u8) -> BigDecimal {
    BigDecimal::new(BigInt::from(10u32).pow(decimals as u32), 0)
}

/// atomic → human：`a / 10^decimals`，精确（直接移动小数点）
pub fn atomic_to_human(amount: Atomic, decimals: u8) -> BigDecimal {
    BigDecimal::new(BigInt::from(amount), decimals as i64)
}

/// human → atomic：`floor(h × 10^decimals)`，下限为零
///
/// 负数金额视为上游 bug，返回 `NegativeAtomic`。
pub fn human_to_atomic(human: &BigDecimal, decimals: u8) -> Result<Atomic, UnitError> {
    if human.is_negative() {
        return Err(UnitError::NegativeAtomic);
    }
    let scaled = human * pow10(decimals);
    let floored = scaled.with_scale_round(0, RoundingMode::Floor);
    floored
        .to_u64()
        .ok_or_else(|| UnitError::PrecisionLoss(format!("{} does not fit u64", floored)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal_math::dec;

    #[test]
    fn test_atomic_to_human_exact() {
        assert_eq!(atomic_to_human(1_000_000_000, 9), dec("1"));
        assert_eq!(atomic_to_human(1_234_567, 6), dec("1.234567"));
        assert_eq!(atomic_to_human(1, 9), dec("0.000000001"));
    }

    #[test]
    fn test_human_to_atomic_floors() {
        // floor，绝不进位
        assert_eq!(human_to_atomic(&dec("1.9999999999"), 9).unwrap(), 1_999_999_999);
        assert_eq!(human_to_atomic(&dec("0.0000000009"), 9).unwrap(), 0);
        assert_eq!(human_to_atomic(&dec("0"), 6).unwrap(), 0);
    }

    #[test]
    fn test_negative_rejected() {
        assert_eq!(
            human_to_atomic(&dec("-0.1"), 6),
            Err(UnitError::NegativeAtomic)
        );
    }

    #[test]
    fn test_roundtrip_law() {
        // atomic_to_human(human_to_atomic(h)) ≤ h，当 h×10^d 为整数时相等
        let exact = dec("12.345678");
        let a = human_to_atomic(&exact, 6).unwrap();
        assert_eq!(atomic_to_human(a, 6), exact);

        let inexact = dec("12.3456789");
        let b = human_to_atomic(&inexact, 6).unwrap();
        assert!(atomic_to_human(b, 6) <= inexact);
    }

    #[test]
    fn test_overflow_detected() {
        let too_big = dec("99999999999999999999999999");
        assert!(matches!(
            human_to_atomic(&too_big, 9),
            Err(UnitError::PrecisionLoss(_))
        ));
    }
}
