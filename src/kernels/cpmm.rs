//! 恒定乘积内核：`x · y = k` 的精确闭式解
//!
//! Uniswap V2 / Raydium AMM V4 同款公式，十进制精确运算，
//! 消除线性近似带来的 2-5% 误差。

use bigdecimal::BigDecimal;
use num_traits::Zero;

use crate::decimal_math::{self, ArithmeticError};
use crate::kernels::KernelQuote;

/// 恒定乘积交换
///
/// ```text
/// fee_paid     = dx × fee
/// dx_after_fee = dx − fee_paid
/// dy           = y × dx_after_fee / (x + dx_after_fee)
/// ```
///
/// 前置条件：`x > 0 ∧ y > 0 ∧ dx > 0`，`fee ∈ [0, 1)`。
/// 由调用方（swap 层）保证；内核对零分母返回 `DivisionByZero`。
pub fn cpmm_swap(
    x_human: &BigDecimal,
    y_human: &BigDecimal,
    dx_human: &BigDecimal,
    fee_fraction: &BigDecimal,
) -> Result<KernelQuote, ArithmeticError> {
    if x_human.is_zero() || y_human.is_zero() || dx_human.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }

    let fee_paid = dx_human * fee_fraction;
    let dx_after_fee = dx_human - &fee_paid;

    let dy_human = decimal_math::div(&(y_human * &dx_after_fee), &(x_human + &dx_after_fee))?;

    let mid_price = decimal_math::div(y_human, x_human)?;
    let exec_price = decimal_math::div(&dy_human, dx_human)?;

    // 滑点：以 dx_after_fee 计的成交价对中间价的偏离，费率不计入
    let slip_price = decimal_math::div(&dy_human, &dx_after_fee)?;
    let price_impact_pct = decimal_math::div(&(&mid_price - &slip_price).abs(), &mid_price)?
        * BigDecimal::from(100);

    Ok(KernelQuote {
        dy_human,
        fee_paid_human: fee_paid,
        mid_price,
        exec_price,
        price_impact_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal_math::dec;

    #[test]
    fn test_basic_swap() {
        // 1000 x / 2000 y，fee 0.25%，dx = 10
        // dy = 2000 × 9.975 / 1009.975 = 19950 / 1009.975
        let q = cpmm_swap(&dec("1000"), &dec("2000"), &dec("10"), &dec("0.0025")).unwrap();
        let expected = decimal_math::div(&dec("19950"), &dec("1009.975")).unwrap();
        assert_eq!(q.dy_human, expected);
        assert_eq!(q.mid_price, dec("2"));
        assert_eq!(q.fee_paid_human, dec("0.025"));
        // exec = dy / dx，含费率
        assert_eq!(q.exec_price, decimal_math::div(&q.dy_human, &dec("10")).unwrap());
        assert!(q.dy_human > dec("19.75") && q.dy_human < dec("19.76"));
    }

    #[test]
    fn test_output_bounded_by_reserve() {
        // 任意正输入都不可能抽干输出侧
        for dx in ["0.001", "1", "1000", "1000000"] {
            let q = cpmm_swap(&dec("1000"), &dec("2000"), &dec(dx), &dec("0.0025")).unwrap();
            assert!(q.dy_human > dec("0"), "dx={}", dx);
            assert!(q.dy_human < dec("2000"), "dx={}", dx);
        }
    }

    #[test]
    fn test_output_monotone_in_input() {
        let mut last = dec("0");
        for dx in ["1", "2", "5", "10", "100", "1000"] {
            let q = cpmm_swap(&dec("1000"), &dec("2000"), &dec(dx), &dec("0.0025")).unwrap();
            assert!(q.dy_human > last, "dy must grow with dx");
            last = q.dy_human;
        }
    }

    #[test]
    fn test_impact_grows_with_size() {
        let small = cpmm_swap(&dec("1000"), &dec("2000"), &dec("1"), &dec("0.0025")).unwrap();
        let large = cpmm_swap(&dec("1000"), &dec("2000"), &dec("100"), &dec("0.0025")).unwrap();
        assert!(small.price_impact_pct < large.price_impact_pct);
        // 10% 池子深度的交易，滑点在 9% 附近
        assert!(large.price_impact_pct > dec("8"));
        assert!(large.price_impact_pct < dec("10"));
    }

    #[test]
    fn test_zero_fee_pool() {
        let q = cpmm_swap(&dec("1000"), &dec("185000"), &dec("1"), &dec("0")).unwrap();
        assert_eq!(q.fee_paid_human, dec("0"));
        assert!(q.dy_human > dec("184.8"));
        assert!(q.dy_human < dec("185"));
    }

    #[test]
    fn test_zero_reserve_rejected() {
        assert_eq!(
            cpmm_swap(&dec("0"), &dec("2000"), &dec("1"), &dec("0.0025")),
            Err(ArithmeticError::DivisionByZero)
        );
    }
}
