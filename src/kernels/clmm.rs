//! CLMM / Whirlpool 单 tick 内核
//!
//! 仅凭 `sqrt_price_x64` 和 `liquidity` 无法跨 tick 精确报价。
//! 这里在单 tick 内用精确的 sqrt-price 关系求解：
//!
//! ```text
//! x → y:  Δ(1/√P) = dx / L，dy = L × Δ√P
//! y → x:  Δ√P     = dx / L，dy = L × Δ(1/√P)
//! ```
//!
//! 同时返回 `crossed_tick_boundary`：相对 sqrt-price 移动超过阈值
//! （缺省半个 tick）时置位。需要精度的调用方必须转投外部 quoter，
//! 静默近似是正确性错误。

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Zero;

use crate::decimal_math::{self, dec, ArithmeticError};
use crate::kernels::KernelQuote;
use crate::units::pow10;

/// Whirlpool / Raydium CLMM 全 tick 范围
pub const MIN_TICK: i32 = -443_636;
pub const MAX_TICK: i32 = 443_636;

/// 缺省越界阈值：半个 tick 的 sqrt-price 相对移动
/// `1.0001^(1/4) − 1 ≈ 0.000025`
pub fn default_tick_boundary_threshold() -> BigDecimal {
    dec("0.000025")
}

fn two_pow_64() -> BigDecimal {
    BigDecimal::new(BigInt::from(1u128 << 64), 0)
}

/// `sqrt_price_x64 → price`：`(sqrt_price / 2^64)^2`（原子价格，y per x）
pub fn sqrt_price_x64_to_price(sqrt_price_x64: u128) -> Result<BigDecimal, ArithmeticError> {
    let s = decimal_math::div(&decimal_math::dec_u128(sqrt_price_x64), &two_pow_64())?;
    Ok(decimal_math::round_sig(&(&s * &s), decimal_math::PRECISION))
}

/// `price → sqrt_price_x64`：`sqrt(price) × 2^64`（十进制表示）
pub fn price_to_sqrt_price_x64(price: &BigDecimal) -> Result<BigDecimal, ArithmeticError> {
    Ok(decimal_math::sqrt(price)? * two_pow_64())
}

/// `tick → price`：`1.0001^tick`
pub fn tick_to_price(tick: i32) -> Result<BigDecimal, ArithmeticError> {
    decimal_math::pow_int(&dec("1.0001"), tick as i64)
}

/// `price → tick`：`floor(log_1.0001(price))`
///
/// 对 tick 整数域二分，找最大的 `t` 使 `1.0001^t ≤ price`。
/// 与 `tick_to_price` 用同一套幂运算，保证夹逼律成立。
pub fn price_to_tick(price: &BigDecimal) -> Result<i32, ArithmeticError> {
    if price <= &BigDecimal::zero() {
        return Err(ArithmeticError::NegativeRoot);
    }
    let mut lo = MIN_TICK;
    let mut hi = MAX_TICK;
    if &tick_to_price(lo)? > price {
        return Ok(MIN_TICK);
    }
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if &tick_to_price(mid)? <= price {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(lo)
}

/// 单 tick CLMM 报价
#[derive(Debug, Clone, PartialEq)]
pub struct ClmmQuote {
    pub quote: KernelQuote,
    /// 为真时本次报价越过了单 tick 近似的有效范围
    pub crossed_tick_boundary: bool,
}

/// 单 tick 内精确交换
///
/// 前置条件：`sqrt_price_x64 > 0 ∧ liquidity > 0`。
/// `x_to_y` 为 true 时输入是 x 侧（价格下行），否则输入 y 侧（上行）。
#[allow(clippy::too_many_arguments)]
pub fn clmm_swap(
    sqrt_price_x64: u128,
    liquidity: u128,
    in_decimals: u8,
    out_decimals: u8,
    dx_human: &BigDecimal,
    fee_fraction: &BigDecimal,
    x_to_y: bool,
    boundary_threshold: &BigDecimal,
) -> Result<ClmmQuote, ArithmeticError> {
    if sqrt_price_x64 == 0 || liquidity == 0 || dx_human.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }

    // s = √P（原子域），L = liquidity
    let s = decimal_math::div(&decimal_math::dec_u128(sqrt_price_x64), &two_pow_64())?;
    let l = decimal_math::dec_u128(liquidity);

    let fee_paid = dx_human * fee_fraction;
    let dx_after_fee = dx_human - &fee_paid;
    let dx_atomic = &dx_after_fee * pow10(in_decimals);

    let (dy_atomic, sqrt_move_ratio) = if x_to_y {
        // 1/√P 增长 dx/L，√P 下行
        let inv = decimal_math::div(&BigDecimal::from(1), &s)?;
        let inv_new = &inv + decimal_math::div(&dx_atomic, &l)?;
        let s_new = decimal_math::div(&BigDecimal::from(1), &inv_new)?;
        let dy = &l * (&s - &s_new);
        let ratio = decimal_math::div(&(&s - &s_new), &s)?;
        (dy, ratio)
    } else {
        // √P 上行 dx/L
        let s_new = &s + decimal_math::div(&dx_atomic, &l)?;
        let inv = decimal_math::div(&BigDecimal::from(1), &s)?;
        let inv_new = decimal_math::div(&BigDecimal::from(1), &s_new)?;
        let dy = &l * (&inv - &inv_new);
        let ratio = decimal_math::div(&(&s_new - &s), &s)?;
        (dy, ratio)
    };

    let crossed_tick_boundary = sqrt_move_ratio >= *boundary_threshold;

    let dy_human = decimal_math::div(&dy_atomic, &pow10(out_decimals))?;

    // 中间价（人类域 out/in）：s² 或 1/s²，再做 decimals 调整
    let price_atomic = decimal_math::round_sig(&(&s * &s), decimal_math::PRECISION);
    let mid_atomic = if x_to_y {
        price_atomic
    } else {
        decimal_math::div(&BigDecimal::from(1), &price_atomic)?
    };
    let mid_price = decimal_math::div(&(&mid_atomic * pow10(in_decimals)), &pow10(out_decimals))?;

    let exec_price = decimal_math::div(&dy_human, dx_human)?;
    let slip_price = decimal_math::div(&dy_human, &dx_after_fee)?;
    let price_impact_pct = decimal_math::div(&(&mid_price - &slip_price).abs(), &mid_price)?
        * BigDecimal::from(100);

    Ok(ClmmQuote {
        quote: KernelQuote {
            dy_human,
            fee_paid_human: fee_paid,
            mid_price,
            exec_price,
            price_impact_pct,
        },
        crossed_tick_boundary,
    })
}
