/*!
 * 精确十进制运算层 (Exact Decimal Math)
 *
 * 所有交换计算的数值基础：
 * - 任意精度有符号十进制（bigdecimal），工作精度 50 位有效数字
 * - 所有不精确操作（除法、开方、幂）向零截断（ROUND_DOWN）
 * - 流水线中禁止二进制浮点数
 */

use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::BigInt;
use num_traits::{One, Zero};
use thiserror::Error;

/// 工作精度：50 位有效数字（规格下限 40 位之上留余量）
pub const PRECISION: u64 = 50;

/// 中间结果精度（防止连乘时误差进入最终 50 位）
const GUARD_PRECISION: u64 = 60;

/// Hard in-kernel arithmetic failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("square root of negative value")]
    NegativeRoot,

    #[error("arithmetic overflow: {0}")]
    Overflow(String),
}

/// Parse a decimal literal. Only for compile-time-known constants;
/// external input goes through `BigDecimal::from_str` with error handling.
pub fn dec(literal: &str) -> BigDecimal {
    BigDecimal::from_str(literal).expect("valid decimal literal")
}

pub fn dec_u64(v: u64) -> BigDecimal {
    BigDecimal::from(v)
}

pub fn dec_u128(v: u128) -> BigDecimal {
    BigDecimal::from(BigInt::from(v))
}

/// Truncate to `sig` significant digits, toward zero.
///
/// Addition/subtraction/multiplication stay exact; this is applied after
/// division, sqrt and pow so results are deterministic across platforms.
pub fn round_sig(x: &BigDecimal, sig: u64) -> BigDecimal {
    if x.is_zero() {
        return BigDecimal::zero();
    }
    let digits = x.digits();
    if digits <= sig {
        return x.clone();
    }
    let drop = digits - sig;
    let (unscaled, exponent) = x.as_bigint_and_exponent();
    // BigInt 除法向零截断，正好是 ROUND_DOWN
    let truncated = unscaled / BigInt::from(10u32).pow(drop as u32);
    BigDecimal::new(truncated, exponent - drop as i64)
}

/// Division, truncated toward zero at `PRECISION` significant digits.
pub fn div(lhs: &BigDecimal, rhs: &BigDecimal) -> Result<BigDecimal, ArithmeticError> {
    if rhs.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }
    Ok(round_sig(&(lhs / rhs), PRECISION))
}

/// Square root, truncated toward zero at `PRECISION` significant digits.
pub fn sqrt(x: &BigDecimal) -> Result<BigDecimal, ArithmeticError> {
    match x.sqrt() {
        Some(root) => Ok(round_sig(&root, PRECISION)),
        None => Err(ArithmeticError::NegativeRoot),
    }
}

/// Integer power by binary exponentiation.
///
/// Intermediate products are truncated at `GUARD_PRECISION` so that
/// `1.0001^tick` over the full tick range stays cheap; the result is
/// truncated at `PRECISION`. Negative exponents invert at the end.
pub fn pow_int(base: &BigDecimal, exp: i64) -> Result<BigDecimal, ArithmeticError> {
    if exp == 0 {
        return Ok(BigDecimal::one());
    }
    if exp < 0 {
        let magnitude = exp
            .checked_neg()
            .ok_or_else(|| ArithmeticError::Overflow(format!("pow exponent {}", exp)))?;
        let positive = pow_int(base, magnitude)?;
        return div(&BigDecimal::one(), &positive);
    }

    let mut result = BigDecimal::one();
    let mut acc = base.clone();
    let mut e = exp as u64;
    while e > 0 {
        if e & 1 == 1 {
            result = round_sig(&(&result * &acc), GUARD_PRECISION);
        }
        e >>= 1;
        if e > 0 {
            acc = round_sig(&(&acc * &acc), GUARD_PRECISION);
        }
    }
    Ok(round_sig(&result, PRECISION))
}

/// Largest integer ≤ x.
pub fn floor(x: &BigDecimal) -> BigDecimal {
    x.with_scale_round(0, RoundingMode::Floor)
}

/// Smallest integer ≥ x.
pub fn ceil(x: &BigDecimal) -> BigDecimal {
    x.with_scale_round(0, RoundingMode::Ceiling)
}

/// Total-order minimum (BigDecimal is Ord, kept as named helpers to mirror max).
pub fn dec_min(a: BigDecimal, b: BigDecimal) -> BigDecimal {
    if a <= b {
        a
    } else {
        b
    }
}

pub fn dec_max(a: BigDecimal, b: BigDecimal) -> BigDecimal {
    if a >= b {
        a
    } else {
        b
    }
}
