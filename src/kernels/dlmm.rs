//! DLMM（离散 bin）内核：Meteora 风格
//!
//! 每个 bin 在自己的常数价格上成交：`price = (1 + bin_step)^bin_id`。
//! 单 bin 报价在活跃 bin 价格上一次成交、受出侧储备封顶；
//! 多 bin 行走按价格排序逐 bin 消耗，剩余输入结转到下一个 bin。
//! 费率在入口对整笔 dx 一次计提。

use bigdecimal::BigDecimal;
use num_traits::Zero;

use crate::decimal_math::{self, ArithmeticError};
use crate::kernels::KernelQuote;

/// Meteora bin id 范围
pub const MIN_BIN_ID: i32 = -443_636;
pub const MAX_BIN_ID: i32 = 443_636;

/// `bin_step = basis_points / 10_000`
pub fn bin_step_fraction(bin_step_bps: u16) -> BigDecimal {
    decimal_math::round_sig(
        &(BigDecimal::from(bin_step_bps as u64) / BigDecimal::from(10_000)),
        decimal_math::PRECISION,
    )
}

/// `price = (1 + bin_step)^bin_id`（原子价格，y per x）
pub fn bin_id_to_price(bin_id: i32, bin_step_bps: u16) -> Result<BigDecimal, ArithmeticError> {
    let base = BigDecimal::from(1) + bin_step_fraction(bin_step_bps);
    decimal_math::pow_int(&base, bin_id as i64)
}

/// `bin_id = floor(log_(1+step)(price))`，与 `bin_id_to_price` 同源二分
pub fn price_to_bin_id(price: &BigDecimal, bin_step_bps: u16) -> Result<i32, ArithmeticError> {
    if price <= &BigDecimal::zero() {
        return Err(ArithmeticError::NegativeRoot);
    }
    let mut lo = MIN_BIN_ID;
    let mut hi = MAX_BIN_ID;
    if &bin_id_to_price(lo, bin_step_bps)? > price {
        return Ok(MIN_BIN_ID);
    }
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if &bin_id_to_price(mid, bin_step_bps)? <= price {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(lo)
}

/// 多 bin 行走的单个 bin：两侧人类单位储备
#[derive(Debug, Clone)]
pub struct Bin {
    pub bin_id: i32,
    pub x_human: BigDecimal,
    pub y_human: BigDecimal,
}

/// 单 bin 交换：全部输入在活跃 bin 价格成交，出侧储备封顶
///
/// `active_price` 是人类单位的 out/in 方向价格，
/// `out_reserve_human` 是出侧可用储备。
pub fn dlmm_swap_single_bin(
    active_price: &BigDecimal,
    out_reserve_human: &BigDecimal,
    dx_human: &BigDecimal,
    fee_fraction: &BigDecimal,
) -> Result<KernelQuote, ArithmeticError> {
    if active_price.is_zero() || out_reserve_human.is_zero() || dx_human.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }

    let fee_paid = dx_human * fee_fraction;
    let dx_after_fee = dx_human - &fee_paid;

    let ideal = &dx_after_fee * active_price;
    let dy_human = decimal_math::dec_min(ideal, out_reserve_human.clone());

    let exec_price = decimal_math::div(&dy_human, dx_human)?;
    let slip_price = decimal_math::div(&dy_human, &dx_after_fee)?;
    let price_impact_pct = decimal_math::div(&(active_price - &slip_price).abs(), active_price)?
        * BigDecimal::from(100);

    Ok(KernelQuote {
        dy_human,
        fee_paid_human: fee_paid,
        mid_price: active_price.clone(),
        exec_price,
        price_impact_pct,
    })
}

/// 多 bin 行走
///
/// `x_to_y` 为 true 时消耗各 bin 的 y 侧，价格沿 bin 下行（降序）；
/// 反向则消耗 x 侧，价格上行（升序）。`bins` 的价格由 bin_id 推出，
/// decimals 调整由传入的人类单位价格方向完成。
///
/// 中间价取入口 bin（行走顺序第一个）的价格。
#[allow(clippy::too_many_arguments)]
pub fn dlmm_swap_multi_bin(
    bins: &[Bin],
    bin_step_bps: u16,
    in_decimals: u8,
    out_decimals: u8,
    dx_human: &BigDecimal,
    fee_fraction: &BigDecimal,
    x_to_y: bool,
) -> Result<KernelQuote, ArithmeticError> {
    if bins.is_empty() || dx_human.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }

    let mut sorted: Vec<&Bin> = bins.iter().collect();
    // x→y 价格降序，y→x 价格升序；价格随 bin_id 单调，按 id 排即可
    if x_to_y {
        sorted.sort_by_key(|b| std::cmp::Reverse(b.bin_id));
    } else {
        sorted.sort_by_key(|b| b.bin_id);
    }

    let fee_paid = dx_human * fee_fraction;
    let dx_after_fee = dx_human - &fee_paid;

    let decimals_shift = decimal_math::div(
        &crate::units::pow10(in_decimals),
        &crate::units::pow10(out_decimals),
    )?;

    let mut remaining = dx_after_fee.clone();
    let mut dy_total = BigDecimal::zero();
    let mut entry_price: Option<BigDecimal> = None;

    for bin in sorted {
        if remaining.is_zero() || remaining < BigDecimal::zero() {
            break;
        }
        let atomic_price = bin_id_to_price(bin.bin_id, bin_step_bps)?;
        // 人类单位的 out/in 方向价格
        let dir_price = if x_to_y {
            decimal_math::round_sig(&(&atomic_price * &decimals_shift), decimal_math::PRECISION)
        } else {
            decimal_math::div(
                &BigDecimal::from(1),
                &decimal_math::round_sig(
                    &(&atomic_price * decimal_math::div(&BigDecimal::from(1), &decimals_shift)?),
                    decimal_math::PRECISION,
                ),
            )?
        };
        let available = if x_to_y { &bin.y_human } else { &bin.x_human };
        if available.is_zero() {
            continue;
        }
        if entry_price.is_none() {
            entry_price = Some(dir_price.clone());
        }

        let want = &remaining * &dir_price;
        if &want <= available {
            dy_total += want;
            remaining = BigDecimal::zero();
            break;
        }
        // bin 耗尽：取走全部可用量，剩余输入结转
        dy_total += available.clone();
        remaining -= decimal_math::div(available, &dir_price)?;
    }

    let mid_price = entry_price.ok_or(ArithmeticError::DivisionByZero)?;
    let exec_price = decimal_math::div(&dy_total, dx_human)?;
    let slip_price = decimal_math::div(&dy_total, &dx_after_fee)?;
    let price_impact_pct =
        decimal_math::div(&(&mid_price - &slip_price).abs(), &mid_price)? * BigDecimal::from(100);

    Ok(KernelQuote {
        dy_human: dy_total,
        fee_paid_human: fee_paid,
        mid_price,
        exec_price,
        price_impact_pct,
    })
}
