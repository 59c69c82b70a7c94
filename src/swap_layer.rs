/*!
 * 交换契约层 (Swap Contract Layer)
 *
 * 两个语义严格分离的入口：
 * - `process_swap`     → 金额传播。返回的 `dy_atomic` 已经扣掉费率和
 *                        滑点，是下一腿的输入，后续任何环节不得再扣。
 * - `analytical_cost`  → 纯分析成本（费率 + 滑点，出侧计价），只用于
 *                        排名和过滤，绝不能从 `dy_atomic` 里再减一次。
 *
 * 两个函数返回不同类型、不共享可变状态，错误组合即是双重计费。
 *
 * 单位纪律：腿边界上金额一律 floor 转原子单位。
 */

use bigdecimal::BigDecimal;
use num_traits::Zero;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::decimal_math::{self, ArithmeticError};
use crate::kernels::clmm::{clmm_swap, default_tick_boundary_threshold};
use crate::kernels::cpmm::cpmm_swap;
use crate::kernels::dlmm::{bin_id_to_price, dlmm_swap_single_bin};
use crate::kernels::KernelQuote;
use crate::pool_state::{CanonicalPool, PoolKind, ReserveSource};
use crate::source_interface::SwapQuoter;
use crate::units::{atomic_to_human, human_to_atomic, pow10, Atomic, UnitError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SwapError {
    #[error("pool {pool_id}: neither side matches the requested mints")]
    MintMismatch { pool_id: String },

    #[error("pool {0}: reserves not populated")]
    MissingReserves(String),

    #[error("pool {0}: single-tick approximation exceeded, external quoter required")]
    NeedsQuoter(String),

    #[error("swap produced zero output")]
    ZeroOutput,

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// 报价来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegSource {
    Math,
    Oracle,
    Quoter,
}

/// 单腿结果：金额传播的唯一事实来源
#[derive(Debug, Clone)]
pub struct SwapLegResult {
    pub pool_id: String,
    pub in_mint: Pubkey,
    pub out_mint: Pubkey,
    pub dx_atomic: Atomic,
    /// 已含费率与滑点，下一腿直接使用
    pub dy_atomic: Atomic,
    pub dx_human: BigDecimal,
    pub dy_human: BigDecimal,
    pub fee_paid_in_human: BigDecimal,
    pub mid_price: BigDecimal,
    pub exec_price: BigDecimal,
    pub price_impact_pct: BigDecimal,
    pub source: LegSource,
}

/// 分析成本：全部以本腿**输出** token 的人类单位计价
///
/// 仅供排名；与 `SwapLegResult` 刻意不同型。
#[derive(Debug, Clone, PartialEq)]
pub struct CostBreakdown {
    pub fee_cost_out_human: BigDecimal,
    pub slippage_cost_out_human: BigDecimal,
    pub total_cost_out_human: BigDecimal,
}

/// 每次调用的环境：可选 quoter 与 CLMM 越界阈值
pub struct SwapContext<'a> {
    pub quoter: Option<&'a dyn SwapQuoter>,
    pub tick_boundary_threshold: BigDecimal,
}

impl<'a> SwapContext<'a> {
    pub fn new(quoter: Option<&'a dyn SwapQuoter>) -> Self {
        Self {
            quoter,
            tick_boundary_threshold: default_tick_boundary_threshold(),
        }
    }
}

impl Default for SwapContext<'static> {
    fn default() -> Self {
        Self::new(None)
    }
}

/// 方向解析 + decimals 选择
fn resolve_direction(
    pool: &CanonicalPool,
    in_mint: &Pubkey,
    out_mint: &Pubkey,
) -> Result<(bool, u8, u8), SwapError> {
    let forward = pool
        .is_forward(in_mint, out_mint)
        .ok_or_else(|| SwapError::MintMismatch {
            pool_id: pool.pool_id.clone(),
        })?;
    let (in_dec, out_dec) = if forward {
        (pool.decimals_x, pool.decimals_y)
    } else {
        (pool.decimals_y, pool.decimals_x)
    };
    Ok((forward, in_dec, out_dec))
}

/// 内核分发：三个家族的统一报价路径
fn kernel_quote(
    pool: &CanonicalPool,
    dx_atomic: Atomic,
    dx_human: &BigDecimal,
    forward: bool,
    in_mint: &Pubkey,
    out_mint: &Pubkey,
    in_dec: u8,
    out_dec: u8,
    ctx: &SwapContext<'_>,
) -> Result<(KernelQuote, LegSource), SwapError> {
    match pool.kind {
        PoolKind::Cpmm => {
            let (x, y) = oriented_reserves(pool, forward)?;
            let x_h = atomic_to_human(x, in_dec);
            let y_h = atomic_to_human(y, out_dec);
            let q = cpmm_swap(&x_h, &y_h, dx_human, &pool.fee_fraction)?;
            Ok((q, cache_or_oracle(pool)))
        }
        PoolKind::Dlmm => {
            let (_, out_reserve) = oriented_reserves(pool, forward)?;
            let out_h = atomic_to_human(out_reserve, out_dec);
            let price = dlmm_direction_price(pool, forward, in_dec, out_dec)?;
            let q = dlmm_swap_single_bin(&price, &out_h, dx_human, &pool.fee_fraction)?;
            Ok((q, cache_or_oracle(pool)))
        }
        PoolKind::Clmm | PoolKind::Whirlpool => {
            if let Some(quoter) = ctx.quoter {
                let quote = quoter
                    .quote(&pool.pool_id, in_mint, out_mint, dx_atomic)
                    .ok_or_else(|| SwapError::NeedsQuoter(pool.pool_id.clone()))?;
                let dy_human = atomic_to_human(quote.dy_atomic, quote.out_decimals);
                let fee_paid = quote
                    .fee_paid_human
                    .unwrap_or_else(|| dx_human * &pool.fee_fraction);
                let exec_price = match quote.exec_price {
                    Some(p) => p,
                    None => decimal_math::div(&dy_human, dx_human)?,
                };
                let mid_price = match quote.mid_price {
                    Some(p) => p,
                    None => exec_price.clone(),
                };
                let price_impact_pct = match quote.price_impact_pct {
                    Some(p) => p,
                    None => {
                        let dx_after_fee = dx_human - &fee_paid;
                        let slip = decimal_math::div(&dy_human, &dx_after_fee)?;
                        decimal_math::div(&(&mid_price - &slip).abs(), &mid_price)?
                            * BigDecimal::from(100)
                    }
                };
                Ok((
                    KernelQuote {
                        dy_human,
                        fee_paid_human: fee_paid,
                        mid_price,
                        exec_price,
                        price_impact_pct,
                    },
                    LegSource::Quoter,
                ))
            } else {
                let sqrt_price = pool
                    .sqrt_price_x64
                    .filter(|sp| *sp > 0)
                    .ok_or_else(|| SwapError::MissingReserves(pool.pool_id.clone()))?;
                let liquidity = pool
                    .liquidity
                    .filter(|l| *l > 0)
                    .ok_or_else(|| SwapError::MissingReserves(pool.pool_id.clone()))?;
                let q = clmm_swap(
                    sqrt_price,
                    liquidity,
                    in_dec,
                    out_dec,
                    dx_human,
                    &pool.fee_fraction,
                    forward,
                    &ctx.tick_boundary_threshold,
                )?;
                // 无 quoter 时越过单 tick 边界是硬失败
                if q.crossed_tick_boundary {
                    return Err(SwapError::NeedsQuoter(pool.pool_id.clone()));
                }
                Ok((q.quote, LegSource::Math))
            }
        }
    }
}

fn cache_or_oracle(pool: &CanonicalPool) -> LegSource {
    if pool.reserve_source == ReserveSource::Vault {
        LegSource::Oracle
    } else {
        LegSource::Math
    }
}

fn oriented_reserves(pool: &CanonicalPool, forward: bool) -> Result<(Atomic, Atomic), SwapError> {
    match (pool.x_reserve, pool.y_reserve) {
        (Some(x), Some(y)) => Ok(if forward { (x, y) } else { (y, x) }),
        _ => Err(SwapError::MissingReserves(pool.pool_id.clone())),
    }
}

/// DLMM 方向价格（人类单位 out/in）
///
/// 有活跃 bin 状态时从 `(1 + bin_step)^active_bin_id` 推出，
/// 否则退回储备比值。
fn dlmm_direction_price(
    pool: &CanonicalPool,
    forward: bool,
    in_dec: u8,
    out_dec: u8,
) -> Result<BigDecimal, SwapError> {
    if let (Some(bin_id), Some(step)) = (pool.active_bin_id, pool.bin_step_bps) {
        let atomic_price = bin_id_to_price(bin_id, step)?;
        let shift = decimal_math::div(&pow10(in_dec), &pow10(out_dec))?;
        let price = if forward {
            decimal_math::round_sig(&(&atomic_price * &shift), decimal_math::PRECISION)
        } else {
            decimal_math::div(&shift, &atomic_price)?
        };
        return Ok(price);
    }
    let (in_res, out_res) = oriented_reserves(pool, forward)?;
    let in_h = atomic_to_human(in_res, in_dec);
    let out_h = atomic_to_human(out_res, out_dec);
    Ok(decimal_math::div(&out_h, &in_h)?)
}

/// 金额传播：一条腿的完整交换
///
/// 步骤：方向解析 → decimals 选择 → human 转换 → 内核 →
/// `dy_human` floor 回原子单位。
pub fn process_swap(
    pool: &CanonicalPool,
    dx_atomic: Atomic,
    in_mint: &Pubkey,
    out_mint: &Pubkey,
    ctx: &SwapContext<'_>,
) -> Result<SwapLegResult, SwapError> {
    if dx_atomic == 0 {
        return Err(SwapError::ZeroOutput);
    }
    let (forward, in_dec, out_dec) = resolve_direction(pool, in_mint, out_mint)?;
    let dx_human = atomic_to_human(dx_atomic, in_dec);

    let (q, source) = kernel_quote(
        pool, dx_atomic, &dx_human, forward, in_mint, out_mint, in_dec, out_dec, ctx,
    )?;

    let dy_atomic = human_to_atomic(&q.dy_human, out_dec)?;
    if dy_atomic == 0 {
        return Err(SwapError::ZeroOutput);
    }

    Ok(SwapLegResult {
        pool_id: pool.pool_id.clone(),
        in_mint: *in_mint,
        out_mint: *out_mint,
        dx_atomic,
        dy_atomic,
        dx_human,
        dy_human: q.dy_human,
        fee_paid_in_human: q.fee_paid_human,
        mid_price: q.mid_price,
        exec_price: q.exec_price,
        price_impact_pct: q.price_impact_pct,
        source,
    })
}

/// 分析成本：相对无穷小中间价执行，本腿放弃了多少（出侧计价）
///
/// ```text
/// ideal_out_at_mid  = dx × mid
/// fee_cost_out      = dx × fee × mid
/// slippage_cost_out = max(0, ideal − fee_cost − dy)
/// ```
///
/// 不得从 `dy_atomic` 中扣减，`dy_atomic` 已经反映了这些成本。
pub fn analytical_cost(
    pool: &CanonicalPool,
    dx_atomic: Atomic,
    in_mint: &Pubkey,
    out_mint: &Pubkey,
    ctx: &SwapContext<'_>,
) -> Result<CostBreakdown, SwapError> {
    if dx_atomic == 0 {
        return Err(SwapError::ZeroOutput);
    }
    let (forward, in_dec, out_dec) = resolve_direction(pool, in_mint, out_mint)?;
    let dx_human = atomic_to_human(dx_atomic, in_dec);

    let (q, _) = kernel_quote(
        pool, dx_atomic, &dx_human, forward, in_mint, out_mint, in_dec, out_dec, ctx,
    )?;

    let ideal_out = &dx_human * &q.mid_price;
    let fee_cost = &dx_human * &pool.fee_fraction * &q.mid_price;
    let slippage_cost = decimal_math::dec_max(
        BigDecimal::zero(),
        &ideal_out - &fee_cost - &q.dy_human,
    );
    let total = &fee_cost + &slippage_cost;

    Ok(CostBreakdown {
        fee_cost_out_human: fee_cost,
        slippage_cost_out_human: slippage_cost,
        total_cost_out_human: total,
    })
}
