/*!
 * 规范化池子记录 (Canonical Pool Record)
 *
 * 归一化之后的唯一池子形态，所有下游数学只认这个结构。
 * x/y 约定：`x_reserve` 持有 `mint_x`，`y_reserve` 持有 `mint_y`。
 */

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use solana_program::pubkey;
use solana_sdk::pubkey::Pubkey;

use crate::decimal_math::{self, ArithmeticError};
use crate::units::{atomic_to_human, Atomic};

/// Wrapped SOL mint
pub const WSOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

/// USDC mint
pub const USDC_MINT: Pubkey = pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");

/// AMM 家族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Cpmm,
    Clmm,
    Dlmm,
    /// Orca Whirlpool：CLMM 的方言，共用同一条交换路径
    Whirlpool,
}

impl PoolKind {
    pub fn is_clmm_family(self) -> bool {
        matches!(self, PoolKind::Clmm | PoolKind::Whirlpool)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PoolKind::Cpmm => "cpmm",
            PoolKind::Clmm => "clmm",
            PoolKind::Dlmm => "dlmm",
            PoolKind::Whirlpool => "whirlpool",
        }
    }
}

/// 储备量来源（富集阶段记录）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveSource {
    /// 实时 oracle 读出的 vault 余额
    Vault,
    /// 原始记录携带的缓存数量
    Cache,
    /// 外部 quoter 的池子状态
    Quoter,
    /// 没有任何可用来源
    None,
}

/// 归一化后的不可变池子记录
///
/// 不变量（归一化保证）：
/// - `mint_x != mint_y`
/// - `decimals_x, decimals_y ∈ [0, 18]`
/// - `fee_fraction ∈ [0, 1)`
/// - CPMM/DLMM 的 `x_reserve`/`y_reserve` 一旦设置则严格为正
/// - 储备字段绝不是 base58 形状的字符串（vault 地址单独存放）
#[derive(Debug, Clone)]
pub struct CanonicalPool {
    /// base58 池子地址，索引键
    pub pool_id: String,
    /// 小写 DEX 标签（"raydium"、"orca"、"meteora"、"unknown"）
    pub dex: String,
    pub kind: PoolKind,
    pub mint_x: Pubkey,
    pub mint_y: Pubkey,
    pub decimals_x: u8,
    pub decimals_y: u8,
    /// 仅用于展示，不参与数学
    pub symbol_x: String,
    pub symbol_y: String,
    /// 每次交换对输入收取的加法费率
    pub fee_fraction: BigDecimal,
    pub x_reserve: Option<Atomic>,
    pub y_reserve: Option<Atomic>,
    // CLMM / Whirlpool 状态
    pub sqrt_price_x64: Option<u128>,
    pub liquidity: Option<u128>,
    pub tick_current: Option<i32>,
    pub tick_spacing: Option<u16>,
    // DLMM 状态
    pub active_bin_id: Option<i32>,
    pub bin_step_bps: Option<u16>,
    // vault 地址（与储备数量是两回事）
    pub vault_x_addr: Option<Pubkey>,
    pub vault_y_addr: Option<Pubkey>,
    // 预过滤指标（来源提供时才有）
    pub tvl_usd: Option<BigDecimal>,
    pub volume_24h_usd: Option<BigDecimal>,
    // 富集阶段填写
    pub reserve_source: ReserveSource,
    pub reserve_timestamp: Option<DateTime<Utc>>,
}

impl CanonicalPool {
    pub fn contains_mint(&self, mint: &Pubkey) -> bool {
        self.mint_x == *mint || self.mint_y == *mint
    }

    /// 另一侧的 mint
    pub fn other_mint(&self, mint: &Pubkey) -> Option<Pubkey> {
        if self.mint_x == *mint {
            Some(self.mint_y)
        } else if self.mint_y == *mint {
            Some(self.mint_x)
        } else {
            None
        }
    }

    /// `in_mint` 是否为 x 侧（正向 x→y）
    pub fn is_forward(&self, in_mint: &Pubkey, out_mint: &Pubkey) -> Option<bool> {
        if *in_mint == self.mint_x && *out_mint == self.mint_y {
            Some(true)
        } else if *in_mint == self.mint_y && *out_mint == self.mint_x {
            Some(false)
        } else {
            None
        }
    }

    pub fn has_both_reserves(&self) -> bool {
        self.x_reserve.is_some() && self.y_reserve.is_some()
    }

    pub fn has_clmm_state(&self) -> bool {
        matches!(self.sqrt_price_x64, Some(sp) if sp > 0)
            && matches!(self.liquidity, Some(l) if l > 0)
    }

    /// 搜索阶段是否可用
    ///
    /// CPMM/DLMM 必须有两侧储备；CLMM 家族有 sqrt-price 状态即可，
    /// 没有状态但绑定了外部 quoter 时也可参与。
    pub fn is_math_ready(&self, quoter_bound: bool) -> bool {
        match self.kind {
            PoolKind::Cpmm | PoolKind::Dlmm => self.has_both_reserves(),
            PoolKind::Clmm | PoolKind::Whirlpool => self.has_clmm_state() || quoter_bound,
        }
    }

    /// 隐含价格：`quote` per `base`，人类单位
    ///
    /// `implied = y_reserve × 10^decimals_x / (x_reserve × 10^decimals_y)`
    /// 按传入方向定向；储备缺失返回 None。
    pub fn implied_price(
        &self,
        base: &Pubkey,
        quote: &Pubkey,
    ) -> Option<Result<BigDecimal, ArithmeticError>> {
        let forward = self.is_forward(base, quote)?;
        let x = self.x_reserve?;
        let y = self.y_reserve?;
        let x_human = atomic_to_human(x, self.decimals_x);
        let y_human = atomic_to_human(y, self.decimals_y);
        Some(if forward {
            decimal_math::div(&y_human, &x_human)
        } else {
            decimal_math::div(&x_human, &y_human)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal_math::dec;

    pub fn test_pool(pool_id: &str, mint_x: Pubkey, mint_y: Pubkey) -> CanonicalPool {
        CanonicalPool {
            pool_id: pool_id.to_string(),
            dex: "raydium".to_string(),
            kind: PoolKind::Cpmm,
            mint_x,
            mint_y,
            decimals_x: 9,
            decimals_y: 6,
            symbol_x: "SOL".to_string(),
            symbol_y: "USDC".to_string(),
            fee_fraction: dec("0.0025"),
            x_reserve: None,
            y_reserve: None,
            sqrt_price_x64: None,
            liquidity: None,
            tick_current: None,
            tick_spacing: None,
            active_bin_id: None,
            bin_step_bps: None,
            vault_x_addr: None,
            vault_y_addr: None,
            tvl_usd: None,
            volume_24h_usd: None,
            reserve_source: ReserveSource::None,
            reserve_timestamp: None,
        }
    }

    #[test]
    fn test_direction_resolution() {
        let pool = test_pool("p1", WSOL_MINT, USDC_MINT);
        assert_eq!(pool.is_forward(&WSOL_MINT, &USDC_MINT), Some(true));
        assert_eq!(pool.is_forward(&USDC_MINT, &WSOL_MINT), Some(false));
        let stranger = Pubkey::new_unique();
        assert_eq!(pool.is_forward(&stranger, &USDC_MINT), None);
    }

    #[test]
    fn test_implied_price_orientation() {
        let mut pool = test_pool("p1", WSOL_MINT, USDC_MINT);
        // 1000 SOL / 150_000 USDC → 150 USDC per SOL
        pool.x_reserve = Some(1_000_000_000_000);
        pool.y_reserve = Some(150_000_000_000);
        let price = pool.implied_price(&WSOL_MINT, &USDC_MINT).unwrap().unwrap();
        assert_eq!(price, dec("150"));
        let inverse = pool.implied_price(&USDC_MINT, &WSOL_MINT).unwrap().unwrap();
        assert!((inverse - dec("0.00666666")).abs() < dec("0.0000001"));
    }

    #[test]
    fn test_math_ready_by_kind() {
        let mut pool = test_pool("p1", WSOL_MINT, USDC_MINT);
        assert!(!pool.is_math_ready(false));
        pool.x_reserve = Some(1);
        pool.y_reserve = Some(1);
        assert!(pool.is_math_ready(false));

        let mut clmm = test_pool("p2", WSOL_MINT, USDC_MINT);
        clmm.kind = PoolKind::Whirlpool;
        assert!(!clmm.is_math_ready(false));
        assert!(clmm.is_math_ready(true));
        clmm.sqrt_price_x64 = Some(1 << 64);
        clmm.liquidity = Some(1_000_000);
        assert!(clmm.is_math_ready(false));
    }
}
