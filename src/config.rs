/*!
 * 搜索配置 (Search Config)
 *
 * 全部阈值十进制表示；非法配置在引擎构造时拒绝（fail-fast），
 * 与搜索期的单池、单三元组容错是两种策略。
 */

use bigdecimal::BigDecimal;
use num_traits::Zero;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::decimal_math::dec;
use crate::kernels::clmm::default_tick_boundary_threshold;
use crate::pool_state::{USDC_MINT, WSOL_MINT};
use crate::units::Atomic;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("invalid bounds: {0}")]
    InvalidBounds(String),
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// 起始 token A
    pub start_token: Pubkey,
    /// 枢轴 token C
    pub pivot_token: Pubkey,
    /// 起始名义本金（A 的原子单位）
    pub input_atomic: Atomic,
    /// `passes` 阈值（对 `net_after_costs_pct`）
    pub threshold_pct: BigDecimal,
    /// 利润安全上界，超过即丢弃（脏数据防线）
    pub max_profit_pct: BigDecimal,
    /// 亏损安全下界（按正数给出，低于 −值丢弃）
    pub max_loss_pct: BigDecimal,
    /// 每条边最多取的池子数 K
    pub max_pools_per_leg: usize,
    /// 结果列表上限
    pub max_routes: usize,
    /// 锚定对中位数过滤因子 F
    pub median_outlier_factor: BigDecimal,
    /// TVL 预过滤下限（USD）
    pub min_tvl: BigDecimal,
    /// 24h 成交量预过滤下限（USD）
    pub min_volume_24h: BigDecimal,
    /// CLMM 单 tick 越界阈值（sqrt-price 相对移动）
    pub tick_boundary_threshold: BigDecimal,
    /// 富集阶段 oracle 并发上限
    pub oracle_concurrency: usize,
    /// 每批 vault 地址数
    pub oracle_batch_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            start_token: WSOL_MINT,
            pivot_token: USDC_MINT,
            input_atomic: 1_000_000_000, // 1 SOL
            threshold_pct: dec("0.1"),
            max_profit_pct: dec("50"),
            max_loss_pct: dec("90"),
            max_pools_per_leg: 6,
            max_routes: 200,
            median_outlier_factor: dec("2.0"),
            min_tvl: BigDecimal::zero(),
            min_volume_24h: BigDecimal::zero(),
            tick_boundary_threshold: default_tick_boundary_threshold(),
            oracle_concurrency: 16,
            oracle_batch_size: 100,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_token == self.pivot_token {
            return Err(ConfigError::InvalidBounds(
                "start_token equals pivot_token".into(),
            ));
        }
        if self.input_atomic == 0 {
            return Err(ConfigError::InvalidBounds("input_atomic is zero".into()));
        }
        if self.max_profit_pct <= BigDecimal::zero() {
            return Err(ConfigError::InvalidBounds(format!(
                "max_profit_pct {} must be positive",
                self.max_profit_pct
            )));
        }
        if self.max_loss_pct <= BigDecimal::zero() {
            return Err(ConfigError::InvalidBounds(format!(
                "max_loss_pct {} must be positive",
                self.max_loss_pct
            )));
        }
        if self.threshold_pct > self.max_profit_pct {
            return Err(ConfigError::InvalidThreshold(format!(
                "threshold_pct {} above max_profit_pct {}",
                self.threshold_pct, self.max_profit_pct
            )));
        }
        if self.median_outlier_factor <= BigDecimal::from(1) {
            return Err(ConfigError::InvalidBounds(format!(
                "median_outlier_factor {} must exceed 1",
                self.median_outlier_factor
            )));
        }
        if self.max_pools_per_leg == 0 || self.max_routes == 0 {
            return Err(ConfigError::InvalidBounds(
                "max_pools_per_leg / max_routes must be positive".into(),
            ));
        }
        if self.tick_boundary_threshold <= BigDecimal::zero() {
            return Err(ConfigError::InvalidThreshold(
                "tick_boundary_threshold must be positive".into(),
            ));
        }
        if self.oracle_concurrency == 0 || self.oracle_batch_size == 0 {
            return Err(ConfigError::InvalidBounds(
                "oracle concurrency / batch size must be positive".into(),
            ));
        }
        Ok(())
    }
}
