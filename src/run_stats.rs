/*!
 * 运行统计 (Run Stats)
 *
 * 引擎对单池、单三元组失败一律记数继续，绝不中断整次搜索。
 * 这里收集各错误类别的计数和各阶段池子数量，随结果一并返回。
 */

use std::fmt;

use crate::decimal_math::ArithmeticError;
use crate::pool_normalizer::NormalizeError;
use crate::swap_layer::SwapError;
use crate::units::UnitError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    // 阶段计数
    pub pools_normalized: u64,
    pub pools_enriched: u64,
    pub pools_indexed: u64,
    pub candidates_b: u64,
    pub triples_evaluated: u64,
    pub cycles_emitted: u64,

    // 归一化错误
    pub missing_address: u64,
    pub invalid_address: u64,
    pub missing_mint: u64,
    pub decimals_out_of_range: u64,
    pub ambiguous_reserve: u64,
    pub invariant_violated: u64,

    // 富集错误
    pub oracle_decode_failures: u64,
    pub no_reserve_source: u64,

    // 搜索阶段错误（单三元组丢弃）
    pub mint_mismatch: u64,
    pub missing_reserves: u64,
    pub needs_quoter: u64,
    pub zero_output: u64,
    pub arithmetic_errors: u64,
    pub unit_errors: u64,

    // 过滤
    pub outliers_filtered: u64,
    pub prefiltered: u64,
    pub bounds_discarded: u64,
}

impl RunStats {
    pub fn record_normalize_error(&mut self, e: &NormalizeError) {
        match e {
            NormalizeError::MissingAddress => self.missing_address += 1,
            NormalizeError::InvalidAddress(_) => self.invalid_address += 1,
            NormalizeError::MissingMint(_) => self.missing_mint += 1,
            NormalizeError::DecimalsOutOfRange(_) => self.decimals_out_of_range += 1,
            NormalizeError::AmbiguousReserve { .. } => self.ambiguous_reserve += 1,
            NormalizeError::InvariantViolated(_) => self.invariant_violated += 1,
        }
    }

    pub fn record_swap_error(&mut self, e: &SwapError) {
        match e {
            SwapError::MintMismatch { .. } => self.mint_mismatch += 1,
            SwapError::MissingReserves(_) => self.missing_reserves += 1,
            SwapError::NeedsQuoter(_) => self.needs_quoter += 1,
            SwapError::ZeroOutput => self.zero_output += 1,
            SwapError::Arithmetic(_) => self.arithmetic_errors += 1,
            SwapError::Unit(_) => self.unit_errors += 1,
        }
    }

    pub fn record_arithmetic_error(&mut self, _e: &ArithmeticError) {
        self.arithmetic_errors += 1;
    }

    pub fn record_unit_error(&mut self, _e: &UnitError) {
        self.unit_errors += 1;
    }

    /// 并行 worker 的局部统计汇入总表
    pub fn merge(&mut self, other: &RunStats) {
        self.pools_normalized += other.pools_normalized;
        self.pools_enriched += other.pools_enriched;
        self.pools_indexed += other.pools_indexed;
        self.candidates_b += other.candidates_b;
        self.triples_evaluated += other.triples_evaluated;
        self.cycles_emitted += other.cycles_emitted;
        self.missing_address += other.missing_address;
        self.invalid_address += other.invalid_address;
        self.missing_mint += other.missing_mint;
        self.decimals_out_of_range += other.decimals_out_of_range;
        self.ambiguous_reserve += other.ambiguous_reserve;
        self.invariant_violated += other.invariant_violated;
        self.oracle_decode_failures += other.oracle_decode_failures;
        self.no_reserve_source += other.no_reserve_source;
        self.mint_mismatch += other.mint_mismatch;
        self.missing_reserves += other.missing_reserves;
        self.needs_quoter += other.needs_quoter;
        self.zero_output += other.zero_output;
        self.arithmetic_errors += other.arithmetic_errors;
        self.unit_errors += other.unit_errors;
        self.outliers_filtered += other.outliers_filtered;
        self.prefiltered += other.prefiltered;
        self.bounds_discarded += other.bounds_discarded;
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "pools: {} normalized, {} enriched, {} indexed | search: {} candidates, {} triples, {} cycles",
            self.pools_normalized,
            self.pools_enriched,
            self.pools_indexed,
            self.candidates_b,
            self.triples_evaluated,
            self.cycles_emitted
        )?;
        write!(
            f,
            "errors: normalize {} | oracle {} | no-source {} | swap {} | arithmetic {} | filtered {} outliers, {} prefiltered, {} out-of-bounds",
            self.missing_address
                + self.invalid_address
                + self.missing_mint
                + self.decimals_out_of_range
                + self.ambiguous_reserve
                + self.invariant_violated,
            self.oracle_decode_failures,
            self.no_reserve_source,
            self.mint_mismatch + self.missing_reserves + self.needs_quoter + self.zero_output,
            self.arithmetic_errors + self.unit_errors,
            self.outliers_filtered,
            self.prefiltered,
            self.bounds_discarded
        )
    }
}
