/*!
 * 链上 AMM 三角套利模拟器
 *
 * 给定一组异构 AMM 池子（CPMM / CLMM / DLMM）、起始 token 和名义
 * 本金，枚举 A → B → C → A 三池循环，逐腿精确模拟，按扣除分析
 * 成本后的净收益排名。链上 I/O 全部通过注入接口完成。
 */

pub mod config;          // 搜索配置与校验
pub mod cycle_engine;    // 对索引、循环枚举、排名
pub mod decimal_math;    // 精确十进制运算（ROUND_DOWN）
pub mod kernels;         // CPMM / CLMM / DLMM 内核
pub mod pool_normalizer; // 异构记录 → 规范化池子
pub mod pool_state;      // 规范化池子记录
pub mod reserve_enricher; // 储备富集（oracle / 缓存 / quoter）
pub mod run_stats;       // 各错误类别计数
pub mod source_interface; // PoolSource / ReserveOracle / SwapQuoter
pub mod swap_layer;      // process_swap 与 analytical_cost
pub mod units;           // 原子/人类单位换算

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::info;

pub use config::{ConfigError, SearchConfig};
pub use cycle_engine::{CycleEngine, CycleResult, PairIndex, SearchReport};
pub use pool_state::{CanonicalPool, PoolKind, ReserveSource, USDC_MINT, WSOL_MINT};
pub use run_stats::RunStats;
pub use source_interface::{PoolSource, ReserveOracle, SwapQuoter};
pub use swap_layer::{analytical_cost, process_swap, CostBreakdown, SwapContext, SwapLegResult};

/// 完整流水线：加载 → 归一化 → 富集 → 搜索
///
/// 富集阶段异步（oracle 批量读取），搜索阶段是纯 CPU 计算，
/// 在调用方线程上同步完成；需要隔离时套一层 `spawn_blocking`。
pub async fn run_search(
    source: &dyn PoolSource,
    oracle: Option<Arc<dyn ReserveOracle>>,
    quoter: Option<&dyn SwapQuoter>,
    config: SearchConfig,
    cancel: &AtomicBool,
) -> Result<SearchReport, ConfigError> {
    let raws = source.load();
    info!(records = raws.len(), "📥 raw pool records loaded");

    let mut stats = RunStats::default();
    let pools = pool_normalizer::normalize_batch(&raws, &mut stats);

    let enriched = reserve_enricher::enrich_pools(pools, oracle, quoter, &config, &mut stats).await;

    let engine = CycleEngine::new(enriched, config)?;
    let mut report = engine.search(quoter, cancel);
    report.stats.merge(&stats);
    info!(summary = %report.stats, "run complete");
    Ok(report)
}
