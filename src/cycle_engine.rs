/*!
 * 三角循环引擎 (Triangular Cycle Engine)
 *
 * A → B → C → A 三池循环的枚举、模拟与排名：
 * 1. 建对索引（每个池子贡献两个有序对，建完只读）
 * 2. 锚定对中位数过滤，踢掉储备与 mint 错位的脏池子
 * 3. 候选 B = (S_A ∩ S_C) \ {A, C}，每条边至多取 K 个池子
 * 4. 逐腿原子传播（floor），安全边界截断，分析成本换算回 A 排名
 *
 * 候选 B 上的并行是 embarrassing parallelism，rayon 分片；
 * 单池、单三元组失败只计数继续。输出字节级确定。
 */

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use bigdecimal::BigDecimal;
use itertools::iproduct;
use num_traits::Zero;
use rayon::prelude::*;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, SearchConfig};
use crate::decimal_math::{self, dec_u64};
use crate::pool_state::CanonicalPool;
use crate::run_stats::RunStats;
use crate::source_interface::SwapQuoter;
use crate::swap_layer::{analytical_cost, process_swap, SwapContext, SwapError, SwapLegResult};
use crate::units::Atomic;

/// 有序对 → 池子 id 多重映射；搜索期间只读
pub struct PairIndex {
    edges: HashMap<(Pubkey, Pubkey), Vec<String>>,
    adjacency: HashMap<Pubkey, BTreeSet<Pubkey>>,
    pools: HashMap<String, CanonicalPool>,
}

impl PairIndex {
    pub fn build(pools: &[CanonicalPool]) -> Self {
        let mut edges: HashMap<(Pubkey, Pubkey), Vec<String>> = HashMap::new();
        let mut adjacency: HashMap<Pubkey, BTreeSet<Pubkey>> = HashMap::new();
        let mut by_id = HashMap::new();

        for pool in pools {
            edges
                .entry((pool.mint_x, pool.mint_y))
                .or_default()
                .push(pool.pool_id.clone());
            edges
                .entry((pool.mint_y, pool.mint_x))
                .or_default()
                .push(pool.pool_id.clone());
            adjacency.entry(pool.mint_x).or_default().insert(pool.mint_y);
            adjacency.entry(pool.mint_y).or_default().insert(pool.mint_x);
            by_id.insert(pool.pool_id.clone(), pool.clone());
        }

        // 边内按 pool_id 排序，枚举顺序与机器无关
        for ids in edges.values_mut() {
            ids.sort();
            ids.dedup();
        }

        Self {
            edges,
            adjacency,
            pools: by_id,
        }
    }

    pub fn edge(&self, from: &Pubkey, to: &Pubkey) -> &[String] {
        self.edges
            .get(&(*from, *to))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn neighbors(&self, mint: &Pubkey) -> BTreeSet<Pubkey> {
        self.adjacency.get(mint).cloned().unwrap_or_default()
    }

    pub fn pool(&self, id: &str) -> Option<&CanonicalPool> {
        self.pools.get(id)
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }
}

/// 一条完整循环的模拟结果
#[derive(Debug, Clone)]
pub struct CycleResult {
    /// 按执行顺序的三条腿
    pub legs: Vec<SwapLegResult>,
    pub input_atomic: Atomic,
    pub output_atomic: Atomic,
    pub raw_profit_pct: BigDecimal,
    pub net_after_costs_pct: BigDecimal,
    pub passes: bool,
}

impl CycleResult {
    /// 三个池子 id 拼接，确定性并列裁决键
    pub fn route_key(&self) -> String {
        self.legs
            .iter()
            .map(|l| l.pool_id.as_str())
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// 搜索产出：排名循环 + 统计摘要
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub cycles: Vec<CycleResult>,
    pub stats: RunStats,
}

pub struct CycleEngine {
    index: PairIndex,
    config: SearchConfig,
    construction_stats: RunStats,
}

impl CycleEngine {
    /// 构造即校验：配置非法 fail-fast，池子集做预过滤与索引
    pub fn new(pools: Vec<CanonicalPool>, config: SearchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut stats = RunStats::default();

        // TVL / 24h 成交量预过滤（字段缺失的池子放行）
        let before = pools.len();
        let pools: Vec<CanonicalPool> = pools
            .into_iter()
            .filter(|p| {
                let tvl_ok = p
                    .tvl_usd
                    .as_ref()
                    .map(|t| *t >= config.min_tvl)
                    .unwrap_or(true);
                let vol_ok = p
                    .volume_24h_usd
                    .as_ref()
                    .map(|v| *v >= config.min_volume_24h)
                    .unwrap_or(true);
                tvl_ok && vol_ok
            })
            .collect();
        stats.prefiltered += (before - pools.len()) as u64;

        // 锚定对中位数过滤
        let pools = filter_anchor_outliers(
            pools,
            &config.start_token,
            &config.pivot_token,
            &config.median_outlier_factor,
            &mut stats,
        );

        // CPMM/DLMM 没有储备的不进索引；CLMM 留给搜索期的 quoter 决断
        let pools: Vec<CanonicalPool> = pools
            .into_iter()
            .filter(|p| {
                let ready = p.is_math_ready(true);
                if !ready {
                    debug!(pool_id = %p.pool_id, "pool not math-ready, skipped");
                }
                ready
            })
            .collect();

        stats.pools_indexed = pools.len() as u64;
        let index = PairIndex::build(&pools);

        Ok(Self {
            index,
            config,
            construction_stats: stats,
        })
    }

    pub fn pair_index(&self) -> &PairIndex {
        &self.index
    }

    /// 三角搜索
    ///
    /// `cancel` 在候选 B 之间、三元组之间检查；取消时返回已收集的
    /// 结果（照常排名截断）。
    pub fn search(&self, quoter: Option<&dyn SwapQuoter>, cancel: &AtomicBool) -> SearchReport {
        let mut stats = self.construction_stats.clone();
        let a = self.config.start_token;
        let c = self.config.pivot_token;

        // A↔C 两个方向的池子必须存在
        let ca_edge = self.index.edge(&c, &a);
        if self.index.edge(&a, &c).is_empty() || ca_edge.is_empty() {
            warn!("no anchor pair pools between start and pivot, empty result");
            return SearchReport {
                cycles: Vec::new(),
                stats,
            };
        }
        let k = self.config.max_pools_per_leg;
        let ca_pools: Vec<&str> = ca_edge.iter().take(k).map(|s| s.as_str()).collect();

        let s_a = self.index.neighbors(&a);
        let s_c = self.index.neighbors(&c);
        let candidates: Vec<Pubkey> = s_a
            .intersection(&s_c)
            .filter(|b| **b != a && **b != c)
            .copied()
            .collect();
        stats.candidates_b = candidates.len() as u64;
        info!(
            candidates = candidates.len(),
            pools = self.index.pool_count(),
            "🔍 triangle search started"
        );

        // 候选 B 并行分片；每个 worker 带局部统计，收尾合并
        let per_candidate: Vec<(Vec<CycleResult>, RunStats)> = candidates
            .par_iter()
            .map(|b| {
                let mut local = RunStats::default();
                let mut found = Vec::new();
                if cancel.load(Ordering::Relaxed) {
                    return (found, local);
                }

                let ab_pools: Vec<&str> =
                    self.index.edge(&a, b).iter().take(k).map(|s| s.as_str()).collect();
                let bc_pools: Vec<&str> =
                    self.index.edge(b, &c).iter().take(k).map(|s| s.as_str()).collect();

                for (p_ab, p_bc, p_ca) in iproduct!(&ab_pools, &bc_pools, &ca_pools) {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    local.triples_evaluated += 1;
                    match self.simulate_triple(p_ab, p_bc, p_ca, &a, b, &c, quoter) {
                        Ok(Some(cycle)) => found.push(cycle),
                        Ok(None) => local.bounds_discarded += 1,
                        Err(e) => {
                            local.record_swap_error(&e);
                            debug!(error = %e, "triple discarded");
                        }
                    }
                }
                (found, local)
            })
            .collect();

        let mut cycles = Vec::new();
        for (found, local) in per_candidate {
            cycles.extend(found);
            stats.merge(&local);
        }

        // net 降序，三池 id 拼接升序裁决并列
        cycles.sort_by(|x, y| {
            y.net_after_costs_pct
                .cmp(&x.net_after_costs_pct)
                .then_with(|| x.route_key().cmp(&y.route_key()))
        });
        cycles.truncate(self.config.max_routes);
        stats.cycles_emitted = cycles.len() as u64;

        info!(cycles = cycles.len(), "✅ triangle search finished");
        SearchReport { cycles, stats }
    }

    /// 单个三元组模拟：`Ok(None)` 表示触发安全边界被丢弃
    #[allow(clippy::too_many_arguments)]
    fn simulate_triple(
        &self,
        p_ab: &str,
        p_bc: &str,
        p_ca: &str,
        a: &Pubkey,
        b: &Pubkey,
        c: &Pubkey,
        quoter: Option<&dyn SwapQuoter>,
    ) -> Result<Option<CycleResult>, SwapError> {
        let pool_ab = self
            .index
            .pool(p_ab)
            .ok_or_else(|| SwapError::MissingReserves(p_ab.to_string()))?;
        let pool_bc = self
            .index
            .pool(p_bc)
            .ok_or_else(|| SwapError::MissingReserves(p_bc.to_string()))?;
        let pool_ca = self
            .index
            .pool(p_ca)
            .ok_or_else(|| SwapError::MissingReserves(p_ca.to_string()))?;

        let ctx = SwapContext {
            quoter,
            tick_boundary_threshold: self.config.tick_boundary_threshold.clone(),
        };
        let input = self.config.input_atomic;

        // 逐腿严格顺序：dy_atomic 原样进入下一腿，成本不得再扣
        let leg1 = process_swap(pool_ab, input, a, b, &ctx)?;
        let leg2 = process_swap(pool_bc, leg1.dy_atomic, b, c, &ctx)?;
        let leg3 = process_swap(pool_ca, leg2.dy_atomic, c, a, &ctx)?;

        let output = leg3.dy_atomic;
        let input_dec = dec_u64(input);
        let raw_profit_pct = decimal_math::div(&(dec_u64(output) - &input_dec), &input_dec)?
            * BigDecimal::from(100);

        // 安全边界：脏数据造出的 10^3..10^6 % "机会" 在这里截断
        if raw_profit_pct > self.config.max_profit_pct
            || raw_profit_pct < -self.config.max_loss_pct.clone()
        {
            return Ok(None);
        }

        // 分析成本换算回 A：
        //   腿3 已是 A；腿2 × mid3 (A per C)；腿1 × mid2 × mid3
        let cost1 = analytical_cost(pool_ab, input, a, b, &ctx)?;
        let cost2 = analytical_cost(pool_bc, leg1.dy_atomic, b, c, &ctx)?;
        let cost3 = analytical_cost(pool_ca, leg2.dy_atomic, c, a, &ctx)?;

        let cost_in_a = &cost3.total_cost_out_human
            + &cost2.total_cost_out_human * &leg3.mid_price
            + &cost1.total_cost_out_human * &leg2.mid_price * &leg3.mid_price;

        let cost_pct =
            decimal_math::div(&cost_in_a, &leg1.dx_human)? * BigDecimal::from(100);
        let net_after_costs_pct = &raw_profit_pct - &cost_pct;
        let passes = net_after_costs_pct >= self.config.threshold_pct;

        Ok(Some(CycleResult {
            legs: vec![leg1, leg2, leg3],
            input_atomic: input,
            output_atomic: output,
            raw_profit_pct,
            net_after_costs_pct,
            passes,
        }))
    }
}

/// 锚定对中位数过滤
///
/// 对同时含起始/枢轴两个 mint 的池子算隐含价格（定向 pivot per
/// start），取中位数，踢掉 `[median/F, median×F]` 之外的池子。
/// 储备与 mint 错位的脏池子会在这里显形：隐含价格偏出几个数量级。
fn filter_anchor_outliers(
    pools: Vec<CanonicalPool>,
    start: &Pubkey,
    pivot: &Pubkey,
    factor: &BigDecimal,
    stats: &mut RunStats,
) -> Vec<CanonicalPool> {
    let implied_of = |p: &CanonicalPool| -> Option<BigDecimal> {
        p.implied_price(start, pivot).and_then(|r| r.ok())
    };

    let mut implied: Vec<BigDecimal> = pools.iter().filter_map(implied_of).collect();
    if implied.is_empty() {
        return pools;
    }
    implied.sort();

    let n = implied.len();
    let median = if n % 2 == 1 {
        implied[n / 2].clone()
    } else {
        // 偶数个取中间两数均值（除以 2 精确）
        (&implied[n / 2 - 1] + &implied[n / 2]) / BigDecimal::from(2)
    };
    if median.is_zero() {
        return pools;
    }

    let lower = decimal_math::div(&median, factor).unwrap_or_else(|_| BigDecimal::zero());
    let upper = &median * factor;
    debug!(%median, %lower, %upper, "anchor pair median filter bounds");

    let mut kept = Vec::with_capacity(pools.len());
    for pool in pools {
        match implied_of(&pool) {
            Some(price) if price < lower || price > upper => {
                stats.outliers_filtered += 1;
                warn!(
                    pool_id = %pool.pool_id,
                    %price,
                    "⚠️ anchor pool implied price outside median band, excluded"
                );
            }
            _ => kept.push(pool),
        }
    }
    kept
}
