/*!
 * 储备富集器 (Reserve Enricher)
 *
 * 把规范化池子补齐成可计算池子。来源顺序，先到先得：
 * 1. 实时 oracle（两侧 vault 地址齐备时批量读取）
 * 2. 原始记录里的缓存数量（归一化已验证为整数）
 * 3. 外部 quoter 的池子状态（主要是 CLMM/Whirlpool）
 *
 * 富集从不改写输入记录：消费旧记录、产出带 `reserve_source` 与
 * 时间戳的新记录。CPMM/DLMM 拿不到储备的池子不进数学就绪集。
 */

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::pool_state::{CanonicalPool, PoolKind, ReserveSource};
use crate::run_stats::RunStats;
use crate::source_interface::{ReserveOracle, SwapQuoter};
use crate::units::Atomic;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichError {
    #[error("oracle read timed out")]
    OracleTimeout,

    #[error("vault balance not decodable: {0}")]
    OracleDecodeFailure(String),

    #[error("no reserve source available for pool {0}")]
    NoReserveSource(String),
}

/// 批量富集
///
/// oracle 读取按 `oracle_batch_size` 分批，至多 `oracle_concurrency`
/// 个批次并发在途；两个接口都要求并发安全。
pub async fn enrich_pools(
    pools: Vec<CanonicalPool>,
    oracle: Option<Arc<dyn ReserveOracle>>,
    quoter: Option<&dyn SwapQuoter>,
    config: &SearchConfig,
    stats: &mut RunStats,
) -> Vec<CanonicalPool> {
    let balances: DashMap<Pubkey, Option<Atomic>> = DashMap::new();

    if let Some(oracle) = oracle {
        let mut wanted: HashSet<Pubkey> = HashSet::new();
        for pool in &pools {
            if let (Some(vx), Some(vy)) = (pool.vault_x_addr, pool.vault_y_addr) {
                wanted.insert(vx);
                wanted.insert(vy);
            }
        }
        let mut addresses: Vec<Pubkey> = wanted.into_iter().collect();
        addresses.sort();

        if !addresses.is_empty() {
            let batches: Vec<Vec<Pubkey>> = addresses
                .chunks(config.oracle_batch_size)
                .map(|c| c.to_vec())
                .collect();
            let batch_count = batches.len();

            stream::iter(batches)
                .map(|batch| {
                    let oracle = Arc::clone(&oracle);
                    async move { oracle.fetch_vault_balances(&batch).await }
                })
                .buffer_unordered(config.oracle_concurrency)
                .for_each(|result| {
                    for (addr, amount) in result {
                        balances.insert(addr, amount);
                    }
                    futures_util::future::ready(())
                })
                .await;

            info!(
                vaults = balances.len(),
                batches = batch_count,
                "🔎 vault balances fetched"
            );
        }
    }

    let mut enriched = Vec::with_capacity(pools.len());
    for pool in pools {
        let pool = enrich_one(pool, &balances, quoter, stats);
        enriched.push(pool);
    }
    enriched
}

fn enrich_one(
    mut pool: CanonicalPool,
    balances: &DashMap<Pubkey, Option<Atomic>>,
    quoter: Option<&dyn SwapQuoter>,
    stats: &mut RunStats,
) -> CanonicalPool {
    // 1. 实时 vault 余额
    if let (Some(vx), Some(vy)) = (pool.vault_x_addr, pool.vault_y_addr) {
        let bx = balances.get(&vx).map(|v| *v);
        let by = balances.get(&vy).map(|v| *v);
        match (bx, by) {
            (Some(Some(x)), Some(Some(y))) if x > 0 && y > 0 => {
                pool.x_reserve = Some(x);
                pool.y_reserve = Some(y);
                pool.reserve_source = ReserveSource::Vault;
                pool.reserve_timestamp = Some(Utc::now());
                stats.pools_enriched += 1;
                return pool;
            }
            (Some(None), _) | (_, Some(None)) => {
                stats.oracle_decode_failures += 1;
                let err = EnrichError::OracleDecodeFailure(pool.pool_id.clone());
                debug!(pool_id = %pool.pool_id, error = %err, "trying next reserve source");
            }
            _ => {}
        }
    }

    // 2. 缓存数量 / CLMM 缓存状态
    if pool.has_both_reserves() || pool.has_clmm_state() {
        pool.reserve_source = ReserveSource::Cache;
        pool.reserve_timestamp = Some(Utc::now());
        stats.pools_enriched += 1;
        return pool;
    }

    // 3. 外部 quoter 状态
    if let Some(quoter) = quoter {
        if let Some(delta) = quoter.fetch_pool_state(&pool.pool_id) {
            pool.x_reserve = delta.x_reserve.or(pool.x_reserve);
            pool.y_reserve = delta.y_reserve.or(pool.y_reserve);
            pool.sqrt_price_x64 = delta.sqrt_price_x64.or(pool.sqrt_price_x64);
            pool.liquidity = delta.liquidity.or(pool.liquidity);
            pool.tick_current = delta.tick_current.or(pool.tick_current);
            if pool.has_both_reserves() || pool.has_clmm_state() {
                pool.reserve_source = ReserveSource::Quoter;
                pool.reserve_timestamp = Some(Utc::now());
                stats.pools_enriched += 1;
                return pool;
            }
        }
    }

    pool.reserve_source = ReserveSource::None;
    if matches!(pool.kind, PoolKind::Cpmm | PoolKind::Dlmm) {
        stats.no_reserve_source += 1;
        let err = EnrichError::NoReserveSource(pool.pool_id.clone());
        debug!(kind = pool.kind.as_str(), error = %err, "⚠️ pool excluded from search");
    }
    pool
}
