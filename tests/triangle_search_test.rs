/*!
 * 三角搜索端到端测试
 *
 * 覆盖：盈利三角（S4）、中位数离群过滤（S6）、确定性排序、
 * 取消令牌、以及 加载 → 归一化 → 富集 → 搜索 全流水线。
 */

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use solana_arb_sim::decimal_math::dec;
use solana_arb_sim::pool_state::{CanonicalPool, PoolKind, ReserveSource};
use solana_arb_sim::source_interface::{StaticPoolSource, StaticReserveOracle};
use solana_arb_sim::units::Atomic;
use solana_arb_sim::{
    run_search, CycleEngine, SearchConfig, USDC_MINT, WSOL_MINT,
};
use solana_sdk::pubkey::Pubkey;

const ETH: &str = "7vfCXTUXx5WJV5JADk17DUJ4ksgau7utNKj4b963voxs";
const RAY: &str = "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R";

fn cpmm(
    id: &str,
    mint_x: Pubkey,
    mint_y: Pubkey,
    dec_x: u8,
    dec_y: u8,
    x_reserve: Atomic,
    y_reserve: Atomic,
) -> CanonicalPool {
    CanonicalPool {
        pool_id: id.to_string(),
        dex: "raydium".to_string(),
        kind: PoolKind::Cpmm,
        mint_x,
        mint_y,
        decimals_x: dec_x,
        decimals_y: dec_y,
        symbol_x: "X".to_string(),
        symbol_y: "Y".to_string(),
        fee_fraction: dec("0.0025"),
        x_reserve: Some(x_reserve),
        y_reserve: Some(y_reserve),
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
        reserve_source: ReserveSource::Cache,
        reserve_timestamp: None,
    }
}

/// S4 场景的三个池子：SOL→USDC→ETH→SOL，约 2% 毛价差
fn profitable_triangle() -> Vec<CanonicalPool> {
    let eth = Pubkey::from_str(ETH).unwrap();
    vec![
        // SOL/USDC: 1000 / 50_000 → 50 USDC per SOL
        cpmm("p1-sol-usdc", WSOL_MINT, USDC_MINT, 9, 6, 1_000_000_000_000, 50_000_000_000),
        // USDC/ETH: 100_000 / 40 → 2500 USDC per ETH
        cpmm("p2-usdc-eth", USDC_MINT, eth, 6, 8, 100_000_000_000, 4_000_000_000),
        // ETH/SOL: 100 / 5100 → 51 SOL per ETH
        cpmm("p3-eth-sol", eth, WSOL_MINT, 8, 9, 10_000_000_000, 5_100_000_000_000),
    ]
}

#[test]
fn test_profitable_triangle_passes() {
    let eth = Pubkey::from_str(ETH).unwrap();
    // 枢轴设为 ETH：循环 A→B→C→A = SOL→USDC→ETH→SOL
    let config = SearchConfig {
        pivot_token: eth,
        ..SearchConfig::default()
    };
    let engine = CycleEngine::new(profitable_triangle(), config).unwrap();
    let report = engine.search(None, &AtomicBool::new(false));

    assert_eq!(report.cycles.len(), 1, "exactly one triangle expected");
    let cycle = &report.cycles[0];
    println!(
        "raw = {} %, net = {} %",
        cycle.raw_profit_pct, cycle.net_after_costs_pct
    );

    // 1 SOL 本金下毛利在 1% 和 2% 之间
    assert!(cycle.raw_profit_pct > dec("1.0"), "raw = {}", cycle.raw_profit_pct);
    assert!(cycle.raw_profit_pct < dec("2.0"), "raw = {}", cycle.raw_profit_pct);
    // 扣分析成本后仍过 0.1% 阈值
    assert!(cycle.passes);
    assert!(cycle.net_after_costs_pct >= dec("0.1"));

    // 腿序与金额传播
    assert_eq!(cycle.legs.len(), 3);
    assert_eq!(cycle.legs[0].pool_id, "p1-sol-usdc");
    assert_eq!(cycle.legs[1].pool_id, "p2-usdc-eth");
    assert_eq!(cycle.legs[2].pool_id, "p3-eth-sol");
    assert_eq!(cycle.legs[0].dy_atomic, cycle.legs[1].dx_atomic);
    assert_eq!(cycle.legs[1].dy_atomic, cycle.legs[2].dx_atomic);
    assert_eq!(cycle.output_atomic, cycle.legs[2].dy_atomic);
    assert!(cycle.output_atomic > cycle.input_atomic);
}

#[test]
fn test_bigger_notional_worse_roi() {
    // 加大本金：滑点吃掉价差，净收益必须下降（本金 10 SOL 时转亏）
    let eth = Pubkey::from_str(ETH).unwrap();
    let small = SearchConfig {
        pivot_token: eth,
        ..SearchConfig::default()
    };
    let big = SearchConfig {
        pivot_token: eth,
        input_atomic: 10_000_000_000,
        ..SearchConfig::default()
    };

    let r1 = CycleEngine::new(profitable_triangle(), small)
        .unwrap()
        .search(None, &AtomicBool::new(false));
    let r2 = CycleEngine::new(profitable_triangle(), big)
        .unwrap()
        .search(None, &AtomicBool::new(false));

    assert_eq!(r1.cycles.len(), 1);
    assert_eq!(r2.cycles.len(), 1);
    assert!(r2.cycles[0].raw_profit_pct < r1.cycles[0].raw_profit_pct);
    assert!(!r2.cycles[0].passes, "10 SOL 本金下 1% 池子冲击应当转亏");
}

#[test]
fn test_median_outlier_pool_never_traded() {
    // 10 个正常 SOL/USDC（150 附近）+ 1 个 vault 错位池（3000）
    // 外加 SOL/RAY 与 RAY/USDC 边，构成可枚举的三角
    let ray = Pubkey::from_str(RAY).unwrap();
    let mut pools = Vec::new();
    for i in 0..10u64 {
        pools.push(cpmm(
            &format!("anchor{:02}", i),
            WSOL_MINT,
            USDC_MINT,
            9,
            6,
            1_000_000_000_000,
            150_000_000_000 + i * 50_000_000,
        ));
    }
    // id 以 "a" 开头排序靠前：若未被过滤一定会进前 K 条边
    pools.push(cpmm(
        "a-mislabelled",
        WSOL_MINT,
        USDC_MINT,
        9,
        6,
        1_000_000_000_000,
        3_000_000_000_000,
    ));
    pools.push(cpmm("sol-ray", WSOL_MINT, ray, 9, 6, 1_000_000_000_000, 2_000_000_000_000));
    pools.push(cpmm("ray-usdc", ray, USDC_MINT, 6, 6, 2_000_000_000_000, 150_000_000_000));

    let engine = CycleEngine::new(pools, SearchConfig::default()).unwrap();
    let report = engine.search(None, &AtomicBool::new(false));

    assert_eq!(report.stats.outliers_filtered, 1);
    assert!(!report.cycles.is_empty());
    for cycle in &report.cycles {
        for leg in &cycle.legs {
            assert_ne!(leg.pool_id, "a-mislabelled", "outlier pool must not be traded");
        }
    }
}

#[test]
fn test_ranking_deterministic() {
    let ray = Pubkey::from_str(RAY).unwrap();
    let eth = Pubkey::from_str(ETH).unwrap();
    let mut pools = profitable_triangle();
    // 第二条 B 路径（RAY），制造多循环排序场景
    pools.push(cpmm("q1-sol-ray", WSOL_MINT, ray, 9, 6, 1_000_000_000_000, 2_000_000_000_000));
    pools.push(cpmm("q2-ray-eth", ray, eth, 6, 8, 2_000_000_000_000, 2_000_000_000));
    // 平行的第二个锚定池
    pools.push(cpmm("p0-sol-usdc", WSOL_MINT, USDC_MINT, 9, 6, 2_000_000_000_000, 100_000_000_000));

    let config = SearchConfig {
        pivot_token: eth,
        threshold_pct: dec("-100"),
        max_loss_pct: dec("99"),
        ..SearchConfig::default()
    };

    let run = |pools: Vec<CanonicalPool>| {
        let engine = CycleEngine::new(pools, config.clone()).unwrap();
        engine.search(None, &AtomicBool::new(false))
    };
    let r1 = run(pools.clone());
    let r2 = run(pools.clone());

    assert!(!r1.cycles.is_empty());
    assert_eq!(r1.cycles.len(), r2.cycles.len());
    for (a, b) in r1.cycles.iter().zip(r2.cycles.iter()) {
        assert_eq!(a.route_key(), b.route_key());
        assert_eq!(a.net_after_costs_pct, b.net_after_costs_pct);
    }
    // net 降序
    for w in r1.cycles.windows(2) {
        assert!(w[0].net_after_costs_pct >= w[1].net_after_costs_pct);
    }
}

#[test]
fn test_max_routes_truncation() {
    let eth = Pubkey::from_str(ETH).unwrap();
    let config = SearchConfig {
        pivot_token: eth,
        threshold_pct: dec("-100"),
        max_loss_pct: dec("99"),
        max_routes: 1,
        ..SearchConfig::default()
    };
    let mut pools = profitable_triangle();
    pools.push(cpmm("p0-sol-usdc", WSOL_MINT, USDC_MINT, 9, 6, 2_000_000_000_000, 100_000_000_000));
    let engine = CycleEngine::new(pools, config).unwrap();
    let report = engine.search(None, &AtomicBool::new(false));
    assert_eq!(report.cycles.len(), 1);
    assert!(report.stats.triples_evaluated > 1);
}

#[test]
fn test_cancellation_returns_partial() {
    let eth = Pubkey::from_str(ETH).unwrap();
    let config = SearchConfig {
        pivot_token: eth,
        ..SearchConfig::default()
    };
    let engine = CycleEngine::new(profitable_triangle(), config).unwrap();
    let cancel = AtomicBool::new(true);
    cancel.store(true, Ordering::Relaxed);
    let report = engine.search(None, &cancel);
    // 开始前已取消：空结果但正常返回
    assert!(report.cycles.is_empty());
}

#[test]
fn test_safety_bounds_discard() {
    let eth = Pubkey::from_str(ETH).unwrap();
    // max_profit_pct 压到 1%：S4 循环（~1.07%）被安全边界丢弃
    let config = SearchConfig {
        pivot_token: eth,
        max_profit_pct: dec("1"),
        threshold_pct: dec("0.1"),
        ..SearchConfig::default()
    };
    let engine = CycleEngine::new(profitable_triangle(), config).unwrap();
    let report = engine.search(None, &AtomicBool::new(false));
    assert!(report.cycles.is_empty());
    assert_eq!(report.stats.bounds_discarded, 1);
}

#[tokio::test]
async fn test_full_pipeline_with_vault_oracle() {
    // 原始 JSON 记录 → 归一化 → oracle 富集 → 搜索
    let _ = tracing_subscriber::fmt()
        .with_env_filter("solana_arb_sim=debug")
        .try_init();
    let eth = ETH;
    let vault_sol = Pubkey::new_unique();
    let vault_usdc = Pubkey::new_unique();
    let p1 = Pubkey::new_unique().to_string();
    let p2 = Pubkey::new_unique().to_string();
    let p3 = Pubkey::new_unique().to_string();

    let records = vec![
        // 锚定池只有 vault 地址，储备靠 oracle
        json!({
            "pool_id": p1, "dex": "raydium", "type": "amm",
            "mint_x": WSOL_MINT.to_string(), "mint_y": USDC_MINT.to_string(),
            "vault_x": vault_sol.to_string(), "vault_y": vault_usdc.to_string(),
            "fee_rate": 0.0025,
        }),
        json!({
            "pool_id": p2, "dex": "raydium", "type": "amm",
            "mint_x": USDC_MINT.to_string(), "mint_y": eth,
            "reserve_x": "100000000000", "reserve_y": "4000000000",
            "decimals_y": 8, "fee_rate": 0.0025,
        }),
        json!({
            "pool_id": p3, "dex": "raydium", "type": "amm",
            "mint_x": eth, "mint_y": WSOL_MINT.to_string(),
            "reserve_x": "10000000000", "reserve_y": "5100000000000",
            "decimals_x": 8, "fee_rate": 0.0025,
        }),
    ];

    let mut oracle = StaticReserveOracle::default();
    oracle.insert(vault_sol, 1_000_000_000_000);
    oracle.insert(vault_usdc, 50_000_000_000);

    let config = SearchConfig {
        pivot_token: Pubkey::from_str(eth).unwrap(),
        ..SearchConfig::default()
    };

    let source = StaticPoolSource::new(records);
    let report = run_search(
        &source,
        Some(Arc::new(oracle)),
        None,
        config,
        &AtomicBool::new(false),
    )
    .await
    .unwrap();

    assert_eq!(report.stats.pools_normalized, 3);
    assert_eq!(report.stats.pools_enriched, 3);
    assert_eq!(report.cycles.len(), 1);
    let cycle = &report.cycles[0];
    assert!(cycle.passes, "net = {}", cycle.net_after_costs_pct);
    // 第一腿的储备来自 oracle
    assert_eq!(
        cycle.legs[0].source,
        solana_arb_sim::swap_layer::LegSource::Oracle
    );
}
