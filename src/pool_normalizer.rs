/*!
 * 池子归一化器 (Pool Normalizer)
 *
 * 各数据源的池子记录是异构属性包：字段名不一、费率单位不一、
 * `reserve_x` 可能是数量也可能是 vault 地址。这里是唯一的转换点，
 * 把自由格式记录转成规范化的 `CanonicalPool`。
 *
 * 核心规则（load-bearing）：
 * - base58 形状的字符串永远不按数量解析。把 32 字节地址误读成
 *   10^30 级储备量会制造 10^20 倍的假利润机会。
 * - `(mint_x, mint_y)` 与缓存储备的顺序对齐：原始记录里的 x 储备
 *   永远属于 `mint_x`。
 */

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tracing::{debug, warn};

use crate::decimal_math::dec;
use crate::pool_state::{CanonicalPool, PoolKind, ReserveSource, USDC_MINT, WSOL_MINT};
use crate::run_stats::RunStats;
use crate::units::Atomic;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("no pool address field found")]
    MissingAddress,

    #[error("pool address is not base58-shaped: {0}")]
    InvalidAddress(String),

    #[error("missing mint: {0}")]
    MissingMint(String),

    #[error("decimals out of range: {0}")]
    DecimalsOutOfRange(u8),

    #[error("ambiguous reserve field {field}: {value}")]
    AmbiguousReserve { field: String, value: String },

    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

/// 池子地址字段，按优先级探测
const ADDRESS_FIELDS: &[&str] = &[
    "pool_id",
    "poolId",
    "pool_address",
    "poolAddress",
    "amm_id",
    "ammId",
    "address",
    "pubkey",
    "id",
];

const DEX_FIELDS: &[&str] = &["dex", "dex_name", "dexName", "protocol", "amm", "source"];

const KIND_FIELDS: &[&str] = &[
    "pool_type",
    "poolType",
    "type",
    "kind",
    "variant",
    "category",
    "market_type",
    "program_name",
];

const MINT_X_FIELDS: &[&str] = &[
    "mint_x", "mintX", "token_x_mint", "tokenXMint", "mint_a", "mintA", "token_a_mint",
];
const MINT_Y_FIELDS: &[&str] = &[
    "mint_y", "mintY", "token_y_mint", "tokenYMint", "mint_b", "mintB", "token_b_mint",
];
const BASE_MINT_FIELDS: &[&str] = &["base_mint", "baseMint", "base"];
const QUOTE_MINT_FIELDS: &[&str] = &["quote_mint", "quoteMint", "quote"];

const DECIMALS_X_FIELDS: &[&str] = &[
    "decimals_x",
    "decimalsX",
    "decimal_x",
    "base_decimals",
    "baseDecimals",
    "token_x_decimals",
    "mint_x_decimals",
];
const DECIMALS_Y_FIELDS: &[&str] = &[
    "decimals_y",
    "decimalsY",
    "decimal_y",
    "quote_decimals",
    "quoteDecimals",
    "token_y_decimals",
    "mint_y_decimals",
];

const SYMBOL_X_FIELDS: &[&str] = &["symbol_x", "symbolX", "base_symbol", "baseSymbol"];
const SYMBOL_Y_FIELDS: &[&str] = &["symbol_y", "symbolY", "quote_symbol", "quoteSymbol"];
const PAIR_FIELDS: &[&str] = &["pair", "name", "market"];

const VAULT_X_FIELDS: &[&str] = &[
    "vault_x", "vaultX", "token_x_vault", "tokenXVault", "vault_a", "vaultA", "base_vault",
    "baseVault",
];
const VAULT_Y_FIELDS: &[&str] = &[
    "vault_y", "vaultY", "token_y_vault", "tokenYVault", "vault_b", "vaultB", "quote_vault",
    "quoteVault",
];

/// 明确是数量的储备字段
const AMOUNT_X_FIELDS: &[&str] = &["reserve_x_amount", "reserveXAmount", "amount_x", "x_amount"];
const AMOUNT_Y_FIELDS: &[&str] = &["reserve_y_amount", "reserveYAmount", "amount_y", "y_amount"];

/// 歧义储备字段：有的数据源放数量，有的放 vault 地址
const RESERVE_X_FIELDS: &[&str] = &[
    "reserve_x", "reserveX", "reserve_a", "reserveA", "base_reserve", "baseReserve",
    "token_x_amount",
];
const RESERVE_Y_FIELDS: &[&str] = &[
    "reserve_y", "reserveY", "reserve_b", "reserveB", "quote_reserve", "quoteReserve",
    "token_y_amount",
];

const FEE_FIELDS: &[&str] = &[
    "fee_fraction",
    "feeFraction",
    "fee_rate",
    "feeRate",
    "trade_fee_rate",
    "tradeFeeRate",
    "fee",
    "fee_pct",
    "fee_percent",
    "feePercent",
];

const SQRT_PRICE_FIELDS: &[&str] = &["sqrt_price_x64", "sqrtPriceX64", "sqrt_price", "sqrtPrice"];
const LIQUIDITY_FIELDS: &[&str] = &["liquidity", "liquidityU128", "current_liquidity"];
const TICK_CURRENT_FIELDS: &[&str] = &[
    "tick_current",
    "tickCurrent",
    "tick_current_index",
    "tickCurrentIndex",
    "current_tick",
];
const TICK_SPACING_FIELDS: &[&str] = &["tick_spacing", "tickSpacing"];

const ACTIVE_BIN_FIELDS: &[&str] = &["active_bin_id", "activeBinId", "active_id", "activeId"];
const BIN_STEP_FIELDS: &[&str] = &["bin_step", "binStep", "bin_step_bps", "binStepBps"];

const TVL_FIELDS: &[&str] = &["tvl", "tvl_usd", "tvlUsd", "liquidity_usd", "liquidityUsd"];
const VOLUME_FIELDS: &[&str] = &[
    "volume_24h",
    "volume24h",
    "volume_24h_usd",
    "volumeUsd24h",
    "day_volume",
];

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// base58 形状判定：长度 32–44 且全部落在 base58 字母表内
///
/// 注意这是形状判定而不是解码校验：任何满足形状的字符串都拒绝
/// 按数量解析，宁可把它当 vault 地址处理。
pub fn is_base58_shaped(s: &str) -> bool {
    (32..=44).contains(&s.len()) && s.chars().all(|c| BASE58_ALPHABET.contains(c))
}

fn get_value<'a>(raw: &'a Value, keys: &'static [&'static str]) -> Option<(&'static str, &'a Value)> {
    for &key in keys {
        if let Some(v) = raw.get(key) {
            if !v.is_null() {
                return Some((key, v));
            }
        }
    }
    None
}

fn get_str<'a>(raw: &'a Value, keys: &'static [&'static str]) -> Option<&'a str> {
    get_value(raw, keys).and_then(|(_, v)| v.as_str())
}

fn value_to_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    }
}

fn value_to_u128(v: &Value) -> Option<u128> {
    match v {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.parse::<u128>().ok(),
        _ => None,
    }
}

fn value_to_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}

/// JSON 数字经由十进制字面量转 BigDecimal，避免二进制浮点中转
fn value_to_decimal(v: &Value) -> Option<BigDecimal> {
    match v {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        Value::String(s) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn parse_mint(raw: &Value, keys: &'static [&'static str]) -> Option<Pubkey> {
    get_str(raw, keys).and_then(|s| Pubkey::from_str(s).ok())
}

/// 歧义储备字段的分类结果
enum ReserveField {
    Amount(Atomic),
    Vault(Pubkey),
}

/// 分类规则：base58 形状 → vault；非负整数 → 数量；其余 → 歧义错误
fn classify_reserve(field: &str, v: &Value) -> Result<Option<ReserveField>, NormalizeError> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => {
            if is_base58_shaped(s) {
                match Pubkey::from_str(s) {
                    Ok(pk) => Ok(Some(ReserveField::Vault(pk))),
                    Err(_) => Err(NormalizeError::AmbiguousReserve {
                        field: field.to_string(),
                        value: s.clone(),
                    }),
                }
            } else if let Ok(amount) = s.parse::<u64>() {
                Ok(Some(ReserveField::Amount(amount)))
            } else {
                Err(NormalizeError::AmbiguousReserve {
                    field: field.to_string(),
                    value: s.clone(),
                })
            }
        }
        Value::Number(n) => match n.as_u64() {
            Some(amount) => Ok(Some(ReserveField::Amount(amount))),
            None => Err(NormalizeError::AmbiguousReserve {
                field: field.to_string(),
                value: n.to_string(),
            }),
        },
        other => Err(NormalizeError::AmbiguousReserve {
            field: field.to_string(),
            value: other.to_string(),
        }),
    }
}

/// kind 检测：子串规则按序评估，然后按 dex 兜底
fn detect_kind(raw: &Value, dex: &str) -> PoolKind {
    let mut haystack = String::new();
    for key in KIND_FIELDS {
        if let Some(s) = raw.get(*key).and_then(|v| v.as_str()) {
            haystack.push_str(&s.to_lowercase());
            haystack.push(' ');
        }
    }

    if haystack.contains("whirlpool") {
        return PoolKind::Whirlpool;
    }
    if haystack.contains("dlmm") || haystack.contains("bin") {
        return PoolKind::Dlmm;
    }
    if haystack.contains("clmm") || haystack.contains("concentrated") {
        return PoolKind::Clmm;
    }
    if haystack.contains("cpmm") || haystack.contains("amm") || haystack.contains("constant") {
        return PoolKind::Cpmm;
    }

    match dex {
        "orca" => PoolKind::Whirlpool,
        "meteora" => PoolKind::Dlmm,
        "raydium" => PoolKind::Cpmm,
        _ => PoolKind::Cpmm,
    }
}

/// 费率归一化到 `[0, 1)` 分数
///
/// - `(0, 0.1)`：已经是分数
/// - `[0.1, 100]`：百分比，除以 100
/// - 只有 Meteora `base_fee_percentage` 时：基点，除以 10_000
/// - 其余缺省 `0.003`
///
/// 显式的 0 按零费率保留（Lifinity 这类做市商池子确实是 0）。
fn normalize_fee(raw: &Value) -> BigDecimal {
    let zero = BigDecimal::from(0);
    let hundred = BigDecimal::from(100);
    let tenth = dec("0.1");

    if let Some((field, v)) = get_value(raw, FEE_FIELDS) {
        if let Some(value) = value_to_decimal(v) {
            if value == zero {
                return zero;
            }
            if value > zero && value < tenth {
                return value;
            }
            if value >= tenth && value <= hundred {
                return value / hundred;
            }
            debug!(field, %value, "fee outside recognized ranges, using default");
        }
    } else if let Some(v) = raw.get("base_fee_percentage") {
        if let Some(bps) = value_to_decimal(v) {
            if bps >= zero {
                return bps / BigDecimal::from(10_000);
            }
        }
    }

    dec("0.003")
}

/// 单条记录归一化
pub fn normalize_pool(raw: &Value) -> Result<CanonicalPool, NormalizeError> {
    // 1. 池子地址
    let pool_id = match get_str(raw, ADDRESS_FIELDS) {
        Some(s) => {
            if is_base58_shaped(s) {
                s.to_string()
            } else {
                return Err(NormalizeError::InvalidAddress(s.to_string()));
            }
        }
        None => return Err(NormalizeError::MissingAddress),
    };

    let dex = get_str(raw, DEX_FIELDS)
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());

    // 2. kind
    let kind = detect_kind(raw, &dex);

    // 3. mint 对与储备顺序对齐
    let explicit_x = parse_mint(raw, MINT_X_FIELDS);
    let explicit_y = parse_mint(raw, MINT_Y_FIELDS);
    let base = parse_mint(raw, BASE_MINT_FIELDS);
    let quote = parse_mint(raw, QUOTE_MINT_FIELDS);

    let (mint_x, mint_y) = match (explicit_x, explicit_y) {
        (Some(x), Some(y)) => {
            // base/quote 与 mint_x/mint_y 冲突时，x_* 缓存字段跟随
            // base/quote 顺序，重新标注使 mint_x 对应 x 储备
            match (base, quote) {
                (Some(b), Some(q)) if b == y && q == x => (b, q),
                _ => (x, y),
            }
        }
        _ => match (base, quote) {
            (Some(b), Some(q)) => (b, q),
            (None, _) => return Err(NormalizeError::MissingMint("mint_x/base_mint".into())),
            (_, None) => return Err(NormalizeError::MissingMint("mint_y/quote_mint".into())),
        },
    };

    if mint_x == mint_y {
        return Err(NormalizeError::InvariantViolated(
            "mint_x equals mint_y".into(),
        ));
    }

    // 4. decimals：WSOL/USDC 覆写优先，其次原始字段，最后 9/6 缺省
    let raw_decimals_x = get_value(raw, DECIMALS_X_FIELDS).and_then(|(_, v)| value_to_u64(v));
    let raw_decimals_y = get_value(raw, DECIMALS_Y_FIELDS).and_then(|(_, v)| value_to_u64(v));
    for d in [raw_decimals_x, raw_decimals_y].into_iter().flatten() {
        if d > 18 {
            return Err(NormalizeError::DecimalsOutOfRange(d.min(255) as u8));
        }
    }
    let decimals_x = known_mint_decimals(&mint_x)
        .or(raw_decimals_x.map(|d| d as u8))
        .unwrap_or(9);
    let decimals_y = known_mint_decimals(&mint_y)
        .or(raw_decimals_y.map(|d| d as u8))
        .unwrap_or(6);

    // 展示符号：显式字段，或 "SOL/USDC" 形式的 pair 字段，最后 mint 前缀
    let (symbol_x, symbol_y) = extract_symbols(raw, &mint_x, &mint_y);

    // 5. 储备 vs vault 消歧
    let mut x_reserve: Option<Atomic> = None;
    let mut y_reserve: Option<Atomic> = None;
    let mut vault_x_addr = parse_mint(raw, VAULT_X_FIELDS);
    let mut vault_y_addr = parse_mint(raw, VAULT_Y_FIELDS);

    if let Some((field, v)) = get_value(raw, AMOUNT_X_FIELDS) {
        match classify_reserve(field, v)? {
            Some(ReserveField::Amount(a)) => x_reserve = Some(a),
            Some(ReserveField::Vault(pk)) => vault_x_addr = vault_x_addr.or(Some(pk)),
            None => {}
        }
    }
    if let Some((field, v)) = get_value(raw, AMOUNT_Y_FIELDS) {
        match classify_reserve(field, v)? {
            Some(ReserveField::Amount(a)) => y_reserve = Some(a),
            Some(ReserveField::Vault(pk)) => vault_y_addr = vault_y_addr.or(Some(pk)),
            None => {}
        }
    }
    if let Some((field, v)) = get_value(raw, RESERVE_X_FIELDS) {
        match classify_reserve(field, v)? {
            Some(ReserveField::Amount(a)) => x_reserve = x_reserve.or(Some(a)),
            Some(ReserveField::Vault(pk)) => vault_x_addr = vault_x_addr.or(Some(pk)),
            None => {}
        }
    }
    if let Some((field, v)) = get_value(raw, RESERVE_Y_FIELDS) {
        match classify_reserve(field, v)? {
            Some(ReserveField::Amount(a)) => y_reserve = y_reserve.or(Some(a)),
            Some(ReserveField::Vault(pk)) => vault_y_addr = vault_y_addr.or(Some(pk)),
            None => {}
        }
    }

    // 6. 费率
    let fee_fraction = normalize_fee(raw);
    let one = BigDecimal::from(1);
    if fee_fraction < BigDecimal::from(0) || fee_fraction >= one {
        return Err(NormalizeError::InvariantViolated(format!(
            "fee_fraction {} outside [0, 1)",
            fee_fraction
        )));
    }

    // CPMM/DLMM：两侧储备一旦齐备必须严格为正
    if matches!(kind, PoolKind::Cpmm | PoolKind::Dlmm) {
        if let (Some(x), Some(y)) = (x_reserve, y_reserve) {
            if x == 0 || y == 0 {
                return Err(NormalizeError::InvariantViolated(format!(
                    "zero reserve in {} pool (x={}, y={})",
                    kind.as_str(),
                    x,
                    y
                )));
            }
        }
    }

    let pool = CanonicalPool {
        pool_id,
        dex,
        kind,
        mint_x,
        mint_y,
        decimals_x,
        decimals_y,
        symbol_x,
        symbol_y,
        fee_fraction,
        x_reserve,
        y_reserve,
        sqrt_price_x64: get_value(raw, SQRT_PRICE_FIELDS).and_then(|(_, v)| value_to_u128(v)),
        liquidity: get_value(raw, LIQUIDITY_FIELDS).and_then(|(_, v)| value_to_u128(v)),
        tick_current: get_value(raw, TICK_CURRENT_FIELDS)
            .and_then(|(_, v)| value_to_i64(v))
            .map(|t| t as i32),
        tick_spacing: get_value(raw, TICK_SPACING_FIELDS)
            .and_then(|(_, v)| value_to_u64(v))
            .map(|t| t as u16),
        active_bin_id: get_value(raw, ACTIVE_BIN_FIELDS)
            .and_then(|(_, v)| value_to_i64(v))
            .map(|b| b as i32),
        bin_step_bps: get_value(raw, BIN_STEP_FIELDS)
            .and_then(|(_, v)| value_to_u64(v))
            .map(|b| b as u16),
        vault_x_addr,
        vault_y_addr,
        tvl_usd: get_value(raw, TVL_FIELDS).and_then(|(_, v)| value_to_decimal(v)),
        volume_24h_usd: get_value(raw, VOLUME_FIELDS).and_then(|(_, v)| value_to_decimal(v)),
        reserve_source: ReserveSource::None,
        reserve_timestamp: None,
    };

    Ok(pool)
}

fn known_mint_decimals(mint: &Pubkey) -> Option<u8> {
    if *mint == WSOL_MINT {
        Some(9)
    } else if *mint == USDC_MINT {
        Some(6)
    } else {
        None
    }
}

fn extract_symbols(raw: &Value, mint_x: &Pubkey, mint_y: &Pubkey) -> (String, String) {
    let explicit_x = get_str(raw, SYMBOL_X_FIELDS).map(|s| s.to_string());
    let explicit_y = get_str(raw, SYMBOL_Y_FIELDS).map(|s| s.to_string());
    if let (Some(x), Some(y)) = (&explicit_x, &explicit_y) {
        return (x.clone(), y.clone());
    }

    if let Some(pair) = get_str(raw, PAIR_FIELDS) {
        let parts: Vec<&str> = pair.split(['/', '-']).collect();
        if parts.len() == 2 {
            return (parts[0].trim().to_string(), parts[1].trim().to_string());
        }
    }

    let short = |m: &Pubkey| m.to_string().chars().take(4).collect::<String>();
    (
        explicit_x.unwrap_or_else(|| short(mint_x)),
        explicit_y.unwrap_or_else(|| short(mint_y)),
    )
}

/// 批量归一化：单条失败只记日志和计数，不中断批次
pub fn normalize_batch(raws: &[Value], stats: &mut RunStats) -> Vec<CanonicalPool> {
    let mut pools = Vec::with_capacity(raws.len());
    for (idx, raw) in raws.iter().enumerate() {
        match normalize_pool(raw) {
            Ok(pool) => {
                stats.pools_normalized += 1;
                pools.push(pool);
            }
            Err(e) => {
                stats.record_normalize_error(&e);
                warn!(index = idx, error = %e, "⚠️ pool record rejected at normalization");
            }
        }
    }
    pools
}
