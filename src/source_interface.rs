/*!
 * 外部数据接口 (Injected Data Interfaces)
 *
 * 引擎不做任何链上 I/O。池子描述、实时 vault 余额、CLMM/DLMM 精确报价
 * 全部通过这三个接口注入：
 * - `PoolSource`     → 原始池子记录（自由格式属性包）
 * - `ReserveOracle`  → 批量 vault 余额读取（异步、并发安全）
 * - `SwapQuoter`     → CLMM/Whirlpool 跨 tick 报价的外部 SDK
 */

use std::collections::HashMap;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use solana_program::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use spl_token::state::Account as SplTokenAccount;
use tracing::debug;

use crate::units::Atomic;

/// 原始池子记录来源
///
/// 每条记录是一个自由格式 JSON 属性包，归一化器负责探测字段。
pub trait PoolSource: Send + Sync {
    fn load(&self) -> Vec<serde_json::Value>;
}

/// 实时 vault 余额读取
///
/// 实现方负责批量、重试和超时；超时的地址返回 `None`，
/// 富集器将对应池子标记为无储备来源。
#[async_trait]
pub trait ReserveOracle: Send + Sync {
    /// 返回每个地址的余额；无法解码的地址映射到 `None`
    async fn fetch_vault_balances(
        &self,
        addresses: &[Pubkey],
    ) -> HashMap<Pubkey, Option<Atomic>>;
}

/// 外部 quoter 返回的单腿报价
#[derive(Debug, Clone)]
pub struct QuoterQuote {
    pub dy_atomic: Atomic,
    pub out_decimals: u8,
    pub fee_paid_human: Option<BigDecimal>,
    pub mid_price: Option<BigDecimal>,
    pub exec_price: Option<BigDecimal>,
    pub price_impact_pct: Option<BigDecimal>,
}

/// quoter 提供的池子状态增量（主要服务 CLMM/Whirlpool 富集）
#[derive(Debug, Clone, Default)]
pub struct PoolStateDelta {
    pub x_reserve: Option<Atomic>,
    pub y_reserve: Option<Atomic>,
    pub sqrt_price_x64: Option<u128>,
    pub liquidity: Option<u128>,
    pub tick_current: Option<i32>,
}

/// CLMM/DLMM 外部报价接口
///
/// 搜索阶段是 CPU 绑定的同步计算（在 rayon worker 上运行），
/// 所以这里是同步 trait；异步实现方在内部桥接自己的 runtime。
pub trait SwapQuoter: Send + Sync {
    /// 单腿精确报价；无法报价时返回 `None`，该三元组被丢弃
    fn quote(
        &self,
        pool_id: &str,
        in_mint: &Pubkey,
        out_mint: &Pubkey,
        dx_atomic: Atomic,
    ) -> Option<QuoterQuote>;

    /// 池子状态（富集阶段的第三来源）
    fn fetch_pool_state(&self, _pool_id: &str) -> Option<PoolStateDelta> {
        None
    }
}

/// 从 SPL token 账户数据解出余额（oracle 实现方使用）
///
/// 标准 SPL Token 账户 165 字节；Token-2022 扩展账户在 165 字节基础
/// 结构之后追加扩展，只取前 165 字节解包。余额是固定偏移处的
/// 64 位小端整数，`unpack` 负责读取。
pub fn decode_vault_amount(data: &[u8]) -> Option<Atomic> {
    if data.len() < SplTokenAccount::LEN {
        debug!(len = data.len(), "vault account data too short");
        return None;
    }
    let base_data = &data[..SplTokenAccount::LEN];
    match SplTokenAccount::unpack(base_data) {
        Ok(account) => Some(account.amount),
        Err(e) => {
            debug!(error = ?e, "failed to unpack SPL token account");
            None
        }
    }
}

/// 静态内存实现：测试与基准用
pub struct StaticPoolSource {
    records: Vec<serde_json::Value>,
}

impl StaticPoolSource {
    pub fn new(records: Vec<serde_json::Value>) -> Self {
        Self { records }
    }
}

impl PoolSource for StaticPoolSource {
    fn load(&self) -> Vec<serde_json::Value> {
        self.records.clone()
    }
}

/// 静态余额表 oracle：注册过的地址返回余额，其余返回 `None`
#[derive(Default)]
pub struct StaticReserveOracle {
    balances: HashMap<Pubkey, Atomic>,
}

impl StaticReserveOracle {
    pub fn new(balances: HashMap<Pubkey, Atomic>) -> Self {
        Self { balances }
    }

    pub fn insert(&mut self, addr: Pubkey, amount: Atomic) {
        self.balances.insert(addr, amount);
    }
}

#[async_trait]
impl ReserveOracle for StaticReserveOracle {
    async fn fetch_vault_balances(
        &self,
        addresses: &[Pubkey],
    ) -> HashMap<Pubkey, Option<Atomic>> {
        addresses
            .iter()
            .map(|addr| (*addr, self.balances.get(addr).copied()))
            .collect()
    }
}
