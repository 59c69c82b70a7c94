/*!
 * AMM 计算内核 (AMM Kernels)
 *
 * 三个家族的纯数学，全部在人类单位中进行，全部返回同一份
 * 分析四元组：输出量、中间价、成交价、价格冲击。
 *
 * - cpmm: 恒定乘积闭式解
 * - clmm: 单 tick sqrt-price 精确式 + 越界信号
 * - dlmm: 单 bin 与多 bin 行走
 */

pub mod clmm;
pub mod cpmm;
pub mod dlmm;

use bigdecimal::BigDecimal;

/// 内核报价
///
/// - `mid_price`：交易前状态的 out/in
/// - `exec_price`：整笔观察到的 out/in（含费率拖累）
/// - `price_impact_pct`：剥离费率后的滑点百分比
///   （对 `dx_after_fee` 而不是 `dx` 求偏离，费用与滑点不混算）
#[derive(Debug, Clone, PartialEq)]
pub struct KernelQuote {
    pub dy_human: BigDecimal,
    pub fee_paid_human: BigDecimal,
    pub mid_price: BigDecimal,
    pub exec_price: BigDecimal,
    pub price_impact_pct: BigDecimal,
}
