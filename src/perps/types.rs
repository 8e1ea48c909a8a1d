// 交易意图与方向类型
// Trade intent and side types

use borsh::BorshSerialize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use utoipa::ToSchema;

/// 持仓方向 / Position side
///
/// 链上枚举为 None=0, Long=1, Short=2，因此 Long 编码为 1，Short 编码为 2。
/// The on-chain enum is None=0, Long=1, Short=2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "buy")]
    Long,
    #[serde(alias = "sell")]
    Short,
}

impl Side {
    /// 指令参数和 PDA 种子中使用的字节 / Byte used in instruction params and PDA seeds
    pub const fn wire_byte(self) -> u8 {
        match self {
            Side::Long => 1,
            Side::Short => 2,
        }
    }
}

impl BorshSerialize for Side {
    fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&[self.wire_byte()])
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// 请求类型：开仓（increase）或平仓（decrease）
/// Request kind: open (increase) or close (decrease)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Open,
    Close,
}

impl RequestKind {
    /// position_request PDA 的最后一个种子 / Last seed of the position_request PDA
    pub const fn change_byte(self) -> u8 {
        match self {
            RequestKind::Open => 1,
            RequestKind::Close => 2,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Open => write!(f, "open"),
            RequestKind::Close => write!(f, "close"),
        }
    }
}

/// 用户开仓意图 / User open intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TradeIntent {
    /// 市场符号，例如 SOL / Market symbol, e.g. SOL
    pub market: String,
    pub side: Side,
    /// 抵押品数量（抵押代币最小单位）/ Collateral amount in the collateral token's smallest unit
    pub collateral_amount: u64,
    pub leverage: f64,
    /// 最大滑点（基点）/ Max slippage in basis points
    pub max_slippage_bps: u16,
}

/// 链上持仓的引用：owner + 市场 + 方向唯一确定持仓地址
/// Reference to an on-chain position: owner + market + side determine its address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct PositionRef {
    pub market: String,
    pub side: Side,
}

/// 平仓参数 / Close parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CloseIntent {
    /// None 表示全部平仓 / None closes the entire position
    pub size_usd_delta: Option<u64>,
    pub max_slippage_bps: u16,
}

impl CloseIntent {
    pub fn entire(max_slippage_bps: u16) -> Self {
        Self {
            size_usd_delta: None,
            max_slippage_bps,
        }
    }
}
