// 生命周期跟踪数据结构 / Lifecycle tracking data structures
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use utoipa::ToSchema;

use crate::perps::types::{RequestKind, Side};

/// 请求状态 / Request status
///
/// Submitted -> Confirmed | Expired | Failed，后三者为终态；模拟盘请求直接记为 Simulated
/// Submitted -> Confirmed | Expired | Failed, the latter three terminal; paper requests are recorded as Simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Submitted,
    Confirmed,
    /// 未观察到确认；keeper 之后仍可能执行 / No confirmation observed; the keeper may still fill it
    Expired,
    Failed,
    /// 模拟盘：已签名并模拟，未广播 / Paper mode: signed and simulated, never broadcast
    Simulated,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Submitted)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Submitted => "submitted",
            RequestStatus::Confirmed => "confirmed",
            RequestStatus::Expired => "unconfirmed",
            RequestStatus::Failed => "failed",
            RequestStatus::Simulated => "simulated",
        };
        write!(f, "{}", s)
    }
}

/// 已提交的开仓/平仓请求 / A submitted open/close request
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PendingRequest {
    pub id: String,
    pub user_id: String,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = String)]
    pub owner: Pubkey,
    pub market: String,
    pub side: Side,
    pub kind: RequestKind,
    pub counter: u64,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = String)]
    pub position_address: Pubkey,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = String)]
    pub request_address: Pubkey,
    /// 被拒绝的请求没有签名 / Rejected requests carry no signature
    pub signature: Option<String>,
    #[schema(value_type = String)]
    pub submitted_at: DateTime<Utc>,
    pub status: RequestStatus,
    /// 已轮询次数 / Polls performed so far
    pub polls: u32,
    /// 提交前的持仓账户指纹，None 表示账户尚不存在
    /// Position account fingerprint before submission; None when the account did not exist
    pub baseline: Option<String>,
    pub error: Option<String>,
    /// 开仓确认后要挂上的止盈止损 / TP/SL to attach once the open confirms
    pub take_profit_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    /// 构建时的参考价格与仓位规模（USD）/ Reference price and size (USD) at build time
    pub entry_price: f64,
    pub size_usd: f64,
    #[schema(value_type = Option<String>)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// 带止盈止损的监控持仓 / Monitored position with TP/SL
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MonitoredPosition {
    pub id: String,
    pub user_id: String,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = String)]
    pub owner: Pubkey,
    pub market: String,
    pub side: Side,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = String)]
    pub position_address: Pubkey,
    pub entry_price: f64,
    pub size_usd: f64,
    pub take_profit_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    #[schema(value_type = String)]
    pub opened_at: DateTime<Utc>,
}

/// 价格提醒方向 / Price alert direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    Above,
    Below,
}

/// 价格提醒 / Price alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PriceAlert {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub target_price: f64,
    pub direction: AlertDirection,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

/// 触发原因 / Trigger reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    TakeProfit,
    StopLoss,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::TakeProfit => write!(f, "take-profit"),
            TriggerKind::StopLoss => write!(f, "stop-loss"),
        }
    }
}

/// 提交结果回执 / Submission receipt
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TradeReceipt {
    pub request_id: String,
    pub signature: String,
    pub market: String,
    pub side: Side,
    pub kind: RequestKind,
    pub counter: u64,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = String)]
    pub position_address: Pubkey,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = String)]
    pub request_address: Pubkey,
    pub status: RequestStatus,
}

/// 通知类别 / Notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RequestConfirmed,
    RequestUnconfirmed,
    RequestFailed,
    TakeProfit,
    StopLoss,
    PriceAlert,
    TriggerFailed,
}

/// 发给用户的通知 / Notification sent to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// 持仓 + 当前价格与盈亏 / Position with current price and P&L
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PositionSummary {
    #[serde(flatten)]
    pub position: MonitoredPosition,
    pub current_price: Option<f64>,
    pub pnl_percent: Option<f64>,
}
