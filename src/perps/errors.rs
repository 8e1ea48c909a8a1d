// 交易请求错误类型定义
// Trade request error types

use thiserror::Error;

use crate::db::errors::TrackerStorageError;

/// 交易请求错误 / Trade request errors
///
/// 网络重试全部在 EndpointFailoverClient 内部完成，调用方只会看到最终结果。
/// Network retries are contained in the EndpointFailoverClient; callers only see the outcome.
#[derive(Error, Debug)]
pub enum TradeError {
    /// 无效的交易意图（未知市场、非正数量等），在任何网络调用前拒绝
    /// Invalid intent (unknown market, non-positive size), rejected before any network call
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    /// 缺少前置账户（例如用户代币账户不存在）
    /// Missing prerequisite account (e.g. user token account does not exist)
    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),

    /// 所有端点都发生瞬时错误，调用方可稍后重试
    /// Every endpoint failed transiently; retryable later
    #[error("All endpoints exhausted: {0}")]
    EndpointExhausted(String),

    /// 端点判定交易本身无效，不自动重试
    /// Endpoint reported the transaction itself invalid; never retried
    #[error("Rejected on chain: {0}")]
    RejectedOnChain(String),

    /// 请求在限定轮数内未被确认（keeper 之后仍可能执行）
    /// Request unconfirmed within the polling budget (the keeper may still fill it)
    #[error("Unconfirmed: {0}")]
    ConfirmationTimeout(String),

    /// 指令编码失败 / Instruction encoding failed
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// 签名失败 / Signing failed
    #[error("Signing error: {0}")]
    Signing(String),

    /// 价格源不可用 / Price feed unavailable
    #[error("Price unavailable for {symbol}: {reason}")]
    PriceUnavailable { symbol: String, reason: String },

    /// 同一持仓已有未决请求，需等待其确认或过期
    /// Another request on the same position is still pending; wait until it resolves
    #[error("Request in flight: {0}")]
    RequestInFlight(String),

    /// 资源不存在 / Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// 持久化错误 / Persistence error
    #[error("Storage error: {0}")]
    Storage(#[from] TrackerStorageError),
}

impl TradeError {
    /// 稳定的错误类别标签 / Stable error kind tag
    pub fn kind(&self) -> &'static str {
        match self {
            TradeError::InvalidIntent(_) => "invalid_intent",
            TradeError::MissingPrerequisite(_) => "missing_prerequisite",
            TradeError::EndpointExhausted(_) => "endpoint_exhausted",
            TradeError::RejectedOnChain(_) => "rejected_on_chain",
            TradeError::ConfirmationTimeout(_) => "confirmation_timeout",
            TradeError::Encoding(_) => "encoding",
            TradeError::Signing(_) => "signing",
            TradeError::PriceUnavailable { .. } => "price_unavailable",
            TradeError::RequestInFlight(_) => "request_in_flight",
            TradeError::NotFound(_) => "not_found",
            TradeError::Storage(_) => "storage",
        }
    }

    /// 调用方稍后重试是否可能成功 / Whether a later retry by the caller may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TradeError::EndpointExhausted(_)
                | TradeError::PriceUnavailable { .. }
                | TradeError::RequestInFlight(_)
        )
    }
}

/// Result 类型别名 / Result type alias
pub type Result<T> = std::result::Result<T, TradeError>;
