use axum::{
    extract::rejection::JsonRejection,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::{error, warn};

use crate::perps::TradeError;

/// API 统一响应结果类型 / Unified API result type
pub type ApiResult = Result<Response, ApiError>;

/// 统一响应格式 / Unified response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct CommonResult<T: Serialize> {
    /// 响应状态码
    pub code: u32,
    /// 响应消息
    pub msg: String,
    /// 响应数据（成功时包含数据，失败时为 None）
    pub data: Option<T>,
}

impl<T: Serialize> CommonResult<T> {
    /// 自定义响应
    pub fn default(code: u32, msg: String, data: Option<T>) -> Self {
        CommonResult { code, msg, data }
    }

    /// 成功响应（带数据）
    pub fn ok(data: T) -> Self {
        Self::default(200, "success".to_string(), Some(data))
    }

    /// 错误响应（无数据）
    pub fn error(code: u32, msg: String) -> Self {
        Self::default(code, msg, None)
    }
}

impl<T: Serialize> IntoResponse for CommonResult<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// 处理 Result 类型，自动将 Result<T, ApiError> 转换为响应
pub fn ok_result<T: Serialize>(result: Result<T, ApiError>) -> Response {
    match result {
        Ok(data) => CommonResult::ok(data).into_response(),
        Err(err) => err.into_response(),
    }
}

/// API 错误枚举
#[derive(Debug)]
pub enum ApiError {
    /// 请求参数错误（请求体无法解析）/ Request body could not be parsed
    RequestParamError(String),
    /// 交易请求错误（带稳定的类别标签）/ Trade request error with a stable kind tag
    Trade(TradeError),
}

/// 交易错误的响应数据 / Payload of a trade error response
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TradeErrorData {
    /// 错误类别，例如 invalid_intent / Error kind, e.g. invalid_intent
    pub kind: String,
    pub message: String,
    /// 稍后重试是否可能成功 / Whether a later retry may succeed
    pub retryable: bool,
}

/// 交易错误对应的 HTTP 状态码 / HTTP status code for a trade error
fn trade_status(err: &TradeError) -> u16 {
    match err {
        TradeError::InvalidIntent(_) => 400,
        TradeError::NotFound(_) => 404,
        TradeError::RequestInFlight(_) => 409,
        TradeError::MissingPrerequisite(_)
        | TradeError::RejectedOnChain(_)
        | TradeError::ConfirmationTimeout(_)
        | TradeError::Encoding(_)
        | TradeError::Signing(_) => 422,
        TradeError::EndpointExhausted(_) | TradeError::PriceUnavailable { .. } => 503,
        TradeError::Storage(_) => 500,
    }
}

impl ApiError {
    /// 判断是否为业务错误（不需要打印堆栈）
    pub fn is_business_error(&self) -> bool {
        match self {
            ApiError::RequestParamError(_) => true,
            ApiError::Trade(e) => !matches!(e, TradeError::Storage(_)),
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::RequestParamError(e) => write!(f, "参数错误 / Parameter error: {}", e),
            ApiError::Trade(e) => write!(f, "交易错误 / Trade error: {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

/// 请求体解析失败 / Request body extraction failure
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::RequestParamError(rejection.body_text())
    }
}

impl From<TradeError> for ApiError {
    fn from(e: TradeError) -> Self {
        Self::Trade(e)
    }
}

/// 构建错误响应的辅助函数 / Build an error response
fn error(code: u32, msg: String) -> Response {
    with_status(code, CommonResult::<()>::error(code, msg).into_response())
}

/// 让 HTTP 状态码与 code 字段一致 / Keep the HTTP status in line with the code field
fn with_status(code: u32, mut response: Response) -> Response {
    let status = u16::try_from(code)
        .ok()
        .and_then(|c| axum::http::StatusCode::from_u16(c).ok());
    if let Some(status) = status {
        *response.status_mut() = status;
    }
    response
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // 记录系统错误的详细信息
        if !self.is_business_error() {
            error!("❌ 系统错误 / System error: {}", self);
        }

        match self {
            Self::RequestParamError(e) => error(400, format!("参数错误 / Parameter error: {}", e)),
            Self::Trade(e) => {
                let code = trade_status(&e);
                warn!("⚠️ 交易请求失败 / Trade request failed: [{}] {}", e.kind(), e);
                let body = CommonResult::default(
                    u32::from(code),
                    e.to_string(),
                    Some(TradeErrorData {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                    }),
                );
                with_status(u32::from(code), body.into_response())
            }
        }
    }
}
