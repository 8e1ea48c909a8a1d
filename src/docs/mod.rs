use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::{OpenApi, ToSchema};

/// API 统一响应格式（用于 Swagger 文档）
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(title = "ApiResponse", description = "API 统一响应格式")]
pub struct ApiResponse<T>
where
    T: ToSchema + Serialize,
{
    /// 响应状态码：200=成功，其他=错误
    #[schema(example = 200)]
    pub code: u32,

    /// 响应消息
    #[schema(example = "success")]
    pub msg: String,

    /// 响应数据，成功时包含具体数据，失败时为 null
    pub data: Option<T>,
}

/// 空数据响应格式（用于 Swagger 文档）
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(
    title = "EmptyResponse",
    description = "空数据响应格式（操作成功但无返回数据）",
    example = json!({
        "code": 200,
        "msg": "success",
        "data": null
    })
)]
pub struct EmptyResponse {
    #[schema(example = 200)]
    pub code: u32,

    #[schema(example = "success")]
    pub msg: String,

    pub data: Option<()>,
}

/// 错误响应格式（用于 Swagger 文档）
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(title = "ErrorApiResponse", description = "错误响应格式")]
pub struct ErrorApiResponse {
    /// 响应状态码：非200表示错误
    pub code: u32,

    /// 错误消息
    pub msg: String,

    /// 错误时数据为空
    pub data: Option<Value>,
}

/// 交易错误响应格式（用于 Swagger 文档）
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(
    title = "TradeErrorResponse",
    description = "交易错误响应格式 / Trade error response",
    example = json!({
        "code": 400,
        "msg": "Invalid intent: leverage 150 outside 1.1..=100",
        "data": {
            "kind": "invalid_intent",
            "message": "Invalid intent: leverage 150 outside 1.1..=100",
            "retryable": false
        }
    })
)]
pub struct TradeErrorResponse {
    /// 与 HTTP 状态码一致 / Matches the HTTP status code
    pub code: u32,

    pub msg: String,

    pub data: Option<crate::util::result::TradeErrorData>,
}

/// OpenAPI 文档配置
#[derive(OpenApi)]
#[openapi(
    paths(
        // 路由函数列表
        crate::router::health::health,
        crate::router::trade::open_trade,
        crate::router::trade::close_trade,
        crate::router::trade::list_requests,
        crate::router::trade::get_request,
        crate::router::trade::list_positions,
        crate::router::trade::set_tp_sl,
        crate::router::trade::cancel_tp_sl,
        crate::router::trade::create_alert,
        crate::router::trade::list_alerts,
        crate::router::trade::delete_alert,
    ),
    components(
        schemas(
            // 响应结构体列表
            crate::router::health::HealthResponse,
            crate::router::trade::OpenTradeRequest,
            crate::router::trade::CloseTradeRequest,
            crate::router::trade::TpSlRequest,
            crate::router::trade::AlertRequest,
            crate::perps::types::Side,
            crate::perps::types::RequestKind,
            crate::tracker::TradeReceipt,
            crate::tracker::PendingRequest,
            crate::tracker::RequestStatus,
            crate::tracker::MonitoredPosition,
            crate::tracker::PositionSummary,
            crate::tracker::PriceAlert,
            crate::tracker::AlertDirection,
            crate::util::result::TradeErrorData,
            EmptyResponse,
            ErrorApiResponse,
            TradeErrorResponse,
        )
    ),
    tags(
        (name = "system", description = "系统相关接口 / System endpoints"),
        (name = "Trade", description = "开平仓请求与止盈止损 / Open and close requests, TP/SL"),
        (name = "Alerts", description = "价格提醒 / Price alerts"),
    ),
    info(
        title = "Perps Request Server API",
        version = "0.1.0",
        description = "Jupiter Perps 请求提交与生命周期跟踪 API / Jupiter Perps request submission and lifecycle tracking API"
    )
)]
pub struct ApiDoc;
