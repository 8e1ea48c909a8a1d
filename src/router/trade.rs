// 交易请求与提醒 API / Trade request and alert API
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::perps::types::{CloseIntent, PositionRef, Side, TradeIntent};
use crate::tracker::{AlertDirection, PositionLifecycleTracker};
use crate::util::{ok_result, ApiError, ApiResult};

/// 交易路由状态 / Trade router state
#[derive(Clone)]
pub struct TradeState {
    pub tracker: Arc<PositionLifecycleTracker>,
}

/// 开仓请求 / Open position request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "user_id": "alice",
    "market": "SOL",
    "side": "long",
    "collateral_amount": 1000000000u64,
    "leverage": 5.0,
    "max_slippage_bps": 100,
    "take_profit_pct": 10.0,
    "stop_loss_pct": 5.0
}))]
pub struct OpenTradeRequest {
    pub user_id: String,
    /// 市场符号 SOL / ETH / BTC
    pub market: String,
    pub side: Side,
    /// 抵押品最小单位数量 / Collateral in the token's smallest unit
    pub collateral_amount: u64,
    pub leverage: f64,
    /// 省略时使用默认滑点 / Defaults to the configured slippage
    #[serde(default)]
    pub max_slippage_bps: Option<u16>,
    #[serde(default)]
    pub take_profit_pct: Option<f64>,
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
}

/// 平仓请求 / Close position request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CloseTradeRequest {
    pub user_id: String,
    pub market: String,
    pub side: Side,
    /// 部分平仓的美元数量（6 位小数）；省略则全部平仓
    /// USD size to close (6 decimals); omitted closes the entire position
    #[serde(default)]
    pub size_usd_delta: Option<u64>,
    #[serde(default)]
    pub max_slippage_bps: Option<u16>,
}

/// 止盈止损设置 / TP/SL update
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TpSlRequest {
    pub user_id: String,
    pub market: String,
    pub side: Side,
    #[serde(default)]
    pub take_profit_pct: Option<f64>,
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
}

/// 价格提醒请求 / Price alert request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AlertRequest {
    pub user_id: String,
    pub symbol: String,
    pub target_price: f64,
    pub direction: AlertDirection,
}

/// 用户路径参数 / User path parameter
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Path)]
pub struct UserPath {
    /// 用户 ID / User id
    pub user: String,
}

/// 创建交易路由 / Create trade routes
pub fn routes() -> Router<TradeState> {
    Router::new()
        .route("/api/trade/open", post(open_trade))
        .route("/api/trade/close", post(close_trade))
        .route("/api/trade/requests/:user", get(list_requests))
        .route("/api/trade/requests/:user/:request_id", get(get_request))
        .route("/api/trade/positions/:user", get(list_positions))
        .route("/api/trade/tpsl", post(set_tp_sl))
        .route("/api/trade/tpsl/:user/:position_id", delete(cancel_tp_sl))
        .route("/api/alerts", post(create_alert))
        .route("/api/alerts/:user", get(list_alerts))
        .route("/api/alerts/:user/:alert_id", delete(delete_alert))
}

/// 提交开仓请求 / Submit an open position request
#[utoipa::path(
    post,
    path = "/api/trade/open",
    request_body = OpenTradeRequest,
    responses(
        (status = 200, description = "请求已提交 / Request submitted",
         body = crate::docs::ApiResponse<crate::tracker::TradeReceipt>),
        (status = 400, description = "无效的交易意图 / Invalid intent",
         body = crate::docs::TradeErrorResponse),
        (status = 409, description = "同一持仓已有未决请求 / Another request on this position is pending",
         body = crate::docs::TradeErrorResponse),
        (status = 422, description = "缺少前置账户或被链上拒绝 / Missing prerequisite or rejected",
         body = crate::docs::TradeErrorResponse),
        (status = 503, description = "端点或价格源不可用 / Endpoints or price feed unavailable",
         body = crate::docs::TradeErrorResponse)
    ),
    tag = "Trade"
)]
pub async fn open_trade(
    State(state): State<TradeState>,
    payload: Result<Json<OpenTradeRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    info!(
        "📥 开仓请求 / Open request: user={}, market={}, side={}, leverage={}",
        body.user_id, body.market, body.side, body.leverage
    );
    let intent = TradeIntent {
        market: body.market,
        side: body.side,
        collateral_amount: body.collateral_amount,
        leverage: body.leverage,
        max_slippage_bps: body
            .max_slippage_bps
            .unwrap_or_else(|| state.tracker.default_slippage_bps()),
    };
    let result = state
        .tracker
        .open_position(&body.user_id, &intent, body.take_profit_pct, body.stop_loss_pct)
        .await
        .map_err(ApiError::from);
    Ok(ok_result(result))
}

/// 提交平仓请求 / Submit a close position request
#[utoipa::path(
    post,
    path = "/api/trade/close",
    request_body = CloseTradeRequest,
    responses(
        (status = 200, description = "请求已提交 / Request submitted",
         body = crate::docs::ApiResponse<crate::tracker::TradeReceipt>),
        (status = 409, description = "同一持仓已有未决请求 / Another request on this position is pending",
         body = crate::docs::TradeErrorResponse),
        (status = 422, description = "持仓不存在或被链上拒绝 / Position missing or rejected",
         body = crate::docs::TradeErrorResponse)
    ),
    tag = "Trade"
)]
pub async fn close_trade(
    State(state): State<TradeState>,
    payload: Result<Json<CloseTradeRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    info!(
        "📤 平仓请求 / Close request: user={}, market={}, side={}, size={:?}",
        body.user_id, body.market, body.side, body.size_usd_delta
    );
    let position = PositionRef {
        market: body.market,
        side: body.side,
    };
    let close = CloseIntent {
        size_usd_delta: body.size_usd_delta,
        max_slippage_bps: body
            .max_slippage_bps
            .unwrap_or_else(|| state.tracker.default_slippage_bps()),
    };
    let result = state
        .tracker
        .close_position(&body.user_id, &position, &close)
        .await
        .map_err(ApiError::from);
    Ok(ok_result(result))
}

/// 查询用户的请求记录 / List a user's requests
#[utoipa::path(
    get,
    path = "/api/trade/requests/{user}",
    params(UserPath),
    responses(
        (status = 200, description = "请求列表 / Request list",
         body = crate::docs::ApiResponse<Vec<crate::tracker::PendingRequest>>)
    ),
    tag = "Trade"
)]
pub async fn list_requests(
    State(state): State<TradeState>,
    Path(UserPath { user }): Path<UserPath>,
) -> ApiResult {
    let requests = state.tracker.pending_requests(&user).await;
    Ok(ok_result(Ok(requests)))
}

/// 查询单个请求 / Get a single request
#[utoipa::path(
    get,
    path = "/api/trade/requests/{user}/{request_id}",
    params(
        ("user" = String, Path, description = "用户 ID / User id"),
        ("request_id" = String, Path, description = "请求 ID / Request id")
    ),
    responses(
        (status = 200, description = "请求详情 / Request detail",
         body = crate::docs::ApiResponse<crate::tracker::PendingRequest>),
        (status = 404, description = "请求不存在 / Request not found",
         body = crate::docs::TradeErrorResponse)
    ),
    tag = "Trade"
)]
pub async fn get_request(
    State(state): State<TradeState>,
    Path((user, request_id)): Path<(String, String)>,
) -> ApiResult {
    let result = state
        .tracker
        .request(&user, &request_id)
        .await
        .map_err(ApiError::from);
    Ok(ok_result(result))
}

/// 查询监控中的持仓及盈亏 / List monitored positions with P&L
#[utoipa::path(
    get,
    path = "/api/trade/positions/{user}",
    params(UserPath),
    responses(
        (status = 200, description = "持仓列表 / Position list",
         body = crate::docs::ApiResponse<Vec<crate::tracker::PositionSummary>>)
    ),
    tag = "Trade"
)]
pub async fn list_positions(
    State(state): State<TradeState>,
    Path(UserPath { user }): Path<UserPath>,
) -> ApiResult {
    let summaries = state.tracker.position_summaries(&user).await;
    Ok(ok_result(Ok(summaries)))
}

/// 设置止盈止损 / Set take-profit and stop-loss
#[utoipa::path(
    post,
    path = "/api/trade/tpsl",
    request_body = TpSlRequest,
    responses(
        (status = 200, description = "已更新 / Updated",
         body = crate::docs::ApiResponse<crate::tracker::MonitoredPosition>),
        (status = 404, description = "没有监控中的持仓 / No monitored position",
         body = crate::docs::TradeErrorResponse)
    ),
    tag = "Trade"
)]
pub async fn set_tp_sl(
    State(state): State<TradeState>,
    payload: Result<Json<TpSlRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let position = PositionRef {
        market: body.market,
        side: body.side,
    };
    let result = state
        .tracker
        .set_tp_sl(&body.user_id, &position, body.take_profit_pct, body.stop_loss_pct)
        .await
        .map_err(ApiError::from);
    Ok(ok_result(result))
}

/// 清除止盈止损 / Clear take-profit and stop-loss
#[utoipa::path(
    delete,
    path = "/api/trade/tpsl/{user}/{position_id}",
    params(
        ("user" = String, Path, description = "用户 ID / User id"),
        ("position_id" = String, Path, description = "监控项 ID / Monitored position id")
    ),
    responses(
        (status = 200, description = "已清除 / Cleared",
         body = crate::docs::ApiResponse<crate::tracker::MonitoredPosition>),
        (status = 404, description = "监控项不存在 / Not found",
         body = crate::docs::TradeErrorResponse)
    ),
    tag = "Trade"
)]
pub async fn cancel_tp_sl(
    State(state): State<TradeState>,
    Path((user, position_id)): Path<(String, String)>,
) -> ApiResult {
    let result = state
        .tracker
        .cancel_trigger(&user, &position_id)
        .await
        .map_err(ApiError::from);
    Ok(ok_result(result))
}

/// 创建价格提醒 / Create a price alert
#[utoipa::path(
    post,
    path = "/api/alerts",
    request_body = AlertRequest,
    responses(
        (status = 200, description = "提醒已创建 / Alert created",
         body = crate::docs::ApiResponse<crate::tracker::PriceAlert>),
        (status = 400, description = "无效的提醒 / Invalid alert",
         body = crate::docs::TradeErrorResponse)
    ),
    tag = "Alerts"
)]
pub async fn create_alert(
    State(state): State<TradeState>,
    payload: Result<Json<AlertRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let result = state
        .tracker
        .add_price_alert(&body.user_id, &body.symbol, body.target_price, body.direction)
        .await
        .map_err(ApiError::from);
    Ok(ok_result(result))
}

/// 查询价格提醒 / List price alerts
#[utoipa::path(
    get,
    path = "/api/alerts/{user}",
    params(UserPath),
    responses(
        (status = 200, description = "提醒列表 / Alert list",
         body = crate::docs::ApiResponse<Vec<crate::tracker::PriceAlert>>)
    ),
    tag = "Alerts"
)]
pub async fn list_alerts(
    State(state): State<TradeState>,
    Path(UserPath { user }): Path<UserPath>,
) -> ApiResult {
    let alerts = state.tracker.price_alerts(&user).await;
    Ok(ok_result(Ok(alerts)))
}

/// 删除价格提醒 / Delete a price alert
#[utoipa::path(
    delete,
    path = "/api/alerts/{user}/{alert_id}",
    params(
        ("user" = String, Path, description = "用户 ID / User id"),
        ("alert_id" = String, Path, description = "提醒 ID / Alert id")
    ),
    responses(
        (status = 200, description = "已删除 / Deleted", body = crate::docs::EmptyResponse),
        (status = 404, description = "提醒不存在 / Alert not found",
         body = crate::docs::TradeErrorResponse)
    ),
    tag = "Alerts"
)]
pub async fn delete_alert(
    State(state): State<TradeState>,
    Path((user, alert_id)): Path<(String, String)>,
) -> ApiResult {
    let result = state
        .tracker
        .remove_price_alert(&user, &alert_id)
        .await
        .map_err(ApiError::from);
    Ok(ok_result(result))
}
