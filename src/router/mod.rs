pub mod health;
pub mod trade;

use axum::Router;
use std::sync::Arc;

use crate::tracker::PositionLifecycleTracker;

/// 创建所有路由 / Create all routes
pub fn create_router(tracker: Arc<PositionLifecycleTracker>) -> Router {
    let trade_state = trade::TradeState { tracker };

    Router::new()
        .merge(health::routes())
        .merge(trade::routes().with_state(trade_state))
}
