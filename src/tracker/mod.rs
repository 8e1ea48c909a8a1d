// 持仓生命周期跟踪模块 / Position lifecycle tracking module
pub mod lifecycle;
pub mod monitor;
pub mod notify;
pub mod price;
pub mod types;

pub use lifecycle::{PollReport, PositionLifecycleTracker, TrackerConfig};
pub use monitor::{run_monitor, TickReport};
pub use notify::{LogNotifier, Notifier};
pub use price::{JupiterPriceFeed, PriceFeed};
pub use types::{
    AlertDirection, MonitoredPosition, Notification, NotificationKind, PendingRequest,
    PositionSummary, PriceAlert, RequestStatus, TradeReceipt, TriggerKind,
};

#[cfg(test)]
mod tests;
