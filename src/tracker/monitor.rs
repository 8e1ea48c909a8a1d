// 监控循环 - 确认轮询、止盈止损和价格提醒
// Monitor loop - confirmation polling, TP/SL and price alerts

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::lifecycle::{PollReport, PositionLifecycleTracker};
use super::types::{
    AlertDirection, MonitoredPosition, Notification, NotificationKind, PriceAlert, TriggerKind,
};
use crate::perps::errors::Result;
use crate::perps::types::Side;

/// 一轮监控的结果 / Outcome of one monitoring pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub poll: PollReport,
    pub triggered: usize,
    pub alerts_fired: usize,
}

/// 价格变动百分比，空头取反，不含杠杆
/// Price-move percentage, negated for shorts, leverage not applied
pub fn pnl_percent(side: Side, entry_price: f64, current_price: f64) -> f64 {
    if entry_price <= 0.0 {
        return 0.0;
    }
    let change = (current_price - entry_price) / entry_price * 100.0;
    match side {
        Side::Long => change,
        Side::Short => -change,
    }
}

/// 判断是否触发止盈/止损，止盈优先
/// Decide whether TP or SL fires; take-profit wins when both would
pub fn evaluate_trigger(position: &MonitoredPosition, current_price: f64) -> Option<TriggerKind> {
    let pnl = pnl_percent(position.side, position.entry_price, current_price);
    if let Some(tp) = position.take_profit_pct {
        if pnl >= tp {
            return Some(TriggerKind::TakeProfit);
        }
    }
    if let Some(sl) = position.stop_loss_pct {
        if pnl <= -sl {
            return Some(TriggerKind::StopLoss);
        }
    }
    None
}

pub fn alert_fires(alert: &PriceAlert, current_price: f64) -> bool {
    match alert.direction {
        AlertDirection::Above => current_price >= alert.target_price,
        AlertDirection::Below => current_price <= alert.target_price,
    }
}

impl PositionLifecycleTracker {
    /// 一轮价格查询，每个符号只查一次；失败的符号跳过
    /// One price lookup per symbol; failed symbols are skipped
    async fn price_table(&self, symbols: HashSet<String>) -> HashMap<String, f64> {
        let mut prices = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            match self.prices().get_price(&symbol).await {
                Ok(price) => {
                    prices.insert(symbol, price);
                }
                Err(e) => warn!("⚠️ 跳过价格 / Skipping price for {}: {}", symbol, e),
            }
        }
        prices
    }

    /// 一轮监控 / One monitoring pass
    pub async fn tick(&self) -> Result<TickReport> {
        let poll = self.poll_pending().await?;
        let triggered = self.check_triggers().await?;
        let alerts_fired = self.check_alerts().await?;

        Ok(TickReport {
            poll,
            triggered,
            alerts_fired,
        })
    }

    async fn check_triggers(&self) -> Result<usize> {
        let positions: Vec<MonitoredPosition> = self
            .snapshot_monitored()
            .await
            .into_iter()
            .filter(|p| p.take_profit_pct.is_some() || p.stop_loss_pct.is_some())
            .collect();
        if positions.is_empty() {
            return Ok(0);
        }

        let symbols = positions.iter().map(|p| p.market.clone()).collect();
        let prices = self.price_table(symbols).await;

        let mut triggered = 0;
        for position in positions {
            let Some(&price) = prices.get(&position.market) else {
                continue;
            };
            let Some(trigger) = evaluate_trigger(&position, price) else {
                continue;
            };

            // 先移除并持久化，再发平仓 / Remove and persist before issuing the close
            let Some(taken) = self.take_monitored(&position.user_id, &position.id).await? else {
                continue;
            };
            triggered += 1;
            let pnl = pnl_percent(taken.side, taken.entry_price, price);
            info!(
                "🎯 {} 触发 / {} triggered: user={} {} {} entry={} price={} pnl={:.2}%",
                trigger, trigger, taken.user_id, taken.market, taken.side, taken.entry_price, price, pnl
            );

            match self.close_taken_position(&taken).await {
                Ok(receipt) => {
                    let kind = match trigger {
                        TriggerKind::TakeProfit => NotificationKind::TakeProfit,
                        TriggerKind::StopLoss => NotificationKind::StopLoss,
                    };
                    self.notifier
                        .notify(
                            &taken.user_id,
                            Notification::new(
                                kind,
                                format!(
                                    "{} hit on {} {} at {:.4} ({:+.2}%), close request {} submitted",
                                    trigger, taken.market, taken.side, price, pnl, receipt.signature
                                ),
                            ),
                        )
                        .await;
                }
                Err(e) => {
                    error!(
                        "❌ 自动平仓失败 / Automatic close failed for {}: {}",
                        taken.id, e
                    );
                    let retrying = e.is_retryable();
                    if retrying {
                        self.reinsert_monitored(vec![taken.clone()]).await?;
                    }
                    self.notifier
                        .notify(
                            &taken.user_id,
                            Notification::new(
                                NotificationKind::TriggerFailed,
                                format!(
                                    "{} on {} {} could not close the position: {}{}",
                                    trigger,
                                    taken.market,
                                    taken.side,
                                    e,
                                    if retrying { " (will retry)" } else { "" }
                                ),
                            ),
                        )
                        .await;
                }
            }
        }
        Ok(triggered)
    }

    async fn check_alerts(&self) -> Result<usize> {
        let alerts = self.snapshot_alerts().await;
        if alerts.is_empty() {
            return Ok(0);
        }

        let symbols = alerts.iter().map(|a| a.symbol.clone()).collect();
        let prices = self.price_table(symbols).await;

        let mut fired = 0;
        for alert in alerts {
            let Some(&price) = prices.get(&alert.symbol) else {
                continue;
            };
            if !alert_fires(&alert, price) {
                continue;
            }
            let Some(taken) = self.take_alert(&alert.user_id, &alert.id).await? else {
                continue;
            };
            fired += 1;
            let direction = match taken.direction {
                AlertDirection::Above => "above",
                AlertDirection::Below => "below",
            };
            self.notifier
                .notify(
                    &taken.user_id,
                    Notification::new(
                        NotificationKind::PriceAlert,
                        format!(
                            "{} is {} {} (now {:.4})",
                            taken.symbol, direction, taken.target_price, price
                        ),
                    ),
                )
                .await;
        }
        Ok(fired)
    }
}

/// 固定间隔运行监控循环，直到收到关闭信号
/// Run the monitor loop at a fixed interval until shutdown is signalled
pub async fn run_monitor(
    tracker: Arc<PositionLifecycleTracker>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("⏱️ 监控循环启动 / Monitor loop started, interval {:?}", interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = tracker.tick().await {
                    error!("❌ 监控轮次失败 / Monitor pass failed: {}", e);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("🛑 监控循环已停止 / Monitor loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use solana_sdk::pubkey::Pubkey;

    fn position(side: Side, tp: Option<f64>, sl: Option<f64>) -> MonitoredPosition {
        MonitoredPosition {
            id: "p1".to_string(),
            user_id: "alice".to_string(),
            owner: Pubkey::new_unique(),
            market: "SOL".to_string(),
            side,
            position_address: Pubkey::new_unique(),
            entry_price: 100.0,
            size_usd: 500.0,
            take_profit_pct: tp,
            stop_loss_pct: sl,
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn test_pnl_is_negated_for_shorts() {
        assert!((pnl_percent(Side::Long, 100.0, 111.0) - 11.0).abs() < 1e-9);
        assert!((pnl_percent(Side::Short, 100.0, 111.0) + 11.0).abs() < 1e-9);
        assert_eq!(pnl_percent(Side::Long, 0.0, 10.0), 0.0);
    }

    #[test]
    fn test_take_profit_and_stop_loss_thresholds() {
        let long = position(Side::Long, Some(10.0), Some(5.0));
        assert_eq!(evaluate_trigger(&long, 111.0), Some(TriggerKind::TakeProfit));
        assert_eq!(evaluate_trigger(&long, 110.0), Some(TriggerKind::TakeProfit));
        assert_eq!(evaluate_trigger(&long, 94.0), Some(TriggerKind::StopLoss));
        assert_eq!(evaluate_trigger(&long, 103.0), None);

        let short = position(Side::Short, Some(10.0), Some(5.0));
        assert_eq!(evaluate_trigger(&short, 89.0), Some(TriggerKind::TakeProfit));
        assert_eq!(evaluate_trigger(&short, 106.0), Some(TriggerKind::StopLoss));
    }

    #[test]
    fn test_no_trigger_without_thresholds() {
        let bare = position(Side::Long, None, None);
        assert_eq!(evaluate_trigger(&bare, 1_000.0), None);
        assert_eq!(evaluate_trigger(&bare, 1.0), None);
    }

    #[test]
    fn test_alert_directions() {
        let mut alert = PriceAlert {
            id: "a".to_string(),
            user_id: "alice".to_string(),
            symbol: "SOL".to_string(),
            target_price: 150.0,
            direction: AlertDirection::Above,
            created_at: Utc::now(),
        };
        assert!(alert_fires(&alert, 150.0));
        assert!(!alert_fires(&alert, 149.9));

        alert.direction = AlertDirection::Below;
        assert!(alert_fires(&alert, 149.9));
        assert!(!alert_fires(&alert, 150.1));
    }
}
