// 持仓生命周期跟踪器
// Position lifecycle tracker
//
// 状态锁只保护本地簿记，任何网络调用前都会释放。
// The state lock only guards local bookkeeping and is released before any network call.

use chrono::Utc;
use solana_sdk::{pubkey::Pubkey, signature::Signer, transaction::Transaction};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::notify::Notifier;
use super::price::PriceFeed;
use super::types::{
    AlertDirection, MonitoredPosition, Notification, NotificationKind, PendingRequest,
    PositionSummary, PriceAlert, RequestStatus, TradeReceipt,
};
use crate::config::Config;
use crate::db::TrackerStorage;
use crate::perps::builder::{SignableTransaction, TransactionBuilder};
use crate::perps::errors::{Result, TradeError};
use crate::perps::registry;
use crate::perps::signer::{is_valid_user_id, KeyStore, SharedSigner};
use crate::perps::types::{CloseIntent, PositionRef, RequestKind, TradeIntent};
use crate::solana::EndpointFailoverClient;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// 无状态变化多少轮后判定为过期 / Polls without change before a request expires
    pub confirmation_cycles: u32,
    /// 自动平仓使用的滑点 / Slippage used by automatic closes
    pub default_slippage_bps: u16,
    /// 模拟盘：模拟代替广播 / Paper mode: simulate instead of broadcasting
    pub paper_mode: bool,
}

impl TrackerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            confirmation_cycles: config.monitor.confirmation_cycles,
            default_slippage_bps: config.trading.default_slippage_bps,
            paper_mode: config.trading.paper_mode,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confirmation_cycles: 6,
            default_slippage_bps: 100,
            paper_mode: false,
        }
    }
}

/// 单个用户的全部跟踪状态 / Every piece of tracked state for one user
#[derive(Debug, Default)]
pub(crate) struct UserBook {
    pub(crate) requests: HashMap<String, PendingRequest>,
    pub(crate) monitored: HashMap<String, MonitoredPosition>,
    pub(crate) alerts: HashMap<String, PriceAlert>,
}

#[derive(Debug, Default)]
pub(crate) struct TrackerState {
    pub(crate) users: HashMap<String, UserBook>,
}

impl TrackerState {
    pub(crate) fn book(&mut self, user_id: &str) -> &mut UserBook {
        self.users.entry(user_id.to_string()).or_default()
    }
}

fn lock_claims(claims: &StdMutex<HashSet<Pubkey>>) -> MutexGuard<'_, HashSet<Pubkey>> {
    claims.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 持仓地址的占用，drop 时归还 / Claim on a position address, released on drop
///
/// 同一持仓同时只能有一个请求在提交或等待确认，否则一次 keeper 成交会确认多个请求。
/// Only one request per position may be in submission or awaiting confirmation,
/// otherwise one keeper fill would confirm several requests.
pub(crate) struct PositionClaim<'a> {
    claims: &'a StdMutex<HashSet<Pubkey>>,
    position: Pubkey,
}

impl Drop for PositionClaim<'_> {
    fn drop(&mut self) {
        lock_claims(self.claims).remove(&self.position);
    }
}

/// 一轮轮询的结果 / Outcome of one polling pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub confirmed: usize,
    pub expired: usize,
    pub still_pending: usize,
}

pub struct PositionLifecycleTracker {
    pub(crate) config: TrackerConfig,
    pub(crate) builder: Arc<TransactionBuilder>,
    pub(crate) keys: Arc<dyn KeyStore>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) storage: TrackerStorage,
    pub(crate) state: Mutex<TrackerState>,
    /// 正在提交的持仓地址 / Position addresses with a submission in progress
    pub(crate) claims: StdMutex<HashSet<Pubkey>>,
}

impl PositionLifecycleTracker {
    pub fn new(
        config: TrackerConfig,
        builder: Arc<TransactionBuilder>,
        keys: Arc<dyn KeyStore>,
        notifier: Arc<dyn Notifier>,
        storage: TrackerStorage,
    ) -> Self {
        Self {
            config,
            builder,
            keys,
            notifier,
            storage,
            state: Mutex::new(TrackerState::default()),
            claims: StdMutex::new(HashSet::new()),
        }
    }

    pub(crate) fn endpoints(&self) -> &Arc<EndpointFailoverClient> {
        self.builder.endpoints()
    }

    pub(crate) fn prices(&self) -> &Arc<dyn PriceFeed> {
        self.builder.prices()
    }

    pub fn default_slippage_bps(&self) -> u16 {
        self.config.default_slippage_bps
    }

    pub fn is_paper_mode(&self) -> bool {
        self.config.paper_mode
    }

    /// 启动时从存储恢复请求、监控持仓、提醒和计数器
    /// Restore requests, monitored positions, alerts and counters from storage on startup
    pub async fn restore(&self) -> Result<()> {
        let requests = self.storage.load_requests()?;
        let monitored = self.storage.load_monitored()?;
        let alerts = self.storage.load_alerts()?;
        let counters = self.storage.load_counters()?;

        let counter_sequence = self.builder.counters();
        for (owner, next) in &counters {
            counter_sequence.restore(owner, *next);
        }

        let mut state = self.state.lock().await;
        for request in requests {
            counter_sequence.restore(&request.owner, request.counter.saturating_add(1));
            state
                .book(&request.user_id)
                .requests
                .insert(request.id.clone(), request);
        }
        for position in monitored {
            state
                .book(&position.user_id)
                .monitored
                .insert(position.id.clone(), position);
        }
        for alert in alerts {
            state.book(&alert.user_id).alerts.insert(alert.id.clone(), alert);
        }

        let pending = state
            .users
            .values()
            .flat_map(|b| b.requests.values())
            .filter(|r| r.status == RequestStatus::Submitted)
            .count();
        info!(
            "♻️ 跟踪器状态已恢复 / Tracker state restored: {} users, {} submitted requests, {} counters",
            state.users.len(),
            pending,
            counters.len()
        );
        Ok(())
    }

    fn check_user(user_id: &str) -> Result<()> {
        if !is_valid_user_id(user_id) {
            return Err(TradeError::InvalidIntent(format!(
                "invalid user id: {:?}",
                user_id
            )));
        }
        Ok(())
    }

    fn check_trigger_pct(label: &str, value: Option<f64>) -> Result<()> {
        match value {
            Some(v) if !v.is_finite() || v <= 0.0 => Err(TradeError::InvalidIntent(format!(
                "{} must be a positive percentage, got {}",
                label, v
            ))),
            _ => Ok(()),
        }
    }

    /// 占用持仓地址；已有 Submitted 请求或正在提交时拒绝
    /// Claim a position address; refused while a request on it is submitted or being submitted
    pub(crate) async fn claim_position(&self, position: &Pubkey) -> Result<PositionClaim<'_>> {
        let state = self.state.lock().await;
        let pending = state
            .users
            .values()
            .flat_map(|book| book.requests.values())
            .any(|r| r.status == RequestStatus::Submitted && &r.position_address == position);
        if pending || !lock_claims(&self.claims).insert(*position) {
            return Err(TradeError::RequestInFlight(format!(
                "position {} already has a pending request",
                position
            )));
        }
        drop(state);
        Ok(PositionClaim {
            claims: &self.claims,
            position: *position,
        })
    }

    fn signer_for(&self, user_id: &str) -> Result<SharedSigner> {
        self.keys.signer_for(user_id).ok_or_else(|| {
            TradeError::MissingPrerequisite(format!("no wallet configured for user {}", user_id))
        })
    }

    /// 开仓：校验、检查资金账户、构建、签名、提交、记录
    /// Open: validate, check the funding account, build, sign, submit, record
    pub async fn open_position(
        &self,
        user_id: &str,
        intent: &TradeIntent,
        take_profit_pct: Option<f64>,
        stop_loss_pct: Option<f64>,
    ) -> Result<TradeReceipt> {
        Self::check_user(user_id)?;
        Self::check_trigger_pct("take_profit_pct", take_profit_pct)?;
        Self::check_trigger_pct("stop_loss_pct", stop_loss_pct)?;
        let market = self.builder.validate_open(intent)?;

        let signer = self.signer_for(user_id)?;
        let owner = signer
            .try_pubkey()
            .map_err(|e| TradeError::Signing(e.to_string()))?;

        let collateral = registry::collateral_market(market, intent.side);
        let position_address =
            registry::derive_position_address(&owner, market, collateral, intent.side);
        let _claim = self.claim_position(&position_address).await?;

        let funding_account = registry::associated_token_address(&owner, &collateral.mint);
        self.endpoints()
            .check_account_exists(
                &funding_account,
                &format!("{} funding token account", collateral.symbol),
            )
            .await?;

        let signable = self.builder.build_open(&owner, intent).await?;
        self.submit_signed(user_id, signable, signer, take_profit_pct, stop_loss_pct)
            .await
    }

    /// 平仓（全部或部分）/ Close (entire or partial)
    pub async fn close_position(
        &self,
        user_id: &str,
        position: &PositionRef,
        close: &CloseIntent,
    ) -> Result<TradeReceipt> {
        Self::check_user(user_id)?;
        let market = registry::tradable_market(&position.market)?;

        let signer = self.signer_for(user_id)?;
        let owner = signer
            .try_pubkey()
            .map_err(|e| TradeError::Signing(e.to_string()))?;

        let collateral = registry::collateral_market(market, position.side);
        let position_address =
            registry::derive_position_address(&owner, market, collateral, position.side);
        let _claim = self.claim_position(&position_address).await?;

        // 全部平仓前先摘掉监控项，避免监控循环再发一次平仓
        // Take the monitored entry out before an entire close so the monitor cannot issue another
        let taken = if close.size_usd_delta.is_none() {
            self.take_monitored_for(user_id, &position_address).await?
        } else {
            Vec::new()
        };

        let result = self
            .close_with_signer(user_id, &owner, signer, position, &position_address, close)
            .await;

        // 出错意味着没有端点接收交易，持仓仍在链上 / An error means no endpoint accepted it
        if result.is_err() {
            self.reinsert_monitored(taken).await?;
        }
        result
    }

    async fn close_with_signer(
        &self,
        user_id: &str,
        owner: &Pubkey,
        signer: SharedSigner,
        position: &PositionRef,
        position_address: &Pubkey,
        close: &CloseIntent,
    ) -> Result<TradeReceipt> {
        self.endpoints()
            .check_account_exists(position_address, "position account")
            .await?;
        let signable = self.builder.build_close(owner, position, close).await?;
        self.submit_signed(user_id, signable, signer, None, None).await
    }

    /// 签名、提交并记录请求 / Sign, submit and record the request
    ///
    /// 端点接收交易后只会返回回执；之后的存储错误只记录日志。
    /// Once an endpoint accepts the transaction a receipt is always returned;
    /// later storage errors are only logged.
    async fn submit_signed(
        &self,
        user_id: &str,
        signable: SignableTransaction,
        signer: SharedSigner,
        take_profit_pct: Option<f64>,
        stop_loss_pct: Option<f64>,
    ) -> Result<TradeReceipt> {
        let accounts = &signable.accounts;
        let transaction = signable.sign(&*signer)?;

        let mut request = PendingRequest {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            owner: accounts.owner,
            market: signable.market.symbol.to_string(),
            side: accounts.side,
            kind: accounts.kind,
            counter: accounts.counter,
            position_address: accounts.position,
            request_address: accounts.position_request,
            signature: None,
            submitted_at: Utc::now(),
            status: RequestStatus::Submitted,
            polls: 0,
            baseline: None,
            error: None,
            take_profit_pct,
            stop_loss_pct,
            entry_price: signable.reference_price,
            size_usd: signable.size_usd,
            resolved_at: None,
        };

        // 计数器在发送前落盘，重启后不会复用 / Persist the counter before sending so a restart never reuses it
        let next = self.builder.counters().peek(&request.owner);
        self.storage.save_counter(&request.owner, next)?;

        if self.config.paper_mode {
            return self.simulate_signed(request, &transaction).await;
        }

        // 提交前记录持仓账户基线 / Capture the position account baseline before submitting
        request.baseline = self
            .endpoints()
            .read_account(&request.position_address)
            .await?
            .map(|account| account.fingerprint());

        match self.endpoints().submit(&transaction).await {
            Ok(signature) => {
                request.signature = Some(signature.to_string());
                info!(
                    "🚀 请求已提交 / Request submitted: user={} {} {} {} counter={} sig={}",
                    user_id, request.kind, request.market, request.side, request.counter, signature
                );
                let receipt = receipt_for(&request, signature.to_string());
                self.track(request).await;
                Ok(receipt)
            }
            Err(TradeError::RejectedOnChain(reason)) => {
                self.log_simulation(&transaction).await;
                self.record_failed(request, reason.clone()).await;
                Err(TradeError::RejectedOnChain(reason))
            }
            // 没有端点接收交易，不创建请求 / No endpoint accepted it: no request is recorded
            Err(other) => Err(other),
        }
    }

    /// 模拟盘：模拟代替广播，结果记为 Simulated
    /// Paper mode: simulate instead of broadcasting and record the request as Simulated
    async fn simulate_signed(
        &self,
        mut request: PendingRequest,
        transaction: &Transaction,
    ) -> Result<TradeReceipt> {
        let outcome = self.endpoints().simulate(transaction).await?;
        if let Some(err) = outcome.err {
            debug!("🔬 模拟日志 / Simulation logs: {:?}", outcome.logs);
            self.record_failed(request, err.clone()).await;
            return Err(TradeError::RejectedOnChain(err));
        }

        let signature = transaction
            .signatures
            .first()
            .map(|s| s.to_string())
            .unwrap_or_default();
        request.signature = Some(signature.clone());
        request.status = RequestStatus::Simulated;
        request.resolved_at = Some(Utc::now());
        info!(
            "📝 [PAPER] 模拟成功 / Simulated: user={} {} {} {} counter={} units={:?}",
            request.user_id,
            request.kind,
            request.market,
            request.side,
            request.counter,
            outcome.units_consumed
        );
        let receipt = receipt_for(&request, signature);
        self.track(request).await;
        Ok(receipt)
    }

    async fn record_failed(&self, mut request: PendingRequest, reason: String) {
        request.status = RequestStatus::Failed;
        request.error = Some(reason.clone());
        request.resolved_at = Some(Utc::now());
        let user_id = request.user_id.clone();
        let message = format!(
            "{} {} {} request rejected: {}",
            request.kind, request.market, request.side, reason
        );
        self.track(request).await;
        self.notifier
            .notify(
                &user_id,
                Notification::new(NotificationKind::RequestFailed, message),
            )
            .await;
    }

    /// 模拟只用于诊断 / Simulation is diagnostic only
    async fn log_simulation(&self, transaction: &Transaction) {
        match self.endpoints().simulate(transaction).await {
            Ok(outcome) => debug!(
                "🔬 模拟结果 / Simulation: err={:?} units={:?} logs={:?}",
                outcome.err, outcome.units_consumed, outcome.logs
            ),
            Err(e) => debug!("模拟失败 / Simulation unavailable: {}", e),
        }
    }

    /// 记录请求：内存一定写入，落盘失败只记日志
    /// Track a request: memory is always updated, a storage failure is only logged
    async fn track(&self, request: PendingRequest) {
        if let Err(e) = self.storage.save_request(&request) {
            error!(
                "❌ 请求落盘失败 / Failed to persist request {} ({}): {}",
                request.id, request.status, e
            );
        }
        let mut state = self.state.lock().await;
        state
            .book(&request.user_id)
            .requests
            .insert(request.id.clone(), request);
    }

    // ==================== 确认轮询 / Confirmation polling ====================

    /// 轮询所有 Submitted 请求 / Poll every submitted request
    pub async fn poll_pending(&self) -> Result<PollReport> {
        let submitted: Vec<PendingRequest> = {
            let state = self.state.lock().await;
            state
                .users
                .values()
                .flat_map(|book| book.requests.values())
                .filter(|r| r.status == RequestStatus::Submitted)
                .cloned()
                .collect()
        };

        let mut report = PollReport::default();
        for request in submitted {
            let current = match self.endpoints().read_account(&request.position_address).await {
                Ok(account) => account.map(|a| a.fingerprint()),
                Err(e) => {
                    // 网络不可用不算一次有效轮询 / An unreachable network does not count as a poll
                    warn!("⚠️ 轮询请求失败 / Poll failed for request {}: {}", request.id, e);
                    report.still_pending += 1;
                    continue;
                }
            };

            let outcome = self.apply_poll(&request, current).await?;
            match outcome {
                Some(RequestStatus::Confirmed) => report.confirmed += 1,
                Some(RequestStatus::Expired) => report.expired += 1,
                _ => report.still_pending += 1,
            }
        }

        if report.confirmed + report.expired > 0 {
            info!(
                "🔍 轮询完成 / Poll finished: confirmed={} expired={} pending={}",
                report.confirmed, report.expired, report.still_pending
            );
        }
        Ok(report)
    }

    /// 应用一次轮询观测；返回新的终态（如有）
    /// Apply one poll observation; returns the new terminal status, if any
    async fn apply_poll(
        &self,
        observed: &PendingRequest,
        current: Option<String>,
    ) -> Result<Option<RequestStatus>> {
        let mut notification = None;
        let transition = {
            let mut state = self.state.lock().await;
            let book = state.book(&observed.user_id);
            let Some(request) = book.requests.get_mut(&observed.id) else {
                return Ok(None);
            };
            if request.status.is_terminal() {
                return Ok(None);
            }

            request.polls = request.polls.saturating_add(1);
            let transition = if current != request.baseline {
                request.status = RequestStatus::Confirmed;
                request.resolved_at = Some(Utc::now());
                notification = Some(Notification::new(
                    NotificationKind::RequestConfirmed,
                    format!(
                        "{} {} {} request confirmed",
                        request.kind, request.market, request.side
                    ),
                ));
                Some(RequestStatus::Confirmed)
            } else if request.polls >= self.config.confirmation_cycles {
                request.status = RequestStatus::Expired;
                request.resolved_at = Some(Utc::now());
                request.error = Some(
                    TradeError::ConfirmationTimeout(format!(
                        "no position change after {} polls",
                        request.polls
                    ))
                    .to_string(),
                );
                notification = Some(Notification::new(
                    NotificationKind::RequestUnconfirmed,
                    format!(
                        "{} {} {} request unconfirmed: no confirmation yet, the keeper may still fill it",
                        request.kind, request.market, request.side
                    ),
                ));
                Some(RequestStatus::Expired)
            } else {
                None
            };

            let request = request.clone();
            self.storage.save_request(&request)?;

            if transition == Some(RequestStatus::Confirmed) {
                match request.kind {
                    RequestKind::Open => self.on_open_confirmed(book, &request)?,
                    RequestKind::Close => self.on_close_confirmed(book, &request)?,
                }
            }
            transition
        };

        if let Some(notification) = notification {
            self.notifier.notify(&observed.user_id, notification).await;
        }
        Ok(transition)
    }

    /// 开仓确认：创建或合并监控持仓 / Open confirmed: create or merge the monitored position
    fn on_open_confirmed(&self, book: &mut UserBook, request: &PendingRequest) -> Result<()> {
        let existing = book
            .monitored
            .values_mut()
            .find(|p| p.position_address == request.position_address);

        let position = match existing {
            Some(position) => {
                let total = position.size_usd + request.size_usd;
                if total > 0.0 {
                    position.entry_price = (position.entry_price * position.size_usd
                        + request.entry_price * request.size_usd)
                        / total;
                }
                position.size_usd = total;
                if request.take_profit_pct.is_some() {
                    position.take_profit_pct = request.take_profit_pct;
                }
                if request.stop_loss_pct.is_some() {
                    position.stop_loss_pct = request.stop_loss_pct;
                }
                position.clone()
            }
            None => {
                let position = MonitoredPosition {
                    id: Uuid::new_v4().to_string(),
                    user_id: request.user_id.clone(),
                    owner: request.owner,
                    market: request.market.clone(),
                    side: request.side,
                    position_address: request.position_address,
                    entry_price: request.entry_price,
                    size_usd: request.size_usd,
                    take_profit_pct: request.take_profit_pct,
                    stop_loss_pct: request.stop_loss_pct,
                    opened_at: Utc::now(),
                };
                book.monitored.insert(position.id.clone(), position.clone());
                position
            }
        };

        self.storage.save_monitored(&position)?;
        debug!(
            "👀 开始监控持仓 / Monitoring position {} {} {} entry={} tp={:?} sl={:?}",
            position.id,
            position.market,
            position.side,
            position.entry_price,
            position.take_profit_pct,
            position.stop_loss_pct
        );
        Ok(())
    }

    /// 平仓确认：全部平仓移除监控项，部分平仓缩减规模
    /// Close confirmed: entire close drops the entry, partial close shrinks it
    fn on_close_confirmed(&self, book: &mut UserBook, request: &PendingRequest) -> Result<()> {
        let ids: Vec<String> = book
            .monitored
            .values()
            .filter(|p| p.position_address == request.position_address)
            .map(|p| p.id.clone())
            .collect();

        for id in ids {
            let remove = match book.monitored.get_mut(&id) {
                Some(position) if request.size_usd > 0.0 && position.size_usd > request.size_usd => {
                    position.size_usd -= request.size_usd;
                    self.storage.save_monitored(position)?;
                    false
                }
                Some(_) => true,
                None => false,
            };
            if remove {
                book.monitored.remove(&id);
                self.storage.delete_monitored(&request.user_id, &id)?;
            }
        }
        Ok(())
    }

    // ==================== 监控项增删 / Monitored entry bookkeeping ====================

    /// 取出某个持仓地址的全部监控项（内存和存储都删除）
    /// Take every monitored entry for a position address out of memory and storage
    pub(crate) async fn take_monitored_for(
        &self,
        user_id: &str,
        position_address: &Pubkey,
    ) -> Result<Vec<MonitoredPosition>> {
        let mut state = self.state.lock().await;
        let book = state.book(user_id);
        let ids: Vec<String> = book
            .monitored
            .values()
            .filter(|p| &p.position_address == position_address)
            .map(|p| p.id.clone())
            .collect();

        let mut taken = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(position) = book.monitored.remove(&id) {
                self.storage.delete_monitored(user_id, &id)?;
                taken.push(position);
            }
        }
        Ok(taken)
    }

    /// 按 ID 取出监控项；已被别人取走时返回 None
    /// Take a monitored entry by id; None when someone else already took it
    pub(crate) async fn take_monitored(
        &self,
        user_id: &str,
        position_id: &str,
    ) -> Result<Option<MonitoredPosition>> {
        let mut state = self.state.lock().await;
        let taken = state.book(user_id).monitored.remove(position_id);
        if taken.is_some() {
            self.storage.delete_monitored(user_id, position_id)?;
        }
        Ok(taken)
    }

    pub(crate) async fn reinsert_monitored(&self, positions: Vec<MonitoredPosition>) -> Result<()> {
        if positions.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        for position in positions {
            self.storage.save_monitored(&position)?;
            state
                .book(&position.user_id)
                .monitored
                .insert(position.id.clone(), position);
        }
        Ok(())
    }

    /// 监控循环触发的全部平仓（监控项已被取出）
    /// Entire close issued by the monitor loop (the monitored entry is already taken)
    pub(crate) async fn close_taken_position(&self, position: &MonitoredPosition) -> Result<TradeReceipt> {
        let _claim = self.claim_position(&position.position_address).await?;
        let signer = self.signer_for(&position.user_id)?;
        let owner = signer
            .try_pubkey()
            .map_err(|e| TradeError::Signing(e.to_string()))?;
        if owner != position.owner {
            error!(
                "监控持仓的 owner 与用户钱包不一致 / Monitored owner differs from user wallet: {}",
                position.id
            );
            return Err(TradeError::Signing(format!(
                "wallet for {} no longer owns position {}",
                position.user_id, position.position_address
            )));
        }

        let position_ref = PositionRef {
            market: position.market.clone(),
            side: position.side,
        };
        let close = CloseIntent::entire(self.config.default_slippage_bps);
        self.close_with_signer(
            &position.user_id,
            &owner,
            signer,
            &position_ref,
            &position.position_address,
            &close,
        )
        .await
    }

    // ==================== 查询 / Queries ====================

    pub async fn pending_requests(&self, user_id: &str) -> Vec<PendingRequest> {
        let state = self.state.lock().await;
        let mut requests: Vec<PendingRequest> = state
            .users
            .get(user_id)
            .map(|book| book.requests.values().cloned().collect())
            .unwrap_or_default();
        requests.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        requests
    }

    pub async fn request(&self, user_id: &str, request_id: &str) -> Result<PendingRequest> {
        let state = self.state.lock().await;
        state
            .users
            .get(user_id)
            .and_then(|book| book.requests.get(request_id))
            .cloned()
            .ok_or_else(|| TradeError::NotFound(format!("request {}", request_id)))
    }

    pub async fn monitored_positions(&self, user_id: &str) -> Vec<MonitoredPosition> {
        let state = self.state.lock().await;
        let mut positions: Vec<MonitoredPosition> = state
            .users
            .get(user_id)
            .map(|book| book.monitored.values().cloned().collect())
            .unwrap_or_default();
        positions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        positions
    }

    /// 带当前价格与盈亏的持仓列表；价格不可用时对应字段为空
    /// Positions with current price and P&L; fields stay empty when a price is unavailable
    pub async fn position_summaries(&self, user_id: &str) -> Vec<PositionSummary> {
        let positions = self.monitored_positions(user_id).await;
        let mut prices: HashMap<String, Option<f64>> = HashMap::new();
        let mut summaries = Vec::with_capacity(positions.len());

        for position in positions {
            if !prices.contains_key(&position.market) {
                let price = self.prices().get_price(&position.market).await.ok();
                prices.insert(position.market.clone(), price);
            }
            let current_price = prices.get(&position.market).copied().flatten();
            let pnl_percent = current_price
                .map(|price| super::monitor::pnl_percent(position.side, position.entry_price, price));
            summaries.push(PositionSummary {
                position,
                current_price,
                pnl_percent,
            });
        }
        summaries
    }

    pub async fn price_alerts(&self, user_id: &str) -> Vec<PriceAlert> {
        let state = self.state.lock().await;
        let mut alerts: Vec<PriceAlert> = state
            .users
            .get(user_id)
            .map(|book| book.alerts.values().cloned().collect())
            .unwrap_or_default();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        alerts
    }

    // ==================== 变更 / Mutations ====================

    /// 设置止盈止损；None 表示保持不变
    /// Set TP/SL on a monitored position; None leaves a value unchanged
    pub async fn set_tp_sl(
        &self,
        user_id: &str,
        position: &PositionRef,
        take_profit_pct: Option<f64>,
        stop_loss_pct: Option<f64>,
    ) -> Result<MonitoredPosition> {
        Self::check_user(user_id)?;
        Self::check_trigger_pct("take_profit_pct", take_profit_pct)?;
        Self::check_trigger_pct("stop_loss_pct", stop_loss_pct)?;
        let market = registry::tradable_market(&position.market)?;

        let mut state = self.state.lock().await;
        let book = state.book(user_id);
        let monitored = book
            .monitored
            .values_mut()
            .find(|p| p.market == market.symbol && p.side == position.side)
            .ok_or_else(|| {
                TradeError::NotFound(format!(
                    "no monitored {} {} position for {}",
                    market.symbol, position.side, user_id
                ))
            })?;

        if take_profit_pct.is_some() {
            monitored.take_profit_pct = take_profit_pct;
        }
        if stop_loss_pct.is_some() {
            monitored.stop_loss_pct = stop_loss_pct;
        }
        self.storage.save_monitored(monitored)?;
        info!(
            "🎯 止盈止损已更新 / TP/SL updated: {} tp={:?} sl={:?}",
            monitored.id, monitored.take_profit_pct, monitored.stop_loss_pct
        );
        Ok(monitored.clone())
    }

    /// 清除止盈止损，持仓仍保留在监控列表中
    /// Clear TP/SL; the position stays in the monitored list
    pub async fn cancel_trigger(&self, user_id: &str, position_id: &str) -> Result<MonitoredPosition> {
        let mut state = self.state.lock().await;
        let monitored = state
            .book(user_id)
            .monitored
            .get_mut(position_id)
            .ok_or_else(|| TradeError::NotFound(format!("monitored position {}", position_id)))?;
        monitored.take_profit_pct = None;
        monitored.stop_loss_pct = None;
        self.storage.save_monitored(monitored)?;
        Ok(monitored.clone())
    }

    pub async fn add_price_alert(
        &self,
        user_id: &str,
        symbol: &str,
        target_price: f64,
        direction: AlertDirection,
    ) -> Result<PriceAlert> {
        Self::check_user(user_id)?;
        let market = registry::tradable_market(symbol)?;
        if !target_price.is_finite() || target_price <= 0.0 {
            return Err(TradeError::InvalidIntent(format!(
                "target price must be positive, got {}",
                target_price
            )));
        }

        let alert = PriceAlert {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            symbol: market.symbol.to_string(),
            target_price,
            direction,
            created_at: Utc::now(),
        };

        self.storage.save_alert(&alert)?;
        let mut state = self.state.lock().await;
        state.book(user_id).alerts.insert(alert.id.clone(), alert.clone());
        info!(
            "🔔 价格提醒已创建 / Price alert added: {} {} {:?} {}",
            user_id, alert.symbol, alert.direction, alert.target_price
        );
        Ok(alert)
    }

    pub async fn remove_price_alert(&self, user_id: &str, alert_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .book(user_id)
            .alerts
            .remove(alert_id)
            .ok_or_else(|| TradeError::NotFound(format!("price alert {}", alert_id)))?;
        self.storage.delete_alert(user_id, alert_id)?;
        Ok(())
    }

    /// 取出已触发的提醒 / Take a fired alert out
    pub(crate) async fn take_alert(&self, user_id: &str, alert_id: &str) -> Result<Option<PriceAlert>> {
        let mut state = self.state.lock().await;
        let taken = state.book(user_id).alerts.remove(alert_id);
        if taken.is_some() {
            self.storage.delete_alert(user_id, alert_id)?;
        }
        Ok(taken)
    }

    pub(crate) async fn snapshot_monitored(&self) -> Vec<MonitoredPosition> {
        let state = self.state.lock().await;
        state
            .users
            .values()
            .flat_map(|book| book.monitored.values().cloned())
            .collect()
    }

    pub(crate) async fn snapshot_alerts(&self) -> Vec<PriceAlert> {
        let state = self.state.lock().await;
        state
            .users
            .values()
            .flat_map(|book| book.alerts.values().cloned())
            .collect()
    }
}

fn receipt_for(request: &PendingRequest, signature: String) -> TradeReceipt {
    TradeReceipt {
        request_id: request.id.clone(),
        signature,
        market: request.market.clone(),
        side: request.side,
        kind: request.kind,
        counter: request.counter,
        position_address: request.position_address,
        request_address: request.request_address,
        status: request.status,
    }
}
