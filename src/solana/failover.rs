// 多端点故障转移客户端
// Multi-endpoint failover client

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature, transaction::Transaction};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::client::{AccountData, SolanaClient};
use crate::perps::errors::{Result, TradeError};

/// 单个端点调用的错误 / Error from a single endpoint call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// 端点级故障（超时、限流、5xx、节点落后），换下一个端点
    /// Endpoint-level failure (timeout, rate limit, 5xx, node behind); try the next endpoint
    #[error("transient: {0}")]
    Transient(String),

    /// 交易本身被拒绝，换端点也不会成功
    /// The transaction itself was rejected; another endpoint will not help
    #[error("rejected: {0}")]
    Rejected(String),
}

/// 模拟结果，仅作参考 / Simulation outcome, advisory only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

/// 单个 RPC 端点 / A single RPC endpoint
#[async_trait]
pub trait RpcEndpoint: Send + Sync {
    fn url(&self) -> &str;
    async fn is_healthy(&self) -> bool {
        true
    }
    async fn latest_blockhash(&self) -> std::result::Result<Hash, RpcError>;
    async fn get_account(
        &self,
        address: &Pubkey,
    ) -> std::result::Result<Option<AccountData>, RpcError>;
    async fn send_transaction(
        &self,
        transaction: &Transaction,
    ) -> std::result::Result<Signature, RpcError>;
    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
    ) -> std::result::Result<SimulationOutcome, RpcError>;
}

/// 有序端点列表上的故障转移 / Failover across an ordered endpoint list
///
/// 每次调用都从主端点开始最多遍历一圈：瞬时错误换下一个，拒绝立即返回，
/// 成功后不再访问后续端点。恢复后的主端点在下一次调用时重新优先。
/// Each call walks the list at most once starting from the primary endpoint,
/// so a recovered primary is preferred again on the next call.
pub struct EndpointFailoverClient {
    endpoints: Vec<Arc<dyn RpcEndpoint>>,
    retry_delay: Duration,
}

impl EndpointFailoverClient {
    pub fn new(endpoints: Vec<Arc<dyn RpcEndpoint>>, retry_delay: Duration) -> anyhow::Result<Self> {
        if endpoints.is_empty() {
            anyhow::bail!("at least one RPC endpoint is required");
        }
        Ok(Self {
            endpoints,
            retry_delay,
        })
    }

    /// 由配置中的 URL 列表创建 / Create from the configured URL list
    pub fn from_urls(
        urls: &[String],
        commitment: &str,
        timeout: Duration,
        retry_delay: Duration,
    ) -> anyhow::Result<Self> {
        let mut endpoints: Vec<Arc<dyn RpcEndpoint>> = Vec::with_capacity(urls.len());
        for url in urls {
            endpoints.push(Arc::new(SolanaClient::new(
                url.clone(),
                commitment.to_string(),
                timeout,
            )?));
        }
        info!("🌐 已配置 {} 个 RPC 端点 / Configured {} RPC endpoints", endpoints.len(), endpoints.len());
        Self::new(endpoints, retry_delay)
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub fn primary_url(&self) -> &str {
        self.endpoints[0].url()
    }

    /// 启动时探测各端点，只记录日志，不剔除端点
    /// Probe every endpoint at startup; unhealthy ones are logged, never removed
    pub async fn probe_endpoints(&self) -> usize {
        let mut healthy = 0;
        for endpoint in &self.endpoints {
            if endpoint.is_healthy().await {
                healthy += 1;
            } else {
                warn!("⚠️ 端点暂不可用 / Endpoint currently unavailable: {}", endpoint.url());
            }
        }
        info!(
            "🌐 端点探测完成 / Endpoint probe finished: {}/{} healthy",
            healthy,
            self.endpoints.len()
        );
        healthy
    }

    /// 故障转移主循环 / Failover core loop
    async fn with_failover<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Fn(Arc<dyn RpcEndpoint>) -> Fut,
        Fut: Future<Output = std::result::Result<T, RpcError>>,
    {
        let count = self.endpoints.len();
        let mut failures = Vec::with_capacity(count);

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            let endpoint = endpoint.clone();

            match call(endpoint.clone()).await {
                Ok(value) => {
                    if index != 0 {
                        info!(
                            "🔁 {} 切换到端点 / {} switched to endpoint: {}",
                            operation,
                            operation,
                            endpoint.url()
                        );
                    }
                    return Ok(value);
                }
                Err(RpcError::Rejected(reason)) => {
                    warn!("❌ {} 被拒绝 / {} rejected by {}: {}", operation, operation, endpoint.url(), reason);
                    return Err(TradeError::RejectedOnChain(reason));
                }
                Err(RpcError::Transient(reason)) => {
                    debug!("⚠️ {} 端点瞬时失败 / {} transient failure at {}: {}", operation, operation, endpoint.url(), reason);
                    failures.push(format!("{}: {}", endpoint.url(), reason));
                }
            }
        }

        warn!("🚫 {} 所有端点均失败 / {} failed on every endpoint", operation, operation);
        Err(TradeError::EndpointExhausted(format!(
            "{} failed on all {} endpoints: {}",
            operation,
            count,
            failures.join("; ")
        )))
    }

    /// 提交已签名交易 / Submit a signed transaction
    pub async fn submit(&self, transaction: &Transaction) -> Result<Signature> {
        let transaction = Arc::new(transaction.clone());
        self.with_failover("sendTransaction", |endpoint| {
            let transaction = transaction.clone();
            async move { endpoint.send_transaction(&transaction).await }
        })
        .await
    }

    /// 读取账户，不存在时返回 None / Read an account, None when absent
    pub async fn read_account(&self, address: &Pubkey) -> Result<Option<AccountData>> {
        let address = *address;
        self.with_failover("getAccountInfo", move |endpoint| async move {
            endpoint.get_account(&address).await
        })
        .await
    }

    /// 前置账户检查 / Prerequisite account check
    pub async fn check_account_exists(&self, address: &Pubkey, label: &str) -> Result<()> {
        match self.read_account(address).await? {
            Some(_) => Ok(()),
            None => Err(TradeError::MissingPrerequisite(format!(
                "{} {} does not exist",
                label, address
            ))),
        }
    }

    /// 获取最新 blockhash，整表失败时带抖动退避后再试，最多 rounds 轮
    /// Fetch a recent blockhash; whole-list failures back off with jitter, up to `rounds` rounds
    pub async fn latest_blockhash(&self, rounds: u32) -> Result<Hash> {
        let rounds = rounds.max(1);
        let mut last_error = None;

        for round in 0..rounds {
            match self
                .with_failover("getLatestBlockhash", |endpoint| async move {
                    endpoint.latest_blockhash().await
                })
                .await
            {
                Ok(hash) => return Ok(hash),
                Err(TradeError::EndpointExhausted(reason)) => {
                    last_error = Some(reason);
                    if round + 1 < rounds && !self.retry_delay.is_zero() {
                        let base = self.retry_delay.as_millis() as u64 * (1 << round.min(4));
                        let jitter = rand::thread_rng().gen_range(0..=base / 2);
                        tokio::time::sleep(Duration::from_millis(base + jitter)).await;
                    }
                }
                Err(other) => return Err(other),
            }
        }

        Err(TradeError::EndpointExhausted(format!(
            "no recent blockhash after {} rounds: {}",
            rounds,
            last_error.unwrap_or_default()
        )))
    }

    /// 模拟交易，仅用于诊断，不作为提交门槛
    /// Simulate a transaction; diagnostic only, never a submission gate
    pub async fn simulate(&self, transaction: &Transaction) -> Result<SimulationOutcome> {
        let transaction = Arc::new(transaction.clone());
        self.with_failover("simulateTransaction", |endpoint| {
            let transaction = transaction.clone();
            async move { endpoint.simulate_transaction(&transaction).await }
        })
        .await
    }
}
