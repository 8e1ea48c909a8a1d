// Solana客户端模块 / Solana client module
use async_trait::async_trait;
use base64::engine::{general_purpose::STANDARD as BASE64_STANDARD, Engine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature, transaction::Transaction};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

use super::failover::{RpcEndpoint, RpcError, SimulationOutcome};

/// Solana RPC客户端 / Solana RPC client
pub struct SolanaClient {
    rpc_url: String,
    commitment: String,
    client: Client,
    id: AtomicU64,
}

impl SolanaClient {
    /// 创建新的Solana客户端 / Create new Solana client
    pub fn new(rpc_url: String, commitment: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            rpc_url,
            commitment,
            client,
            id: AtomicU64::new(1),
        })
    }

    /// 检查RPC连接 / Check RPC connection
    pub async fn check_connection(&self) -> bool {
        info!("检查Solana RPC连接 / Checking Solana RPC connection: {}", self.rpc_url);

        match self.call("getHealth", json!([])).await {
            Ok(_) => {
                info!("✅ Solana RPC连接正常 / Solana RPC connection is healthy: {}", self.rpc_url);
                true
            }
            Err(e) => {
                error!("Solana RPC不可用 / Solana RPC unavailable: {} ({})", self.rpc_url, e);
                false
            }
        }
    }

    /// 发送 JSON-RPC 请求并区分瞬时错误与拒绝
    /// Send a JSON-RPC request, classifying transient failures and rejections
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transient(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            // 429 / 5xx 以及其他端点级 HTTP 错误都换下一个端点
            // 429, 5xx and other endpoint-level HTTP errors move on to the next endpoint
            let reason = if status == StatusCode::TOO_MANY_REQUESTS {
                "rate limited".to_string()
            } else {
                format!("HTTP status {}", status)
            };
            return Err(RpcError::Transient(format!("{}: {}", method, reason)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Transient(format!("{} invalid JSON body: {}", method, e)))?;

        if let Some(error) = body.get("error") {
            return Err(classify_rpc_error(method, error));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| RpcError::Transient(format!("{}: no result field in response", method)))
    }

    fn encode_transaction(transaction: &Transaction) -> Result<String, RpcError> {
        let bytes = bincode::serialize(transaction)
            .map_err(|e| RpcError::Rejected(format!("transaction serialization failed: {}", e)))?;
        Ok(BASE64_STANDARD.encode(bytes))
    }
}

/// JSON-RPC 错误分类 / JSON-RPC error classification
///
/// -32002 预检失败、-32003 签名校验失败、-32602 参数无效是交易本身的问题；
/// 其余（-32005 节点落后、-32004/-32007 slot 跳过、-32603 内部错误等）视为瞬时。
/// 预检报告 BlockhashNotFound 时说明该节点落后，换端点重试。
/// A preflight BlockhashNotFound means this node is lagging; the next endpoint may accept it.
pub fn classify_rpc_error(method: &str, error: &Value) -> RpcError {
    let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown error");
    let detail = format!("{} error {}: {}", method, code, message);

    match code {
        -32002 if is_blockhash_not_found(error, message) => RpcError::Transient(detail),
        -32002 | -32003 | -32602 => RpcError::Rejected(detail),
        _ => RpcError::Transient(detail),
    }
}

fn is_blockhash_not_found(error: &Value, message: &str) -> bool {
    let data_err = error
        .get("data")
        .and_then(|d| d.get("err"))
        .and_then(|e| e.as_str());
    data_err == Some("BlockhashNotFound") || message.contains("Blockhash not found")
}

#[async_trait]
impl RpcEndpoint for SolanaClient {
    fn url(&self) -> &str {
        &self.rpc_url
    }

    async fn is_healthy(&self) -> bool {
        self.check_connection().await
    }

    /// 获取最新 blockhash / Get latest blockhash
    async fn latest_blockhash(&self) -> Result<Hash, RpcError> {
        let result = self
            .call("getLatestBlockhash", json!([{ "commitment": self.commitment }]))
            .await?;

        let blockhash = result
            .get("value")
            .and_then(|v| v.get("blockhash"))
            .and_then(|b| b.as_str())
            .ok_or_else(|| RpcError::Transient("getLatestBlockhash: missing blockhash".to_string()))?;

        Hash::from_str(blockhash)
            .map_err(|e| RpcError::Transient(format!("getLatestBlockhash: bad blockhash: {}", e)))
    }

    /// 获取账户数据 / Get account data
    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>, RpcError> {
        let result = self
            .call(
                "getAccountInfo",
                json!([
                    address.to_string(),
                    { "encoding": "base64", "commitment": self.commitment }
                ]),
            )
            .await?;

        let value = match result.get("value") {
            Some(Value::Null) | None => return Ok(None),
            Some(value) => value,
        };

        let raw: RawAccountInfo = serde_json::from_value(value.clone())
            .map_err(|e| RpcError::Transient(format!("getAccountInfo: bad account: {}", e)))?;
        let encoded = raw.data.first().map(String::as_str).unwrap_or_default();
        let data = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| RpcError::Transient(format!("getAccountInfo: bad base64: {}", e)))?;

        Ok(Some(AccountData {
            lamports: raw.lamports,
            owner: raw.owner,
            executable: raw.executable,
            data,
        }))
    }

    /// 发送交易 / Send transaction
    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, RpcError> {
        let encoded = Self::encode_transaction(transaction)?;
        let result = self
            .call(
                "sendTransaction",
                json!([
                    encoded,
                    {
                        "encoding": "base64",
                        "skipPreflight": false,
                        "preflightCommitment": self.commitment
                    }
                ]),
            )
            .await?;

        let signature = result
            .as_str()
            .ok_or_else(|| RpcError::Transient("sendTransaction: missing signature".to_string()))?;
        debug!("交易已提交 / Transaction submitted: {}", signature);

        Signature::from_str(signature)
            .map_err(|e| RpcError::Transient(format!("sendTransaction: bad signature: {}", e)))
    }

    /// 模拟交易 / Simulate transaction
    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<SimulationOutcome, RpcError> {
        let encoded = Self::encode_transaction(transaction)?;
        let result = self
            .call(
                "simulateTransaction",
                json!([
                    encoded,
                    {
                        "encoding": "base64",
                        "sigVerify": false,
                        "commitment": self.commitment
                    }
                ]),
            )
            .await?;

        let value = result.get("value").cloned().unwrap_or(Value::Null);
        let err = match value.get("err") {
            Some(Value::Null) | None => None,
            Some(err) => Some(err.to_string()),
        };
        let logs = value
            .get("logs")
            .and_then(|l| l.as_array())
            .map(|logs| {
                logs.iter()
                    .filter_map(|l| l.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();
        let units_consumed = value.get("unitsConsumed").and_then(|u| u.as_u64());

        Ok(SimulationOutcome {
            err,
            logs,
            units_consumed,
        })
    }
}

/// getAccountInfo 原始返回 / Raw getAccountInfo value
#[derive(Debug, Clone, Deserialize)]
struct RawAccountInfo {
    data: Vec<String>,
    executable: bool,
    lamports: u64,
    owner: String,
}

/// 账户数据结构 / Account data structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    pub lamports: u64,
    pub owner: String,
    pub executable: bool,
    pub data: Vec<u8>,
}

impl AccountData {
    /// 账户状态指纹，用于检测持仓账户是否被修改
    /// State fingerprint used to detect position account mutations
    pub fn fingerprint(&self) -> String {
        solana_sdk::hash::hashv(&[&self.lamports.to_le_bytes(), self.owner.as_bytes(), &self.data])
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_failures_are_rejections() {
        let error = json!({"code": -32002, "message": "Transaction simulation failed"});
        assert!(matches!(
            classify_rpc_error("sendTransaction", &error),
            RpcError::Rejected(_)
        ));
    }

    #[test]
    fn test_preflight_blockhash_not_found_is_transient() {
        let error = json!({
            "code": -32002,
            "message": "Transaction simulation failed: Blockhash not found",
            "data": { "err": "BlockhashNotFound", "logs": [] }
        });
        assert!(matches!(
            classify_rpc_error("sendTransaction", &error),
            RpcError::Transient(_)
        ));

        let by_data_only = json!({
            "code": -32002,
            "message": "Transaction simulation failed",
            "data": { "err": "BlockhashNotFound" }
        });
        assert!(matches!(
            classify_rpc_error("sendTransaction", &by_data_only),
            RpcError::Transient(_)
        ));
    }

    #[test]
    fn test_node_lag_is_transient() {
        let error = json!({"code": -32005, "message": "Node is behind by 42 slots"});
        let classified = classify_rpc_error("getAccountInfo", &error);
        assert!(matches!(classified, RpcError::Transient(ref msg) if msg.contains("-32005")));
    }

    #[test]
    fn test_fingerprint_tracks_lamports_and_data() {
        let account = AccountData {
            lamports: 10,
            owner: "owner".to_string(),
            executable: false,
            data: vec![1, 2, 3],
        };
        let mut changed = account.clone();
        changed.data[0] = 9;

        assert_eq!(account.fingerprint(), account.clone().fingerprint());
        assert_ne!(account.fingerprint(), changed.fingerprint());
    }
}
