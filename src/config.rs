use serde::Deserialize;
use anyhow::Result;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub solana: SolanaConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub price_feed: PriceFeedConfig,
    pub wallet: WalletConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub rocksdb_path: String,
}

/// Solana RPC 配置 / Solana RPC configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SolanaConfig {
    /// 按优先级排列的 RPC 端点 / RPC endpoints in priority order
    #[serde(default = "default_rpc_endpoints")]
    pub rpc_endpoints: Vec<String>,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 获取 blockhash 的最大轮数 / Max rounds when fetching a recent blockhash
    #[serde(default = "default_blockhash_attempts")]
    pub blockhash_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,
    #[serde(default = "default_compute_unit_price")]
    pub compute_unit_price_micro_lamports: u64,
}

/// 监控循环配置 / Monitoring loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// 无状态变化多少轮后判定为过期 / Polls without change before a request expires
    #[serde(default = "default_confirmation_cycles")]
    pub confirmation_cycles: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    #[serde(default = "default_slippage_bps")]
    pub default_slippage_bps: u16,
    #[serde(default = "default_min_leverage")]
    pub min_leverage: f64,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: f64,
    /// 模拟盘：只签名并模拟，不广播 / Paper mode: sign and simulate, never broadcast
    #[serde(default)]
    pub paper_mode: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PriceFeedConfig {
    #[serde(default = "default_price_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_price_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    /// 每个用户一个 keypair 文件: <dir>/<user_id>.json
    pub keypair_dir: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// 设置后额外写入按天滚动的日志文件 / Daily rolling log file directory
    pub file_dir: Option<String>,
}

fn default_rpc_endpoints() -> Vec<String> {
    vec![
        "https://api.mainnet-beta.solana.com".to_string(),
        "https://rpc.ankr.com/solana".to_string(),
        "https://solana-rpc.publicnode.com".to_string(),
    ]
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_blockhash_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_compute_unit_limit() -> u32 {
    200_000
}

fn default_compute_unit_price() -> u64 {
    50_000
}

fn default_interval_secs() -> u64 {
    30
}

fn default_confirmation_cycles() -> u32 {
    6
}

fn default_slippage_bps() -> u16 {
    100
}

fn default_min_leverage() -> f64 {
    1.1
}

fn default_max_leverage() -> f64 {
    100.0
}

fn default_price_endpoint() -> String {
    "https://api.jup.ag/price/v2".to_string()
}

fn default_price_timeout_secs() -> u64 {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            confirmation_cycles: default_confirmation_cycles(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            default_slippage_bps: default_slippage_bps(),
            min_leverage: default_min_leverage(),
            max_leverage: default_max_leverage(),
            paper_mode: false,
        }
    }
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            endpoint: default_price_endpoint(),
            timeout_secs: default_price_timeout_secs(),
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config"))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("solana.rpc_endpoints")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        if config.solana.rpc_endpoints.is_empty() {
            anyhow::bail!("solana.rpc_endpoints 不能为空 / solana.rpc_endpoints must not be empty");
        }
        Ok(config)
    }
}
