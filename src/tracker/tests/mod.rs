// 生命周期跟踪测试模块
// Lifecycle tracker test module

use crate::db::RocksDbStorage;
use crate::perps::builder::{BuilderConfig, TransactionBuilder};
use crate::perps::registry::{self, CounterSequence};
use crate::perps::signer::{MemoryKeyStore, SharedSigner};
use crate::perps::types::{Side, TradeIntent};
use crate::solana::failover::testing::{failover_over, test_account, ScriptedEndpoint};
use crate::tracker::lifecycle::{PositionLifecycleTracker, TrackerConfig};
use crate::tracker::notify::testing::RecordingNotifier;
use crate::tracker::price::testing::FixedPriceFeed;
use crate::tracker::types::NotificationKind;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::sync::Arc;
use uuid::Uuid;

pub const USER: &str = "alice";

/// 测试环境：假端点 + 固定价格 + 记录型通知 + 临时 RocksDB
/// Test harness: scripted endpoint, fixed prices, recording notifier and a temp RocksDB
pub struct TestHarness {
    pub tracker: Arc<PositionLifecycleTracker>,
    pub endpoint: Arc<ScriptedEndpoint>,
    pub prices: Arc<FixedPriceFeed>,
    pub notifier: Arc<RecordingNotifier>,
    pub keys: Arc<MemoryKeyStore>,
    pub wallet: Arc<Keypair>,
    pub db: Arc<RocksDbStorage>,
    pub db_path: String,
    config: TrackerConfig,
}

impl TestHarness {
    pub fn owner(&self) -> Pubkey {
        self.wallet.pubkey()
    }

    /// 模拟 keeper 执行：写入/修改持仓账户
    /// Simulate a keeper fill by writing or mutating the position account
    pub fn fill_position(&self, side: Side, lamports: u64) -> Pubkey {
        let position = position_address(&self.owner(), "SOL", side);
        self.endpoint
            .set_account(position, test_account(lamports, vec![1, 2, 3]));
        position
    }

    pub fn notifications(&self, kind: NotificationKind) -> Vec<String> {
        self.notifier
            .sent()
            .into_iter()
            .filter(|(_, n)| n.kind == kind)
            .map(|(_, n)| n.message)
            .collect()
    }

    /// 用同一个数据库重新创建跟踪器（模拟重启）
    /// Rebuild the tracker over the same database (simulated restart)
    pub fn restart(&self) -> Arc<PositionLifecycleTracker> {
        build_tracker(
            self.config.clone(),
            &self.endpoint,
            self.prices.clone(),
            self.notifier.clone(),
            self.keys.clone(),
            &self.db,
        )
    }

    pub fn cleanup(self) {
        let path = self.db_path.clone();
        drop(self);
        cleanup_test_db(&path);
    }
}

fn build_tracker(
    config: TrackerConfig,
    endpoint: &Arc<ScriptedEndpoint>,
    prices: Arc<FixedPriceFeed>,
    notifier: Arc<RecordingNotifier>,
    keys: Arc<MemoryKeyStore>,
    db: &RocksDbStorage,
) -> Arc<PositionLifecycleTracker> {
    let builder = TransactionBuilder::new(
        BuilderConfig::default(),
        Arc::new(failover_over(&[endpoint.clone()])),
        prices,
        Arc::new(CounterSequence::new()),
    );
    Arc::new(PositionLifecycleTracker::new(
        config,
        Arc::new(builder),
        keys,
        notifier,
        db.create_tracker_storage(),
    ))
}

/// 创建测试环境；用户 alice 拥有钱包和 SOL/USDC 资金账户
/// Create a harness; user alice has a wallet plus SOL and USDC funding accounts
pub fn create_test_harness() -> TestHarness {
    harness_with(TrackerConfig {
        confirmation_cycles: 3,
        default_slippage_bps: 100,
        paper_mode: false,
    })
}

/// 模拟盘环境 / Paper-mode harness
pub fn create_paper_harness() -> TestHarness {
    harness_with(TrackerConfig {
        confirmation_cycles: 3,
        default_slippage_bps: 100,
        paper_mode: true,
    })
}

fn harness_with(config: TrackerConfig) -> TestHarness {
    let db_path = std::env::temp_dir()
        .join(format!("tracker_test_{}", Uuid::new_v4()))
        .to_string_lossy()
        .to_string();
    let db = Arc::new(RocksDbStorage::open(&db_path).expect("Failed to open test DB"));

    let endpoint = ScriptedEndpoint::healthy("primary");
    let prices = Arc::new(FixedPriceFeed::new().with("SOL", 100.0));
    let notifier = Arc::new(RecordingNotifier::new());
    let wallet = Arc::new(Keypair::new());
    let keys = Arc::new(MemoryKeyStore::new());
    keys.insert(USER, wallet.clone() as SharedSigner);

    for symbol in ["SOL", "USDC"] {
        let mint = registry::market(symbol).unwrap().mint;
        endpoint.set_account(
            registry::associated_token_address(&wallet.pubkey(), &mint),
            test_account(2_039_280, vec![0; 165]),
        );
    }

    let tracker = build_tracker(
        config.clone(),
        &endpoint,
        prices.clone(),
        notifier.clone(),
        keys.clone(),
        &db,
    );

    TestHarness {
        tracker,
        endpoint,
        prices,
        notifier,
        keys,
        wallet,
        db,
        db_path,
        config,
    }
}

/// 清理临时测试数据库
/// Clean up temporary test database
pub fn cleanup_test_db(path: &str) {
    let _ = std::fs::remove_dir_all(path);
}

pub fn position_address(owner: &Pubkey, symbol: &str, side: Side) -> Pubkey {
    let market = registry::market(symbol).unwrap();
    let collateral = registry::collateral_market(market, side);
    registry::derive_position_address(owner, market, collateral, side)
}

/// 1 SOL x 5 多单 / 1 SOL x5 long
pub fn sol_long() -> TradeIntent {
    TradeIntent {
        market: "SOL".to_string(),
        side: Side::Long,
        collateral_amount: 1_000_000_000,
        leverage: 5.0,
        max_slippage_bps: 100,
    }
}
