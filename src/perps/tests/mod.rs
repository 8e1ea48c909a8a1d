// 请求编码测试模块
// Request encoding test module

use crate::perps::builder::{BuilderConfig, TransactionBuilder};
use crate::perps::registry::CounterSequence;
use crate::solana::failover::testing::{failover_over, ScriptedEndpoint};
use crate::tracker::price::testing::FixedPriceFeed;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

/// 固定测试 owner / Fixed test owner
pub fn golden_owner() -> Pubkey {
    Pubkey::new_from_array([7u8; 32])
}

/// 创建测试用交易构建器
/// Create a transaction builder over scripted endpoints
pub fn create_test_builder(
    endpoints: &[Arc<ScriptedEndpoint>],
    prices: FixedPriceFeed,
) -> TransactionBuilder {
    TransactionBuilder::new(
        BuilderConfig::default(),
        Arc::new(failover_over(endpoints)),
        Arc::new(prices),
        Arc::new(CounterSequence::new()),
    )
}

mod builder_test;
mod codec_test;
mod registry_test;
