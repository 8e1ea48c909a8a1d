// 交易构建器测试 / Transaction builder tests

use super::{create_test_builder, golden_owner};
use crate::perps::codec::{CLOSE_REQUEST_DISCRIMINATOR, OPEN_REQUEST_DISCRIMINATOR};
use crate::perps::errors::TradeError;
use crate::perps::registry::{self, PERPETUALS_PROGRAM_ID};
use crate::perps::types::{CloseIntent, PositionRef, RequestKind, Side, TradeIntent};
use crate::solana::failover::testing::{Behavior, ScriptedEndpoint};
use crate::tracker::price::testing::FixedPriceFeed;
use solana_sdk::{
    compute_budget, hash::Hash, message::Message, pubkey::Pubkey, signature::Keypair,
    signer::Signer,
};

fn sol_long(collateral_amount: u64, leverage: f64) -> TradeIntent {
    TradeIntent {
        market: "SOL".to_string(),
        side: Side::Long,
        collateral_amount,
        leverage,
        max_slippage_bps: 100,
    }
}

fn program_of(message: &Message, index: usize) -> Pubkey {
    let instruction = &message.instructions[index];
    message.account_keys[instruction.program_id_index as usize]
}

fn u64_at(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

#[tokio::test]
async fn test_open_prepends_compute_budget_and_converts_prices() {
    let endpoint = ScriptedEndpoint::healthy("primary");
    let builder = create_test_builder(
        &[endpoint.clone()],
        FixedPriceFeed::new().with("SOL", 100.0),
    );
    let owner = golden_owner();

    // 1 SOL x 5 @ $100 = $500
    let signable = builder
        .build_open(&owner, &sol_long(1_000_000_000, 5.0))
        .await
        .unwrap();

    let message = &signable.message;
    assert_eq!(message.instructions.len(), 3);
    assert_eq!(program_of(message, 0), compute_budget::id());
    assert_eq!(program_of(message, 1), compute_budget::id());
    assert_eq!(program_of(message, 2), PERPETUALS_PROGRAM_ID);
    assert_eq!(message.account_keys[0], owner, "owner pays fees");
    assert_eq!(signable.recent_blockhash, Hash::new_from_array([9; 32]));

    let data = &message.instructions[2].data;
    assert_eq!(&data[..8], &OPEN_REQUEST_DISCRIMINATOR);
    assert_eq!(u64_at(data, 8), 500_000_000); // size_usd_delta
    assert_eq!(u64_at(data, 16), 1_000_000_000); // collateral
    assert_eq!(data[24], 1);
    assert_eq!(u64_at(data, 25), 101_000_000); // $100 + 1%
    assert_eq!(signable.counter(), 0);
    assert_eq!(signable.kind(), RequestKind::Open);
    assert!((signable.size_usd - 500.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_each_build_consumes_a_counter() {
    let endpoint = ScriptedEndpoint::healthy("primary");
    let builder = create_test_builder(&[endpoint], FixedPriceFeed::new().with("SOL", 100.0));
    let owner = golden_owner();

    let first = builder.build_open(&owner, &sol_long(1_000_000_000, 2.0)).await.unwrap();
    let second = builder.build_open(&owner, &sol_long(1_000_000_000, 2.0)).await.unwrap();

    assert_eq!(first.counter(), 0);
    assert_eq!(second.counter(), 1);
    assert_ne!(first.accounts.position_request, second.accounts.position_request);
    assert_eq!(first.accounts.position, second.accounts.position);
    assert_eq!(builder.counters().peek(&owner), 2);
}

#[tokio::test]
async fn test_close_references_the_opened_position() {
    let endpoint = ScriptedEndpoint::healthy("primary");
    let builder = create_test_builder(&[endpoint], FixedPriceFeed::new().with("ETH", 2_000.0));
    let owner = golden_owner();
    let intent = TradeIntent {
        market: "eth".to_string(),
        side: Side::Short,
        collateral_amount: 100_000_000, // 100 USDC
        leverage: 3.0,
        max_slippage_bps: 50,
    };

    let open = builder.build_open(&owner, &intent).await.unwrap();
    let close = builder
        .build_close(
            &owner,
            &PositionRef {
                market: "ETH".to_string(),
                side: Side::Short,
            },
            &CloseIntent::entire(50),
        )
        .await
        .unwrap();

    assert_eq!(open.accounts.position, close.accounts.position);
    assert_eq!(open.accounts.custody, close.accounts.custody);
    assert_eq!(open.accounts.collateral_custody, close.accounts.collateral_custody);
    assert_eq!(open.accounts.collateral_mint, registry::market("USDC").unwrap().mint);
    assert_eq!(close.kind(), RequestKind::Close);

    // 空头开仓向下放宽、平仓向上放宽 / short open widens down, short close widens up
    let open_data = &open.message.instructions[2].data;
    assert_eq!(u64_at(open_data, 8), 300_000_000); // 100 USDC x 3
    assert_eq!(u64_at(open_data, 25), 1_990_000_000);

    let close_data = &close.message.instructions[2].data;
    assert_eq!(&close_data[..8], &CLOSE_REQUEST_DISCRIMINATOR);
    assert_eq!(u64_at(close_data, 24), 2_010_000_000);
    assert_eq!(&close_data[33..35], &[1, 1]); // entire_position: Some(true)
    assert_eq!(u64_at(close_data, 35), 1);
}

#[tokio::test]
async fn test_invalid_intents_never_touch_the_network() {
    let endpoint = ScriptedEndpoint::healthy("primary");
    let builder = create_test_builder(
        &[endpoint.clone()],
        FixedPriceFeed::new().with("SOL", 100.0),
    );
    let owner = golden_owner();

    let cases = vec![
        TradeIntent {
            market: "DOGE".to_string(),
            ..sol_long(1, 2.0)
        },
        TradeIntent {
            market: "USDC".to_string(),
            ..sol_long(1, 2.0)
        },
        sol_long(0, 2.0),
        sol_long(1_000, 1.0),
        sol_long(1_000, 150.0),
        sol_long(1_000, f64::NAN),
        TradeIntent {
            max_slippage_bps: 0,
            ..sol_long(1_000, 2.0)
        },
    ];

    for intent in cases {
        let err = builder.build_open(&owner, &intent).await.unwrap_err();
        assert!(matches!(err, TradeError::InvalidIntent(_)), "{:?}", intent);
    }
    assert_eq!(endpoint.calls(), 0);
    assert_eq!(builder.counters().peek(&owner), 0);
}

#[tokio::test]
async fn test_blockhash_exhaustion_is_reported() {
    let a = ScriptedEndpoint::new("a", Behavior::Transient);
    let b = ScriptedEndpoint::new("b", Behavior::Transient);
    let builder = create_test_builder(&[a, b], FixedPriceFeed::new().with("SOL", 100.0));

    let err = builder
        .build_open(&golden_owner(), &sol_long(1_000_000_000, 2.0))
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::EndpointExhausted(_)));
}

#[tokio::test]
async fn test_missing_price_is_price_unavailable() {
    let endpoint = ScriptedEndpoint::healthy("primary");
    let builder = create_test_builder(&[endpoint], FixedPriceFeed::new());

    let err = builder
        .build_open(&golden_owner(), &sol_long(1_000_000_000, 2.0))
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::PriceUnavailable { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_sign_requires_the_owner_key() {
    let endpoint = ScriptedEndpoint::healthy("primary");
    let builder = create_test_builder(&[endpoint], FixedPriceFeed::new().with("SOL", 100.0));
    let wallet = Keypair::new();

    let signable = builder
        .build_open(&wallet.pubkey(), &sol_long(1_000_000_000, 2.0))
        .await
        .unwrap();

    let stranger = Keypair::new();
    assert!(matches!(
        signable.sign(&stranger),
        Err(TradeError::Signing(_))
    ));

    let transaction = signable.sign(&wallet).unwrap();
    assert!(transaction.verify().is_ok());
    assert_eq!(transaction.message.recent_blockhash, Hash::new_from_array([9; 32]));
}
