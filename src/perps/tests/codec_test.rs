// 指令编码测试（固定字节与账户顺序）
// Instruction codec tests (pinned bytes and account order)

use super::golden_owner;
use crate::perps::codec::*;
use crate::perps::errors::TradeError;
use crate::perps::registry::{self, PERPETUALS_PROGRAM_ID};
use crate::perps::types::{RequestKind, Side};
use solana_sdk::{instruction::AccountMeta, pubkey::Pubkey, system_program};
use std::str::FromStr;

fn key(s: &str) -> Pubkey {
    Pubkey::from_str(s).unwrap()
}

fn sol_long_accounts(kind: RequestKind, counter: u64) -> registry::DerivedAccountSet {
    let sol = registry::market("SOL").unwrap();
    registry::derive_accounts(&golden_owner(), sol, Side::Long, kind, counter)
}

fn golden_open_params() -> OpenRequestParams {
    OpenRequestParams {
        size_usd_delta: 5_000_000,
        collateral_token_delta: 1_000_000,
        side: Side::Long,
        price_slippage: 100_000,
        jupiter_minimum_out: None,
        counter: 0,
    }
}

#[test]
fn test_discriminators_match_instruction_names() {
    let open = solana_sdk::hash::hash(format!("global:{}", OPEN_REQUEST_IX_NAME).as_bytes());
    let close = solana_sdk::hash::hash(format!("global:{}", CLOSE_REQUEST_IX_NAME).as_bytes());
    assert_eq!(&open.to_bytes()[..8], &OPEN_REQUEST_DISCRIMINATOR);
    assert_eq!(&close.to_bytes()[..8], &CLOSE_REQUEST_DISCRIMINATOR);
}

#[test]
fn test_open_request_golden_bytes() {
    let accounts = sol_long_accounts(RequestKind::Open, 0);
    let encoded = encode_open_request(&accounts, &golden_open_params()).unwrap();

    let mut expected = OPEN_REQUEST_DISCRIMINATOR.to_vec();
    expected.extend_from_slice(&[64, 75, 76, 0, 0, 0, 0, 0]); // size_usd_delta 5_000_000
    expected.extend_from_slice(&[64, 66, 15, 0, 0, 0, 0, 0]); // collateral 1_000_000
    expected.push(1); // Long
    expected.extend_from_slice(&[160, 134, 1, 0, 0, 0, 0, 0]); // price_slippage 100_000
    expected.push(0); // jupiter_minimum_out: None
    expected.extend_from_slice(&[0; 8]); // counter 0

    assert_eq!(encoded.data.len(), 42);
    assert_eq!(encoded.data, expected);
    assert_eq!(encoded.kind, RequestKind::Open);
}

#[test]
fn test_open_request_golden_accounts() {
    let accounts = sol_long_accounts(RequestKind::Open, 0);
    let encoded = encode_open_request(&accounts, &golden_open_params()).unwrap();

    let sol = registry::market("SOL").unwrap();
    let expected = vec![
        AccountMeta::new(key("US517G5965aydkZ46HS38QLi7UQiSojurfbQfKCELFx"), true),
        AccountMeta::new(key("Coz3LBGDD5czMN8CroEdxrDykE9CSnXBMyj7SZMwh82z"), false),
        AccountMeta::new_readonly(key("H4ND9aYttUVLFmNypZqLjZ52FYiGvdEB45GmwNoKEjTj"), false),
        AccountMeta::new_readonly(registry::JLP_POOL, false),
        AccountMeta::new(key("HV2yLUMki1gxWTgV3h6xGFnSk4XUfzF9LSiZqx2nKYAg"), false),
        AccountMeta::new(key("DU1t5r3CThHos7wKSsisGTVqWU1c3pGnPqTdW2KRYHo3"), false),
        AccountMeta::new(key("AF61PquUcr4yAyjyrjmfevh9z8kUMwSF7D3a99ecSGKq"), false),
        AccountMeta::new_readonly(sol.custody, false),
        AccountMeta::new_readonly(sol.custody, false),
        AccountMeta::new_readonly(sol.mint, false),
        AccountMeta::new_readonly(PERPETUALS_PROGRAM_ID, false),
        AccountMeta::new_readonly(registry::TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(registry::ASSOCIATED_TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(system_program::id(), false),
        AccountMeta::new_readonly(key("37hJBDnntwqhGbK7L6M1bLyvccj4u55CCUiLPdYkiqBN"), false),
        AccountMeta::new_readonly(PERPETUALS_PROGRAM_ID, false),
    ];

    assert_eq!(golden_owner(), key("US517G5965aydkZ46HS38QLi7UQiSojurfbQfKCELFx"));
    assert_eq!(encoded.accounts, expected);

    let instruction = encoded.into_instruction();
    assert_eq!(instruction.program_id, PERPETUALS_PROGRAM_ID);
    assert_eq!(instruction.accounts.len(), 16);
}

#[test]
fn test_close_entire_position_golden_bytes() {
    let accounts = sol_long_accounts(RequestKind::Close, 1);
    let params = CloseRequestParams {
        collateral_usd_delta: 0,
        size_usd_delta: 0,
        price_slippage: 100_000,
        jupiter_minimum_out: None,
        entire_position: Some(true),
        counter: 1,
    };
    let encoded = encode_close_request(&accounts, &params).unwrap();

    let mut expected = CLOSE_REQUEST_DISCRIMINATOR.to_vec();
    expected.extend_from_slice(&[0; 8]); // collateral_usd_delta
    expected.extend_from_slice(&[0; 8]); // size_usd_delta
    expected.extend_from_slice(&[160, 134, 1, 0, 0, 0, 0, 0]);
    expected.push(0); // jupiter_minimum_out: None
    expected.extend_from_slice(&[1, 1]); // entire_position: Some(true)
    expected.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);

    assert_eq!(encoded.data.len(), 43);
    assert_eq!(encoded.data, expected);

    // 平仓与开仓账户形状相同 / close shares the open account shape
    assert_eq!(encoded.accounts.len(), 16);
    assert_eq!(encoded.accounts[1].pubkey, key("Coz3LBGDD5czMN8CroEdxrDykE9CSnXBMyj7SZMwh82z"));
    assert_eq!(encoded.accounts[4].pubkey, key("HV2yLUMki1gxWTgV3h6xGFnSk4XUfzF9LSiZqx2nKYAg"));
    assert_eq!(encoded.accounts[5].pubkey, key("3DHWwCYBDLyo5RriavBDkZPqWtbpje1fSq9k3DjHBCGH"));
    assert_eq!(encoded.accounts[6].pubkey, key("HGPyVwPuXKfUx32cgURC7bFQnqw8h99MuYWEG14y35xA"));
    assert!(encoded.accounts[0].is_signer && encoded.accounts[0].is_writable);
    assert!(encoded.accounts[1..].iter().all(|m| !m.is_signer));
}

#[test]
fn test_short_side_encodes_as_two() {
    let sol = registry::market("SOL").unwrap();
    let accounts = registry::derive_accounts(&golden_owner(), sol, Side::Short, RequestKind::Open, 0);
    let params = OpenRequestParams {
        side: Side::Short,
        ..golden_open_params()
    };
    let encoded = encode_open_request(&accounts, &params).unwrap();
    assert_eq!(encoded.data[24], 2);
    assert_eq!(
        encoded.accounts[4].pubkey,
        key("BKYh51ZVs654ypwfG8QnbGNgekX4K2iAhrMxthmvkpjZ")
    );
}

#[test]
fn test_mismatched_inputs_are_encoding_errors() {
    // 账户集合按平仓推导，不能编码开仓 / close-derived accounts cannot encode an open
    let close_accounts = sol_long_accounts(RequestKind::Close, 0);
    assert!(matches!(
        encode_open_request(&close_accounts, &golden_open_params()),
        Err(TradeError::Encoding(_))
    ));

    // 计数器不一致 / counter mismatch
    let accounts = sol_long_accounts(RequestKind::Open, 5);
    assert!(matches!(
        encode_open_request(&accounts, &golden_open_params()),
        Err(TradeError::Encoding(_))
    ));

    // 方向不一致 / side mismatch
    let accounts = sol_long_accounts(RequestKind::Open, 0);
    let params = OpenRequestParams {
        side: Side::Short,
        ..golden_open_params()
    };
    assert!(matches!(
        encode_open_request(&accounts, &params),
        Err(TradeError::Encoding(_))
    ));

    // 未解析的账户 / unresolved account
    let mut accounts = sol_long_accounts(RequestKind::Open, 0);
    accounts.position_request_ata = Pubkey::default();
    assert!(matches!(
        encode_open_request(&accounts, &golden_open_params()),
        Err(TradeError::Encoding(_))
    ));

    // 部分平仓必须带数量 / partial close needs a size
    let accounts = sol_long_accounts(RequestKind::Close, 0);
    let params = CloseRequestParams {
        collateral_usd_delta: 0,
        size_usd_delta: 0,
        price_slippage: 100_000,
        jupiter_minimum_out: None,
        entire_position: None,
        counter: 0,
    };
    assert!(matches!(
        encode_close_request(&accounts, &params),
        Err(TradeError::Encoding(_))
    ));
}

#[test]
fn test_referral_replaces_program_placeholder() {
    let mut accounts = sol_long_accounts(RequestKind::Open, 0);
    let referral = Pubkey::new_unique();
    accounts.referral = Some(referral);
    let encoded = encode_open_request(&accounts, &golden_open_params()).unwrap();
    assert_eq!(encoded.accounts[10].pubkey, referral);
}
