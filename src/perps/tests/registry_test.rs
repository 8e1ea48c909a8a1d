// 地址注册表测试 / Address registry tests

use super::golden_owner;
use crate::perps::errors::TradeError;
use crate::perps::registry::*;
use crate::perps::types::{RequestKind, Side};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

fn key(s: &str) -> Pubkey {
    Pubkey::from_str(s).unwrap()
}

#[test]
fn test_program_level_accounts() {
    assert_eq!(
        perpetuals_address(),
        key("H4ND9aYttUVLFmNypZqLjZ52FYiGvdEB45GmwNoKEjTj")
    );
    assert_eq!(
        event_authority_address(),
        key("37hJBDnntwqhGbK7L6M1bLyvccj4u55CCUiLPdYkiqBN")
    );
}

#[test]
fn test_market_lookup_normalizes_symbols() {
    assert_eq!(market("sol").unwrap().symbol, "SOL");
    assert_eq!(market(" SOL-PERP ").unwrap().symbol, "SOL");
    assert_eq!(market("btc").unwrap().decimals, 8);

    assert!(matches!(market("DOGE"), Err(TradeError::InvalidIntent(_))));
    assert!(matches!(
        tradable_market("USDC"),
        Err(TradeError::InvalidIntent(_))
    ));
}

#[test]
fn test_collateral_follows_side() {
    let sol = market("SOL").unwrap();
    assert_eq!(collateral_market(sol, Side::Long).symbol, "SOL");
    assert_eq!(collateral_market(sol, Side::Short).symbol, "USDC");
}

#[test]
fn test_position_derivation_is_deterministic() {
    let owner = golden_owner();
    let sol = market("SOL").unwrap();

    let first = derive_position_address(&owner, sol, sol, Side::Long);
    let second = derive_position_address(&owner, sol, sol, Side::Long);
    assert_eq!(first, second);
    assert_eq!(first, key("HV2yLUMki1gxWTgV3h6xGFnSk4XUfzF9LSiZqx2nKYAg"));

    let usdc = market("USDC").unwrap();
    assert_eq!(
        derive_position_address(&owner, sol, usdc, Side::Short),
        key("BKYh51ZVs654ypwfG8QnbGNgekX4K2iAhrMxthmvkpjZ")
    );
}

#[test]
fn test_request_address_varies_with_counter_and_kind() {
    let owner = golden_owner();
    let sol = market("SOL").unwrap();
    let position = derive_position_address(&owner, sol, sol, Side::Long);

    let open0 = derive_request_address(&position, 0, RequestKind::Open);
    let open1 = derive_request_address(&position, 1, RequestKind::Open);
    let close1 = derive_request_address(&position, 1, RequestKind::Close);

    assert_eq!(open0, key("DU1t5r3CThHos7wKSsisGTVqWU1c3pGnPqTdW2KRYHo3"));
    assert_eq!(close1, key("3DHWwCYBDLyo5RriavBDkZPqWtbpje1fSq9k3DjHBCGH"));
    assert_ne!(open0, open1);
    assert_ne!(open1, close1);
}

#[test]
fn test_derive_accounts_for_short_uses_stable_collateral() {
    let owner = golden_owner();
    let sol = market("SOL").unwrap();
    let usdc = market("USDC").unwrap();

    let accounts = derive_accounts(&owner, sol, Side::Short, RequestKind::Open, 3);
    assert_eq!(accounts.custody, sol.custody);
    assert_eq!(accounts.collateral_custody, usdc.custody);
    assert_eq!(accounts.collateral_mint, usdc.mint);
    assert_eq!(
        accounts.user_token_account,
        associated_token_address(&owner, &usdc.mint)
    );
    assert_eq!(
        accounts.position_request,
        derive_request_address(&accounts.position, 3, RequestKind::Open)
    );
}

#[test]
fn test_counter_sequence_is_monotonic_per_owner() {
    let counters = CounterSequence::new();
    let a = Pubkey::new_unique();
    let b = Pubkey::new_unique();

    assert_eq!(counters.next(&a), 0);
    assert_eq!(counters.next(&a), 1);
    assert_eq!(counters.next(&b), 0);
    assert_eq!(counters.peek(&a), 2);

    // 恢复只会向前 / restore only moves forward
    counters.restore(&a, 1);
    assert_eq!(counters.next(&a), 2);
    counters.restore(&a, 10);
    assert_eq!(counters.next(&a), 10);

    let mut snapshot = counters.snapshot();
    snapshot.sort_by_key(|(_, next)| *next);
    assert_eq!(snapshot, vec![(b, 1), (a, 11)]);
}
