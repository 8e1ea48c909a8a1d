// 地址注册表 - 程序常量、市场表和 PDA 推导
// Address registry - program constants, market table and PDA derivation

use solana_sdk::{pubkey, pubkey::Pubkey, system_program};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock};

use super::errors::{Result, TradeError};
use super::types::{RequestKind, Side};

/// Jupiter Perpetuals 程序 ID / Jupiter Perpetuals program id
pub const PERPETUALS_PROGRAM_ID: Pubkey = pubkey!("PERPHjGBqRHArX4DySjwM6UJHiR3sWAatqfdBS2qQJu");
/// JLP 资金池 / JLP pool
pub const JLP_POOL: Pubkey = pubkey!("5BUwFW4nRbftYTDMbgxykoFWqWHPzahFSNAaaaJtVKsq");
pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

pub const PERPETUALS_SEED: &[u8] = b"perpetuals";
pub const EVENT_AUTHORITY_SEED: &[u8] = b"__event_authority";
pub const POSITION_SEED: &[u8] = b"position";
pub const POSITION_REQUEST_SEED: &[u8] = b"position_request";

/// 空头统一使用的稳定币抵押 / Stable collateral used by every short
pub const STABLE_COLLATERAL_SYMBOL: &str = "USDC";

/// 市场（托管账户）定义 / Market (custody) definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    pub symbol: &'static str,
    pub mint: Pubkey,
    pub decimals: u8,
    pub custody: Pubkey,
    /// 可开仓的市场；稳定币托管只能作为抵押品
    /// Tradable market; stable custodies only serve as collateral
    pub tradable: bool,
}

impl Market {
    pub fn is_stable(&self) -> bool {
        !self.tradable
    }
}

pub static MARKETS: [Market; 5] = [
    Market {
        symbol: "SOL",
        mint: pubkey!("So11111111111111111111111111111111111111112"),
        decimals: 9,
        custody: pubkey!("7xS2gz2bTp3fwCC7knJvUWTEU9Tycczu6VhJYKgi1wdz"),
        tradable: true,
    },
    Market {
        symbol: "ETH",
        mint: pubkey!("7vfCXTUXx5WJV5JADk17DUJ4ksgau7utNKj4b963voxs"),
        decimals: 8,
        custody: pubkey!("AQCGyheWPLeo6Qp9WpYS9m3Qj479t7R636N9ey1rEjEn"),
        tradable: true,
    },
    Market {
        symbol: "BTC",
        mint: pubkey!("3NZ9JMVBmGAqocybic2c7LQCJScmgsAZ6vQqTDzcqmJh"),
        decimals: 8,
        custody: pubkey!("5Pv3gM9JrFFH883SWAhvJC9RPYmo8UNxuFtv5bMMALkm"),
        tradable: true,
    },
    Market {
        symbol: "USDC",
        mint: pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
        decimals: 6,
        custody: pubkey!("G18jKKXQwBbrHeiK3C9MRXhkHsLHf7XgCSisykV46EZa"),
        tradable: false,
    },
    Market {
        symbol: "USDT",
        mint: pubkey!("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"),
        decimals: 6,
        custody: pubkey!("4vkNeXiYEUizLdrpdPS1eC2mccyM4NUPRtERrk6ZETkk"),
        tradable: false,
    },
];

/// 规范化市场符号："sol-perp" -> "SOL" / Normalize a market symbol
pub fn normalize_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_ascii_uppercase();
    upper
        .trim_end_matches("-PERP")
        .trim_end_matches(" PERP")
        .trim()
        .to_string()
}

/// 按符号查找市场 / Look up a market by symbol
pub fn market(symbol: &str) -> Result<&'static Market> {
    let normalized = normalize_symbol(symbol);
    MARKETS
        .iter()
        .find(|m| m.symbol == normalized)
        .ok_or_else(|| TradeError::InvalidIntent(format!("unknown market: {}", symbol)))
}

/// 查找可交易市场（稳定币托管不能开仓）/ Look up a tradable market
pub fn tradable_market(symbol: &str) -> Result<&'static Market> {
    let market = market(symbol)?;
    if !market.tradable {
        return Err(TradeError::InvalidIntent(format!(
            "{} is a collateral custody, not a tradable market",
            market.symbol
        )));
    }
    Ok(market)
}

/// 抵押品市场：多头用标的资产本身，空头一律用稳定币
/// Collateral market: longs post the market's own asset, shorts always post the stable asset
pub fn collateral_market(market: &'static Market, side: Side) -> &'static Market {
    match side {
        Side::Long => market,
        Side::Short => MARKETS
            .iter()
            .find(|m| m.symbol == STABLE_COLLATERAL_SYMBOL)
            .unwrap_or(&MARKETS[3]),
    }
}

/// 全局 perpetuals 账户（只推导一次）/ Global perpetuals account, derived once
pub fn perpetuals_address() -> Pubkey {
    static ADDRESS: OnceLock<Pubkey> = OnceLock::new();
    *ADDRESS.get_or_init(|| {
        Pubkey::find_program_address(&[PERPETUALS_SEED], &PERPETUALS_PROGRAM_ID).0
    })
}

/// Anchor 事件 CPI 权限账户 / Anchor event-CPI authority
pub fn event_authority_address() -> Pubkey {
    static ADDRESS: OnceLock<Pubkey> = OnceLock::new();
    *ADDRESS.get_or_init(|| {
        Pubkey::find_program_address(&[EVENT_AUTHORITY_SEED], &PERPETUALS_PROGRAM_ID).0
    })
}

/// 持仓 PDA / Position PDA
///
/// seeds: ["position", owner, pool, custody, collateral_custody, [side]]
pub fn derive_position_address(
    owner: &Pubkey,
    market: &Market,
    collateral_market: &Market,
    side: Side,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            POSITION_SEED,
            owner.as_ref(),
            JLP_POOL.as_ref(),
            market.custody.as_ref(),
            collateral_market.custody.as_ref(),
            &[side.wire_byte()],
        ],
        &PERPETUALS_PROGRAM_ID,
    )
    .0
}

/// 持仓请求 PDA / Position request PDA
///
/// seeds: ["position_request", position, counter (u64 LE), [change]]
pub fn derive_request_address(position: &Pubkey, counter: u64, kind: RequestKind) -> Pubkey {
    Pubkey::find_program_address(
        &[
            POSITION_REQUEST_SEED,
            position.as_ref(),
            &counter.to_le_bytes(),
            &[kind.change_byte()],
        ],
        &PERPETUALS_PROGRAM_ID,
    )
    .0
}

/// SPL 关联代币账户（允许 owner 不在曲线上）/ SPL associated token account, off-curve owners allowed
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}

/// 开仓/平仓请求所需的全部账户 / Every account an open/close request needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAccountSet {
    pub kind: RequestKind,
    pub side: Side,
    pub counter: u64,
    pub owner: Pubkey,
    /// 开仓时为资金来源账户，平仓时为接收账户 / Funding account (open) or receiving account (close)
    pub user_token_account: Pubkey,
    pub perpetuals: Pubkey,
    pub pool: Pubkey,
    pub position: Pubkey,
    pub position_request: Pubkey,
    pub position_request_ata: Pubkey,
    pub custody: Pubkey,
    pub collateral_custody: Pubkey,
    pub collateral_mint: Pubkey,
    pub referral: Option<Pubkey>,
    pub token_program: Pubkey,
    pub associated_token_program: Pubkey,
    pub system_program: Pubkey,
    pub event_authority: Pubkey,
    pub program: Pubkey,
}

/// 推导一次请求所需的全部账户 / Derive every account a request needs
pub fn derive_accounts(
    owner: &Pubkey,
    market: &'static Market,
    side: Side,
    kind: RequestKind,
    counter: u64,
) -> DerivedAccountSet {
    let collateral = collateral_market(market, side);
    let position = derive_position_address(owner, market, collateral, side);
    let position_request = derive_request_address(&position, counter, kind);

    DerivedAccountSet {
        kind,
        side,
        counter,
        owner: *owner,
        user_token_account: associated_token_address(owner, &collateral.mint),
        perpetuals: perpetuals_address(),
        pool: JLP_POOL,
        position,
        position_request,
        position_request_ata: associated_token_address(&position_request, &collateral.mint),
        custody: market.custody,
        collateral_custody: collateral.custody,
        collateral_mint: collateral.mint,
        referral: None,
        token_program: TOKEN_PROGRAM_ID,
        associated_token_program: ASSOCIATED_TOKEN_PROGRAM_ID,
        system_program: system_program::id(),
        event_authority: event_authority_address(),
        program: PERPETUALS_PROGRAM_ID,
    }
}

/// 按 owner 分配的单调递增请求计数器
/// Owner-scoped monotonically increasing request counters
///
/// 每个 owner 一个槽位，存的是下一个可用值。重启后由持久化记录恢复。
/// One slot per owner holding the next free value; restored from storage after restart.
#[derive(Debug, Default)]
pub struct CounterSequence {
    slots: Mutex<HashMap<Pubkey, u64>>,
}

impl CounterSequence {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<Pubkey, u64>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 取出下一个计数器值 / Take the next counter value
    pub fn next(&self, owner: &Pubkey) -> u64 {
        let mut slots = self.slots();
        let slot = slots.entry(*owner).or_insert(0);
        let counter = *slot;
        *slot = slot.saturating_add(1);
        counter
    }

    /// 查看下一个值但不消费 / Peek at the next value without consuming it
    pub fn peek(&self, owner: &Pubkey) -> u64 {
        self.slots().get(owner).copied().unwrap_or(0)
    }

    /// 恢复槽位，只会向前推进 / Restore a slot; only ever moves forward
    pub fn restore(&self, owner: &Pubkey, next: u64) {
        let mut slots = self.slots();
        let slot = slots.entry(*owner).or_insert(0);
        if next > *slot {
            *slot = next;
        }
    }

    pub fn snapshot(&self) -> Vec<(Pubkey, u64)> {
        self.slots().iter().map(|(k, v)| (*k, *v)).collect()
    }
}
