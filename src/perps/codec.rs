// 指令编码器 - 判别器、参数布局和账户顺序的唯一来源
// Instruction codec - single source of truth for discriminator, parameter layout and account order

use borsh::BorshSerialize;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use super::errors::{Result, TradeError};
use super::registry::{DerivedAccountSet, PERPETUALS_PROGRAM_ID};
use super::types::{RequestKind, Side};

/// 指令判别器 - 来自 IDL 指令名 sha256("global:<name>")[..8]
/// Instruction discriminators - sha256("global:<name>")[..8] of the IDL instruction names
pub const OPEN_REQUEST_DISCRIMINATOR: [u8; 8] = [184, 85, 199, 24, 105, 171, 156, 56];
pub const CLOSE_REQUEST_DISCRIMINATOR: [u8; 8] = [74, 198, 195, 86, 193, 99, 1, 79];

pub const OPEN_REQUEST_IX_NAME: &str = "create_increase_position_market_request";
pub const CLOSE_REQUEST_IX_NAME: &str = "create_decrease_position_market_request";

/// 开仓请求参数（字段顺序即链上布局）
/// Open request params (field order is the on-chain layout)
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct OpenRequestParams {
    /// USD，6 位小数 / USD, 6 decimals
    pub size_usd_delta: u64,
    pub collateral_token_delta: u64,
    pub side: Side,
    /// 可接受的成交价（USD，6 位小数）/ Acceptable fill price (USD, 6 decimals)
    pub price_slippage: u64,
    pub jupiter_minimum_out: Option<u64>,
    pub counter: u64,
}

/// 平仓请求参数 / Close request params
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct CloseRequestParams {
    pub collateral_usd_delta: u64,
    pub size_usd_delta: u64,
    pub price_slippage: u64,
    pub jupiter_minimum_out: Option<u64>,
    pub entire_position: Option<bool>,
    pub counter: u64,
}

/// 编码后的指令：参数字节 + 有序账户列表
/// Encoded instruction: parameter bytes plus ordered account list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedInstruction {
    pub kind: RequestKind,
    pub data: Vec<u8>,
    pub accounts: Vec<AccountMeta>,
}

impl EncodedInstruction {
    pub fn into_instruction(self) -> Instruction {
        Instruction {
            program_id: PERPETUALS_PROGRAM_ID,
            accounts: self.accounts,
            data: self.data,
        }
    }
}

/// 编码开仓请求 / Encode an open (increase) request
pub fn encode_open_request(
    accounts: &DerivedAccountSet,
    params: &OpenRequestParams,
) -> Result<EncodedInstruction> {
    check_accounts(accounts, RequestKind::Open, params.counter)?;
    if params.side != accounts.side {
        return Err(TradeError::Encoding(format!(
            "side mismatch: params={}, accounts={}",
            params.side, accounts.side
        )));
    }

    Ok(EncodedInstruction {
        kind: RequestKind::Open,
        data: serialize_with_discriminator(&OPEN_REQUEST_DISCRIMINATOR, params)?,
        accounts: request_account_metas(accounts),
    })
}

/// 编码平仓请求 / Encode a close (decrease) request
pub fn encode_close_request(
    accounts: &DerivedAccountSet,
    params: &CloseRequestParams,
) -> Result<EncodedInstruction> {
    check_accounts(accounts, RequestKind::Close, params.counter)?;
    if params.entire_position != Some(true) && params.size_usd_delta == 0 {
        return Err(TradeError::Encoding(
            "partial close requires a non-zero size_usd_delta".to_string(),
        ));
    }

    Ok(EncodedInstruction {
        kind: RequestKind::Close,
        data: serialize_with_discriminator(&CLOSE_REQUEST_DISCRIMINATOR, params)?,
        accounts: request_account_metas(accounts),
    })
}

fn serialize_with_discriminator<T: BorshSerialize>(
    discriminator: &[u8; 8],
    params: &T,
) -> Result<Vec<u8>> {
    let mut data = discriminator.to_vec();
    params
        .serialize(&mut data)
        .map_err(|e| TradeError::Encoding(format!("borsh serialization failed: {}", e)))?;
    Ok(data)
}

/// 校验账户集合与参数一致且所有必需账户均已解析
/// Check the account set matches the params and every required account is resolved
fn check_accounts(accounts: &DerivedAccountSet, kind: RequestKind, counter: u64) -> Result<()> {
    if accounts.kind != kind {
        return Err(TradeError::Encoding(format!(
            "account set derived for {} request, cannot encode {} request",
            accounts.kind, kind
        )));
    }
    if accounts.counter != counter {
        return Err(TradeError::Encoding(format!(
            "counter mismatch: request address derived with {}, params carry {}",
            accounts.counter, counter
        )));
    }

    let required = [
        ("owner", accounts.owner),
        ("user_token_account", accounts.user_token_account),
        ("perpetuals", accounts.perpetuals),
        ("pool", accounts.pool),
        ("position", accounts.position),
        ("position_request", accounts.position_request),
        ("position_request_ata", accounts.position_request_ata),
        ("custody", accounts.custody),
        ("collateral_custody", accounts.collateral_custody),
        ("collateral_mint", accounts.collateral_mint),
        ("token_program", accounts.token_program),
        ("associated_token_program", accounts.associated_token_program),
        ("event_authority", accounts.event_authority),
        ("program", accounts.program),
    ];
    // system program 的地址本身就是全零，不参与检查
    if let Some((name, _)) = required.iter().find(|(_, key)| *key == Pubkey::default()) {
        return Err(TradeError::Encoding(format!("unresolved account: {}", name)));
    }
    Ok(())
}

/// 账户顺序与程序声明的 account metas 完全一致，开仓和平仓形状相同：
/// owner, 用户代币账户, perpetuals, pool, position, position_request,
/// position_request_ata, custody, collateral_custody, mint, referral,
/// token_program, associated_token_program, system_program, event_authority, program
fn request_account_metas(accounts: &DerivedAccountSet) -> Vec<AccountMeta> {
    vec![
        AccountMeta::new(accounts.owner, true),
        AccountMeta::new(accounts.user_token_account, false),
        AccountMeta::new_readonly(accounts.perpetuals, false),
        AccountMeta::new_readonly(accounts.pool, false),
        AccountMeta::new(accounts.position, false),
        AccountMeta::new(accounts.position_request, false),
        AccountMeta::new(accounts.position_request_ata, false),
        AccountMeta::new_readonly(accounts.custody, false),
        AccountMeta::new_readonly(accounts.collateral_custody, false),
        AccountMeta::new_readonly(accounts.collateral_mint, false),
        // Anchor 可选账户缺省时传程序 ID / absent optional account is passed as the program id
        AccountMeta::new_readonly(accounts.referral.unwrap_or(accounts.program), false),
        AccountMeta::new_readonly(accounts.token_program, false),
        AccountMeta::new_readonly(accounts.associated_token_program, false),
        AccountMeta::new_readonly(accounts.system_program, false),
        AccountMeta::new_readonly(accounts.event_authority, false),
        AccountMeta::new_readonly(accounts.program, false),
    ]
}
