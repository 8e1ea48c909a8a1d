// 交易构建器 - 意图校验、价格换算、计算预算和 blockhash
// Transaction builder - intent validation, price conversion, compute budget and blockhash

use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    message::Message,
    pubkey::Pubkey,
    signature::Signer,
    transaction::Transaction,
};
use std::sync::Arc;
use tracing::{debug, info};

use super::codec::{self, CloseRequestParams, EncodedInstruction, OpenRequestParams};
use super::errors::{Result, TradeError};
use super::registry::{self, CounterSequence, DerivedAccountSet, Market};
use super::types::{CloseIntent, PositionRef, RequestKind, Side, TradeIntent};
use crate::config::Config;
use crate::solana::EndpointFailoverClient;
use crate::tracker::price::PriceFeed;

/// USD 金额统一使用 6 位小数 / USD amounts use 6 decimals
const USD_SCALE: f64 = 1_000_000.0;
const BPS_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub compute_unit_limit: u32,
    pub compute_unit_price: u64,
    pub blockhash_attempts: u32,
    pub min_leverage: f64,
    pub max_leverage: f64,
}

impl BuilderConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            compute_unit_limit: config.solana.compute_unit_limit,
            compute_unit_price: config.solana.compute_unit_price_micro_lamports,
            blockhash_attempts: config.solana.blockhash_attempts,
            min_leverage: config.trading.min_leverage,
            max_leverage: config.trading.max_leverage,
        }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            compute_unit_limit: 200_000,
            compute_unit_price: 50_000,
            blockhash_attempts: 3,
            min_leverage: 1.1,
            max_leverage: 100.0,
        }
    }
}

/// 待签名的交易 / Transaction awaiting a signature
#[derive(Debug, Clone)]
pub struct SignableTransaction {
    pub message: Message,
    pub recent_blockhash: Hash,
    pub accounts: DerivedAccountSet,
    pub market: &'static Market,
    /// 构建时的标的价格 / Market price at build time
    pub reference_price: f64,
    /// 仓位变化量（USD）/ Position size delta in USD
    pub size_usd: f64,
    pub price_slippage: u64,
}

impl SignableTransaction {
    pub fn kind(&self) -> RequestKind {
        self.accounts.kind
    }

    pub fn side(&self) -> Side {
        self.accounts.side
    }

    pub fn counter(&self) -> u64 {
        self.accounts.counter
    }

    /// 用 owner 的签名器签名；签名器与 owner 不符时拒绝
    /// Sign with the owner's signer; a signer for any other key is refused
    pub fn sign(&self, signer: &dyn Signer) -> Result<Transaction> {
        let signer_key = signer
            .try_pubkey()
            .map_err(|e| TradeError::Signing(e.to_string()))?;
        if signer_key != self.accounts.owner {
            return Err(TradeError::Signing(format!(
                "signer {} does not own request for {}",
                signer_key, self.accounts.owner
            )));
        }

        let mut transaction = Transaction::new_unsigned(self.message.clone());
        let signers: Vec<&dyn Signer> = vec![signer];
        transaction
            .try_sign(&signers, self.recent_blockhash)
            .map_err(|e| TradeError::Signing(e.to_string()))?;
        Ok(transaction)
    }
}

/// 把用户意图变成可签名交易 / Turns user intents into signable transactions
pub struct TransactionBuilder {
    config: BuilderConfig,
    endpoints: Arc<EndpointFailoverClient>,
    prices: Arc<dyn PriceFeed>,
    counters: Arc<CounterSequence>,
}

impl TransactionBuilder {
    pub fn new(
        config: BuilderConfig,
        endpoints: Arc<EndpointFailoverClient>,
        prices: Arc<dyn PriceFeed>,
        counters: Arc<CounterSequence>,
    ) -> Self {
        Self {
            config,
            endpoints,
            prices,
            counters,
        }
    }

    pub fn counters(&self) -> &Arc<CounterSequence> {
        &self.counters
    }

    pub fn endpoints(&self) -> &Arc<EndpointFailoverClient> {
        &self.endpoints
    }

    pub fn prices(&self) -> &Arc<dyn PriceFeed> {
        &self.prices
    }

    /// 本地校验，不做任何网络调用 / Local validation with no network calls
    pub fn validate_open(&self, intent: &TradeIntent) -> Result<&'static Market> {
        let market = registry::tradable_market(&intent.market)?;

        if intent.collateral_amount == 0 {
            return Err(TradeError::InvalidIntent(
                "collateral amount must be positive".to_string(),
            ));
        }
        if !intent.leverage.is_finite()
            || intent.leverage < self.config.min_leverage
            || intent.leverage > self.config.max_leverage
        {
            return Err(TradeError::InvalidIntent(format!(
                "leverage {} outside {}..={}",
                intent.leverage, self.config.min_leverage, self.config.max_leverage
            )));
        }
        check_slippage(intent.max_slippage_bps)?;
        Ok(market)
    }

    /// 构建开仓交易 / Build an open (increase) transaction
    pub async fn build_open(
        &self,
        owner: &Pubkey,
        intent: &TradeIntent,
    ) -> Result<SignableTransaction> {
        let market = self.validate_open(intent)?;
        let collateral = registry::collateral_market(market, intent.side);

        let price = self.prices.get_price(market.symbol).await?;
        let collateral_price = if collateral.symbol == market.symbol {
            price
        } else {
            self.prices.get_price(collateral.symbol).await?
        };

        let size_usd = collateral_value_usd(intent.collateral_amount, collateral.decimals, collateral_price)
            * intent.leverage;
        let size_usd_delta = to_usd_units(size_usd);
        if size_usd_delta == 0 {
            return Err(TradeError::InvalidIntent(
                "position size rounds to zero".to_string(),
            ));
        }
        let price_slippage =
            acceptable_price(price, intent.max_slippage_bps, intent.side, RequestKind::Open);

        let counter = self.counters.next(owner);
        let accounts = registry::derive_accounts(owner, market, intent.side, RequestKind::Open, counter);
        let params = OpenRequestParams {
            size_usd_delta,
            collateral_token_delta: intent.collateral_amount,
            side: intent.side,
            price_slippage,
            jupiter_minimum_out: None,
            counter,
        };
        let instruction = codec::encode_open_request(&accounts, &params)?;

        debug!(
            "🧱 开仓请求 / Open request {} {} size=${:.2} collateral={} counter={}",
            market.symbol, intent.side, size_usd, intent.collateral_amount, counter
        );

        self.assemble(accounts, market, instruction, price, size_usd, price_slippage)
            .await
    }

    /// 构建平仓交易 / Build a close (decrease) transaction
    pub async fn build_close(
        &self,
        owner: &Pubkey,
        position: &PositionRef,
        close: &CloseIntent,
    ) -> Result<SignableTransaction> {
        let market = registry::tradable_market(&position.market)?;
        check_slippage(close.max_slippage_bps)?;
        if close.size_usd_delta == Some(0) {
            return Err(TradeError::InvalidIntent(
                "partial close size must be positive".to_string(),
            ));
        }

        let price = self.prices.get_price(market.symbol).await?;
        let price_slippage =
            acceptable_price(price, close.max_slippage_bps, position.side, RequestKind::Close);

        let counter = self.counters.next(owner);
        let accounts = registry::derive_accounts(owner, market, position.side, RequestKind::Close, counter);
        let params = CloseRequestParams {
            collateral_usd_delta: 0,
            size_usd_delta: close.size_usd_delta.unwrap_or(0),
            price_slippage,
            jupiter_minimum_out: None,
            entire_position: close.size_usd_delta.is_none().then_some(true),
            counter,
        };
        let instruction = codec::encode_close_request(&accounts, &params)?;
        let size_usd = params.size_usd_delta as f64 / USD_SCALE;

        debug!(
            "🧱 平仓请求 / Close request {} {} entire={} counter={}",
            market.symbol,
            position.side,
            close.size_usd_delta.is_none(),
            counter
        );

        self.assemble(accounts, market, instruction, price, size_usd, price_slippage)
            .await
    }

    /// 计算预算指令在前，随后是请求指令 / Compute budget first, then the request
    async fn assemble(
        &self,
        accounts: DerivedAccountSet,
        market: &'static Market,
        instruction: EncodedInstruction,
        reference_price: f64,
        size_usd: f64,
        price_slippage: u64,
    ) -> Result<SignableTransaction> {
        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(self.config.compute_unit_limit),
            ComputeBudgetInstruction::set_compute_unit_price(self.config.compute_unit_price),
            instruction.into_instruction(),
        ];

        let recent_blockhash = self
            .endpoints
            .latest_blockhash(self.config.blockhash_attempts)
            .await?;
        let message =
            Message::new_with_blockhash(&instructions, Some(&accounts.owner), &recent_blockhash);

        info!(
            "📦 交易已组装 / Transaction assembled: {} {} {} counter={}",
            accounts.kind, market.symbol, accounts.side, accounts.counter
        );

        Ok(SignableTransaction {
            message,
            recent_blockhash,
            accounts,
            market,
            reference_price,
            size_usd,
            price_slippage,
        })
    }
}

fn check_slippage(bps: u16) -> Result<()> {
    if bps == 0 || f64::from(bps) >= BPS_SCALE {
        return Err(TradeError::InvalidIntent(format!(
            "slippage {} bps outside 1..10000",
            bps
        )));
    }
    Ok(())
}

/// 抵押品的 USD 价值 / USD value of a collateral amount
pub fn collateral_value_usd(amount: u64, decimals: u8, price: f64) -> f64 {
    amount as f64 / 10f64.powi(i32::from(decimals)) * price
}

/// USD 浮点值转 6 位小数整数 / Convert a USD float to 6-decimal units
pub fn to_usd_units(usd: f64) -> u64 {
    if !usd.is_finite() || usd <= 0.0 {
        return 0;
    }
    (usd * USD_SCALE).round() as u64
}

/// 可接受成交价：买入方向（多开 / 空平）向上放宽，卖出方向向下放宽
/// Acceptable fill price: buying (long open, short close) widens upward, selling widens downward
pub fn acceptable_price(price: f64, slippage_bps: u16, side: Side, kind: RequestKind) -> u64 {
    let slippage = f64::from(slippage_bps) / BPS_SCALE;
    let buying = matches!(
        (side, kind),
        (Side::Long, RequestKind::Open) | (Side::Short, RequestKind::Close)
    );
    let limit = if buying {
        price * (1.0 + slippage)
    } else {
        price * (1.0 - slippage)
    };
    to_usd_units(limit)
}
