// Jupiter Perps 请求编码模块 / Jupiter Perps request encoding module
pub mod builder;
pub mod codec;
pub mod errors;
pub mod registry;
pub mod signer;
pub mod types;

pub use builder::{BuilderConfig, SignableTransaction, TransactionBuilder};
pub use codec::{encode_close_request, encode_open_request, EncodedInstruction};
pub use errors::{Result, TradeError};
pub use registry::{CounterSequence, DerivedAccountSet, Market};
pub use signer::{KeyStore, KeypairDirectory, SharedSigner};
pub use types::{CloseIntent, PositionRef, RequestKind, Side, TradeIntent};

#[cfg(test)]
mod tests;
