// Library 模块导出
// Library Module Exports

pub mod config;
pub mod db;
pub mod docs;
pub mod perps;
pub mod router;
pub mod solana;
pub mod tracker;
pub mod util;

// Re-export commonly used types
// 重导出常用类型
pub use perps::{CloseIntent, PositionRef, Side, TradeError, TradeIntent, TransactionBuilder};
pub use solana::EndpointFailoverClient;
pub use tracker::{PositionLifecycleTracker, TradeReceipt};
