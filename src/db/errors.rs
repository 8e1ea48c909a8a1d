// 跟踪器存储错误定义 / Tracker storage error definitions
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerStorageError {
    #[error("数据库错误 / Database error: {0}")]
    DatabaseError(#[from] rocksdb::Error),

    #[error("序列化错误 / Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("UTF-8转换错误 / UTF-8 conversion error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),

    #[error("无效的键 / Invalid key: {0}")]
    InvalidKey(String),
}
