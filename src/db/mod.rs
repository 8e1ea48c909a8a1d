pub mod errors;
pub mod storage;
pub mod tracker_storage;

pub use errors::TrackerStorageError;
pub use storage::RocksDbStorage;
pub use tracker_storage::TrackerStorage;
