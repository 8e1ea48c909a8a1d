use anyhow::Result;
use rocksdb::{Options, DB};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::db::TrackerStorage;

/// RocksDB 存储服务 / RocksDB storage service
pub struct RocksDbStorage {
    pub(crate) db: Arc<DB>,
}

impl RocksDbStorage {
    /// 按配置打开数据库 / Open the database from config
    pub fn new(config: &Config) -> Result<Self> {
        Self::open(&config.database.rocksdb_path)
    }

    /// 创建新的 RocksDB 存储实例
    ///
    /// 数据量很小（每个用户几十条记录），写入必须落盘，因此保留 fsync 与 WAL。
    /// Tiny data set (tens of records per user); writes must survive restarts, so fsync and WAL stay on.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        // 1. 小内存配置 / Small memory footprint
        opts.set_write_buffer_size(16 * 1024 * 1024); // 16MB
        opts.set_max_write_buffer_number(2);

        // 2. 轻量压缩 / Light compression
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        // 3. 持久化 / Durability
        opts.set_use_fsync(true);
        opts.set_paranoid_checks(true);

        // 4. 后台任务 / Background jobs
        opts.set_max_background_jobs(2);
        opts.set_stats_dump_period_sec(0);

        let db = DB::open(&opts, path.as_ref())?;

        info!(
            "🗄️ RocksDB 初始化成功 / RocksDB initialized, path: {}",
            path.as_ref().display()
        );

        Ok(Self { db: Arc::new(db) })
    }

    /// 创建跟踪器存储实例 / Create tracker storage instance
    pub fn create_tracker_storage(&self) -> TrackerStorage {
        TrackerStorage::new(Arc::clone(&self.db))
    }
}
