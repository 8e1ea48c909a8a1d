// 跟踪器状态存储模块 / Tracker state storage module
//
// 键格式 / Key layout:
//   pending:{user}:{id}    -> PendingRequest (JSON)
//   monitored:{user}:{id}  -> MonitoredPosition (JSON)
//   alert:{user}:{id}      -> PriceAlert (JSON)
//   counter:{owner}        -> 下一个可用计数器 / next free counter
use rocksdb::{Direction, IteratorMode, DB};
use serde::de::DeserializeOwned;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use super::errors::TrackerStorageError;
use crate::tracker::types::{MonitoredPosition, PendingRequest, PriceAlert};

pub type Result<T> = std::result::Result<T, TrackerStorageError>;

const PENDING_PREFIX: &str = "pending:";
const MONITORED_PREFIX: &str = "monitored:";
const ALERT_PREFIX: &str = "alert:";
const COUNTER_PREFIX: &str = "counter:";

/// 跟踪器存储 / Tracker storage
#[derive(Clone)]
pub struct TrackerStorage {
    db: Arc<DB>,
}

impl TrackerStorage {
    pub fn new(db: Arc<DB>) -> Self {
        Self { db }
    }

    fn pending_key(user_id: &str, id: &str) -> String {
        format!("{}{}:{}", PENDING_PREFIX, user_id, id)
    }

    fn monitored_key(user_id: &str, id: &str) -> String {
        format!("{}{}:{}", MONITORED_PREFIX, user_id, id)
    }

    fn alert_key(user_id: &str, id: &str) -> String {
        format!("{}{}:{}", ALERT_PREFIX, user_id, id)
    }

    fn counter_key(owner: &Pubkey) -> String {
        format!("{}{}", COUNTER_PREFIX, owner)
    }

    // ==================== 请求 / Requests ====================

    pub fn save_request(&self, request: &PendingRequest) -> Result<()> {
        self.db.put(
            Self::pending_key(&request.user_id, &request.id).as_bytes(),
            serde_json::to_vec(request)?,
        )?;
        debug!("💾 保存请求 / Saved request {} ({})", request.id, request.status);
        Ok(())
    }

    pub fn load_requests(&self) -> Result<Vec<PendingRequest>> {
        self.scan(PENDING_PREFIX)
    }

    pub fn load_user_requests(&self, user_id: &str) -> Result<Vec<PendingRequest>> {
        self.scan(&format!("{}{}:", PENDING_PREFIX, user_id))
    }

    // ==================== 监控持仓 / Monitored positions ====================

    pub fn save_monitored(&self, position: &MonitoredPosition) -> Result<()> {
        self.db.put(
            Self::monitored_key(&position.user_id, &position.id).as_bytes(),
            serde_json::to_vec(position)?,
        )?;
        Ok(())
    }

    pub fn delete_monitored(&self, user_id: &str, id: &str) -> Result<()> {
        self.db.delete(Self::monitored_key(user_id, id).as_bytes())?;
        Ok(())
    }

    pub fn load_monitored(&self) -> Result<Vec<MonitoredPosition>> {
        self.scan(MONITORED_PREFIX)
    }

    // ==================== 价格提醒 / Price alerts ====================

    pub fn save_alert(&self, alert: &PriceAlert) -> Result<()> {
        self.db.put(
            Self::alert_key(&alert.user_id, &alert.id).as_bytes(),
            serde_json::to_vec(alert)?,
        )?;
        Ok(())
    }

    pub fn delete_alert(&self, user_id: &str, id: &str) -> Result<()> {
        self.db.delete(Self::alert_key(user_id, id).as_bytes())?;
        Ok(())
    }

    pub fn load_alerts(&self) -> Result<Vec<PriceAlert>> {
        self.scan(ALERT_PREFIX)
    }

    // ==================== 计数器 / Counters ====================

    pub fn save_counter(&self, owner: &Pubkey, next: u64) -> Result<()> {
        self.db
            .put(Self::counter_key(owner).as_bytes(), next.to_string().as_bytes())?;
        Ok(())
    }

    /// 读取全部 owner 的下一个计数器 / Load every owner's next counter
    pub fn load_counters(&self) -> Result<Vec<(Pubkey, u64)>> {
        let mut counters = Vec::new();
        let iter = self.db.iterator(IteratorMode::From(
            COUNTER_PREFIX.as_bytes(),
            Direction::Forward,
        ));

        for item in iter {
            let (key, value) = item?;
            let key_str = String::from_utf8(key.to_vec())?;
            if !key_str.starts_with(COUNTER_PREFIX) {
                break;
            }

            let owner_str = &key_str[COUNTER_PREFIX.len()..];
            let owner = Pubkey::from_str(owner_str)
                .map_err(|_| TrackerStorageError::InvalidKey(key_str.clone()))?;
            let next = String::from_utf8(value.to_vec())?
                .parse::<u64>()
                .map_err(|_| TrackerStorageError::InvalidKey(key_str.clone()))?;
            counters.push((owner, next));
        }

        Ok(counters)
    }

    // ==================== 辅助方法 / Helper Methods ====================

    /// 前缀扫描，损坏的记录跳过并告警 / Prefix scan; corrupt records are skipped with a warning
    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let mut records = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            let key_str = String::from_utf8_lossy(&key);
            if !key_str.starts_with(prefix) {
                break;
            }

            match serde_json::from_slice::<T>(&value) {
                Ok(record) => records.push(record),
                Err(e) => warn!("⚠️ 跳过损坏的记录 / Skipping corrupt record {}: {}", key_str, e),
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RocksDbStorage;
    use crate::perps::types::{RequestKind, Side};
    use crate::tracker::types::{AlertDirection, RequestStatus};
    use chrono::Utc;

    fn temp_storage() -> (RocksDbStorage, String) {
        let path = format!("/tmp/perps_tracker_storage_{}", uuid::Uuid::new_v4());
        (RocksDbStorage::open(&path).unwrap(), path)
    }

    fn request(user: &str, owner: Pubkey, counter: u64) -> PendingRequest {
        PendingRequest {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            owner,
            market: "SOL".to_string(),
            side: Side::Long,
            kind: RequestKind::Open,
            counter,
            position_address: Pubkey::new_unique(),
            request_address: Pubkey::new_unique(),
            signature: Some("sig".to_string()),
            submitted_at: Utc::now(),
            status: RequestStatus::Submitted,
            polls: 0,
            baseline: None,
            error: None,
            take_profit_pct: Some(10.0),
            stop_loss_pct: None,
            entry_price: 100.0,
            size_usd: 50.0,
            resolved_at: None,
        }
    }

    #[test]
    fn test_requests_and_counters_persist() {
        let (db, path) = temp_storage();
        let storage = db.create_tracker_storage();
        let owner = Pubkey::new_unique();

        storage.save_counter(&owner, 5).unwrap();
        storage.save_request(&request("alice", owner, 4)).unwrap();
        storage.save_request(&request("bob", Pubkey::new_unique(), 0)).unwrap();

        assert_eq!(storage.load_requests().unwrap().len(), 2);
        assert_eq!(storage.load_user_requests("alice").unwrap().len(), 1);
        assert_eq!(storage.load_counters().unwrap(), vec![(owner, 5)]);

        drop(storage);
        drop(db);
        let _ = std::fs::remove_dir_all(path);
    }

    #[test]
    fn test_user_prefix_does_not_leak_across_users() {
        let (db, path) = temp_storage();
        let storage = db.create_tracker_storage();

        storage.save_request(&request("al", Pubkey::new_unique(), 0)).unwrap();
        storage.save_request(&request("alice", Pubkey::new_unique(), 0)).unwrap();

        let al = storage.load_user_requests("al").unwrap();
        assert_eq!(al.len(), 1);
        assert_eq!(al[0].user_id, "al");

        drop(storage);
        drop(db);
        let _ = std::fs::remove_dir_all(path);
    }

    #[test]
    fn test_alert_round_trip_and_delete() {
        let (db, path) = temp_storage();
        let storage = db.create_tracker_storage();
        let alert = PriceAlert {
            id: "a1".to_string(),
            user_id: "alice".to_string(),
            symbol: "SOL".to_string(),
            target_price: 200.0,
            direction: AlertDirection::Above,
            created_at: Utc::now(),
        };

        storage.save_alert(&alert).unwrap();
        assert_eq!(storage.load_alerts().unwrap(), vec![alert.clone()]);

        storage.delete_alert("alice", "a1").unwrap();
        assert!(storage.load_alerts().unwrap().is_empty());

        drop(storage);
        drop(db);
        let _ = std::fs::remove_dir_all(path);
    }
}
