// 钱包签名器查找 / Wallet signer lookup
use solana_sdk::signature::{read_keypair_file, Keypair, Signer};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

pub type SharedSigner = Arc<dyn Signer + Send + Sync>;

/// 按用户提供签名器；私钥的生成与保存不在本服务内
/// Supplies a signer per user; key generation and storage live outside this service
pub trait KeyStore: Send + Sync {
    fn signer_for(&self, user_id: &str) -> Option<SharedSigner>;
}

/// 从目录只读加载 keypair 文件：<dir>/<user_id>.json
/// Read-only keypair directory: <dir>/<user_id>.json
pub struct KeypairDirectory {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Keypair>>>,
}

impl KeypairDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }
}

/// 用户 ID 只允许字母数字、'_' 和 '-'，同时用于文件名和存储键
/// User ids allow alphanumerics, '_' and '-'; they become file names and storage keys
pub fn is_valid_user_id(user_id: &str) -> bool {
    !user_id.is_empty()
        && user_id.len() <= 64
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl KeyStore for KeypairDirectory {
    fn signer_for(&self, user_id: &str) -> Option<SharedSigner> {
        if !is_valid_user_id(user_id) {
            warn!("拒绝非法用户 ID / Rejecting invalid user id");
            return None;
        }

        if let Some(keypair) = self
            .cache
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(user_id)
        {
            return Some(keypair.clone() as SharedSigner);
        }

        let path = self.dir.join(format!("{}.json", user_id));
        match read_keypair_file(&path) {
            Ok(keypair) => {
                let keypair = Arc::new(keypair);
                debug!("🔑 加载用户钱包 / Loaded wallet for user {}: {}", user_id, keypair.pubkey());
                self.cache
                    .write()
                    .unwrap_or_else(|p| p.into_inner())
                    .insert(user_id.to_string(), keypair.clone());
                Some(keypair as SharedSigner)
            }
            Err(_) => {
                debug!("用户没有钱包文件 / No keypair file for user {}", user_id);
                None
            }
        }
    }
}

/// 内存中的签名器表 / In-memory signer table
#[derive(Default)]
pub struct MemoryKeyStore {
    signers: RwLock<HashMap<String, SharedSigner>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: &str, signer: SharedSigner) {
        self.signers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(user_id.to_string(), signer);
    }
}

impl KeyStore for MemoryKeyStore {
    fn signer_for(&self, user_id: &str) -> Option<SharedSigner> {
        self.signers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(user_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::write_keypair_file;
    use uuid::Uuid;

    #[test]
    fn test_user_id_validation() {
        assert!(is_valid_user_id("alice"));
        assert!(is_valid_user_id("user_01-a"));
        assert!(!is_valid_user_id(""));
        assert!(!is_valid_user_id("../etc/passwd"));
        assert!(!is_valid_user_id("bad:user"));
        assert!(!is_valid_user_id(&"a".repeat(65)));
    }

    #[test]
    fn test_keypair_directory_loads_and_caches() {
        let dir = std::env::temp_dir().join(format!("keys_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let keypair = Keypair::new();
        write_keypair_file(&keypair, dir.join("alice.json")).unwrap();

        let store = KeypairDirectory::new(&dir);
        let signer = store.signer_for("alice").unwrap();
        assert_eq!(signer.pubkey(), keypair.pubkey());

        // 已缓存，删除文件后仍可用 / cached, still available after the file is gone
        std::fs::remove_file(dir.join("alice.json")).unwrap();
        assert_eq!(store.signer_for("alice").unwrap().pubkey(), keypair.pubkey());

        assert!(store.signer_for("bob").is_none());
        assert!(store.signer_for("../alice").is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
