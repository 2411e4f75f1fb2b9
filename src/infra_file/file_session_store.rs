use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::MemorySessionStore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// In-process store that mirrors its full record set into a JSON file.
///
/// Every mutation rewrites the whole snapshot before returning, so throughput
/// is bounded by disk latency and grows worse with the number of live records.
///
/// The in-process state is authoritative. When a snapshot write fails the
/// mutation stays applied in memory and the error is returned; the next
/// successful write carries it to disk.
pub struct FileSessionStore {
    inner: MemorySessionStore,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    /// Loads `path` into `inner` and returns the wrapped store.
    ///
    /// A missing file is an empty snapshot. Records whose expiry has already
    /// passed are dropped; the rest keep their original expiry instant.
    pub async fn open(path: impl Into<PathBuf>, inner: MemorySessionStore) -> Result<Self, StoreError> {
        let path = path.into();
        let store = FileSessionStore {
            inner,
            path,
            write_lock: Mutex::new(()),
        };
        store.load().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<(), StoreError> {
        let json = match fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no session snapshot, starting empty");
                return Ok(());
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "read session snapshot failed");
                return Err(StoreError::Read {
                    backend: BackendMode::File,
                    message: e.to_string(),
                });
            }
        };
        if json.trim().is_empty() {
            return Ok(());
        }

        let records: BTreeMap<String, TokenRecord> = serde_json::from_str(&json).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "parse session snapshot failed");
            StoreError::Serialization(e.to_string())
        })?;

        let total = records.len();
        let mut restored = 0;
        for (key, record) in records {
            if !self.inner.keys().is_token_key(&key) {
                warn!(key = %key, "skipping foreign key in session snapshot");
                continue;
            }
            if self.inner.restore(key, record) {
                restored += 1;
            }
        }
        info!(
            path = %self.path.display(),
            restored,
            expired = total - restored,
            "session snapshot loaded"
        );
        Ok(())
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        // taken under the lock so the last writer always carries the newest state
        let records = self.inner.live_records();
        let json = serde_json::to_string(&records).map_err(|e| {
            error!(error = %e, "serialize session snapshot failed");
            StoreError::Serialization(e.to_string())
        })?;

        let write_err = |e: std::io::Error| {
            error!(path = %self.path.display(), error = %e, "write session snapshot failed");
            StoreError::Write {
                backend: BackendMode::File,
                message: e.to_string(),
            }
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(write_err)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json.as_bytes()).await.map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(write_err)?;
        }
        fs::rename(&tmp_path, &self.path).await.map_err(write_err)?;

        debug!(path = %self.path.display(), records = records.len(), "session snapshot written");
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    fn backend(&self) -> BackendMode {
        BackendMode::File
    }

    async fn insert(
        &self,
        token: &str,
        record: &TokenRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.inner.insert(token, record, ttl).await?;
        self.persist().await
    }

    async fn get(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        self.inner.get(token).await
    }

    async fn update(
        &self,
        token: &str,
        record: &TokenRecord,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let updated = self.inner.update(token, record, ttl).await?;
        if updated {
            self.persist().await?;
        }
        Ok(updated)
    }

    async fn remove(&self, token: &str, record: &TokenRecord) -> Result<bool, StoreError> {
        let removed = self.inner.remove(token, record).await?;
        self.persist().await?;
        Ok(removed)
    }

    async fn subject_tokens(&self, subject: &SubjectKey) -> Result<Vec<TokenId>, StoreError> {
        self.inner.subject_tokens(subject).await
    }

    async fn remove_subject(&self, subject: &SubjectKey) -> Result<usize, StoreError> {
        let removed = self.inner.remove_subject(subject).await?;
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }
}
