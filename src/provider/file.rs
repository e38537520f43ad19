//! Filesystem session provider
//!
//! Persists each session as one JSON record (`<token>.session`) in a
//! directory so sessions survive process restarts. Writes are atomic via
//! temp file + rename. Records can optionally be sealed at rest with a
//! `RecordEncryptor`, chosen when the provider is opened.

use crate::clock::{is_expired, Clock, SystemClock};
use crate::crypto::RecordEncryptor;
use crate::error::{SessionError, Result};
use crate::id::redact;
use crate::provider::{ProviderInfo, SessionProvider};
use crate::session::Session;
use crate::value::SessionValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::Mutex;

const RECORD_EXT: &str = "session";
const TEMP_EXT: &str = "tmp";

/// On-disk session record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    token: String,
    last_access: u64,
    #[serde(default)]
    values: HashMap<String, SessionValue>,
}

impl SessionRecord {
    fn new(token: &str, now: u64) -> Self {
        Self {
            token: token.to_string(),
            last_access: now,
            values: HashMap::new(),
        }
    }

    fn touch(&mut self, now: u64) {
        self.last_access = self.last_access.max(now);
    }
}

/// Shared state behind the provider and its session handles
struct FileStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    encryptor: Option<Arc<dyn RecordEncryptor>>,

    /// Serializes all record I/O
    io: Mutex<()>,
}

impl FileStore {
    fn record_path(&self, token: &str) -> Result<PathBuf> {
        let valid = !token.is_empty()
            && token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(SessionError::Storage(format!(
                "Token {}… is not a valid file name",
                redact(token)
            )));
        }
        Ok(self.dir.join(format!("{}.{}", token, RECORD_EXT)))
    }

    fn load(&self, path: &Path) -> Result<Option<SessionRecord>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read(path).map_err(|e| {
            SessionError::Storage(format!(
                "Failed to read session file {}: {}",
                path.display(),
                e
            ))
        })?;

        let plain = match &self.encryptor {
            Some(enc) => enc.open(&raw)?,
            None => raw,
        };

        let record: SessionRecord = serde_json::from_slice(&plain)?;
        Ok(Some(record))
    }

    fn save(&self, path: &Path, record: &SessionRecord) -> Result<()> {
        let plain = serde_json::to_vec(record)?;
        let bytes = match &self.encryptor {
            Some(enc) => enc.seal(&plain)?,
            None => plain,
        };

        // Atomic write: write to temp file, then rename
        let tmp_path = path.with_extension(TEMP_EXT);

        std::fs::write(&tmp_path, bytes).map_err(|e| {
            SessionError::Storage(format!(
                "Failed to write session file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        std::fs::rename(&tmp_path, path).map_err(|e| {
            SessionError::Storage(format!(
                "Failed to rename session file {} → {}: {}",
                tmp_path.display(),
                path.display(),
                e
            ))
        })?;

        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Storage(format!(
                "Failed to remove session file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn files_with_ext(&self, ext: &str) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            SessionError::Storage(format!(
                "Failed to list session directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                SessionError::Storage(format!("Failed to read directory entry: {}", e))
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ext) {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Wall-clock modification time in milliseconds since the Unix epoch
    fn modified_millis(&self, path: &Path) -> Result<u64> {
        let modified = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|e| {
                SessionError::Storage(format!(
                    "Failed to stat session file {}: {}",
                    path.display(),
                    e
                ))
            })?;
        Ok(modified
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0))
    }

    /// Load, mutate, and persist a record; the session must still exist
    async fn update<T>(
        &self,
        token: &str,
        f: impl FnOnce(&mut SessionRecord) -> T + Send,
    ) -> Result<T> {
        let path = self.record_path(token)?;
        let _io = self.io.lock().await;

        let mut record = self.load(&path)?.ok_or_else(|| {
            SessionError::Storage(format!("Session {}… no longer exists", redact(token)))
        })?;
        let out = f(&mut record);
        record.touch(self.clock.now_millis());
        self.save(&path, &record)?;
        Ok(out)
    }
}

/// Handle to a file-backed session
pub struct FileSession {
    token: String,
    store: Arc<FileStore>,
}

#[async_trait]
impl Session for FileSession {
    async fn set(&self, key: &str, value: SessionValue) -> Result<()> {
        self.store
            .update(&self.token, |record| {
                record.values.insert(key.to_string(), value);
            })
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<SessionValue>> {
        let path = self.store.record_path(&self.token)?;
        let _io = self.store.io.lock().await;

        match self.store.load(&path)? {
            Some(mut record) => {
                let value = record.values.get(key).cloned();
                record.touch(self.store.clock.now_millis());
                self.store.save(&path, &record)?;
                Ok(value)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store
            .update(&self.token, |record| {
                record.values.remove(key);
            })
            .await
    }

    fn id(&self) -> &str {
        &self.token
    }

    async fn entries(&self) -> Result<HashMap<String, SessionValue>> {
        let path = self.store.record_path(&self.token)?;
        let _io = self.store.io.lock().await;
        Ok(self
            .store
            .load(&path)?
            .map(|record| record.values)
            .unwrap_or_default())
    }

    async fn last_accessed(&self) -> Result<u64> {
        let path = self.store.record_path(&self.token)?;
        let _io = self.store.io.lock().await;
        self.store
            .load(&path)?
            .map(|record| record.last_access)
            .ok_or_else(|| {
                SessionError::Storage(format!(
                    "Session {}… no longer exists",
                    redact(&self.token)
                ))
            })
    }
}

/// Filesystem-backed session provider
pub struct FileProvider {
    store: Arc<FileStore>,
}

impl FileProvider {
    /// Open (creating if needed) a session directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    /// Open a session directory with a custom clock
    pub fn with_clock(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::open(dir.into(), clock, None)
    }

    /// Open a session directory whose records are all sealed with `encryptor`
    pub fn sealed(dir: impl Into<PathBuf>, encryptor: Arc<dyn RecordEncryptor>) -> Result<Self> {
        Self::open(dir.into(), Arc::new(SystemClock), Some(encryptor))
    }

    /// Sealed session directory with a custom clock
    pub fn sealed_with_clock(
        dir: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        encryptor: Arc<dyn RecordEncryptor>,
    ) -> Result<Self> {
        Self::open(dir.into(), clock, Some(encryptor))
    }

    fn open(
        dir: PathBuf,
        clock: Arc<dyn Clock>,
        encryptor: Option<Arc<dyn RecordEncryptor>>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&dir).map_err(|e| {
            SessionError::Config(format!(
                "Failed to create session directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        Ok(Self {
            store: Arc::new(FileStore {
                dir,
                clock,
                encryptor,
                io: Mutex::new(()),
            }),
        })
    }

    /// Whether records are sealed at rest
    pub fn is_sealed(&self) -> bool {
        self.store.encryptor.is_some()
    }

    /// Get the session directory
    pub fn dir(&self) -> &Path {
        &self.store.dir
    }

    fn handle(&self, token: &str) -> Arc<dyn Session> {
        Arc::new(FileSession {
            token: token.to_string(),
            store: self.store.clone(),
        })
    }
}

#[async_trait]
impl SessionProvider for FileProvider {
    async fn init(&self, token: &str) -> Result<Arc<dyn Session>> {
        let path = self.store.record_path(token)?;
        let _io = self.store.io.lock().await;

        if path.exists() {
            return Err(SessionError::Storage(format!(
                "Session {}… already exists",
                redact(token)
            )));
        }

        let record = SessionRecord::new(token, self.store.clock.now_millis());
        self.store.save(&path, &record)?;
        tracing::debug!(token = %redact(token), "File session created");
        Ok(self.handle(token))
    }

    async fn read(&self, token: &str) -> Result<Arc<dyn Session>> {
        let path = self.store.record_path(token)?;
        let _io = self.store.io.lock().await;
        let now = self.store.clock.now_millis();

        let record = match self.store.load(&path)? {
            Some(mut record) => {
                record.touch(now);
                record
            }
            None => {
                tracing::debug!(token = %redact(token), "File session created on read");
                SessionRecord::new(token, now)
            }
        };
        self.store.save(&path, &record)?;
        Ok(self.handle(token))
    }

    async fn exists(&self, token: &str) -> Result<bool> {
        let path = self.store.record_path(token)?;
        Ok(path.exists())
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        let path = self.store.record_path(token)?;
        let _io = self.store.io.lock().await;
        self.store.remove(&path)
    }

    async fn sweep(&self, max_idle: Duration) -> Result<usize> {
        let _io = self.store.io.lock().await;
        let now = self.store.clock.now_millis();
        let mut removed = 0;

        for path in self.store.files_with_ext(RECORD_EXT)? {
            let last_access = match self.store.load(&path) {
                Ok(Some(record)) => record.last_access,
                Ok(None) => continue,
                Err(e) => {
                    // Corrupt, or sealed under a key we no longer hold
                    let modified = self.store.modified_millis(&path)?;
                    if is_expired(modified, now, max_idle) {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Removing unreadable session file"
                        );
                    }
                    modified
                }
            };

            if is_expired(last_access, now, max_idle) {
                self.store.remove(&path)?;
                removed += 1;
            }
        }

        // No write is in flight while the io lock is held
        for path in self.store.files_with_ext(TEMP_EXT)? {
            if is_expired(self.store.modified_millis(&path)?, now, max_idle) {
                tracing::debug!(path = %path.display(), "Removing leftover temp file");
                self.store.remove(&path)?;
            }
        }

        Ok(removed)
    }

    async fn info(&self) -> Result<ProviderInfo> {
        let _io = self.store.io.lock().await;
        Ok(ProviderInfo {
            provider: "file".to_string(),
            sessions: self.store.files_with_ext(RECORD_EXT)?.len(),
        })
    }

    fn name(&self) -> &str {
        "file"
    }
}
