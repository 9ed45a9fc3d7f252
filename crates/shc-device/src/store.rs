use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::environment::Environment;
use crate::error::{DeviceError, Result};

/// Keys held by the provisioning store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    /// Human-assigned device identifier.
    Identifier,
    /// Backend correlation id (UUID-shaped).
    CorrelationId,
    /// Deployment environment token.
    Environment,
    /// Configured IPv4 address.
    NetworkAddress,
}

impl StoreKey {
    /// Every key, in display order.
    pub const ALL: [StoreKey; 4] = [
        StoreKey::Identifier,
        StoreKey::CorrelationId,
        StoreKey::Environment,
        StoreKey::NetworkAddress,
    ];

    /// Persistent key name.
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKey::Identifier => "identifier",
            StoreKey::CorrelationId => "uuid",
            StoreKey::Environment => "environment",
            StoreKey::NetworkAddress => "ip",
        }
    }
}

/// Key-value persistence for provisioning data.
///
/// Empty strings are treated as "unset" by every implementation.
pub trait ProvisioningStore: Send + Sync {
    /// Current value, or `None` when unset.
    fn get(&self, key: StoreKey) -> Result<Option<String>>;

    /// Overwrite a value.
    fn set(&self, key: StoreKey, value: &str) -> Result<()>;

    /// Store `value` only if `key` is unset. Returns `true` if it was stored.
    ///
    /// The check and the write are atomic with respect to other callers.
    fn set_if_empty(&self, key: StoreKey, value: &str) -> Result<bool>;
}

/// Read the stored environment.
///
/// A stored token that is no longer recognized is reported as unset.
pub fn read_environment(store: &dyn ProvisioningStore) -> Result<Option<Environment>> {
    let Some(raw) = store.get(StoreKey::Environment)? else {
        return Ok(None);
    };
    match raw.parse::<Environment>() {
        Ok(env) => Ok(Some(env)),
        Err(err) => {
            warn!(error = %err, "ignoring unrecognized stored environment");
            Ok(None)
        }
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<StoreKey, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProvisioningStore for MemoryStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>> {
        Ok(self
            .values
            .lock()
            .get(&key)
            .filter(|value| !value.is_empty())
            .cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<()> {
        self.values.lock().insert(key, value.to_string());
        Ok(())
    }

    fn set_if_empty(&self, key: StoreKey, value: &str) -> Result<bool> {
        let mut values = self.values.lock();
        if values.get(&key).is_some_and(|current| !current.is_empty()) {
            return Ok(false);
        }
        values.insert(key, value.to_string());
        Ok(true)
    }
}

/// JSON file store.
///
/// The whole key space is one JSON object of strings. Every change rewrites
/// the file through a temporary sibling and a rename so a crash never
/// leaves a half-written store behind.
///
/// Nothing is cached: every read loads the file, and every write reloads it
/// while holding an exclusive `flock` on a `<path>.lock` sibling. Several
/// processes (the running bridge and a `provision` invocation) can share
/// one store without losing keys or overwriting a write-once value.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
    guard: Mutex<()>,
}

/// Exclusive advisory lock held for one read-modify-write.
///
/// Released when the descriptor is closed on drop.
#[derive(Debug)]
struct FileLock {
    _file: std::fs::File,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        let store = Self {
            lock_path: PathBuf::from(lock_path),
            path,
            guard: Mutex::new(()),
        };
        let values = store.load()?;
        debug!(path = ?store.path, keys = values.len(), "opened provisioning store");
        Ok(store)
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> DeviceError {
        DeviceError::StoreIo {
            path: path.to_path_buf(),
            source,
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read(&self.path) {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| DeviceError::StoreFormat {
                path: self.path.clone(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(self.io_error(&self.path, source)),
        }
    }

    #[cfg(unix)]
    fn lock_exclusive(&self) -> Result<FileLock> {
        use std::os::fd::AsRawFd;

        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|source| self.io_error(&self.lock_path, source))?;

        loop {
            // SAFETY: `file` owns an open descriptor for the whole call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc == 0 {
                return Ok(FileLock { _file: file });
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(self.io_error(&self.lock_path, err));
            }
        }
    }

    #[cfg(not(unix))]
    fn lock_exclusive(&self) -> Result<FileLock> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|source| self.io_error(&self.lock_path, source))?;
        Ok(FileLock { _file: file })
    }

    /// Reload, apply `change`, and persist if it reports a modification.
    fn modify<T>(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, String>) -> (bool, T),
    ) -> Result<T> {
        let _guard = self.guard.lock();
        let _lock = self.lock_exclusive()?;
        let mut values = self.load()?;
        let (changed, result) = change(&mut values);
        if changed {
            self.persist(&values)?;
        }
        Ok(result)
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(values).map_err(|source| {
            DeviceError::StoreFormat {
                path: self.path.clone(),
                source,
            }
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, encoded).map_err(|source| self.io_error(&tmp, source))?;
        std::fs::rename(&tmp, &self.path).map_err(|source| self.io_error(&self.path, source))?;
        Ok(())
    }
}

impl ProvisioningStore for FileStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>> {
        Ok(self
            .load()?
            .remove(key.as_str())
            .filter(|value| !value.is_empty()))
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<()> {
        self.modify(|values| {
            values.insert(key.as_str().to_string(), value.to_string());
            (true, ())
        })
    }

    fn set_if_empty(&self, key: StoreKey, value: &str) -> Result<bool> {
        self.modify(|values| {
            if values
                .get(key.as_str())
                .is_some_and(|current| !current.is_empty())
            {
                return (false, false);
            }
            values.insert(key.as_str().to_string(), value.to_string());
            (true, true)
        })
    }
}
