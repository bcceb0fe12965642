use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Boxed error returned by storage backends.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Client key/value storage.
///
/// Models both browser storage areas: durable storage that survives restarts
/// (session snapshot and tokens) and tab-scoped ephemeral storage (the
/// pending redirect). Hosts plug in their platform storage by implementing
/// this trait.
///
/// # Example
///
/// ```rust,ignore
/// impl KeyValueStore for LocalStorage {
///     async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
///         Ok(self.inner.get_item(key).map_err(js_error)?)
///     }
///     // ...
/// }
/// ```
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read a value. Missing keys yield `Ok(None)`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete a value. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<T: KeyValueStore> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key).await
    }
}

/// In-process storage. Stands in for tab-scoped storage and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` currently holds a value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    fn with_entries<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, String>) -> R,
    ) -> Result<R, StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::from("memory store lock poisoned"))?;
        Ok(f(&mut entries))
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        })
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            entries.remove(key);
        })
    }
}

/// Durable storage backed by a single JSON file of string values.
///
/// The native counterpart of browser local storage. Writes go to a sibling
/// temp file which is then renamed over the original.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, String>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_owned(), value.to_owned());
        self.save(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }
}


#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    /// Memory store that counts operations and can be told to fail writes.
    #[derive(Debug, Default)]
    pub(crate) struct ProbeStore {
        inner: MemoryStore,
        pub(crate) gets: AtomicUsize,
        pub(crate) sets: AtomicUsize,
        pub(crate) removes: AtomicUsize,
        fail_writes: AtomicBool,
        failing_key: Mutex<Option<String>>,
    }

    impl ProbeStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        /// Fail writes to `key` only.
        pub(crate) fn fail_writes_to(&self, key: &str) {
            *self.failing_key.lock().unwrap() = Some(key.to_owned());
        }

        pub(crate) fn contains(&self, key: &str) -> bool {
            self.inner.contains(key)
        }

        pub(crate) fn touches(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
                + self.sets.load(Ordering::SeqCst)
                + self.removes.load(Ordering::SeqCst)
        }

        pub(crate) fn sets(&self) -> usize {
            self.sets.load(Ordering::SeqCst)
        }

        pub(crate) async fn peek(&self, key: &str) -> Option<String> {
            self.inner.get(key).await.ok().flatten()
        }

        pub(crate) async fn seed(&self, key: &str, value: &str) {
            self.inner.set(key, value).await.unwrap();
        }
    }

    impl KeyValueStore for ProbeStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            let key_fails = self.failing_key.lock().unwrap().as_deref() == Some(key);
            if key_fails || self.fail_writes.load(Ordering::SeqCst) {
                return Err("quota exceeded".into());
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.removes.fetch_add(1, Ordering::SeqCst);
            self.inner.remove(key).await
        }
    }
}
