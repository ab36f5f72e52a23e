// src/auth/cache.rs

//! Credential cache shared by every process of the same user.
//!
//! One JSON entry and one lock file per `(controller, url)` under the cache
//! directory. The freshness check and the regeneration both happen while
//! the lock is held, so concurrent callers regenerate at most once per
//! expiry window. Nothing in here fails the caller: cache problems degrade
//! to calling the auth function directly.

use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::auth::clock::{Clock, SystemClock};
use crate::auth::entry::{CacheEntry, CacheShape, Credential, IssuedCredential};
use crate::auth::lock::FileLock;
use crate::config::AuthSection;

/// Hex digits of the URL hash kept in file names.
const URL_HASH_LEN: usize = 16;

pub struct AuthCache {
    dir: PathBuf,
    lock_timeout: Duration,
    safety_margin: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuthCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCache")
            .field("dir", &self.dir)
            .field("lock_timeout", &self.lock_timeout)
            .field("safety_margin", &self.safety_margin)
            .finish_non_exhaustive()
    }
}

impl AuthCache {
    pub fn new(dir: impl Into<PathBuf>, lock_timeout: Duration, safety_margin: Duration) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout,
            safety_margin,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_config(section: &AuthSection) -> Self {
        Self::new(
            section.resolved_cache_dir(),
            Duration::from_millis(section.lock_timeout_ms),
            Duration::from_secs(section.safety_margin_secs),
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, controller: &str, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(controller, url)))
    }

    pub fn lock_path(&self, controller: &str, url: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", cache_key(controller, url)))
    }

    /// Return a fresh cached credential for `(controller, url)`, or call
    /// `auth_fn`, cache its result and return it.
    ///
    /// Only errors from `auth_fn` itself are returned.
    pub async fn get_or_create<F, Fut, E>(
        &self,
        controller: &str,
        url: &str,
        shape: CacheShape,
        auth_fn: F,
    ) -> Result<Credential, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IssuedCredential, E>>,
    {
        if let Err(e) = ensure_private_dir(&self.dir) {
            warn!(dir = ?self.dir, error = %e, "auth cache directory unusable; authenticating without cache");
            return auth_fn().await.map(|issued| issued.credential);
        }

        let lock_path = self.lock_path(controller, url);
        let _lock = match FileLock::acquire(&lock_path, self.lock_timeout).await {
            Ok(lock) => lock,
            Err(e) => {
                warn!(
                    controller = %controller,
                    lock = ?lock_path,
                    error = %e,
                    "could not lock auth cache entry; authenticating without cache"
                );
                return auth_fn().await.map(|issued| issued.credential);
            }
        };

        let entry_path = self.entry_path(controller, url);
        if let Some(credential) = self.read_fresh(&entry_path, shape) {
            debug!(controller = %controller, "auth cache hit");
            return Ok(credential);
        }

        debug!(controller = %controller, "auth cache miss; authenticating");
        let issued = auth_fn().await?;

        let now = self.clock.now();
        let expires_at = now + issued.expires_in.as_secs_f64() - self.safety_margin.as_secs_f64();
        if expires_at <= now {
            debug!(
                controller = %controller,
                expires_in = ?issued.expires_in,
                "credential lifetime within safety margin; not caching"
            );
        } else if let Err(e) = write_entry(&entry_path, &CacheEntry::new(&issued.credential, expires_at)) {
            warn!(entry = ?entry_path, error = %e, "failed to write auth cache entry");
        }

        Ok(issued.credential)
    }

    /// Forget the cached credential. Failures are logged and ignored.
    ///
    /// The lock file is only removed while we hold it; a lock held by
    /// another caller stays in place.
    pub fn invalidate(&self, controller: &str, url: &str) {
        let entry_path = self.entry_path(controller, url);
        match fs::remove_file(&entry_path) {
            Ok(()) => debug!(path = ?entry_path, "removed auth cache entry"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = ?entry_path, error = %e, "failed to remove auth cache entry"),
        }

        let lock_path = self.lock_path(controller, url);
        if !lock_path.exists() {
            return;
        }
        match FileLock::try_acquire(&lock_path) {
            Ok(Some(lock)) => match lock.unlink() {
                Ok(()) => debug!(path = ?lock_path, "removed auth cache lock"),
                Err(e) => debug!(path = ?lock_path, error = %e, "failed to remove auth cache lock"),
            },
            Ok(None) => debug!(path = ?lock_path, "auth cache lock in use; keeping it"),
            Err(e) => debug!(path = ?lock_path, error = %e, "failed to lock auth cache lock for removal"),
        }
    }

    /// Cached credential of `shape` that is still fresh. Anything else,
    /// including unreadable or corrupt files, is a miss.
    fn read_fresh(&self, path: &Path, shape: CacheShape) -> Option<Credential> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(entry = ?path, "no auth cache entry");
                return None;
            }
            Err(e) => {
                debug!(entry = ?path, error = %e, "unreadable auth cache entry; treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(entry = ?path, error = %e, "corrupt auth cache entry; regenerating");
                return None;
            }
        };

        if !entry.is_fresh(self.clock.now()) {
            debug!(entry = ?path, expires_at = entry.expires_at, "auth cache entry expired");
            return None;
        }

        let credential = entry.credential(shape);
        if credential.is_none() {
            debug!(entry = ?path, ?shape, "auth cache entry has a different shape; regenerating");
        }
        credential
    }
}

/// `<controller>_<url hash>`, with the controller reduced to file-name-safe
/// characters.
pub fn cache_key(controller: &str, url: &str) -> String {
    let controller: String = controller
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let hash = blake3::hash(url.as_bytes()).to_hex();
    format!("{controller}_{}", &hash.as_str()[..URL_HASH_LEN])
}

fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Write through a temp file and rename, so readers never see a partial
/// entry.
fn write_entry(path: &Path, entry: &CacheEntry) -> io::Result<()> {
    let json = serde_json::to_vec(entry).map_err(io::Error::other)?;
    let tmp = path.with_extension(format!("json.tmp.{}", std::process::id()));

    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }

    let result = opts
        .open(&tmp)
        .and_then(|mut file| {
            file.write_all(&json)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
