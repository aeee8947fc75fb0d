// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Named, timeout-bounded mutual exclusion.
//!
//! Every queue operation runs under a per-channel lock. The engine only
//! needs the narrow [`Lock`] contract; two implementations ship with it:
//!
//! - [`LocalLock`]: threads of one process.
//! - [`FileLock`]: advisory lock files, safe across processes that share
//!   the lock directory.
//!
//! Locks are not reentrant: acquiring a name twice from the same caller
//! waits for the timeout and fails.
//!
//! A [`FileLock`] file is deleted when its channel is cleared. A waiter that
//! locked the unlinked file notices the path now names another file (or
//! none) and starts over on the current one.

use std::{
    collections::{HashMap, HashSet},
    fs::{File, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use fs2::FileExt;
use parking_lot::{Condvar, Mutex};
use snafu::ResultExt;
use tracing::warn;

use crate::{Result, error::IoSnafu, file::is_same_file, path::name_key};

pub trait Lock: Send + Sync {
    /// Try to take `name` within `timeout`. `Ok(false)` means the timeout
    /// elapsed first.
    fn acquire(&self, name: &str, timeout: Duration) -> Result<bool>;

    /// Give up `name`. Releasing a name that is not held is a no-op.
    fn release(&self, name: &str) -> Result<()>;

    /// Drop whatever backs `name` outside this process. Only called by the
    /// holder, right before it releases.
    fn remove(&self, _name: &str) -> Result<()> { Ok(()) }
}

/// Holds a named lock until dropped.
pub struct LockGuard {
    lock: Arc<dyn Lock>,
    name: String,
}

impl LockGuard {
    /// Acquire `name`, returning `None` when the timeout elapsed.
    pub fn acquire(lock: Arc<dyn Lock>, name: String, timeout: Duration) -> Result<Option<Self>> {
        if lock.acquire(&name, timeout)? {
            Ok(Some(Self { lock, name }))
        } else {
            Ok(None)
        }
    }

    pub fn name(&self) -> &str { &self.name }

    /// Delete the lock's backing state; the lock itself is still released on
    /// drop.
    pub fn remove_lock(&self) -> Result<()> { self.lock.remove(&self.name) }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release(&self.name) {
            warn!(name = %self.name, error = %e, "Failed to release lock");
        }
    }
}

/// Process-local named locks.
#[derive(Default)]
pub struct LocalLock {
    held:     Mutex<HashSet<String>>,
    released: Condvar,
}

impl LocalLock {
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

impl Lock for LocalLock {
    fn acquire(&self, name: &str, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();
        loop {
            if !held.contains(name) {
                held.insert(name.to_owned());
                return Ok(true);
            }
            if self.released.wait_until(&mut held, deadline).timed_out() {
                return Ok(held.insert(name.to_owned()));
            }
        }
    }

    fn release(&self, name: &str) -> Result<()> {
        if self.held.lock().remove(name) {
            self.released.notify_all();
        }
        Ok(())
    }
}

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Advisory file locks under a shared directory, one file per name.
pub struct FileLock {
    dir:           PathBuf,
    poll_interval: Duration,
    /// Open handles of the names this instance currently holds.
    held:          Mutex<HashMap<String, File>>,
}

impl FileLock {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir:           dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            held:          Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn lock_path(&self, name: &str) -> PathBuf { self.dir.join(format!("{}.lock", name_key(name))) }
}

impl FileLock {
    fn open_lock_file(&self, path: &Path) -> Result<File> {
        let location = path.display().to_string();
        std::fs::create_dir_all(&self.dir).context(IoSnafu {
            location: location.clone(),
        })?;
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .context(IoSnafu { location })
    }
}

impl Lock for FileLock {
    fn acquire(&self, name: &str, timeout: Duration) -> Result<bool> {
        let path = self.lock_path(name);
        let mut file = self.open_lock_file(&path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) if is_same_file(&file, &path) => {
                    self.held.lock().insert(name.to_owned(), file);
                    return Ok(true);
                }
                // The file was removed by a `clear` while we waited on it.
                Ok(()) => {
                    drop(file);
                    file = self.open_lock_file(&path)?;
                }
                Err(e)
                    if e.kind() == ErrorKind::WouldBlock
                        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
                {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    std::thread::sleep(self.poll_interval.min(deadline - now));
                }
                Err(e) => {
                    return Err(e).context(IoSnafu {
                        location: path.display().to_string(),
                    });
                }
            }
        }
    }

    fn release(&self, name: &str) -> Result<()> {
        let Some(file) = self.held.lock().remove(name) else {
            return Ok(());
        };
        FileExt::unlock(&file).context(IoSnafu {
            location: self.lock_path(name).display().to_string(),
        })
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.lock_path(name);
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e).context(IoSnafu {
                location: path.display().to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn test_local_lock_is_exclusive() {
        let lock = LocalLock::new();
        assert!(lock.acquire("jobs", SHORT).unwrap());
        assert!(!lock.acquire("jobs", SHORT).unwrap());
        lock.release("jobs").unwrap();
        assert!(lock.acquire("jobs", SHORT).unwrap());
    }

    #[test]
    fn test_local_lock_names_are_independent() {
        let lock = LocalLock::new();
        assert!(lock.acquire("a", SHORT).unwrap());
        assert!(lock.acquire("b", SHORT).unwrap());
    }

    #[test]
    fn test_local_lock_wakes_waiter_on_release() {
        let lock = Arc::new(LocalLock::new());
        assert!(lock.acquire("jobs", SHORT).unwrap());

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.acquire("jobs", Duration::from_secs(5)).unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        lock.release("jobs").unwrap();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let lock: Arc<dyn Lock> = Arc::new(LocalLock::new());
        {
            let guard = LockGuard::acquire(Arc::clone(&lock), "jobs".into(), SHORT).unwrap();
            assert!(guard.is_some());
            assert!(!lock.acquire("jobs", SHORT).unwrap());
        }
        assert!(lock.acquire("jobs", SHORT).unwrap());
    }

    #[test]
    fn test_file_lock_excludes_other_instances() {
        let temp_dir = tempfile::tempdir().unwrap();
        let first = FileLock::new(temp_dir.path());
        let second = FileLock::new(temp_dir.path()).with_poll_interval(Duration::from_millis(1));

        assert!(first.acquire("jobs", SHORT).unwrap());
        assert!(!second.acquire("jobs", SHORT).unwrap());
        assert!(second.acquire("other", SHORT).unwrap());

        first.release("jobs").unwrap();
        assert!(second.acquire("jobs", SHORT).unwrap());
    }

    #[test]
    fn test_removed_file_lock_is_recreated() {
        let temp_dir = tempfile::tempdir().unwrap();
        let lock: Arc<dyn Lock> = Arc::new(FileLock::new(temp_dir.path()));
        let path = temp_dir.path().join(format!("{}.lock", name_key("jobs")));

        {
            let guard = LockGuard::acquire(Arc::clone(&lock), "jobs".into(), SHORT)
                .unwrap()
                .unwrap();
            assert!(path.exists());
            guard.remove_lock().unwrap();
            assert!(!path.exists());
        }

        assert!(lock.acquire("jobs", SHORT).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_waiter_on_removed_file_lock_stays_exclusive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let holder = Arc::new(FileLock::new(temp_dir.path()));
        assert!(holder.acquire("jobs", SHORT).unwrap());

        let waiter = {
            let dir = temp_dir.path().to_path_buf();
            thread::spawn(move || {
                let lock = FileLock::new(dir).with_poll_interval(Duration::from_millis(1));
                let taken = lock.acquire("jobs", Duration::from_secs(5)).unwrap();
                (lock, taken)
            })
        };
        thread::sleep(Duration::from_millis(20));
        holder.remove("jobs").unwrap();
        holder.release("jobs").unwrap();

        let (waiter_lock, taken) = waiter.join().unwrap();
        assert!(taken);
        let third = FileLock::new(temp_dir.path());
        assert!(!third.acquire("jobs", SHORT).unwrap());
        waiter_lock.release("jobs").unwrap();
        assert!(third.acquire("jobs", SHORT).unwrap());
    }

    #[test]
    fn test_file_lock_release_of_unheld_name_is_noop() {
        let temp_dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(temp_dir.path());
        lock.release("never-taken").unwrap();
    }
}
