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

use std::{path::PathBuf, sync::Arc, time::Duration};

use snafu::ResultExt;

use crate::{
    Queue, QueueConfig, Result,
    backend::{FileBackend, MemoryBackend, StorageBackend},
    clock::{Clock, SystemClock},
    codec::{BincodeCodec, Codec},
    error::IoSnafu,
    lock::{LocalLock, Lock},
};

pub struct QueueBuilder<C = BincodeCodec> {
    config: QueueConfig,
    codec:  C,
    lock:   Option<Arc<dyn Lock>>,
    clock:  Option<Arc<dyn Clock>>,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self {
            config: QueueConfig {
                base_path: base_path.into(),
                ..Default::default()
            },
            codec:  BincodeCodec,
            lock:   None,
            clock:  None,
        }
    }
}

impl<C: Codec> QueueBuilder<C> {
    /// Replaces the whole configuration, base path included.
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn delay(mut self, seconds: u32) -> Self {
        self.config.delay = seconds;
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.config.priority = priority;
        self
    }

    pub fn ttr(mut self, seconds: u32) -> Self {
        self.config.ttr = seconds;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = timeout;
        self
    }

    /// Switches the codec used for payloads and the header index.
    pub fn codec<C2: Codec>(self, codec: C2) -> QueueBuilder<C2> {
        QueueBuilder {
            config: self.config,
            codec,
            lock: self.lock,
            clock: self.clock,
        }
    }

    /// Lock provider. Defaults to a [`LocalLock`] private to the queue.
    pub fn lock(mut self, lock: Arc<dyn Lock>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Time source. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds a queue storing channels as files under the base path,
    /// creating the directory if needed.
    pub fn build(self) -> Result<Queue<C>> {
        self.config.validate()?;
        let base_path = &self.config.base_path;
        std::fs::create_dir_all(base_path).context(IoSnafu {
            location: base_path.display().to_string(),
        })?;
        let backend = FileBackend::new(base_path.clone());
        Ok(self.finish(Box::new(backend)))
    }

    /// Builds a queue whose channels live on the heap. The base path is
    /// ignored.
    pub fn build_in_memory(self) -> Result<Queue<C>> {
        self.config.validate()?;
        Ok(self.finish(Box::new(MemoryBackend::new())))
    }

    fn finish(self, backend: Box<dyn StorageBackend>) -> Queue<C> {
        let lock = self
            .lock
            .unwrap_or_else(|| Arc::new(LocalLock::new()) as Arc<dyn Lock>);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        Queue::new(self.config, self.codec, lock, clock, backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QueueError, codec::JsonCodec};

    #[test]
    fn test_builder_default_config() {
        let builder = QueueBuilder::new("/tmp/test_queue");
        assert_eq!(builder.config.base_path, PathBuf::from("/tmp/test_queue"));
        assert_eq!(builder.config.delay, 0);
        assert_eq!(builder.config.priority, 1024);
        assert_eq!(builder.config.ttr, 30);
        assert_eq!(builder.config.lock_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_builder_custom_config() {
        let builder = QueueBuilder::new("/tmp/test_queue")
            .delay(5)
            .priority(10)
            .ttr(60)
            .lock_timeout(Duration::from_millis(250))
            .codec(JsonCodec);

        assert_eq!(builder.config.delay, 5);
        assert_eq!(builder.config.priority, 10);
        assert_eq!(builder.config.ttr, 60);
        assert_eq!(builder.config.lock_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_build_creates_base_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path().join("nested").join("queue");
        let queue = QueueBuilder::new(&base).build().unwrap();
        assert!(base.is_dir());
        assert_eq!(queue.config().base_path, base);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = QueueBuilder::new("/tmp/test_queue")
            .lock_timeout(Duration::ZERO)
            .build_in_memory()
            .err()
            .unwrap();
        assert!(matches!(err, QueueError::InvalidConfig { .. }));
    }
}
