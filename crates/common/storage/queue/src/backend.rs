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

//! Where a channel's index and message regions live.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use snafu::ResultExt;

use crate::{
    Result,
    error::IoSnafu,
    file::{DataFile, MemoryFile, Region},
    path::{data_file_path, index_file_path},
};

pub trait StorageBackend: Send + Sync {
    fn open_index(&self, channel: &str) -> Result<Box<dyn Region>>;

    fn open_data(&self, channel: &str) -> Result<Box<dyn Region>>;

    /// Deletes both regions of `channel`. Missing regions are not an error.
    fn remove(&self, channel: &str) -> Result<()>;
}

/// Two files per channel under `base_path`, named by the channel's hash.
#[derive(Debug, Clone)]
pub struct FileBackend {
    base_path: PathBuf,
}

impl FileBackend {
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path { &self.base_path }

    fn open(path: &Path) -> Result<Box<dyn Region>> {
        let file = DataFile::open(path).context(IoSnafu {
            location: path.display().to_string(),
        })?;
        Ok(Box::new(file))
    }

    fn remove_file(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(IoSnafu {
                location: path.display().to_string(),
            }),
        }
    }
}

impl StorageBackend for FileBackend {
    fn open_index(&self, channel: &str) -> Result<Box<dyn Region>> {
        Self::open(&index_file_path(&self.base_path, channel))
    }

    fn open_data(&self, channel: &str) -> Result<Box<dyn Region>> {
        Self::open(&data_file_path(&self.base_path, channel))
    }

    fn remove(&self, channel: &str) -> Result<()> {
        Self::remove_file(&index_file_path(&self.base_path, channel))?;
        Self::remove_file(&data_file_path(&self.base_path, channel))
    }
}

type SharedFile = Arc<Mutex<MemoryFile>>;

/// Keeps every region on the heap. Nothing survives the backend.
#[derive(Default)]
pub struct MemoryBackend {
    regions: Mutex<HashMap<String, SharedFile>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn open(&self, key: String) -> Box<dyn Region> {
        let file = Arc::clone(
            self.regions
                .lock()
                .entry(key)
                .or_insert_with_key(|key| Arc::new(Mutex::new(MemoryFile::new(key.clone())))),
        );
        Box::new(SharedRegion { file })
    }
}

impl StorageBackend for MemoryBackend {
    fn open_index(&self, channel: &str) -> Result<Box<dyn Region>> {
        Ok(self.open(format!("{channel}.map")))
    }

    fn open_data(&self, channel: &str) -> Result<Box<dyn Region>> {
        Ok(self.open(format!("{channel}.bin")))
    }

    fn remove(&self, channel: &str) -> Result<()> {
        let mut regions = self.regions.lock();
        regions.remove(&format!("{channel}.map"));
        regions.remove(&format!("{channel}.bin"));
        Ok(())
    }
}

/// Handle onto a region owned by a [`MemoryBackend`].
///
/// Once the backend drops its copy the handle is the last owner and reports
/// itself stale.
struct SharedRegion {
    file: SharedFile,
}

impl Region for SharedRegion {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.lock().read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.lock().write_at(offset, data)
    }

    fn len(&mut self) -> io::Result<u64> { self.file.lock().len() }

    fn truncate(&mut self, len: u64) -> io::Result<()> { self.file.lock().truncate(len) }

    fn is_stale(&self) -> bool { Arc::strong_count(&self.file) == 1 }

    fn location(&self) -> String { self.file.lock().location() }
}
