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

//! Random-access byte regions backing the header index and message store.
//!
//! Every read or write seeks to its offset and performs exactly one
//! transfer of the requested length. Regions grow on write and are never
//! truncated except when the header index is rewritten.

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// A positioned byte region.
pub trait Region: Send {
    /// Fill `buf` from `offset`, failing with `UnexpectedEof` if the region
    /// is shorter.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Write `data` at `offset`, growing the region when needed.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    fn len(&mut self) -> io::Result<u64>;

    fn is_empty(&mut self) -> io::Result<bool> { Ok(self.len()? == 0) }

    /// Cut the region down to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// True when the region no longer refers to live storage, e.g. the file
    /// it was opened from has been deleted or replaced.
    fn is_stale(&self) -> bool { false }

    /// Human readable location used in error messages.
    fn location(&self) -> String;
}

/// File-backed region, opened read-write and created on first use.
pub struct DataFile {
    file: File,
    path: PathBuf,
}

impl DataFile {
    /// Open `path`, creating an empty file if it does not exist.
    ///
    /// Existing content is left untouched.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn same_file_on_disk(&self) -> bool { is_same_file(&self.file, &self.path) }
}

/// Whether `path` still names the file behind the open handle `file`.
#[cfg(unix)]
pub(crate) fn is_same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(open), Ok(on_disk)) => open.dev() == on_disk.dev() && open.ino() == on_disk.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
pub(crate) fn is_same_file(_file: &File, path: &Path) -> bool { path.exists() }

impl Region for DataFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)
    }

    fn len(&mut self) -> io::Result<u64> { Ok(self.file.metadata()?.len()) }

    fn truncate(&mut self, len: u64) -> io::Result<()> { self.file.set_len(len) }

    fn is_stale(&self) -> bool { !self.same_file_on_disk() }

    fn location(&self) -> String { self.path.display().to_string() }
}

/// Heap-backed region for in-memory queues.
#[derive(Debug, Default, Clone)]
pub struct MemoryFile {
    name: String,
    data: Vec<u8>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Vec::new(),
        }
    }

    pub fn as_slice(&self) -> &[u8] { &self.data }
}

impl Region for MemoryFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = usize::try_from(offset).map_err(|_| io::ErrorKind::UnexpectedEof)?;
        let end = start
            .checked_add(buf.len())
            .filter(|end| *end <= self.data.len())
            .ok_or(io::ErrorKind::UnexpectedEof)?;
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let start = usize::try_from(offset).map_err(|_| io::ErrorKind::InvalidInput)?;
        let end = start
            .checked_add(data.len())
            .ok_or(io::ErrorKind::InvalidInput)?;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn len(&mut self) -> io::Result<u64> { Ok(self.data.len() as u64) }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(|_| io::ErrorKind::InvalidInput)?;
        self.data.truncate(len);
        Ok(())
    }

    fn location(&self) -> String { format!("memory:{}", self.name) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested/test.bin");

        let mut file = DataFile::open(&path).unwrap();
        assert!(path.exists());
        assert!(file.is_empty().unwrap());
    }

    #[test]
    fn test_write_and_read_at_offset() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.bin");

        {
            let mut file = DataFile::open(&path).unwrap();
            file.write_at(100, b"Test data at offset").unwrap();
        }

        let mut file = DataFile::open(&path).unwrap();
        assert_eq!(file.len().unwrap(), 119);
        let mut buf = [0u8; 19];
        file.read_at(100, &mut buf).unwrap();
        assert_eq!(&buf, b"Test data at offset");
    }

    #[test]
    fn test_read_past_end_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut file = DataFile::open(temp_dir.path().join("short.bin")).unwrap();
        file.write_at(0, b"abc").unwrap();

        let mut buf = [0u8; 4];
        let err = file.read_at(0, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_deleted_file_is_stale() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("gone.bin");
        let file = DataFile::open(&path).unwrap();
        assert!(!file.is_stale());

        std::fs::remove_file(&path).unwrap();
        assert!(file.is_stale());
    }

    #[test]
    fn test_memory_file_grows_and_truncates() {
        let mut file = MemoryFile::new("jobs");
        file.write_at(4, b"xy").unwrap();
        assert_eq!(file.as_slice(), &[0, 0, 0, 0, b'x', b'y']);

        file.truncate(5).unwrap();
        assert_eq!(file.len().unwrap(), 5);

        let mut buf = [0u8; 2];
        assert_eq!(
            file.read_at(4, &mut buf).unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }
}
