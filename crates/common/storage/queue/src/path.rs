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

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Extension of the per-channel header index file.
pub const INDEX_FILE_EXTENSION: &str = "map";

/// Extension of the per-channel message store file.
pub const DATA_FILE_EXTENSION: &str = "bin";

/// Stable file-name-safe key for an arbitrary name: lowercase hex SHA-256.
#[must_use]
pub fn name_key(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Index file name for a channel: `<sha256>.map`.
#[must_use]
pub fn index_file_name(channel: &str) -> String {
    format!("{}.{INDEX_FILE_EXTENSION}", name_key(channel))
}

/// Message store file name for a channel: `<sha256>.bin`.
#[must_use]
pub fn data_file_name(channel: &str) -> String {
    format!("{}.{DATA_FILE_EXTENSION}", name_key(channel))
}

/// Returns full path to a channel's index file: `base/<sha256>.map`.
pub fn index_file_path<P: AsRef<Path>>(base: P, channel: &str) -> PathBuf {
    base.as_ref().join(index_file_name(channel))
}

/// Returns full path to a channel's message file: `base/<sha256>.bin`.
pub fn data_file_path<P: AsRef<Path>>(base: P, channel: &str) -> PathBuf {
    base.as_ref().join(data_file_name(channel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_key_is_stable_sha256() {
        assert_eq!(
            name_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(name_key("jobs").len(), 64);
        assert_eq!(
            name_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_distinct_channels_get_distinct_files() {
        assert_ne!(index_file_name("a"), index_file_name("b"));
        assert_ne!(index_file_name("a"), data_file_name("a"));
    }

    #[test]
    fn test_full_paths() {
        let key = name_key("jobs");
        assert_eq!(
            index_file_path("/queue", "jobs"),
            PathBuf::from(format!("/queue/{key}.map"))
        );
        assert_eq!(
            data_file_path("/queue", "jobs"),
            PathBuf::from(format!("/queue/{key}.bin"))
        );
    }
}
