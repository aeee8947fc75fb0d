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

//! Header index persistence.
//!
//! ## Index File Format
//!
//! ```text
//! ┌─────────────────┬──────────────────────────────────────────┐
//! │  Length (4B)    │   Encoded header tuples (Length bytes)   │
//! │  little-endian  │   codec-defined                          │
//! └─────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! - **Length**: size of the encoded block. A zero prefix, or a file shorter
//!   than four bytes, is an empty index.
//! - **Block**: the codec's encoding of a sequence of
//!   `(pushed_at, delay, priority, ttr, length, offset)` tuples.
//!
//! The whole file is rewritten on every save and truncated to
//! `4 + Length`, so no bytes from an older, longer block survive.

use snafu::{OptionExt, ResultExt, ensure};
use tracing::trace;

use crate::{
    Result,
    codec::Codec,
    error::{CorruptIndexSnafu, IoSnafu, PayloadTooLargeSnafu},
    file::Region,
    header::{Header, HeaderTuple},
};

/// Size of the little-endian length prefix.
pub const INDEX_PREFIX_SIZE: u64 = 4;

/// Reads every header stored in `region`.
pub fn load<C: Codec + ?Sized>(region: &mut dyn Region, codec: &C) -> Result<Vec<Header>> {
    let location = region.location();
    let file_len = region.len().context(IoSnafu {
        location: location.clone(),
    })?;
    if file_len < INDEX_PREFIX_SIZE {
        return Ok(Vec::new());
    }

    let mut prefix = [0u8; INDEX_PREFIX_SIZE as usize];
    region.read_at(0, &mut prefix).context(IoSnafu {
        location: location.clone(),
    })?;
    let size = u64::from(u32::from_le_bytes(prefix));
    if size == 0 {
        return Ok(Vec::new());
    }

    ensure!(
        INDEX_PREFIX_SIZE + size <= file_len,
        CorruptIndexSnafu {
            location: location.clone(),
            message:  format!(
                "length prefix {size} exceeds the {} bytes after it",
                file_len - INDEX_PREFIX_SIZE
            ),
        }
    );

    let size = usize::try_from(size).ok().context(CorruptIndexSnafu {
        location: location.clone(),
        message:  "length prefix does not fit in memory",
    })?;
    let mut block = vec![0u8; size];
    region
        .read_at(INDEX_PREFIX_SIZE, &mut block)
        .context(IoSnafu { location })?;

    let tuples: Vec<HeaderTuple> = codec.decode(&block)?;
    Ok(tuples.into_iter().map(Header::from_tuple).collect())
}

/// Replaces the index in `region` with `headers`.
pub fn save<C: Codec + ?Sized>(
    region: &mut dyn Region,
    codec: &C,
    headers: &[Header],
) -> Result<()> {
    let tuples: Vec<HeaderTuple> = headers.iter().map(|h| h.to_tuple()).collect();
    let block = codec.encode(&tuples)?;
    let size = u32::try_from(block.len())
        .ok()
        .context(PayloadTooLargeSnafu {
            length: block.len(),
        })?;

    let mut bytes = Vec::with_capacity(INDEX_PREFIX_SIZE as usize + block.len());
    bytes.extend_from_slice(&size.to_le_bytes());
    bytes.extend_from_slice(&block);

    let location = region.location();
    region.write_at(0, &bytes).context(IoSnafu {
        location: location.clone(),
    })?;
    region
        .truncate(bytes.len() as u64)
        .context(IoSnafu { location })?;

    trace!(headers = headers.len(), size, "Saved header index");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        QueueError,
        codec::{BincodeCodec, JsonCodec},
        file::{DataFile, MemoryFile},
    };

    fn header(offset: u64, length: u32) -> Header {
        Header {
            pushed_at: 1_700_000_000_000 + offset,
            delay: 0,
            priority: 1024,
            ttr: 30,
            length,
            offset,
        }
    }

    #[test]
    fn test_empty_region_is_empty_index() {
        let mut region = MemoryFile::new("idx");
        assert!(load(&mut region, &BincodeCodec).unwrap().is_empty());
    }

    #[test]
    fn test_zero_prefix_is_empty_index() {
        let mut region = MemoryFile::new("idx");
        region.write_at(0, &[0, 0, 0, 0, 9, 9]).unwrap();
        assert!(load(&mut region, &BincodeCodec).unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let headers = vec![header(0, 10), header(10, 3), header(40, 7)];
        let mut region = MemoryFile::new("idx");
        save(&mut region, &BincodeCodec, &headers).unwrap();
        assert_eq!(load(&mut region, &BincodeCodec).unwrap(), headers);
    }

    #[test]
    fn test_prefix_is_little_endian_block_length() {
        let mut region = MemoryFile::new("idx");
        save(&mut region, &JsonCodec, &[header(0, 1)]).unwrap();

        let bytes = region.as_slice();
        let size = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        assert_eq!(bytes.len(), 4 + size);
        assert!(bytes[4..].starts_with(b"[["));
    }

    #[test]
    fn test_shorter_save_truncates_stale_tail() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("jobs.map");
        let mut region = DataFile::open(&path).unwrap();

        let many: Vec<Header> = (0..32).map(|i| header(i * 8, 8)).collect();
        save(&mut region, &BincodeCodec, &many).unwrap();
        let long_len = std::fs::metadata(&path).unwrap().len();

        save(&mut region, &BincodeCodec, &many[..1]).unwrap();
        let short_len = std::fs::metadata(&path).unwrap().len();
        assert!(short_len < long_len);
        assert_eq!(load(&mut region, &BincodeCodec).unwrap(), many[..1].to_vec());
    }

    #[test]
    fn test_prefix_longer_than_file_is_corrupt() {
        let mut region = MemoryFile::new("idx");
        region.write_at(0, &[100, 0, 0, 0, 1, 2, 3]).unwrap();
        let err = load(&mut region, &BincodeCodec).unwrap_err();
        assert!(matches!(err, QueueError::CorruptIndex { .. }));
    }

    #[test]
    fn test_garbage_block_is_decode_error() {
        let mut region = MemoryFile::new("idx");
        region.write_at(0, &[3, 0, 0, 0, b'{', b'x', b'!']).unwrap();
        let err = load(&mut region, &JsonCodec).unwrap_err();
        assert!(matches!(err, QueueError::Decode { .. }));
    }
}
