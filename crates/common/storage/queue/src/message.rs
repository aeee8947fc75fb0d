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

//! Message store I/O and the per-message options of `send`.
//!
//! ## Message Store Format
//!
//! The store is a flat byte array with no framing. A message's bytes live at
//! `[offset, offset + length)` as recorded by its header; everything else is
//! either free space or bytes of messages already delivered or expired.

use serde::Serialize;
use snafu::{ResultExt, ensure};

use crate::{
    Result,
    error::{CorruptIndexSnafu, IoSnafu},
    file::Region,
    header::Header,
};

/// Per-call overrides for `send`. Unset fields fall back to the queue
/// configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bon::Builder)]
pub struct SendOptions {
    /// Seconds before the message becomes visible.
    pub delay:    Option<u32>,
    /// Lower values are served first.
    pub priority: Option<u32>,
    /// Seconds the message may wait to be read once visible.
    pub ttr:      Option<u32>,
}

/// Snapshot of a channel taken under its lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Live headers after the expiry sweep.
    pub pending:   usize,
    /// Pending messages whose delay has elapsed.
    pub ready:     usize,
    /// Pending messages still invisible.
    pub delayed:   usize,
    /// Current size of the message store in bytes, gaps included.
    pub store_len: u64,
}

/// Writes a message's bytes at `offset`.
pub fn write(region: &mut dyn Region, offset: u64, bytes: &[u8]) -> Result<()> {
    let location = region.location();
    region
        .write_at(offset, bytes)
        .context(IoSnafu { location })
}

/// Reads the bytes a header points at.
///
/// A header reaching past the end of the store fails with `CorruptIndex`
/// before anything is allocated for it.
pub fn read(region: &mut dyn Region, header: &Header) -> Result<Vec<u8>> {
    let location = region.location();
    let store_len = region.len().context(IoSnafu {
        location: location.clone(),
    })?;
    let end = header.offset.checked_add(u64::from(header.length));
    ensure!(
        end.is_some_and(|end| end <= store_len),
        CorruptIndexSnafu {
            location: location.clone(),
            message:  format!(
                "message at {} with length {} exceeds the {store_len} byte store",
                header.offset, header.length
            ),
        }
    );

    let mut buf = vec![0u8; header.length as usize];
    region
        .read_at(header.offset, &mut buf)
        .context(IoSnafu { location })?;
    Ok(buf)
}
