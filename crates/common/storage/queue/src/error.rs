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

use std::{io, time::Duration};

use snafu::Snafu;

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// The channel lock was not obtained before the timeout elapsed.
    ///
    /// Nothing was read or written; the caller may retry.
    #[snafu(display("Timed out after {timeout:?} waiting for lock {name}"))]
    LockTimeout { name: String, timeout: Duration },

    /// Filesystem or byte-region I/O failure.
    #[snafu(display("IO error on {location}: {source}"))]
    Io {
        location: String,
        source:   io::Error,
    },

    /// The codec could not encode a value.
    #[snafu(display("Failed to encode: {message}"))]
    Encode { message: String },

    /// The codec could not decode persisted bytes.
    #[snafu(display("Failed to decode: {message}"))]
    Decode { message: String },

    /// The header index block is shorter than its length prefix claims.
    #[snafu(display("Corrupted header index at {location}: {message}"))]
    CorruptIndex { location: String, message: String },

    /// Rejected configuration.
    #[snafu(display("Invalid queue configuration: {message}"))]
    InvalidConfig { message: String },

    /// Encoded payload does not fit the 4-byte length field.
    #[snafu(display("Encoded payload of {length} bytes exceeds the record size limit"))]
    PayloadTooLarge { length: usize },
}

impl QueueError {
    /// Whether calling the same operation again may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool { matches!(self, Self::LockTimeout { .. }) }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
