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

//! Embeddable multi-channel message queue with priority, delayed visibility
//! and time-to-run expiry, persisted as two files per channel.

pub mod allocator;
pub mod backend;
pub mod builder;
pub mod channel;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod file;
pub mod header;
pub mod index;
pub mod lock;
pub mod message;
pub mod path;
pub mod queue;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use builder::QueueBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use config::QueueConfig;
pub use error::{QueueError, Result};
pub use file::{DataFile, MemoryFile, Region};
pub use header::Header;
pub use lock::{FileLock, LocalLock, Lock, LockGuard};
pub use message::{ChannelStats, SendOptions};
pub use queue::{Queue, QueueMessage};
