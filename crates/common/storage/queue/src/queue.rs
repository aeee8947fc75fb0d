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

//! Channel orchestration.
//!
//! The [`Queue`] runs every operation on a channel the same way:
//!
//! 1. take the channel lock (or fail with `LockTimeout`)
//! 2. load the header index and drop expired headers
//! 3. allocate and write (`send`) or select and read (`receive`)
//! 4. persist the surviving headers
//! 5. release the lock, on every exit path
//!
//! ## Usage
//!
//! ```ignore
//! let queue = QueueBuilder::new("/path/to/queue").build()?;
//!
//! queue.send("jobs", "hello", SendOptions::builder().priority(10).build())?;
//! let job: Option<String> = queue.receive("jobs")?;
//!
//! queue.clear("jobs")?;
//! ```
//!
//! Message bytes are written before the index that references them. A crash
//! between the two leaves unreferenced bytes in the store; they are
//! harmless and get overwritten by later allocations.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ResultExt};
use tracing::{debug, info, trace, warn};

use crate::{
    QueueConfig, Result,
    allocator::find_offset,
    backend::StorageBackend,
    channel::{ChannelRegions, ChannelStore},
    clock::Clock,
    codec::{BincodeCodec, Codec},
    error::{IoSnafu, LockTimeoutSnafu, PayloadTooLargeSnafu},
    header::{Header, select_ready, sweep_expired},
    index,
    lock::{Lock, LockGuard},
    message::{self, ChannelStats, SendOptions},
};

/// Prefix of every channel lock name.
pub const LOCK_NAMESPACE: &str = "courier::queue::";

/// Backend-neutral queue contract.
///
/// Any storage that can honour per-channel priority, delay and TTR ordering
/// implements this trait; [`Queue`] is the file and memory backed one.
pub trait QueueMessage {
    /// Stores `payload` on `channel`, returning the number of messages now
    /// pending on that channel.
    fn send<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        payload: &T,
        options: SendOptions,
    ) -> Result<usize>;

    /// Removes and returns the next ready message, or `None` when nothing
    /// is ready.
    fn receive<T: DeserializeOwned>(&self, channel: &str) -> Result<Option<T>>;

    /// Drops every message of `channel` together with its storage.
    fn clear(&self, channel: &str) -> Result<()>;
}

/// An embeddable multi-channel message queue.
///
/// Safe to share between threads. Operations on different channels only
/// contend on short map lookups; operations on the same channel are
/// serialized by the channel lock.
pub struct Queue<C = BincodeCodec> {
    config:   QueueConfig,
    codec:    C,
    lock:     Arc<dyn Lock>,
    clock:    Arc<dyn Clock>,
    backend:  Box<dyn StorageBackend>,
    /// Open regions per channel, torn down on `clear`.
    channels: ChannelStore,
}

impl<C: Codec> Queue<C> {
    pub(crate) fn new(
        config: QueueConfig,
        codec: C,
        lock: Arc<dyn Lock>,
        clock: Arc<dyn Clock>,
        backend: Box<dyn StorageBackend>,
    ) -> Self {
        info!(
            path = ?config.base_path,
            delay = config.delay,
            priority = config.priority,
            ttr = config.ttr,
            lock_timeout = ?config.lock_timeout,
            "Queue initialized"
        );

        Self {
            config,
            codec,
            lock,
            clock,
            backend,
            channels: ChannelStore::new(),
        }
    }

    /// Lock name guarding `channel`.
    #[must_use]
    pub fn lock_name(channel: &str) -> String { format!("{LOCK_NAMESPACE}{channel}") }

    /// Stores already-encoded bytes on `channel`.
    ///
    /// Returns the number of messages pending on the channel afterwards.
    pub fn send_raw(&self, channel: &str, bytes: &[u8], options: SendOptions) -> Result<usize> {
        let length = u32::try_from(bytes.len())
            .ok()
            .context(PayloadTooLargeSnafu {
                length: bytes.len(),
            })?;

        self.with_channel(channel, |regions, now| {
            let mut headers = self.load_live(regions, channel, now)?;

            let offset = find_offset(&headers, length);
            trace!(channel, offset, length, "Allocated message region");
            message::write(regions.data, offset, bytes)?;

            let header = Header {
                pushed_at: now,
                delay: options.delay.unwrap_or(self.config.delay),
                priority: options.priority.unwrap_or(self.config.priority),
                ttr: options.ttr.unwrap_or(self.config.ttr),
                length,
                offset,
            };
            headers.push(header);
            index::save(regions.index, &self.codec, &headers)?;

            debug!(
                channel,
                offset,
                length,
                priority = header.priority,
                delay = header.delay,
                pending = headers.len(),
                "Sent message"
            );
            Ok(headers.len())
        })
    }

    /// Removes the next ready message and returns its stored bytes.
    pub fn receive_raw(&self, channel: &str) -> Result<Option<Vec<u8>>> {
        self.receive_with(channel, |bytes| Ok(bytes.to_vec()))
    }

    /// Sweeps `channel` and reports what is left in it.
    pub fn stats(&self, channel: &str) -> Result<ChannelStats> {
        self.with_channel(channel, |regions, now| {
            let headers = self.load_live(regions, channel, now)?;
            index::save(regions.index, &self.codec, &headers)?;

            let ready = headers.iter().filter(|h| h.is_ready(now)).count();
            let store_len = regions.data.len().context(IoSnafu {
                location: regions.data.location(),
            })?;
            Ok(ChannelStats {
                pending: headers.len(),
                ready,
                delayed: headers.len() - ready,
                store_len,
            })
        })
    }

    #[must_use]
    pub const fn config(&self) -> &QueueConfig { &self.config }

    #[must_use]
    pub const fn codec(&self) -> &C { &self.codec }

    /// Selects the next ready message and hands its bytes to `decode`.
    ///
    /// The selected header is removed from the index before decoding, so a
    /// message that cannot be decoded is dropped and its `Decode` error
    /// returned instead of blocking the channel.
    fn receive_with<R>(
        &self,
        channel: &str,
        decode: impl FnOnce(&[u8]) -> Result<R>,
    ) -> Result<Option<R>> {
        self.with_channel(channel, |regions, now| {
            let headers = self.load_live(regions, channel, now)?;

            let Some(position) = select_ready(&headers, now) else {
                index::save(regions.index, &self.codec, &headers)?;
                trace!(channel, pending = headers.len(), "No ready message");
                return Ok(None);
            };

            let selected = headers[position];
            let bytes = message::read(regions.data, &selected)?;

            let remaining: Vec<Header> = headers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != position)
                .map(|(_, h)| *h)
                .collect();
            index::save(regions.index, &self.codec, &remaining)?;

            let value = decode(bytes.as_slice()).inspect_err(|e| {
                warn!(
                    channel,
                    offset = selected.offset,
                    error = %e,
                    "Dropped undecodable message"
                );
            })?;

            debug!(
                channel,
                offset = selected.offset,
                length = selected.length,
                priority = selected.priority,
                pending = remaining.len(),
                "Received message"
            );
            Ok(Some(value))
        })
    }

    /// Runs `op` with the channel locked and its regions open.
    fn with_channel<R>(
        &self,
        channel: &str,
        op: impl FnOnce(&mut ChannelRegions<'_>, u64) -> Result<R>,
    ) -> Result<R> {
        let _guard = self.lock_channel(channel)?;

        let state = self.channels.get(channel);
        let mut state = state.lock();
        let mut regions = state.regions(self.backend.as_ref(), channel)?;
        let now = self.clock.now_millis();
        op(&mut regions, now)
    }

    fn lock_channel(&self, channel: &str) -> Result<LockGuard> {
        let name = Self::lock_name(channel);
        let timeout = self.config.lock_timeout;
        let guard = LockGuard::acquire(Arc::clone(&self.lock), name.clone(), timeout)?;
        guard.context(LockTimeoutSnafu { name, timeout }).inspect_err(|_| {
            warn!(channel, ?timeout, "Timed out waiting for channel lock");
        })
    }

    fn load_live(
        &self,
        regions: &mut ChannelRegions<'_>,
        channel: &str,
        now: u64,
    ) -> Result<Vec<Header>> {
        let mut headers = index::load(regions.index, &self.codec)?;
        let expired = sweep_expired(&mut headers, now);
        if expired > 0 {
            debug!(channel, expired, "Dropped expired messages");
        }
        Ok(headers)
    }
}

impl<C: Codec> QueueMessage for Queue<C> {
    fn send<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        payload: &T,
        options: SendOptions,
    ) -> Result<usize> {
        let bytes = self.codec.encode(payload)?;
        self.send_raw(channel, &bytes, options)
    }

    fn receive<T: DeserializeOwned>(&self, channel: &str) -> Result<Option<T>> {
        self.receive_with(channel, |bytes| self.codec.decode(bytes))
    }

    fn clear(&self, channel: &str) -> Result<()> {
        let guard = self.lock_channel(channel)?;
        self.channels.remove(channel);
        self.backend.remove(channel)?;
        if let Err(e) = guard.remove_lock() {
            warn!(channel, error = %e, "Failed to remove channel lock");
        }
        debug!(channel, "Cleared channel");
        Ok(())
    }
}
