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

//! Per-message metadata kept in the header index.
//!
//! A [`Header`] describes one pending message: when it was pushed, how long
//! it stays invisible, its priority, how long it may wait to be read once
//! visible, and where its bytes live in the channel's message store.
//!
//! Headers are persisted as the tuple
//! `(pushed_at, delay, priority, ttr, length, offset)` so the index block stays
//! independent of field names.

/// Wire shape of one header inside the encoded index block.
pub(crate) type HeaderTuple = (u64, u32, u32, u32, u32, u64);

const MILLIS_PER_SECOND: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Unix time in milliseconds when the message was sent.
    pub pushed_at: u64,
    /// Seconds after `pushed_at` before the message becomes ready.
    pub delay:     u32,
    /// Lower values are delivered first.
    pub priority:  u32,
    /// Seconds a ready message stays claimable before it expires.
    pub ttr:       u32,
    /// Byte length of the stored message.
    pub length:    u32,
    /// Byte position of the stored message.
    pub offset:    u64,
}

impl Header {
    /// Time in milliseconds at which the message becomes ready.
    #[must_use]
    pub const fn ready_at(&self) -> u64 {
        self.pushed_at
            .saturating_add(self.delay as u64 * MILLIS_PER_SECOND)
    }

    /// Time in milliseconds after which the message is dropped unread.
    #[must_use]
    pub const fn deadline(&self) -> u64 {
        self.ready_at()
            .saturating_add(self.ttr as u64 * MILLIS_PER_SECOND)
    }

    #[must_use]
    pub const fn is_ready(&self, now: u64) -> bool { self.ready_at() <= now }

    #[must_use]
    pub const fn is_expired(&self, now: u64) -> bool { self.deadline() < now }

    /// One past the last byte occupied in the message store.
    #[must_use]
    pub const fn end(&self) -> u64 { self.offset + self.length as u64 }

    pub(crate) const fn to_tuple(self) -> HeaderTuple {
        (
            self.pushed_at,
            self.delay,
            self.priority,
            self.ttr,
            self.length,
            self.offset,
        )
    }

    pub(crate) const fn from_tuple(tuple: HeaderTuple) -> Self {
        let (pushed_at, delay, priority, ttr, length, offset) = tuple;
        Self {
            pushed_at,
            delay,
            priority,
            ttr,
            length,
            offset,
        }
    }
}

/// Drops every expired header, returning how many were removed.
pub fn sweep_expired(headers: &mut Vec<Header>, now: u64) -> usize {
    let before = headers.len();
    headers.retain(|header| !header.is_expired(now));
    before - headers.len()
}

/// Picks the header `receive` should deliver.
///
/// Among ready headers the lowest priority wins, then the earliest
/// `ready_at`, then the earliest position in the index.
#[must_use]
pub fn select_ready(headers: &[Header], now: u64) -> Option<usize> {
    headers
        .iter()
        .enumerate()
        .filter(|(_, header)| header.is_ready(now))
        .min_by_key(|(position, header)| (header.priority, header.ready_at(), *position))
        .map(|(position, _)| position)
}
