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

//! Per-channel cached state.
//!
//! Each channel gets a [`ChannelState`] holding its open index and message
//! regions. States are created on first use, reopened when the storage
//! underneath has been deleted by someone else, and dropped on `clear`.
//! Header sets are never cached here: the persisted index is reloaded by
//! every operation.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tracing::debug;

use crate::{Result, backend::StorageBackend, file::Region};

/// Open regions of one channel.
#[derive(Default)]
pub struct ChannelState {
    index: Option<Box<dyn Region>>,
    data:  Option<Box<dyn Region>>,
}

/// Borrowed view of both regions of a channel.
pub struct ChannelRegions<'a> {
    pub index: &'a mut dyn Region,
    pub data:  &'a mut dyn Region,
}

impl ChannelState {
    /// Returns the channel's regions, opening them if missing or stale.
    pub fn regions(
        &mut self,
        backend: &dyn StorageBackend,
        channel: &str,
    ) -> Result<ChannelRegions<'_>> {
        let index = match self.index.take() {
            Some(region) if !region.is_stale() => self.index.insert(region),
            _ => {
                debug!(channel, "Opening header index");
                self.index.insert(backend.open_index(channel)?)
            }
        };
        let data = match self.data.take() {
            Some(region) if !region.is_stale() => self.data.insert(region),
            _ => {
                debug!(channel, "Opening message store");
                self.data.insert(backend.open_data(channel)?)
            }
        };

        Ok(ChannelRegions {
            index: index.as_mut(),
            data:  data.as_mut(),
        })
    }

    /// Closes both regions.
    pub fn close(&mut self) {
        self.index = None;
        self.data = None;
    }

    pub const fn is_open(&self) -> bool { self.index.is_some() || self.data.is_some() }
}

/// Channel-keyed owner of [`ChannelState`]s.
#[derive(Default)]
pub struct ChannelStore {
    channels: Mutex<HashMap<String, Arc<Mutex<ChannelState>>>>,
}

impl ChannelStore {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// The state for `channel`, created empty on first use.
    pub fn get(&self, channel: &str) -> Arc<Mutex<ChannelState>> {
        let mut channels = self.channels.lock();
        if let Some(state) = channels.get(channel) {
            return Arc::clone(state);
        }
        let state = Arc::new(Mutex::new(ChannelState::default()));
        channels.insert(channel.to_owned(), Arc::clone(&state));
        state
    }

    /// Closes and forgets the state for `channel`.
    pub fn remove(&self, channel: &str) {
        if let Some(state) = self.channels.lock().remove(channel) {
            state.lock().close();
        }
    }

    /// Number of channels with cached state.
    pub fn len(&self) -> usize { self.channels.lock().len() }

    pub fn is_empty(&self) -> bool { self.channels.lock().is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[test]
    fn test_state_is_created_once_per_channel() {
        let store = ChannelStore::new();
        let a = store.get("a");
        let again = store.get("a");
        assert!(Arc::ptr_eq(&a, &again));
        store.get("b");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_remove_closes_regions() {
        let backend = MemoryBackend::new();
        let store = ChannelStore::new();
        let state = store.get("jobs");
        state.lock().regions(&backend, "jobs").unwrap();
        assert!(state.lock().is_open());

        store.remove("jobs");
        assert!(!state.lock().is_open());
        assert!(store.is_empty());
    }

    #[test]
    fn test_stale_regions_are_reopened() {
        let backend = MemoryBackend::new();
        let mut state = ChannelState::default();
        {
            let regions = state.regions(&backend, "jobs").unwrap();
            regions.data.write_at(0, b"old").unwrap();
        }

        backend.remove("jobs").unwrap();
        let regions = state.regions(&backend, "jobs").unwrap();
        assert!(regions.data.is_empty().unwrap());
    }
}
