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

//! # Panic Hook and Deadlock Detection
//!
//! Routes panics through `tracing` so they land in the same sinks as the
//! queue's own logs. With `deadlock_detection`, a background thread also
//! reports `parking_lot` lock cycles, such as a channel mutex held across a
//! blocking lock acquisition.

#[cfg(feature = "deadlock_detection")]
use std::time::Duration;
use std::{panic, sync::LazyLock};

use backtrace::Backtrace;
use prometheus::{IntCounter, register_int_counter};

/// Prometheus counter of panics seen by the hook, registered in the default
/// registry. `None` when registration failed, e.g. on a name clash.
pub static PANIC_COUNTER: LazyLock<Option<IntCounter>> = LazyLock::new(|| {
    register_int_counter!("courier_panic_counter", "panics caught by the courier hook").ok()
});

/// Set up enhanced panic handling with structured logging.
///
/// The previous hook still runs afterwards, so the usual stderr report is
/// kept.
pub fn set_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic| {
        let backtrace = Backtrace::new();
        let backtrace = format!("{backtrace:?}");
        if let Some(location) = panic.location() {
            tracing::error!(
                message = %panic,
                backtrace = %backtrace,
                panic.file = location.file(),
                panic.line = location.line(),
                panic.column = location.column(),
            );
        } else {
            tracing::error!(message = %panic, backtrace = %backtrace);
        }
        if let Some(counter) = PANIC_COUNTER.as_ref() {
            counter.inc();
        }
        default_hook(panic);
    }));

    #[cfg(feature = "deadlock_detection")]
    let _ = std::thread::spawn(move || {
        loop {
            std::thread::sleep(Duration::from_secs(5));
            let deadlocks = parking_lot::deadlock::check_deadlock();
            if deadlocks.is_empty() {
                continue;
            }

            tracing::error!("{} deadlocks detected", deadlocks.len());
            for (i, threads) in deadlocks.iter().enumerate() {
                for t in threads {
                    tracing::error!(
                        deadlock = i,
                        thread_id = ?t.thread_id(),
                        backtrace = ?t.backtrace(),
                        "Deadlocked thread"
                    );
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panic_count() -> u64 { PANIC_COUNTER.as_ref().map_or(0, IntCounter::get) }

    #[test]
    fn test_panic_is_counted() {
        set_panic_hook();
        let before = panic_count();
        let result = panic::catch_unwind(|| panic!("boom"));
        assert!(result.is_err());
        assert!(panic_count() > before);
        assert!(PANIC_COUNTER.is_some());
    }
}
