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

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ensure;

use crate::{Result, error::InvalidConfigSnafu};

/// Default seconds a message stays invisible after `send`.
pub const DEFAULT_DELAY: u32 = 0;

/// Default priority. Lower values are served first.
pub const DEFAULT_PRIORITY: u32 = 1024;

/// Default seconds a ready message stays claimable before it is dropped.
pub const DEFAULT_TTR: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct QueueConfig {
    /// Directory holding the per-channel `.map` and `.bin` files.
    #[default(_code = "PathBuf::from(\"./queue-message\")")]
    pub base_path:    PathBuf,
    #[default(DEFAULT_DELAY)]
    pub delay:        u32,
    #[default(DEFAULT_PRIORITY)]
    pub priority:     u32,
    #[default(DEFAULT_TTR)]
    pub ttr:          u32,
    /// Longest wait for a channel lock before failing with `LockTimeout`.
    #[default(_code = "Duration::from_secs(3)")]
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.base_path.as_os_str().is_empty(),
            InvalidConfigSnafu {
                message: "base_path must not be empty",
            }
        );
        ensure!(
            !self.lock_timeout.is_zero(),
            InvalidConfigSnafu {
                message: "lock_timeout must be greater than zero",
            }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.base_path, PathBuf::from("./queue-message"));
        assert_eq!(config.delay, 0);
        assert_eq!(config.priority, 1024);
        assert_eq!(config.ttr, 30);
        assert_eq!(config.lock_timeout, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = QueueConfig {
            lock_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_path() {
        let config = QueueConfig {
            base_path: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: QueueConfig =
            serde_json::from_str(r#"{"priority": 7, "lock_timeout": "500ms"}"#).unwrap();
        assert_eq!(config.priority, 7);
        assert_eq!(config.lock_timeout, Duration::from_millis(500));
        assert_eq!(config.ttr, DEFAULT_TTR);
    }
}
