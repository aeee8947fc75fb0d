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

//! Payload serialization.
//!
//! The queue never looks inside a payload. A [`Codec`] turns values into
//! bytes on `send` and back on `receive`; the same codec also encodes the
//! header tuples of the index block.

use serde::{Serialize, de::DeserializeOwned};
use snafu::ensure;

use crate::{
    Result,
    error::{DecodeSnafu, EncodeSnafu},
};

pub trait Codec: Send + Sync {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Compact binary encoding using bincode's standard configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(|e| {
            EncodeSnafu {
                message: e.to_string(),
            }
            .build()
        })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let (value, consumed) =
            bincode::serde::decode_from_slice::<T, _>(bytes, bincode::config::standard())
                .map_err(|e| {
                    DecodeSnafu {
                        message: e.to_string(),
                    }
                    .build()
                })?;
        ensure!(
            consumed == bytes.len(),
            DecodeSnafu {
                message: format!("{} trailing bytes", bytes.len() - consumed),
            }
        );
        Ok(value)
    }
}

/// JSON encoding, handy when the store should stay human readable.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| {
            EncodeSnafu {
                message: e.to_string(),
            }
            .build()
        })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| {
            DecodeSnafu {
                message: e.to_string(),
            }
            .build()
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::QueueError;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Job {
        id:   u64,
        name: String,
        tags: Vec<String>,
    }

    fn job() -> Job {
        Job {
            id:   42,
            name: "resize".to_string(),
            tags: vec!["image".to_string()],
        }
    }

    #[test]
    fn test_bincode_decodes_what_it_encodes() {
        let bytes = BincodeCodec.encode(&job()).unwrap();
        let back: Job = BincodeCodec.decode(&bytes).unwrap();
        assert_eq!(back, job());
    }

    #[test]
    fn test_json_is_readable() {
        let bytes = JsonCodec.encode(&job()).unwrap();
        assert!(std::str::from_utf8(&bytes).unwrap().contains("\"resize\""));
    }

    #[test]
    fn test_bincode_rejects_trailing_bytes() {
        let mut bytes = BincodeCodec.encode(&7_u32).unwrap();
        bytes.push(0);
        let err = BincodeCodec.decode::<u32>(&bytes).unwrap_err();
        assert!(matches!(err, QueueError::Decode { .. }));
    }

    #[test]
    fn test_json_decode_failure_is_reported() {
        let err = JsonCodec.decode::<Job>(b"{not json").unwrap_err();
        assert!(matches!(err, QueueError::Decode { .. }));
    }
}
