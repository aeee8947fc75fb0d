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

//! First-fit offset allocation inside a channel's message store.
//!
//! Live headers occupy disjoint `[offset, offset + length)` ranges. Ranges
//! freed by delivered or expired messages are never compacted; they are
//! handed out again to any later record that fits.
//!
//! ```text
//!  0         40        60            100       130
//!  ├── live ──┤  gap    ├──── live ────┤  live   ┤
//!             └─ a 20-byte record lands at 40
//! ```

use crate::header::Header;

/// Returns the first offset where `length` bytes fit without overlapping
/// any live header, or the end of the last live record.
#[must_use]
pub fn find_offset(headers: &[Header], length: u32) -> u64 {
    let mut ranges: Vec<(u64, u64)> = headers.iter().map(|h| (h.offset, h.end())).collect();
    ranges.sort_unstable();

    let length = u64::from(length);
    let mut cursor = 0;
    for (start, end) in ranges {
        if start.saturating_sub(cursor) >= length {
            return cursor;
        }
        cursor = cursor.max(end);
    }
    cursor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(offset: u64, length: u32) -> Header {
        Header {
            pushed_at: 0,
            delay: 0,
            priority: 0,
            ttr: 0,
            length,
            offset,
        }
    }

    fn overlaps(a: &Header, offset: u64, length: u32) -> bool {
        offset < a.end() && a.offset < offset + u64::from(length)
    }

    #[test]
    fn test_empty_store_starts_at_zero() {
        assert_eq!(find_offset(&[], 16), 0);
    }

    #[test]
    fn test_appends_after_last_record() {
        let headers = [live(0, 10), live(10, 5)];
        assert_eq!(find_offset(&headers, 4), 15);
    }

    #[test]
    fn test_reuses_leading_gap() {
        let headers = [live(8, 4)];
        assert_eq!(find_offset(&headers, 8), 0);
        assert_eq!(find_offset(&headers, 9), 12);
    }

    #[test]
    fn test_first_fit_ignores_input_order() {
        let headers = [live(100, 30), live(0, 40), live(60, 40)];
        assert_eq!(find_offset(&headers, 20), 40);
        assert_eq!(find_offset(&headers, 21), 130);
    }

    #[test]
    fn test_exact_fit_gap() {
        let headers = [live(0, 5), live(10, 5)];
        assert_eq!(find_offset(&headers, 5), 5);
    }

    #[test]
    fn test_never_overlaps_live_records() {
        let mut headers = Vec::new();
        let mut seed = 7_u32;
        for round in 0..200 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let length = 1 + (seed >> 16) % 64;
            let offset = find_offset(&headers, length);
            assert!(headers.iter().all(|h| !overlaps(h, offset, length)));
            headers.push(live(offset, length));
            if round % 3 == 0 {
                let victim = (seed as usize) % headers.len();
                headers.remove(victim);
            }
        }
    }
}
