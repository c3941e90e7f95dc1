// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status/log streaming model (§3 Log Stream Record, §4.8).
//!
//! Chunks are ordered per `(run_id, step_name, stream)` by `offset`, a
//! monotonically increasing byte count from the start of that stream. The
//! coordinator dedups by offset so a reconnect-triggered resend never
//! double-applies a chunk (§9 Open Question 1).

use serde::{Deserialize, Serialize};

use crate::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChunk {
    pub run_id: RunId,
    pub step_name: String,
    pub stream: LogStream,
    pub offset: u64,
    pub data: Vec<u8>,
}

impl LogChunk {
    pub fn end_offset(&self) -> u64 {
        self.offset + self.data.len() as u64
    }

    /// A chunk is a duplicate of already-applied data if its whole range
    /// falls at or before the stream's recorded high-water mark.
    pub fn is_duplicate(&self, applied_up_to: u64) -> bool {
        self.end_offset() <= applied_up_to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(offset: u64, len: usize) -> LogChunk {
        LogChunk {
            run_id: RunId::new(),
            step_name: "build".to_string(),
            stream: LogStream::Stdout,
            offset,
            data: vec![0u8; len],
        }
    }

    #[test]
    fn duplicate_detection_uses_end_offset() {
        let c = chunk(0, 10);
        assert!(c.is_duplicate(10));
        assert!(c.is_duplicate(20));
        assert!(!c.is_duplicate(5));
    }
}
