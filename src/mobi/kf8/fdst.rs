//! FDST (Flow Division Table) record.
//!
//! `"FDST"`, header length, entry count, then `(start, end)` u32 pairs, one
//! per flow division. Entries must be ordered, non-overlapping, and
//! non-empty.

use super::skeleton::Skeleton;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdstEntry {
    pub start: u32,
    pub end: u32,
}

/// Flow division table builder.
#[derive(Debug, Default)]
pub struct Fdst {
    entries: Vec<FdstEntry>,
}

impl Fdst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, start: u32, end: u32) {
        self.entries.push(FdstEntry { start, end });
    }

    /// One entry per chunk, covering the chunk's byte range.
    pub fn from_skeleton(skeleton: &Skeleton) -> Self {
        let mut fdst = Self::new();
        for chunk in &skeleton.chunks {
            fdst.add_entry(chunk.offset as u32, (chunk.offset + chunk.length) as u32);
        }
        fdst
    }

    pub fn entries(&self) -> &[FdstEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total encoded size: 12-byte header plus 8 bytes per entry.
    pub fn encoded_len(&self) -> usize {
        12 + self.entries.len() * 8
    }

    /// Reject empty ranges and overlap between neighbors.
    pub fn validate(&self) -> Result<()> {
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.start >= entry.end {
                return Err(Error::Structure(format!(
                    "FDST entry {i} has start >= end ({} >= {})",
                    entry.start, entry.end
                )));
            }
        }
        for i in 0..self.entries.len().saturating_sub(1) {
            if self.entries[i].end > self.entries[i + 1].start {
                return Err(Error::Structure(format!(
                    "FDST entries {i} and {} overlap",
                    i + 1
                )));
            }
        }
        Ok(())
    }

    /// Merge adjacent entries whose gap is at most `max_gap`.
    pub fn merge(&mut self, max_gap: u32) {
        if self.entries.len() <= 1 {
            return;
        }

        let mut merged: Vec<FdstEntry> = Vec::with_capacity(self.entries.len());
        merged.push(self.entries[0]);
        for &entry in &self.entries[1..] {
            let last = merged.last_mut().expect("non-empty");
            if entry.start.saturating_sub(last.end) <= max_gap {
                last.end = entry.end;
            } else {
                merged.push(entry);
            }
        }
        self.entries = merged;
    }

    /// Encode as one PalmDB record payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(b"FDST");
        out.extend_from_slice(&(self.encoded_len() as u32).to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.start.to_be_bytes());
            out.extend_from_slice(&entry.end.to_be_bytes());
        }
        Ok(out)
    }
}
