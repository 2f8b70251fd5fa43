//! Sparse flash device.
//!
//! Only explicitly written byte ranges are materialized. They are kept as chunks in an ordered
//! map keyed by start offset; every address outside a chunk reads as [`FILL_BYTE`].
//!
//! How a write interacts with stored chunks is governed by [`MergePolicy`], and how an erase
//! trims them by [`ErasePolicy`]. The defaults reproduce the single-neighbor merge and
//! start-offset erase of the reference device; [`MergePolicy::Coalesce`] and
//! [`ErasePolicy::Truncate`] are byte-exact alternatives.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::util::checked_range;
use crate::{FlashDevice, Result, FILL_BYTE};

/// Strategy used by [`SparseFlash`] to fold a write into the stored chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Resolve the write against the first stored chunk it touches and stop.
    ///
    /// Cases, checked in order against that chunk:
    /// 1. same start and length: bytes replaced in place;
    /// 2. the write covers the chunk: the chunk is replaced by the write;
    /// 3. the chunk starts at or before the write: the chunk is extended and overwritten;
    /// 4. the chunk starts inside the write: a new chunk holding the write followed by the
    ///    chunk's tail is inserted and the old chunk is left in place, so its bytes keep
    ///    shadowing the overlapped part of the write.
    ///
    /// Writes that overlap more than one chunk leave the later chunks untouched.
    #[default]
    FirstNeighbor,

    /// Merge the write with every chunk it overlaps or touches into a single chunk.
    ///
    /// Chunks stay disjoint and non-adjacent, and a read always returns the last write.
    Coalesce,
}

/// Strategy used by [`SparseFlash`] to drop stored bytes on erase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErasePolicy {
    /// Remove every chunk whose start lies inside the erased range, including any part of it
    /// past the range end. Chunks starting before the range are kept whole.
    #[default]
    ByStart,

    /// Remove exactly the erased bytes; chunks crossing a range boundary keep their outside
    /// fragments.
    Truncate,
}

/// Merge and erase policies of a [`SparseFlash`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseConfig {
    #[serde(default)]
    pub merge: MergePolicy,
    #[serde(default)]
    pub erase: ErasePolicy,
}

impl SparseConfig {
    /// Policies under which reads always reflect the exact sequence of writes and erases.
    pub fn exact() -> Self {
        Self {
            merge: MergePolicy::Coalesce,
            erase: ErasePolicy::Truncate,
        }
    }
}

/// Flash device that stores only written byte ranges.
#[derive(Debug, Clone)]
pub struct SparseFlash {
    capacity: u64,
    config: SparseConfig,
    chunks: BTreeMap<u64, Vec<u8>>,
}

impl SparseFlash {
    pub fn new(capacity: u64) -> Self {
        Self::with_config(capacity, SparseConfig::default())
    }

    pub fn with_config(capacity: u64, config: SparseConfig) -> Self {
        Self {
            capacity,
            config,
            chunks: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> SparseConfig {
        self.config
    }

    /// Number of stored chunks.
    pub fn used_chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Stored chunks as `(start, bytes)` in ascending start order.
    pub fn chunks(&self) -> impl Iterator<Item = (u64, &[u8])> + '_ {
        self.chunks.iter().map(|(start, data)| (*start, data.as_slice()))
    }

    /// Total number of materialized bytes.
    pub fn stored_bytes(&self) -> u64 {
        self.chunks.values().map(|data| data.len() as u64).sum()
    }

    /// First key that can hold a chunk reaching into `[offset, ..)`.
    fn scan_start(&self, offset: u64) -> u64 {
        match self.config.merge {
            // Chunks are disjoint, so only the closest chunk starting at or before `offset` can
            // reach into the window.
            MergePolicy::Coalesce => self
                .chunks
                .range(..=offset)
                .next_back()
                .map_or(offset, |(start, _)| *start),
            // Chunks may overlap; any earlier chunk could still extend past `offset`.
            MergePolicy::FirstNeighbor => 0,
        }
    }

    fn write_first_neighbor(&mut self, data: &[u8], offset: u64) {
        let end = offset + data.len() as u64;
        let hit = self
            .chunks
            .range(..end)
            .map(|(start, bytes)| (*start, *start + bytes.len() as u64))
            .find(|(_, chunk_end)| *chunk_end > offset);

        let Some((start, chunk_end)) = hit else {
            tracing::trace!(offset, len = data.len(), "sparse write: new chunk");
            self.chunks.insert(offset, data.to_vec());
            return;
        };

        if start == offset && chunk_end == end {
            tracing::trace!(offset, len = data.len(), "sparse write: replace in place");
            if let Some(chunk) = self.chunks.get_mut(&start) {
                chunk.copy_from_slice(data);
            }
        } else if offset <= start && end >= chunk_end {
            tracing::trace!(offset, len = data.len(), replaced = start, "sparse write: cover");
            self.chunks.remove(&start);
            self.chunks.insert(offset, data.to_vec());
        } else if start <= offset {
            tracing::trace!(offset, len = data.len(), chunk = start, "sparse write: extend");
            if let Some(chunk) = self.chunks.get_mut(&start) {
                let new_len = (end.max(chunk_end) - start) as usize;
                chunk.resize(new_len, FILL_BYTE);
                let rel = (offset - start) as usize;
                chunk[rel..rel + data.len()].copy_from_slice(data);
            }
        } else {
            // `offset < start < end < chunk_end`: the chunk hangs off the end of the write.
            tracing::trace!(offset, len = data.len(), chunk = start, "sparse write: prepend");
            let Some(chunk) = self.chunks.get(&start) else {
                return;
            };
            let tail = &chunk[(end - start) as usize..];
            let mut merged = Vec::with_capacity(data.len() + tail.len());
            merged.extend_from_slice(data);
            merged.extend_from_slice(tail);
            self.chunks.insert(offset, merged);
        }
    }

    fn write_coalesce(&mut self, data: &[u8], offset: u64) {
        let end = offset + data.len() as u64;

        let mut absorbed: Vec<u64> = Vec::new();
        if let Some((start, chunk)) = self.chunks.range(..offset).next_back() {
            if *start + chunk.len() as u64 >= offset {
                absorbed.push(*start);
            }
        }
        absorbed.extend(self.chunks.range(offset..=end).map(|(start, _)| *start));

        if absorbed.is_empty() {
            tracing::trace!(offset, len = data.len(), "sparse write: new chunk");
            self.chunks.insert(offset, data.to_vec());
            return;
        }

        let mut merged_start = offset;
        let mut merged_end = end;
        let mut pieces = Vec::with_capacity(absorbed.len());
        for start in absorbed {
            if let Some(chunk) = self.chunks.remove(&start) {
                merged_start = merged_start.min(start);
                merged_end = merged_end.max(start + chunk.len() as u64);
                pieces.push((start, chunk));
            }
        }

        // The absorbed chunks plus the write cover `[merged_start, merged_end)` without gaps.
        let mut merged = vec![FILL_BYTE; (merged_end - merged_start) as usize];
        for (start, chunk) in &pieces {
            let rel = (start - merged_start) as usize;
            merged[rel..rel + chunk.len()].copy_from_slice(chunk);
        }
        let rel = (offset - merged_start) as usize;
        merged[rel..rel + data.len()].copy_from_slice(data);

        tracing::trace!(
            offset,
            len = data.len(),
            absorbed = pieces.len(),
            merged_start,
            merged_len = merged.len(),
            "sparse write: coalesce"
        );
        self.chunks.insert(merged_start, merged);
    }

    fn erase_by_start(&mut self, offset: u64, end: u64) {
        let doomed: Vec<u64> = self.chunks.range(offset..end).map(|(start, _)| *start).collect();
        for start in &doomed {
            self.chunks.remove(start);
        }
        tracing::trace!(offset, end, removed = doomed.len(), "sparse erase");
    }

    fn erase_truncate(&mut self, offset: u64, end: u64) {
        let scan_from = self.scan_start(offset);
        let hit: Vec<u64> = self
            .chunks
            .range(scan_from..end)
            .filter(|(start, chunk)| **start + chunk.len() as u64 > offset)
            .map(|(start, _)| *start)
            .collect();

        // Tails reaching past the range all restart at `end`; higher starts shadow lower ones.
        let mut right: Option<Vec<u8>> = None;
        for start in &hit {
            let Some(mut chunk) = self.chunks.remove(start) else {
                continue;
            };
            let chunk_end = *start + chunk.len() as u64;
            if chunk_end > end {
                let tail = chunk.split_off((end - start) as usize);
                if let Some(acc) = right.as_mut() {
                    overlay(acc, &tail);
                } else {
                    right = Some(tail);
                }
            }
            if *start < offset {
                chunk.truncate((offset - start) as usize);
                self.chunks.insert(*start, chunk);
            }
        }
        if let Some(mut tail) = right {
            // A chunk already starting at `end` was never hit and shadows every tail.
            if let Some(existing) = self.chunks.remove(&end) {
                overlay(&mut tail, &existing);
            }
            self.chunks.insert(end, tail);
        }
        tracing::trace!(offset, end, touched = hit.len(), "sparse erase (truncate)");
    }

    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let mut prev_end: Option<u64> = None;
        for (start, data) in self.chunks() {
            assert!(!data.is_empty(), "empty chunk at {start}");
            let end = start + data.len() as u64;
            assert!(end <= self.capacity, "chunk [{start}, {end}) exceeds capacity");
            if self.config.merge == MergePolicy::Coalesce {
                if let Some(prev_end) = prev_end {
                    assert!(start > prev_end, "chunk at {start} overlaps or touches {prev_end}");
                }
            }
            prev_end = Some(end);
        }
    }
}

/// Copy `top` over the start of `base`, growing `base` if `top` is longer.
fn overlay(base: &mut Vec<u8>, top: &[u8]) {
    if base.len() < top.len() {
        base.resize(top.len(), FILL_BYTE);
    }
    base[..top.len()].copy_from_slice(top);
}

impl FlashDevice for SparseFlash {
    fn open(&mut self, _path: Option<&Path>) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        checked_range(offset, buf.len() as u64, self.capacity)?;
        buf.fill(FILL_BYTE);
        if buf.is_empty() {
            return Ok(());
        }

        let end = offset + buf.len() as u64;
        let scan_from = self.scan_start(offset);
        // Ascending order: a later chunk overlays an earlier one where they overlap.
        for (&start, chunk) in self.chunks.range(scan_from..end) {
            let chunk_end = start + chunk.len() as u64;
            if chunk_end <= offset {
                continue;
            }
            let from = start.max(offset);
            let to = chunk_end.min(end);
            let src = (from - start) as usize..(to - start) as usize;
            let dst = (from - offset) as usize..(to - offset) as usize;
            buf[dst].copy_from_slice(&chunk[src]);
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8], offset: u64) -> Result<()> {
        checked_range(offset, data.len() as u64, self.capacity)?;
        if data.is_empty() {
            return Ok(());
        }
        match self.config.merge {
            MergePolicy::FirstNeighbor => self.write_first_neighbor(data, offset),
            MergePolicy::Coalesce => self.write_coalesce(data, offset),
        }
        Ok(())
    }

    fn erase(&mut self, offset: u64, len: u64) -> Result<()> {
        checked_range(offset, len, self.capacity)?;
        if len == 0 {
            return Ok(());
        }
        let end = offset + len;
        match self.config.erase {
            ErasePolicy::ByStart => self.erase_by_start(offset, end),
            ErasePolicy::Truncate => self.erase_truncate(offset, end),
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.capacity
    }
}
