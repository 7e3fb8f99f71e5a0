//! Free-space bookkeeping for an archive file.
//!
//! The allocator tracks the byte ranges of the file that hold no live data
//! (deleted entries, superseded payloads, the reclaimed directory) as a list
//! of [`FreeRegion`]s sorted by offset, plus the logical end of data. It
//! never touches the file itself.
//!
//! # Invariants
//!
//! - Regions are sorted, non-overlapping and never adjacent: touching regions
//!   are merged as soon as they appear.
//! - Every region ends strictly before `end_of_data`. A region that would
//!   reach it is dropped and `end_of_data` moves back to its start, so the
//!   file shrinks instead of carrying free space at its tail.
//!
//! # Placement
//!
//! Placement is first-fit: regions are scanned in ascending offset order and
//! the first one that can hold the request wins. When none can, the request
//! is placed at `end_of_data` and the file grows. Reservation never fails.
//!
//! ```rust
//! use zipmend::FreeSpaceAllocator;
//!
//! let mut free = FreeSpaceAllocator::with_end_of_data(1000);
//! free.release(100, 50);
//! free.release(150, 50); // merged with the previous region
//! assert_eq!(free.regions().len(), 1);
//!
//! // 60 bytes fit in the 100-byte hole at offset 100.
//! assert_eq!(free.reserve(60, 0), 100);
//! assert_eq!(free.free_bytes(), 40);
//!
//! // Nothing fits 500 bytes: the file grows.
//! assert_eq!(free.reserve(500, 0), 1000);
//! assert_eq!(free.end_of_data(), 1500);
//! ```

use crate::format::extra::payload_padding;

/// A contiguous range of reusable bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FreeRegion {
    /// First byte of the region.
    pub offset: u64,
    /// Length in bytes, never zero.
    pub length: u64,
}

impl FreeRegion {
    /// One past the last byte of the region.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Placement of an entry span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// Offset of the local header.
    pub offset: u64,
    /// Alignment padding to put in the header's extra field.
    pub padding: u64,
    /// Total span: header, padding and payload.
    pub length: u64,
}

impl Reservation {
    /// One past the last byte of the span.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// First-fit allocator over the free byte ranges of an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeSpaceAllocator {
    regions: Vec<FreeRegion>,
    end_of_data: u64,
}

impl FreeSpaceAllocator {
    /// Creates an allocator for an empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an allocator for a file with `end_of_data` bytes and no free space.
    pub fn with_end_of_data(end_of_data: u64) -> Self {
        Self {
            regions: Vec::new(),
            end_of_data,
        }
    }

    /// Builds the allocator for a file whose occupied spans are known.
    ///
    /// `occupied` holds `(offset, length)` pairs sorted by offset and not
    /// overlapping; everything between them below `end_of_data` is free.
    pub fn from_occupied<I>(occupied: I, end_of_data: u64) -> Self
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        let mut allocator = Self::with_end_of_data(end_of_data);
        let mut cursor = 0u64;
        for (offset, length) in occupied {
            debug_assert!(offset >= cursor, "occupied spans must be sorted and disjoint");
            if offset > cursor {
                allocator.regions.push(FreeRegion {
                    offset: cursor,
                    length: offset - cursor,
                });
            }
            cursor = cursor.max(offset + length);
        }
        if cursor < end_of_data {
            // Unused tail bytes are dropped rather than tracked.
            allocator.end_of_data = cursor;
        }
        allocator
    }

    /// Logical end of the file: one past the last occupied byte.
    #[inline]
    pub fn end_of_data(&self) -> u64 {
        self.end_of_data
    }

    /// Current free regions in offset order.
    #[inline]
    pub fn regions(&self) -> &[FreeRegion] {
        &self.regions
    }

    /// Total free bytes below `end_of_data`.
    pub fn free_bytes(&self) -> u64 {
        self.regions.iter().map(|r| r.length).sum()
    }

    /// Finds the first region that admits a block, using `fit` to compute
    /// the block's start and length from a region.
    fn first_fit<F>(&self, fit: F) -> Option<(usize, u64, u64)>
    where
        F: Fn(&FreeRegion) -> Option<(u64, u64)>,
    {
        self.regions
            .iter()
            .enumerate()
            .find_map(|(idx, region)| fit(region).map(|(start, len)| (idx, start, len)))
    }

    /// Removes `[start, start + len)` from region `idx`, keeping the leftover
    /// head and tail as regions.
    fn carve(&mut self, idx: usize, start: u64, len: u64) {
        let region = self.regions[idx];
        debug_assert!(start >= region.offset && start + len <= region.end());

        let head = FreeRegion {
            offset: region.offset,
            length: start - region.offset,
        };
        let tail = FreeRegion {
            offset: start + len,
            length: region.end() - (start + len),
        };

        match (head.length > 0, tail.length > 0) {
            (true, true) => {
                self.regions[idx] = head;
                self.regions.insert(idx + 1, tail);
            }
            (true, false) => self.regions[idx] = head,
            (false, true) => self.regions[idx] = tail,
            (false, false) => {
                self.regions.remove(idx);
            }
        }
    }

    /// Places a block at or past `end_of_data` and grows the file.
    fn grow(&mut self, start: u64, len: u64) {
        debug_assert!(start >= self.end_of_data);
        if start > self.end_of_data {
            self.regions.push(FreeRegion {
                offset: self.end_of_data,
                length: start - self.end_of_data,
            });
        }
        self.end_of_data = start + len;
    }

    /// Reserves `size` bytes starting on a multiple of `alignment`.
    ///
    /// An alignment of 0 or 1 means "anywhere". Bytes skipped before an
    /// aligned start stay free. Returns the start offset.
    pub fn reserve(&mut self, size: u64, alignment: u64) -> u64 {
        let align_up = |offset: u64| -> u64 {
            if alignment <= 1 {
                offset
            } else {
                offset.div_ceil(alignment) * alignment
            }
        };

        if size == 0 {
            return align_up(self.end_of_data);
        }

        let found = self.first_fit(|region| {
            let start = align_up(region.offset);
            (start + size <= region.end()).then_some((start, size))
        });

        let offset = match found {
            Some((idx, start, len)) => {
                self.carve(idx, start, len);
                start
            }
            None => {
                let start = align_up(self.end_of_data);
                self.grow(start, size);
                start
            }
        };
        log::trace!("reserved {} bytes at {:#x}", size, offset);
        offset
    }

    /// Reserves a span for an entry whose payload must start on `alignment`.
    ///
    /// The span starts with a `header_len`-byte local header, followed by
    /// alignment padding carried inside the header's extra field, followed
    /// by `payload_len` payload bytes. Because the padding belongs to the
    /// span, no free bytes are left in front of it.
    pub fn reserve_entry(
        &mut self,
        header_len: u64,
        payload_len: u64,
        alignment: u64,
    ) -> Reservation {
        let span = |start: u64| -> (u64, u64) {
            let padding = payload_padding(start + header_len, alignment);
            (padding, header_len + padding + payload_len)
        };

        let found = self.first_fit(|region| {
            let (_, length) = span(region.offset);
            (length <= region.length).then_some((region.offset, length))
        });

        let reservation = match found {
            Some((idx, start, length)) => {
                self.carve(idx, start, length);
                let (padding, _) = span(start);
                Reservation {
                    offset: start,
                    padding,
                    length,
                }
            }
            None => {
                let start = self.end_of_data;
                let (padding, length) = span(start);
                self.grow(start, length);
                Reservation {
                    offset: start,
                    padding,
                    length,
                }
            }
        };
        log::trace!(
            "reserved entry span {:#x}+{} (padding {})",
            reservation.offset,
            reservation.length,
            reservation.padding
        );
        reservation
    }

    /// Reserves `size` bytes at the end of the file.
    ///
    /// Used for the central directory and end records, which must close
    /// the file.
    pub fn reserve_tail(&mut self, size: u64) -> u64 {
        let offset = self.end_of_data;
        self.end_of_data += size;
        offset
    }

    /// Returns `[offset, offset + length)` to the free pool.
    ///
    /// The range is merged with touching regions. If the result reaches
    /// `end_of_data`, it is dropped and the file shrinks.
    pub fn release(&mut self, offset: u64, length: u64) {
        if length == 0 {
            return;
        }
        debug_assert!(offset + length <= self.end_of_data);

        let idx = self.regions.partition_point(|r| r.offset < offset);
        debug_assert!(idx == 0 || self.regions[idx - 1].end() <= offset);
        debug_assert!(idx == self.regions.len() || offset + length <= self.regions[idx].offset);

        let mut merged = FreeRegion { offset, length };
        let mut insert_at = idx;

        if idx < self.regions.len() && self.regions[idx].offset == merged.end() {
            merged.length += self.regions[idx].length;
            self.regions.remove(idx);
        }
        if idx > 0 && self.regions[idx - 1].end() == merged.offset {
            insert_at = idx - 1;
            merged.offset = self.regions[insert_at].offset;
            merged.length += self.regions[insert_at].length;
            self.regions.remove(insert_at);
        }

        if merged.end() >= self.end_of_data {
            self.end_of_data = merged.offset;
            log::trace!("released tail, end of data now {:#x}", self.end_of_data);
        } else {
            self.regions.insert(insert_at, merged);
        }
    }

    /// Marks the span held by the old central directory and end records as
    /// reusable.
    pub fn reclaim_trailer(&mut self, offset: u64, length: u64) {
        log::debug!("reclaiming directory span {:#x}+{}", offset, length);
        self.release(offset, length);
    }

    /// Checks the structural invariants, returning a description of the
    /// first violation.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        for pair in self.regions.windows(2) {
            if pair[0].end() >= pair[1].offset {
                return Err(format!(
                    "regions {:?} and {:?} overlap or touch",
                    pair[0], pair[1]
                ));
            }
        }
        if let Some(region) = self.regions.iter().find(|r| r.length == 0) {
            return Err(format!("empty region at {:#x}", region.offset));
        }
        if let Some(last) = self.regions.last() {
            if last.end() >= self.end_of_data {
                return Err(format!(
                    "region {:?} reaches end of data {:#x}",
                    last, self.end_of_data
                ));
            }
        }
        Ok(())
    }
}
