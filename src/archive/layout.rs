//! Byte-level layout snapshots.

use super::Session;

/// What a span of the file holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanKind {
    /// An entry's local header, payload and descriptor.
    Entry(String),
    /// Reusable bytes.
    Free,
    /// Central directory and end records.
    Trailer,
}

/// A contiguous range of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// First byte.
    pub offset: u64,
    /// Length in bytes.
    pub length: u64,
    /// Contents.
    pub kind: SpanKind,
}

impl Span {
    /// One past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Snapshot of how the file's bytes are used, in offset order.
///
/// `file_length` is the logical end of data. It equals the length on disk
/// right after a commit; between mutations the file may still hold stale
/// bytes past it, which the next commit truncates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Spans sorted by offset.
    pub spans: Vec<Span>,
    /// Logical file length.
    pub file_length: u64,
}

impl Layout {
    /// Checks that the spans tile `[0, file_length)` exactly, that no two
    /// free spans touch, and that no free span ends the file.
    pub fn verify_tiling(&self) -> std::result::Result<(), String> {
        let mut cursor = 0u64;
        let mut previous_free = false;
        for span in &self.spans {
            if span.offset != cursor {
                return Err(format!(
                    "{} at {:#x}, expected {:#x}",
                    if span.offset < cursor { "overlap" } else { "hole" },
                    span.offset,
                    cursor
                ));
            }
            if span.length == 0 {
                return Err(format!("empty span at {:#x}", span.offset));
            }
            let free = span.kind == SpanKind::Free;
            if free && previous_free {
                return Err(format!("unmerged free spans at {:#x}", span.offset));
            }
            previous_free = free;
            cursor = span.end();
        }
        if cursor != self.file_length {
            return Err(format!(
                "spans end at {:#x}, file length is {:#x}",
                cursor, self.file_length
            ));
        }
        if previous_free {
            return Err("free span at end of file".to_string());
        }
        Ok(())
    }

    /// Total free bytes.
    pub fn free_bytes(&self) -> u64 {
        self.spans
            .iter()
            .filter(|s| s.kind == SpanKind::Free)
            .map(|s| s.length)
            .sum()
    }

    /// The span of a named entry.
    pub fn entry(&self, name: &str) -> Option<&Span> {
        self.spans
            .iter()
            .find(|s| matches!(&s.kind, SpanKind::Entry(n) if n == name))
    }
}

impl Session {
    pub(super) fn layout(&self) -> Layout {
        let mut spans: Vec<Span> = self
            .index
            .entries_in_disk_order()
            .map(|e| Span {
                offset: e.offset,
                length: e.span,
                kind: SpanKind::Entry(e.name.to_string()),
            })
            .collect();
        spans.extend(self.free.regions().iter().map(|r| Span {
            offset: r.offset,
            length: r.length,
            kind: SpanKind::Free,
        }));
        if let Some(trailer) = self.trailer {
            spans.push(Span {
                offset: trailer.offset,
                length: trailer.length,
                kind: SpanKind::Trailer,
            });
        }
        spans.sort_by_key(|s| s.offset);
        Layout {
            spans,
            file_length: self.free.end_of_data(),
        }
    }
}
