//! Opening a session: loading the directory and deriving free space.

use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::iter;
use std::path::Path;

use super::{Session, TrailerSpan};
use crate::Result;
use crate::free_space::FreeSpaceAllocator;
use crate::index::EntryIndex;
use crate::options::ArchiveOptions;
use crate::read::load_directory;

impl Session {
    pub(super) fn open(path: &Path, options: &ArchiveOptions) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let file_len = file.metadata()?.len();

        if file_len == 0 {
            log::debug!("{}: starting an empty archive", path.display());
            return Ok(Self::empty(file, options));
        }

        let (trailer, entries) = load_directory(&mut BufReader::new(&file))?;
        let trailer_span = TrailerSpan {
            offset: trailer.start(),
            length: file_len - trailer.start(),
        };

        let occupied = entries
            .iter()
            .map(|e| (e.offset, e.span))
            .chain(iter::once((trailer_span.offset, trailer_span.length)));
        let free = FreeSpaceAllocator::from_occupied(occupied, file_len);

        let mut index = EntryIndex::new();
        for entry in entries {
            index.put(entry);
        }

        let (comment, dirty) = match &options.comment {
            Some(comment) => (comment.clone(), *comment != trailer.comment),
            None => (trailer.comment, false),
        };

        log::debug!(
            "{}: opened {} entries, {} free bytes in {} regions, directory at {:#x}",
            path.display(),
            index.len(),
            free.free_bytes(),
            free.regions().len(),
            trailer_span.offset
        );

        Ok(Self {
            file,
            index,
            free,
            trailer: Some(trailer_span),
            comment,
            dirty,
        })
    }

    /// A session for a file with no content yet.
    fn empty(file: File, options: &ArchiveOptions) -> Self {
        Self {
            file,
            index: EntryIndex::new(),
            free: FreeSpaceAllocator::new(),
            trailer: None,
            comment: options.comment.clone().unwrap_or_default(),
            dirty: true,
        }
    }
}
