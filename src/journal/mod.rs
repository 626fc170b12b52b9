use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::util::error::{FsError, Result};
use crate::util::serializable::{ByteSerializable, KnownSize};

pub mod record;

pub use record::{JournalRecord, RawRecord};

/// Parsed contents of a journal file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JournalContents {
    pub records: Vec<JournalRecord>,
    /// Records with unknown tags or undecodable fields.
    pub skipped: usize,
    /// The file ended inside a record (a crash artifact).
    pub truncated: bool,
}

/// Append-only intent log kept next to the volume. Records are written
/// back to back with no framing; end of file is the only boundary.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
    sync: bool,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>, sync: bool) -> Journal {
        Journal { path: path.into(), sync }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &JournalRecord) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&record.to_raw().to_bytes())?;
        if self.sync {
            file.sync_data()?;
        }
        debug!("Journal append: {:?}", record);
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.append(&JournalRecord::Commit)
    }

    /// Empties the journal, creating it if needed.
    pub fn reset(&self) -> Result<()> {
        let file = File::create(&self.path)?;
        if self.sync {
            file.sync_all()?;
        }
        Ok(())
    }

    /// `Ok(None)` when there is no journal file.
    pub fn read(&self) -> Result<Option<JournalContents>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(FsError::JournalUnreadable(err)),
        };
        Ok(Some(Journal::parse(&bytes)))
    }

    fn parse(bytes: &[u8]) -> JournalContents {
        let mut contents = JournalContents::default();
        let chunks = bytes.chunks_exact(RawRecord::size_on_disk());
        if !chunks.remainder().is_empty() {
            warn!(
                "Journal ends with a partial record of {} bytes; ignoring it",
                chunks.remainder().len()
            );
            contents.truncated = true;
        }

        for (index, chunk) in chunks.enumerate() {
            let decoded = RawRecord::from_bytes(chunk)
                .map_err(FsError::from)
                .and_then(|raw| JournalRecord::from_raw(&raw).map(|record| (raw.tag, record)));
            match decoded {
                Ok((_, Some(record))) => contents.records.push(record),
                Ok((tag, None)) => {
                    warn!("Skipping journal record {} with unknown type {}", index, tag);
                    contents.skipped += 1;
                }
                Err(err) => {
                    warn!("Skipping undecodable journal record {}: {}", index, err);
                    contents.skipped += 1;
                }
            }
        }
        contents
    }
}
