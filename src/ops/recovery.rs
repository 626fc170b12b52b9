use log::{debug, info, warn};

use crate::driver::DeviceDriver;
use crate::journal::JournalRecord;
use crate::ops::FlatFS;
use crate::structure::descriptor::FileDescriptor;
use crate::structure::Metadata;
use crate::util::error::Result;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Create/Write/Delete records folded into the metadata.
    pub applied: usize,
    /// Records ignored, either undecodable or naming no usable descriptor.
    pub skipped: usize,
    /// The journal ended inside a record.
    pub truncated: bool,
}

impl<D: DeviceDriver> FlatFS<D> {
    /// Replays the journal over metadata freshly loaded from the volume and
    /// persists the result. A missing or unreadable journal leaves the volume
    /// untouched.
    pub fn recover(&mut self) -> Result<RecoveryReport> {
        let contents = match self.journal.read() {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                debug!("No journal at {}, nothing to recover", self.journal.path().display());
                return Ok(RecoveryReport::default());
            }
            Err(err) => {
                warn!("{}; skipping recovery", err);
                return Ok(RecoveryReport::default());
            }
        };

        let mut meta = Metadata::load(&mut self.io)?;
        let mut report = apply_records(&mut meta, &contents.records);
        report.skipped += contents.skipped;
        report.truncated = contents.truncated;

        meta.persist(&mut self.io)?;
        self.meta = meta;
        info!(
            "Recovery complete: {} records applied, {} skipped{}",
            report.applied,
            report.skipped,
            if report.truncated { ", journal truncated" } else { "" }
        );
        Ok(report)
    }
}

/// Folds `records` into `meta` in order, then re-marks every referenced
/// block as used. Records carry post-states, so applying the same journal
/// again yields the same metadata.
pub fn apply_records(meta: &mut Metadata, records: &[JournalRecord]) -> RecoveryReport {
    let mut report = RecoveryReport::default();
    for record in records {
        let applied = match record {
            JournalRecord::Create { name } => replay_create(meta, name),
            JournalRecord::Write { name, size, blocks } => replay_write(meta, name, *size, blocks),
            JournalRecord::Delete { name, size, blocks } => {
                replay_delete(meta, name, *size, blocks)
            }
            JournalRecord::Defrag | JournalRecord::Commit => continue,
        };
        if applied {
            report.applied += 1;
        } else {
            report.skipped += 1;
        }
    }
    meta.mark_referenced_blocks();
    report
}

fn replay_create(meta: &mut Metadata, name: &str) -> bool {
    match meta.file_table.find(name, true) {
        Some(slot) => {
            if let Some(descriptor) = meta.file_table.get_mut(slot) {
                if descriptor.is_deleted() {
                    meta.blockmap.free(descriptor.blocks());
                    descriptor.clear_contents();
                    descriptor.mark_live();
                }
            }
            true
        }
        None => match meta.file_table.free_slot() {
            Some(slot) => meta.file_table.claim(slot, FileDescriptor::new(name)),
            None => {
                warn!("Replay: no free slot to create '{}'", name);
                false
            }
        },
    }
}

fn replay_write(meta: &mut Metadata, name: &str, size: u32, blocks: &[u32]) -> bool {
    let block_size = meta.block_size();
    let slot = meta.file_table.find(name, true);
    let Some(descriptor) = slot.and_then(|slot| meta.file_table.get_mut(slot)) else {
        warn!("Replay: write to '{}' without a descriptor, skipping", name);
        return false;
    };

    meta.blockmap.free(descriptor.blocks());
    if let Err(err) = descriptor.set_contents(size, blocks.to_vec(), block_size) {
        warn!("Replay: write to '{}' skipped: {}", name, err);
        return false;
    }
    descriptor.mark_live();
    true
}

fn replay_delete(meta: &mut Metadata, name: &str, size: u32, blocks: &[u32]) -> bool {
    let block_size = meta.block_size();
    let slot = meta.file_table.find(name, true);
    let Some(descriptor) = slot.and_then(|slot| meta.file_table.get_mut(slot)) else {
        warn!("Replay: delete of unknown file '{}', skipping", name);
        return false;
    };

    meta.blockmap.free(descriptor.blocks());
    descriptor.mark_deleted();
    if let Err(err) = descriptor.set_contents(size, blocks.to_vec(), block_size) {
        warn!("Replay: delete of '{}' kept its old block list: {}", name, err);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Geometry;
    use crate::driver::file_drive::FileDrive;
    use crate::journal::Journal;
    use crate::ops::tests::{assert_invariants, new_fs, reopen};
    use crate::util::serializable::ByteSerializable;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn stale_metadata_is_rebuilt_from_journal() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("disk.img");
        let metadata_size = {
            let fs = new_fs(&dir, Geometry::default());
            fs.metadata().layout().metadata_size()
        };
        let stale = fs::read(&image).unwrap()[..metadata_size].to_vec();

        {
            let mut fs = reopen(&dir).unwrap();
            fs.create_file("a").unwrap();
            fs.write("a", b"x").unwrap();
        }

        // metadata region as it was before the create, data and journal intact
        let mut volume = fs::read(&image).unwrap();
        volume[..metadata_size].copy_from_slice(&stale);
        fs::write(&image, volume).unwrap();

        let fs = reopen(&dir).unwrap();
        let entry = fs.stat("a").unwrap();
        assert_eq!(entry.size, 1);
        assert_eq!(entry.block_count, 1);
        assert_eq!(fs.read("a").unwrap(), b"x");
        assert_invariants(&fs);
    }

    #[test]
    fn replay_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut fs = new_fs(&dir, Geometry::default());
        fs.create_file("a").unwrap();
        fs.write("a", &[1; 1300]).unwrap();
        fs.create_file("b").unwrap();
        fs.write("b", b"bee").unwrap();
        fs.delete("a").unwrap();
        fs.create_file("a").unwrap();
        fs.write("a", b"xy").unwrap();
        let before = fs.metadata().clone();

        let first = fs.recover().unwrap();
        assert_eq!(first.applied, 7);
        assert_eq!(fs.metadata(), &before);

        fs.recover().unwrap();
        assert_eq!(fs.metadata(), &before);
        assert_eq!(fs.read("a").unwrap(), b"xy");
        assert_eq!(fs.read("b").unwrap(), b"bee");
    }

    #[test]
    fn truncated_journal_tail() {
        let dir = TempDir::new().unwrap();
        {
            let mut fs = new_fs(&dir, Geometry::default());
            fs.create_file("a").unwrap();
        }
        let record = JournalRecord::Write { name: "a".to_string(), size: 3, blocks: vec![0] };
        let mut journal =
            OpenOptions::new().append(true).open(dir.path().join("disk.journal")).unwrap();
        journal.write_all(&record.to_raw().to_bytes()[..500]).unwrap();

        let mut fs = reopen(&dir).unwrap();
        assert_eq!(fs.stat("a").unwrap().size, 0);
        let report = fs.recover().unwrap();
        assert!(report.truncated);
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn unreadable_journal_is_ignored() {
        let dir = TempDir::new().unwrap();
        {
            let mut fs = new_fs(&dir, Geometry::default());
            fs.create_file("a").unwrap();
        }
        let journal = Journal::new(dir.path(), false);
        let drive = FileDrive::open(dir.path().join("disk.img")).unwrap();
        let mut fs = FlatFS::open(drive, journal).unwrap();
        assert_eq!(fs.recover().unwrap(), RecoveryReport::default());
        assert!(fs.stat("a").is_ok());
    }

    #[test]
    fn missing_journal_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        {
            let mut fs = new_fs(&dir, Geometry::default());
            fs.create_file("a").unwrap();
        }
        fs::remove_file(dir.path().join("disk.journal")).unwrap();
        let fs = reopen(&dir).unwrap();
        assert!(fs.stat("a").is_ok());
    }

    #[test]
    fn write_without_descriptor_is_skipped() {
        let mut meta = Metadata::new(Geometry::new(512, 16, 4));
        let report = apply_records(
            &mut meta,
            &[
                JournalRecord::Write { name: "ghost".to_string(), size: 10, blocks: vec![3] },
                JournalRecord::Commit,
            ],
        );
        assert_eq!(report, RecoveryReport { applied: 0, skipped: 1, truncated: false });
        assert_eq!(meta.file_table.iter().count(), 0);
        assert_eq!(meta.blockmap.used_count(), 0);
    }

    #[test]
    fn create_into_full_table_is_skipped() {
        let mut meta = Metadata::new(Geometry::new(512, 16, 1));
        let report = apply_records(
            &mut meta,
            &[
                JournalRecord::Create { name: "a".to_string() },
                JournalRecord::Create { name: "b".to_string() },
            ],
        );
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(meta.file_table.find("b", true), None);
    }

    #[test]
    fn replay_rebuilds_tombstone_then_revival() {
        let mut meta = Metadata::new(Geometry::new(512, 16, 4));
        apply_records(
            &mut meta,
            &[
                JournalRecord::Create { name: "a".to_string() },
                JournalRecord::Write { name: "a".to_string(), size: 600, blocks: vec![0, 1] },
                JournalRecord::Delete { name: "a".to_string(), size: 600, blocks: vec![0, 1] },
            ],
        );
        let slot = meta.file_table.find("a", true).unwrap();
        assert!(meta.file_table.get(slot).unwrap().is_deleted());
        assert_eq!(meta.blockmap.used_count(), 2);

        apply_records(&mut meta, &[JournalRecord::Create { name: "a".to_string() }]);
        let descriptor = meta.file_table.get(slot).unwrap();
        assert!(descriptor.is_live());
        assert_eq!(descriptor.block_count(), 0);
        assert_eq!(meta.blockmap.used_count(), 0);
    }

    #[test]
    fn referenced_blocks_end_up_used() {
        let mut meta = Metadata::new(Geometry::new(512, 16, 4));
        // "b" takes over block 0 before "a" gives it up
        apply_records(
            &mut meta,
            &[
                JournalRecord::Create { name: "a".to_string() },
                JournalRecord::Create { name: "b".to_string() },
                JournalRecord::Write { name: "a".to_string(), size: 10, blocks: vec![0] },
                JournalRecord::Write { name: "b".to_string(), size: 10, blocks: vec![0] },
                JournalRecord::Write { name: "a".to_string(), size: 10, blocks: vec![1] },
            ],
        );
        assert!(meta.blockmap.is_used(0));
        assert!(meta.blockmap.is_used(1));
    }
}
