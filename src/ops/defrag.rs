use log::{debug, info, warn};

use crate::consts::{BlockPointer, SlotIndex};
use crate::driver::DeviceDriver;
use crate::journal::JournalRecord;
use crate::ops::FlatFS;
use crate::structure::blockmap::BlockMap;
use crate::util::error::Result;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DefragReport {
    /// Live files whose block list changed.
    pub relocated: usize,
    /// Tombstones whose retained blocks were released.
    pub reclaimed: usize,
    /// Live files left in place because the fresh map ran out.
    pub skipped: usize,
    pub moved_blocks: usize,
}

impl DefragReport {
    pub fn is_partial(&self) -> bool {
        self.skipped > 0
    }
}

/// A live file's blocks before and after compaction, with its old contents.
struct Move {
    slot: SlotIndex,
    from: Vec<BlockPointer>,
    to: Vec<BlockPointer>,
    contents: Vec<Vec<u8>>,
}

/// Where every live file ends up, decided before any block is touched.
struct Plan {
    fresh: BlockMap,
    moves: Vec<Move>,
    kept: usize,
}

impl<D: DeviceDriver> FlatFS<D> {
    /// Places live files on a fresh map in slot order. When one does not fit,
    /// it and every later file keep their blocks. Those blocks are reserved
    /// first and the files before it are placed again, so no move ever
    /// targets a block a kept file still holds.
    fn plan_compaction(&self) -> Plan {
        let live: Vec<_> = self.meta.file_table.live().collect();
        let mut keep_from = live.len();
        loop {
            let mut fresh = BlockMap::new(self.geometry().block_count);
            for (_, descriptor) in &live[keep_from..] {
                fresh.mark_used(descriptor.blocks());
            }

            let mut moves = Vec::new();
            let mut overflow = None;
            for (index, &(slot, descriptor)) in live[..keep_from].iter().enumerate() {
                let from = descriptor.blocks().to_vec();
                let to = fresh.allocate(from.len());
                if to.len() < from.len() {
                    overflow = Some(index);
                    break;
                }
                if to != from {
                    moves.push(Move { slot, from, to, contents: Vec::new() });
                }
            }

            match overflow {
                Some(index) => {
                    warn!(
                        "Defragment: no room left for '{}', keeping it and later files in place",
                        live[index].1.name()
                    );
                    keep_from = index;
                }
                None => return Plan { fresh, moves, kept: live.len() - keep_from },
            }
        }
    }

    /// Packs live files to the front of the data region in slot order and
    /// releases the blocks tombstones still hold.
    pub fn defragment(&mut self) -> Result<DefragReport> {
        self.transaction(|fs| {
            let Plan { fresh, mut moves, kept } = fs.plan_compaction();
            let mut report = DefragReport { skipped: kept, ..DefragReport::default() };

            // every old block is read before any new location is written
            for planned in &mut moves {
                for &block in &planned.from {
                    planned.contents.push(fs.io.read_block(block)?);
                }
            }
            for planned in &moves {
                let blocks = planned.from.iter().zip(&planned.to).zip(&planned.contents);
                for ((&old, &new), contents) in blocks {
                    if old != new {
                        fs.io.write_block(new, contents)?;
                        report.moved_blocks += 1;
                    }
                }
            }

            let mut records = Vec::new();
            for planned in moves {
                let descriptor = fs.descriptor_mut(planned.slot)?;
                descriptor.relocate(planned.to.clone())?;
                debug!(
                    "Defragment: '{}' {:?} -> {:?}",
                    descriptor.name(),
                    planned.from,
                    planned.to
                );
                records.push(JournalRecord::Write {
                    name: descriptor.name().to_string(),
                    size: descriptor.size(),
                    blocks: planned.to,
                });
                report.relocated += 1;
            }

            for (_, descriptor) in fs.meta.file_table.iter_mut() {
                let holds_contents = descriptor.size() > 0 || descriptor.block_count() > 0;
                if descriptor.is_deleted() && holds_contents {
                    debug!(
                        "Defragment: releasing {} blocks of deleted '{}'",
                        descriptor.block_count(),
                        descriptor.name()
                    );
                    descriptor.clear_contents();
                    records.push(JournalRecord::Delete {
                        name: descriptor.name().to_string(),
                        size: 0,
                        blocks: Vec::new(),
                    });
                    report.reclaimed += 1;
                }
            }
            fs.meta.blockmap = fresh;

            for record in &records {
                fs.journal.append(record)?;
            }
            fs.journal_and_persist(JournalRecord::Defrag)?;

            info!(
                "Defragmentation {}: {} files relocated ({} blocks moved), \
                 {} deleted files reclaimed, {} left in place",
                if report.is_partial() { "partial" } else { "complete" },
                report.relocated,
                report.moved_blocks,
                report.reclaimed,
                report.skipped
            );
            Ok(report)
        })
    }
}
