use log::debug;

use crate::config::Geometry;
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::blockmap::BlockMap;
use crate::structure::file_table::FileTable;
use crate::structure::layout::Layout;
use crate::structure::superblock::SuperBlock;
use crate::util::error::Result;

pub mod blockmap;
pub mod descriptor;
pub mod file_table;
pub mod layout;
pub mod superblock;

/// In-memory mirror of the metadata region: header, bitmap and file table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub superblock: SuperBlock,
    pub blockmap: BlockMap,
    pub file_table: FileTable,
}

impl Metadata {
    pub fn new(geometry: Geometry) -> Metadata {
        Metadata {
            superblock: SuperBlock::new(geometry),
            blockmap: BlockMap::new(geometry.block_count),
            file_table: FileTable::new(geometry.max_files),
        }
    }

    pub fn layout(&self) -> Layout {
        Layout::new(self.superblock.geometry)
    }

    pub fn block_size(&self) -> usize {
        self.superblock.geometry.block_size
    }

    /// Reads header, bitmap and file table in that order. The geometry stored in
    /// the header replaces the layout of `io`.
    pub fn load<D: DeviceDriver>(io: &mut IO<D>) -> Result<Metadata> {
        let superblock = SuperBlock::read(io)?;
        superblock.geometry.validate()?;
        io.set_layout(Layout::new(superblock.geometry));

        let blockmap = BlockMap::read(io)?;
        let file_table = FileTable::read(io)?;
        debug!(
            "Loaded metadata: {} blocks ({} used), {} slots",
            blockmap.len(),
            blockmap.used_count(),
            file_table.capacity()
        );
        Ok(Metadata { superblock, blockmap, file_table })
    }

    /// Overwrites the whole metadata region and flushes.
    pub fn persist<D: DeviceDriver>(&self, io: &mut IO<D>) -> Result<()> {
        self.superblock.write(io)?;
        self.blockmap.write(io)?;
        self.file_table.write(io)?;
        io.flush()
    }

    /// Marks every block referenced by any descriptor as used.
    pub fn mark_referenced_blocks(&mut self) {
        for (_, descriptor) in self.file_table.iter() {
            self.blockmap.mark_used(descriptor.blocks());
        }
    }
}
