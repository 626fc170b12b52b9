use log::trace;

use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::Result;

const FREE: u8 = 0;
const USED: u8 = 1;

/// Free-space map of the data region, one byte per block.
///
/// Allocation is a linear lowest-index-first scan with no free list, which
/// fragments files over time; see `FlatFS::defragment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMap {
    data: Vec<u8>,
}

impl BlockMap {
    pub fn new(block_count: u32) -> BlockMap {
        BlockMap { data: vec![FREE; block_count as usize] }
    }

    pub fn from_bytes(bytes: &[u8]) -> BlockMap {
        BlockMap {
            data: bytes.iter().map(|&byte| if byte == FREE { FREE } else { USED }).collect(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn read<D: DeviceDriver>(io: &IO<D>) -> Result<BlockMap> {
        let layout = *io.layout();
        let bytes = io.read_region(layout.bitmap_offset(), layout.bitmap_size())?;
        Ok(BlockMap::from_bytes(&bytes))
    }

    pub fn write<D: DeviceDriver>(&self, io: &mut IO<D>) -> Result<()> {
        let offset = io.layout().bitmap_offset();
        io.write_region(offset, &self.data)
    }

    /// Returns up to `count` free blocks in ascending order, marking each used.
    /// A short result means the map ran out; the caller has to roll back.
    pub fn allocate(&mut self, count: usize) -> Vec<BlockPointer> {
        let mut allocated = Vec::with_capacity(count);
        for (index, state) in self.data.iter_mut().enumerate() {
            if allocated.len() == count {
                break;
            }
            if *state == FREE {
                *state = USED;
                allocated.push(index as BlockPointer);
            }
        }
        trace!("Allocated {:?} ({} requested)", allocated, count);
        allocated
    }

    /// Out-of-range indices are ignored.
    pub fn free(&mut self, blocks: &[BlockPointer]) {
        for &block in blocks {
            if let Some(state) = self.data.get_mut(block as usize) {
                *state = FREE;
            }
        }
    }

    /// Out-of-range indices are ignored.
    pub fn mark_used(&mut self, blocks: &[BlockPointer]) {
        for &block in blocks {
            if let Some(state) = self.data.get_mut(block as usize) {
                *state = USED;
            }
        }
    }

    pub fn is_used(&self, index: BlockPointer) -> bool {
        self.data.get(index as usize).is_some_and(|&state| state == USED)
    }

    pub fn is_free(&self, index: BlockPointer) -> bool {
        self.data.get(index as usize).is_some_and(|&state| state == FREE)
    }

    pub fn used_count(&self) -> usize {
        self.data.iter().filter(|&&state| state == USED).count()
    }

    pub fn free_count(&self) -> usize {
        self.data.len() - self.used_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Geometry;
    use crate::driver::file_drive::FileDrive;
    use crate::structure::layout::Layout;
    use tempfile::TempDir;

    #[test]
    fn allocate_lowest_first() {
        let mut blockmap = BlockMap::new(8);
        assert_eq!(blockmap.allocate(3), vec![0, 1, 2]);
        blockmap.free(&[1]);
        assert_eq!(blockmap.allocate(2), vec![1, 3]);
        assert!(blockmap.is_used(1));
        assert!(blockmap.is_free(4));
        assert_eq!(blockmap.used_count(), 4);
        assert_eq!(blockmap.free_count(), 4);
    }

    #[test]
    fn short_allocation() {
        let mut blockmap = BlockMap::new(4);
        blockmap.mark_used(&[0, 2]);
        let allocated = blockmap.allocate(5);
        assert_eq!(allocated, vec![1, 3]);
        assert_eq!(blockmap.free_count(), 0);
        assert!(blockmap.allocate(1).is_empty());
    }

    #[test]
    fn free_ignores_out_of_range() {
        let mut blockmap = BlockMap::new(4);
        blockmap.mark_used(&[0, 1, 2, 3, 99]);
        blockmap.free(&[1, 4, 0xFFFF_FFFF]);
        assert_eq!(blockmap.as_bytes(), &[1, 0, 1, 1]);
        assert!(!blockmap.is_used(99));
        assert!(!blockmap.is_free(99));
    }

    #[test]
    fn read_write() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(Geometry::new(512, 64, 2));
        let drive =
            FileDrive::create(dir.path().join("blockmap.img"), layout.volume_size()).unwrap();
        let mut io = IO::new(drive, layout);

        let mut blockmap = BlockMap::new(64);
        blockmap.allocate(10);
        blockmap.free(&[3, 7]);
        blockmap.write(&mut io).unwrap();
        assert_eq!(BlockMap::read(&io).unwrap(), blockmap);
    }

    #[test]
    fn from_bytes_normalizes() {
        let blockmap = BlockMap::from_bytes(&[0, 1, 7, 0]);
        assert_eq!(blockmap.as_bytes(), &[0, 1, 1, 0]);
        assert_eq!(blockmap.len(), 4);
    }
}
