use crate::config::Geometry;
use crate::consts::BlockPointer;
use crate::structure::descriptor::RawDescriptor;
use crate::structure::superblock::RawHeader;
use crate::util::serializable::KnownSize;

/// Byte offsets of the regions of a volume:
/// `Header | Bitmap | FileTable | Data[0..block_count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub block_size: usize,
    pub block_count: u32,
    pub max_files: u32,
}

impl Layout {
    pub fn new(geometry: Geometry) -> Layout {
        Layout {
            block_size: geometry.block_size,
            block_count: geometry.block_count,
            max_files: geometry.max_files,
        }
    }

    #[inline]
    pub fn header_offset(&self) -> u64 {
        0
    }

    #[inline]
    pub fn header_size(&self) -> usize {
        RawHeader::size_on_disk()
    }

    #[inline]
    pub fn bitmap_offset(&self) -> u64 {
        self.header_size() as u64
    }

    #[inline]
    pub fn bitmap_size(&self) -> usize {
        self.block_count as usize
    }

    #[inline]
    pub fn file_table_offset(&self) -> u64 {
        self.bitmap_offset() + self.bitmap_size() as u64
    }

    #[inline]
    pub fn file_table_size(&self) -> usize {
        self.max_files as usize * RawDescriptor::size_on_disk()
    }

    #[inline]
    pub fn metadata_size(&self) -> usize {
        self.header_size() + self.bitmap_size() + self.file_table_size()
    }

    #[inline]
    pub fn data_region_offset(&self) -> u64 {
        self.file_table_offset() + self.file_table_size() as u64
    }

    /// Callers must not pass an index `>= block_count`.
    #[inline]
    pub fn block_offset(&self, index: BlockPointer) -> u64 {
        self.data_region_offset() + index as u64 * self.block_size as u64
    }

    pub fn volume_size(&self) -> u64 {
        self.data_region_offset() + self.block_count as u64 * self.block_size as u64
    }

    pub fn blocks_for(&self, bytes: usize) -> usize {
        bytes.div_ceil(self.block_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_offsets() {
        let layout = Layout::new(Geometry::default());
        assert_eq!(layout.header_size(), 88);
        assert_eq!(layout.bitmap_offset(), 88);
        assert_eq!(layout.bitmap_size(), 2048);
        assert_eq!(layout.file_table_offset(), 88 + 2048);
        assert_eq!(layout.file_table_size(), 128 * 1065);
        assert_eq!(layout.data_region_offset(), 88 + 2048 + 128 * 1065);
        assert_eq!(layout.block_offset(0), layout.data_region_offset());
        assert_eq!(layout.block_offset(3), layout.data_region_offset() + 3 * 512);
        assert_eq!(layout.volume_size(), layout.data_region_offset() + 2048 * 512);
    }

    #[test]
    fn blocks_for_rounds_up() {
        let layout = Layout::new(Geometry::default());
        assert_eq!(layout.blocks_for(0), 0);
        assert_eq!(layout.blocks_for(1), 1);
        assert_eq!(layout.blocks_for(512), 1);
        assert_eq!(layout.blocks_for(513), 2);
    }
}
