use log::trace;

use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;
use crate::structure::layout::Layout;
use crate::util::error::{FsError, Result};

/// Region and block access over a device, bounds-checked against the device
/// size and the current layout.
pub struct IO<D: DeviceDriver> {
    device: D,
    layout: Layout,
}

impl<D: DeviceDriver> IO<D> {
    pub fn new(device: D, layout: Layout) -> IO<D> {
        IO { device, layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn read_region(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.check_bounds(offset, len)?;
        let mut buffer = vec![0u8; len];
        self.device.read_at(offset, &mut buffer)?;
        Ok(buffer)
    }

    pub fn write_region(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.check_bounds(offset, data.len())?;
        self.device.write_at(offset, data)?;
        Ok(())
    }

    pub fn read_block(&self, index: BlockPointer) -> Result<Vec<u8>> {
        let offset = self.block_offset(index)?;
        trace!("Reading block {} at offset {}", index, offset);
        self.read_region(offset, self.layout.block_size)
    }

    pub fn write_block(&mut self, index: BlockPointer, block: &[u8]) -> Result<()> {
        if block.len() != self.layout.block_size {
            return Err(FsError::Corrupt(format!(
                "block size mismatch - expected {}, got {}",
                self.layout.block_size,
                block.len()
            )));
        }

        let offset = self.block_offset(index)?;
        trace!("Writing block {} at offset {}", index, offset);
        self.write_region(offset, block)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.device.flush()?;
        Ok(())
    }

    /// Truncates the device, then zero-extends it to the size of the current layout.
    pub fn reset_device(&mut self) -> Result<()> {
        self.device.set_size(0)?;
        self.device.set_size(self.layout.volume_size())?;
        Ok(())
    }

    fn block_offset(&self, index: BlockPointer) -> Result<u64> {
        if index >= self.layout.block_count {
            return Err(FsError::OutOfBounds {
                offset: index as u64,
                len: self.layout.block_size,
                size: self.layout.block_count as u64,
            });
        }
        Ok(self.layout.block_offset(index))
    }

    fn check_bounds(&self, offset: u64, len: usize) -> Result<()> {
        let size = self.device.get_size();
        if offset.checked_add(len as u64).map_or(true, |end| end > size) {
            return Err(FsError::OutOfBounds { offset, len, size });
        }
        Ok(())
    }
}
