use std::io;

pub mod file_drive;

/// Byte-addressed backing store of a volume.
pub trait DeviceDriver {
    fn get_size(&self) -> u64;
    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> io::Result<()>;
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;
    /// Truncates or zero-extends the store.
    fn set_size(&mut self, bytes: u64) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}
