use std::io::{self, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::config::Geometry;
use crate::consts::{HEADER_RESERVED, MAGIC, VERSION};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::{FsError, Result};
use crate::util::serializable::{ByteSerializable, KnownSize};

/// On-disk image of the volume header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub num_blocks: u32,
    pub max_files: u32,
    pub timestamp: u32,
    pub reserved: [u8; HEADER_RESERVED],
}

impl KnownSize for RawHeader {
    fn size_on_disk() -> usize {
        6 * 4 + HEADER_RESERVED
    }
}

impl ByteSerializable for RawHeader {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.block_size)?;
        writer.write_u32::<LittleEndian>(self.num_blocks)?;
        writer.write_u32::<LittleEndian>(self.max_files)?;
        writer.write_u32::<LittleEndian>(self.timestamp)?;
        writer.write_all(&self.reserved)
    }

    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let magic = reader.read_u32::<LittleEndian>()?;
        let version = reader.read_u32::<LittleEndian>()?;
        let block_size = reader.read_u32::<LittleEndian>()?;
        let num_blocks = reader.read_u32::<LittleEndian>()?;
        let max_files = reader.read_u32::<LittleEndian>()?;
        let timestamp = reader.read_u32::<LittleEndian>()?;
        let mut reserved = [0u8; HEADER_RESERVED];
        reader.read_exact(&mut reserved)?;
        Ok(RawHeader { magic, version, block_size, num_blocks, max_files, timestamp, reserved })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub version: u32,
    pub geometry: Geometry,
    /// Seconds since the epoch at format time.
    pub created_at: u32,
}

impl SuperBlock {
    pub fn new(geometry: Geometry) -> SuperBlock {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_secs() as u32)
            .unwrap_or(0);
        SuperBlock { version: VERSION, geometry, created_at }
    }

    pub fn to_raw(&self) -> RawHeader {
        RawHeader {
            magic: MAGIC,
            version: self.version,
            block_size: self.geometry.block_size as u32,
            num_blocks: self.geometry.block_count,
            max_files: self.geometry.max_files,
            timestamp: self.created_at,
            reserved: [0u8; HEADER_RESERVED],
        }
    }

    pub fn from_raw(raw: &RawHeader) -> Result<SuperBlock> {
        if raw.magic != MAGIC {
            return Err(FsError::InvalidVolume(format!("bad magic number {:#010x}", raw.magic)));
        }

        Ok(SuperBlock {
            version: raw.version,
            geometry: Geometry::new(raw.block_size as usize, raw.num_blocks, raw.max_files),
            created_at: raw.timestamp,
        })
    }

    // note: the header is read before the geometry, and so the layout, is known
    pub fn read<D: DeviceDriver>(io: &IO<D>) -> Result<SuperBlock> {
        let buffer = io
            .read_region(0, RawHeader::size_on_disk())
            .map_err(|err| FsError::InvalidVolume(format!("cannot read header: {}", err)))?;
        SuperBlock::from_raw(&RawHeader::from_bytes(&buffer)?)
    }

    pub fn write<D: DeviceDriver>(&self, io: &mut IO<D>) -> Result<()> {
        io.write_region(io.layout().header_offset(), &self.to_raw().to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::file_drive::FileDrive;
    use crate::structure::layout::Layout;
    use tempfile::TempDir;

    #[test]
    fn header_is_88_bytes() {
        let raw = SuperBlock::new(Geometry::default()).to_raw();
        let bytes = raw.to_bytes();
        assert_eq!(bytes.len(), 88);
        assert_eq!(&bytes[0..4], &MAGIC.to_le_bytes());
        assert_eq!(&bytes[8..12], &512u32.to_le_bytes());
        assert_eq!(RawHeader::from_bytes(&bytes).unwrap(), raw);
    }

    #[test]
    fn read_write_superblock() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(Geometry::default());
        let drive =
            FileDrive::create(dir.path().join("superblock.img"), layout.volume_size()).unwrap();
        let mut io = IO::new(drive, layout);

        let superblock = SuperBlock::new(Geometry::new(1024, 64, 8));
        superblock.write(&mut io).unwrap();
        assert_eq!(SuperBlock::read(&io).unwrap(), superblock);
    }

    #[test]
    fn bad_magic_is_invalid_volume() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(Geometry::default());
        let drive = FileDrive::create(dir.path().join("zeroes.img"), layout.volume_size()).unwrap();
        let io = IO::new(drive, layout);
        assert!(matches!(SuperBlock::read(&io), Err(FsError::InvalidVolume(_))));
    }

    #[test]
    fn tiny_file_is_invalid_volume() {
        let dir = TempDir::new().unwrap();
        let drive = FileDrive::create(dir.path().join("tiny.img"), 10).unwrap();
        let io = IO::new(drive, Layout::new(Geometry::default()));
        assert!(matches!(SuperBlock::read(&io), Err(FsError::InvalidVolume(_))));
    }
}
