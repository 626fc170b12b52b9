use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::consts::{BlockPointer, BlockPointers, FileName, FILE_NAME_LENGTH, MAX_BLOCKS_PER_FILE};
use crate::util::error::{FsError, Result};
use crate::util::serializable::{ByteSerializable, KnownSize};

/// Marks an unused entry of an on-disk block list.
pub const NO_BLOCK: u32 = 0xFFFF_FFFF;

pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > FILE_NAME_LENGTH || name.contains('\0') {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Zero-padded fixed-width name. Callers validate the length first.
pub fn encode_name(name: &str) -> FileName {
    let mut bytes = [0u8; FILE_NAME_LENGTH];
    let len = name.len().min(FILE_NAME_LENGTH);
    bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
    bytes
}

/// Reads up to the first NUL; an all-zero name decodes to `None`.
pub fn decode_name(bytes: &FileName) -> Option<String> {
    let len = bytes.iter().position(|&byte| byte == 0).unwrap_or(FILE_NAME_LENGTH);
    if len == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes[..len]).into_owned())
}

pub fn encode_blocks(blocks: &[BlockPointer]) -> BlockPointers {
    let mut pointers = [NO_BLOCK; MAX_BLOCKS_PER_FILE];
    for (pointer, &block) in pointers.iter_mut().zip(blocks) {
        *pointer = block;
    }
    pointers
}

/// First `count` entries of an on-disk block list. A `NO_BLOCK` among them is
/// corruption.
pub fn decode_blocks(pointers: &BlockPointers, count: u32) -> Result<Vec<BlockPointer>> {
    let count = count as usize;
    if count > MAX_BLOCKS_PER_FILE {
        return Err(FsError::Corrupt(format!(
            "block count {} exceeds {}",
            count, MAX_BLOCKS_PER_FILE
        )));
    }
    let blocks = &pointers[..count];
    if let Some(hole) = blocks.iter().position(|&pointer| pointer == NO_BLOCK) {
        return Err(FsError::Corrupt(format!("block list of {} has a hole at {}", count, hole)));
    }
    Ok(blocks.to_vec())
}

pub(crate) fn write_pointers<W: Write>(writer: &mut W, pointers: &BlockPointers) -> io::Result<()> {
    for pointer in pointers {
        writer.write_u32::<LittleEndian>(*pointer)?;
    }
    Ok(())
}

pub(crate) fn read_pointers<R: Read>(reader: &mut R) -> io::Result<BlockPointers> {
    let mut pointers = [NO_BLOCK; MAX_BLOCKS_PER_FILE];
    reader.read_u32_into::<LittleEndian>(&mut pointers)?;
    Ok(pointers)
}

/// On-disk image of one file table slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDescriptor {
    pub name: FileName,
    pub size: u32,
    pub deleted: u8,
    pub block_count: u32,
    pub blocks: BlockPointers,
}

impl RawDescriptor {
    pub fn empty() -> RawDescriptor {
        RawDescriptor {
            name: [0u8; FILE_NAME_LENGTH],
            size: 0,
            deleted: 0,
            block_count: 0,
            blocks: [NO_BLOCK; MAX_BLOCKS_PER_FILE],
        }
    }
}

impl KnownSize for RawDescriptor {
    fn size_on_disk() -> usize {
        FILE_NAME_LENGTH + 4 + 1 + 4 + MAX_BLOCKS_PER_FILE * 4
    }
}

impl ByteSerializable for RawDescriptor {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.name)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        writer.write_u8(self.deleted)?;
        writer.write_u32::<LittleEndian>(self.block_count)?;
        write_pointers(writer, &self.blocks)
    }

    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut name = [0u8; FILE_NAME_LENGTH];
        reader.read_exact(&mut name)?;
        let size = reader.read_u32::<LittleEndian>()?;
        let deleted = reader.read_u8()?;
        let block_count = reader.read_u32::<LittleEndian>()?;
        let blocks = read_pointers(reader)?;
        Ok(RawDescriptor { name, size, deleted, block_count, blocks })
    }
}

/// In-memory file record. The block list never exceeds `MAX_BLOCKS_PER_FILE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    name: String,
    size: u32,
    deleted: bool,
    blocks: Vec<BlockPointer>,
}

impl FileDescriptor {
    pub fn new(name: &str) -> FileDescriptor {
        FileDescriptor { name: name.to_string(), size: 0, deleted: false, blocks: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_live(&self) -> bool {
        !self.deleted
    }

    pub fn blocks(&self) -> &[BlockPointer] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Replaces size and block list together, keeping
    /// `block_count == ceil(size / block_size)`.
    pub fn set_contents(
        &mut self,
        size: u32,
        blocks: Vec<BlockPointer>,
        block_size: usize,
    ) -> Result<()> {
        if blocks.len() > MAX_BLOCKS_PER_FILE {
            return Err(FsError::TooLarge { needed: blocks.len(), max: MAX_BLOCKS_PER_FILE });
        }
        if blocks.len() != (size as usize).div_ceil(block_size) {
            return Err(FsError::Corrupt(format!(
                "'{}': {} blocks cannot hold {} bytes",
                self.name,
                blocks.len(),
                size
            )));
        }
        self.size = size;
        self.blocks = blocks;
        Ok(())
    }

    /// Swaps the block list for one of the same length.
    pub fn relocate(&mut self, blocks: Vec<BlockPointer>) -> Result<()> {
        if blocks.len() != self.blocks.len() {
            return Err(FsError::Corrupt(format!(
                "'{}': relocation to {} blocks, expected {}",
                self.name,
                blocks.len(),
                self.blocks.len()
            )));
        }
        self.blocks = blocks;
        Ok(())
    }

    pub fn clear_contents(&mut self) {
        self.size = 0;
        self.blocks.clear();
    }

    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    pub fn mark_live(&mut self) {
        self.deleted = false;
    }

    pub fn to_raw(&self) -> RawDescriptor {
        RawDescriptor {
            name: encode_name(&self.name),
            size: self.size,
            deleted: self.deleted as u8,
            block_count: self.blocks.len() as u32,
            blocks: encode_blocks(&self.blocks),
        }
    }

    /// An empty name is an unused slot. A used slot whose block list cannot
    /// hold exactly its size is corrupt.
    pub fn from_raw(raw: &RawDescriptor, block_size: usize) -> Result<Option<FileDescriptor>> {
        let Some(name) = decode_name(&raw.name) else {
            return Ok(None);
        };

        let mut descriptor = FileDescriptor::new(&name);
        let blocks = decode_blocks(&raw.blocks, raw.block_count)?;
        descriptor.set_contents(raw.size, blocks, block_size)?;
        if raw.deleted != 0 {
            descriptor.mark_deleted();
        }
        Ok(Some(descriptor))
    }
}
