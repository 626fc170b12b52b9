use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::consts::{BlockPointer, BlockPointers, FileName, FILE_NAME_LENGTH, MAX_BLOCKS_PER_FILE};
use crate::structure::descriptor::{
    decode_blocks, decode_name, encode_blocks, encode_name, read_pointers, write_pointers,
    NO_BLOCK,
};
use crate::util::error::{FsError, Result};
use crate::util::serializable::{ByteSerializable, KnownSize};

const TAG_CREATE: u8 = 1;
const TAG_WRITE: u8 = 2;
const TAG_DELETE: u8 = 3;
const TAG_DEFRAG: u8 = 4;
const TAG_COMMIT: u8 = 0xFF;

/// One journal entry. Create/Write/Delete describe the state of the named
/// file after the operation, not a delta, so replay is idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    Create { name: String },
    Write { name: String, size: u32, blocks: Vec<BlockPointer> },
    Delete { name: String, size: u32, blocks: Vec<BlockPointer> },
    Defrag,
    Commit,
}

impl JournalRecord {
    pub fn tag(&self) -> u8 {
        match self {
            JournalRecord::Create { .. } => TAG_CREATE,
            JournalRecord::Write { .. } => TAG_WRITE,
            JournalRecord::Delete { .. } => TAG_DELETE,
            JournalRecord::Defrag => TAG_DEFRAG,
            JournalRecord::Commit => TAG_COMMIT,
        }
    }

    pub fn to_raw(&self) -> RawRecord {
        let mut raw = RawRecord::empty(self.tag());
        match self {
            JournalRecord::Create { name } => {
                raw.filename = encode_name(name);
            }
            JournalRecord::Write { name, size, blocks }
            | JournalRecord::Delete { name, size, blocks } => {
                raw.filename = encode_name(name);
                raw.size = *size;
                raw.block_count = blocks.len().min(MAX_BLOCKS_PER_FILE) as u32;
                raw.blocks = encode_blocks(blocks);
            }
            JournalRecord::Defrag | JournalRecord::Commit => {}
        }
        raw
    }

    /// `Ok(None)` for a tag this version does not know.
    pub fn from_raw(raw: &RawRecord) -> Result<Option<JournalRecord>> {
        let name = || {
            decode_name(&raw.filename).ok_or_else(|| {
                FsError::Corrupt(format!("record type {} without a file name", raw.tag))
            })
        };

        let record = match raw.tag {
            TAG_CREATE => JournalRecord::Create { name: name()? },
            TAG_WRITE => JournalRecord::Write {
                name: name()?,
                size: raw.size,
                blocks: decode_blocks(&raw.blocks, raw.block_count)?,
            },
            TAG_DELETE => JournalRecord::Delete {
                name: name()?,
                size: raw.size,
                blocks: decode_blocks(&raw.blocks, raw.block_count)?,
            },
            TAG_DEFRAG => JournalRecord::Defrag,
            TAG_COMMIT => JournalRecord::Commit,
            _ => return Ok(None),
        };
        Ok(Some(record))
    }
}

/// On-disk image of a journal entry:
/// `type u8 | filename [u8; 32] | size u32 | block_count u32 | blocks [u32; 256]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub tag: u8,
    pub filename: FileName,
    pub size: u32,
    pub block_count: u32,
    pub blocks: BlockPointers,
}

impl RawRecord {
    pub fn empty(tag: u8) -> RawRecord {
        RawRecord {
            tag,
            filename: [0u8; FILE_NAME_LENGTH],
            size: 0,
            block_count: 0,
            blocks: [NO_BLOCK; MAX_BLOCKS_PER_FILE],
        }
    }
}

impl KnownSize for RawRecord {
    fn size_on_disk() -> usize {
        1 + FILE_NAME_LENGTH + 4 + 4 + MAX_BLOCKS_PER_FILE * 4
    }
}

impl ByteSerializable for RawRecord {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(self.tag)?;
        writer.write_all(&self.filename)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        writer.write_u32::<LittleEndian>(self.block_count)?;
        write_pointers(writer, &self.blocks)
    }

    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let tag = reader.read_u8()?;
        let mut filename = [0u8; FILE_NAME_LENGTH];
        reader.read_exact(&mut filename)?;
        let size = reader.read_u32::<LittleEndian>()?;
        let block_count = reader.read_u32::<LittleEndian>()?;
        let blocks = read_pointers(reader)?;
        Ok(RawRecord { tag, filename, size, block_count, blocks })
    }
}
