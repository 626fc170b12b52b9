pub const MAGIC: u32 = 0xF5F5_F5F5;
pub const VERSION: u32 = 1;

pub const DEFAULT_BLOCK_SIZE: usize = 512;
pub const DEFAULT_BLOCK_COUNT: u32 = 2048;
pub const DEFAULT_MAX_FILES: u32 = 128;

pub const FILE_NAME_LENGTH: usize = 32;
pub const MAX_BLOCKS_PER_FILE: usize = 256;
pub const HEADER_RESERVED: usize = 64;

pub const DEFAULT_VOLUME_PATH: &str = "disk.img";
pub const DEFAULT_JOURNAL_PATH: &str = "disk.journal";

pub type BlockPointer = u32;
pub type SlotIndex = usize;
pub type FileName = [u8; FILE_NAME_LENGTH];
pub type BlockPointers = [u32; MAX_BLOCKS_PER_FILE];
