use std::path::Path;

use log::{debug, info, warn};

use crate::config::{Geometry, VolumeConfig};
use crate::consts::{SlotIndex, MAX_BLOCKS_PER_FILE};
use crate::driver::file_drive::FileDrive;
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::journal::{Journal, JournalRecord};
use crate::structure::descriptor::{validate_name, FileDescriptor};
use crate::structure::layout::Layout;
use crate::structure::superblock::SuperBlock;
use crate::structure::Metadata;
use crate::util::error::{FsError, Result};
use crate::util::format::pretty_size_from_bytes;

pub mod defrag;
pub mod recovery;

pub use defrag::DefragReport;
pub use recovery::RecoveryReport;

/// One row of `FlatFS::list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub slot: SlotIndex,
    pub name: String,
    pub size: u32,
    pub block_count: usize,
    pub deleted: bool,
}

impl FileEntry {
    fn new(slot: SlotIndex, descriptor: &FileDescriptor) -> FileEntry {
        FileEntry {
            slot,
            name: descriptor.name().to_string(),
            size: descriptor.size(),
            block_count: descriptor.block_count(),
            deleted: descriptor.is_deleted(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapSummary {
    pub total: usize,
    pub used: usize,
    pub free: usize,
}

/// The storage engine. Owns the volume, its journal and the in-memory
/// metadata mirror; every mutation runs
/// mutate -> data blocks -> journal intent -> persist -> commit.
pub struct FlatFS<D: DeviceDriver> {
    io: IO<D>,
    journal: Journal,
    meta: Metadata,
}

impl FlatFS<FileDrive> {
    /// Opens the volume at `config.volume_path`, formatting a new one if the
    /// file does not exist.
    pub fn from_config(config: &VolumeConfig) -> Result<FlatFS<FileDrive>> {
        let journal = Journal::new(&config.journal_path, config.sync_journal);
        if config.volume_path.exists() {
            FlatFS::open(FileDrive::open(&config.volume_path)?, journal)
        } else {
            FlatFS::create_at(&config.volume_path, journal, config.geometry)
        }
    }

    pub fn create_at(
        path: &Path,
        journal: Journal,
        geometry: Geometry,
    ) -> Result<FlatFS<FileDrive>> {
        geometry.validate()?;
        let drive = FileDrive::create(path, Layout::new(geometry).volume_size())?;
        FlatFS::create(drive, journal, geometry)
    }
}

impl<D: DeviceDriver> FlatFS<D> {
    /// Formats `device` and starts a fresh journal.
    pub fn create(device: D, journal: Journal, geometry: Geometry) -> Result<FlatFS<D>> {
        geometry.validate()?;
        let mut fs = FlatFS {
            io: IO::new(device, Layout::new(geometry)),
            journal,
            meta: Metadata::new(geometry),
        };
        fs.format(geometry)?;
        Ok(fs)
    }

    /// Loads an existing volume and replays its journal. A bad magic number
    /// fails with `InvalidVolume`.
    pub fn open(device: D, journal: Journal) -> Result<FlatFS<D>> {
        let mut io = IO::new(device, Layout::new(Geometry::default()));
        let meta = Metadata::load(&mut io)?;
        let mut fs = FlatFS { io, journal, meta };
        fs.recover()?;
        info!(
            "Opened volume: {} blocks of {} bytes, {} file slots",
            fs.geometry().block_count,
            fs.geometry().block_size,
            fs.geometry().max_files
        );
        Ok(fs)
    }

    /// Writes a fresh header, zeroed bitmap, empty file table and zeroed data
    /// region, loads it back, and restarts the journal with a commit marker.
    pub fn format(&mut self, geometry: Geometry) -> Result<()> {
        geometry.validate()?;
        let fresh = Metadata::new(geometry);
        self.io.set_layout(fresh.layout());
        self.io.reset_device()?;
        fresh.persist(&mut self.io)?;
        self.meta = Metadata::load(&mut self.io)?;

        self.journal.reset()?;
        self.journal.commit()?;
        info!(
            "Filesystem initialized ({}, {} blocks, {} file slots)",
            pretty_size_from_bytes(geometry.capacity_bytes()),
            geometry.block_count,
            geometry.max_files
        );
        Ok(())
    }

    pub fn create_file(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        if self.meta.file_table.find(name, false).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        self.transaction(|fs| {
            match fs.meta.file_table.find(name, true) {
                // a tombstone of the same name is revived in place
                Some(slot) => {
                    let meta = &mut fs.meta;
                    if let Some(descriptor) = meta.file_table.get_mut(slot) {
                        meta.blockmap.free(descriptor.blocks());
                        descriptor.clear_contents();
                        descriptor.mark_live();
                    }
                    debug!("Create '{}': reviving slot {}", name, slot);
                }
                None => {
                    let slot = fs.meta.file_table.free_slot().ok_or(FsError::NoFreeSlot)?;
                    fs.meta.file_table.claim(slot, FileDescriptor::new(name));
                    debug!("Create '{}': slot {}", name, slot);
                }
            }
            fs.journal_and_persist(JournalRecord::Create { name: name.to_string() })
        })
    }

    /// Replaces the whole contents of `name`. Also revives a deleted file.
    pub fn write(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let slot = self.find(name)?;
        let block_size = self.meta.block_size();
        let needed = self.meta.layout().blocks_for(data.len());
        if needed > MAX_BLOCKS_PER_FILE {
            return Err(FsError::TooLarge { needed, max: MAX_BLOCKS_PER_FILE });
        }

        self.transaction(|fs| {
            let old_blocks = fs.descriptor(slot)?.blocks().to_vec();
            fs.meta.blockmap.free(&old_blocks);
            let new_blocks = fs.meta.blockmap.allocate(needed);
            if new_blocks.len() < needed {
                fs.meta.blockmap.free(&new_blocks);
                fs.meta.blockmap.mark_used(&old_blocks);
                warn!(
                    "Write '{}': {} blocks needed, {} free; rolled back",
                    name,
                    needed,
                    new_blocks.len()
                );
                return Err(FsError::InsufficientSpace { needed, available: new_blocks.len() });
            }

            for (chunk, &block) in data.chunks(block_size).zip(&new_blocks) {
                let mut buffer = chunk.to_vec();
                buffer.resize(block_size, 0);
                fs.io.write_block(block, &buffer)?;
            }

            let descriptor = fs.descriptor_mut(slot)?;
            descriptor.set_contents(data.len() as u32, new_blocks.clone(), block_size)?;
            descriptor.mark_live();
            debug!("Write '{}': {} bytes in blocks {:?}", name, data.len(), new_blocks);

            fs.journal_and_persist(JournalRecord::Write {
                name: name.to_string(),
                size: data.len() as u32,
                blocks: new_blocks,
            })
        })
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let slot = self.find(name)?;
        let descriptor = self.descriptor(slot)?;
        if descriptor.is_deleted() {
            return Err(FsError::Deleted(name.to_string()));
        }

        let mut data = Vec::with_capacity(descriptor.block_count() * self.meta.block_size());
        for &block in descriptor.blocks() {
            data.extend_from_slice(&self.io.read_block(block)?);
        }
        data.truncate(descriptor.size() as usize);
        Ok(data)
    }

    /// Tombstones `name`. Its blocks stay marked used until a later write,
    /// revival or defragmentation reclaims them.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let slot = self.find(name)?;
        if self.descriptor(slot)?.is_deleted() {
            return Err(FsError::AlreadyDeleted(name.to_string()));
        }

        self.transaction(|fs| {
            let descriptor = fs.descriptor_mut(slot)?;
            descriptor.mark_deleted();
            let record = JournalRecord::Delete {
                name: name.to_string(),
                size: descriptor.size(),
                blocks: descriptor.blocks().to_vec(),
            };
            debug!("Delete '{}' (slot {})", name, slot);
            fs.journal_and_persist(record)
        })
    }

    /// Every occupied slot, tombstones included, in slot order.
    pub fn list(&self) -> Vec<FileEntry> {
        self.meta
            .file_table
            .iter()
            .map(|(slot, descriptor)| FileEntry::new(slot, descriptor))
            .collect()
    }

    /// The live file called `name`.
    pub fn stat(&self, name: &str) -> Result<FileEntry> {
        let slot = self.find(name)?;
        let descriptor = self.descriptor(slot)?;
        if descriptor.is_deleted() {
            return Err(FsError::Deleted(name.to_string()));
        }
        Ok(FileEntry::new(slot, descriptor))
    }

    pub fn entry(&self, slot: SlotIndex) -> Option<FileEntry> {
        self.meta.file_table.get(slot).map(|descriptor| FileEntry::new(slot, descriptor))
    }

    pub fn bitmap_summary(&self) -> BitmapSummary {
        let blockmap = &self.meta.blockmap;
        BitmapSummary {
            total: blockmap.len(),
            used: blockmap.used_count(),
            free: blockmap.free_count(),
        }
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.meta.superblock
    }

    pub fn geometry(&self) -> Geometry {
        self.meta.superblock.geometry
    }

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Slot of `name`, live or tombstoned.
    fn find(&self, name: &str) -> Result<SlotIndex> {
        self.meta.file_table.find(name, true).ok_or_else(|| FsError::NotFound(name.to_string()))
    }

    fn descriptor(&self, slot: SlotIndex) -> Result<&FileDescriptor> {
        self.meta
            .file_table
            .get(slot)
            .ok_or_else(|| FsError::Corrupt(format!("slot {} is empty", slot)))
    }

    fn descriptor_mut(&mut self, slot: SlotIndex) -> Result<&mut FileDescriptor> {
        self.meta
            .file_table
            .get_mut(slot)
            .ok_or_else(|| FsError::Corrupt(format!("slot {} is empty", slot)))
    }

    /// Runs `operation`, restoring the in-memory metadata if it fails.
    fn transaction<T>(&mut self, operation: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.meta.clone();
        let result = operation(self);
        if result.is_err() {
            self.meta = snapshot;
        }
        result
    }

    /// Intent record, full metadata persist, commit marker.
    fn journal_and_persist(&mut self, record: JournalRecord) -> Result<()> {
        self.journal.append(&record)?;
        self.meta.persist(&mut self.io)?;
        // the metadata is durable at this point; the marker is advisory
        if let Err(err) = self.journal.commit() {
            warn!("Could not append commit marker: {}", err);
        }
        Ok(())
    }
}
