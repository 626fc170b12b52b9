use std::io::Cursor;

use crate::consts::SlotIndex;
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::descriptor::{FileDescriptor, RawDescriptor};
use crate::util::error::Result;
use crate::util::serializable::{ByteSerializable, KnownSize};

/// Fixed-capacity slot table; `None` is an unused slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTable {
    slots: Vec<Option<FileDescriptor>>,
}

impl FileTable {
    pub fn new(max_files: u32) -> FileTable {
        FileTable { slots: vec![None; max_files as usize] }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn read<D: DeviceDriver>(io: &IO<D>) -> Result<FileTable> {
        let layout = *io.layout();
        let bytes = io.read_region(layout.file_table_offset(), layout.file_table_size())?;
        let mut cursor = Cursor::new(bytes.as_slice());
        let mut slots = Vec::with_capacity(layout.max_files as usize);
        for _ in 0..layout.max_files {
            let raw = RawDescriptor::read_from(&mut cursor)?;
            slots.push(FileDescriptor::from_raw(&raw, layout.block_size)?);
        }
        Ok(FileTable { slots })
    }

    pub fn write<D: DeviceDriver>(&self, io: &mut IO<D>) -> Result<()> {
        let mut bytes = Vec::with_capacity(self.slots.len() * RawDescriptor::size_on_disk());
        for slot in &self.slots {
            let raw = match slot {
                Some(descriptor) => descriptor.to_raw(),
                None => RawDescriptor::empty(),
            };
            raw.write_to(&mut bytes)?;
        }
        let offset = io.layout().file_table_offset();
        io.write_region(offset, &bytes)
    }

    /// Finds the slot holding `name`. A live descriptor wins over a tombstone;
    /// tombstones are only returned when `include_deleted` is set.
    pub fn find(&self, name: &str, include_deleted: bool) -> Option<SlotIndex> {
        let mut tombstone = None;
        for (index, descriptor) in self.iter() {
            if descriptor.name() != name {
                continue;
            }
            if descriptor.is_live() {
                return Some(index);
            }
            if tombstone.is_none() {
                tombstone = Some(index);
            }
        }
        if include_deleted {
            tombstone
        } else {
            None
        }
    }

    pub fn free_slot(&self) -> Option<SlotIndex> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn get(&self, index: SlotIndex) -> Option<&FileDescriptor> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: SlotIndex) -> Option<&mut FileDescriptor> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Places `descriptor` into an unused slot. Returns false if the slot is
    /// taken or out of range.
    pub fn claim(&mut self, index: SlotIndex, descriptor: FileDescriptor) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(descriptor);
                true
            }
            _ => false,
        }
    }

    /// Occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &FileDescriptor)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|descriptor| (index, descriptor)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotIndex, &mut FileDescriptor)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|descriptor| (index, descriptor)))
    }

    pub fn live(&self) -> impl Iterator<Item = (SlotIndex, &FileDescriptor)> {
        self.iter().filter(|(_, descriptor)| descriptor.is_live())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Geometry;
    use crate::driver::file_drive::FileDrive;
    use crate::structure::layout::Layout;
    use crate::util::error::FsError;
    use tempfile::TempDir;

    fn descriptor(name: &str, size: u32, blocks: Vec<u32>) -> FileDescriptor {
        let mut descriptor = FileDescriptor::new(name);
        descriptor.set_contents(size, blocks, 512).unwrap();
        descriptor
    }

    #[test]
    fn read_write_table() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(Geometry::new(512, 32, 8));
        let drive = FileDrive::create(dir.path().join("table.img"), layout.volume_size()).unwrap();
        let mut io = IO::new(drive, layout);

        let mut table = FileTable::new(8);
        assert!(table.claim(0, descriptor("a", 5, vec![0])));
        let mut deleted = descriptor("b", 1024, vec![3, 1]);
        deleted.mark_deleted();
        assert!(table.claim(5, deleted));
        table.write(&mut io).unwrap();

        let read = FileTable::read(&io).unwrap();
        assert_eq!(read, table);
        assert_eq!(read.capacity(), 8);
        assert_eq!(read.get(5).unwrap().blocks(), &[3, 1]);
        assert!(read.get(1).is_none());
    }

    #[test]
    fn inconsistent_descriptor_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(Geometry::new(512, 32, 4));
        let drive = FileDrive::create(dir.path().join("table.img"), layout.volume_size()).unwrap();
        let mut io = IO::new(drive, layout);

        // 2000 bytes claimed on a single block
        let mut raw = descriptor("a", 5, vec![0]).to_raw();
        raw.size = 2000;
        io.write_region(layout.file_table_offset(), &raw.to_bytes()).unwrap();

        assert!(matches!(FileTable::read(&io), Err(FsError::Corrupt(_))));
    }

    #[test]
    fn find_prefers_live() {
        let mut table = FileTable::new(4);
        let mut tombstone = FileDescriptor::new("a");
        tombstone.mark_deleted();
        table.claim(0, tombstone);
        assert_eq!(table.find("a", false), None);
        assert_eq!(table.find("a", true), Some(0));

        table.claim(2, FileDescriptor::new("a"));
        assert_eq!(table.find("a", false), Some(2));
        assert_eq!(table.find("a", true), Some(2));
        assert_eq!(table.find("b", true), None);
    }

    #[test]
    fn claim_and_free_slot() {
        let mut table = FileTable::new(2);
        assert_eq!(table.free_slot(), Some(0));
        assert!(table.claim(0, FileDescriptor::new("a")));
        assert!(!table.claim(0, FileDescriptor::new("b")));
        assert!(!table.claim(7, FileDescriptor::new("b")));
        assert!(table.claim(1, FileDescriptor::new("b")));
        assert_eq!(table.free_slot(), None);
        assert_eq!(table.iter().count(), 2);
        assert_eq!(table.live().map(|(index, _)| index).collect::<Vec<_>>(), vec![0, 1]);
    }
}
