use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use log::debug;

use crate::consts::{SlotIndex, MAX_BLOCKS_PER_FILE};
use crate::driver::DeviceDriver;
use crate::ops::{FileEntry, FlatFS};
use crate::util::error::FsError;

const TTL: Duration = Duration::from_secs(1);
pub const ROOT_INODE: u64 = 1;

/// Inode numbers are slot indices shifted past the root.
pub fn slot_to_inode(slot: SlotIndex) -> u64 {
    slot as u64 + 2
}

pub fn inode_to_slot(ino: u64) -> Option<SlotIndex> {
    ino.checked_sub(2).map(|slot| slot as SlotIndex)
}

/// Exposes the flat file table as a single directory.
pub struct FuseDriver<D: DeviceDriver> {
    fs: FlatFS<D>,
    uid: u32,
    gid: u32,
}

impl<D: DeviceDriver> FuseDriver<D> {
    pub fn new(fs: FlatFS<D>) -> FuseDriver<D> {
        FuseDriver { fs, uid: 0, gid: 0 }
    }

    fn created_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.fs.superblock().created_at as u64)
    }

    fn root_attr(&self) -> FileAttr {
        let time = self.created_at();
        FileAttr {
            ino: ROOT_INODE,
            size: 0,
            blocks: 0,
            atime: time,
            mtime: time,
            ctime: time,
            crtime: time,
            kind: FileType::Directory,
            perm: 0o755,
            nlink: 2,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: self.fs.geometry().block_size as u32,
            flags: 0,
        }
    }

    fn file_attr(&self, entry: &FileEntry) -> FileAttr {
        let time = self.created_at();
        FileAttr {
            ino: slot_to_inode(entry.slot),
            size: entry.size as u64,
            blocks: entry.block_count as u64,
            atime: time,
            mtime: time,
            ctime: time,
            crtime: time,
            kind: FileType::RegularFile,
            perm: 0o644,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: self.fs.geometry().block_size as u32,
            flags: 0,
        }
    }

    /// The live file behind `ino`.
    fn entry(&self, ino: u64) -> Result<FileEntry, c_int> {
        inode_to_slot(ino)
            .and_then(|slot| self.fs.entry(slot))
            .filter(|entry| !entry.deleted)
            .ok_or(libc::ENOENT)
    }

    fn lookup_name(&self, parent: u64, name: &OsStr) -> Result<FileEntry, c_int> {
        if parent != ROOT_INODE {
            return Err(libc::ENOENT);
        }
        let name = name.to_str().ok_or(libc::EINVAL)?;
        self.fs.stat(name).map_err(|err| err.errno())
    }

    /// `bytes` as a file length, if a file may be that long. `None` stands
    /// for a length that does not fit in memory at all.
    fn check_length(&self, bytes: Option<usize>) -> Result<usize, FsError> {
        let block_size = self.fs.geometry().block_size;
        let needed = bytes.map_or(usize::MAX, |bytes| bytes.div_ceil(block_size));
        match bytes {
            Some(bytes) if needed <= MAX_BLOCKS_PER_FILE => Ok(bytes),
            _ => Err(FsError::TooLarge { needed, max: MAX_BLOCKS_PER_FILE }),
        }
    }

    fn entry_name(&self, ino: u64) -> Result<String, FsError> {
        self.entry(ino)
            .map(|entry| entry.name)
            .map_err(|_| FsError::NotFound(format!("inode {}", ino)))
    }

    /// Whole-file replace with `data` spliced in at `offset`, zero-filling any gap.
    fn splice(&mut self, ino: u64, offset: u64, data: &[u8]) -> Result<(), FsError> {
        let name = self.entry_name(ino)?;
        let end = usize::try_from(offset).ok().and_then(|offset| offset.checked_add(data.len()));
        let end = self.check_length(end)?;
        let start = end - data.len();

        let mut contents = self.fs.read(&name)?;
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[start..end].copy_from_slice(data);
        self.fs.write(&name, &contents)
    }

    fn truncate(&mut self, ino: u64, size: u64) -> Result<(), FsError> {
        let name = self.entry_name(ino)?;
        let size = self.check_length(usize::try_from(size).ok())?;
        let mut contents = self.fs.read(&name)?;
        contents.resize(size, 0);
        self.fs.write(&name, &contents)
    }
}

impl<D: DeviceDriver> Filesystem for FuseDriver<D> {
    /// Files are owned by whoever mounted the volume.
    fn init(&mut self, req: &Request, _config: &mut KernelConfig) -> Result<(), c_int> {
        self.uid = req.uid();
        self.gid = req.gid();
        Ok(())
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_name(parent, name) {
            Ok(entry) => reply.entry(&TTL, &self.file_attr(&entry), 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        if ino == ROOT_INODE {
            reply.attr(&TTL, &self.root_attr());
            return;
        }
        match self.entry(ino) {
            Ok(entry) => reply.attr(&TTL, &self.file_attr(&entry)),
            Err(errno) => reply.error(errno),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        if ino == ROOT_INODE {
            reply.attr(&TTL, &self.root_attr());
            return;
        }
        if let Some(size) = size {
            debug!("FUSE truncate inode {} to {} bytes", ino, size);
            if let Err(err) = self.truncate(ino, size) {
                reply.error(err.errno());
                return;
            }
        }
        match self.entry(ino) {
            Ok(entry) => reply.attr(&TTL, &self.file_attr(&entry)),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.entry(ino) {
            Ok(_) => reply.opened(0, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let contents = match self.entry(ino) {
            Ok(entry) => self.fs.read(&entry.name),
            Err(errno) => return reply.error(errno),
        };
        match contents {
            Ok(contents) => {
                let start = (offset as usize).min(contents.len());
                let end = (start + size as usize).min(contents.len());
                reply.data(&contents[start..end]);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        debug!("FUSE write inode {}: {} bytes at {}", ino, data.len(), offset);
        match self.splice(ino, offset as u64, data) {
            Ok(()) => reply.written(data.len() as u32),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if ino != ROOT_INODE {
            reply.error(libc::ENOTDIR);
            return;
        }

        let mut entries = vec![
            (ROOT_INODE, FileType::Directory, ".".to_string()),
            (ROOT_INODE, FileType::Directory, "..".to_string()),
        ];
        entries.extend(
            self.fs
                .list()
                .into_iter()
                .filter(|entry| !entry.deleted)
                .map(|entry| (slot_to_inode(entry.slot), FileType::RegularFile, entry.name)),
        );

        for (index, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            // a full buffer ends this batch
            if reply.add(ino, (index + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        if parent != ROOT_INODE {
            reply.error(libc::ENOENT);
            return;
        }
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.fs.create_file(name).and_then(|_| self.fs.stat(name)) {
            Ok(entry) => reply.created(&TTL, &self.file_attr(&entry), 0, 0, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        if parent != ROOT_INODE {
            reply.error(libc::ENOENT);
            return;
        }
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.fs.delete(name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }
}
