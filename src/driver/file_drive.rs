use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::driver::DeviceDriver;

/// A host file used as a raw block device.
#[derive(Debug)]
pub struct FileDrive {
    file: File,
    path: PathBuf,
    bytes: u64,
}

impl FileDrive {
    /// Creates (or truncates) the file at `path` and sizes it to `bytes` zeroes.
    pub fn create(path: impl AsRef<Path>, bytes: u64) -> io::Result<FileDrive> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(bytes)?;
        Ok(FileDrive { file, path: path.as_ref().to_path_buf(), bytes })
    }

    pub fn open(path: impl AsRef<Path>) -> io::Result<FileDrive> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let bytes = file.metadata()?.len();
        Ok(FileDrive { file, path: path.as_ref().to_path_buf(), bytes })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceDriver for FileDrive {
    fn get_size(&self) -> u64 {
        self.bytes
    }

    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> io::Result<()> {
        self.file.read_exact_at(buffer, offset)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)?;
        self.bytes = self.bytes.max(offset + data.len() as u64);
        Ok(())
    }

    fn set_size(&mut self, bytes: u64) -> io::Result<()> {
        self.file.set_len(bytes)?;
        self.bytes = bytes;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}
