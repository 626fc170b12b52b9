//! A single-volume flat-file filesystem. One image file holds a header, a
//! block bitmap, a fixed file table and the data blocks; a side journal of
//! post-state records makes every mutation replayable after a crash.

pub mod config;
pub mod consts;
pub mod driver;
#[cfg(feature = "fuse")]
pub mod fuse;
pub mod io;
pub mod journal;
pub mod ops;
pub mod shell;
pub mod structure;
pub mod util;

pub use config::{Geometry, VolumeConfig};
pub use driver::file_drive::FileDrive;
pub use ops::FlatFS;
pub use util::error::{FsError, Result};
