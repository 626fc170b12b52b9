use std::path::Path;

use fuser::MountOption;
use log::info;

use crate::driver::DeviceDriver;
use crate::ops::FlatFS;
use crate::util::error::Result;

pub mod filesystem;

pub use filesystem::FuseDriver;

/// Serves `fs` at `mountpoint` until it is unmounted.
pub fn mount<D: DeviceDriver>(fs: FlatFS<D>, mountpoint: &Path) -> Result<()> {
    let options = [MountOption::FSName("flatfs".to_string()), MountOption::DefaultPermissions];
    info!("Mounting at {}", mountpoint.display());
    fuser::mount2(FuseDriver::new(fs), mountpoint, &options)?;
    info!("Unmounted {}", mountpoint.display());
    Ok(())
}
