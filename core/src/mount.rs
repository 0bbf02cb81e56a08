use crate::{ByteValue, PartsmithError};
use std::path::Path;

/// Total and free bytes of the filesystem mounted at `mountpoint`, as the
/// kernel reports them.
#[cfg(unix)]
pub fn mounted_filesystem_usage(mountpoint: &Path) -> Result<(ByteValue, ByteValue), PartsmithError> {
    use nix::sys::statvfs::statvfs;

    let stat = statvfs(mountpoint).map_err(|errno| PartsmithError::MountUsage {
        path: mountpoint.display().to_string(),
        reason: errno.desc().to_string(),
    })?;
    let fragment = stat.fragment_size() as ByteValue;
    let total = stat.blocks() as ByteValue * fragment;
    let free = stat.blocks_free() as ByteValue * fragment;
    Ok((total, free))
}

#[cfg(not(unix))]
pub fn mounted_filesystem_usage(mountpoint: &Path) -> Result<(ByteValue, ByteValue), PartsmithError> {
    Err(PartsmithError::MountUsage {
        path: mountpoint.display().to_string(),
        reason: "statvfs is not available on this platform".to_string(),
    })
}
