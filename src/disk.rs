//! Free-space queries for the daemon's storage preflight
//!
//! The preflight is advisory: another transfer can consume the space between
//! the check and the write.

use std::io;
use std::path::Path;

pub trait SpaceProbe: Send + Sync {
    /// Bytes available to an unprivileged writer on the filesystem holding `dir`
    fn available(&self, dir: &Path) -> io::Result<u64>;
}

/// Queries the filesystem itself (`statvfs` on Unix, the disk list elsewhere)
pub struct FsSpace;

#[cfg(unix)]
impl SpaceProbe for FsSpace {
    fn available(&self, dir: &Path) -> io::Result<u64> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(dir.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))?;
        let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
        let r = unsafe { libc::statvfs(c_path.as_ptr(), &mut st) };
        if r != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((st.f_bavail as u64).saturating_mul(st.f_frsize as u64))
    }
}

#[cfg(not(unix))]
impl SpaceProbe for FsSpace {
    fn available(&self, dir: &Path) -> io::Result<u64> {
        DiskListSpace.available(dir)
    }
}

/// Looks up the mounted disk with the longest mount point containing `dir`
pub struct DiskListSpace;

impl SpaceProbe for DiskListSpace {
    fn available(&self, dir: &Path) -> io::Result<u64> {
        use sysinfo::Disks;
        let dir = dir.canonicalize()?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|d| dir.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| d.available_space())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no mounted disk holds {}", dir.display()),
                )
            })
    }
}

/// Reports a fixed amount regardless of the directory (`--free-space`, tests)
pub struct FixedSpace(pub u64);

impl SpaceProbe for FixedSpace {
    fn available(&self, _dir: &Path) -> io::Result<u64> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fixed_space() {
        let probe = FixedSpace(10 * 1024 * 1024 + 1);
        assert_eq!(probe.available(Path::new("/nonexistent")).unwrap(), 10_485_761);
    }

    #[cfg(unix)]
    #[test]
    fn test_fs_space_reports_something() {
        let temp_dir = TempDir::new().unwrap();
        let avail = FsSpace.available(temp_dir.path()).unwrap();
        assert!(avail > 0);
    }

    #[test]
    fn test_fs_space_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(FsSpace.available(&temp_dir.path().join("gone")).is_err());
    }

    #[test]
    fn test_disk_list_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(DiskListSpace.available(&temp_dir.path().join("gone")).is_err());
    }
}
