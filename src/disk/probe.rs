use std::io;
use std::path::Path;

/// Reports the bytes available to unprivileged writers under a directory.
pub trait SpaceProbe: Send + Sync {
    fn available_bytes(&self, dir: &Path) -> io::Result<u64>;
}

/// Queries the filesystem holding `dir` with `statvfs(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsProbe;

#[cfg(unix)]
impl SpaceProbe for StatvfsProbe {
    fn available_bytes(&self, dir: &Path) -> io::Result<u64> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(dir.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains nul byte"))?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
    }
}

#[cfg(not(unix))]
impl SpaceProbe for StatvfsProbe {
    fn available_bytes(&self, _dir: &Path) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "free space query not supported on this platform",
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_statvfs_reports_space_for_existing_dir() {
        let dir = TempDir::new().unwrap();
        let bytes = StatvfsProbe.available_bytes(dir.path()).unwrap();
        assert!(bytes > 0);
    }

    #[test]
    fn test_statvfs_fails_for_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(StatvfsProbe.available_bytes(&missing).is_err());
    }
}
