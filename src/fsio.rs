//! Local filesystem capability used by the transfer engines
//!
//! Everything the engines touch on the local host goes through `LocalFs`,
//! so the byte-level side effects (create, unlink, utime) stay in one
//! place. `HostFs` is the real implementation.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Read, Write};

#[derive(Debug, Clone, Copy)]
pub struct FileMeta {
    pub mode: u32,
    pub size: u64,
    pub mtime: u32,
}

pub trait LocalFs {
    /// stat following symlinks.
    fn stat(&self, path: &str) -> io::Result<FileMeta>;
    /// stat without following symlinks.
    fn lstat(&self, path: &str) -> io::Result<FileMeta>;
    /// Symlink target as raw bytes.
    fn read_link(&self, path: &str) -> io::Result<Vec<u8>>;
    /// Whole file contents; used for the small-file burst form.
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
    fn open_read(&self, path: &str) -> io::Result<Box<dyn Read>>;
    /// Create-or-truncate with the given permission bits. Dropping the
    /// handle closes the file.
    fn create_trunc(&self, path: &str, mode: u32) -> io::Result<Box<dyn Write>>;
    fn mkdir_p(&self, path: &str) -> io::Result<()>;
    fn unlink(&self, path: &str) -> io::Result<()>;
    fn set_mtime(&self, path: &str, mtime: u32) -> io::Result<()>;
    fn chmod(&self, path: &str, mode: u32) -> io::Result<()>;
    /// Current process umask.
    fn umask(&self) -> u32;
    /// False on platforms where symlink targets cannot be read; pushing a
    /// symlink there fails as an unsupported local mode.
    fn symlinks_supported(&self) -> bool;
}

#[cfg(unix)]
pub(crate) fn file_meta(md: &Metadata) -> FileMeta {
    use std::os::unix::fs::MetadataExt;
    FileMeta {
        mode: md.mode(),
        size: md.len(),
        mtime: md.mtime().clamp(0, u32::MAX as i64) as u32,
    }
}

#[cfg(not(unix))]
pub(crate) fn file_meta(md: &Metadata) -> FileMeta {
    use crate::protocol;
    use std::time::UNIX_EPOCH;
    let mode = if md.is_dir() {
        protocol::S_IFDIR | 0o755
    } else if md.file_type().is_symlink() {
        protocol::S_IFLNK | 0o777
    } else {
        protocol::S_IFREG | 0o644
    };
    let mtime = md
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0);
    FileMeta {
        mode,
        size: md.len(),
        mtime,
    }
}

pub struct HostFs;

impl LocalFs for HostFs {
    fn stat(&self, path: &str) -> io::Result<FileMeta> {
        Ok(file_meta(&fs::metadata(path)?))
    }

    fn lstat(&self, path: &str) -> io::Result<FileMeta> {
        Ok(file_meta(&fs::symlink_metadata(path)?))
    }

    #[cfg(unix)]
    fn read_link(&self, path: &str) -> io::Result<Vec<u8>> {
        use std::os::unix::ffi::OsStrExt;
        Ok(fs::read_link(path)?.as_os_str().as_bytes().to_vec())
    }

    #[cfg(not(unix))]
    fn read_link(&self, path: &str) -> io::Result<Vec<u8>> {
        Ok(fs::read_link(path)?.to_string_lossy().into_owned().into_bytes())
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn open_read(&self, path: &str) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(File::open(path)?))
    }

    #[cfg(unix)]
    fn create_trunc(&self, path: &str, mode: u32) -> io::Result<Box<dyn Write>> {
        use std::os::unix::fs::OpenOptionsExt;
        let f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(path)?;
        Ok(Box::new(f))
    }

    #[cfg(not(unix))]
    fn create_trunc(&self, path: &str, _mode: u32) -> io::Result<Box<dyn Write>> {
        let f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(f))
    }

    fn mkdir_p(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn unlink(&self, path: &str) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn set_mtime(&self, path: &str, mtime: u32) -> io::Result<()> {
        let t = filetime::FileTime::from_unix_time(i64::from(mtime), 0);
        filetime::set_file_times(path, t, t)
    }

    #[cfg(unix)]
    fn chmod(&self, path: &str, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }

    #[cfg(not(unix))]
    fn chmod(&self, _path: &str, _mode: u32) -> io::Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn umask(&self) -> u32 {
        // Read-and-restore; there is no query-only umask call.
        unsafe {
            let mask = libc::umask(0);
            libc::umask(mask);
            mask as u32
        }
    }

    #[cfg(not(unix))]
    fn umask(&self) -> u32 {
        0
    }

    #[cfg(unix)]
    fn symlinks_supported(&self) -> bool {
        true
    }

    #[cfg(not(unix))]
    fn symlinks_supported(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;
    use tempfile::TempDir;

    #[test]
    fn test_stat_and_lstat_classify() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("f");
        std::fs::write(&file, b"12345").unwrap();
        let fs = HostFs;

        let st = fs.stat(file.to_str().unwrap()).unwrap();
        assert!(protocol::is_reg(st.mode));
        assert_eq!(st.size, 5);

        let dir = fs.stat(tmp.path().to_str().unwrap()).unwrap();
        assert!(protocol::is_dir(dir.mode));
    }

    #[cfg(unix)]
    #[test]
    fn test_lstat_sees_symlink_stat_follows() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("f");
        std::fs::write(&file, b"data").unwrap();
        let link = tmp.path().join("l");
        std::os::unix::fs::symlink(&file, &link).unwrap();
        let fs = HostFs;

        let via_lstat = fs.lstat(link.to_str().unwrap()).unwrap();
        assert!(protocol::is_lnk(via_lstat.mode));
        let via_stat = fs.stat(link.to_str().unwrap()).unwrap();
        assert!(protocol::is_reg(via_stat.mode));

        let target = fs.read_link(link.to_str().unwrap()).unwrap();
        assert_eq!(target, file.to_str().unwrap().as_bytes());
    }

    #[test]
    fn test_create_trunc_and_unlink() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out");
        let spath = path.to_str().unwrap();
        let fs = HostFs;

        let mut w = fs.create_trunc(spath, 0o644).unwrap();
        w.write_all(b"abc").unwrap();
        drop(w);
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");

        fs.unlink(spath).unwrap();
        assert!(!path.exists());
    }
}
