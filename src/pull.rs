//! Pull engine: remote files and trees down to the local host

use anyhow::{Context, Result};
use std::io::ErrorKind;

use crate::fsio::LocalFs;
use crate::log::TransferStatus;
use crate::printer::plural;
use crate::protocol;
use crate::session::SyncSession;
use crate::walk::{basename, ensure_trailing_slash, join_path, remote_build_list};

/// Pull each remote source to `dst`. A missing destination is allowed for
/// a single source; otherwise it must be a directory. Per-source failures
/// are reported and the remaining sources still run.
pub fn do_sync_pull(
    sc: &mut SyncSession,
    fs: &dyn LocalFs,
    srcs: &[&str],
    dst: &str,
    copy_attrs: bool,
) -> bool {
    let dst_meta = match fs.stat(dst) {
        Ok(meta) => Some(meta),
        Err(ref e) if e.kind() == ErrorKind::NotFound && srcs.len() == 1 => None,
        Err(e) => {
            sc.error(&format!("cannot stat '{}': {}", dst, e));
            return false;
        }
    };
    let dst_isdir = dst_meta
        .map(|m| protocol::is_dir(m.mode))
        .unwrap_or(false);
    if !dst_isdir {
        if srcs.len() > 1 {
            sc.error(&format!("target '{}' is not a directory", dst));
            return false;
        }
        if dst.ends_with('/') {
            sc.error(&format!("failed to access '{}': Not a directory", dst));
            return false;
        }
    }

    let mut success = true;
    for src in srcs {
        let st = match sc.stat(src) {
            Ok(st) => st,
            Err(e) => {
                sc.error(&format!("{:#}", e));
                return false;
            }
        };
        if st.mode == 0 {
            sc.error(&format!("remote object '{}' does not exist", src));
            success = false;
            continue;
        }

        if protocol::is_reg(st.mode)
            || protocol::is_lnk(st.mode)
            || protocol::is_chr(st.mode)
            || protocol::is_blk(st.mode)
        {
            // Copying a remote file into a local directory really means
            // copying to local_dir/basename(remote).
            let dst_path = match fs.stat(dst) {
                Ok(m) if protocol::is_dir(m.mode) => join_path(dst, basename(src)),
                _ => dst.to_string(),
            };
            if let Err(e) = pull_file(sc, fs, src, &dst_path) {
                sc.error(&format!(
                    "failed to copy '{}' to '{}': {:#}",
                    src, dst_path, e
                ));
                sc.log_transfer(
                    "pull",
                    src,
                    &dst_path,
                    0,
                    TransferStatus::Failed,
                    Some(format!("{:#}", e)),
                );
                success = false;
                continue;
            }
            sc.log_transfer(
                "pull",
                src,
                &dst_path,
                u64::from(st.size),
                TransferStatus::Completed,
                None,
            );
            if copy_attrs {
                if let Err(e) = set_time_and_mode(fs, &dst_path, st.time, st.mode) {
                    sc.error(&format!("cannot set attributes of '{}': {:#}", dst_path, e));
                    success = false;
                }
            }
        } else if protocol::is_dir(st.mode) {
            success &= copy_remote_dir_local(sc, fs, src, dst, copy_attrs);
        } else {
            sc.error(&format!("remote object '{}' not a file or directory", src));
            success = false;
        }
    }
    success
}

/// Pull one remote tree under one local directory. The first failing item
/// aborts the tree; everything already pulled stays.
pub fn copy_remote_dir_local(
    sc: &mut SyncSession,
    fs: &dyn LocalFs,
    rpath: &str,
    lpath: &str,
    copy_attrs: bool,
) -> bool {
    if rpath.is_empty() || lpath.is_empty() {
        return false;
    }
    let rpath = ensure_trailing_slash(rpath);
    let lpath = ensure_trailing_slash(lpath);

    sc.print("pull: building file list...");
    let mut items = Vec::new();
    if let Err(e) = remote_build_list(sc, &mut items, &rpath, &lpath) {
        sc.error(&format!("{:#}", e));
        return false;
    }

    let mut pulled: u32 = 0;
    let skipped: u32 = 0;
    for item in &items {
        sc.print(&format!("pull: {} -> {}", item.src, item.dst));
        if let Err(e) = pull_file(sc, fs, &item.src, &item.dst) {
            sc.error(&format!(
                "failed to copy '{}' to '{}': {:#}",
                item.src, item.dst, e
            ));
            sc.log_transfer(
                "pull",
                &item.src,
                &item.dst,
                0,
                TransferStatus::Failed,
                Some(format!("{:#}", e)),
            );
            return false;
        }
        if copy_attrs {
            if let Err(e) = set_time_and_mode(fs, &item.dst, item.mtime, item.mode) {
                sc.error(&format!("cannot set attributes of '{}': {:#}", item.dst, e));
                return false;
            }
        }
        sc.log_transfer(
            "pull",
            &item.src,
            &item.dst,
            item.size,
            TransferStatus::Completed,
            None,
        );
        pulled += 1;
    }

    sc.print_full(&format!(
        "{}: {} file{} pulled. {} file{} skipped.{}",
        rpath,
        pulled,
        plural(pulled),
        skipped,
        plural(skipped),
        sc.transfer_rate()
    ));
    true
}

/// Receive one remote file into a fresh local destination. On any failure
/// the half-written destination is unlinked; a partial pull must leave no
/// file behind.
pub(crate) fn pull_file(
    sc: &mut SyncSession,
    fs: &dyn LocalFs,
    rpath: &str,
    lpath: &str,
) -> Result<()> {
    sc.print(rpath);
    let st = sc.stat(rpath)?;

    if let Some(idx) = lpath.rfind('/') {
        if idx > 0 {
            fs.mkdir_p(&lpath[..idx])
                .with_context(|| format!("cannot create parent of '{}'", lpath))?;
        }
    }
    let _ = fs.unlink(lpath);
    let mut out = fs
        .create_trunc(lpath, 0o644)
        .with_context(|| format!("cannot create '{}'", lpath))?;

    let req = sc.recv(rpath, out.as_mut(), u64::from(st.size));
    drop(out);
    if let Err(e) = req {
        let _ = fs.unlink(lpath);
        return Err(e);
    }
    Ok(())
}

/// Restore mtime and permissions, masking the mode with the process umask.
fn set_time_and_mode(fs: &dyn LocalFs, lpath: &str, time: u32, mode: u32) -> Result<()> {
    fs.set_mtime(lpath, time)
        .with_context(|| format!("cannot set mtime of '{}'", lpath))?;
    let mask = fs.umask();
    fs.chmod(lpath, mode & !mask)
        .with_context(|| format!("cannot chmod '{}'", lpath))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsio::HostFs;
    use crate::printer::ProgressSink;
    use crate::protocol::msg;
    use crate::session::SyncSession;
    use std::io::{self, Cursor, Read, Write};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct MockStream {
        input: Cursor<Vec<u8>>,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct CaptureSink {
        full: Arc<Mutex<Vec<String>>>,
    }

    impl ProgressSink for CaptureSink {
        fn print_elide(&self, _line: &str) {}

        fn print_full(&self, line: &str) {
            self.full.lock().unwrap().push(line.to_string());
        }
    }

    fn session_with_capture(replies: Vec<u8>) -> (SyncSession, Arc<Mutex<Vec<String>>>) {
        let full = Arc::new(Mutex::new(Vec::new()));
        let stream = MockStream {
            input: Cursor::new(replies),
            writes: Arc::new(Mutex::new(Vec::new())),
        };
        let sink = CaptureSink {
            full: Arc::clone(&full),
        };
        (SyncSession::new(Box::new(stream), Box::new(sink)), full)
    }

    fn put_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn stat_reply(buf: &mut Vec<u8>, mode: u32, size: u32, time: u32) {
        put_u32(buf, msg::STAT);
        put_u32(buf, mode);
        put_u32(buf, size);
        put_u32(buf, time);
    }

    #[test]
    fn test_partial_pull_unlinks_destination() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("f");
        let dst_s = dst.to_str().unwrap();

        // stat reply, one DATA chunk, then the connection drops
        let mut replies = Vec::new();
        stat_reply(&mut replies, 0o100644, 500, 1);
        put_u32(&mut replies, msg::DATA);
        put_u32(&mut replies, 100);
        replies.extend_from_slice(&[9u8; 100]);
        let (mut sc, _) = session_with_capture(replies);
        let fs = HostFs;

        assert!(pull_file(&mut sc, &fs, "/r/f", dst_s).is_err());
        assert!(!dst.exists());
    }

    #[test]
    fn test_pull_fail_mid_stream_unlinks_and_reports() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_str().unwrap().to_string();

        // do_sync_pull: remote stat, then pull_file's own stat, one DATA,
        // then the server aborts with FAIL
        let mut replies = Vec::new();
        stat_reply(&mut replies, 0o100644, 500, 1);
        stat_reply(&mut replies, 0o100644, 500, 1);
        put_u32(&mut replies, msg::DATA);
        put_u32(&mut replies, 100);
        replies.extend_from_slice(&[9u8; 100]);
        put_u32(&mut replies, msg::FAIL);
        put_u32(&mut replies, 9);
        replies.extend_from_slice(b"disk full");
        let (mut sc, full) = session_with_capture(replies);
        let fs = HostFs;

        assert!(!do_sync_pull(&mut sc, &fs, &["/r/f"], &dir, false));
        assert!(!tmp.path().join("f").exists());
        let full = full.lock().unwrap();
        let expected = format!(
            "ferry: error: failed to copy '/r/f' to '{}/f': disk full",
            dir
        );
        assert_eq!(full[0], expected);
    }

    #[test]
    fn test_pull_missing_remote_continues_with_next_source() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_str().unwrap().to_string();

        // first source does not exist; second is a 3-byte file
        let mut replies = Vec::new();
        stat_reply(&mut replies, 0, 0, 0);
        stat_reply(&mut replies, 0o100644, 3, 1);
        stat_reply(&mut replies, 0o100644, 3, 1);
        put_u32(&mut replies, msg::DATA);
        put_u32(&mut replies, 3);
        replies.extend_from_slice(b"abc");
        put_u32(&mut replies, msg::DONE);
        put_u32(&mut replies, 0);
        let (mut sc, full) = session_with_capture(replies);
        let fs = HostFs;

        assert!(!do_sync_pull(&mut sc, &fs, &["/r/gone", "/r/b"], &dir, false));
        assert_eq!(std::fs::read(tmp.path().join("b")).unwrap(), b"abc");
        let full = full.lock().unwrap();
        assert_eq!(
            full[0],
            "ferry: error: remote object '/r/gone' does not exist"
        );
    }

    #[test]
    fn test_pull_single_source_to_new_path() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("fresh");
        let dst_s = dst.to_str().unwrap().to_string();

        let mut replies = Vec::new();
        stat_reply(&mut replies, 0o100644, 2, 1);
        stat_reply(&mut replies, 0o100644, 2, 1);
        put_u32(&mut replies, msg::DATA);
        put_u32(&mut replies, 2);
        replies.extend_from_slice(b"ok");
        put_u32(&mut replies, msg::DONE);
        put_u32(&mut replies, 0);
        let (mut sc, _) = session_with_capture(replies);
        let fs = HostFs;

        assert!(do_sync_pull(&mut sc, &fs, &["/r/x"], &dst_s, false));
        assert_eq!(std::fs::read(&dst).unwrap(), b"ok");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_attrs_restores_mtime_and_mode() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_str().unwrap().to_string();

        let mut replies = Vec::new();
        stat_reply(&mut replies, 0o100755, 5, 1_000_000); // do_sync_pull stat
        stat_reply(&mut replies, 0o100755, 5, 1_000_000); // pull_file stat
        put_u32(&mut replies, msg::DATA);
        put_u32(&mut replies, 5);
        replies.extend_from_slice(b"hello");
        put_u32(&mut replies, msg::DONE);
        put_u32(&mut replies, 0);
        let (mut sc, _) = session_with_capture(replies);
        let fs = HostFs;

        assert!(do_sync_pull(&mut sc, &fs, &["/r/tool"], &dir, true));
        let md = std::fs::metadata(tmp.path().join("tool")).unwrap();
        use std::os::unix::fs::MetadataExt;
        assert_eq!(md.mtime(), 1_000_000);
        let mask = fs.umask();
        assert_eq!(md.mode() & 0o777, 0o755 & !mask);
    }
}
