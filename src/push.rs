//! Push engine: local files and trees out to the remote service

use crate::fsio::LocalFs;
use crate::log::TransferStatus;
use crate::printer::plural;
use crate::protocol;
use crate::session::SyncSession;
use crate::walk::{
    basename, classify, ensure_trailing_slash, join_path, local_build_list, LocalKind,
};

/// Push each source to `dst`. Directory sources are walked; file sources
/// land under the destination directory (or at `dst` verbatim when it is
/// not a directory). Per-source failures are reported and the remaining
/// sources still run; the return value is the AND over all of them.
pub fn do_sync_push(sc: &mut SyncSession, fs: &dyn LocalFs, srcs: &[&str], dst: &str) -> bool {
    let dst_stat = match sc.stat(dst) {
        Ok(st) => st,
        Err(e) => {
            sc.error(&format!("cannot stat remote '{}': {:#}", dst, e));
            return false;
        }
    };
    let dst_isdir = dst_stat.mode != 0 && protocol::is_dir(dst_stat.mode);
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
        let st = match fs.stat(src) {
            Ok(st) => st,
            Err(e) => {
                sc.error(&format!("cannot stat '{}': {}", src, e));
                success = false;
                continue;
            }
        };

        if protocol::is_dir(st.mode) {
            success &= copy_local_dir_remote(sc, fs, src, dst, false, false);
            continue;
        }

        // Copying a local file into a remote directory really means
        // copying to remote_dir/basename(local).
        let dst_path = if dst_isdir {
            join_path(dst, basename(src))
        } else {
            dst.to_string()
        };
        let ok = push_file(sc, fs, src, &dst_path, st.mtime, st.mode, st.size);
        sc.log_transfer(
            "push",
            src,
            &dst_path,
            st.size,
            if ok {
                TransferStatus::Completed
            } else {
                TransferStatus::Failed
            },
            None,
        );
        success &= ok;
    }
    success
}

/// Push one local tree under one remote directory. With `check_timestamps`
/// the remote side is consulted first and up-to-date files are skipped;
/// with `list_only` nothing is transferred and each candidate is printed.
pub fn copy_local_dir_remote(
    sc: &mut SyncSession,
    fs: &dyn LocalFs,
    lpath: &str,
    rpath: &str,
    check_timestamps: bool,
    list_only: bool,
) -> bool {
    if lpath.is_empty() || rpath.is_empty() {
        return false;
    }
    let lpath = ensure_trailing_slash(lpath);
    let rpath = ensure_trailing_slash(rpath);

    let mut items = Vec::new();
    if let Err(e) = local_build_list(sc.printer(), &mut items, &lpath, &rpath) {
        sc.error(&format!("{:#}", e));
        return false;
    }

    if check_timestamps {
        // Pipelined: all STAT requests go out back to back, then all
        // replies are consumed in the same order. One round trip per file
        // would ruin throughput on high-latency links.
        for item in &items {
            if let Err(e) = sc.send_stat(&item.dst) {
                sc.error(&format!("{:#}", e));
                return false;
            }
        }
        for item in &mut items {
            let remote = match sc.recv_stat() {
                Ok(st) => st,
                Err(e) => {
                    sc.error(&format!("{:#}", e));
                    return false;
                }
            };
            if u64::from(remote.size) == item.size {
                // Link mtimes cannot be restored remotely, so links only
                // need the remote copy to be at least as new.
                let up_to_date = (protocol::is_reg(item.mode) && remote.time == item.mtime)
                    || (protocol::is_lnk(item.mode) && remote.time >= item.mtime);
                if up_to_date {
                    item.skip = true;
                }
            }
        }
    }

    let mut pushed: u32 = 0;
    let mut skipped: u32 = 0;
    for item in &items {
        if item.skip {
            skipped += 1;
            sc.log_transfer(
                "push",
                &item.src,
                &item.dst,
                item.size,
                TransferStatus::Skipped,
                None,
            );
            continue;
        }
        if list_only {
            sc.print_full(&format!("would push: {} -> {}", item.src, item.dst));
            pushed += 1;
            continue;
        }
        let ok = push_file(sc, fs, &item.src, &item.dst, item.mtime, item.mode, item.size);
        sc.log_transfer(
            "push",
            &item.src,
            &item.dst,
            item.size,
            if ok {
                TransferStatus::Completed
            } else {
                TransferStatus::Failed
            },
            None,
        );
        if !ok {
            return false;
        }
        pushed += 1;
    }

    sc.print_full(&format!(
        "{}: {} file{} pushed. {} file{} skipped.{}",
        rpath,
        pushed,
        plural(pushed),
        skipped,
        plural(skipped),
        sc.transfer_rate()
    ));
    true
}

/// One SEND transaction: burst for symlinks and small regular files,
/// chunked streaming for everything at or above the chunk ceiling,
/// finished by the server's single OKAY/FAIL.
pub(crate) fn push_file(
    sc: &mut SyncSession,
    fs: &dyn LocalFs,
    lpath: &str,
    rpath: &str,
    mtime: u32,
    mode: u32,
    size: u64,
) -> bool {
    let path_and_mode = format!("{},{}", rpath, mode);
    let meta = crate::fsio::FileMeta { mode, size, mtime };

    match classify(&meta) {
        LocalKind::Symlink => {
            if !fs.symlinks_supported() {
                sc.error(&format!(
                    "local file '{}' has unsupported mode: 0o{:o}",
                    lpath, mode
                ));
                return false;
            }
            let mut target = match fs.read_link(lpath) {
                Ok(t) => t,
                Err(e) => {
                    sc.error(&format!("readlink '{}' failed: {}", lpath, e));
                    return false;
                }
            };
            target.push(0);
            if let Err(e) = sc.send_small(&path_and_mode, rpath, &target, mtime) {
                sc.error(&format!("failed to copy '{}' to '{}': {:#}", lpath, rpath, e));
                return false;
            }
            sc.read_copy_ack(lpath, rpath)
        }
        LocalKind::Regular { size } => {
            if size < sc.max_chunk() as u64 {
                let data = match fs.read(lpath) {
                    Ok(d) => d,
                    Err(e) => {
                        sc.error(&format!("failed to read all of '{}': {}", lpath, e));
                        return false;
                    }
                };
                if let Err(e) = sc.send_small(&path_and_mode, rpath, &data, mtime) {
                    sc.error(&format!("failed to copy '{}' to '{}': {:#}", lpath, rpath, e));
                    return false;
                }
            } else {
                let mut reader = match fs.open_read(lpath) {
                    Ok(r) => r,
                    Err(e) => {
                        sc.error(&format!("cannot open '{}': {}", lpath, e));
                        return false;
                    }
                };
                if let Err(e) = sc.send_large(&path_and_mode, rpath, reader.as_mut(), size, mtime)
                {
                    sc.error(&format!("failed to copy '{}' to '{}': {:#}", lpath, rpath, e));
                    return false;
                }
            }
            sc.read_copy_ack(lpath, rpath)
        }
        LocalKind::Dir | LocalKind::Other => {
            sc.error(&format!(
                "local file '{}' has unsupported mode: 0o{:o}",
                lpath, mode
            ));
            false
        }
    }
}
