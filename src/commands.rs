//! User-level operations exposed to the CLI

use crate::codec::DentEntry;
use crate::fsio::LocalFs;
use crate::pull;
use crate::push;
use crate::session::SyncSession;

pub(crate) fn ls_line(ent: &DentEntry) -> String {
    format!(
        "{:08x} {:08x} {:08x} {}",
        ent.mode, ent.size, ent.time, ent.name
    )
}

/// List a remote directory to stdout, one `mode size time name` line per
/// entry, all fields in hex.
pub fn do_sync_ls(sc: &mut SyncSession, path: &str) -> bool {
    let res = sc.list(path, |ent| println!("{}", ls_line(&ent)));
    match res {
        Ok(()) => true,
        Err(e) => {
            sc.error(&format!("{:#}", e));
            false
        }
    }
}

pub fn do_sync_push(sc: &mut SyncSession, fs: &dyn LocalFs, srcs: &[&str], dst: &str) -> bool {
    push::do_sync_push(sc, fs, srcs, dst)
}

pub fn do_sync_pull(
    sc: &mut SyncSession,
    fs: &dyn LocalFs,
    srcs: &[&str],
    dst: &str,
    copy_attrs: bool,
) -> bool {
    pull::do_sync_pull(sc, fs, srcs, dst, copy_attrs)
}

/// Push with the timestamp skip check: only files whose size or mtime
/// differ from the remote copy are transferred. `list_only` prints the
/// candidates instead of moving them.
pub fn do_sync_sync(
    sc: &mut SyncSession,
    fs: &dyn LocalFs,
    lpath: &str,
    rpath: &str,
    list_only: bool,
) -> bool {
    push::copy_local_dir_remote(sc, fs, lpath, rpath, true, list_only)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ls_line_format() {
        let ent = DentEntry {
            mode: 0o040755,
            size: 0,
            time: 100,
            name: "a".to_string(),
        };
        assert_eq!(ls_line(&ent), "000041ed 00000000 00000064 a");
    }
}
