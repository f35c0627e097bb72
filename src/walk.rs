//! Directory enumeration into transfer lists (local and remote)

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::codec::DentEntry;
use crate::fsio::{file_meta, FileMeta};
use crate::printer::{error_line, ProgressSink};
use crate::protocol::{self, MAX_PATH};
use crate::session::SyncSession;

/// One file to move, materialized before the transfer begins. `skip` is
/// set by the push engine's timestamp check and nowhere else.
#[derive(Debug, Clone)]
pub struct CopyItem {
    pub src: String,
    pub dst: String,
    pub mtime: u32,
    pub mode: u32,
    pub size: u64,
    pub skip: bool,
}

/// What a local path turned out to be, decided once at the stat site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    Regular { size: u64 },
    Symlink,
    Dir,
    Other,
}

pub fn classify(meta: &FileMeta) -> LocalKind {
    if protocol::is_lnk(meta.mode) {
        LocalKind::Symlink
    } else if protocol::is_reg(meta.mode) {
        LocalKind::Regular { size: meta.size }
    } else if protocol::is_dir(meta.mode) {
        LocalKind::Dir
    } else {
        LocalKind::Other
    }
}

/// Join with exactly one separating slash.
pub fn join_path(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

pub fn ensure_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Final component, ignoring a trailing slash.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

/// Walk a local tree rooted at `lpath` (trailing slash required) into
/// CopyItems destined for `rpath`. Regular files and symlinks are listed
/// with lstat metadata; directories recurse; anything else is skipped with
/// a warning, as are paths past the protocol limit.
pub fn local_build_list(
    sink: &dyn ProgressSink,
    out: &mut Vec<CopyItem>,
    lpath: &str,
    rpath: &str,
) -> Result<()> {
    std::fs::read_dir(lpath).with_context(|| format!("cannot open '{}'", lpath))?;

    for entry in WalkDir::new(lpath)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                error_line(sink, &format!("cannot walk '{}': {}", lpath, e));
                continue;
            }
        };
        let meta = match entry.metadata() {
            Ok(md) => file_meta(&md),
            Err(e) => {
                error_line(
                    sink,
                    &format!("cannot lstat '{}': {}", entry.path().display(), e),
                );
                continue;
            }
        };
        if protocol::is_dir(meta.mode) {
            continue; // the walker recurses on its own
        }

        let rel = match entry.path().strip_prefix(lpath) {
            Ok(r) => r.to_string_lossy().into_owned(),
            Err(_) => continue,
        };
        let src = format!("{}{}", lpath, rel);
        let dst = format!("{}{}", rpath, rel);
        if src.len() > MAX_PATH || dst.len() > MAX_PATH {
            error_line(sink, &format!("skipping long path '{}'", src));
            continue;
        }

        if protocol::is_reg(meta.mode) || protocol::is_lnk(meta.mode) {
            out.push(CopyItem {
                src,
                dst,
                mtime: meta.mtime,
                mode: meta.mode,
                size: meta.size,
                skip: false,
            });
        } else {
            error_line(sink, &format!("skipping special file '{}'", src));
        }
    }
    Ok(())
}

/// Walk a remote tree via LIST, breadth driven by an explicit stack of
/// `(remote dir, local dir)` frames. Entry classification comes from the
/// wire mode bits.
pub fn remote_build_list(
    sc: &mut SyncSession,
    out: &mut Vec<CopyItem>,
    rpath: &str,
    lpath: &str,
) -> Result<()> {
    let mut dirs = vec![(rpath.to_string(), lpath.to_string())];
    while let Some((rdir, ldir)) = dirs.pop() {
        let mut subdirs: Vec<(String, String)> = Vec::new();
        let mut specials: Vec<String> = Vec::new();
        sc.list(&rdir, |ent: DentEntry| {
            if ent.name == "." || ent.name == ".." {
                return;
            }
            if protocol::is_dir(ent.mode) {
                subdirs.push((
                    format!("{}{}/", rdir, ent.name),
                    format!("{}{}/", ldir, ent.name),
                ));
            } else if protocol::is_reg(ent.mode) || protocol::is_lnk(ent.mode) {
                out.push(CopyItem {
                    src: format!("{}{}", rdir, ent.name),
                    dst: format!("{}{}", ldir, ent.name),
                    mtime: ent.time,
                    mode: ent.mode,
                    size: u64::from(ent.size),
                    skip: false,
                });
            } else {
                specials.push(ent.name);
            }
        })?;
        for name in specials {
            sc.print_full(&format!("skipping special file '{}'", name));
        }
        dirs.append(&mut subdirs);
    }
    Ok(())
}
