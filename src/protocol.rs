//! Shared wire constants for the ferry sync protocol

const fn tag(id: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*id)
}

// Message identifiers: four-character codes read as little-endian u32
// (keep numeric values stable for compat with existing sync services)
pub mod msg {
    use super::tag;

    pub const LIST: u32 = tag(b"LIST");
    pub const RECV: u32 = tag(b"RECV");
    pub const SEND: u32 = tag(b"SEND");
    pub const STAT: u32 = tag(b"STAT");
    pub const DENT: u32 = tag(b"DENT");
    pub const DATA: u32 = tag(b"DATA");
    pub const DONE: u32 = tag(b"DONE");
    pub const OKAY: u32 = tag(b"OKAY");
    pub const FAIL: u32 = tag(b"FAIL");
    pub const QUIT: u32 = tag(b"QUIT");
}

/// Longest path (or `path,mode` string) a request may carry.
pub const MAX_PATH: usize = 1024;

/// Longest name a directory-entry reply may carry.
pub const MAX_NAME: usize = 256;

/// Default DATA payload ceiling. May be lowered at runtime, never raised
/// past this without negotiation.
pub const MAX_CHUNK: usize = 64 * 1024;

// File-kind bits as they appear in wire mode fields (standard Unix layout,
// independent of the local platform's libc values).
pub const S_IFMT: u32 = 0o170000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;

pub fn is_dir(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

pub fn is_reg(mode: u32) -> bool {
    mode & S_IFMT == S_IFREG
}

pub fn is_lnk(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

pub fn is_chr(mode: u32) -> bool {
    mode & S_IFMT == S_IFCHR
}

pub fn is_blk(mode: u32) -> bool {
    mode & S_IFMT == S_IFBLK
}
