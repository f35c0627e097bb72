//! Encoding and decoding of the sync protocol message kinds

use anyhow::{bail, Result};

use crate::framing::FramedStream;
use crate::protocol::{msg, MAX_CHUNK, MAX_NAME, MAX_PATH};

pub const HEADER_LEN: usize = 8;

fn header(id: u32, length: u32) -> [u8; HEADER_LEN] {
    let mut h = [0u8; HEADER_LEN];
    h[0..4].copy_from_slice(&id.to_le_bytes());
    h[4..8].copy_from_slice(&length.to_le_bytes());
    h
}

/// Request frame: header plus path (or `path,mode`) payload. Rejects an
/// oversized path before a single byte is produced.
pub fn request_frame(id: u32, path: &[u8]) -> Result<Vec<u8>> {
    if path.len() > MAX_PATH {
        bail!("path too long: {} bytes (max {})", path.len(), MAX_PATH);
    }
    let mut buf = Vec::with_capacity(HEADER_LEN + path.len());
    buf.extend_from_slice(&header(id, path.len() as u32));
    buf.extend_from_slice(path);
    Ok(buf)
}

/// Whole small-file transaction packed into one buffer:
/// `SEND hdr | path,mode | DATA hdr | bytes | DONE hdr (mtime)`.
pub fn small_file_frame(path_and_mode: &[u8], data: &[u8], mtime: u32) -> Result<Vec<u8>> {
    if path_and_mode.len() > MAX_PATH {
        bail!(
            "path too long: {} bytes (max {})",
            path_and_mode.len(),
            MAX_PATH
        );
    }
    let mut buf = Vec::with_capacity(3 * HEADER_LEN + path_and_mode.len() + data.len());
    buf.extend_from_slice(&header(msg::SEND, path_and_mode.len() as u32));
    buf.extend_from_slice(path_and_mode);
    buf.extend_from_slice(&header(msg::DATA, data.len() as u32));
    buf.extend_from_slice(data);
    buf.extend_from_slice(&header(msg::DONE, mtime));
    Ok(buf)
}

pub fn chunk_header(len: u32) -> [u8; HEADER_LEN] {
    header(msg::DATA, len)
}

pub fn done_header(mtime: u32) -> [u8; HEADER_LEN] {
    header(msg::DONE, mtime)
}

/// One entry of a LIST reply.
#[derive(Debug, Clone)]
pub struct DentEntry {
    pub mode: u32,
    pub size: u32,
    pub time: u32,
    pub name: String,
}

/// Reply to a STAT request. `mode == 0` means the remote object does not
/// exist; that is the caller's business, not a decode error.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteStat {
    pub mode: u32,
    pub size: u32,
    pub time: u32,
}

/// Read one unit of a LIST reply. Every unit rides the full DENT shape
/// `(id, mode, size, time, namelen)`, including the terminating DONE,
/// whose trailing fields are ignored. Returns `None` on DONE.
pub fn read_dent(stream: &mut FramedStream) -> Result<Option<DentEntry>> {
    let (id, mode) = stream.read_header()?;
    let size = stream.read_u32()?;
    let time = stream.read_u32()?;
    let namelen = stream.read_u32()? as usize;

    if id == msg::DONE {
        return Ok(None);
    }
    if id != msg::DENT {
        bail!("unexpected response id {:#010x} to LIST", id);
    }
    if namelen > MAX_NAME {
        bail!("directory entry name too long: {} bytes", namelen);
    }
    let mut name = vec![0u8; namelen];
    stream.read_exact(&mut name)?;
    Ok(Some(DentEntry {
        mode,
        size,
        time,
        name: String::from_utf8_lossy(&name).into_owned(),
    }))
}

/// Read the four-field STAT reply `(id, mode, size, time)`.
pub fn read_stat_reply(stream: &mut FramedStream) -> Result<RemoteStat> {
    let (id, mode) = stream.read_header()?;
    let size = stream.read_u32()?;
    let time = stream.read_u32()?;
    if id != msg::STAT {
        bail!("unexpected response id {:#010x} to STAT", id);
    }
    Ok(RemoteStat { mode, size, time })
}

#[derive(Debug)]
pub enum CopyStatus {
    Okay,
    Fail(String),
}

/// Terminal reply of a SEND transaction: exactly one OKAY or FAIL.
pub fn read_copy_status(stream: &mut FramedStream) -> Result<CopyStatus> {
    let (id, msglen) = stream.read_header()?;
    if id == msg::OKAY {
        return Ok(CopyStatus::Okay);
    }
    if id != msg::FAIL {
        bail!("unknown copy status id {:#010x}", id);
    }
    Ok(CopyStatus::Fail(read_fail_message(stream, msglen)?))
}

/// Read the UTF-8 message body of a FAIL reply.
pub fn read_fail_message(stream: &mut FramedStream, msglen: u32) -> Result<String> {
    if msglen as usize > MAX_CHUNK {
        bail!("oversized failure message: {} bytes", msglen);
    }
    let mut buf = vec![0u8; msglen as usize];
    stream.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>) -> FramedStream {
        FramedStream::new(Box::new(Cursor::new(bytes)))
    }

    fn put_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    #[test]
    fn test_request_frame_layout() {
        let frame = request_frame(msg::LIST, b"/tmp").unwrap();
        assert_eq!(&frame[0..4], b"LIST");
        assert_eq!(u32::from_le_bytes(frame[4..8].try_into().unwrap()), 4);
        assert_eq!(&frame[8..], b"/tmp");
    }

    #[test]
    fn test_request_frame_rejects_long_path() {
        let long = vec![b'a'; MAX_PATH + 1];
        assert!(request_frame(msg::STAT, &long).is_err());
        let exact = vec![b'a'; MAX_PATH];
        assert!(request_frame(msg::STAT, &exact).is_ok());
    }

    #[test]
    fn test_small_file_frame_layout() {
        let frame = small_file_frame(b"/r/x,33188", b"hello\nworld", 42).unwrap();
        // SEND hdr + path
        assert_eq!(&frame[0..4], b"SEND");
        assert_eq!(u32::from_le_bytes(frame[4..8].try_into().unwrap()), 10);
        assert_eq!(&frame[8..18], b"/r/x,33188");
        // DATA hdr + payload
        assert_eq!(&frame[18..22], b"DATA");
        assert_eq!(u32::from_le_bytes(frame[22..26].try_into().unwrap()), 11);
        assert_eq!(&frame[26..37], b"hello\nworld");
        // DONE hdr carries the mtime in its length field
        assert_eq!(&frame[37..41], b"DONE");
        assert_eq!(u32::from_le_bytes(frame[41..45].try_into().unwrap()), 42);
        assert_eq!(frame.len(), 45);
    }

    #[test]
    fn test_read_dent_stream_until_done() {
        let mut bytes = Vec::new();
        put_u32(&mut bytes, msg::DENT);
        put_u32(&mut bytes, 0o100644);
        put_u32(&mut bytes, 7);
        put_u32(&mut bytes, 200);
        put_u32(&mut bytes, 5);
        bytes.extend_from_slice(b"b.txt");
        put_u32(&mut bytes, msg::DONE);
        put_u32(&mut bytes, 0);
        put_u32(&mut bytes, 0);
        put_u32(&mut bytes, 0);
        put_u32(&mut bytes, 0);

        let mut stream = reader(bytes);
        let ent = read_dent(&mut stream).unwrap().unwrap();
        assert_eq!(ent.mode, 0o100644);
        assert_eq!(ent.size, 7);
        assert_eq!(ent.time, 200);
        assert_eq!(ent.name, "b.txt");
        assert!(read_dent(&mut stream).unwrap().is_none());
    }

    #[test]
    fn test_read_dent_rejects_long_name() {
        let mut bytes = Vec::new();
        put_u32(&mut bytes, msg::DENT);
        put_u32(&mut bytes, 0o100644);
        put_u32(&mut bytes, 0);
        put_u32(&mut bytes, 0);
        put_u32(&mut bytes, (MAX_NAME + 1) as u32);
        bytes.extend_from_slice(&vec![b'x'; MAX_NAME + 1]);
        assert!(read_dent(&mut reader(bytes)).is_err());
    }

    #[test]
    fn test_read_stat_reply() {
        let mut bytes = Vec::new();
        put_u32(&mut bytes, msg::STAT);
        put_u32(&mut bytes, 0o040755);
        put_u32(&mut bytes, 4096);
        put_u32(&mut bytes, 100);
        let st = read_stat_reply(&mut reader(bytes)).unwrap();
        assert_eq!(st.mode, 0o040755);
        assert_eq!(st.size, 4096);
        assert_eq!(st.time, 100);
    }

    #[test]
    fn test_read_copy_status() {
        let mut okay = Vec::new();
        put_u32(&mut okay, msg::OKAY);
        put_u32(&mut okay, 0);
        assert!(matches!(
            read_copy_status(&mut reader(okay)).unwrap(),
            CopyStatus::Okay
        ));

        let mut fail = Vec::new();
        put_u32(&mut fail, msg::FAIL);
        put_u32(&mut fail, 9);
        fail.extend_from_slice(b"disk full");
        match read_copy_status(&mut reader(fail)).unwrap() {
            CopyStatus::Fail(m) => assert_eq!(m, "disk full"),
            other => panic!("expected Fail, got {:?}", other),
        }

        let mut unknown = Vec::new();
        put_u32(&mut unknown, msg::DENT);
        put_u32(&mut unknown, 0);
        assert!(read_copy_status(&mut reader(unknown)).is_err());
    }
}
