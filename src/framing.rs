//! Exact-length framing primitives over a duplex sync stream

use anyhow::{Context, Result};
use std::io::{Read, Write};

/// Duplex byte stream to the remote sync service. The transport decides
/// what actually backs it; the protocol layers only need ordered bytes.
pub trait SyncStream: Read + Write + Send {}

impl<T: Read + Write + Send> SyncStream for T {}

/// Owns the stream and moves exact byte counts in either direction.
/// A short read or write is always an error at this layer.
pub struct FramedStream {
    inner: Box<dyn SyncStream>,
}

impl FramedStream {
    pub fn new(inner: Box<dyn SyncStream>) -> Self {
        Self { inner }
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner
            .read_exact(buf)
            .context("short read from sync stream")?;
        Ok(())
    }

    pub fn write_exact(&mut self, buf: &[u8]) -> Result<()> {
        self.inner
            .write_all(buf)
            .context("short write to sync stream")?;
        Ok(())
    }

    /// Coalesce several logical writes into one transport write. Shipping
    /// header, payload and trailer together makes a noticeable difference
    /// on high-latency links.
    pub fn write_batched(&mut self, parts: &[&[u8]]) -> Result<()> {
        let total = parts.iter().map(|p| p.len()).sum();
        let mut buf = Vec::with_capacity(total);
        for part in parts {
            buf.extend_from_slice(part);
        }
        self.write_exact(&buf)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    /// Fixed message header: `(id, length)` as two little-endian u32s.
    pub fn read_header(&mut self) -> Result<(u32, u32)> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        let id = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let length = u32::from_le_bytes([b[4], b[5], b[6], b[7]]);
        Ok((id, length))
    }

    /// Read and discard until the peer closes the stream. Used for orderly
    /// shutdown after QUIT; errors just mean the peer is already gone.
    pub fn drain(&mut self) {
        let mut scratch = [0u8; 4096];
        loop {
            match self.inner.read(&mut scratch) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }
}
