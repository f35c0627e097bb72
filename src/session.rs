//! One connection to the remote sync service
//!
//! The session owns the framed stream and all buffers; it is the sole
//! reader and sole writer. Request/response ordering is strict FIFO, the
//! only exception being the split STAT halves used by the push engine's
//! skip phase.

use anyhow::{anyhow, bail, Result};
use std::io::{ErrorKind, Read, Write};
use std::time::Instant;

use crate::codec::{self, CopyStatus, DentEntry, RemoteStat};
use crate::framing::{FramedStream, SyncStream};
use crate::log::{TransferLog, TransferLogEntry, TransferStatus};
use crate::printer::{self, ProgressSink};
use crate::protocol::{msg, MAX_CHUNK};

pub struct SyncSession {
    stream: FramedStream,
    printer: Box<dyn ProgressSink>,
    log: Option<TransferLog>,
    /// DATA payload bytes moved in either direction; monotone.
    pub total_bytes: u64,
    start: Instant,
    max_chunk: usize,
    healthy: bool,
}

impl SyncSession {
    pub fn new(stream: Box<dyn SyncStream>, printer: Box<dyn ProgressSink>) -> Self {
        Self {
            stream: FramedStream::new(stream),
            printer,
            log: None,
            total_bytes: 0,
            start: Instant::now(),
            max_chunk: MAX_CHUNK,
            healthy: true,
        }
    }

    /// Lower the DATA ceiling. Raising it past the protocol default is not
    /// negotiable, so requests above it are clamped.
    pub fn set_max_chunk(&mut self, bytes: usize) {
        self.max_chunk = bytes.clamp(1, MAX_CHUNK);
    }

    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    pub fn set_transfer_log(&mut self, log: TransferLog) {
        self.log = Some(log);
    }

    pub fn printer(&self) -> &dyn ProgressSink {
        self.printer.as_ref()
    }

    pub fn print(&self, line: &str) {
        self.printer.print_elide(line);
    }

    pub fn print_full(&self, line: &str) {
        self.printer.print_full(line);
    }

    pub fn error(&self, message: &str) {
        printer::error_line(self.printer.as_ref(), message);
    }

    pub fn log_transfer(
        &self,
        direction: &str,
        source: &str,
        destination: &str,
        bytes: u64,
        status: TransferStatus,
        error: Option<String>,
    ) {
        if let Some(log) = &self.log {
            let _ = log.add_entry(&TransferLogEntry::new(
                direction,
                source,
                destination,
                bytes,
                status,
                error,
            ));
        }
    }

    /// Mark stream-level failures fatal for the session: the stream can no
    /// longer be assumed in sync, so the destructor skips QUIT and drain.
    fn fatal<T>(&mut self, r: Result<T>) -> Result<T> {
        if r.is_err() {
            self.healthy = false;
        }
        r
    }

    /// List a remote directory; the callback sees entries in wire order.
    pub fn list(&mut self, path: &str, mut f: impl FnMut(DentEntry)) -> Result<()> {
        let req = codec::request_frame(msg::LIST, path.as_bytes())?;
        let sent = self.stream.write_exact(&req);
        self.fatal(sent)?;
        loop {
            let next = codec::read_dent(&mut self.stream);
            match self.fatal(next)? {
                Some(entry) => f(entry),
                None => return Ok(()),
            }
        }
    }

    /// Stat a remote path. A missing object comes back with `mode == 0`.
    pub fn stat(&mut self, path: &str) -> Result<RemoteStat> {
        self.send_stat(path)?;
        self.recv_stat()
    }

    /// Write a STAT request without waiting for the reply. The skip phase
    /// pipelines these; replies must then be read back in the same order.
    pub fn send_stat(&mut self, path: &str) -> Result<()> {
        let req = codec::request_frame(msg::STAT, path.as_bytes())?;
        let sent = self.stream.write_exact(&req);
        self.fatal(sent)
    }

    /// Read the next pending STAT reply.
    pub fn recv_stat(&mut self) -> Result<RemoteStat> {
        let reply = codec::read_stat_reply(&mut self.stream);
        self.fatal(reply)
    }

    /// Ship a whole small file as one burst write:
    /// `SEND | path,mode | DATA | bytes | DONE`.
    pub fn send_small(
        &mut self,
        path_and_mode: &str,
        rpath: &str,
        data: &[u8],
        mtime: u32,
    ) -> Result<()> {
        self.print(rpath);
        if data.len() > self.max_chunk {
            bail!(
                "small-file payload of {} bytes exceeds chunk ceiling {}",
                data.len(),
                self.max_chunk
            );
        }
        let frame = codec::small_file_frame(path_and_mode.as_bytes(), data, mtime)?;
        let sent = self.stream.write_exact(&frame);
        self.fatal(sent)?;
        self.total_bytes += data.len() as u64;
        Ok(())
    }

    /// Stream a large file in bounded chunks, each chunk's header and
    /// payload coalesced into one write, terminated by DONE carrying the
    /// mtime. Any failure past the SEND header leaves the transaction
    /// half-written and poisons the session.
    pub fn send_large(
        &mut self,
        path_and_mode: &str,
        rpath: &str,
        src: &mut dyn Read,
        size: u64,
        mtime: u32,
    ) -> Result<()> {
        let req = codec::request_frame(msg::SEND, path_and_mode.as_bytes())?;
        let sent = self.stream.write_exact(&req);
        self.fatal(sent)?;

        let total = size.max(1);
        let mut copied: u64 = 0;
        let mut buf = vec![0u8; self.max_chunk];
        loop {
            let n = match src.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.healthy = false;
                    return Err(anyhow!(e).context("cannot read source file"));
                }
            };
            let hdr = codec::chunk_header(n as u32);
            let wrote = self.stream.write_batched(&[&hdr, &buf[..n]]);
            self.fatal(wrote)?;
            self.total_bytes += n as u64;
            copied += n as u64;
            self.print(&format!("{}: {}%", rpath, copied * 100 / total));
        }

        let done = self.stream.write_exact(&codec::done_header(mtime));
        self.fatal(done)
    }

    /// Read the terminal OKAY/FAIL of a SEND transaction. Failures are
    /// reported through the error channel; the return value feeds the
    /// engine's overall success flag.
    pub fn read_copy_ack(&mut self, from: &str, to: &str) -> bool {
        let status = codec::read_copy_status(&mut self.stream);
        match self.fatal(status) {
            Ok(CopyStatus::Okay) => true,
            Ok(CopyStatus::Fail(reason)) => {
                self.error(&format!("failed to copy '{}' to '{}': {}", from, to, reason));
                false
            }
            Err(e) => {
                self.error(&format!("failed to copy '{}' to '{}': {:#}", from, to, e));
                false
            }
        }
    }

    /// Receive one file: DATA frames into `out` until DONE. A FAIL reply
    /// surfaces the server's message and leaves the session usable; an
    /// oversized chunk or foreign id is fatal. The caller owns cleanup of
    /// whatever `out` points at.
    pub fn recv(&mut self, rpath: &str, out: &mut dyn Write, expected_size: u64) -> Result<()> {
        let total = expected_size.max(1);
        let mut copied: u64 = 0;
        let mut buf = vec![0u8; self.max_chunk];
        loop {
            let hdr = self.stream.read_header();
            let (id, len) = self.fatal(hdr)?;
            if id == msg::DONE {
                return Ok(());
            }
            if id == msg::FAIL {
                let reason = codec::read_fail_message(&mut self.stream, len);
                return Err(anyhow!(self.fatal(reason)?));
            }
            if id != msg::DATA {
                self.healthy = false;
                bail!("unexpected response id {:#010x} during receive", id);
            }
            let len = len as usize;
            if len > self.max_chunk {
                self.healthy = false;
                bail!("data chunk of {} bytes exceeds ceiling {}", len, self.max_chunk);
            }
            let read = self.stream.read_exact(&mut buf[..len]);
            self.fatal(read)?;
            if let Err(e) = out.write_all(&buf[..len]) {
                // The rest of the transaction is still in flight; the
                // stream is no longer usable for further requests.
                self.healthy = false;
                return Err(anyhow!(e).context(format!("cannot write local copy of '{}'", rpath)));
            }
            self.total_bytes += len as u64;
            copied += len as u64;
            self.print(&format!("{}: {}%", rpath, copied * 100 / total));
        }
    }

    /// Post-transfer summary fragment, e.g. ` 12.3 MB/s (1048576 bytes in 0.081s)`.
    /// Empty when nothing was moved.
    pub fn transfer_rate(&self) -> String {
        let secs = self.start.elapsed().as_secs_f64();
        if self.total_bytes == 0 || secs <= 0.0 {
            return String::new();
        }
        let rate = self.total_bytes as f64 / secs / 1_048_576.0;
        format!(
            " {:.1} MB/s ({} bytes in {:.3}s)",
            rate, self.total_bytes, secs
        )
    }
}

impl Drop for SyncSession {
    /// Orderly shutdown: QUIT, then wait for the peer to finish and close.
    /// A session that died mid-transaction skips both; the server may still
    /// be streaming data and the drain could hang on it.
    fn drop(&mut self) {
        if !self.healthy {
            return;
        }
        if let Ok(req) = codec::request_frame(msg::QUIT, b"") {
            if self.stream.write_exact(&req).is_ok() {
                self.stream.drain();
            }
        }
    }
}
