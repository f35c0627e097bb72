//! TCP transport to the sync service

use anyhow::{Context, Result};
use std::net::TcpStream;

use crate::framing::SyncStream;

pub const DEFAULT_PORT: u16 = 7878;

/// Connect to `host` or `host:port` and hand back the duplex stream the
/// session will own.
pub fn open_sync_stream(remote: &str) -> Result<Box<dyn SyncStream>> {
    let addr = if remote.contains(':') {
        remote.to_string()
    } else {
        format!("{}:{}", remote, DEFAULT_PORT)
    };
    let stream = TcpStream::connect(&addr).with_context(|| format!("connect failed: {}", addr))?;
    tune_socket(&stream);
    Ok(Box::new(stream))
}

/// The protocol is latency-sensitive: small request frames must not sit in
/// Nagle buffers, and dead peers should be noticed.
fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    #[cfg(unix)]
    {
        use std::os::fd::AsRawFd;
        let fd = stream.as_raw_fd();
        unsafe {
            let keepalive: libc::c_int = 1;
            let _ = libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_KEEPALIVE,
                &keepalive as *const _ as *const libc::c_void,
                std::mem::size_of_val(&keepalive) as libc::socklen_t,
            );
            #[cfg(target_os = "linux")]
            {
                let keepidle: libc::c_int = 60;
                let keepintvl: libc::c_int = 10;
                let _ = libc::setsockopt(
                    fd,
                    libc::IPPROTO_TCP,
                    libc::TCP_KEEPIDLE,
                    &keepidle as *const _ as *const libc::c_void,
                    std::mem::size_of_val(&keepidle) as libc::socklen_t,
                );
                let _ = libc::setsockopt(
                    fd,
                    libc::IPPROTO_TCP,
                    libc::TCP_KEEPINTVL,
                    &keepintvl as *const _ as *const libc::c_void,
                    std::mem::size_of_val(&keepintvl) as libc::socklen_t,
                );
            }
        }
    }
}
