//! ferry - file sync client
//!
//! Talks the framed sync protocol to a remote filesystem service: list a
//! remote directory, push local files or trees, pull remote ones, or sync
//! a tree skipping files that are already up to date.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ferry::commands;
use ferry::fsio::HostFs;
use ferry::log::TransferLog;
use ferry::printer::{ConsoleSink, ProgressSink, ERROR_PREFIX};
use ferry::session::SyncSession;
use ferry::transport;

#[derive(Parser, Debug)]
#[command(name = "ferry", version, about = "File transfer over the ferry sync protocol")]
struct Cli {
    /// Sync service address (host or host:port)
    #[arg(short = 'r', long, global = true, default_value = "127.0.0.1")]
    remote: String,

    /// Lower the transfer chunk size (KiB, capped at 64)
    #[arg(long, global = true, value_name = "KIB")]
    chunk_kib: Option<usize>,

    /// Append per-file transfer records to a JSONL log
    #[arg(long, global = true, value_name = "FILE")]
    log: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List a remote directory
    Ls { path: String },

    /// Push local files or trees to the remote (last argument is the destination)
    Push {
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },

    /// Pull remote files or trees to the local host (last argument is the destination)
    Pull {
        /// Restore mtime and permissions on pulled files
        #[arg(short = 'a', long)]
        copy_attrs: bool,

        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },

    /// Push a local tree, skipping files already up to date on the remote
    Sync {
        /// Print what would be pushed without transferring
        #[arg(short = 'n', long)]
        list_only: bool,

        lpath: String,
        rpath: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let ok = run(&cli);
    std::process::exit(if ok { 0 } else { 1 });
}

fn run(cli: &Cli) -> bool {
    let sink = Box::new(ConsoleSink::new());
    let stream = match transport::open_sync_stream(&cli.remote) {
        Ok(s) => s,
        Err(e) => {
            sink.print_full(&format!("{}{:#}", ERROR_PREFIX, e));
            return false;
        }
    };
    let mut sc = SyncSession::new(stream, sink);
    if let Some(kib) = cli.chunk_kib {
        sc.set_max_chunk(kib * 1024);
    }
    if let Some(path) = &cli.log {
        sc.set_transfer_log(TransferLog::new(path));
    }
    let fs = HostFs;

    match &cli.cmd {
        Cmd::Ls { path } => commands::do_sync_ls(&mut sc, path),
        Cmd::Push { paths } => {
            let Some((dst, srcs)) = paths.split_last() else {
                return false;
            };
            let srcs: Vec<&str> = srcs.iter().map(String::as_str).collect();
            commands::do_sync_push(&mut sc, &fs, &srcs, dst)
        }
        Cmd::Pull { copy_attrs, paths } => {
            let Some((dst, srcs)) = paths.split_last() else {
                return false;
            };
            let srcs: Vec<&str> = srcs.iter().map(String::as_str).collect();
            commands::do_sync_pull(&mut sc, &fs, &srcs, dst, *copy_attrs)
        }
        Cmd::Sync {
            list_only,
            lpath,
            rpath,
        } => commands::do_sync_sync(&mut sc, &fs, lpath, rpath, *list_only),
    }
}
