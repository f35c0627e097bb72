//! Append-only JSONL transfer log

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Skipped,
    Failed,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TransferLogEntry {
    pub timestamp: String,
    pub direction: String,
    pub source: String,
    pub destination: String,
    pub bytes: u64,
    pub status: TransferStatus,
    pub error: Option<String>,
}

impl TransferLogEntry {
    pub fn new(
        direction: &str,
        source: &str,
        destination: &str,
        bytes: u64,
        status: TransferStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            direction: direction.to_string(),
            source: source.to_string(),
            destination: destination.to_string(),
            bytes,
            status,
            error,
        }
    }
}

/// One record per transferred, skipped, or failed file. A log write that
/// fails must never fail the transfer itself; callers ignore the result.
pub struct TransferLog {
    path: PathBuf,
}

impl TransferLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn add_entry(&self, entry: &TransferLogEntry) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("failed to open transfer log")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<Vec<TransferLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path).context("failed to open transfer log for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}
