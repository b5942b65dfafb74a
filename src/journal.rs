use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Store,
    Retrieve,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransferLogEntry {
    pub timestamp: String,
    pub transfer_id: String,
    pub peer: String,
    pub kind: TransferKind,
    pub file_name: String,
    pub size: u64,
    pub bytes_transferred: u64,
    pub status: TransferStatus,
    pub error: Option<String>,
}

impl TransferLogEntry {
    pub fn new(peer: &str, kind: TransferKind, file_name: &str, size: u64) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            transfer_id: Uuid::new_v4().to_string(),
            peer: peer.to_string(),
            kind,
            file_name: file_name.to_string(),
            size,
            bytes_transferred: 0,
            status: TransferStatus::Failed,
            error: None,
        }
    }

    pub fn completed(mut self, bytes: u64) -> Self {
        self.bytes_transferred = bytes;
        self.status = TransferStatus::Completed;
        self.error = None;
        self
    }

    pub fn failed(mut self, error: impl ToString) -> Self {
        self.status = TransferStatus::Failed;
        self.error = Some(error.to_string());
        self
    }
}

/// Append-only JSONL record of finished transfers
pub struct TransferJournal {
    log_file_path: PathBuf,
    write_lock: Mutex<()>,
}

impl TransferJournal {
    pub fn new(path: &Path) -> Self {
        TransferJournal {
            log_file_path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.log_file_path
    }

    pub fn add_entry(&self, entry: &TransferLogEntry) -> Result<()> {
        let _guard = self.write_lock.lock().ok();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open transfer journal")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_entries(&self) -> Result<Vec<TransferLogEntry>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_file_path)
            .context("Failed to open transfer journal for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TransferLogEntry = serde_json::from_str(&line)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}
