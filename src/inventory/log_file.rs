// bucket_ingestor/src/inventory/log_file.rs
// Append-only JSON-lines inventory file. Each line carries a short SHA-256
// checksum; damaged lines are skipped on load and an unterminated final line
// is either completed or cut off before the next append.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{InventoryBackend, InventoryEntry};
use crate::error::{IngestorError, Result};

#[derive(Debug, Serialize, Deserialize,)]
struct LogLine {
    identifier:  String,
    ingested_at: DateTime<Utc,>,
    checksum:    String,
}

pub struct LogFileBackend {
    path:     PathBuf,
    // Whether the tail has been checked for a torn write in this process.
    repaired: Mutex<bool,>,
}

impl LogFileBackend {
    pub fn new(path: impl Into<PathBuf,>,) -> Self {
        Self {
            path:     path.into(),
            repaired: Mutex::new(false,),
        }
    }

    pub fn path(&self,) -> &Path {
        &self.path
    }

    /// Makes sure the file ends on a line boundary before anything is appended.
    ///
    /// An unterminated tail that still validates is a complete entry that lost
    /// only its newline, so the newline is restored. Anything else is a torn
    /// write and the file is truncated back to its last complete line.
    async fn repair_torn_tail(&self,) -> Result<(),> {
        let contents = match fs::read(&self.path,).await {
            Ok(c,) => c,
            Err(e,) if e.kind() == std::io::ErrorKind::NotFound => return Ok((),),
            Err(e,) => return Err(inventory_io("read", &self.path, e,),),
        };
        if contents.is_empty() || contents.ends_with(b"\n",) {
            return Ok((),);
        }

        let keep = contents
            .iter()
            .rposition(|b| *b == b'\n',)
            .map_or(0, |pos| pos + 1,);

        if decode_line(&contents[keep..],).is_ok() {
            info!(path = %self.path.display(), "Completing unterminated inventory line");
            let mut file = OpenOptions::new()
                .append(true,)
                .open(&self.path,)
                .await
                .map_err(|e| inventory_io("open", &self.path, e,),)?;
            file.write_all(b"\n",)
                .await
                .map_err(|e| inventory_io("append to", &self.path, e,),)?;
            file.sync_data()
                .await
                .map_err(|e| inventory_io("sync", &self.path, e,),)?;
            return Ok((),);
        }

        warn!(
            path = %self.path.display(),
            dropped_bytes = contents.len() - keep,
            "Truncating torn inventory line"
        );
        let file = OpenOptions::new()
            .write(true,)
            .open(&self.path,)
            .await
            .map_err(|e| inventory_io("open", &self.path, e,),)?;
        file.set_len(keep as u64,)
            .await
            .map_err(|e| inventory_io("truncate", &self.path, e,),)?;
        file.sync_data()
            .await
            .map_err(|e| inventory_io("sync", &self.path, e,),)?;
        Ok((),)
    }
}

#[async_trait]
impl InventoryBackend for LogFileBackend {
    async fn load_all(&self,) -> Result<Vec<InventoryEntry,>,> {
        let contents = match fs::read(&self.path,).await {
            Ok(c,) => c,
            Err(e,) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No inventory file yet, starting empty");
                return Ok(Vec::new(),);
            },
            Err(e,) => return Err(inventory_io("read", &self.path, e,),),
        };

        let mut entries = Vec::new();
        for (index, raw,) in contents.split(|b| *b == b'\n',).enumerate() {
            if raw.iter().all(u8::is_ascii_whitespace,) {
                continue;
            }
            match decode_line(raw,) {
                Ok(parsed,) => entries.push(InventoryEntry {
                    identifier:  parsed.identifier,
                    ingested_at: parsed.ingested_at,
                },),
                Err(reason,) => warn!(line = index + 1, %reason, "Skipping unreadable inventory line"),
            }
        }
        Ok(entries,)
    }

    async fn append(&self, entry: &InventoryEntry,) -> Result<(),> {
        {
            let mut repaired = self.repaired.lock().await;
            if !*repaired {
                self.repair_torn_tail().await?;
                *repaired = true;
            }
        }

        if let Some(parent,) = self.path.parent().filter(|p| !p.as_os_str().is_empty(),) {
            fs::create_dir_all(parent,)
                .await
                .map_err(|e| inventory_io("create directory for", &self.path, e,),)?;
        }

        let line = LogLine {
            identifier:  entry.identifier.clone(),
            ingested_at: entry.ingested_at,
            checksum:    checksum(&entry.identifier, &entry.ingested_at,),
        };
        let mut bytes = serde_json::to_vec(&line,)
            .map_err(|e| IngestorError::InventoryError(format!("Failed to encode entry: {}", e),),)?;
        bytes.push(b'\n',);

        let mut file = OpenOptions::new()
            .create(true,)
            .append(true,)
            .open(&self.path,)
            .await
            .map_err(|e| inventory_io("open", &self.path, e,),)?;
        file.write_all(&bytes,)
            .await
            .map_err(|e| inventory_io("append to", &self.path, e,),)?;
        file.sync_data()
            .await
            .map_err(|e| inventory_io("sync", &self.path, e,),)?;
        Ok((),)
    }
}

/// Decodes one raw line, rejecting invalid UTF-8, bad JSON and checksum mismatches.
fn decode_line(raw: &[u8],) -> std::result::Result<LogLine, String,> {
    let text = std::str::from_utf8(raw,).map_err(|e| format!("invalid UTF-8: {}", e),)?;
    let parsed: LogLine = serde_json::from_str(text.trim_end_matches('\r',),).map_err(|e| e.to_string(),)?;
    if parsed.checksum != checksum(&parsed.identifier, &parsed.ingested_at,) {
        return Err(format!("checksum mismatch for '{}'", parsed.identifier),);
    }
    Ok(parsed,)
}

fn checksum(identifier: &str, ingested_at: &DateTime<Utc,>,) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes(),);
    hasher.update(b"\t",);
    hasher.update(ingested_at.to_rfc3339_opts(SecondsFormat::Nanos, true,).as_bytes(),);
    hex::encode(&hasher.finalize()[..8],)
}

fn inventory_io(action: &str, path: &Path, err: std::io::Error,) -> IngestorError {
    IngestorError::InventoryError(format!(
        "Failed to {} inventory file {}: {}",
        action,
        path.display(),
        err
    ),)
}
