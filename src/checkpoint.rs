//! Append-only checkpoint of completed input URLs.
//!
//! One raw input URL per line, appended after each successful result and
//! flushed immediately so a crashed run can resume. Readers load the whole
//! set at startup and skip matching inputs.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// Handle to the append-mode checkpoint file. Writes run on the blocking
/// pool so the event loop never stalls on disk.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl CheckpointStore {
    /// Open (or create) the checkpoint for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::Checkpoint)?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the set of completed URLs recorded in a checkpoint file.
    /// A missing file is an empty set.
    pub fn load_completed(path: impl AsRef<Path>) -> Result<HashSet<String>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(HashSet::new());
        }
        let file = File::open(path).map_err(Error::Checkpoint)?;
        let mut completed = HashSet::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(Error::Checkpoint)?;
            let line = line.trim();
            if !line.is_empty() {
                completed.insert(line.to_string());
            }
        }
        Ok(completed)
    }

    /// Append one completed input URL and flush.
    pub async fn append(&self, url: &str) -> Result<()> {
        let file = Arc::clone(&self.file);
        let line = format!("{url}\n");
        tokio::task::spawn_blocking(move || {
            let mut file = file.lock().expect("checkpoint mutex poisoned");
            file.write_all(line.as_bytes())?;
            file.flush()
        })
        .await
        .map_err(|e| Error::Internal(format!("checkpoint writer task failed: {e}")))?
        .map_err(Error::Checkpoint)
    }
}
