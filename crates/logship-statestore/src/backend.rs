//! Checkpoint + operation-log storage backend.
//!
//! Holds the full table in memory and makes committed operations durable by
//! appending them to a JSON-lines log with an fsync per commit. When the log
//! accumulates enough operations, the table is rewritten as a checkpoint
//! (temp file + atomic rename) and the log truncated. Recovery loads the
//! checkpoint and replays the log; a corrupt or truncated trailing entry ends
//! the replay, so a crash mid-append loses at most the uncommitted tail.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::value::merge_values;

const CHECKPOINT_FILE: &str = "checkpoint.json";
const CHECKPOINT_TMP_FILE: &str = "checkpoint.json.tmp";
const OPLOG_FILE: &str = "oplog.jsonl";

/// Rewrite the checkpoint once this many operations have been logged.
const DEFAULT_CHECKPOINT_EVERY: usize = 1024;

/// A single logged operation. Replaying the same operation twice is
/// idempotent, so a checkpoint interrupted before log truncation is safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub(crate) enum LogOp {
    Set { key: String, value: Value },
    Merge { key: String, value: Value },
    Remove { key: String },
}

pub(crate) struct Backend {
    dir: PathBuf,
    table: HashMap<String, Value>,
    log_file: File,
    ops_since_checkpoint: usize,
    checkpoint_every: usize,
}

impl Backend {
    pub(crate) fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;

        let checkpoint_path = dir.join(CHECKPOINT_FILE);
        let mut table: HashMap<String, Value> = if checkpoint_path.exists() {
            serde_json::from_reader(BufReader::new(File::open(&checkpoint_path)?))?
        } else {
            HashMap::new()
        };

        let log_path = dir.join(OPLOG_FILE);
        let mut replayed = 0usize;
        if log_path.exists() {
            let reader = BufReader::new(File::open(&log_path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogOp>(&line) {
                    Ok(op) => {
                        apply(&mut table, &op);
                        replayed += 1;
                    }
                    Err(e) => {
                        warn!(
                            path = %log_path.display(),
                            error = %e,
                            "corrupt or truncated oplog entry, stopping replay"
                        );
                        break;
                    }
                }
            }
        }

        let log_file = OpenOptions::new().create(true).append(true).open(&log_path)?;

        debug!(
            path = %dir.display(),
            keys = table.len(),
            replayed = replayed,
            "opened state registry backend"
        );

        Ok(Self {
            dir,
            table,
            log_file,
            ops_since_checkpoint: replayed,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
        })
    }

    pub(crate) fn table(&self) -> &HashMap<String, Value> {
        &self.table
    }

    /// Apply a committed transaction's operations and make them durable.
    ///
    /// The in-memory table may run ahead of the log if the append fails;
    /// callers treat a failed commit as not durable and retry through a later
    /// update.
    pub(crate) fn commit(&mut self, ops: Vec<LogOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        for op in &ops {
            apply(&mut self.table, op);
        }

        let mut buf = Vec::new();
        for op in &ops {
            serde_json::to_writer(&mut buf, op)?;
            buf.push(b'\n');
        }
        self.log_file.write_all(&buf)?;
        self.log_file.sync_all()?;

        self.ops_since_checkpoint += ops.len();
        if self.ops_since_checkpoint >= self.checkpoint_every {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Write the full table as a fresh checkpoint and truncate the log.
    pub(crate) fn checkpoint(&mut self) -> Result<()> {
        let tmp_path = self.dir.join(CHECKPOINT_TMP_FILE);
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(&file);
            serde_json::to_writer(&mut writer, &self.table)?;
            writer.flush()?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, self.dir.join(CHECKPOINT_FILE))?;
        #[cfg(unix)]
        File::open(&self.dir)?.sync_all()?;

        self.log_file.set_len(0)?;
        self.log_file.sync_all()?;
        self.ops_since_checkpoint = 0;

        debug!(path = %self.dir.display(), keys = self.table.len(), "wrote checkpoint");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_checkpoint_every(&mut self, every: usize) {
        self.checkpoint_every = every;
    }
}

fn apply(table: &mut HashMap<String, Value>, op: &LogOp) {
    match op {
        LogOp::Set { key, value } => {
            table.insert(key.clone(), value.clone());
        }
        LogOp::Merge { key, value } => match table.get_mut(key) {
            Some(existing) => merge_values(existing, value),
            None => {
                table.insert(key.clone(), value.clone());
            }
        },
        LogOp::Remove { key } => {
            table.remove(key);
        }
    }
}
