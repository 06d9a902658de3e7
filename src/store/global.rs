//! Global per-output records
//!
//! One `<hash>.json` file per output hash, independent of topology. Only outputs
//! with [`RetentionPolicy::Global`] ever read from or write to these files.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::store::{JSON_EXT, OUTPUTS_DIR};
use crate::output::{Output, RetentionPolicy};
use crate::store::record::GlobalOutputRecord;
use crate::store::write_atomic;

#[derive(Debug, Clone)]
pub struct GlobalStore {
    dir: PathBuf,
}

impl GlobalStore {
    pub fn new(store_dir: &Path) -> Self {
        Self {
            dir: store_dir.join(OUTPUTS_DIR),
        }
    }

    pub fn path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.{JSON_EXT}"))
    }

    /// Record for `hash`, if present and readable
    pub fn read(&self, hash: &str) -> Option<GlobalOutputRecord> {
        let path = self.path(hash);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No global output record");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt global output record");
                None
            }
        }
    }

    /// Record for `output`, honouring its retention policy
    pub fn read_for(&self, output: &Output) -> Option<GlobalOutputRecord> {
        if output.retention != RetentionPolicy::Global {
            return None;
        }
        self.read(&output.hash)
    }

    /// Update the global record of `output` from its live state.
    /// Outputs with individual retention, disabled outputs and outputs without a
    /// mode leave the file untouched.
    pub fn write(&self, output: &Output) -> Result<()> {
        if output.retention != RetentionPolicy::Global {
            return Ok(());
        }
        let Some(update) = GlobalOutputRecord::from_output(output) else {
            return Ok(());
        };
        let record = match self.read(&output.hash) {
            Some(existing) => update.merge_into(existing),
            None => update,
        };

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create outputs directory {}", self.dir.display()))?;
        let json = serde_json::to_string_pretty(&record)
            .context("Failed to serialize global output record")?;
        let path = self.path(&output.hash);
        write_atomic(&path, &json)?;
        info!(output = %output.name, path = %path.display(), "Saved global output record");
        Ok(())
    }
}
