//! Configuration store
//!
//! Layout of the store directory:
//! - `<topology id>`: JSON array of output records for one set of connected outputs
//! - `<topology id>_lidOpened`: layout saved right before the lid closed
//! - `fixed-config`: operator override, read instead of any topology file
//! - `outputs/<hash>.json`: global per-output records
//! - `control/<topology id>.json`: per-output control settings
//!
//! Reads never fail: a missing or corrupt file is reported as `None` and the
//! caller falls back to defaults. Writes go through a temporary file so a
//! failure never leaves a partially written snapshot behind.

pub mod global;
pub mod record;

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::store::{APP_DIR, CONTROL_DIR, DIR_ENV, FIXED_CONFIG, JSON_EXT, LID_OPENED_SUFFIX};
use crate::geometry::adjust_positions;
use crate::matcher::{match_records, read_in_outputs};
use crate::output::LiveConfig;

use global::GlobalStore;
use record::{StoredOutputRecord, TopologySnapshot};

/// Device state relevant to the lid-opened snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceState {
    pub is_laptop: bool,
    pub lid_closed: bool,
}

impl DeviceState {
    /// A laptop whose lid is open
    pub fn lid_open(&self) -> bool {
        self.is_laptop && !self.lid_closed
    }
}

/// Write `contents` to `path` through a sibling temporary file
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = fs::write(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to open {} for writing", tmp.display()));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to move {} into place", path.display()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
    globals: GlobalStore,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let globals = GlobalStore::new(&dir);
        Self { dir, globals }
    }

    /// `$OUTPUTD_STORE_DIR`, else the user's data directory
    pub fn default_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os(DIR_ENV) {
            return PathBuf::from(dir);
        }
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        path
    }

    pub fn open_default() -> Self {
        Self::new(Self::default_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn globals(&self) -> &GlobalStore {
        &self.globals
    }

    pub fn topology_path(&self, topology: &str) -> PathBuf {
        self.dir.join(topology)
    }

    pub fn fixed_path(&self) -> PathBuf {
        self.dir.join(FIXED_CONFIG)
    }

    pub fn lid_opened_path(&self, topology: &str) -> PathBuf {
        self.dir.join(format!("{topology}{LID_OPENED_SUFFIX}"))
    }

    pub fn control_path(&self, topology: &str) -> PathBuf {
        self.dir.join(CONTROL_DIR).join(format!("{topology}.{JSON_EXT}"))
    }

    /// A snapshot would be found for `topology`
    pub fn file_exists(&self, topology: &str) -> bool {
        (!topology.is_empty() && self.topology_path(topology).is_file()) || self.fixed_path().is_file()
    }

    fn read_snapshot(&self, path: &Path, id: &str) -> Option<TopologySnapshot> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No stored snapshot");
                return None;
            }
        };
        match serde_json::from_str::<Vec<StoredOutputRecord>>(&contents) {
            Ok(records) => Some(TopologySnapshot {
                id: id.to_string(),
                records,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt snapshot");
                None
            }
        }
    }

    /// Snapshot for `topology`. A fixed override wins over everything.
    pub fn load(&self, topology: &str) -> Option<TopologySnapshot> {
        let fixed = self.fixed_path();
        if fixed.is_file() {
            debug!(path = %fixed.display(), "Found a fixed config, using it");
            return self.read_snapshot(&fixed, FIXED_CONFIG);
        }
        if topology.is_empty() {
            return None;
        }
        self.read_snapshot(&self.topology_path(topology), topology)
    }

    /// Promote the lid-opened snapshot of `topology` to its main snapshot.
    /// Only happens on a laptop with the lid open. Returns whether a file was promoted.
    pub fn restore_lid_opened(&self, topology: &str, device: DeviceState) -> bool {
        if !device.lid_open() || topology.is_empty() {
            return false;
        }
        let lid_file = self.lid_opened_path(topology);
        if !lid_file.is_file() {
            return false;
        }
        match fs::rename(&lid_file, self.topology_path(topology)) {
            Ok(()) => {
                info!(topology = %topology, "Restored lid opened config");
                true
            }
            Err(e) => {
                warn!(path = %lid_file.display(), error = %e, "Failed to restore lid opened config");
                false
            }
        }
    }

    /// [`Self::load`] after promoting a pending lid-opened snapshot
    pub fn load_with_lid_fallback(&self, topology: &str, device: DeviceState) -> Option<TopologySnapshot> {
        self.restore_lid_opened(topology, device);
        self.load(topology)
    }

    /// Read and delete the lid-opened snapshot of `topology`
    pub fn read_lid_opened(&self, topology: &str) -> Option<TopologySnapshot> {
        if topology.is_empty() {
            return None;
        }
        let path = self.lid_opened_path(topology);
        let snapshot = self.read_snapshot(&path, topology);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove lid opened config");
            }
        }
        snapshot
    }

    /// Persist `config` under its own topology id
    pub fn save(&self, config: &LiveConfig) -> Result<()> {
        let topology = config.topology_id();
        self.write_snapshot(config, &topology, &self.topology_path(&topology))
    }

    /// Persist `config` as the snapshot to restore once the lid opens again
    pub fn save_lid_opened(&self, config: &LiveConfig) -> Result<()> {
        let topology = config.topology_id();
        self.write_snapshot(config, &topology, &self.lid_opened_path(&topology))
    }

    fn write_snapshot(&self, config: &LiveConfig, topology: &str, path: &Path) -> Result<()> {
        if topology.is_empty() {
            bail!("No connected outputs, nothing to save");
        }

        // Disabled outputs keep what the replaced snapshot knew about them
        let previous = self
            .read_snapshot(&self.topology_path(topology), topology)
            .map(|s| s.records)
            .unwrap_or_default();
        let matches = match_records(&config.outputs, &previous);

        let mut records = Vec::new();
        for output in config.connected_outputs() {
            let old = matches.get(&output.id).copied().flatten();
            records.push(StoredOutputRecord::from_output(output, old));

            if output.enabled {
                if let Err(e) = self.globals.write(output) {
                    warn!(output = %output.name, error = ?e, "Failed to update global output record");
                }
            }
        }

        let json = serde_json::to_string_pretty(&records).context("Failed to serialize snapshot")?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create store directory {}", self.dir.display()))?;
        write_atomic(path, &json)?;
        info!(topology = %topology, path = %path.display(), outputs = records.len(), "Config saved");
        Ok(())
    }

    /// Rebuild a configuration for the live outputs from the stored snapshot.
    ///
    /// None when nothing is stored or when the rebuilt configuration is rejected
    /// by `can_apply`.
    pub fn read_config(
        &self,
        live: &LiveConfig,
        device: DeviceState,
        can_apply: impl Fn(&LiveConfig) -> bool,
    ) -> Option<LiveConfig> {
        let snapshot = self.load_with_lid_fallback(&live.topology_id(), device)?;
        let mut config = self.apply_snapshot(live, &snapshot);
        if !can_apply(&config) {
            warn!(snapshot = %snapshot.id, "Stored config can not be applied, discarding it");
            return None;
        }
        config.update_screen_size();
        Some(config)
    }

    /// Live outputs with the stored layout read in and positions corrected
    pub fn apply_snapshot(&self, live: &LiveConfig, snapshot: &TopologySnapshot) -> LiveConfig {
        let mut config = live.clone();
        read_in_outputs(&mut config, &snapshot.records, &self.globals);
        adjust_positions(&mut config, &snapshot.records);
        config
    }
}
