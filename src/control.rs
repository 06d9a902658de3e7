//! Per-output control settings
//!
//! One file per topology under `control/`. Entries are keyed by output hash and
//! connector name, so two identical monitors can carry different settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::control::{DEFAULT_AUTO_ROTATE, DEFAULT_AUTO_ROTATE_ONLY_IN_TABLET_MODE};
use crate::output::{LiveConfig, Output};
use crate::store::write_atomic;

fn default_auto_rotate() -> bool {
    DEFAULT_AUTO_ROTATE
}

fn default_only_in_tablet_mode() -> bool {
    DEFAULT_AUTO_ROTATE_ONLY_IN_TABLET_MODE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputControl {
    /// Output hash
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_auto_rotate")]
    pub auto_rotate: bool,
    #[serde(default = "default_only_in_tablet_mode")]
    pub auto_rotate_only_in_tablet_mode: bool,
}

impl OutputControl {
    fn new(output: &Output) -> Self {
        Self {
            id: output.hash.clone(),
            name: output.name.clone(),
            auto_rotate: DEFAULT_AUTO_ROTATE,
            auto_rotate_only_in_tablet_mode: DEFAULT_AUTO_ROTATE_ONLY_IN_TABLET_MODE,
        }
    }

    fn matches(&self, output: &Output) -> bool {
        self.id == output.hash && self.name == output.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ControlFile {
    #[serde(default)]
    outputs: Vec<OutputControl>,
}

/// Control settings of one topology, bound to the file they came from
#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    path: PathBuf,
    outputs: Vec<OutputControl>,
}

impl ControlConfig {
    /// Load from `path`. Missing or corrupt files give an empty config.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<ControlFile>(&contents) {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt control file");
                    ControlFile::default()
                }
            },
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No control file");
                ControlFile::default()
            }
        };
        Self {
            path,
            outputs: file.outputs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[OutputControl] {
        &self.outputs
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create control directory {}", parent.display()))?;
        }
        let file = ControlFile {
            outputs: self.outputs.clone(),
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize control file")?;
        write_atomic(&self.path, &json)?;
        info!(path = %self.path.display(), "Control file saved");
        Ok(())
    }

    fn entry(&self, output: &Output) -> Option<&OutputControl> {
        self.outputs.iter().find(|c| c.matches(output))
    }

    fn entry_mut(&mut self, output: &Output) -> &mut OutputControl {
        let index = match self.outputs.iter().position(|c| c.matches(output)) {
            Some(index) => index,
            None => {
                self.outputs.push(OutputControl::new(output));
                self.outputs.len() - 1
            }
        };
        &mut self.outputs[index]
    }

    pub fn get_auto_rotate(&self, output: &Output) -> bool {
        self.entry(output).map_or(DEFAULT_AUTO_ROTATE, |c| c.auto_rotate)
    }

    pub fn set_auto_rotate(&mut self, output: &Output, value: bool) {
        self.entry_mut(output).auto_rotate = value;
    }

    pub fn get_auto_rotate_only_in_tablet_mode(&self, output: &Output) -> bool {
        self.entry(output)
            .map_or(DEFAULT_AUTO_ROTATE_ONLY_IN_TABLET_MODE, |c| c.auto_rotate_only_in_tablet_mode)
    }

    pub fn set_auto_rotate_only_in_tablet_mode(&mut self, output: &Output, value: bool) {
        self.entry_mut(output).auto_rotate_only_in_tablet_mode = value;
    }

    /// Some output of `config` wants to follow the orientation sensor
    pub fn auto_rotation_requested(&self, config: &LiveConfig) -> bool {
        config.outputs.iter().any(|o| self.get_auto_rotate(o))
    }

    /// Every panel of `config` has auto-rotate enabled. True without panels.
    pub fn all_panels_auto_rotate(&self, config: &LiveConfig) -> bool {
        config
            .outputs
            .iter()
            .filter(|o| o.output_type.is_panel())
            .all(|o| self.get_auto_rotate(o))
    }

    /// Set auto-rotate on every panel of `config` and write the file
    pub fn set_panels_auto_rotate(&mut self, config: &LiveConfig, value: bool) -> Result<()> {
        for output in config.outputs.iter().filter(|o| o.output_type.is_panel()) {
            if self.get_auto_rotate(output) != value {
                self.set_auto_rotate(output, value);
            }
        }
        self.save()
    }
}
