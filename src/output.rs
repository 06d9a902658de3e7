//! Live output model as reported by the display backend
//!
//! The backend owns enumeration; the engine only rewrites layout fields
//! (position, mode, rotation, enabled, primary) and never an output's identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::store::TOPOLOGY_ID_BYTES;
use crate::types::{Position, Rect, Rotation, Size};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mode {
    pub id: String,
    pub size: Size,
    pub refresh: f64,
}

impl Mode {
    pub fn new(id: impl Into<String>, width: i32, height: i32, refresh: f64) -> Self {
        Self {
            id: id.into(),
            size: Size::new(width, height),
            refresh,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    #[default]
    Unknown,
    /// Built-in laptop or tablet panel
    Panel,
    Vga,
    Dvi,
    Hdmi,
    DisplayPort,
    Tv,
}

impl OutputType {
    pub fn is_panel(&self) -> bool {
        matches!(self, OutputType::Panel)
    }
}

/// Whether an output shares its rotation and mode across topologies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    #[default]
    Global,
    Individual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Backend id, only meaningful within one configuration
    pub id: u32,
    /// Stable identity across reconnects, not unique for identical hardware
    pub hash: String,
    /// Connector name, e.g. "eDP-1"
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub output_type: OutputType,
    #[serde(default = "default_true")]
    pub connected: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub modes: Vec<Mode>,
    /// Id of the mode the output is set to
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub preferred_mode: Option<String>,
    #[serde(default)]
    pub retention: RetentionPolicy,
}

fn default_true() -> bool {
    true
}

fn default_scale() -> f64 {
    1.0
}

impl Output {
    pub fn new(id: u32, hash: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            hash: hash.into(),
            name: name.into(),
            description: String::new(),
            output_type: OutputType::Unknown,
            connected: true,
            enabled: true,
            primary: false,
            position: Position::default(),
            rotation: Rotation::None,
            scale: 1.0,
            modes: Vec::new(),
            mode: None,
            preferred_mode: None,
            retention: RetentionPolicy::Global,
        }
    }

    pub fn find_mode(&self, id: &str) -> Option<&Mode> {
        self.modes.iter().find(|m| m.id == id)
    }

    pub fn current_mode(&self) -> Option<&Mode> {
        self.mode.as_deref().and_then(|id| self.find_mode(id))
    }

    pub fn preferred(&self) -> Option<&Mode> {
        self.preferred_mode.as_deref().and_then(|id| self.find_mode(id))
    }

    /// Enabled and connected, so it occupies space in the layout
    pub fn is_positionable(&self) -> bool {
        self.connected && self.enabled
    }

    /// Logical geometry: position plus mode size adjusted by scale and rotation.
    /// An output without a mode has an empty rectangle at its position.
    pub fn geometry(&self) -> Rect {
        let size = self
            .current_mode()
            .map(|m| m.size.logical(self.scale, self.rotation))
            .unwrap_or_default();
        Rect::new(self.position, size)
    }
}

/// Capabilities reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub auto_rotation: bool,
    #[serde(default)]
    pub tablet_mode: bool,
}

/// One complete configuration: the arena of outputs plus device-wide state.
/// Outputs refer to each other only through their ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveConfig {
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub tablet_mode_engaged: bool,
    #[serde(default)]
    pub screen_size: Size,
}

impl LiveConfig {
    pub fn new(outputs: Vec<Output>) -> Self {
        Self {
            outputs,
            ..Default::default()
        }
    }

    pub fn output(&self, id: u32) -> Option<&Output> {
        self.outputs.iter().find(|o| o.id == id)
    }

    pub fn output_mut(&mut self, id: u32) -> Option<&mut Output> {
        self.outputs.iter_mut().find(|o| o.id == id)
    }

    pub fn connected_outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.iter().filter(|o| o.connected)
    }

    pub fn primary_output(&self) -> Option<&Output> {
        self.outputs.iter().find(|o| o.primary)
    }

    /// Mark one output primary and clear the flag everywhere else
    pub fn set_primary_output(&mut self, id: u32) {
        for output in &mut self.outputs {
            output.primary = output.id == id;
        }
    }

    /// Topology id: hash over the sorted set of connected output hashes.
    /// Empty when nothing is connected.
    pub fn topology_id(&self) -> String {
        topology_id(self.connected_outputs().map(|o| o.hash.as_str()))
    }

    /// Bounding size of all positionable outputs, anchored at the origin
    pub fn update_screen_size(&mut self) {
        self.screen_size = self
            .outputs
            .iter()
            .filter(|o| o.is_positionable())
            .fold(Size::default(), |size, o| o.geometry().united_extent(size));
    }

    /// Structural validity: every enabled output has a known mode, something
    /// is enabled and at most one output is primary.
    pub fn is_consistent(&self) -> bool {
        let enabled: Vec<&Output> = self.outputs.iter().filter(|o| o.is_positionable()).collect();
        if enabled.is_empty() {
            return false;
        }
        if enabled.iter().any(|o| o.current_mode().is_none()) {
            return false;
        }
        self.outputs.iter().filter(|o| o.primary).count() <= 1
    }
}

/// Hash of a multiset of output hashes; input order does not matter
pub fn topology_id<'a>(hashes: impl IntoIterator<Item = &'a str>) -> String {
    let mut hashes: Vec<&str> = hashes.into_iter().collect();
    if hashes.is_empty() {
        return String::new();
    }
    hashes.sort_unstable();

    let mut hasher = Sha256::new();
    for hash in hashes {
        hasher.update(hash.as_bytes());
        hasher.update([0u8]);
    }
    hasher.finalize()[..TOPOLOGY_ID_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
