//! On-disk record types
//!
//! Topology files hold a JSON array of [`StoredOutputRecord`]; global files hold
//! one [`GlobalOutputRecord`]. Missing optional keys deserialize to defaults so
//! older or hand-written files still load.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::output::{Mode, Output};
use crate::types::{Position, Rect, Rotation, Size};

/// Display metadata used to tell identical hardware apart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Metadata {
    pub fn from_output(output: &Output) -> Self {
        Self {
            name: output.name.clone(),
            description: output.description.clone(),
        }
    }
}

/// Mode descriptor; ids are not stable so only size and refresh are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeInfo {
    pub refresh: f64,
    pub size: Size,
}

impl From<&Mode> for ModeInfo {
    fn from(mode: &Mode) -> Self {
        Self {
            refresh: mode.refresh,
            size: mode.size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOutputRecord {
    /// Output identity hash
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ModeInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<Position>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub primary: bool,
}

impl StoredOutputRecord {
    /// Build a record from the live state of `output`.
    ///
    /// A disabled output has no meaningful mode or position of its own, so those
    /// are carried over from `previous`, the output's record in the snapshot
    /// being replaced.
    pub fn from_output(output: &Output, previous: Option<&StoredOutputRecord>) -> Self {
        let live_mode = output.current_mode().filter(|_| output.enabled).map(ModeInfo::from);
        let mode = live_mode.or_else(|| previous.and_then(|p| p.mode));
        let pos = if output.enabled {
            Some(output.position)
        } else {
            previous.and_then(|p| p.pos)
        };

        Self {
            id: output.hash.clone(),
            metadata: Metadata::from_output(output),
            rotation: output.rotation,
            scale: Some(output.scale),
            mode: mode.filter(|m| m.refresh >= 0.0 && m.size.is_valid()),
            pos,
            enabled: output.enabled,
            primary: output.primary,
        }
    }

    /// Stored logical rectangle. None without a position or a usable mode, or
    /// when the rectangle does not fit the coordinate space.
    pub fn rect(&self) -> Option<Rect> {
        let pos = self.pos?;
        let mode = self.mode.filter(|m| m.size.is_valid())?;
        let scale = self.scale.unwrap_or(1.0);
        if !(scale > 0.0 && scale.is_finite()) {
            return None;
        }
        let longest_side = mode.size.width.max(mode.size.height) as f64 / scale;
        if longest_side >= i32::MAX as f64 {
            return None;
        }
        let size = mode.size.logical(scale, self.rotation);
        if !size.is_valid() {
            return None;
        }
        pos.x.checked_add(size.width)?;
        pos.y.checked_add(size.height)?;
        Some(Rect::new(pos, size))
    }
}

/// Ordered records of one topology
#[derive(Debug, Clone, PartialEq)]
pub struct TopologySnapshot {
    /// Topology id the snapshot was read from, or the fixed override name
    pub id: String,
    pub records: Vec<StoredOutputRecord>,
}

impl TopologySnapshot {
    pub fn record(&self, hash: &str) -> Option<&StoredOutputRecord> {
        self.records.iter().find(|r| r.id == hash)
    }
}

/// Per-output preferences shared across topologies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalOutputRecord {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ModeInfo>,
    /// Keys written by other tools, kept on rewrite
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GlobalOutputRecord {
    /// Global part of an enabled output with a mode; None otherwise
    pub fn from_output(output: &Output) -> Option<Self> {
        if !output.enabled {
            return None;
        }
        let mode = output.current_mode().map(ModeInfo::from)?;
        if mode.refresh < 0.0 || !mode.size.is_valid() {
            return None;
        }
        Some(Self {
            id: output.hash.clone(),
            metadata: Metadata::from_output(output),
            rotation: output.rotation,
            mode: Some(mode),
            extra: Map::new(),
        })
    }

    /// Overwrite the fields owned by the engine, keeping anything else
    pub fn merge_into(self, mut existing: GlobalOutputRecord) -> GlobalOutputRecord {
        existing.id = self.id;
        existing.metadata = self.metadata;
        existing.rotation = self.rotation;
        existing.mode = self.mode;
        existing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_output() -> Output {
        let mut output = Output::new(1, "abc", "DP-1");
        output.description = "Dell U2720Q".to_string();
        output.modes.push(Mode::new("m1", 2560, 1440, 59.951));
        output.mode = Some("m1".to_string());
        output.position = Position::new(1920, 0);
        output.rotation = Rotation::Left;
        output
    }

    #[test]
    fn test_parse_file_format() {
        let json = r#"[{
            "id": "abc",
            "metadata": {"name": "DP-1", "description": "Dell"},
            "rotation": 8,
            "mode": {"refresh": 59.95000076293945, "size": {"width": 2560, "height": 1440}},
            "pos": {"x": 1920, "y": -100},
            "enabled": true,
            "primary": false
        }]"#;
        let records: Vec<StoredOutputRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.rotation, Rotation::Right);
        assert_eq!(r.pos, Some(Position::new(1920, -100)));
        assert_eq!(r.mode.unwrap().size, Size::new(2560, 1440));
        assert_eq!(r.scale, None);
        assert!(r.enabled);
    }

    #[test]
    fn test_missing_id_is_corrupt() {
        let json = r#"[{"metadata": {"name": "DP-1"}, "rotation": 1}]"#;
        assert!(serde_json::from_str::<Vec<StoredOutputRecord>>(json).is_err());
    }

    #[test]
    fn test_minimal_record_uses_defaults() {
        let record: StoredOutputRecord = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert_eq!(record.rotation, Rotation::None);
        assert_eq!(record.mode, None);
        assert_eq!(record.pos, None);
        assert!(!record.enabled);
        assert!(!record.primary);
        assert_eq!(record.rect(), None);
    }

    #[test]
    fn test_rect_outside_coordinate_space_is_unusable() {
        let mut record = StoredOutputRecord::from_output(&test_output(), None);
        record.pos = Some(Position::new(i32::MAX - 100, 0));
        assert_eq!(record.rect(), None);

        record.pos = Some(Position::new(0, 0));
        record.scale = Some(1e-300);
        assert_eq!(record.rect(), None, "logical size saturates");

        record.scale = Some(f64::NAN);
        assert_eq!(record.rect(), None);
    }

    #[test]
    fn test_record_from_enabled_output() {
        let output = test_output();
        let record = StoredOutputRecord::from_output(&output, None);
        assert_eq!(record.id, "abc");
        assert_eq!(record.metadata.name, "DP-1");
        assert_eq!(record.pos, Some(Position::new(1920, 0)));
        assert_eq!(record.mode.unwrap().size, Size::new(2560, 1440));
        assert_eq!(record.rect(), Some(Rect { x: 1920, y: 0, width: 1440, height: 2560 }));
    }

    #[test]
    fn test_disabled_output_carries_previous_position_and_mode() {
        let mut output = test_output();
        let previous = StoredOutputRecord::from_output(&output, None);

        output.enabled = false;
        output.position = Position::new(0, 0);
        output.mode = None;
        let record = StoredOutputRecord::from_output(&output, Some(&previous));
        assert!(!record.enabled);
        assert_eq!(record.pos, Some(Position::new(1920, 0)));
        assert_eq!(record.mode, previous.mode);

        let fresh = StoredOutputRecord::from_output(&output, None);
        assert_eq!(fresh.pos, None);
        assert_eq!(fresh.mode, None);
    }

    #[test]
    fn test_global_record_keeps_foreign_keys() {
        let existing: GlobalOutputRecord = serde_json::from_str(
            r#"{"id": "abc", "rotation": 1, "vrrpolicy": 2, "mode": {"refresh": 60.0, "size": {"width": 1920, "height": 1080}}}"#,
        )
        .unwrap();
        let update = GlobalOutputRecord::from_output(&test_output()).unwrap();
        let merged = update.merge_into(existing);
        assert_eq!(merged.rotation, Rotation::Left);
        assert_eq!(merged.mode.unwrap().size, Size::new(2560, 1440));

        let json = serde_json::to_value(&merged).unwrap();
        assert_eq!(json["vrrpolicy"], 2);
        assert!(json.get("pos").is_none());
        assert!(json.get("enabled").is_none());
    }

    #[test]
    fn test_global_record_needs_enabled_output_with_mode() {
        let mut output = test_output();
        output.enabled = false;
        assert!(GlobalOutputRecord::from_output(&output).is_none());

        output.enabled = true;
        output.mode = None;
        assert!(GlobalOutputRecord::from_output(&output).is_none());
    }
}
