//! Orientation driven rotation of built-in panels

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::control::ControlConfig;
use crate::output::{Features, LiveConfig, Output};
use crate::types::Rotation;

/// Device orientation as reported by an accelerometer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    #[default]
    Undefined,
    TopUp,
    TopDown,
    LeftUp,
    RightUp,
    FaceUp,
    FaceDown,
}

impl Orientation {
    /// Readings that map to a rotation. Flat and unknown readings don't.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Orientation::Undefined | Orientation::FaceUp | Orientation::FaceDown)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Orientation::Undefined => "undefined",
            Orientation::TopUp => "top-up",
            Orientation::TopDown => "top-down",
            Orientation::LeftUp => "left-up",
            Orientation::RightUp => "right-up",
            Orientation::FaceUp => "face-up",
            Orientation::FaceDown => "face-down",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "undefined" => Ok(Orientation::Undefined),
            "top-up" => Ok(Orientation::TopUp),
            "top-down" => Ok(Orientation::TopDown),
            "left-up" => Ok(Orientation::LeftUp),
            "right-up" => Ok(Orientation::RightUp),
            "face-up" => Ok(Orientation::FaceUp),
            "face-down" => Ok(Orientation::FaceDown),
            other => Err(format!("Unknown orientation '{}'", other)),
        }
    }
}

pub fn orientation_to_rotation(orientation: Orientation, fallback: Rotation) -> Rotation {
    match orientation {
        Orientation::TopUp => Rotation::None,
        Orientation::TopDown => Rotation::Inverted,
        Orientation::LeftUp => Rotation::Right,
        Orientation::RightUp => Rotation::Left,
        Orientation::Undefined | Orientation::FaceUp | Orientation::FaceDown => fallback,
    }
}

/// Rotate `output` to follow `orientation`.
/// False for anything but a built-in panel, true otherwise even if nothing changed.
pub fn update_orientation(output: &mut Output, orientation: Orientation) -> bool {
    if !output.output_type.is_panel() {
        return false;
    }
    let rotation = orientation_to_rotation(orientation, output.rotation);
    if rotation != output.rotation {
        info!(output = %output.name, from = ?output.rotation, to = ?rotation, "Rotating panel");
        output.rotation = rotation;
    }
    true
}

/// Apply `orientation` to the first panel of `config` that has auto-rotate
/// enabled. Panels restricted to tablet mode stay upright outside of it.
/// Returns whether a panel took the orientation.
pub fn set_device_orientation(config: &mut LiveConfig, control: &ControlConfig, orientation: Orientation) -> bool {
    let tablet_mode = config.tablet_mode_engaged;
    for output in &mut config.outputs {
        if !control.get_auto_rotate(output) {
            continue;
        }
        let effective = if control.get_auto_rotate_only_in_tablet_mode(output) && !tablet_mode {
            Orientation::TopUp
        } else {
            orientation
        };
        if update_orientation(output, effective) {
            return true;
        }
    }
    false
}

/// Last known state of the orientation sensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrientationSensor {
    pub available: bool,
    pub enabled: bool,
    pub value: Orientation,
}

impl OrientationSensor {
    /// The reading to act on, if any.
    ///
    /// Requires a backend that supports both auto-rotation and tablet mode, an
    /// available and enabled sensor, and an actionable reading.
    pub fn reading(&self, features: Features) -> Option<Orientation> {
        if !(features.auto_rotation && features.tablet_mode) {
            return None;
        }
        if !self.available || !self.enabled {
            debug!(available = self.available, enabled = self.enabled, "Orientation sensor inactive");
            return None;
        }
        Some(self.value).filter(Orientation::is_actionable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputType;
    use tempfile::TempDir;

    fn panel(id: u32, hash: &str) -> Output {
        let mut output = Output::new(id, hash, format!("eDP-{id}"));
        output.output_type = OutputType::Panel;
        output
    }

    fn control(dir: &TempDir) -> ControlConfig {
        ControlConfig::load(dir.path().join("control.json"))
    }

    fn active_sensor(value: Orientation) -> OrientationSensor {
        OrientationSensor {
            available: true,
            enabled: true,
            value,
        }
    }

    const FULL: Features = Features {
        auto_rotation: true,
        tablet_mode: true,
    };

    #[test]
    fn test_orientation_mapping() {
        assert_eq!(orientation_to_rotation(Orientation::TopUp, Rotation::Left), Rotation::None);
        assert_eq!(orientation_to_rotation(Orientation::TopDown, Rotation::None), Rotation::Inverted);
        assert_eq!(orientation_to_rotation(Orientation::LeftUp, Rotation::None), Rotation::Right);
        assert_eq!(orientation_to_rotation(Orientation::RightUp, Rotation::None), Rotation::Left);
        assert_eq!(orientation_to_rotation(Orientation::FaceUp, Rotation::Right), Rotation::Right);
    }

    #[test]
    fn test_top_down_inverts_panel_in_tablet_mode() {
        let dir = TempDir::new().unwrap();
        let mut config = LiveConfig::new(vec![panel(1, "p")]);
        config.tablet_mode_engaged = true;

        assert!(set_device_orientation(&mut config, &control(&dir), Orientation::TopDown));
        assert_eq!(config.outputs[0].rotation, Rotation::Inverted);
    }

    #[test]
    fn test_tablet_only_panel_stays_upright_outside_tablet_mode() {
        let dir = TempDir::new().unwrap();
        let mut config = LiveConfig::new(vec![panel(1, "p")]);
        config.outputs[0].rotation = Rotation::Left;

        set_device_orientation(&mut config, &control(&dir), Orientation::TopDown);
        assert_eq!(config.outputs[0].rotation, Rotation::None);
    }

    #[test]
    fn test_tablet_restriction_can_be_lifted() {
        let dir = TempDir::new().unwrap();
        let mut control = control(&dir);
        let mut config = LiveConfig::new(vec![panel(1, "p")]);
        control.set_auto_rotate_only_in_tablet_mode(&config.outputs[0], false);

        set_device_orientation(&mut config, &control, Orientation::LeftUp);
        assert_eq!(config.outputs[0].rotation, Rotation::Right);
    }

    #[test]
    fn test_only_first_auto_rotating_panel_rotates() {
        let dir = TempDir::new().unwrap();
        let mut control = control(&dir);
        let external = Output::new(1, "ext", "DP-1");
        let mut config = LiveConfig::new(vec![external, panel(2, "a"), panel(3, "b")]);
        config.tablet_mode_engaged = true;
        control.set_auto_rotate(&config.outputs[1], false);

        assert!(set_device_orientation(&mut config, &control, Orientation::RightUp));
        assert_eq!(config.outputs[0].rotation, Rotation::None, "not a panel");
        assert_eq!(config.outputs[1].rotation, Rotation::None, "auto-rotate off");
        assert_eq!(config.outputs[2].rotation, Rotation::Left);
    }

    #[test]
    fn test_update_orientation_on_external_output() {
        let mut external = Output::new(1, "ext", "HDMI-1");
        assert!(!update_orientation(&mut external, Orientation::TopDown));
        assert_eq!(external.rotation, Rotation::None);

        let mut built_in = panel(2, "p");
        assert!(update_orientation(&mut built_in, Orientation::TopUp), "unchanged still counts");
    }

    #[test]
    fn test_sensor_gating() {
        assert_eq!(active_sensor(Orientation::TopDown).reading(FULL), Some(Orientation::TopDown));
        assert_eq!(active_sensor(Orientation::FaceUp).reading(FULL), None);
        assert_eq!(active_sensor(Orientation::Undefined).reading(FULL), None);

        let no_tablet = Features {
            auto_rotation: true,
            tablet_mode: false,
        };
        assert_eq!(active_sensor(Orientation::TopDown).reading(no_tablet), None);

        let mut disabled = active_sensor(Orientation::TopDown);
        disabled.enabled = false;
        assert_eq!(disabled.reading(FULL), None);
    }

    #[test]
    fn test_parse_orientation() {
        assert_eq!("left-up".parse::<Orientation>(), Ok(Orientation::LeftUp));
        assert_eq!(Orientation::FaceDown.to_string(), "face-down");
        assert!("sideways".parse::<Orientation>().is_err());
    }
}
