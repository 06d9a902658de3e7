//! File backed display backend
//!
//! The live configuration is a JSON-serialized [`LiveConfig`]. Applying a
//! configuration rewrites the file, so the next `get` observes it.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::daemon::Backend;
use crate::output::LiveConfig;
use crate::store::write_atomic;

#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<LiveConfig> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read live configuration {}", self.path.display()))?;
        let config: LiveConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse live configuration {}", self.path.display()))?;
        debug!(path = %self.path.display(), outputs = config.outputs.len(), "Read live configuration");
        Ok(config)
    }

    pub fn write(&self, config: &LiveConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config).context("Failed to serialize live configuration")?;
        write_atomic(&self.path, &json)?;
        info!(path = %self.path.display(), "Wrote live configuration");
        Ok(())
    }
}

impl Backend for FileBackend {
    fn get(&self) -> oneshot::Receiver<Result<LiveConfig>> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(self.read());
        rx
    }

    fn set(&self, config: LiveConfig) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(self.write(&config));
        rx
    }

    fn can_apply(&self, config: &LiveConfig) -> bool {
        config.is_consistent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Mode, Output};
    use crate::types::Rotation;
    use tempfile::TempDir;

    #[test]
    fn test_parse_live_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("live.json");
        fs::write(
            &path,
            r#"{
                "outputs": [{
                    "id": 1, "hash": "abc", "name": "eDP-1", "type": "panel",
                    "enabled": true, "rotation": 4,
                    "modes": [{"id": "m", "size": {"width": 1920, "height": 1080}, "refresh": 60.0}],
                    "mode": "m"
                }],
                "features": {"auto_rotation": true}
            }"#,
        )
        .unwrap();

        let config = FileBackend::new(&path).read().unwrap();
        let output = &config.outputs[0];
        assert!(output.output_type.is_panel());
        assert!(output.connected);
        assert_eq!(output.rotation, Rotation::Inverted);
        assert_eq!(output.scale, 1.0);
        assert!(config.features.auto_rotation);
        assert!(!config.features.tablet_mode);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("live.json"));
        let mut output = Output::new(3, "h", "DP-2");
        output.modes.push(Mode::new("m", 2560, 1440, 144.0));
        output.mode = Some("m".to_string());
        let config = LiveConfig::new(vec![output]);

        backend.set(config.clone()).await.unwrap().unwrap();
        let read = backend.get().await.unwrap().unwrap();
        assert_eq!(read, config);
        assert!(backend.can_apply(&read));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("absent.json"));
        assert!(backend.get().await.unwrap().is_err());
    }
}
