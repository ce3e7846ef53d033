use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::models::SortMode;

/// Cross-run preferences: current sort mode and the picker's hidden-files
/// toggle. Loaded on start, saved on quit.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub sort: SortMode,
    #[serde(default)]
    pub show_hidden: bool,
}

impl Session {
    /// Missing or corrupt session files fall back to defaults.
    pub fn load() -> Self {
        let Ok(path) = session_path() else {
            return Self::default();
        };
        fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) -> Result<()> {
        let path = session_path()?;
        let raw = serde_json::to_string_pretty(self).context("failed to encode session state")?;
        fs::write(&path, raw).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

fn session_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "bucketscout", "bucket-scout")
        .context("could not determine a config directory")?;
    fs::create_dir_all(dirs.config_dir())
        .with_context(|| format!("failed to create {}", dirs.config_dir().display()))?;
    Ok(dirs.config_dir().join("session.json"))
}
