use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::services::crown_tracker::CrownSource;

#[derive(Debug, Clone, Deserialize)]
pub struct PresentationConfig {
    #[serde(default)]
    pub crown_source: CrownSource,
    #[serde(default = "default_pixels_per_point")]
    pub pixels_per_point: f32,
    #[serde(default = "default_deck_image_max_dimension")]
    pub deck_image_max_dimension: u32,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            crown_source: CrownSource::default(),
            pixels_per_point: default_pixels_per_point(),
            deck_image_max_dimension: default_deck_image_max_dimension(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    /// Directory shared by every overlay and admin process.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// Root containing `images/` and `images/school_logos/`.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
    /// Used when no match id is given.
    #[serde(default = "default_match_id")]
    pub default_match_id: String,
    /// How often the file store checks a match file for changes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Extra affiliation -> logo file entries, checked before the built-in table.
    #[serde(default)]
    pub school_logos: HashMap<String, String>,
    #[serde(default)]
    pub presentation: PresentationConfig,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            assets_dir: default_assets_dir(),
            default_match_id: default_match_id(),
            poll_interval_ms: default_poll_interval_ms(),
            school_logos: HashMap::new(),
            presentation: PresentationConfig::default(),
        }
    }
}

impl OverlayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    /// Empty or blank ids fall back to `default_match_id`.
    pub fn resolve_match_id(&self, raw: Option<&str>) -> String {
        raw.map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(self.default_match_id.as_str())
            .to_string()
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("match_store")
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_match_id() -> String {
    "default".to_string()
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_pixels_per_point() -> f32 {
    1.0
}

fn default_deck_image_max_dimension() -> u32 {
    256
}

pub fn load_overlay_config(config_path: &Path) -> Result<OverlayConfig, String> {
    if !config_path.exists() {
        info!(
            "config file not found, using defaults: {}",
            config_path.display()
        );
        return Ok(OverlayConfig::default());
    }

    let raw = fs::read_to_string(config_path).map_err(|err| {
        format!(
            "Failed to read config at {}: {}",
            config_path.display(),
            err
        )
    })?;

    toml::from_str::<OverlayConfig>(&raw).map_err(|err| {
        format!(
            "Failed to parse config at {}: {}",
            config_path.display(),
            err
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_overlay_config(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.default_match_id, "default");
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.presentation.crown_source, CrownSource::CumulativeScore);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
store_dir = "/srv/crcl"

[presentation]
crown_source = "per_game_scores"

[school_logos]
"UNIVERSITY A" = "a.png"
"#,
        )
        .unwrap();

        let config = load_overlay_config(&path).unwrap();
        assert_eq!(config.store_dir, PathBuf::from("/srv/crcl"));
        assert_eq!(config.assets_dir, PathBuf::from("public"));
        assert_eq!(config.presentation.crown_source, CrownSource::PerGameScores);
        assert_eq!(config.presentation.deck_image_max_dimension, 256);
        assert_eq!(config.school_logos.get("UNIVERSITY A").map(String::as_str), Some("a.png"));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "poll_interval_ms = \"fast\"").unwrap();
        let err = load_overlay_config(&path).unwrap_err();
        assert!(err.contains("Failed to parse config"));
    }

    #[test]
    fn blank_match_id_falls_back() {
        let config = OverlayConfig::default();
        assert_eq!(config.resolve_match_id(None), "default");
        assert_eq!(config.resolve_match_id(Some("  ")), "default");
        assert_eq!(config.resolve_match_id(Some(" match-7 ")), "match-7");
    }
}
