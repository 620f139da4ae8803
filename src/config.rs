// src/config.rs

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::engine::{DEFAULT_SKIP_SECONDS, DEFAULT_VOLUME, EngineSettings, TrackSpec};

const DEFAULT_COLOR: &str = "#cccccc";

// One stem in the set
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackConfig {
    pub name: String,
    pub file: PathBuf,
    #[serde(default = "default_color")]
    pub color: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub tracks: Vec<TrackConfig>,
    #[serde(default = "default_volume")]
    pub track_volume: f32,
    #[serde(default = "default_volume")]
    pub master_volume: f32,
    #[serde(default = "default_skip")]
    pub skip_seconds: f64,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_volume() -> f32 {
    DEFAULT_VOLUME
}

fn default_skip() -> f64 {
    DEFAULT_SKIP_SECONDS
}

/// The built-in nine-stem arrangement, read from `audio/`.
const DEFAULT_STEMS: [(&str, &str, &str); 9] = [
    ("Violino 1", "audio/Violino 1.mp3", "#ff6b6b"),
    ("Violino 2", "audio/Violino 2.mp3", "#4ecdc4"),
    ("Violino 3", "audio/Violino 3.mp3", "#45b7d1"),
    ("Clarinete", "audio/Clarinete.mp3", "#96ceb4"),
    ("Cello", "audio/Cello.mp3", "#feca57"),
    ("Piano", "audio/Piano.mp3", "#ff9ff3"),
    ("Guitarra", "audio/Guitarra.mp3", "#54a0ff"),
    ("Baixo", "audio/Baixo.mp3", "#5f27cd"),
    ("Bateria", "audio/Bateria.mp3", "#00d2d3"),
];

impl Default for PlayerConfig {
    fn default() -> Self {
        Self::with_tracks(
            DEFAULT_STEMS
                .iter()
                .map(|(name, file, color)| TrackConfig {
                    name: name.to_string(),
                    file: PathBuf::from(file),
                    color: color.to_string(),
                })
                .collect(),
        )
    }
}

impl PlayerConfig {
    fn with_tracks(tracks: Vec<TrackConfig>) -> Self {
        Self {
            tracks,
            track_volume: DEFAULT_VOLUME,
            master_volume: DEFAULT_VOLUME,
            skip_seconds: DEFAULT_SKIP_SECONDS,
        }
    }

    pub fn load_from_disk(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening config {}", path.display()))?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// One track per file, named after the file stem, default colours.
    pub fn from_files(paths: &[PathBuf]) -> Result<Self> {
        let tracks = paths
            .iter()
            .enumerate()
            .map(|(i, path)| TrackConfig {
                name: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("Track {}", i + 1)),
                file: path.clone(),
                color: DEFAULT_STEMS[i % DEFAULT_STEMS.len()].2.to_string(),
            })
            .collect();
        let config = Self::with_tracks(tracks);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tracks.is_empty() {
            bail!("configuration lists no tracks");
        }
        if !(0.0..=1.0).contains(&self.track_volume) || !(0.0..=1.0).contains(&self.master_volume) {
            bail!(
                "volumes must be within 0..=1 (track {}, master {})",
                self.track_volume,
                self.master_volume
            );
        }
        if !self.skip_seconds.is_finite() || self.skip_seconds <= 0.0 {
            bail!("skip_seconds must be positive, got {}", self.skip_seconds);
        }
        Ok(())
    }

    /// Relative track paths resolve against `base` (the config file's directory).
    pub fn resolve_paths(&mut self, base: &Path) {
        for track in &mut self.tracks {
            if track.file.is_relative() {
                track.file = base.join(&track.file);
            }
        }
    }

    pub fn track_specs(&self) -> Vec<TrackSpec> {
        self.tracks
            .iter()
            .map(|t| TrackSpec {
                name: t.name.clone(),
                source: t.file.clone(),
                color: t.color.clone(),
            })
            .collect()
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            track_volume: self.track_volume,
            master_volume: self.master_volume,
        }
    }
}
