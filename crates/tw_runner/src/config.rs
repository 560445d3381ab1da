use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "runner.json";

/// Runner settings, read from `<game_dir>/runner.json` when present.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    #[serde(default = "default_main_script")]
    pub main_script: PathBuf,
    #[serde(default = "default_entry_function")]
    pub entry_function: String,
    #[serde(default = "default_resolution")]
    pub resolution: [u32; 2],
    #[serde(default = "default_assets_dir")]
    pub maps_dir: PathBuf,
    #[serde(default = "default_assets_dir")]
    pub tilesets_dir: PathBuf,
    #[serde(default = "default_framerate")]
    pub default_framerate: i32,
    /// Input replay fed to the keyboard one frame per engine tick.
    #[serde(default)]
    pub replay: Option<PathBuf>,
    /// Request exit after this many frames.
    #[serde(default)]
    pub max_frames: Option<u64>,
    /// PNG written with the last rendered frame when the game ends.
    #[serde(default)]
    pub screenshot: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            main_script: default_main_script(),
            entry_function: default_entry_function(),
            resolution: default_resolution(),
            maps_dir: default_assets_dir(),
            tilesets_dir: default_assets_dir(),
            default_framerate: default_framerate(),
            replay: None,
            max_frames: None,
            screenshot: None,
        }
    }
}

impl RunnerConfig {
    /// Make every relative path in the config relative to `game_dir`.
    pub fn resolved(mut self, game_dir: &Path) -> Self {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = game_dir.join(&*path);
            }
        };
        rebase(&mut self.main_script);
        rebase(&mut self.maps_dir);
        rebase(&mut self.tilesets_dir);
        if let Some(path) = self.replay.as_mut() {
            rebase(path);
        }
        if let Some(path) = self.screenshot.as_mut() {
            rebase(path);
        }
        self
    }
}

/// Load the config for `game_dir`. An explicit path must exist; the default
/// `runner.json` is optional.
pub fn load_config(game_dir: &Path, explicit: Option<&Path>) -> Result<RunnerConfig, String> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = game_dir.join(CONFIG_FILE_NAME);
            if !path.exists() {
                log::info!(
                    "No {} in {}, using defaults",
                    CONFIG_FILE_NAME,
                    game_dir.display()
                );
                return Ok(RunnerConfig::default().resolved(game_dir));
            }
            path
        }
    };

    let raw =
        fs::read_to_string(&path).map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let config: RunnerConfig = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse config JSON {}: {e}", path.display()))?;
    validate_config(&config)?;
    log::info!("Loaded runner config from {}", path.display());
    Ok(config.resolved(game_dir))
}

fn validate_config(config: &RunnerConfig) -> Result<(), String> {
    if config.resolution.contains(&0) {
        return Err(format!(
            "Config validation failed: resolution {}x{} must be non-zero",
            config.resolution[0], config.resolution[1]
        ));
    }
    if config.entry_function.trim().is_empty() {
        return Err("Config validation failed: entry_function is empty".to_string());
    }
    if config.main_script.as_os_str().is_empty() {
        return Err("Config validation failed: main_script is empty".to_string());
    }
    Ok(())
}

fn default_main_script() -> PathBuf {
    PathBuf::from("main.lua")
}

fn default_entry_function() -> String {
    "game".to_string()
}

const fn default_resolution() -> [u32; 2] {
    [320, 240]
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("maps")
}

const fn default_framerate() -> i32 {
    60
}
