//! Headless game runner: a Lua runtime with the map engine API, drawing into
//! an in-memory canvas and reading keys from an optional replay file.
//!
//! The game directory holds `main.lua`, an optional `runner.json`, and the
//! map and tileset files. The main script is executed and its entry function
//! called; games start the map engine from there with `MapEngine()`.

mod config;
mod host;
mod lua_bridge;
mod persons;
mod replay;
mod surface;

use std::path::PathBuf;

use glam::UVec2;

use config::load_config;
use host::{AssetPaths, HostContext, SharedState};
use lua_bridge::LuaBridge;
use replay::{load_replay_from_path, ReplayPlayer};

fn usage() -> String {
    "Usage: cargo run -p tw_runner -- <game_dir> [config.json]\nExample: cargo run -p tw_runner -- games/demo games/demo/replay_run.json".to_string()
}

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        return Err(usage());
    }
    let game_dir = PathBuf::from(&args[1]);
    let explicit_config = args.get(2).map(PathBuf::from);
    let config = load_config(&game_dir, explicit_config.as_deref())?;

    let resolution = UVec2::new(config.resolution[0], config.resolution[1]);
    let mut shared = SharedState::new(resolution);
    shared.max_frames = config.max_frames;
    if let Some(path) = &config.replay {
        let replay = load_replay_from_path(path)?;
        log::info!(
            "Replaying {} input frames from {}",
            replay.frames.len(),
            path.display()
        );
        shared.replay = Some(ReplayPlayer::new(&replay)?);
    }

    let assets = AssetPaths {
        maps_dir: config.maps_dir.clone(),
        tilesets_dir: config.tilesets_dir.clone(),
    };
    let ctx = HostContext::new(shared, assets, config.default_framerate);
    let bridge = LuaBridge::new(ctx)
        .map_err(|e| format!("Failed to setup Lua engine API: {e}"))?;

    log::info!(
        "Running {} ({}x{})",
        config.main_script.display(),
        resolution.x,
        resolution.y
    );
    let result = bridge.run_script(&config.main_script, &config.entry_function);

    if let Some(path) = &config.screenshot {
        bridge.context().shared().canvas.save_png(path)?;
        log::info!("Wrote screenshot to {}", path.display());
    }
    result
}
