//! Recorded keyboard input, replayed one frame per engine tick.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tw_core::input::Key;

#[derive(Debug, Deserialize, Clone)]
pub struct ReplaySequence {
    pub frames: Vec<ReplayFrame>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplayFrame {
    /// Key names held during this frame (`"up"`, `"left"`, `"space"`, ...).
    #[serde(default)]
    pub held: Vec<String>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

impl ReplaySequence {
    /// One held-key set per tick.
    pub fn expanded_inputs(&self) -> Result<Vec<Vec<Key>>, String> {
        let mut out = Vec::new();
        for (index, frame) in self.frames.iter().enumerate() {
            let keys = frame
                .held
                .iter()
                .map(|name| {
                    Key::from_name(name)
                        .ok_or_else(|| format!("Replay frame {index}: unknown key '{name}'"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            for _ in 0..frame.repeat.max(1) {
                out.push(keys.clone());
            }
        }
        Ok(out)
    }
}

pub fn load_replay_from_path(path: &Path) -> Result<ReplaySequence, String> {
    let raw =
        fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let replay: ReplaySequence = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse replay JSON {}: {e}", path.display()))?;
    validate_replay(&replay)?;
    Ok(replay)
}

fn validate_replay(replay: &ReplaySequence) -> Result<(), String> {
    if replay.frames.is_empty() {
        return Err("Replay validation failed: frames list is empty".to_string());
    }
    replay
        .expanded_inputs()
        .map(|_| ())
        .map_err(|e| format!("Replay validation failed: {e}"))
}

const fn default_repeat() -> u32 {
    1
}

/// Cursor over an expanded replay. Once exhausted every key reads as released.
#[derive(Debug, Clone, Default)]
pub struct ReplayPlayer {
    frames: Vec<Vec<Key>>,
    cursor: usize,
}

impl ReplayPlayer {
    pub fn new(replay: &ReplaySequence) -> Result<Self, String> {
        Ok(Self {
            frames: replay.expanded_inputs()?,
            cursor: 0,
        })
    }

    /// Keys held for the next tick.
    pub fn next_frame(&mut self) -> &[Key] {
        let frame = self.frames.get(self.cursor).map_or(&[][..], Vec::as_slice);
        self.cursor += 1;
        frame
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.frames.len()
    }
}
