//! Raw key state as seen by the map engine.
//!
//! The engine only ever asks "is this key down right now" (level-triggered).
//! Who feeds the state is up to the host: a window backend calls
//! `key_down`/`key_up` as events arrive, the headless runner replaces the
//! whole held set once per tick from a replay file.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Right,
    Down,
    Left,
    Escape,
    Space,
}

impl Key {
    pub const ALL: &'static [Key] = &[
        Key::Up,
        Key::Right,
        Key::Down,
        Key::Left,
        Key::Escape,
        Key::Space,
    ];

    /// Lowercase name used by replay files and script-facing APIs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Right => "right",
            Self::Down => "down",
            Self::Left => "left",
            Self::Escape => "escape",
            Self::Space => "space",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeyState {
    held: HashSet<Key>,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, key: Key) {
        self.held.insert(key);
    }

    pub fn key_up(&mut self, key: Key) {
        self.held.remove(&key);
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    /// Replace the held set wholesale (one replay frame).
    pub fn set_held<I: IntoIterator<Item = Key>>(&mut self, keys: I) {
        self.held.clear();
        self.held.extend(keys);
    }

    pub fn release_all(&mut self) {
        self.held.clear();
    }
}
