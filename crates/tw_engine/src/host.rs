//! Everything the map engine needs from the outside world.
//!
//! The engine owns the map, the loop state and the callback registry. Scripts,
//! persons, pixels, keys and the clock belong to the host, which implements
//! these traits. `EngineHost` is implemented for anything that provides all of
//! them.

use std::fmt;

use glam::{IVec2, UVec2};
use tw_core::input::Key;
use tw_core::time::FramePacing;
use tw_map::{MapError, Tileset, TilesetLoader};

use crate::error::EngineError;
use crate::request::{EngineRequest, EngineStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PersonId(pub u32);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub fn delta(self) -> IVec2 {
        match self {
            Self::North => IVec2::new(0, -1),
            Self::East => IVec2::new(1, 0),
            Self::South => IVec2::new(0, 1),
            Self::West => IVec2::new(-1, 0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonCommand {
    Face(Direction),
    Move(Direction),
}

/// Script slots every person carries, in map-file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersonScriptKind {
    Create,
    Destroy,
    Touch,
    Talk,
    Command,
}

impl PersonScriptKind {
    pub const ALL: [PersonScriptKind; 5] = [
        Self::Create,
        Self::Destroy,
        Self::Touch,
        Self::Talk,
        Self::Command,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Destroy => "destroy",
            Self::Touch => "touch",
            Self::Talk => "talk",
            Self::Command => "command",
        }
    }
}

/// One tile to draw: layer index, target pixel position and tile index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileDraw {
    pub layer: usize,
    pub x: i32,
    pub y: i32,
    pub tile: i32,
}

pub trait AssetSource {
    /// Raw bytes of a map file, `filename` relative to the maps directory.
    fn read_map(&mut self, filename: &str) -> Result<Vec<u8>, MapError>;
}

pub trait ScriptHost {
    type Script: Clone;

    fn compile_script(&mut self, name: &str, source: &str) -> Result<Self::Script, EngineError>;

    /// Run a script. `status` describes the engine as it was just before the
    /// call; the engine itself is busy for the duration.
    fn call_script(
        &mut self,
        script: &Self::Script,
        status: &EngineStatus,
    ) -> Result<(), EngineError>;

    /// Requests scripts raised while the engine was busy, oldest first.
    fn take_requests(&mut self) -> Vec<EngineRequest<Self::Script>>;
}

pub trait PersonRegistry<S> {
    fn create_person(
        &mut self,
        name: &str,
        spriteset: &str,
        persistent: bool,
    ) -> Result<PersonId, EngineError>;

    fn find_person(&self, name: &str) -> Option<PersonId>;

    fn person_exists(&self, id: PersonId) -> bool;

    fn set_person_position(&mut self, id: PersonId, x: i32, y: i32, layer: i32);

    /// Position of a person, given the map's pixel extent so the registry can
    /// apply its own edge handling.
    fn person_position(&self, id: PersonId, map_extent: IVec2) -> Option<IVec2>;

    fn queue_command(&mut self, id: PersonId, command: PersonCommand);

    fn set_person_script(&mut self, id: PersonId, kind: PersonScriptKind, script: Option<S>);

    /// Advance every live person by one tick.
    fn update_persons(&mut self);

    fn render_persons(&mut self, offset: IVec2);

    /// Clear the registry for a new map. Persistent persons always stay;
    /// `preserve` keeps everyone. Returns the destroy scripts of the removed
    /// persons for the caller to run.
    fn reset_persons(&mut self, preserve: bool) -> Vec<S>;
}

pub trait TileSurface<T> {
    fn resolution(&self) -> UVec2;

    fn draw_tiles(&mut self, tileset: &T, draws: &[TileDraw]);
}

pub trait Keyboard {
    fn is_key_down(&self, key: Key) -> bool;
}

pub trait FrameTimer {
    fn begin_frame(&mut self, framerate: i32) -> Result<FramePacing, EngineError>;
}

pub trait EngineHost<T: Tileset>:
    AssetSource
    + TilesetLoader<Tileset = T>
    + ScriptHost
    + PersonRegistry<<Self as ScriptHost>::Script>
    + TileSurface<T>
    + Keyboard
    + FrameTimer
{
}

impl<T, H> EngineHost<T> for H
where
    T: Tileset,
    H: AssetSource
        + TilesetLoader<Tileset = T>
        + ScriptHost
        + PersonRegistry<<H as ScriptHost>::Script>
        + TileSurface<T>
        + Keyboard
        + FrameTimer,
{
}
