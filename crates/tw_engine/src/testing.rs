//! Scripted stand-in for every host seam, recording what the engine asks of it.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Read;

use glam::{IVec2, UVec2};
use tw_core::input::Key;
use tw_core::time::FramePacing;
use tw_map::builder::MapBuilder;
use tw_map::{MapError, Tileset, TilesetLoader};

use crate::error::EngineError;
use crate::host::{
    AssetSource, FrameTimer, Keyboard, PersonCommand, PersonId, PersonRegistry, PersonScriptKind,
    ScriptHost, TileDraw, TileSurface,
};
use crate::request::{EngineRequest, EngineStatus};

pub(crate) const TILE: u16 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MockTileset {
    pub size: (i32, i32),
}

impl Tileset for MockTileset {
    fn tile_size(&self) -> (i32, i32) {
        self.size
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockPerson {
    pub id: PersonId,
    pub name: String,
    pub spriteset: String,
    pub position: IVec2,
    pub layer: i32,
    pub persistent: bool,
    pub scripts: [Option<usize>; 5],
    queued: Vec<PersonCommand>,
}

pub(crate) struct MockHost {
    pub maps: HashMap<String, Vec<u8>>,
    pub tileset_files: HashMap<String, (i32, i32)>,

    /// Source text of every compiled script; a script handle is its index.
    pub sources: Vec<String>,
    /// Source text of every script call, in order.
    pub calls: Vec<String>,
    /// Status handed to each script call.
    pub statuses: Vec<EngineStatus>,
    /// Requests a script raises when called, keyed by its source text.
    pub reactions: HashMap<String, Vec<EngineRequest<usize>>>,
    pending: Vec<EngineRequest<usize>>,

    pub persons: Vec<MockPerson>,
    next_person: u32,
    pub commands: Vec<(PersonId, PersonCommand)>,
    pub person_updates: u32,
    /// Map extent passed with each position query.
    pub position_extents: RefCell<Vec<IVec2>>,

    pub resolution: UVec2,
    pub tile_batches: Vec<Vec<TileDraw>>,
    pub person_renders: Vec<IVec2>,

    pub keys: HashSet<Key>,
    pub pacing: VecDeque<FramePacing>,
    pub framerates: Vec<i32>,
    pub timer_failure: Option<String>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            maps: HashMap::new(),
            tileset_files: HashMap::new(),
            sources: Vec::new(),
            calls: Vec::new(),
            statuses: Vec::new(),
            reactions: HashMap::new(),
            pending: Vec::new(),
            persons: Vec::new(),
            next_person: 1,
            commands: Vec::new(),
            person_updates: 0,
            position_extents: RefCell::new(Vec::new()),
            resolution: UVec2::new(64, 48),
            tile_batches: Vec::new(),
            person_renders: Vec::new(),
            keys: HashSet::new(),
            pacing: VecDeque::new(),
            framerates: Vec::new(),
            timer_failure: None,
        }
    }

    /// Register `builder` as map `filename`, with a 16x16 embedded tileset.
    pub fn add_map(&mut self, filename: &str, builder: MapBuilder) {
        let mut tileset = TILE.to_le_bytes().to_vec();
        tileset.extend_from_slice(&TILE.to_le_bytes());
        self.maps
            .insert(filename.to_string(), builder.embedded_tileset(tileset).build());
    }

    pub fn react(&mut self, source: &str, requests: Vec<EngineRequest<usize>>) {
        self.reactions.insert(source.to_string(), requests);
    }

    pub fn compile(&mut self, source: &str) -> usize {
        self.sources.push(source.to_string());
        self.sources.len() - 1
    }

    pub fn person(&self, name: &str) -> Option<&MockPerson> {
        self.persons.iter().find(|p| p.name == name)
    }

    pub fn move_person(&mut self, name: &str, position: IVec2) {
        if let Some(person) = self.persons.iter_mut().find(|p| p.name == name) {
            person.position = position;
        }
    }

    pub fn calls_of(&self, source: &str) -> usize {
        self.calls.iter().filter(|call| *call == source).count()
    }

    fn person_mut(&mut self, id: PersonId) -> Option<&mut MockPerson> {
        self.persons.iter_mut().find(|p| p.id == id)
    }
}

impl AssetSource for MockHost {
    fn read_map(&mut self, filename: &str) -> Result<Vec<u8>, MapError> {
        self.maps
            .get(filename)
            .cloned()
            .ok_or_else(|| MapError::Resource(format!("map '{filename}' not found")))
    }
}

impl TilesetLoader for MockHost {
    type Tileset = MockTileset;

    fn load_embedded(&mut self, stream: &mut dyn Read) -> Result<MockTileset, MapError> {
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf)?;
        Ok(MockTileset {
            size: (
                u16::from_le_bytes([buf[0], buf[1]]).into(),
                u16::from_le_bytes([buf[2], buf[3]]).into(),
            ),
        })
    }

    fn load_file(&mut self, name: &str) -> Result<MockTileset, MapError> {
        self.tileset_files
            .get(name)
            .map(|&size| MockTileset { size })
            .ok_or_else(|| MapError::Resource(format!("tileset '{name}' not found")))
    }
}

impl ScriptHost for MockHost {
    type Script = usize;

    fn compile_script(&mut self, name: &str, source: &str) -> Result<usize, EngineError> {
        if source.contains("syntax error") {
            return Err(EngineError::Script(format!("{name}: syntax error")));
        }
        Ok(self.compile(source))
    }

    fn call_script(&mut self, script: &usize, status: &EngineStatus) -> Result<(), EngineError> {
        let source = self.sources[*script].clone();
        self.calls.push(source.clone());
        self.statuses.push(status.clone());
        if source == "fail" {
            return Err(EngineError::Script("fail: runtime error".into()));
        }
        if let Some(requests) = self.reactions.get(&source) {
            self.pending.extend(requests.iter().cloned());
        }
        Ok(())
    }

    fn take_requests(&mut self) -> Vec<EngineRequest<usize>> {
        std::mem::take(&mut self.pending)
    }
}

impl PersonRegistry<usize> for MockHost {
    fn create_person(
        &mut self,
        name: &str,
        spriteset: &str,
        persistent: bool,
    ) -> Result<PersonId, EngineError> {
        let id = PersonId(self.next_person);
        self.next_person += 1;
        self.persons.push(MockPerson {
            id,
            name: name.to_string(),
            spriteset: spriteset.to_string(),
            position: IVec2::ZERO,
            layer: 0,
            persistent,
            scripts: Default::default(),
            queued: Vec::new(),
        });
        Ok(id)
    }

    fn find_person(&self, name: &str) -> Option<PersonId> {
        self.person(name).map(|p| p.id)
    }

    fn person_exists(&self, id: PersonId) -> bool {
        self.persons.iter().any(|p| p.id == id)
    }

    fn set_person_position(&mut self, id: PersonId, x: i32, y: i32, layer: i32) {
        if let Some(person) = self.person_mut(id) {
            person.position = IVec2::new(x, y);
            person.layer = layer;
        }
    }

    fn person_position(&self, id: PersonId, map_extent: IVec2) -> Option<IVec2> {
        self.position_extents.borrow_mut().push(map_extent);
        self.persons.iter().find(|p| p.id == id).map(|p| p.position)
    }

    fn queue_command(&mut self, id: PersonId, command: PersonCommand) {
        self.commands.push((id, command));
        if let Some(person) = self.person_mut(id) {
            person.queued.push(command);
        }
    }

    fn set_person_script(&mut self, id: PersonId, kind: PersonScriptKind, script: Option<usize>) {
        if let Some(person) = self.person_mut(id) {
            person.scripts[kind.index()] = script;
        }
    }

    fn update_persons(&mut self) {
        self.person_updates += 1;
        for person in &mut self.persons {
            for command in person.queued.drain(..) {
                if let PersonCommand::Move(direction) = command {
                    person.position += direction.delta();
                }
            }
        }
    }

    fn render_persons(&mut self, offset: IVec2) {
        self.person_renders.push(offset);
    }

    fn reset_persons(&mut self, preserve: bool) -> Vec<usize> {
        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.persons)
            .into_iter()
            .partition(|p| preserve || p.persistent);
        self.persons = kept;
        removed
            .into_iter()
            .filter_map(|p| p.scripts[PersonScriptKind::Destroy.index()])
            .collect()
    }
}

impl TileSurface<MockTileset> for MockHost {
    fn resolution(&self) -> UVec2 {
        self.resolution
    }

    fn draw_tiles(&mut self, _tileset: &MockTileset, draws: &[TileDraw]) {
        self.tile_batches.push(draws.to_vec());
    }
}

impl Keyboard for MockHost {
    fn is_key_down(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }
}

impl FrameTimer for MockHost {
    fn begin_frame(&mut self, framerate: i32) -> Result<FramePacing, EngineError> {
        self.framerates.push(framerate);
        if let Some(message) = &self.timer_failure {
            return Err(EngineError::Frame(message.clone()));
        }
        Ok(self.pacing.pop_front().unwrap_or(FramePacing::Render))
    }
}
