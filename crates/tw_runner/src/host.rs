//! The runner's side of the engine contract.
//!
//! `HostContext` is the handle every Lua global closes over: the engine
//! behind one lock, and everything the host owns (persons, canvas, keys,
//! clock, request mailbox) behind another. The engine lock is held for the
//! whole of `MapEngine()`, so a script callback that finds it taken knows the
//! engine is busy and queues its request instead. The shared lock is only
//! ever held for short non-reentrant sections and never across a Lua call.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use glam::{IVec2, UVec2};
use image::Rgba;
use mlua::prelude::*;
use tw_core::input::{Key, KeyState};
use tw_core::time::{FramePacer, FramePacing};
use tw_engine::{
    AssetSource, EngineError, EngineRequest, EngineStatus, FrameTimer, Keyboard, MapEngine,
    PersonCommand, PersonId, PersonRegistry, PersonScriptKind, ScriptHost, TileDraw, TileSurface,
};
use tw_map::{MapError, TilesetLoader};

use crate::persons::PersonStore;
use crate::replay::ReplayPlayer;
use crate::surface::{Canvas, RtsTileset};

pub type Engine = MapEngine<RtsTileset, LuaFunction>;

const PERSON_MARKER_SIZE: u32 = 8;
const PERSON_MARKER_COLOR: Rgba<u8> = Rgba([255, 0, 255, 255]);

/// Host-owned state, shared between the engine's host view and Lua globals.
pub struct SharedState {
    pub persons: PersonStore<LuaFunction>,
    pub requests: Vec<EngineRequest<LuaFunction>>,
    /// Engine status as of the innermost running script call.
    pub status: EngineStatus,
    pub canvas: Canvas,
    pub keys: KeyState,
    pub pacer: FramePacer,
    pub replay: Option<ReplayPlayer>,
    pub max_frames: Option<u64>,
    pub frames_run: u64,
}

impl SharedState {
    pub fn new(resolution: UVec2) -> Self {
        Self {
            persons: PersonStore::new(),
            requests: Vec::new(),
            status: EngineStatus::default(),
            canvas: Canvas::new(resolution),
            keys: KeyState::new(),
            pacer: FramePacer::new(),
            replay: None,
            max_frames: None,
            frames_run: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssetPaths {
    pub maps_dir: PathBuf,
    pub tilesets_dir: PathBuf,
}

#[derive(Clone)]
pub struct HostContext {
    engine: Arc<Mutex<Engine>>,
    shared: Arc<Mutex<SharedState>>,
    assets: Arc<AssetPaths>,
    default_framerate: i32,
}

impl HostContext {
    pub fn new(shared: SharedState, assets: AssetPaths, default_framerate: i32) -> Self {
        Self {
            engine: Arc::new(Mutex::new(Engine::new())),
            shared: Arc::new(Mutex::new(shared)),
            assets: Arc::new(assets),
            default_framerate,
        }
    }

    pub fn default_framerate(&self) -> i32 {
        self.default_framerate
    }

    pub fn shared(&self) -> MutexGuard<'_, SharedState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The engine, unless a map engine session currently holds it.
    pub fn idle_engine(&self) -> Option<MutexGuard<'_, Engine>> {
        match self.engine.try_lock() {
            Ok(engine) => Some(engine),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Current engine status: live when idle, the callback snapshot when busy.
    pub fn status(&self) -> EngineStatus {
        match self.idle_engine() {
            Some(engine) => engine.status(),
            None => self.shared().status.clone(),
        }
    }

    /// Apply a request now if the engine is idle, otherwise queue it for the
    /// engine to pick up when the running callback returns.
    pub fn submit(
        &self,
        lua: &Lua,
        request: EngineRequest<LuaFunction>,
    ) -> Result<(), EngineError> {
        match self.idle_engine() {
            Some(mut engine) => {
                let mut host = LuaHost::new(lua, self.clone());
                engine.apply_request(&mut host, request)
            }
            None => {
                log::trace!("Engine busy, queueing {}", request.op());
                let mut shared = self.shared();
                shared.status.record_queued(&request);
                shared.requests.push(request);
                Ok(())
            }
        }
    }
}

/// Compile a Lua chunk into a callable script.
pub fn compile_chunk(lua: &Lua, name: &str, source: &str) -> Result<LuaFunction, EngineError> {
    lua.load(source)
        .set_name(name)
        .into_function()
        .map_err(|err| EngineError::Script(format!("{name}: {err}")))
}

/// The engine's view of the runner for the length of one engine call.
pub struct LuaHost<'lua> {
    lua: &'lua Lua,
    ctx: HostContext,
}

impl<'lua> LuaHost<'lua> {
    pub fn new(lua: &'lua Lua, ctx: HostContext) -> Self {
        Self { lua, ctx }
    }

    fn shared(&self) -> MutexGuard<'_, SharedState> {
        self.ctx.shared()
    }
}

impl AssetSource for LuaHost<'_> {
    fn read_map(&mut self, filename: &str) -> Result<Vec<u8>, MapError> {
        let path = self.ctx.assets.maps_dir.join(filename);
        fs::read(&path).map_err(|e| MapError::Resource(format!("{}: {e}", path.display())))
    }
}

impl TilesetLoader for LuaHost<'_> {
    type Tileset = RtsTileset;

    fn load_embedded(&mut self, reader: &mut dyn Read) -> Result<RtsTileset, MapError> {
        RtsTileset::read_from(reader)
    }

    fn load_file(&mut self, name: &str) -> Result<RtsTileset, MapError> {
        RtsTileset::load_from_path(&self.ctx.assets.tilesets_dir.join(name))
    }
}

impl ScriptHost for LuaHost<'_> {
    type Script = LuaFunction;

    fn compile_script(&mut self, name: &str, source: &str) -> Result<LuaFunction, EngineError> {
        compile_chunk(self.lua, name, source)
    }

    fn call_script(
        &mut self,
        script: &LuaFunction,
        status: &EngineStatus,
    ) -> Result<(), EngineError> {
        let (mut previous, queued_before) = {
            let mut shared = self.shared();
            let previous = std::mem::replace(&mut shared.status, status.clone());
            (previous, shared.requests.len())
        };
        let result = script.call::<()>(());
        // Requests raised by this call stay visible to an enclosing callback.
        let mut shared = self.shared();
        for request in shared.requests.iter().skip(queued_before) {
            previous.record_queued(request);
        }
        shared.status = previous;
        result.map_err(|err| EngineError::Script(err.to_string()))
    }

    fn take_requests(&mut self) -> Vec<EngineRequest<LuaFunction>> {
        std::mem::take(&mut self.shared().requests)
    }
}

impl PersonRegistry<LuaFunction> for LuaHost<'_> {
    fn create_person(
        &mut self,
        name: &str,
        spriteset: &str,
        persistent: bool,
    ) -> Result<PersonId, EngineError> {
        Ok(self.shared().persons.create(name, spriteset, persistent))
    }

    fn find_person(&self, name: &str) -> Option<PersonId> {
        self.shared().persons.find(name)
    }

    fn person_exists(&self, id: PersonId) -> bool {
        self.shared().persons.contains(id)
    }

    fn set_person_position(&mut self, id: PersonId, x: i32, y: i32, layer: i32) {
        self.shared().persons.set_position(id, x, y, layer);
    }

    fn person_position(&self, id: PersonId, _map_extent: IVec2) -> Option<IVec2> {
        self.shared().persons.position(id)
    }

    fn queue_command(&mut self, id: PersonId, command: PersonCommand) {
        self.shared().persons.queue_command(id, command);
    }

    fn set_person_script(
        &mut self,
        id: PersonId,
        kind: PersonScriptKind,
        script: Option<LuaFunction>,
    ) {
        self.shared().persons.set_script(id, kind, script);
    }

    fn update_persons(&mut self) {
        self.shared().persons.update();
    }

    fn render_persons(&mut self, offset: IVec2) {
        let mut shared = self.shared();
        let state = &mut *shared;
        let half = (PERSON_MARKER_SIZE / 2) as i32;
        for person in state.persons.iter() {
            state.canvas.fill_rect(
                person.position - offset - IVec2::splat(half),
                UVec2::splat(PERSON_MARKER_SIZE),
                PERSON_MARKER_COLOR,
            );
        }
    }

    fn reset_persons(&mut self, preserve: bool) -> Vec<LuaFunction> {
        self.shared().persons.reset(preserve)
    }
}

impl TileSurface<RtsTileset> for LuaHost<'_> {
    fn resolution(&self) -> UVec2 {
        self.shared().canvas.resolution()
    }

    fn draw_tiles(&mut self, tileset: &RtsTileset, draws: &[TileDraw]) {
        self.shared().canvas.draw_tiles(tileset, draws);
    }
}

impl Keyboard for LuaHost<'_> {
    fn is_key_down(&self, key: Key) -> bool {
        self.shared().keys.is_held(key)
    }
}

impl FrameTimer for LuaHost<'_> {
    fn begin_frame(&mut self, framerate: i32) -> Result<FramePacing, EngineError> {
        let mut shared = self.shared();
        let state = &mut *shared;
        if let Some(replay) = state.replay.as_mut() {
            let was_finished = replay.is_finished();
            state.keys.set_held(replay.next_frame().iter().copied());
            if !was_finished && replay.is_finished() {
                log::info!("Input replay finished, all keys released from now on");
            }
        }
        state.frames_run += 1;
        if state.max_frames == Some(state.frames_run) {
            log::info!("Frame budget of {} reached, exiting", state.frames_run);
            state.requests.push(EngineRequest::Exit);
        }
        Ok(state.pacer.begin_frame(framerate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_engine::EngineHost;

    fn context(max_frames: Option<u64>) -> HostContext {
        let mut shared = SharedState::new(UVec2::new(16, 16));
        shared.max_frames = max_frames;
        let assets = AssetPaths {
            maps_dir: std::env::temp_dir(),
            tilesets_dir: std::env::temp_dir(),
        };
        HostContext::new(shared, assets, 60)
    }

    fn assert_engine_host<H: EngineHost<RtsTileset>>(_: &H) {}

    #[test]
    fn lua_host_is_a_complete_engine_host() {
        let lua = Lua::new();
        let host = LuaHost::new(&lua, context(None));
        assert_engine_host(&host);
    }

    #[test]
    fn busy_engine_queues_requests_and_idle_engine_applies_them() {
        let lua = Lua::new();
        let ctx = context(None);
        ctx.submit(&lua, EngineRequest::SetFramerate(30)).unwrap();
        assert_eq!(ctx.status().framerate, 30);
        assert!(ctx.shared().requests.is_empty());

        let _busy = ctx.engine.lock().unwrap();
        ctx.submit(&lua, EngineRequest::SetFramerate(15)).unwrap();
        ctx.submit(&lua, EngineRequest::AttachInput("hero".into()))
            .unwrap();
        assert_eq!(ctx.shared().requests.len(), 2);
        assert_eq!(ctx.status().framerate, 15);
        assert_eq!(ctx.status().input_person.as_deref(), Some("hero"));
    }

    #[test]
    fn call_script_exposes_status_only_for_the_call() {
        let lua = Lua::new();
        let ctx = context(None);
        let seen = Arc::new(Mutex::new(None));
        let observer = {
            let ctx = ctx.clone();
            let seen = seen.clone();
            lua.create_function(move |_, ()| {
                *seen.lock().unwrap() = Some(ctx.shared().status.framerate);
                Ok(())
            })
            .unwrap()
        };
        let mut host = LuaHost::new(&lua, ctx.clone());
        let status = EngineStatus {
            framerate: 42,
            ..EngineStatus::default()
        };
        host.call_script(&observer, &status).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(42));
        assert_eq!(ctx.shared().status, EngineStatus::default());
    }

    #[test]
    fn lua_errors_become_script_errors() {
        let lua = Lua::new();
        let mut host = LuaHost::new(&lua, context(None));
        let script = host.compile_script("boom", "error('boom')").unwrap();
        let err = host
            .call_script(&script, &EngineStatus::default())
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("boom"));

        let err = host.compile_script("broken", "this is not lua").unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn frame_budget_queues_exit_once() {
        let lua = Lua::new();
        let mut host = LuaHost::new(&lua, context(Some(2)));
        host.begin_frame(0).unwrap();
        assert!(host.take_requests().is_empty());
        host.begin_frame(0).unwrap();
        let requests = host.take_requests();
        assert!(matches!(requests.as_slice(), [EngineRequest::Exit]));
        host.begin_frame(0).unwrap();
        assert!(host.take_requests().is_empty());
    }

    #[test]
    fn persons_are_drawn_as_markers_relative_to_the_view() {
        let lua = Lua::new();
        let mut host = LuaHost::new(&lua, context(None));
        let id = host.create_person("hero", "hero.rss", false).unwrap();
        host.set_person_position(id, 12, 12, 0);
        host.render_persons(IVec2::new(4, 4));
        let shared = host.shared();
        let image = shared.canvas.image();
        assert_eq!(*image.get_pixel(4, 4), PERSON_MARKER_COLOR);
        assert_eq!(*image.get_pixel(11, 11), PERSON_MARKER_COLOR);
        assert_ne!(*image.get_pixel(12, 12), PERSON_MARKER_COLOR);
    }
}
