//! The map engine: one active map, a camera, an input person, and the
//! fixed-cadence loop that updates and renders them.
//!
//! `MapEngine` is an explicit state machine. `run` is the blocking form
//! (`start`, then `tick` until exit is requested, then `finish`); tests and
//! embedders can drive the same steps one at a time.
//!
//! Script callbacks run while the engine is busy. Whatever they request is
//! collected by the host and applied here once the callback returns, except
//! during a map switch, where requests wait until the switch has completed.

use glam::IVec2;
use tw_core::input::Key;
use tw_map::{decode_map, Map, MapError, MapOrigin, PersonSpawn, Tileset};

use crate::callbacks::{CallbackRegistry, MapScriptType};
use crate::error::EngineError;
use crate::host::{
    Direction, EngineHost, PersonCommand, PersonId, PersonRegistry, PersonScriptKind, ScriptHost,
};
use crate::request::{EngineRequest, EngineStatus};
use crate::viewport::Viewport;

/// Directional keys in the order they win when several are held.
const INPUT_PRIORITY: [(Key, Direction); 4] = [
    (Key::Up, Direction::North),
    (Key::Right, Direction::East),
    (Key::Down, Direction::South),
    (Key::Left, Direction::West),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
}

/// A person the camera or input is bound to. The name is kept for queries
/// and log messages; the id is what is checked against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Attachment {
    id: PersonId,
    name: String,
}

struct ActiveMap<T> {
    filename: String,
    map: Map<T>,
}

/// A decoded map with its scripts compiled, ready to swap in.
struct PreparedMap<T, S> {
    filename: String,
    map: Map<T>,
    entry: Option<S>,
    persons: Vec<(PersonSpawn, [Option<S>; 5])>,
}

pub struct MapEngine<T, S> {
    state: EngineState,
    exit_requested: bool,
    framerate: i32,
    frames: u64,
    active: Option<ActiveMap<T>>,
    camera: Option<Attachment>,
    input: Option<Attachment>,
    focus: IVec2,
    last_offset: IVec2,
    callbacks: CallbackRegistry<S>,
    switch_depth: u32,
}

impl<T, S> Default for MapEngine<T, S> {
    fn default() -> Self {
        Self {
            state: EngineState::Stopped,
            exit_requested: false,
            framerate: 0,
            frames: 0,
            active: None,
            camera: None,
            input: None,
            focus: IVec2::ZERO,
            last_offset: IVec2::ZERO,
            callbacks: CallbackRegistry::new(),
            switch_depth: 0,
        }
    }
}

impl<T: Tileset, S: Clone> MapEngine<T, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == EngineState::Running
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn framerate(&self) -> i32 {
        self.framerate
    }

    pub fn set_framerate(&mut self, framerate: i32) {
        self.framerate = framerate;
    }

    /// Ticks since the current map became active.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Map coordinate the camera is centred on.
    pub fn focus(&self) -> IVec2 {
        self.focus
    }

    /// Viewport offset used by the most recent render.
    pub fn last_offset(&self) -> IVec2 {
        self.last_offset
    }

    pub fn map(&self) -> Option<&Map<T>> {
        self.active.as_ref().map(|active| &active.map)
    }

    pub fn callbacks(&self) -> &CallbackRegistry<S> {
        &self.callbacks
    }

    pub fn current_map(&self) -> Result<&str, EngineError> {
        match &self.active {
            Some(active) if self.is_running() => Ok(&active.filename),
            _ => Err(EngineError::NotRunning {
                op: "GetCurrentMap()",
            }),
        }
    }

    /// Start position and facing recorded in the active map.
    pub fn map_origin(&self) -> Result<MapOrigin, EngineError> {
        match &self.active {
            Some(active) if self.is_running() => Ok(active.map.origin),
            _ => Err(EngineError::NotRunning {
                op: "GetMapOrigin()",
            }),
        }
    }

    pub fn status(&self) -> EngineStatus {
        let (map_name, layer_sizes, tile_size) = match &self.active {
            Some(active) => (
                Some(active.filename.clone()),
                active
                    .map
                    .layers
                    .iter()
                    .map(|layer| (layer.width(), layer.height()))
                    .collect(),
                active.map.tile_size(),
            ),
            None => (None, Vec::new(), (0, 0)),
        };
        EngineStatus {
            running: self.is_running(),
            map_name,
            layer_sizes,
            tile_size,
            framerate: self.framerate,
            frames: self.frames,
            camera_person: self.camera.as_ref().map(|a| a.name.clone()),
            input_person: self.input.as_ref().map(|a| a.name.clone()),
        }
    }

    pub fn attach_camera<R>(&mut self, registry: &R, name: &str) -> Result<(), EngineError>
    where
        R: PersonRegistry<S> + ?Sized,
    {
        self.camera = Some(lookup_person::<S, R>(registry, "AttachCamera()", name)?);
        Ok(())
    }

    pub fn detach_camera(&mut self) {
        self.camera = None;
    }

    pub fn attach_input<R>(&mut self, registry: &R, name: &str) -> Result<(), EngineError>
    where
        R: PersonRegistry<S> + ?Sized,
    {
        self.input = Some(lookup_person::<S, R>(registry, "AttachInput()", name)?);
        Ok(())
    }

    pub fn detach_input(&mut self) {
        self.input = None;
    }

    pub fn set_default_script(&mut self, kind: MapScriptType, script: Option<S>) {
        self.callbacks.set_default(kind, script);
    }

    pub fn set_render_script(&mut self, script: Option<S>) {
        self.callbacks.set_render(script);
    }

    pub fn set_update_script(&mut self, script: Option<S>) {
        self.callbacks.set_update(script);
    }

    pub fn set_delay_script(&mut self, frames: i32, script: Option<S>) -> Result<(), EngineError> {
        let frames = u32::try_from(frames).map_err(|_| {
            EngineError::validation(
                "SetDelayScript()",
                format!("delay must be 0 or more frames, caller passed {frames}"),
            )
        })?;
        self.callbacks.set_delay(frames, script);
        Ok(())
    }

    /// Ask the loop to stop after the current iteration.
    pub fn request_exit(&mut self) -> Result<(), EngineError> {
        self.require_running("ExitMapEngine()")?;
        self.exit_requested = true;
        Ok(())
    }

    /// Load `filename` and loop until exit is requested. Blocks for the whole
    /// session. Fails if the first map cannot be loaded or a fatal error
    /// (script failure, frame timer failure) ends the loop.
    pub fn run<H>(
        &mut self,
        host: &mut H,
        filename: &str,
        framerate: i32,
    ) -> Result<(), EngineError>
    where
        H: EngineHost<T, Script = S>,
    {
        self.start(host, filename, framerate)?;
        let result = loop {
            if self.exit_requested {
                break Ok(());
            }
            if let Err(err) = self.tick(host) {
                log::error!("Map engine stopped by error: {err}");
                break Err(err);
            }
        };
        self.finish();
        result
    }

    pub fn start<H>(
        &mut self,
        host: &mut H,
        filename: &str,
        framerate: i32,
    ) -> Result<(), EngineError>
    where
        H: EngineHost<T, Script = S>,
    {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }
        log::info!("Starting map engine on '{filename}' at {framerate} fps");
        self.state = EngineState::Running;
        self.exit_requested = false;
        self.framerate = framerate;
        if let Err(err) = self.change_map(host, filename, true) {
            self.finish();
            return Err(err);
        }
        Ok(())
    }

    /// One loop iteration: frame pacing, queued requests, update, and render
    /// unless pacing says this frame is skipped.
    pub fn tick<H>(&mut self, host: &mut H) -> Result<(), EngineError>
    where
        H: EngineHost<T, Script = S>,
    {
        self.require_running("MapEngine()")?;
        let pacing = host.begin_frame(self.framerate)?;
        self.apply_pending(host)?;
        self.update(host)?;
        if pacing.should_render() {
            self.render(host)?;
        }
        Ok(())
    }

    pub fn finish(&mut self) {
        if self.state == EngineState::Stopped {
            return;
        }
        self.state = EngineState::Stopped;
        self.exit_requested = false;
        match self.active.take() {
            Some(active) => log::info!(
                "Map engine stopped on '{}' after {} frames",
                active.filename,
                self.frames
            ),
            None => log::info!("Map engine stopped"),
        }
    }

    /// Load `filename` and make it the active map. The new map is fully
    /// decoded and its scripts compiled before anything is released, so on
    /// failure the current map stays active and untouched.
    pub fn change_map<H>(
        &mut self,
        host: &mut H,
        filename: &str,
        preserve_persons: bool,
    ) -> Result<(), EngineError>
    where
        H: EngineHost<T, Script = S>,
    {
        let prepared = match prepare_map(host, filename) {
            Ok(prepared) => prepared,
            Err(err) => {
                log::error!("Unable to switch to map '{filename}': {err}");
                return Err(err);
            }
        };

        self.switch_depth += 1;
        let adopted = self.adopt_map(host, prepared, preserve_persons);
        self.switch_depth -= 1;
        adopted?;
        self.apply_pending(host)
    }

    /// One engine tick without frame pacing or rendering.
    pub fn update<H>(&mut self, host: &mut H) -> Result<(), EngineError>
    where
        H: EngineHost<T, Script = S>,
    {
        self.require_running("UpdateMapEngine()")?;
        self.frames += 1;
        host.update_persons();
        self.revalidate_attachments(&*host);

        if let Some(input) = &self.input {
            let held = INPUT_PRIORITY
                .iter()
                .copied()
                .find(|(key, _)| host.is_key_down(*key));
            if let Some((_, direction)) = held {
                host.queue_command(input.id, PersonCommand::Face(direction));
                host.queue_command(input.id, PersonCommand::Move(direction));
            }
        }

        if let Some(camera) = &self.camera {
            let extent = self.map_pixel_size();
            if let Some(position) = host.person_position(camera.id, extent) {
                self.focus = position;
            }
        }

        if let Some(script) = self.callbacks.update().cloned() {
            self.invoke(host, &script)?;
        }
        if let Some(script) = self.callbacks.tick_delay() {
            log::debug!("Delayed script due at frame {}", self.frames);
            self.invoke(host, &script)?;
        }
        Ok(())
    }

    /// Draw every layer around the current focus, then persons, then the
    /// render callback.
    pub fn render<H>(&mut self, host: &mut H) -> Result<(), EngineError>
    where
        H: EngineHost<T, Script = S>,
    {
        self.require_running("RenderMap()")?;
        let Some(active) = &self.active else {
            return Err(EngineError::NotRunning { op: "RenderMap()" });
        };
        let plan = Viewport::new(self.focus, host.resolution()).plan(&active.map);
        host.draw_tiles(&active.map.tileset, &plan.draws);
        self.last_offset = plan.offset;
        host.render_persons(plan.offset);

        if let Some(script) = self.callbacks.render().cloned() {
            self.invoke(host, &script)?;
        }
        Ok(())
    }

    pub fn apply_request<H>(
        &mut self,
        host: &mut H,
        request: EngineRequest<S>,
    ) -> Result<(), EngineError>
    where
        H: EngineHost<T, Script = S>,
    {
        log::trace!("Applying deferred {}", request.op());
        match request {
            EngineRequest::AttachCamera(name) => self.attach_camera(&*host, &name),
            EngineRequest::DetachCamera => {
                self.detach_camera();
                Ok(())
            }
            EngineRequest::AttachInput(name) => self.attach_input(&*host, &name),
            EngineRequest::DetachInput => {
                self.detach_input();
                Ok(())
            }
            EngineRequest::SetFramerate(framerate) => {
                self.set_framerate(framerate);
                Ok(())
            }
            EngineRequest::SetDefaultScript(kind, script) => {
                self.set_default_script(kind, script);
                Ok(())
            }
            EngineRequest::SetRenderScript(script) => {
                self.set_render_script(script);
                Ok(())
            }
            EngineRequest::SetUpdateScript(script) => {
                self.set_update_script(script);
                Ok(())
            }
            EngineRequest::SetDelayScript { frames, script } => {
                self.set_delay_script(frames, script)
            }
            EngineRequest::ChangeMap(filename) => {
                self.require_running("ChangeMap()")?;
                self.change_map(host, &filename, false)
            }
            EngineRequest::Exit => self.request_exit(),
            EngineRequest::Render => self.render(host),
            EngineRequest::Update => self.update(host),
        }
    }

    fn adopt_map<H>(
        &mut self,
        host: &mut H,
        prepared: PreparedMap<T, S>,
        preserve_persons: bool,
    ) -> Result<(), EngineError>
    where
        H: EngineHost<T, Script = S>,
    {
        let PreparedMap {
            filename,
            map,
            entry,
            persons,
        } = prepared;
        log::info!(
            "Loaded map '{}' ({} layers, {} persons, toric={})",
            filename,
            map.layer_count(),
            persons.len(),
            map.is_toric
        );
        if let Some(previous) = self.active.replace(ActiveMap { filename, map }) {
            log::debug!("Released map '{}'", previous.filename);
        }

        for destroy in host.reset_persons(preserve_persons) {
            self.invoke(host, &destroy)?;
        }

        for (spawn, scripts) in persons {
            let id = host.create_person(&spawn.name, &spawn.spriteset, false)?;
            host.set_person_position(id, spawn.x, spawn.y, spawn.layer);
            let create = scripts[PersonScriptKind::Create.index()].clone();
            for (kind, script) in PersonScriptKind::ALL.into_iter().zip(scripts) {
                host.set_person_script(id, kind, script);
            }
            if let Some(create) = create {
                self.invoke(host, &create)?;
            }
        }
        self.revalidate_attachments(&*host);

        if let Some(enter) = self.callbacks.default_script(MapScriptType::Enter).cloned() {
            self.invoke(host, &enter)?;
        }
        if let Some(entry) = entry {
            self.invoke(host, &entry)?;
        }
        self.frames = 0;
        Ok(())
    }

    fn invoke<H>(&mut self, host: &mut H, script: &S) -> Result<(), EngineError>
    where
        H: EngineHost<T, Script = S>,
    {
        let status = self.status();
        host.call_script(script, &status)?;
        self.apply_pending(host)
    }

    /// Apply requests scripts queued while the engine was busy. Fatal errors
    /// propagate; anything else is logged, since the script that asked has
    /// already returned.
    fn apply_pending<H>(&mut self, host: &mut H) -> Result<(), EngineError>
    where
        H: EngineHost<T, Script = S>,
    {
        if self.switch_depth > 0 {
            return Ok(());
        }
        loop {
            let requests = host.take_requests();
            if requests.is_empty() {
                return Ok(());
            }
            for request in requests {
                let op = request.op();
                match self.apply_request(host, request) {
                    Ok(()) => {}
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => log::error!("Deferred {op} failed: {err}"),
                }
            }
        }
    }

    /// Drop camera and input bindings whose person has been destroyed.
    fn revalidate_attachments<R>(&mut self, registry: &R)
    where
        R: PersonRegistry<S> + ?Sized,
    {
        let vanished = |slot: &Option<Attachment>| {
            slot.as_ref()
                .filter(|attachment| !registry.person_exists(attachment.id))
                .map(|attachment| attachment.name.clone())
        };
        if let Some(name) = vanished(&self.camera) {
            log::warn!("Camera person '{name}' no longer exists, detaching camera");
            self.camera = None;
        }
        if let Some(name) = vanished(&self.input) {
            log::warn!("Input person '{name}' no longer exists, detaching input");
            self.input = None;
        }
    }

    fn map_pixel_size(&self) -> IVec2 {
        self.map()
            .map(|map| {
                let (w, h) = map.pixel_size();
                IVec2::new(w, h)
            })
            .unwrap_or(IVec2::ZERO)
    }

    fn require_running(&self, op: &'static str) -> Result<(), EngineError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(EngineError::NotRunning { op })
        }
    }
}

fn lookup_person<S, R>(
    registry: &R,
    op: &'static str,
    name: &str,
) -> Result<Attachment, EngineError>
where
    R: PersonRegistry<S> + ?Sized,
{
    registry
        .find_person(name)
        .map(|id| Attachment {
            id,
            name: name.to_string(),
        })
        .ok_or_else(|| EngineError::UnknownPerson {
            op,
            name: name.to_string(),
        })
}

/// Check that `filename` would load: decode it and compile its scripts
/// without touching any engine. Used to report a bad map change to the
/// caller before it is queued.
pub fn verify_map<T, H>(host: &mut H, filename: &str) -> Result<(), EngineError>
where
    T: Tileset,
    H: EngineHost<T>,
{
    prepare_map(host, filename).map(drop)
}

/// Decode `filename` and compile every script it carries.
fn prepare_map<T, H>(
    host: &mut H,
    filename: &str,
) -> Result<PreparedMap<T, H::Script>, EngineError>
where
    T: Tileset,
    H: EngineHost<T>,
{
    let load_error = |source| EngineError::MapLoad {
        filename: filename.to_string(),
        source,
    };
    let bytes = host.read_map(filename).map_err(load_error)?;
    let mut map = decode_map(bytes.as_slice(), &mut *host).map_err(load_error)?;

    let entry = compile_map_script(
        host,
        filename,
        &format!("{filename}:entry"),
        map.scripts.entry_script(),
    )?;

    let spawns = map.take_persons();
    let mut persons = Vec::with_capacity(spawns.len());
    for spawn in spawns {
        let sources = [
            &spawn.scripts.on_create,
            &spawn.scripts.on_destroy,
            &spawn.scripts.on_touch,
            &spawn.scripts.on_talk,
            &spawn.scripts.on_command,
        ];
        let mut scripts: [Option<H::Script>; 5] = Default::default();
        for ((kind, slot), source) in PersonScriptKind::ALL.iter().zip(&mut scripts).zip(sources) {
            let Some(source) = source else {
                continue;
            };
            let name = format!("{filename}:{}:{}", spawn.name, kind.name());
            *slot = compile_map_script(host, filename, &name, source)?;
        }
        persons.push((spawn, scripts));
    }

    Ok(PreparedMap {
        filename: filename.to_string(),
        map,
        entry,
        persons,
    })
}

/// Compile a script embedded in a map. A script that does not compile makes
/// the map unloadable rather than ending the session.
fn compile_map_script<H: ScriptHost>(
    host: &mut H,
    filename: &str,
    name: &str,
    source: &str,
) -> Result<Option<H::Script>, EngineError> {
    if source.is_empty() {
        return Ok(None);
    }
    host.compile_script(name, source)
        .map(Some)
        .map_err(|err| EngineError::MapLoad {
            filename: filename.to_string(),
            source: MapError::format(format!("script {name} does not compile: {err}")),
        })
}
