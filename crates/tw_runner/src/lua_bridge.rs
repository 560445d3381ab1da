//! Lua globals for driving the map engine.
//!
//! Every global closes over the same `HostContext`. Called from top-level
//! script code the engine is idle and a call takes effect at once. Called
//! from inside a map engine callback the engine is busy: mutations are queued
//! and applied when the callback returns. Queries answer from the status
//! snapshot taken just before the callback started, updated with the
//! callback's own queued framerate and attachment changes. `ChangeMap()`
//! loads the target map up front so a bad file raises in the caller.
//!
//! Script arguments (`SetUpdateScript(...)` and friends) accept a function,
//! a string of Lua source, or `nil` to clear. Strings are compiled on the
//! spot so a syntax error is raised by the registering call.

use std::fs;
use std::path::Path;

use glam::IVec2;
use mlua::prelude::*;
use mlua::{FromLuaMulti, IntoLuaMulti};
use tw_engine::{verify_map, EngineError, EngineRequest, MapScriptType, PersonId, ScriptHost};

use crate::host::{compile_chunk, HostContext, LuaHost};
use crate::surface::RtsTileset;

pub struct LuaBridge {
    lua: Lua,
    ctx: HostContext,
}

impl LuaBridge {
    pub fn new(ctx: HostContext) -> LuaResult<Self> {
        let lua = Lua::new();
        register_map_engine_api(&lua, &ctx)?;
        register_person_api(&lua, &ctx)?;
        Ok(Self { lua, ctx })
    }

    pub fn context(&self) -> &HostContext {
        &self.ctx
    }

    pub fn exec(&self, name: &str, source: &str) -> LuaResult<()> {
        self.lua.load(source).set_name(name).exec()
    }

    /// Execute the game's main script, then call its entry function. Returns
    /// once the entry function does, which for most games is after the map
    /// engine has exited.
    pub fn run_script(&self, path: &Path, entry_function: &str) -> Result<(), String> {
        let source = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        self.exec(&path.to_string_lossy(), &source)
            .map_err(|e| format!("Lua script load error: {e}"))?;
        log::info!("Lua script loaded: {}", path.display());

        let entry: LuaFunction = self.lua.globals().get(entry_function).map_err(|_| {
            format!(
                "{} does not define a global function '{entry_function}'",
                path.display()
            )
        })?;
        entry
            .call::<()>(())
            .map_err(|e| format!("Lua error in {entry_function}(): {e}"))
    }
}

fn lua_error(err: EngineError) -> LuaError {
    LuaError::RuntimeError(err.to_string())
}

fn set_global<A, R, F>(lua: &Lua, name: &str, func: F) -> LuaResult<()>
where
    A: FromLuaMulti,
    R: IntoLuaMulti,
    F: Fn(&Lua, A) -> Result<R, EngineError> + Send + 'static,
{
    let function = lua.create_function(move |lua, args: A| func(lua, args).map_err(lua_error))?;
    lua.globals().set(name, function)
}

/// Turn a script argument into an optional callback.
fn script_arg(
    lua: &Lua,
    op: &'static str,
    value: LuaValue,
) -> Result<Option<LuaFunction>, EngineError> {
    match value {
        LuaValue::Nil => Ok(None),
        LuaValue::Function(function) => Ok(Some(function)),
        LuaValue::String(source) => compile_chunk(lua, op, &source.to_string_lossy()).map(Some),
        other => Err(EngineError::validation(
            op,
            format!(
                "expected a function, a script string or nil, got {}",
                other.type_name()
            ),
        )),
    }
}

fn run_map_engine(
    lua: &Lua,
    ctx: &HostContext,
    filename: &str,
    framerate: Option<i32>,
) -> Result<(), EngineError> {
    let Some(mut engine) = ctx.idle_engine() else {
        return Err(EngineError::AlreadyRunning);
    };
    {
        let mut shared = ctx.shared();
        shared.requests.clear();
        shared.pacer.reset();
        shared.frames_run = 0;
    }
    let framerate = framerate.unwrap_or(ctx.default_framerate());
    let mut host = LuaHost::new(lua, ctx.clone());
    let result = engine.run(&mut host, filename, framerate);
    let shared = ctx.shared();
    log::info!(
        "Map engine session ended: {} frames, {} renders skipped, {:.1} fps",
        shared.pacer.frame_count,
        shared.pacer.skipped_frames,
        shared.pacer.smoothed_fps
    );
    result
}

fn register_map_engine_api(lua: &Lua, ctx: &HostContext) -> LuaResult<()> {
    for kind in MapScriptType::ALL {
        lua.globals().set(kind.constant_name(), kind as i32)?;
    }

    let c = ctx.clone();
    set_global(lua, "MapEngine", move |lua, (filename, framerate): (String, Option<i32>)| {
        run_map_engine(lua, &c, &filename, framerate)
    })?;
    let c = ctx.clone();
    set_global(lua, "ExitMapEngine", move |lua, ()| {
        c.submit(lua, EngineRequest::Exit)
    })?;
    let c = ctx.clone();
    set_global(lua, "IsMapEngineRunning", move |_, ()| Ok(c.status().is_running()))?;
    let c = ctx.clone();
    set_global(lua, "ChangeMap", move |lua, filename: String| {
        if c.idle_engine().is_none() {
            // Load errors raise here; the switch itself runs after the callback.
            verify_map::<RtsTileset, _>(&mut LuaHost::new(lua, c.clone()), &filename)?;
        }
        c.submit(lua, EngineRequest::ChangeMap(filename))
    })?;
    let c = ctx.clone();
    set_global(lua, "GetCurrentMap", move |_, ()| {
        c.status().current_map().map(str::to_string)
    })?;

    let c = ctx.clone();
    set_global(lua, "AttachCamera", move |lua, name: String| {
        require_person(&c, "AttachCamera()", &name)?;
        c.submit(lua, EngineRequest::AttachCamera(name))
    })?;
    let c = ctx.clone();
    set_global(lua, "DetachCamera", move |lua, ()| {
        c.submit(lua, EngineRequest::DetachCamera)
    })?;
    let c = ctx.clone();
    set_global(lua, "IsCameraAttached", move |_, ()| Ok(c.status().is_camera_attached()))?;
    let c = ctx.clone();
    set_global(lua, "GetCameraPerson", move |_, ()| {
        c.status().camera_person().map(str::to_string)
    })?;
    let c = ctx.clone();
    set_global(lua, "AttachInput", move |lua, name: String| {
        require_person(&c, "AttachInput()", &name)?;
        c.submit(lua, EngineRequest::AttachInput(name))
    })?;
    let c = ctx.clone();
    set_global(lua, "DetachInput", move |lua, ()| {
        c.submit(lua, EngineRequest::DetachInput)
    })?;
    let c = ctx.clone();
    set_global(lua, "IsInputAttached", move |_, ()| Ok(c.status().is_input_attached()))?;
    let c = ctx.clone();
    set_global(lua, "GetInputPerson", move |_, ()| {
        c.status().input_person().map(str::to_string)
    })?;

    let c = ctx.clone();
    set_global(lua, "GetLayerWidth", move |_, layer: i32| c.status().layer_width(layer))?;
    let c = ctx.clone();
    set_global(lua, "GetLayerHeight", move |_, layer: i32| c.status().layer_height(layer))?;
    let c = ctx.clone();
    set_global(lua, "GetTileWidth", move |_, ()| c.status().tile_width())?;
    let c = ctx.clone();
    set_global(lua, "GetTileHeight", move |_, ()| c.status().tile_height())?;
    let c = ctx.clone();
    set_global(lua, "GetMapEngineFrameRate", move |_, ()| Ok(c.status().framerate()))?;
    let c = ctx.clone();
    set_global(lua, "SetMapEngineFrameRate", move |lua, framerate: i32| {
        c.submit(lua, EngineRequest::SetFramerate(framerate))
    })?;

    let c = ctx.clone();
    set_global(lua, "SetDefaultMapScript", move |lua, (kind, script): (i32, LuaValue)| {
        let kind = MapScriptType::try_from(kind)?;
        let script = script_arg(lua, "SetDefaultMapScript()", script)?;
        c.submit(lua, EngineRequest::SetDefaultScript(kind, script))
    })?;
    let c = ctx.clone();
    set_global(lua, "SetRenderScript", move |lua, script: LuaValue| {
        let script = script_arg(lua, "SetRenderScript()", script)?;
        c.submit(lua, EngineRequest::SetRenderScript(script))
    })?;
    let c = ctx.clone();
    set_global(lua, "SetUpdateScript", move |lua, script: LuaValue| {
        let script = script_arg(lua, "SetUpdateScript()", script)?;
        c.submit(lua, EngineRequest::SetUpdateScript(script))
    })?;
    let c = ctx.clone();
    set_global(lua, "SetDelayScript", move |lua, (frames, script): (i32, LuaValue)| {
        // A queued request can no longer fail the caller.
        if frames < 0 {
            return Err(EngineError::validation(
                "SetDelayScript()",
                format!("delay must be 0 or more frames, caller passed {frames}"),
            ));
        }
        let script = script_arg(lua, "SetDelayScript()", script)?;
        c.submit(lua, EngineRequest::SetDelayScript { frames, script })
    })?;

    let c = ctx.clone();
    set_global(lua, "RenderMap", move |lua, ()| c.submit(lua, EngineRequest::Render))?;
    let c = ctx.clone();
    set_global(lua, "UpdateMapEngine", move |lua, ()| {
        c.submit(lua, EngineRequest::Update)
    })?;

    let c = ctx.clone();
    set_global(lua, "AreZonesAt", move |_, (x, y, layer): (i32, i32, i32)| {
        c.status().are_zones_at(x, y, layer)
    })?;
    let c = ctx.clone();
    set_global(lua, "IsTriggerAt", move |_, (x, y, layer): (i32, i32, i32)| {
        c.status().is_trigger_at(x, y, layer)
    })?;

    Ok(())
}

fn require_person(
    ctx: &HostContext,
    op: &'static str,
    name: &str,
) -> Result<PersonId, EngineError> {
    ctx.shared()
        .persons
        .find(name)
        .ok_or_else(|| EngineError::UnknownPerson {
            op,
            name: name.to_string(),
        })
}

fn person_position(
    ctx: &HostContext,
    op: &'static str,
    name: &str,
) -> Result<IVec2, EngineError> {
    let id = require_person(ctx, op, name)?;
    ctx.shared()
        .persons
        .position(id)
        .ok_or_else(|| EngineError::UnknownPerson {
            op,
            name: name.to_string(),
        })
}

fn register_person_api(lua: &Lua, ctx: &HostContext) -> LuaResult<()> {
    let c = ctx.clone();
    set_global(
        lua,
        "CreatePerson",
        move |_, (name, spriteset, destroy_with_map): (String, String, bool)| {
            c.shared().persons.create(&name, &spriteset, !destroy_with_map);
            Ok(())
        },
    )?;
    let c = ctx.clone();
    set_global(lua, "DestroyPerson", move |lua, name: String| {
        let destroyed = c.shared().persons.destroy(&name);
        match destroyed {
            None => Err(EngineError::UnknownPerson {
                op: "DestroyPerson()",
                name,
            }),
            Some(None) => Ok(()),
            Some(Some(script)) => {
                let status = c.status();
                LuaHost::new(lua, c.clone()).call_script(&script, &status)
            }
        }
    })?;
    let c = ctx.clone();
    set_global(lua, "DoesPersonExist", move |_, name: String| {
        Ok(c.shared().persons.find(&name).is_some())
    })?;
    let c = ctx.clone();
    set_global(lua, "SetPersonXY", move |_, (name, x, y): (String, i32, i32)| {
        let mut shared = c.shared();
        let person = shared
            .persons
            .by_name_mut(&name)
            .ok_or_else(|| EngineError::UnknownPerson {
                op: "SetPersonXY()",
                name: name.clone(),
            })?;
        person.position = IVec2::new(x, y);
        Ok(())
    })?;
    let c = ctx.clone();
    set_global(lua, "GetPersonX", move |_, name: String| {
        person_position(&c, "GetPersonX()", &name).map(|p| p.x)
    })?;
    let c = ctx.clone();
    set_global(lua, "GetPersonY", move |_, name: String| {
        person_position(&c, "GetPersonY()", &name).map(|p| p.y)
    })?;
    Ok(())
}
