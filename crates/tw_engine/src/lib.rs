//! The map engine: loads `.rmp` maps, runs the frame loop and dispatches map
//! and person scripts through a host.
//!
//! [`MapEngine`] owns the active map, the camera and input attachments, and
//! the callback registry. Everything else (scripts, persons, drawing, keys,
//! frame timing) is reached through the traits in [`host`]. Scripts that run
//! while the engine is busy raise [`EngineRequest`]s, which the engine applies
//! once the call returns.

pub mod callbacks;
pub mod engine;
pub mod error;
pub mod host;
pub mod request;
pub mod viewport;

#[cfg(test)]
mod testing;

pub use callbacks::{CallbackRegistry, MapScriptType};
pub use engine::{verify_map, MapEngine};
pub use error::EngineError;
pub use host::{
    AssetSource, Direction, EngineHost, FrameTimer, Keyboard, PersonCommand, PersonId,
    PersonRegistry, PersonScriptKind, ScriptHost, TileDraw, TileSurface,
};
pub use request::{EngineRequest, EngineStatus};
