//! What scripts see of the engine while it is busy, and what they can ask of it.
//!
//! A script callback runs while the engine is in the middle of a tick or a
//! map switch, so it cannot reach the engine directly. Queries are answered
//! from an `EngineStatus` taken just before the call; mutations are queued
//! as `EngineRequest`s and applied once the callback has returned. The host
//! folds each queued request into its snapshot with
//! [`EngineStatus::record_queued`], so a callback reads back its own changes.

use crate::callbacks::MapScriptType;
use crate::error::{check_layer, EngineError};

#[derive(Debug, Clone)]
pub enum EngineRequest<S> {
    AttachCamera(String),
    DetachCamera,
    AttachInput(String),
    DetachInput,
    SetFramerate(i32),
    SetDefaultScript(MapScriptType, Option<S>),
    SetRenderScript(Option<S>),
    SetUpdateScript(Option<S>),
    SetDelayScript { frames: i32, script: Option<S> },
    ChangeMap(String),
    Exit,
    Render,
    Update,
}

impl<S> EngineRequest<S> {
    /// Host-facing name of the operation that raised this request.
    pub fn op(&self) -> &'static str {
        match self {
            Self::AttachCamera(_) => "AttachCamera()",
            Self::DetachCamera => "DetachCamera()",
            Self::AttachInput(_) => "AttachInput()",
            Self::DetachInput => "DetachInput()",
            Self::SetFramerate(_) => "SetMapEngineFrameRate()",
            Self::SetDefaultScript(..) => "SetDefaultMapScript()",
            Self::SetRenderScript(_) => "SetRenderScript()",
            Self::SetUpdateScript(_) => "SetUpdateScript()",
            Self::SetDelayScript { .. } => "SetDelayScript()",
            Self::ChangeMap(_) => "ChangeMap()",
            Self::Exit => "ExitMapEngine()",
            Self::Render => "RenderMap()",
            Self::Update => "UpdateMapEngine()",
        }
    }
}

/// Point-in-time view of the engine, answering every host query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub running: bool,
    pub map_name: Option<String>,
    /// Width and height in tiles of every layer, by index.
    pub layer_sizes: Vec<(i32, i32)>,
    pub tile_size: (i32, i32),
    pub framerate: i32,
    pub frames: u64,
    pub camera_person: Option<String>,
    pub input_person: Option<String>,
}

impl EngineStatus {
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn current_map(&self) -> Result<&str, EngineError> {
        match (&self.map_name, self.running) {
            (Some(name), true) => Ok(name),
            _ => Err(EngineError::NotRunning {
                op: "GetCurrentMap()",
            }),
        }
    }

    pub fn layer_width(&self, layer: i32) -> Result<i32, EngineError> {
        self.layer_size("GetLayerWidth()", layer).map(|(w, _)| w)
    }

    pub fn layer_height(&self, layer: i32) -> Result<i32, EngineError> {
        self.layer_size("GetLayerHeight()", layer).map(|(_, h)| h)
    }

    pub fn tile_width(&self) -> Result<i32, EngineError> {
        self.require_running("GetTileWidth()")?;
        Ok(self.tile_size.0)
    }

    pub fn tile_height(&self) -> Result<i32, EngineError> {
        self.require_running("GetTileHeight()")?;
        Ok(self.tile_size.1)
    }

    pub fn framerate(&self) -> i32 {
        self.framerate
    }

    pub fn is_camera_attached(&self) -> bool {
        self.camera_person.is_some()
    }

    pub fn is_input_attached(&self) -> bool {
        self.input_person.is_some()
    }

    pub fn camera_person(&self) -> Result<&str, EngineError> {
        self.camera_person.as_deref().ok_or_else(|| {
            EngineError::validation("GetCameraPerson()", "camera is not attached to a person")
        })
    }

    pub fn input_person(&self) -> Result<&str, EngineError> {
        self.input_person.as_deref().ok_or_else(|| {
            EngineError::validation("GetInputPerson()", "input is not attached to a person")
        })
    }

    /// Zones are decoded but never tested against positions.
    pub fn are_zones_at(&self, _x: i32, _y: i32, layer: i32) -> Result<bool, EngineError> {
        self.require_running("AreZonesAt()")?;
        check_layer("AreZonesAt()", layer, self.layer_sizes.len())?;
        Ok(false)
    }

    /// Trigger positions are not kept, so no trigger is ever found.
    pub fn is_trigger_at(&self, _x: i32, _y: i32, layer: i32) -> Result<bool, EngineError> {
        self.require_running("IsTriggerAt()")?;
        check_layer("IsTriggerAt()", layer, self.layer_sizes.len())?;
        Ok(false)
    }

    /// Reflect a request that has been queued but not yet applied. Only the
    /// framerate and the attachments show in the status; other requests
    /// leave it alone.
    pub fn record_queued<S>(&mut self, request: &EngineRequest<S>) {
        match request {
            EngineRequest::SetFramerate(framerate) => self.framerate = *framerate,
            EngineRequest::AttachCamera(name) => self.camera_person = Some(name.clone()),
            EngineRequest::DetachCamera => self.camera_person = None,
            EngineRequest::AttachInput(name) => self.input_person = Some(name.clone()),
            EngineRequest::DetachInput => self.input_person = None,
            _ => {}
        }
    }

    fn layer_size(&self, op: &'static str, layer: i32) -> Result<(i32, i32), EngineError> {
        self.require_running(op)?;
        let index = check_layer(op, layer, self.layer_sizes.len())?;
        Ok(self.layer_sizes[index])
    }

    fn require_running(&self, op: &'static str) -> Result<(), EngineError> {
        if self.running {
            Ok(())
        } else {
            Err(EngineError::NotRunning { op })
        }
    }
}
