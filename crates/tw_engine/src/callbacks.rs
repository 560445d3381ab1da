//! Registry of script callbacks the engine runs on its own schedule.

use std::fmt;

use crate::error::EngineError;

/// Map transition a default script can be registered for.
///
/// The numeric values are the ones scripts see as `SCRIPT_ON_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapScriptType {
    Enter = 0,
    Leave = 1,
    LeaveNorth = 2,
    LeaveEast = 3,
    LeaveSouth = 4,
    LeaveWest = 5,
}

impl MapScriptType {
    pub const COUNT: usize = 6;

    pub const ALL: [MapScriptType; Self::COUNT] = [
        Self::Enter,
        Self::Leave,
        Self::LeaveNorth,
        Self::LeaveEast,
        Self::LeaveSouth,
        Self::LeaveWest,
    ];

    /// Name of the global constant exposed to scripts.
    pub fn constant_name(self) -> &'static str {
        match self {
            Self::Enter => "SCRIPT_ON_ENTER_MAP",
            Self::Leave => "SCRIPT_ON_LEAVE_MAP",
            Self::LeaveNorth => "SCRIPT_ON_LEAVE_MAP_NORTH",
            Self::LeaveEast => "SCRIPT_ON_LEAVE_MAP_EAST",
            Self::LeaveSouth => "SCRIPT_ON_LEAVE_MAP_SOUTH",
            Self::LeaveWest => "SCRIPT_ON_LEAVE_MAP_WEST",
        }
    }
}

impl TryFrom<i32> for MapScriptType {
    type Error = EngineError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| {
                EngineError::validation(
                    "SetDefaultMapScript()",
                    format!(
                        "invalid script type constant; valid range is 0-{}, caller passed {value}",
                        Self::COUNT - 1
                    ),
                )
            })
    }
}

impl fmt::Display for MapScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.constant_name())
    }
}

/// A one-shot callback waiting out its frame countdown.
#[derive(Debug, Clone)]
struct Delayed<S> {
    frames_left: u32,
    script: S,
}

/// Typed slots for every engine-driven callback.
///
/// Default transition scripts are global and survive map switches. Only the
/// enter slot is run by the engine; the leave family is stored for scripts
/// that query or replace it.
#[derive(Debug, Clone)]
pub struct CallbackRegistry<S> {
    defaults: [Option<S>; MapScriptType::COUNT],
    render: Option<S>,
    update: Option<S>,
    delay: Option<Delayed<S>>,
}

impl<S> Default for CallbackRegistry<S> {
    fn default() -> Self {
        Self {
            defaults: Default::default(),
            render: None,
            update: None,
            delay: None,
        }
    }
}

impl<S> CallbackRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default(&mut self, kind: MapScriptType, script: Option<S>) {
        self.defaults[kind as usize] = script;
    }

    pub fn default_script(&self, kind: MapScriptType) -> Option<&S> {
        self.defaults[kind as usize].as_ref()
    }

    pub fn set_render(&mut self, script: Option<S>) {
        self.render = script;
    }

    pub fn render(&self) -> Option<&S> {
        self.render.as_ref()
    }

    pub fn set_update(&mut self, script: Option<S>) {
        self.update = script;
    }

    pub fn update(&self) -> Option<&S> {
        self.update.as_ref()
    }

    /// Schedule `script` to run after `frames` more ticks have elapsed; `0`
    /// means the next tick. `None` cancels any pending callback.
    pub fn set_delay(&mut self, frames: u32, script: Option<S>) {
        self.delay = script.map(|script| Delayed {
            frames_left: frames,
            script,
        });
    }

    pub fn has_delay(&self) -> bool {
        self.delay.is_some()
    }

    /// Advance the countdown by one tick. Returns the callback on the tick it
    /// comes due, after which the slot is empty.
    pub fn tick_delay(&mut self) -> Option<S> {
        let delayed = self.delay.as_mut()?;
        if delayed.frames_left > 0 {
            delayed.frames_left -= 1;
            return None;
        }
        self.delay.take().map(|delayed| delayed.script)
    }
}
