//! Script engine seam.
//!
//! A [`ScriptEngine`] turns one script file into a [`ScriptUnit`]: an
//! interpreter instance holding the script's globals and its optional
//! lifecycle hooks. The catalog parses against a detached
//! [`ScriptContext`] and only looks at the result; a session parses again
//! against the live context and invokes the hooks.

mod api;
mod clock;
mod lua;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use thiserror::Error;

use crate::config::GameProfile;
use crate::diagnostics::ScriptConsole;
use crate::memory::GameMemory;

pub use clock::FrameClock;
pub use lua::{LuaEngine, LuaScript};

#[cfg(any(test, feature = "test-support"))]
pub use mock::{MockEngine, MockScript, MockUnit};

/// Global holding the display name
pub const NAME_GLOBAL: &str = "LUAGUI_NAME";
/// Global holding the author credit
pub const AUTHOR_GLOBAL: &str = "LUAGUI_AUTH";
/// Global holding the description
pub const DESCRIPTION_GLOBAL: &str = "LUAGUI_DESC";

/// Lifecycle hooks a script may publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Hook {
    Init,
    Frame,
}

impl Hook {
    /// Name of the script global implementing this hook
    pub fn global_name(self) -> &'static str {
        match self {
            Hook::Init => "_OnInit",
            Hook::Frame => "_OnFrame",
        }
    }
}

/// A script could not be loaded (syntax error, or its top-level chunk failed).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ScriptError {
    pub message: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A hook raised a runtime error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{hook} hook failed: {message}")]
pub struct HookFault {
    pub hook: Hook,
    pub message: String,
}

/// Everything a script is bound to while it is loaded.
#[derive(Debug, Clone)]
pub struct ScriptContext {
    pub memory: Arc<GameMemory>,
    pub clock: FrameClock,
    pub console: ScriptConsole,
    /// Executable name of the target game
    pub game_id: String,
    pub script_dir: PathBuf,
}

impl ScriptContext {
    /// Context for inspection: no process behind the memory view.
    pub fn detached(profile: &GameProfile, script_dir: &Path) -> Self {
        Self {
            memory: Arc::new(GameMemory::detached(profile.endianness, profile.encoding)),
            clock: FrameClock::default(),
            console: ScriptConsole::default(),
            game_id: profile.executable.clone(),
            script_dir: script_dir.to_path_buf(),
        }
    }

    /// Context for a live session with a resolved memory view.
    pub fn live(profile: &GameProfile, script_dir: &Path, memory: GameMemory) -> Self {
        Self {
            memory: Arc::new(memory),
            clock: FrameClock::default(),
            console: ScriptConsole::default(),
            game_id: profile.executable.clone(),
            script_dir: script_dir.to_path_buf(),
        }
    }
}

pub trait ScriptUnit {
    fn has_hook(&self, hook: Hook) -> bool;

    /// A string-valued global, if the script defines one
    fn global_text(&self, name: &str) -> Option<String>;

    /// Run a hook to completion. Calling a hook the script does not have
    /// is a no-op.
    fn invoke(&mut self, hook: Hook) -> Result<(), HookFault>;
}

pub trait ScriptEngine {
    type Unit: ScriptUnit;

    /// Load a script file. Its top-level chunk runs; its hooks do not.
    fn parse(&self, path: &Path, context: &ScriptContext) -> Result<Self::Unit, ScriptError>;
}
