use std::fs;
use std::path::Path;

use mlua::{Function, Lua, Table, Value};
use tracing::debug;

use super::api::register_all;
use super::{Hook, HookFault, ScriptContext, ScriptEngine, ScriptError, ScriptUnit};

/// Lua 5.4 engine. Every parsed script gets its own interpreter.
#[derive(Debug, Default, Clone, Copy)]
pub struct LuaEngine;

impl LuaEngine {
    pub fn new() -> Self {
        Self
    }

    fn load(path: &Path, context: &ScriptContext) -> mlua::Result<LuaScript> {
        let source = fs::read(path).map_err(mlua::Error::external)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let lua = Lua::new();
        register_all(&lua, context, &stem)?;
        extend_package_path(&lua, &context.script_dir)?;

        lua.load(source).set_name(format!("@{file_name}")).exec()?;

        let init = lookup_hook(&lua, Hook::Init)?;
        let frame = lookup_hook(&lua, Hook::Frame)?;
        debug!(
            "Loaded {} (init: {}, frame: {})",
            file_name,
            init.is_some(),
            frame.is_some()
        );

        Ok(LuaScript { lua, init, frame })
    }
}

impl ScriptEngine for LuaEngine {
    type Unit = LuaScript;

    fn parse(&self, path: &Path, context: &ScriptContext) -> Result<LuaScript, ScriptError> {
        Self::load(path, context).map_err(|e| ScriptError::new(e.to_string()))
    }
}

/// Make `require` find modules next to the scripts.
fn extend_package_path(lua: &Lua, script_dir: &Path) -> mlua::Result<()> {
    let package: Table = lua.globals().get("package")?;
    let current: String = package.get("path")?;
    let dir = script_dir.to_string_lossy();
    package.set("path", format!("{dir}/?.lua;{current}"))
}

/// A hook global that is not a function counts as absent.
fn lookup_hook(lua: &Lua, hook: Hook) -> mlua::Result<Option<Function>> {
    match lua.globals().get::<Value>(hook.global_name())? {
        Value::Function(f) => Ok(Some(f)),
        _ => Ok(None),
    }
}

/// A loaded Lua script and the interpreter that owns it.
pub struct LuaScript {
    lua: Lua,
    init: Option<Function>,
    frame: Option<Function>,
}

impl ScriptUnit for LuaScript {
    fn has_hook(&self, hook: Hook) -> bool {
        match hook {
            Hook::Init => self.init.is_some(),
            Hook::Frame => self.frame.is_some(),
        }
    }

    fn global_text(&self, name: &str) -> Option<String> {
        match self.lua.globals().get::<Value>(name) {
            Ok(Value::String(s)) => {
                let text: String = s.to_string_lossy().into();
                (!text.is_empty()).then_some(text)
            }
            _ => None,
        }
    }

    fn invoke(&mut self, hook: Hook) -> Result<(), HookFault> {
        let func = match hook {
            Hook::Init => &self.init,
            Hook::Frame => &self.frame,
        };
        let Some(func) = func else {
            return Ok(());
        };
        func.call::<()>(()).map_err(|e| HookFault {
            hook,
            message: e.to_string(),
        })
    }
}
