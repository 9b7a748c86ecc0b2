//! Lua globals exposed to scripts.
//!
//! Memory functions come in pairs: `ReadInt(addr)` treats `addr` as an offset
//! from the session base address, `ReadIntA(addr)` as an absolute address.
//! Memory errors surface as Lua errors in the calling script.

use std::sync::Arc;

use mlua::{FromLuaMulti, IntoLuaMulti, Lua, Result as LuaResult};

use super::ScriptContext;
use crate::config::MAX_SCRIPT_READ;
use crate::diagnostics::Severity;
use crate::error::{Error, Result};
use crate::memory::GameMemory;

pub const ENGINE_TYPE: &str = "luafront";
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Register every script-visible global on `lua`.
///
/// `script_name` is the file stem, published as `LUA_NAME` and used to tag
/// console output.
pub fn register_all(lua: &Lua, context: &ScriptContext, script_name: &str) -> LuaResult<()> {
    register_constants(lua, context, script_name)?;
    register_reads(lua, &context.memory)?;
    register_writes(lua, &context.memory)?;
    register_pointers(lua, &context.memory)?;
    register_timing(lua, context)?;
    register_console(lua, context, script_name)?;
    Ok(())
}

fn register_constants(lua: &Lua, context: &ScriptContext, script_name: &str) -> LuaResult<()> {
    let globals = lua.globals();
    globals.set("ENGINE_VERSION", ENGINE_VERSION)?;
    globals.set("ENGINE_TYPE", ENGINE_TYPE)?;
    globals.set("GAME_ID", context.game_id.as_str())?;
    globals.set(
        "SCRIPT_PATH",
        context.script_dir.to_string_lossy().into_owned(),
    )?;
    globals.set("LUA_NAME", script_name)?;
    globals.set("BASE_ADDRESS", context.memory.base_address() as i64)?;
    Ok(())
}

/// Register `name` (relative) and `nameA` (absolute) backed by `op`.
fn register_pair<A, R, F>(lua: &Lua, memory: &Arc<GameMemory>, name: &str, op: F) -> LuaResult<()>
where
    A: FromLuaMulti + 'static,
    R: IntoLuaMulti + 'static,
    F: Fn(&GameMemory, u64, A) -> Result<R> + Clone + 'static,
{
    let globals = lua.globals();
    for (suffix, absolute) in [("", false), ("A", true)] {
        let memory = Arc::clone(memory);
        let op = op.clone();
        let func = lua.create_function(move |_, (address, args): (i64, A)| {
            let address = if absolute {
                address as u64
            } else {
                memory.relative(address as u64)
            };
            op(&memory, address, args).map_err(mlua::Error::external)
        })?;
        globals.set(format!("{name}{suffix}"), func)?;
    }
    Ok(())
}

fn register_reads(lua: &Lua, memory: &Arc<GameMemory>) -> LuaResult<()> {
    register_pair(lua, memory, "ReadByte", |m, a, ()| m.read_u8(a))?;
    register_pair(lua, memory, "ReadShort", |m, a, ()| m.read_i16(a))?;
    register_pair(lua, memory, "ReadInt", |m, a, ()| m.read_i32(a))?;
    register_pair(lua, memory, "ReadLong", |m, a, ()| m.read_i64(a))?;
    register_pair(lua, memory, "ReadFloat", |m, a, ()| m.read_f32(a))?;
    register_pair(lua, memory, "ReadBoolean", |m, a, ()| m.read_bool(a))?;
    register_pair(lua, memory, "ReadString", |m, a, len: i64| {
        m.read_string(a, read_length(len)?)
    })?;
    register_pair(lua, memory, "ReadArray", |m, a, len: i64| {
        m.read_bytes(a, read_length(len)?)
    })?;
    Ok(())
}

/// Lengths come from scripts as plain integers; negative ones are refused
/// rather than wrapped.
fn read_length(len: i64) -> Result<usize> {
    usize::try_from(len).map_err(|_| Error::InvalidLength {
        length: len,
        max: MAX_SCRIPT_READ,
    })
}

fn register_writes(lua: &Lua, memory: &Arc<GameMemory>) -> LuaResult<()> {
    // Integer writes truncate to the target width.
    register_pair(lua, memory, "WriteByte", |m, a, v: i64| m.write_u8(a, v as u8))?;
    register_pair(lua, memory, "WriteShort", |m, a, v: i64| {
        m.write_i16(a, v as i16)
    })?;
    register_pair(lua, memory, "WriteInt", |m, a, v: i64| m.write_i32(a, v as i32))?;
    register_pair(lua, memory, "WriteLong", |m, a, v: i64| m.write_i64(a, v))?;
    register_pair(lua, memory, "WriteFloat", |m, a, v: f32| m.write_f32(a, v))?;
    register_pair(lua, memory, "WriteBoolean", |m, a, v: bool| m.write_bool(a, v))?;
    register_pair(lua, memory, "WriteString", |m, a, v: String| {
        m.write_string(a, &v)
    })?;
    register_pair(lua, memory, "WriteArray", |m, a, v: Vec<u8>| {
        m.write_bytes(a, &v)
    })?;
    Ok(())
}

fn register_pointers(lua: &Lua, memory: &Arc<GameMemory>) -> LuaResult<()> {
    register_pair(lua, memory, "ReadPointer", |m, a, ()| {
        m.read_u64(a).map(|p| p as i64)
    })?;
    register_pair(lua, memory, "GetPointer", |m, a, offset: Option<i64>| {
        m.follow_pointer(a, offset.unwrap_or(0) as u64)
            .map(|p| p as i64)
    })?;
    Ok(())
}

fn register_timing(lua: &Lua, context: &ScriptContext) -> LuaResult<()> {
    let globals = lua.globals();

    let clock = context.clock.clone();
    globals.set(
        "SetHertz",
        lua.create_function(move |_, hertz: u32| {
            clock.set_hertz(hertz);
            Ok(())
        })?,
    )?;

    let clock = context.clock.clone();
    globals.set(
        "GetHertz",
        lua.create_function(move |_, ()| Ok(clock.hertz()))?,
    )?;
    Ok(())
}

fn register_console(lua: &Lua, context: &ScriptContext, script_name: &str) -> LuaResult<()> {
    let console = context.console.clone();
    let script_name = script_name.to_string();
    lua.globals().set(
        "ConsolePrint",
        lua.create_function(move |_, (message, kind): (String, Option<u8>)| {
            console.print(&script_name, Severity::from_kind(kind.unwrap_or(0)), &message);
            Ok(())
        })?,
    )?;
    Ok(())
}
