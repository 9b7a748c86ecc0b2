//! # luafront-core
//!
//! Core library for the luafront script runner.
//!
//! This crate provides:
//! - Game catalog parsing (TOML)
//! - Process discovery and typed memory access (Windows and Linux)
//! - An embedded Lua 5.4 engine exposing memory functions to scripts
//! - Script discovery and classification
//! - The execution scheduler: attach, init pass, frame loop, fault isolation
//!
//! ## Feature Flags
//!
//! - `test-support`: Exposes the mock process provider and mock script engine
//!   for tests in downstream crates.

pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod latch;
pub mod memory;
pub mod scheduler;

pub use catalog::{
    HookSet, HookWarning, ScanSummary, ScriptCatalog, ScriptId, ScriptRecord, Verdict,
};
pub use config::{GameCatalog, GameProfile, parse_hex};
pub use diagnostics::{DiagnosticLine, DiagnosticLog, ScriptConsole, Severity};
pub use engine::{
    FrameClock, Hook, HookFault, LuaEngine, LuaScript, ScriptContext, ScriptEngine, ScriptError,
    ScriptUnit,
};
pub use error::{Error, Result};
pub use latch::{Attachment, LatchPoll, LatchState, ProcessLatch};
pub use memory::{
    Endianness, GameMemory, Liveness, ProcessProvider, ReadMemory, SystemProcesses,
    TargetProcess, WriteMemory,
};
pub use scheduler::{Controls, ExecutionScheduler, ExecutionSession, SchedulerState, Transition};
