use std::time::{Duration, Instant};

use tracing::debug;

use crate::catalog::ScriptId;
use crate::diagnostics::{DiagnosticLog, Severity};
use crate::engine::{Hook, ScriptContext, ScriptUnit};
use crate::memory::Liveness;

/// A script instantiated against the live process.
pub struct ActiveScript<U> {
    pub id: ScriptId,
    pub name: String,
    pub unit: U,
}

impl<U> ActiveScript<U> {
    pub fn new(id: ScriptId, name: String, unit: U) -> Self {
        Self { id, name, unit }
    }
}

/// Everything that lives from one attach to the next stop or reload.
pub struct ExecutionSession<U> {
    context: ScriptContext,
    active: Vec<ActiveScript<U>>,
    evicted: Vec<ScriptId>,
    next_frame: Instant,
    ticks: u64,
}

impl<U: ScriptUnit> ExecutionSession<U> {
    pub fn new(context: ScriptContext, active: Vec<ActiveScript<U>>, now: Instant) -> Self {
        Self {
            context,
            active,
            evicted: Vec::new(),
            next_frame: now,
            ticks: 0,
        }
    }

    pub fn base_address(&self) -> u64 {
        self.context.memory.base_address()
    }

    /// Ids of the scripts still running, in catalog order
    pub fn active_ids(&self) -> Vec<ScriptId> {
        self.active.iter().map(|s| s.id).collect()
    }

    pub fn active(&self) -> &[ActiveScript<U>] {
        &self.active
    }

    /// Ids evicted so far, in eviction order
    pub fn evicted(&self) -> &[ScriptId] {
        &self.evicted
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn interval(&self) -> Duration {
        self.context.clock.interval()
    }

    pub fn next_frame(&self) -> Instant {
        self.next_frame
    }

    pub fn liveness(&self) -> Liveness {
        self.context.memory.liveness()
    }

    /// Run `init` for every script that has it; called once, right after
    /// the session is built. A failing init is reported but the script keeps
    /// running. The first frame is due one interval after `now`, at whatever
    /// rate init left behind.
    pub fn run_init(&mut self, now: Instant, log: &mut DiagnosticLog) {
        debug_assert_eq!(self.ticks, 0, "init after the first frame");
        for script in &mut self.active {
            if !script.unit.has_hook(Hook::Init) {
                continue;
            }
            if let Err(fault) = script.unit.invoke(Hook::Init) {
                log.emit(Severity::Error, format!("{}: {}", script.name, fault));
            }
        }
        self.context.console.drain_into(log);
        self.next_frame = now + self.interval();
    }

    /// One frame pass. Scripts whose `frame` fails are evicted once every
    /// script has had its turn. Returns the number of evictions.
    pub fn run_frame(&mut self, now: Instant, log: &mut DiagnosticLog) -> usize {
        let mut faulted = Vec::new();
        for script in &mut self.active {
            if let Err(fault) = script.unit.invoke(Hook::Frame) {
                log.emit(
                    Severity::Error,
                    format!("{}: {}; script stopped", script.name, fault),
                );
                faulted.push(script.id);
            }
        }
        self.context.console.drain_into(log);

        if !faulted.is_empty() {
            self.active.retain(|s| !faulted.contains(&s.id));
            self.evicted.extend(&faulted);
            debug!("Evicted {:?}, {} scripts remain", faulted, self.active.len());
        }

        self.ticks += 1;
        // The rate is read after the pass so a change made during tick k
        // applies from tick k+1.
        self.next_frame = now + self.interval();
        faulted.len()
    }
}
