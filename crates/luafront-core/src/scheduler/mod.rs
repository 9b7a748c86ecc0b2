//! Script execution scheduler.
//!
//! ```text
//! Stopped -> Attaching -> Initializing -> Running -> Stopped
//!                ^                           |
//!                +------- Reloading <--------+
//! ```
//!
//! The scheduler does no waiting of its own. The caller drives it with
//! [`ExecutionScheduler::poll`], which performs whatever step is due at
//! `now` (a latch attempt or a frame tick) and returns when it next wants to
//! be polled. Control requests are applied between polls.

mod session;

use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use strum::Display;
use tracing::info;

use crate::catalog::ScriptCatalog;
use crate::config::GameProfile;
use crate::diagnostics::{DiagnosticLog, Severity};
use crate::engine::{FrameClock, Hook, ScriptContext, ScriptEngine, ScriptUnit};
use crate::latch::{Attachment, LatchPoll, ProcessLatch};
use crate::memory::{GameMemory, Liveness, ProcessProvider};

pub use session::{ActiveScript, ExecutionSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum SchedulerState {
    Stopped,
    Attaching,
    Initializing,
    Running,
    Reloading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: SchedulerState,
    pub to: SchedulerState,
}

/// Which controls a frontend should offer in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Controls {
    pub start: bool,
    pub stop: bool,
    pub reload: bool,
}

pub struct ExecutionScheduler<E: ScriptEngine, P: ProcessProvider> {
    engine: E,
    provider: P,
    profile: GameProfile,
    state: SchedulerState,
    latch: ProcessLatch,
    session: Option<ExecutionSession<E::Unit>>,
    auto_reload: bool,
    diagnostics: DiagnosticLog,
    transitions: VecDeque<Transition>,
}

impl<E: ScriptEngine, P: ProcessProvider> ExecutionScheduler<E, P> {
    pub fn new(engine: E, provider: P, profile: GameProfile) -> Self {
        Self {
            engine,
            provider,
            profile,
            state: SchedulerState::Stopped,
            latch: ProcessLatch::new(),
            session: None,
            auto_reload: false,
            diagnostics: DiagnosticLog::default(),
            transitions: VecDeque::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn profile(&self) -> &GameProfile {
        &self.profile
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn session(&self) -> Option<&ExecutionSession<E::Unit>> {
        self.session.as_ref()
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    pub fn auto_reload(&self) -> bool {
        self.auto_reload
    }

    pub fn set_auto_reload(&mut self, enabled: bool) {
        if self.auto_reload != enabled {
            info!(
                "Auto-reload {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        self.auto_reload = enabled;
    }

    pub fn controls(&self) -> Controls {
        let stopped = self.state == SchedulerState::Stopped;
        Controls {
            start: stopped,
            stop: !stopped,
            reload: !stopped,
        }
    }

    /// Frame interval of the running session, or the default one
    pub fn current_interval(&self) -> Duration {
        self.session
            .as_ref()
            .map_or_else(|| FrameClock::default().interval(), |s| s.interval())
    }

    /// State changes since the last call, oldest first
    pub fn drain_transitions(&mut self) -> Vec<Transition> {
        self.transitions.drain(..).collect()
    }

    /// Begin looking for the game. Only valid from `Stopped`, and only
    /// once the catalog has found its script folder.
    pub fn start(&mut self, now: Instant, catalog: &ScriptCatalog) -> bool {
        if self.state != SchedulerState::Stopped {
            return false;
        }
        self.begin_attach(now, catalog)
    }

    /// Drop the session (or stop looking for the game).
    pub fn stop(&mut self) -> bool {
        if self.state == SchedulerState::Stopped {
            return false;
        }
        self.teardown();
        self.set_state(SchedulerState::Stopped);
        true
    }

    /// Drop the session and attach again with freshly loaded scripts.
    pub fn reload(&mut self, now: Instant, catalog: &ScriptCatalog) -> bool {
        if self.state == SchedulerState::Stopped {
            return false;
        }
        self.teardown();
        self.set_state(SchedulerState::Reloading);
        self.begin_attach(now, catalog);
        true
    }

    /// Perform the step due at `now` and return when to poll next.
    /// `None` means nothing is scheduled.
    pub fn poll(&mut self, now: Instant, catalog: &ScriptCatalog) -> Option<Instant> {
        match self.state {
            SchedulerState::Attaching => {
                match self.latch.poll(now, &self.provider, &self.profile) {
                    LatchPoll::Idle => None,
                    LatchPoll::Pending(next) => Some(next),
                    LatchPoll::Blocked { retry, reason } => {
                        self.diagnostics.emit(
                            Severity::Warning,
                            format!(
                                "Cannot look for {}: {}; still trying",
                                self.profile.executable, reason
                            ),
                        );
                        Some(retry)
                    }
                    LatchPoll::Attached(attachment) => {
                        self.launch_session(now, attachment, catalog);
                        self.session.as_ref().map(|s| s.next_frame())
                    }
                }
            }
            SchedulerState::Running => self.tick(now, catalog),
            SchedulerState::Stopped
            | SchedulerState::Initializing
            | SchedulerState::Reloading => None,
        }
    }

    fn tick(&mut self, now: Instant, catalog: &ScriptCatalog) -> Option<Instant> {
        let session = self.session.as_mut()?;
        if now < session.next_frame() {
            return Some(session.next_frame());
        }
        session.run_frame(now, &mut self.diagnostics);

        if self.auto_reload && session.liveness() == Liveness::Exited {
            self.reload(now, catalog);
            self.diagnostics
                .emit(Severity::Warning, "Game process exited; reloading");
            return self.poll(now, catalog);
        }
        Some(session.next_frame())
    }

    fn begin_attach(&mut self, now: Instant, catalog: &ScriptCatalog) -> bool {
        if !catalog.is_loaded() {
            self.diagnostics.emit(
                Severity::Error,
                "Script folder not found; rescan before starting",
            );
            self.set_state(SchedulerState::Stopped);
            return false;
        }
        self.latch.begin(now);
        self.set_state(SchedulerState::Attaching);
        true
    }

    fn launch_session(&mut self, now: Instant, attachment: Attachment, catalog: &ScriptCatalog) {
        let memory = GameMemory::attached(
            attachment.process,
            attachment.base_address,
            self.profile.endianness,
            self.profile.encoding,
        );
        let script_dir = catalog.directory().unwrap_or(Path::new("."));
        let context = ScriptContext::live(&self.profile, script_dir, memory);

        self.set_state(SchedulerState::Initializing);
        let mut active = Vec::new();
        for (id, record) in catalog.executable() {
            match self.engine.parse(&record.path, &context) {
                // edited since the scan
                Ok(unit) if !unit.has_hook(Hook::Init) && !unit.has_hook(Hook::Frame) => {
                    self.diagnostics.emit(
                        Severity::Error,
                        format!("{}: no hook functions found; skipped", record.name),
                    )
                }
                Ok(unit) => active.push(ActiveScript::new(id, record.name.clone(), unit)),
                Err(e) => self.diagnostics.emit(
                    Severity::Error,
                    format!("{}: failed to load: {}", record.name, e),
                ),
            }
        }
        info!("Running {} scripts", active.len());

        let mut session = ExecutionSession::new(context, active, now);
        session.run_init(now, &mut self.diagnostics);
        self.session = Some(session);
        self.set_state(SchedulerState::Running);
    }

    fn teardown(&mut self) {
        self.latch.cancel();
        self.session = None;
        self.diagnostics.clear();
    }

    fn set_state(&mut self, to: SchedulerState) {
        let from = self.state;
        if from == to {
            return;
        }
        info!("{} -> {}", from, to);
        self.state = to;
        self.transitions.push_back(Transition { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ScriptId;
    use crate::config::GameCatalog;
    use crate::engine::{Hook, MockEngine, MockScript};
    use crate::memory::{MockProcessBuilder, MockProcessProvider};
    use std::fs;
    use tempfile::TempDir;

    const FRAME: Duration = Duration::from_millis(16);

    type MockScheduler = ExecutionScheduler<MockEngine, MockProcessProvider>;

    struct Fixture {
        _dir: TempDir,
        catalog: ScriptCatalog,
        scheduler: MockScheduler,
    }

    impl Fixture {
        fn new(scripts: Vec<(&str, MockScript)>) -> Self {
            let profile = GameCatalog::parse(
                r#"
[GameEntry00]
Title = "Test Game"
Executable = "game.exe"
Path = "scripts"
Offset = "100"
"#,
            )
            .unwrap()
            .games()[0]
                .clone();

            let dir = TempDir::new().unwrap();
            let engine = MockEngine::new();
            for (file, script) in scripts {
                fs::write(dir.path().join(file), "").unwrap();
                engine.script(file, script);
            }
            let mut catalog = ScriptCatalog::new();
            catalog.scan(&engine, &profile, dir.path()).unwrap();

            Self {
                _dir: dir,
                catalog,
                scheduler: ExecutionScheduler::new(engine, MockProcessProvider::new(), profile),
            }
        }

        fn launch_game(&self) {
            self.scheduler.provider().launch(
                "game.exe",
                MockProcessBuilder::new().module_base(0x1000).build(),
            );
        }

        /// Start with the game already running; returns the first frame deadline
        fn run(&mut self, now: Instant) -> Instant {
            self.launch_game();
            assert!(self.scheduler.start(now, &self.catalog));
            self.scheduler.poll(now, &self.catalog).unwrap()
        }

        fn poll(&mut self, now: Instant) -> Option<Instant> {
            self.scheduler.poll(now, &self.catalog)
        }

        fn active(&self) -> Vec<ScriptId> {
            self.scheduler.session().unwrap().active_ids()
        }

        fn ticks(&self) -> u64 {
            self.scheduler.session().unwrap().ticks()
        }
    }

    #[test]
    fn test_scenario_eviction_on_second_frame() {
        let mut f = Fixture::new(vec![
            ("a.lua", MockScript::valid()),
            ("b.lua", MockScript::valid().without_init().without_frame()),
            ("c.lua", MockScript::valid().without_init().failing_frame_at(2)),
        ]);
        assert!(f.catalog.set_enabled_by_name("c", true));

        let t0 = Instant::now();
        let tick1 = f.run(t0);
        assert_eq!(tick1, t0 + FRAME);
        assert_eq!(f.scheduler.state(), SchedulerState::Running);
        assert_eq!(f.active(), vec![0, 2]);
        assert_eq!(f.scheduler.engine().calls_of(Hook::Init), vec!["a"]);

        let tick2 = f.poll(tick1).unwrap();
        assert_eq!(f.active(), vec![0, 2]);
        assert!(f.scheduler.diagnostics().is_empty());

        let tick3 = f.poll(tick2).unwrap();
        assert_eq!(f.active(), vec![0]);
        assert_eq!(f.scheduler.session().unwrap().evicted(), &[2]);
        let errors: Vec<_> = f
            .scheduler
            .diagnostics()
            .lines()
            .filter(|l| l.severity == Severity::Error)
            .map(|l| l.text.clone())
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("c: "), "{}", errors[0]);

        f.poll(tick3);
        assert_eq!(
            f.scheduler.engine().calls_of(Hook::Frame),
            vec!["a", "c", "a", "c", "a"]
        );
    }

    #[test]
    fn test_missing_hooks_never_active_even_if_enabled() {
        let mut f = Fixture::new(vec![
            ("a.lua", MockScript::valid()),
            ("b.lua", MockScript::valid().without_init().without_frame()),
            ("x.lua", MockScript::broken("x.lua:3: '=' expected")),
        ]);
        f.catalog.set_enabled_by_name("b", true);
        f.catalog.set_enabled_by_name("x", true);

        let t0 = Instant::now();
        f.run(t0);
        assert_eq!(f.active(), vec![0]);
        assert_eq!(f.scheduler.engine().parses().iter().filter(|p| *p == "b.lua").count(), 1);
    }

    #[test]
    fn test_eviction_at_tick_k() {
        for k in 1..=4u32 {
            let mut f = Fixture::new(vec![
                ("a.lua", MockScript::valid()),
                ("z.lua", MockScript::valid().failing_frame_at(k)),
            ]);
            let mut now = f.run(Instant::now());
            for tick in 1..=6u32 {
                let before = f.active();
                now = f.poll(now).unwrap();
                if tick <= k {
                    assert!(before.contains(&1), "k={k} tick={tick}");
                } else {
                    assert!(!before.contains(&1), "k={k} tick={tick}");
                }
            }
            let frames_of_z = f
                .scheduler
                .engine()
                .calls_of(Hook::Frame)
                .iter()
                .filter(|n| *n == "z")
                .count();
            assert_eq!(frames_of_z, k as usize);
        }
    }

    #[test]
    fn test_interval_change_applies_from_next_tick() {
        let mut f = Fixture::new(vec![("a.lua", MockScript::valid().setting_hertz_at(1, 50))]);
        let tick1 = f.run(Instant::now());

        let tick2 = f.poll(tick1).unwrap();
        assert_eq!(tick2, tick1 + Duration::from_millis(20));
        assert_eq!(f.scheduler.current_interval(), Duration::from_millis(20));

        // the old deadline no longer fires
        assert_eq!(f.poll(tick1 + FRAME), Some(tick2));
        assert_eq!(f.ticks(), 1);

        f.poll(tick2);
        assert_eq!(f.ticks(), 2);
    }

    #[test]
    fn test_late_poll_runs_a_single_tick() {
        let mut f = Fixture::new(vec![("a.lua", MockScript::valid())]);
        let tick1 = f.run(Instant::now());

        let late = tick1 + Duration::from_secs(1);
        let next = f.poll(late).unwrap();
        assert_eq!(f.ticks(), 1);
        assert_eq!(next, late + FRAME);
    }

    #[test]
    fn test_stop_then_start_recomputes_active_set() {
        let mut f = Fixture::new(vec![
            ("a.lua", MockScript::valid()),
            ("b.lua", MockScript::valid().without_init()),
            ("c.lua", MockScript::valid().failing_frame_at(1)),
        ]);
        let t0 = Instant::now();
        let tick1 = f.run(t0);
        f.poll(tick1);
        assert_eq!(f.active(), vec![0]);

        assert!(f.scheduler.stop());
        assert!(f.scheduler.session().is_none());
        assert!(f.scheduler.diagnostics().is_empty());

        f.catalog.set_enabled_by_name("a", false);
        f.catalog.set_enabled_by_name("b", true);
        let t1 = tick1 + Duration::from_secs(1);
        assert!(f.scheduler.start(t1, &f.catalog));
        f.poll(t1);

        // c is back: evictions do not outlive their session
        assert_eq!(f.active(), vec![1, 2]);
        assert_eq!(f.scheduler.engine().calls_of(Hook::Init), vec!["a", "c", "c"]);
    }

    #[test]
    fn test_latch_polls_until_process_appears() {
        let mut f = Fixture::new(vec![("a.lua", MockScript::valid())]);
        let t0 = Instant::now();
        assert!(f.scheduler.start(t0, &f.catalog));

        let mut now = t0;
        for _ in 0..5 {
            now = f.poll(now).unwrap();
            assert_eq!(f.scheduler.state(), SchedulerState::Attaching);
        }
        assert_eq!(f.scheduler.provider().attempts(), 5);

        f.launch_game();
        f.poll(now);
        assert_eq!(f.scheduler.state(), SchedulerState::Running);
        assert_eq!(f.scheduler.session().unwrap().base_address(), 0x1100);
        assert!(f.scheduler.diagnostics().is_empty());
    }

    #[test]
    fn test_stop_while_attaching_is_silent() {
        let mut f = Fixture::new(vec![("a.lua", MockScript::valid())]);
        let t0 = Instant::now();
        f.scheduler.start(t0, &f.catalog);
        let next = f.poll(t0).unwrap();

        assert!(f.scheduler.stop());
        assert_eq!(f.poll(next), None);
        assert_eq!(f.scheduler.provider().attempts(), 1);
        assert!(f.scheduler.diagnostics().is_empty());
        assert!(f.scheduler.engine().calls().is_empty());
        assert_eq!(
            f.scheduler.drain_transitions(),
            vec![
                Transition {
                    from: SchedulerState::Stopped,
                    to: SchedulerState::Attaching,
                },
                Transition {
                    from: SchedulerState::Attaching,
                    to: SchedulerState::Stopped,
                },
            ]
        );
    }

    #[test]
    fn test_controls_follow_state() {
        let mut f = Fixture::new(vec![("a.lua", MockScript::valid())]);
        let now = Instant::now();
        assert_eq!(
            f.scheduler.controls(),
            Controls {
                start: true,
                stop: false,
                reload: false,
            }
        );
        assert!(!f.scheduler.stop());
        assert!(!f.scheduler.reload(now, &f.catalog));

        f.run(now);
        assert_eq!(
            f.scheduler.controls(),
            Controls {
                start: false,
                stop: true,
                reload: true,
            }
        );
        assert!(!f.scheduler.start(now, &f.catalog));
    }

    #[test]
    fn test_reload_runs_init_again() {
        let mut f = Fixture::new(vec![("a.lua", MockScript::valid())]);
        let t0 = Instant::now();
        let tick1 = f.run(t0);
        f.poll(tick1);
        f.scheduler.drain_transitions();

        assert!(f.scheduler.reload(tick1, &f.catalog));
        f.poll(tick1);
        assert_eq!(f.scheduler.state(), SchedulerState::Running);
        assert_eq!(f.ticks(), 0);
        assert_eq!(f.scheduler.engine().calls_of(Hook::Init), vec!["a", "a"]);

        let states: Vec<_> = f
            .scheduler
            .drain_transitions()
            .into_iter()
            .map(|t| t.to)
            .collect();
        assert_eq!(
            states,
            vec![
                SchedulerState::Reloading,
                SchedulerState::Attaching,
                SchedulerState::Initializing,
                SchedulerState::Running,
            ]
        );
    }

    #[test]
    fn test_init_fault_keeps_script_active() {
        let mut f = Fixture::new(vec![("a.lua", MockScript::valid().failing_init())]);
        let tick1 = f.run(Instant::now());
        assert_eq!(f.scheduler.diagnostics().count_at_least(Severity::Error), 1);

        f.poll(tick1);
        assert_eq!(f.active(), vec![0]);
        assert_eq!(f.scheduler.engine().calls_of(Hook::Frame), vec!["a"]);
    }

    #[test]
    fn test_live_load_failure_skips_script() {
        let mut f = Fixture::new(vec![
            ("a.lua", MockScript::valid()),
            ("b.lua", MockScript::valid()),
        ]);
        f.scheduler
            .engine()
            .script("a.lua", MockScript::broken("a.lua:1: unexpected symbol"));

        f.run(Instant::now());
        assert_eq!(f.active(), vec![1]);
        let line = f.scheduler.diagnostics().lines().next().unwrap();
        assert_eq!(line.severity, Severity::Error);
        assert!(line.text.contains("failed to load"));
    }

    #[test]
    fn test_script_without_hooks_at_launch_is_skipped() {
        let mut f = Fixture::new(vec![
            ("a.lua", MockScript::valid()),
            ("b.lua", MockScript::valid()),
        ]);
        f.scheduler
            .engine()
            .script("b.lua", MockScript::valid().without_init().without_frame());

        let tick1 = f.run(Instant::now());
        assert_eq!(f.active(), vec![0]);
        let line = f.scheduler.diagnostics().lines().next().unwrap();
        assert_eq!(line.severity, Severity::Error);
        assert!(line.text.starts_with("b: no hook functions"), "{}", line.text);

        f.poll(tick1);
        assert_eq!(f.scheduler.engine().calls_of(Hook::Frame), vec!["a"]);
    }

    #[test]
    fn test_attach_failure_is_reported_once() {
        let mut f = Fixture::new(vec![("a.lua", MockScript::valid())]);
        f.scheduler.provider().refuse("process attach");
        let t0 = Instant::now();
        assert!(f.scheduler.start(t0, &f.catalog));

        let mut now = t0;
        for _ in 0..4 {
            now = f.poll(now).unwrap();
        }
        assert_eq!(f.scheduler.state(), SchedulerState::Attaching);
        let warnings: Vec<_> = f
            .scheduler
            .diagnostics()
            .lines()
            .filter(|l| l.severity == Severity::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].text.contains("game.exe"), "{}", warnings[0].text);

        f.launch_game();
        f.poll(now);
        assert_eq!(f.scheduler.state(), SchedulerState::Running);
    }

    #[test]
    fn test_start_refused_without_script_folder() {
        let mut f = Fixture::new(vec![("a.lua", MockScript::valid())]);
        let missing = f._dir.path().join("missing");
        let profile = f.scheduler.profile().clone();
        let _ = f.catalog.scan(f.scheduler.engine(), &profile, &missing);

        f.launch_game();
        assert!(!f.scheduler.start(Instant::now(), &f.catalog));
        assert_eq!(f.scheduler.state(), SchedulerState::Stopped);
        assert_eq!(f.scheduler.diagnostics().count_at_least(Severity::Error), 1);
        assert_eq!(f.scheduler.provider().attempts(), 0);
    }

    #[test]
    fn test_auto_reload_after_exit() {
        let mut f = Fixture::new(vec![("a.lua", MockScript::valid())]);
        f.scheduler.set_auto_reload(true);
        let tick1 = f.run(Instant::now());
        let tick2 = f.poll(tick1).unwrap();

        f.scheduler.provider().terminate();
        let next = f.poll(tick2).unwrap();
        assert_eq!(f.scheduler.state(), SchedulerState::Attaching);
        assert!(f.scheduler.session().is_none());
        assert_eq!(f.scheduler.diagnostics().count_at_least(Severity::Warning), 1);

        f.launch_game();
        f.poll(next);
        assert_eq!(f.scheduler.state(), SchedulerState::Running);
        assert_eq!(f.scheduler.engine().calls_of(Hook::Init), vec!["a", "a"]);
    }

    #[test]
    fn test_exit_without_auto_reload_keeps_running() {
        let mut f = Fixture::new(vec![("a.lua", MockScript::valid())]);
        let tick1 = f.run(Instant::now());
        f.scheduler.provider().terminate();
        f.poll(tick1);
        assert_eq!(f.scheduler.state(), SchedulerState::Running);
    }

    #[test]
    fn test_unknown_liveness_never_reloads() {
        let mut f = Fixture::new(vec![("a.lua", MockScript::valid())]);
        f.scheduler.set_auto_reload(true);
        f.scheduler.provider().launch(
            "game.exe",
            MockProcessBuilder::new()
                .liveness(Liveness::Unknown)
                .build(),
        );
        let t0 = Instant::now();
        f.scheduler.start(t0, &f.catalog);
        let mut now = f.poll(t0).unwrap();
        for _ in 0..3 {
            now = f.poll(now).unwrap();
        }
        assert_eq!(f.scheduler.state(), SchedulerState::Running);
        assert_eq!(f.ticks(), 3);
    }
}
