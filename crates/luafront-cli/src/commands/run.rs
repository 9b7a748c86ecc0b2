//! Run command: attach to the game and drive the scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Instant;

use anyhow::Result;
use luafront_core::config::timing::IDLE_WAIT;
use luafront_core::{
    ExecutionScheduler, LuaEngine, ProcessProvider, SchedulerState, ScriptEngine,
    SystemProcesses,
};
use tracing::{info, warn};

use super::Workspace;
use super::validate::print_records;
use crate::cli::Cli;
use crate::input::{self, Control};

/// Run the scripts until the user quits (Ctrl+C, Esc or q)
pub fn run(cli: &Cli) -> Result<()> {
    let engine = LuaEngine::new();
    let mut workspace = Workspace::open(cli, &engine)?;
    print_records(&workspace.scripts);

    let (tx, rx) = mpsc::channel();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        let _ = ctrlc_tx.send(Control::Quit);
    })?;

    let keyboard_done = Arc::new(AtomicBool::new(false));
    let keyboard = input::spawn_keyboard_monitor(tx, Arc::clone(&keyboard_done));

    let mut scheduler = ExecutionScheduler::new(engine, SystemProcesses, workspace.profile.clone());
    scheduler.set_auto_reload(cli.auto_reload);

    println!("{}", input::HELP);
    if scheduler.start(Instant::now(), &workspace.scripts) {
        println!("Waiting for {}...", workspace.profile.executable);
    }

    let mut wake = scheduler.poll(Instant::now(), &workspace.scripts);
    loop {
        report(&mut scheduler);

        let timeout = wake.map_or(IDLE_WAIT, |at| at.saturating_duration_since(Instant::now()));
        match rx.recv_timeout(timeout) {
            Ok(Control::Quit) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(control) => apply(control, &mut scheduler, &mut workspace),
            Err(RecvTimeoutError::Timeout) => {}
        }

        wake = scheduler.poll(Instant::now(), &workspace.scripts);
    }

    scheduler.stop();
    report(&mut scheduler);
    keyboard_done.store(true, Ordering::SeqCst);
    let _ = keyboard.join();
    Ok(())
}

fn apply<E: ScriptEngine, P: ProcessProvider>(
    control: Control,
    scheduler: &mut ExecutionScheduler<E, P>,
    workspace: &mut Workspace,
) {
    let now = Instant::now();
    let accepted = match control {
        Control::Start => scheduler.start(now, &workspace.scripts),
        Control::Stop => scheduler.stop(),
        Control::Reload => scheduler.reload(now, &workspace.scripts),
        Control::ToggleAutoReload => {
            let enabled = !scheduler.auto_reload();
            scheduler.set_auto_reload(enabled);
            println!("Auto-reload {}", if enabled { "on" } else { "off" });
            true
        }
        Control::Rescan => {
            // Record ids of a running session refer to the current scan
            if scheduler.state() != SchedulerState::Stopped {
                warn!("Stop the scripts before rescanning");
                false
            } else {
                workspace.rescan(scheduler.engine());
                print_records(&workspace.scripts);
                true
            }
        }
        Control::Quit => true,
    };
    if !accepted {
        info!("{:?} ignored while {}", control, scheduler.state());
    }
}

/// Print state changes since the last call.
fn report<E: ScriptEngine, P: ProcessProvider>(scheduler: &mut ExecutionScheduler<E, P>) {
    for transition in scheduler.drain_transitions() {
        match transition.to {
            SchedulerState::Running => {
                if let Some(session) = scheduler.session() {
                    println!(
                        "Running {} scripts at base {:#x} ({} ms/frame)",
                        session.active().len(),
                        session.base_address(),
                        scheduler.current_interval().as_millis()
                    );
                }
            }
            SchedulerState::Stopped => println!("Stopped"),
            _ => {}
        }
    }
}
