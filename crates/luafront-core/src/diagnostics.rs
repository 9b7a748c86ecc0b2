//! Diagnostic line buffer for the running session.
//!
//! Every line is also forwarded to `tracing` at the matching level, so the
//! buffer is what a frontend shows while the log is what gets kept.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local};
use serde::Serialize;
use strum::{Display, FromRepr};
use tracing::{error, info, warn};

/// Severity of a diagnostic line. The numeric values are the ones scripts
/// pass to `ConsolePrint`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display, FromRepr,
)]
#[repr(u8)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Severity {
    Message = 0,
    Success = 1,
    Warning = 2,
    Error = 3,
}

impl Severity {
    /// Map a script-supplied kind, treating unknown values as plain messages
    pub fn from_kind(kind: u8) -> Self {
        Self::from_repr(kind).unwrap_or(Self::Message)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticLine {
    pub at: DateTime<Local>,
    pub severity: Severity,
    pub text: String,
}

#[derive(Debug)]
pub struct DiagnosticLog {
    lines: VecDeque<DiagnosticLine>,
    capacity: usize,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a line and forward it to the log
    pub fn emit(&mut self, severity: Severity, text: impl Into<String>) {
        let text = text.into();
        match severity {
            Severity::Message | Severity::Success => info!("{}", text),
            Severity::Warning => warn!("{}", text),
            Severity::Error => error!("{}", text),
        }
        self.append(severity, text);
    }

    /// Record a line that has already been logged elsewhere
    pub fn append(&mut self, severity: Severity, text: impl Into<String>) {
        let text = text.into();
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(DiagnosticLine {
            at: Local::now(),
            severity,
            text,
        });
    }

    pub fn lines(&self) -> impl Iterator<Item = &DiagnosticLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines at or above `severity`
    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.lines.iter().filter(|l| l.severity >= severity).count()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(crate::config::DIAGNOSTIC_CAPACITY)
    }
}

/// Lines printed by scripts, waiting to be moved into a [`DiagnosticLog`].
///
/// Scripts print from inside hooks while the scheduler holds the log, so
/// they write here and the scheduler drains after each pass.
#[derive(Debug, Clone, Default)]
pub struct ScriptConsole {
    pending: Arc<Mutex<Vec<(Severity, String)>>>,
}

impl ScriptConsole {
    pub fn print(&self, script: &str, severity: Severity, text: &str) {
        match severity {
            Severity::Message | Severity::Success => {
                info!(target: "script", "[{}] {}", script, text)
            }
            Severity::Warning => warn!(target: "script", "[{}] {}", script, text),
            Severity::Error => error!(target: "script", "[{}] {}", script, text),
        }
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((severity, format!("[{}] {}", script, text)));
    }

    pub fn drain_into(&self, log: &mut DiagnosticLog) {
        let pending = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for (severity, text) in pending {
            log.append(severity, text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_kind() {
        assert_eq!(Severity::from_kind(0), Severity::Message);
        assert_eq!(Severity::from_kind(2), Severity::Warning);
        assert_eq!(Severity::from_kind(3), Severity::Error);
        assert_eq!(Severity::from_kind(9), Severity::Message);
    }

    #[test]
    fn test_log_drops_oldest_past_capacity() {
        let mut log = DiagnosticLog::new(2);
        log.emit(Severity::Message, "one");
        log.emit(Severity::Warning, "two");
        log.emit(Severity::Error, "three");

        let texts: Vec<_> = log.lines().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);
        assert_eq!(log.count_at_least(Severity::Warning), 2);
        assert_eq!(log.count_at_least(Severity::Error), 1);
    }

    #[test]
    fn test_console_drains_in_order() {
        let console = ScriptConsole::default();
        let script_side = console.clone();
        script_side.print("hud", Severity::Success, "ready");
        script_side.print("hud", Severity::Warning, "slow frame");

        let mut log = DiagnosticLog::new(8);
        console.drain_into(&mut log);
        let texts: Vec<_> = log.lines().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["[hud] ready", "[hud] slow frame"]);

        console.drain_into(&mut log);
        assert_eq!(log.len(), 2);
    }
}
