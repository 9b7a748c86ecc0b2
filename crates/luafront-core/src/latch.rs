//! Process latch: keep looking for the game until it is running.
//!
//! The latch is driven by the scheduler's poll loop rather than a thread.
//! Each due attempt looks the executable up once and the next attempt is
//! scheduled one period later. A miss (the game is not running yet) is only
//! traced at debug level; the first other failure of an attach is handed
//! back as [`LatchPoll::Blocked`] so it can be shown.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use strum::Display;
use tracing::{debug, info};

use crate::config::GameProfile;
use crate::config::timing::LATCH_POLL_INTERVAL;
use crate::memory::{ProcessProvider, TargetProcess};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LatchState {
    Idle,
    Polling,
    Attached,
}

/// A live process handle and the base address computed for it.
#[derive(Clone)]
pub struct Attachment {
    pub process: Arc<dyn TargetProcess>,
    pub base_address: u64,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("pid", &self.process.pid())
            .field("base_address", &format_args!("{:#x}", self.base_address))
            .finish()
    }
}

#[derive(Debug)]
pub enum LatchPoll {
    /// Not polling
    Idle,
    /// Still looking; poll again at the given instant
    Pending(Instant),
    /// Still looking, but the lookup itself failed for a reason other than
    /// the game not running. Returned once per `begin`.
    Blocked { retry: Instant, reason: String },
    Attached(Attachment),
}

#[derive(Debug)]
pub struct ProcessLatch {
    state: LatchState,
    period: Duration,
    next_attempt: Option<Instant>,
    attempts: u32,
    reported: bool,
}

impl ProcessLatch {
    pub fn new() -> Self {
        Self::with_period(LATCH_POLL_INTERVAL)
    }

    pub fn with_period(period: Duration) -> Self {
        Self {
            state: LatchState::Idle,
            period,
            next_attempt: None,
            attempts: 0,
            reported: false,
        }
    }

    pub fn state(&self) -> LatchState {
        self.state
    }

    /// Attempts made since the last `begin`
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start polling. The first attempt is due immediately.
    pub fn begin(&mut self, now: Instant) {
        self.state = LatchState::Polling;
        self.next_attempt = Some(now);
        self.attempts = 0;
        self.reported = false;
    }

    pub fn cancel(&mut self) {
        if self.state == LatchState::Polling {
            debug!("Latch cancelled after {} attempts", self.attempts);
        }
        self.state = LatchState::Idle;
        self.next_attempt = None;
    }

    /// Make the attempt due at `now`, if any.
    pub fn poll(
        &mut self,
        now: Instant,
        provider: &dyn ProcessProvider,
        profile: &GameProfile,
    ) -> LatchPoll {
        let Some(due) = self.next_attempt else {
            return LatchPoll::Idle;
        };
        if self.state != LatchState::Polling {
            return LatchPoll::Idle;
        }
        if now < due {
            return LatchPoll::Pending(due);
        }

        self.attempts += 1;
        match provider.find(&profile.executable) {
            Ok(process) => {
                let base_address = profile.resolve_base(process.module_base());
                info!(
                    "Attached to {} (pid {}), base address {:#x}",
                    profile.executable,
                    process.pid(),
                    base_address
                );
                self.state = LatchState::Attached;
                self.next_attempt = None;
                LatchPoll::Attached(Attachment {
                    process,
                    base_address,
                })
            }
            Err(e) => {
                debug!("Latch attempt {} failed: {}", self.attempts, e);
                let next = now + self.period;
                self.next_attempt = Some(next);
                if e.is_transient() || self.reported {
                    return LatchPoll::Pending(next);
                }
                self.reported = true;
                LatchPoll::Blocked {
                    retry: next,
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl Default for ProcessLatch {
    fn default() -> Self {
        Self::new()
    }
}
