use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// A request from the keyboard (or Ctrl+C) to the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Start,
    Stop,
    Reload,
    ToggleAutoReload,
    Rescan,
    Quit,
}

pub const HELP: &str =
    "[s] start  [x] stop  [r] reload  [a] toggle auto-reload  [l] rescan  [q/Esc] quit";

/// Spawn a thread that turns key presses into [`Control`]s.
///
/// The thread exits when `done` is set, after sending `Quit`, or when the
/// receiving side is gone.
pub fn spawn_keyboard_monitor(controls: Sender<Control>, done: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        debug!("Keyboard monitor started");

        while !done.load(Ordering::SeqCst) {
            // Poll with a timeout so `done` is rechecked
            if event::poll(Duration::from_millis(100)).unwrap_or(false)
                && let Ok(Event::Key(key_event)) = event::read()
                && let Some(control) = control_for(&key_event)
            {
                debug!("Key {:?} -> {:?}", key_event.code, control);
                if controls.send(control).is_err() || control == Control::Quit {
                    break;
                }
            }
        }

        debug!("Keyboard monitor stopped");
    })
}

fn control_for(event: &KeyEvent) -> Option<Control> {
    match event.code {
        KeyCode::Esc => Some(Control::Quit),
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Control::Quit)
        }
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            'q' => Some(Control::Quit),
            's' => Some(Control::Start),
            'x' => Some(Control::Stop),
            'r' => Some(Control::Reload),
            'a' => Some(Control::ToggleAutoReload),
            'l' => Some(Control::Rescan),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Option<Control> {
        control_for(&KeyEvent::new(code, modifiers))
    }

    #[test]
    fn test_quit_keys() {
        assert_eq!(key(KeyCode::Esc, KeyModifiers::NONE), Some(Control::Quit));
        assert_eq!(key(KeyCode::Char('q'), KeyModifiers::NONE), Some(Control::Quit));
        assert_eq!(key(KeyCode::Char('Q'), KeyModifiers::SHIFT), Some(Control::Quit));
        assert_eq!(
            key(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(Control::Quit)
        );
    }

    #[test]
    fn test_scheduler_keys() {
        assert_eq!(key(KeyCode::Char('s'), KeyModifiers::NONE), Some(Control::Start));
        assert_eq!(key(KeyCode::Char('x'), KeyModifiers::NONE), Some(Control::Stop));
        assert_eq!(key(KeyCode::Char('R'), KeyModifiers::SHIFT), Some(Control::Reload));
        assert_eq!(
            key(KeyCode::Char('a'), KeyModifiers::NONE),
            Some(Control::ToggleAutoReload)
        );
        assert_eq!(key(KeyCode::Char('l'), KeyModifiers::NONE), Some(Control::Rescan));
    }

    #[test]
    fn test_other_keys_ignored() {
        assert_eq!(key(KeyCode::Char('c'), KeyModifiers::NONE), None);
        assert_eq!(key(KeyCode::Enter, KeyModifiers::NONE), None);
        assert_eq!(key(KeyCode::Char('z'), KeyModifiers::NONE), None);
    }
}
