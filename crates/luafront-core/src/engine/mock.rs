//! Scripted engine double: behaviour is keyed by file name, and every hook
//! call lands in a shared log.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use super::{FrameClock, Hook, HookFault, ScriptContext, ScriptEngine, ScriptError, ScriptUnit};

#[derive(Debug, Clone)]
pub struct MockScript {
    init: bool,
    frame: bool,
    parse_error: Option<String>,
    touches_memory: bool,
    fail_init: bool,
    fail_frame_at: Option<u32>,
    hertz_at: Option<(u32, u32)>,
    globals: HashMap<String, String>,
}

impl MockScript {
    /// Both hooks, no faults
    pub fn valid() -> Self {
        Self {
            init: true,
            frame: true,
            parse_error: None,
            touches_memory: false,
            fail_init: false,
            fail_frame_at: None,
            hertz_at: None,
            globals: HashMap::new(),
        }
    }

    pub fn broken(message: &str) -> Self {
        Self {
            parse_error: Some(message.to_string()),
            ..Self::valid()
        }
    }

    pub fn without_init(mut self) -> Self {
        self.init = false;
        self
    }

    pub fn without_frame(mut self) -> Self {
        self.frame = false;
        self
    }

    /// Read target memory while loading, like a top-level `ReadInt` call
    pub fn touching_memory(mut self) -> Self {
        self.touches_memory = true;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Fault on the `n`th frame call (1-based)
    pub fn failing_frame_at(mut self, n: u32) -> Self {
        self.fail_frame_at = Some(n);
        self
    }

    /// Publish `hertz` during the `n`th frame call
    pub fn setting_hertz_at(mut self, n: u32, hertz: u32) -> Self {
        self.hertz_at = Some((n, hertz));
        self
    }

    pub fn global(mut self, name: &str, value: &str) -> Self {
        self.globals.insert(name.to_string(), value.to_string());
        self
    }
}

pub type CallLog = Rc<RefCell<Vec<(String, Hook)>>>;

#[derive(Default)]
pub struct MockEngine {
    scripts: RefCell<HashMap<String, MockScript>>,
    calls: CallLog,
    parses: RefCell<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the behaviour of `file_name`
    pub fn script(&self, file_name: &str, script: MockScript) -> &Self {
        self.scripts
            .borrow_mut()
            .insert(file_name.to_string(), script);
        self
    }

    /// Hook calls so far, as `(file stem, hook)`
    pub fn calls(&self) -> Vec<(String, Hook)> {
        self.calls.borrow().clone()
    }

    pub fn calls_of(&self, hook: Hook) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|(_, h)| *h == hook)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// File names parsed so far
    pub fn parses(&self) -> Vec<String> {
        self.parses.borrow().clone()
    }
}

impl ScriptEngine for MockEngine {
    type Unit = MockUnit;

    fn parse(&self, path: &Path, context: &ScriptContext) -> Result<MockUnit, ScriptError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.parses.borrow_mut().push(file_name.clone());

        let script = self
            .scripts
            .borrow()
            .get(&file_name)
            .cloned()
            .ok_or_else(|| ScriptError::new(format!("{file_name}: unexpected script")))?;
        if let Some(message) = &script.parse_error {
            return Err(ScriptError::new(message.clone()));
        }
        if script.touches_memory {
            context
                .memory
                .read_u32(context.memory.relative(0))
                .map_err(|e| ScriptError::new(format!("{file_name}: {e}")))?;
        }

        let name = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(MockUnit {
            name,
            script,
            frames: 0,
            clock: context.clock.clone(),
            calls: Rc::clone(&self.calls),
        })
    }
}

pub struct MockUnit {
    name: String,
    script: MockScript,
    frames: u32,
    clock: FrameClock,
    calls: CallLog,
}

impl ScriptUnit for MockUnit {
    fn has_hook(&self, hook: Hook) -> bool {
        match hook {
            Hook::Init => self.script.init,
            Hook::Frame => self.script.frame,
        }
    }

    fn global_text(&self, name: &str) -> Option<String> {
        self.script
            .globals
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned()
    }

    fn invoke(&mut self, hook: Hook) -> Result<(), HookFault> {
        if !self.has_hook(hook) {
            return Ok(());
        }
        self.calls.borrow_mut().push((self.name.clone(), hook));

        let fault = |message: &str| HookFault {
            hook,
            message: message.to_string(),
        };
        match hook {
            Hook::Init if self.script.fail_init => Err(fault("init exploded")),
            Hook::Init => Ok(()),
            Hook::Frame => {
                self.frames += 1;
                if let Some((n, hertz)) = self.script.hertz_at
                    && n == self.frames
                {
                    self.clock.set_hertz(hertz);
                }
                if self.script.fail_frame_at == Some(self.frames) {
                    return Err(fault("frame exploded"));
                }
                Ok(())
            }
        }
    }
}
