//! In-memory process doubles for tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use super::{Liveness, ProcessProvider, ReadMemory, TargetProcess, WriteMemory};
use crate::error::{Error, Result};

/// Sparse byte-addressed memory; unwritten bytes read as zero.
pub struct MockProcess {
    pid: u32,
    module_base: u64,
    memory: RefCell<HashMap<u64, u8>>,
    liveness: Cell<Liveness>,
}

impl MockProcess {
    pub fn set_liveness(&self, liveness: Liveness) {
        self.liveness.set(liveness);
    }
}

impl ReadMemory for MockProcess {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let memory = self.memory.borrow();
        Ok((0..size as u64)
            .map(|i| memory.get(&(address + i)).copied().unwrap_or(0))
            .collect())
    }
}

impl WriteMemory for MockProcess {
    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
        let mut memory = self.memory.borrow_mut();
        for (i, byte) in data.iter().enumerate() {
            memory.insert(address + i as u64, *byte);
        }
        Ok(())
    }
}

impl TargetProcess for MockProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn module_base(&self) -> u64 {
        self.module_base
    }

    fn liveness(&self) -> Liveness {
        self.liveness.get()
    }
}

#[derive(Default)]
pub struct MockProcessBuilder {
    pid: u32,
    module_base: u64,
    memory: HashMap<u64, u8>,
    liveness: Option<Liveness>,
}

impl MockProcessBuilder {
    pub fn new() -> Self {
        Self {
            pid: 4242,
            ..Default::default()
        }
    }

    pub fn module_base(mut self, base: u64) -> Self {
        self.module_base = base;
        self
    }

    pub fn bytes(mut self, address: u64, data: &[u8]) -> Self {
        for (i, byte) in data.iter().enumerate() {
            self.memory.insert(address + i as u64, *byte);
        }
        self
    }

    pub fn liveness(mut self, liveness: Liveness) -> Self {
        self.liveness = Some(liveness);
        self
    }

    pub fn build(self) -> MockProcess {
        MockProcess {
            pid: self.pid,
            module_base: self.module_base,
            memory: RefCell::new(self.memory),
            liveness: Cell::new(self.liveness.unwrap_or(Liveness::Alive)),
        }
    }
}

/// Provider that finds its process only after [`launch`](Self::launch).
#[derive(Default)]
pub struct MockProcessProvider {
    running: RefCell<Option<(String, Arc<MockProcess>)>>,
    refusal: Cell<Option<&'static str>>,
    attempts: Cell<u32>,
}

impl MockProcessProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launch(&self, executable: &str, process: MockProcess) -> Arc<MockProcess> {
        let process = Arc::new(process);
        *self.running.borrow_mut() = Some((executable.to_string(), Arc::clone(&process)));
        self.refusal.set(None);
        process
    }

    /// Fail every lookup with [`Error::Unsupported`] until the next launch
    pub fn refuse(&self, what: &'static str) {
        self.refusal.set(Some(what));
    }

    pub fn terminate(&self) {
        if let Some((_, process)) = self.running.borrow_mut().take() {
            process.set_liveness(Liveness::Exited);
        }
    }

    /// Number of `find` calls so far
    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }
}

impl ProcessProvider for MockProcessProvider {
    fn find(&self, executable: &str) -> Result<Arc<dyn TargetProcess>> {
        self.attempts.set(self.attempts.get() + 1);
        if let Some(what) = self.refusal.get() {
            return Err(Error::Unsupported(what));
        }
        match &*self.running.borrow() {
            Some((name, process)) if name.eq_ignore_ascii_case(executable) => {
                Ok(Arc::clone(process) as Arc<dyn TargetProcess>)
            }
            _ => Err(Error::ProcessNotFound(executable.to_string())),
        }
    }
}
