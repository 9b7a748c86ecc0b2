//! Target process discovery and raw memory access.
//!
//! [`SystemProcesses`] is the platform implementation of [`ProcessProvider`]:
//! Toolhelp snapshots and `ReadProcessMemory` on Windows, `/proc` and
//! `process_vm_readv` on Linux. Other platforms never find a process.

use std::sync::Arc;

use strum::Display;

use crate::error::Result;

/// Whether the target process is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Liveness {
    Alive,
    Exited,
    /// The platform cannot tell
    Unknown,
}

pub trait ReadMemory {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;
}

pub trait WriteMemory {
    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()>;
}

/// An opened target process.
pub trait TargetProcess: ReadMemory + WriteMemory {
    fn pid(&self) -> u32;

    /// Load address of the process's main module
    fn module_base(&self) -> u64;

    fn liveness(&self) -> Liveness;
}

/// Locates and opens target processes by executable name.
pub trait ProcessProvider {
    /// Find a running process whose executable matches `executable`
    /// (case-insensitive) and resolve the module of the same name.
    fn find(&self, executable: &str) -> Result<Arc<dyn TargetProcess>>;
}

/// Process provider backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

impl ProcessProvider for SystemProcesses {
    fn find(&self, executable: &str) -> Result<Arc<dyn TargetProcess>> {
        let handle = platform::ProcessHandle::find_and_open(executable)?;
        Ok(Arc::new(handle))
    }
}

pub use platform::ProcessHandle;

fn names_match(candidate: &str, executable: &str) -> bool {
    candidate.eq_ignore_ascii_case(executable)
}

#[cfg(target_os = "windows")]
mod platform {
    use std::ffi::c_void;

    use tracing::debug;
    use windows::Win32::Foundation::{CloseHandle, HANDLE, STILL_ACTIVE};
    use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, PROCESSENTRY32W,
        Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32,
        TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_VM_OPERATION,
        PROCESS_VM_READ, PROCESS_VM_WRITE,
    };

    use super::{Liveness, ReadMemory, TargetProcess, WriteMemory, names_match};
    use crate::error::{Error, Result};

    /// Closes the wrapped handle on drop.
    struct OwnedHandle(HANDLE);

    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            if !self.0.is_invalid() {
                // SAFETY: the handle was returned by a successful Win32 call and
                // is closed exactly once.
                unsafe {
                    let _ = CloseHandle(self.0);
                }
            }
        }
    }

    fn wide_to_string(buffer: &[u16]) -> String {
        let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
        String::from_utf16_lossy(&buffer[..len])
    }

    /// An opened Windows process
    pub struct ProcessHandle {
        handle: OwnedHandle,
        pub pid: u32,
        pub base_address: u64,
    }

    impl ProcessHandle {
        pub fn find_and_open(executable: &str) -> Result<Self> {
            let pid = find_pid(executable)?;
            let base_address = find_module_base(pid, executable)?;

            // SAFETY: OpenProcess has no memory-safety preconditions.
            let handle = unsafe {
                OpenProcess(
                    PROCESS_VM_READ
                        | PROCESS_VM_WRITE
                        | PROCESS_VM_OPERATION
                        | PROCESS_QUERY_LIMITED_INFORMATION,
                    false,
                    pid,
                )
            }
            .map_err(|e| Error::ProcessOpenFailed(format!("{} (pid {}): {}", executable, pid, e)))?;

            debug!("Opened {} (pid {}, base {:#x})", executable, pid, base_address);
            Ok(Self {
                handle: OwnedHandle(handle),
                pid,
                base_address,
            })
        }
    }

    fn find_pid(executable: &str) -> Result<u32> {
        // SAFETY: CreateToolhelp32Snapshot returns an owned handle or an error.
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map(OwnedHandle)
            .map_err(|e| Error::ProcessOpenFailed(format!("process snapshot: {}", e)))?;

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        // SAFETY: entry.dwSize is initialised as the API requires.
        let mut more = unsafe { Process32FirstW(snapshot.0, &mut entry) }.is_ok();
        while more {
            if names_match(&wide_to_string(&entry.szExeFile), executable) {
                return Ok(entry.th32ProcessID);
            }
            // SAFETY: same snapshot and entry as above.
            more = unsafe { Process32NextW(snapshot.0, &mut entry) }.is_ok();
        }

        Err(Error::ProcessNotFound(executable.to_string()))
    }

    fn find_module_base(pid: u32, executable: &str) -> Result<u64> {
        // SAFETY: CreateToolhelp32Snapshot returns an owned handle or an error.
        let snapshot =
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }
                .map(OwnedHandle)
                .map_err(|_| Error::ModuleNotFound {
                    pid,
                    module: executable.to_string(),
                })?;

        let mut entry = MODULEENTRY32W {
            dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };

        // SAFETY: entry.dwSize is initialised as the API requires.
        let mut more = unsafe { Module32FirstW(snapshot.0, &mut entry) }.is_ok();
        while more {
            if names_match(&wide_to_string(&entry.szModule), executable) {
                return Ok(entry.modBaseAddr as u64);
            }
            // SAFETY: same snapshot and entry as above.
            more = unsafe { Module32NextW(snapshot.0, &mut entry) }.is_ok();
        }

        Err(Error::ModuleNotFound {
            pid,
            module: executable.to_string(),
        })
    }

    impl ReadMemory for ProcessHandle {
        fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
            let mut buffer = vec![0u8; size];
            let mut read = 0usize;
            // SAFETY: buffer is valid for `size` bytes; the remote address is
            // validated by the kernel.
            unsafe {
                ReadProcessMemory(
                    self.handle.0,
                    address as *const c_void,
                    buffer.as_mut_ptr().cast(),
                    size,
                    Some(&mut read as *mut usize),
                )
            }
            .map_err(|e| Error::MemoryReadFailed {
                address,
                message: e.to_string(),
            })?;

            if read != size {
                return Err(Error::MemoryReadFailed {
                    address,
                    message: format!("short read ({} of {} bytes)", read, size),
                });
            }
            Ok(buffer)
        }
    }

    impl WriteMemory for ProcessHandle {
        fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
            let mut written = 0usize;
            // SAFETY: data is valid for data.len() bytes.
            unsafe {
                WriteProcessMemory(
                    self.handle.0,
                    address as *const c_void,
                    data.as_ptr().cast(),
                    data.len(),
                    Some(&mut written as *mut usize),
                )
            }
            .map_err(|e| Error::MemoryWriteFailed {
                address,
                message: e.to_string(),
            })?;

            if written != data.len() {
                return Err(Error::MemoryWriteFailed {
                    address,
                    message: format!("short write ({} of {} bytes)", written, data.len()),
                });
            }
            Ok(())
        }
    }

    impl TargetProcess for ProcessHandle {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn module_base(&self) -> u64 {
            self.base_address
        }

        fn liveness(&self) -> Liveness {
            let mut code = 0u32;
            // SAFETY: the handle was opened with query rights.
            match unsafe { GetExitCodeProcess(self.handle.0, &mut code) } {
                Ok(()) if code == STILL_ACTIVE.0 as u32 => Liveness::Alive,
                Ok(()) => Liveness::Exited,
                Err(_) => Liveness::Unknown,
            }
        }
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use std::fs;

    use process_memory::{CopyAddress, Pid, PutAddress, TryIntoProcessHandle};
    use tracing::debug;

    use super::{Liveness, ReadMemory, TargetProcess, WriteMemory, names_match};
    use crate::error::{Error, Result};

    /// An opened Linux process (native or running under Wine/Proton)
    pub struct ProcessHandle {
        handle: process_memory::ProcessHandle,
        pub pid: u32,
        pub base_address: u64,
        /// Start time from `/proc/<pid>/stat`, to tell a reused pid apart
        start_time: Option<u64>,
    }

    impl ProcessHandle {
        pub fn find_and_open(executable: &str) -> Result<Self> {
            let pid = find_pid(executable)?;
            let base_address = find_module_base(pid, executable)?;
            let handle = (pid as Pid)
                .try_into_process_handle()
                .map_err(|e| Error::ProcessOpenFailed(format!("{} (pid {}): {}", executable, pid, e)))?;

            let start_time = read_stat(pid).and_then(|stat| parse_stat(&stat)).map(|s| s.1);

            debug!("Opened {} (pid {}, base {:#x})", executable, pid, base_address);
            Ok(Self {
                handle,
                pid,
                base_address,
                start_time,
            })
        }
    }

    fn read_stat(pid: u32) -> Option<String> {
        fs::read_to_string(format!("/proc/{}/stat", pid)).ok()
    }

    /// State character and start time (field 22) of a `/proc/<pid>/stat`
    /// line. The command name may itself contain spaces and parentheses, so
    /// fields are counted from the last `)`.
    pub(super) fn parse_stat(stat: &str) -> Option<(char, u64)> {
        let (_, rest) = stat.rsplit_once(')')?;
        let mut fields = rest.split_whitespace();
        let state = fields.next()?.chars().next()?;
        let start_time = fields.nth(18)?.parse().ok()?;
        Some((state, start_time))
    }

    /// Zombies, dead entries and a pid now owned by another process all
    /// count as exited.
    pub(super) fn liveness_from_stat(stat: Option<&str>, start_time: Option<u64>) -> Liveness {
        let Some((state, started)) = stat.and_then(parse_stat) else {
            return Liveness::Exited;
        };
        if matches!(state, 'Z' | 'X' | 'x') {
            return Liveness::Exited;
        }
        match start_time {
            Some(expected) if expected != started => Liveness::Exited,
            _ => Liveness::Alive,
        }
    }

    /// Executable name of a process: the `comm` entry, or the last path
    /// component of argv[0] for Wine processes whose comm is truncated.
    fn process_names(pid: u32) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(comm) = fs::read_to_string(format!("/proc/{}/comm", pid)) {
            names.push(comm.trim().to_string());
        }
        if let Ok(cmdline) = fs::read(format!("/proc/{}/cmdline", pid)) {
            let argv0 = cmdline.split(|&b| b == 0).next().unwrap_or_default();
            let argv0 = String::from_utf8_lossy(argv0);
            if let Some(file) = argv0.rsplit(['/', '\\']).next() {
                names.push(file.to_string());
            }
        }
        names
    }

    fn find_pid(executable: &str) -> Result<u32> {
        let entries = fs::read_dir("/proc")?;
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            if process_names(pid)
                .iter()
                .any(|name| names_match(name, executable))
            {
                return Ok(pid);
            }
        }
        Err(Error::ProcessNotFound(executable.to_string()))
    }

    /// Start of the first mapping backed by the executable's file
    fn find_module_base(pid: u32, executable: &str) -> Result<u64> {
        let maps = fs::read_to_string(format!("/proc/{}/maps", pid)).map_err(|_| {
            Error::ModuleNotFound {
                pid,
                module: executable.to_string(),
            }
        })?;

        for line in maps.lines() {
            // "START-END perms offset dev inode path"
            let mut parts = line.split_whitespace();
            let range = parts.next().unwrap_or_default();
            let Some(path) = parts.nth(4) else {
                continue;
            };
            let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
            if !names_match(file, executable) {
                continue;
            }
            if let Some((start, _)) = range.split_once('-')
                && let Ok(start) = u64::from_str_radix(start, 16)
            {
                return Ok(start);
            }
        }

        Err(Error::ModuleNotFound {
            pid,
            module: executable.to_string(),
        })
    }

    impl ReadMemory for ProcessHandle {
        fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
            let mut buffer = vec![0u8; size];
            self.handle
                .copy_address(address as usize, &mut buffer)
                .map_err(|e| Error::MemoryReadFailed {
                    address,
                    message: e.to_string(),
                })?;
            Ok(buffer)
        }
    }

    impl WriteMemory for ProcessHandle {
        fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
            self.handle
                .put_address(address as usize, data)
                .map_err(|e| Error::MemoryWriteFailed {
                    address,
                    message: e.to_string(),
                })
        }
    }

    impl TargetProcess for ProcessHandle {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn module_base(&self) -> u64 {
            self.base_address
        }

        fn liveness(&self) -> Liveness {
            liveness_from_stat(read_stat(self.pid).as_deref(), self.start_time)
        }
    }
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
mod platform {
    use super::{Liveness, ReadMemory, TargetProcess, WriteMemory};
    use crate::error::{Error, Result};

    /// Placeholder handle; it can never be opened on this platform.
    pub struct ProcessHandle {
        pub pid: u32,
        pub base_address: u64,
    }

    impl ProcessHandle {
        pub fn find_and_open(_executable: &str) -> Result<Self> {
            Err(Error::Unsupported("process attach"))
        }
    }

    impl ReadMemory for ProcessHandle {
        fn read_bytes(&self, _address: u64, _size: usize) -> Result<Vec<u8>> {
            Err(Error::Unsupported("process memory read"))
        }
    }

    impl WriteMemory for ProcessHandle {
        fn write_bytes(&self, _address: u64, _data: &[u8]) -> Result<()> {
            Err(Error::Unsupported("process memory write"))
        }
    }

    impl TargetProcess for ProcessHandle {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn module_base(&self) -> u64 {
            self.base_address
        }

        fn liveness(&self) -> Liveness {
            Liveness::Unknown
        }
    }
}
