//! Script discovery and classification.
//!
//! A scan loads every `*.lua` file of the script folder against a detached
//! memory view, records what each script publishes, and never runs a hook.
//! The resulting records are what the user enables or disables, and what a
//! session later instantiates again against the live process.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use strum::Display;
use tracing::{debug, info};

use crate::config::GameProfile;
use crate::engine::{
    AUTHOR_GLOBAL, DESCRIPTION_GLOBAL, Hook, NAME_GLOBAL, ScriptContext, ScriptEngine,
    ScriptError, ScriptUnit,
};
use crate::error::{Error, Result};

pub const DEFAULT_AUTHOR: &str = "Unknown";
pub const DEFAULT_DESCRIPTION: &str = "Not Available.";

/// Position of a record in the catalog
pub type ScriptId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum Verdict {
    Valid,
    InvalidSyntax,
    MissingHooks,
}

/// A valid script that publishes only one of its two hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum HookWarning {
    MissingInit,
    MissingFrame,
}

impl HookWarning {
    pub fn message(self) -> &'static str {
        match self {
            HookWarning::MissingInit => {
                "Warning #1: Initialization function cannot be found or is invalid."
            }
            HookWarning::MissingFrame => "Warning #2: Frame function cannot be found or is invalid.",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HookSet {
    pub init: bool,
    pub frame: bool,
}

impl HookSet {
    pub fn of<U: ScriptUnit>(unit: &U) -> Self {
        Self {
            init: unit.has_hook(Hook::Init),
            frame: unit.has_hook(Hook::Frame),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptRecord {
    pub path: PathBuf,
    pub name: String,
    pub author: String,
    pub description: String,
    pub verdict: Verdict,
    pub hooks: HookSet,
    pub warning: Option<HookWarning>,
    /// Engine error text for [`Verdict::InvalidSyntax`]
    pub error: Option<String>,
    pub enabled: bool,
}

impl ScriptRecord {
    /// File stem; what the user types to select a script
    pub fn id_name(&self) -> String {
        stem_of(&self.path)
    }

    /// Enabled and valid: the record will run in the next session
    pub fn is_executable(&self) -> bool {
        self.enabled && self.verdict == Verdict::Valid
    }

    /// Status line shown next to the record
    pub fn status_text(&self) -> &'static str {
        match (self.verdict, self.warning) {
            (Verdict::InvalidSyntax, _) => "Error #200: Not a valid Lua script.",
            (Verdict::MissingHooks, _) => "Error #199: Not a valid LuaBackend script.",
            (Verdict::Valid, Some(warning)) => warning.message(),
            (Verdict::Valid, None) => "OK",
        }
    }
}

/// Classify one parse result. Metadata comes from the loaded script whether
/// or not it has hooks.
pub fn classify<U: ScriptUnit>(
    path: &Path,
    parsed: std::result::Result<U, ScriptError>,
) -> ScriptRecord {
    let stem = stem_of(path);
    let (unit, error) = match parsed {
        Ok(unit) => (Some(unit), None),
        Err(e) => (None, Some(e.message)),
    };

    let text = |global: &str| unit.as_ref().and_then(|u| u.global_text(global));
    let name = text(NAME_GLOBAL).unwrap_or_else(|| stem.clone());
    let author = text(AUTHOR_GLOBAL).unwrap_or_else(|| DEFAULT_AUTHOR.to_string());
    let description = text(DESCRIPTION_GLOBAL).unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    let hooks = unit.as_ref().map(HookSet::of).unwrap_or_default();
    let (verdict, warning) = match (&unit, hooks.init, hooks.frame) {
        (None, _, _) => (Verdict::InvalidSyntax, None),
        (Some(_), false, false) => (Verdict::MissingHooks, None),
        (Some(_), false, true) => (Verdict::Valid, Some(HookWarning::MissingInit)),
        (Some(_), true, false) => (Verdict::Valid, Some(HookWarning::MissingFrame)),
        (Some(_), true, true) => (Verdict::Valid, None),
    };

    ScriptRecord {
        path: path.to_path_buf(),
        name,
        author,
        description,
        verdict,
        hooks,
        warning,
        error,
        enabled: verdict == Verdict::Valid && warning.is_none(),
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Counts by verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub total: usize,
    pub valid: usize,
    pub warnings: usize,
    pub invalid: usize,
    pub enabled: usize,
}

#[derive(Debug, Default)]
pub struct ScriptCatalog {
    directory: Option<PathBuf>,
    records: Vec<ScriptRecord>,
}

impl ScriptCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the record list with the scripts currently in `directory`.
    ///
    /// A missing folder clears the list and returns
    /// [`Error::DirectoryNotFound`].
    pub fn scan<E: ScriptEngine>(
        &mut self,
        engine: &E,
        profile: &GameProfile,
        directory: &Path,
    ) -> Result<ScanSummary> {
        self.records.clear();
        self.directory = None;

        if !directory.is_dir() {
            return Err(Error::DirectoryNotFound(directory.to_path_buf()));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(directory)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_lua_file(path))
            .collect();
        files.sort_by_key(|path| path.file_name().map(|n| n.to_os_string()));

        let context = ScriptContext::detached(profile, directory);
        for path in files {
            let record = classify(&path, engine.parse(&path, &context));
            debug!("{}: {}", record.id_name(), record.status_text());
            self.records.push(record);
        }
        self.directory = Some(directory.to_path_buf());

        let summary = self.summary();
        info!(
            "Scanned {}: {} scripts ({} valid, {} with warnings, {} invalid)",
            directory.display(),
            summary.total,
            summary.valid,
            summary.warnings,
            summary.invalid
        );
        Ok(summary)
    }

    /// Folder of the last successful scan
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Whether the last scan found the script folder
    pub fn is_loaded(&self) -> bool {
        self.directory.is_some()
    }

    pub fn records(&self) -> &[ScriptRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns false if there is no record at `id`
    pub fn set_enabled(&mut self, id: ScriptId, enabled: bool) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                record.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Toggle by file stem or display name, case-insensitively
    pub fn set_enabled_by_name(&mut self, name: &str, enabled: bool) -> bool {
        let found = self.records.iter().position(|r| {
            r.id_name().eq_ignore_ascii_case(name) || r.name.eq_ignore_ascii_case(name)
        });
        found.is_some_and(|id| self.set_enabled(id, enabled))
    }

    /// Records that will run, in catalog order
    pub fn executable(&self) -> impl Iterator<Item = (ScriptId, &ScriptRecord)> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_executable())
    }

    pub fn summary(&self) -> ScanSummary {
        let mut summary = ScanSummary {
            total: self.records.len(),
            ..Default::default()
        };
        for record in &self.records {
            match record.verdict {
                Verdict::Valid => summary.valid += 1,
                _ => summary.invalid += 1,
            }
            if record.warning.is_some() {
                summary.warnings += 1;
            }
            if record.is_executable() {
                summary.enabled += 1;
            }
        }
        summary
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }
}

fn is_lua_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("lua"))
}
