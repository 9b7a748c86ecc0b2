//! CLI command implementations.
//!
//! Every command starts from the same [`Workspace`]: the game catalog, the
//! selected game, and (for `validate` and `run`) a scan of its script folder.

pub mod games;
pub mod run;
pub mod validate;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use luafront_core::{GameCatalog, GameProfile, ScriptCatalog, ScriptEngine};
use tracing::{info, warn};

use crate::cli::Cli;

/// Load the game catalog. A missing or malformed catalog is fatal.
pub fn load_games(cli: &Cli) -> Result<GameCatalog> {
    let path = cli.catalog_path();
    let games = GameCatalog::load(&path)
        .with_context(|| format!("Failed to load game catalog {}", path.display()))?;
    if games.is_empty() {
        bail!("Game catalog {} lists no games", path.display());
    }
    info!("Loaded {} games from {}", games.len(), path.display());
    Ok(games)
}

pub struct Workspace {
    pub profile: GameProfile,
    pub script_dir: PathBuf,
    pub scripts: ScriptCatalog,
}

impl Workspace {
    /// Select the game, scan its scripts and apply `--enable`/`--disable`.
    pub fn open<E: ScriptEngine>(cli: &Cli, engine: &E) -> Result<Self> {
        let games = load_games(cli)?;
        let profile = match &cli.game {
            Some(selector) => games.find(selector)?.clone(),
            None => games
                .first()
                .cloned()
                .context("Game catalog lists no games")?,
        };
        let script_dir = profile.script_dir(&cli.root);
        info!("Game: {} ({})", profile.title, profile.executable);

        let mut workspace = Self {
            profile,
            script_dir,
            scripts: ScriptCatalog::new(),
        };
        workspace.rescan(engine);
        workspace.apply_selection(&cli.enable, &cli.disable);
        Ok(workspace)
    }

    /// Scan the script folder. A missing folder leaves the catalog empty.
    pub fn rescan<E: ScriptEngine>(&mut self, engine: &E) {
        if let Err(e) = self.scripts.scan(engine, &self.profile, &self.script_dir) {
            warn!("{}", e);
        }
    }

    pub fn apply_selection(&mut self, enable: &[String], disable: &[String]) {
        let requests = enable
            .iter()
            .map(|name| (name, true))
            .chain(disable.iter().map(|name| (name, false)));
        for (name, enabled) in requests {
            if !self.scripts.set_enabled_by_name(name, enabled) {
                warn!("No script named {}", name);
            }
        }
    }
}
