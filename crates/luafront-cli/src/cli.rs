use std::path::PathBuf;

use clap::{Parser, Subcommand};
use luafront_core::config::DEFAULT_CATALOG_PATH;

#[derive(Parser)]
#[command(name = "luafront")]
#[command(version, about = "Run Lua scripts against a running game")]
pub struct Cli {
    /// Application root; catalog and script paths are resolved against it
    #[arg(long, global = true, env = "LUAFRONT_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Game catalog file [default: <root>/configs/gameConfig.toml]
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Game to target, by catalog index, title or executable
    #[arg(short, long, global = true)]
    pub game: Option<String>,

    /// Reload scripts when the game exits
    #[arg(long, global = true)]
    pub auto_reload: bool,

    /// Enable a script by file stem or display name (repeatable)
    #[arg(long = "enable", value_name = "SCRIPT", global = true)]
    pub enable: Vec<String>,

    /// Disable a script by file stem or display name (repeatable)
    #[arg(long = "disable", value_name = "SCRIPT", global = true)]
    pub disable: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    pub fn catalog_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.root.join(DEFAULT_CATALOG_PATH))
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// List the games in the catalog
    Games,
    /// Scan the script folder and report each script's status
    Validate {
        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Attach to the game and run the enabled scripts (default)
    Run,
}
