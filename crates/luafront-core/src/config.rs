//! Game catalog configuration.
//!
//! The catalog is a TOML file with one table per supported game, named
//! `GameEntry00`, `GameEntry01`, ... in display order:
//!
//! ```toml
//! [GameEntry00]
//! Title = "Kingdom Hearts II Final Mix"
//! Executable = "KINGDOM HEARTS II FINAL MIX.exe"
//! Path = "/scripts/kh2"
//! Address = "0"
//! Offset = "56454E"
//! BigEndian = false
//! ```
//!
//! `Address` and `Offset` are hex strings. An `Address` of zero means the base
//! address is derived from the executable's module base at attach time.

use std::fs;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::Endianness;

/// Default catalog location, relative to the application root.
pub const DEFAULT_CATALOG_PATH: &str = "configs/gameConfig.toml";

/// Timing constants for the attach loop and the frame loop
pub mod timing {
    use std::time::Duration;

    /// Interval between process latch attempts
    pub const LATCH_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Frame rate a session starts with until a script publishes another one
    pub const DEFAULT_FRAME_HERTZ: u32 = 60;

    /// Longest the control loop sleeps when nothing is scheduled
    pub const IDLE_WAIT: Duration = Duration::from_millis(250);
}

/// Number of diagnostic lines kept per session
pub const DIAGNOSTIC_CAPACITY: usize = 500;

/// Largest block a script may read in one `ReadString`/`ReadArray` call
pub const MAX_SCRIPT_READ: usize = 0x10_0000;

#[derive(Debug, Deserialize)]
struct RawGameEntry {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Executable")]
    executable: String,
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Offset", default)]
    offset: String,
    #[serde(rename = "BigEndian", default)]
    big_endian: bool,
    #[serde(rename = "Encoding")]
    encoding: Option<String>,
}

/// One supported game.
#[derive(Debug, Clone)]
pub struct GameProfile {
    pub title: String,
    /// Executable name of the target process (also the module whose base is used)
    pub executable: String,
    /// Script folder as written in the catalog
    pub script_path: String,
    /// Explicit base address, or 0 to derive it from the module base
    pub base_address: u64,
    pub offset: u64,
    pub endianness: Endianness,
    /// Encoding used by script string reads and writes
    pub encoding: &'static Encoding,
}

impl GameProfile {
    fn from_raw(raw: RawGameEntry) -> Result<Self> {
        let encoding = match raw.encoding.as_deref() {
            None | Some("") => encoding_rs::UTF_8,
            Some(label) => Encoding::for_label(label.as_bytes())
                .ok_or_else(|| Error::UnknownEncoding(label.to_string()))?,
        };

        Ok(Self {
            base_address: parse_hex(&raw.address)?,
            offset: parse_hex(&raw.offset)?,
            endianness: if raw.big_endian {
                Endianness::Big
            } else {
                Endianness::Little
            },
            title: raw.title,
            executable: raw.executable,
            script_path: raw.path,
            encoding,
        })
    }

    /// Resolve the script folder against the application root.
    ///
    /// A leading `/` or `\` marks the path as relative to `app_root`, so the
    /// same catalog works on every host. Other absolute paths (`C:\...`) are
    /// used as-is, and bare relative paths are also joined to `app_root`.
    pub fn script_dir(&self, app_root: &Path) -> PathBuf {
        let rooted = self.script_path.starts_with(['/', '\\']);
        let path = Path::new(&self.script_path);
        if !rooted && path.is_absolute() {
            return path.to_path_buf();
        }

        let relative = self.script_path.trim_start_matches(['/', '\\']);
        relative
            .split(['/', '\\'])
            .filter(|part| !part.is_empty())
            .fold(app_root.to_path_buf(), |dir, part| dir.join(part))
    }

    /// Base address for an attached process whose module is loaded at `module_base`.
    pub fn resolve_base(&self, module_base: u64) -> u64 {
        let base = if self.base_address != 0 {
            self.base_address
        } else {
            module_base
        };
        base.wrapping_add(self.offset)
    }
}

/// All games listed in the catalog file, in entry order.
#[derive(Debug, Clone, Default)]
pub struct GameCatalog {
    games: Vec<GameProfile>,
}

impl GameCatalog {
    /// Load the catalog from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let catalog = Self::parse(&content)?;
        debug!(
            "Loaded {} game entries from {}",
            catalog.games.len(),
            path.as_ref().display()
        );
        Ok(catalog)
    }

    /// Parse catalog content
    pub fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = content.parse()?;

        let mut games = Vec::with_capacity(table.len());
        for index in 0..table.len() {
            let key = format!("GameEntry{:02}", index);
            let entry = table
                .get(&key)
                .ok_or_else(|| Error::Config(format!("missing table [{}]", key)))?;
            let raw: RawGameEntry = entry.clone().try_into()?;
            games.push(GameProfile::from_raw(raw)?);
        }

        Ok(Self { games })
    }

    pub fn games(&self) -> &[GameProfile] {
        &self.games
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Look up a game by index, title or executable name (case-insensitive).
    pub fn find(&self, selector: &str) -> Result<&GameProfile> {
        if let Ok(index) = selector.parse::<usize>() {
            return self
                .games
                .get(index)
                .ok_or_else(|| Error::UnknownGame(selector.to_string()));
        }

        self.games
            .iter()
            .find(|g| {
                g.title.eq_ignore_ascii_case(selector) || g.executable.eq_ignore_ascii_case(selector)
            })
            .ok_or_else(|| Error::UnknownGame(selector.to_string()))
    }

    /// The game selected when none is requested explicitly
    pub fn first(&self) -> Option<&GameProfile> {
        self.games.first()
    }
}

/// Parse a hex string (with or without 0x prefix). Empty means zero.
pub fn parse_hex(s: &str) -> Result<u64> {
    let s = s.trim();
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16).map_err(|e| Error::InvalidAddress(format!("{:?}: {}", s, e)))
}
