//! Games command implementation.

use anyhow::Result;
use luafront_core::Endianness;
use owo_colors::OwoColorize;

use super::load_games;
use crate::cli::Cli;

/// Print the catalog entries with their resolved script folders.
pub fn run(cli: &Cli) -> Result<()> {
    let games = load_games(cli)?;

    for (index, game) in games.games().iter().enumerate() {
        println!("{:>2}  {}", index, game.title.bold());
        println!("    Executable : {}", game.executable);
        println!("    Scripts    : {}", game.script_dir(&cli.root).display());
        if game.base_address != 0 {
            println!("    Address    : {:#x}", game.base_address);
        } else {
            println!("    Address    : module base");
        }
        println!("    Offset     : {:#x}", game.offset);
        if game.endianness == Endianness::Big {
            println!("    Byte order : {}", game.endianness.yellow());
        } else {
            println!("    Byte order : {}", game.endianness);
        }
        println!("    Encoding   : {}", game.encoding.name());
    }

    Ok(())
}
