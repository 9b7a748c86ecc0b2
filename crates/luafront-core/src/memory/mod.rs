mod game;
mod process;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use game::{Endianness, GameMemory};
pub use process::*;

#[cfg(any(test, feature = "test-support"))]
pub use mock::{MockProcess, MockProcessBuilder, MockProcessProvider};
