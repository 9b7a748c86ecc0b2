//! Typed, endianness-aware access to the target's memory.

use std::fmt;
use std::sync::Arc;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::{Liveness, TargetProcess};
use crate::config::MAX_SCRIPT_READ;
use crate::error::{Error, Result};

/// Byte order of the emulated or native target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum Endianness {
    #[default]
    #[strum(serialize = "little-endian")]
    Little,
    #[strum(serialize = "big-endian")]
    Big,
}

macro_rules! typed_access {
    ($($read:ident, $write:ident, $ty:ty;)*) => {
        $(
            pub fn $read(&self, address: u64) -> Result<$ty> {
                let bytes = self.read_array(address)?;
                Ok(match self.endianness {
                    Endianness::Little => <$ty>::from_le_bytes(bytes),
                    Endianness::Big => <$ty>::from_be_bytes(bytes),
                })
            }

            pub fn $write(&self, address: u64, value: $ty) -> Result<()> {
                let bytes = match self.endianness {
                    Endianness::Little => value.to_le_bytes(),
                    Endianness::Big => value.to_be_bytes(),
                };
                self.write_bytes(address, &bytes)
            }
        )*
    };
}

/// The memory view a session hands to its scripts.
///
/// The base address is fixed at construction; a new attach builds a new
/// `GameMemory`. A detached view has no process behind it: reads return
/// zeroes and writes are dropped. Script inspection runs against one.
#[derive(Clone)]
pub struct GameMemory {
    process: Option<Arc<dyn TargetProcess>>,
    base_address: u64,
    endianness: Endianness,
    encoding: &'static Encoding,
}

impl GameMemory {
    pub fn detached(endianness: Endianness, encoding: &'static Encoding) -> Self {
        Self {
            process: None,
            base_address: 0,
            endianness,
            encoding,
        }
    }

    pub fn attached(
        process: Arc<dyn TargetProcess>,
        base_address: u64,
        endianness: Endianness,
        encoding: &'static Encoding,
    ) -> Self {
        Self {
            process: Some(process),
            base_address,
            endianness,
            encoding,
        }
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Absolute address of an offset from the base address
    pub fn relative(&self, offset: u64) -> u64 {
        self.base_address.wrapping_add(offset)
    }

    /// Liveness of the attached process; `Unknown` when detached
    pub fn liveness(&self) -> Liveness {
        self.process
            .as_ref()
            .map_or(Liveness::Unknown, |p| p.liveness())
    }

    /// Read `size` bytes. Sizes above [`MAX_SCRIPT_READ`] are refused before
    /// anything is allocated.
    pub fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        if size > MAX_SCRIPT_READ {
            return Err(Error::InvalidLength {
                length: i64::try_from(size).unwrap_or(i64::MAX),
                max: MAX_SCRIPT_READ,
            });
        }
        match &self.process {
            Some(process) => process.read_bytes(address, size),
            None => Ok(vec![0; size]),
        }
    }

    pub fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
        match &self.process {
            Some(process) => process.write_bytes(address, data),
            None => Ok(()),
        }
    }

    fn read_array<const N: usize>(&self, address: u64) -> Result<[u8; N]> {
        let bytes = self.read_bytes(address, N)?;
        bytes.try_into().map_err(|b: Vec<u8>| Error::MemoryReadFailed {
            address,
            message: format!("expected {} bytes, got {}", N, b.len()),
        })
    }

    typed_access! {
        read_u8, write_u8, u8;
        read_u16, write_u16, u16;
        read_u32, write_u32, u32;
        read_u64, write_u64, u64;
        read_i8, write_i8, i8;
        read_i16, write_i16, i16;
        read_i32, write_i32, i32;
        read_i64, write_i64, i64;
        read_f32, write_f32, f32;
        read_f64, write_f64, f64;
    }

    pub fn read_bool(&self, address: u64) -> Result<bool> {
        Ok(self.read_u8(address)? != 0)
    }

    pub fn write_bool(&self, address: u64, value: bool) -> Result<()> {
        self.write_u8(address, value as u8)
    }

    /// Read up to `max_len` bytes and decode them, stopping at the first NUL.
    pub fn read_string(&self, address: u64, max_len: usize) -> Result<String> {
        let bytes = self.read_bytes(address, max_len)?;
        let end = memchr::memchr(0, &bytes).unwrap_or(bytes.len());
        let (decoded, _, _) = self.encoding.decode(&bytes[..end]);
        Ok(decoded.into_owned())
    }

    /// Encode `value` and write it without a terminator.
    pub fn write_string(&self, address: u64, value: &str) -> Result<()> {
        let (encoded, _, _) = self.encoding.encode(value);
        self.write_bytes(address, &encoded)
    }

    /// Read a pointer-sized value and add `offset` to it
    pub fn follow_pointer(&self, address: u64, offset: u64) -> Result<u64> {
        Ok(self.read_u64(address)?.wrapping_add(offset))
    }
}

impl fmt::Debug for GameMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameMemory")
            .field("pid", &self.process.as_ref().map(|p| p.pid()))
            .field("base_address", &format_args!("{:#x}", self.base_address))
            .field("endianness", &self.endianness)
            .field("encoding", &self.encoding.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockProcessBuilder;

    fn attached(endianness: Endianness) -> GameMemory {
        let process = MockProcessBuilder::new()
            .module_base(0x1000)
            .bytes(0x1000, &[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0])
            .bytes(0x2000, b"SORA\0garbage")
            .build();
        GameMemory::attached(Arc::new(process), 0x1000, endianness, encoding_rs::UTF_8)
    }

    #[test]
    fn test_detached_memory_reads_zero_and_drops_writes() {
        let memory = GameMemory::detached(Endianness::Little, encoding_rs::UTF_8);
        memory.write_u32(0x10, 0xDEAD_BEEF).unwrap();
        assert_eq!(memory.read_u32(0x10).unwrap(), 0);
        assert_eq!(memory.read_string(0x10, 16).unwrap(), "");
        assert_eq!(memory.follow_pointer(0x10, 0x8).unwrap(), 0x8);
        assert_eq!(memory.liveness(), Liveness::Unknown);
    }

    #[test]
    fn test_oversized_reads_are_refused() {
        let memory = attached(Endianness::Little);
        assert!(memory.read_bytes(0x1000, MAX_SCRIPT_READ).is_ok());

        let err = memory.read_bytes(0x1000, MAX_SCRIPT_READ + 1).unwrap_err();
        assert!(matches!(err, Error::InvalidLength { max: MAX_SCRIPT_READ, .. }));
        assert!(matches!(
            memory.read_string(0x2000, usize::MAX),
            Err(Error::InvalidLength { length: i64::MAX, .. })
        ));

        let detached = GameMemory::detached(Endianness::Little, encoding_rs::UTF_8);
        assert!(detached.read_bytes(0, usize::MAX).is_err());
    }

    #[test]
    fn test_typed_reads_follow_endianness() {
        let little = attached(Endianness::Little);
        assert_eq!(little.read_u16(0x1000).unwrap(), 0x3412);
        assert_eq!(little.read_u32(0x1000).unwrap(), 0x7856_3412);

        let big = attached(Endianness::Big);
        assert_eq!(big.read_u16(0x1000).unwrap(), 0x1234);
        assert_eq!(big.read_u32(0x1000).unwrap(), 0x1234_5678);
        assert_eq!(big.read_u64(0x1000).unwrap(), 0x1234_5678_9ABC_DEF0);
    }

    #[test]
    fn test_writes_follow_endianness() {
        let big = attached(Endianness::Big);
        big.write_u32(0x3000, 0xCAFE_BABE).unwrap();
        assert_eq!(
            big.read_bytes(0x3000, 4).unwrap(),
            vec![0xCA, 0xFE, 0xBA, 0xBE]
        );

        big.write_f32(0x3010, 1.5).unwrap();
        assert_eq!(big.read_f32(0x3010).unwrap(), 1.5);
    }

    #[test]
    fn test_relative_addresses() {
        let memory = attached(Endianness::Little);
        assert_eq!(memory.relative(0x10), 0x1010);
        assert_eq!(memory.read_u8(memory.relative(1)).unwrap(), 0x34);
    }

    #[test]
    fn test_read_string_stops_at_nul() {
        let memory = attached(Endianness::Little);
        assert_eq!(memory.read_string(0x2000, 12).unwrap(), "SORA");

        memory.write_string(0x2100, "RIKU").unwrap();
        assert_eq!(memory.read_string(0x2100, 4).unwrap(), "RIKU");
    }

    #[test]
    fn test_shift_jis_strings() {
        let process = MockProcessBuilder::new().build();
        let memory = GameMemory::attached(
            Arc::new(process),
            0,
            Endianness::Little,
            encoding_rs::SHIFT_JIS,
        );
        memory.write_string(0x40, "ソラ").unwrap();
        assert_eq!(memory.read_bytes(0x40, 4).unwrap(), vec![0x83, 0x5C, 0x83, 0x89]);
        assert_eq!(memory.read_string(0x40, 8).unwrap(), "ソラ");
    }

    #[test]
    fn test_follow_pointer() {
        let memory = attached(Endianness::Little);
        memory.write_u64(0x4000, 0x5000).unwrap();
        assert_eq!(memory.follow_pointer(0x4000, 0x20).unwrap(), 0x5020);
    }
}
