//! Physical memory map: boot ROM, CLINT timer, RAM.
//!
//! Accesses outside a mapped region fault. Misaligned data accesses fault
//! unless the platform enables them; instruction fetch alignment is enforced
//! by control flow, not here.

#![allow(clippy::cast_possible_truncation)]

use driver_core::{MemoryReader, PlatformConfig};
use thiserror::Error;

use crate::trap::Exception;

/// Base of the boot ROM holding the reset vector.
pub const ROM_BASE: u64 = 0x1000;
/// Base of the core-local interruptor.
pub const CLINT_BASE: u64 = 0x0200_0000;
/// Size of the core-local interruptor window.
pub const CLINT_SIZE: u64 = 0xC000;
const MTIMECMP_OFFSET: u64 = 0x4000;
const MTIME_OFFSET: u64 = 0xBFF8;

/// Image placement failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// The image does not fit inside RAM.
    #[error("image of {len} bytes at {addr:#x} does not fit in RAM [{base:#x}, {end:#x})")]
    OutOfRange {
        /// Requested load address.
        addr: u64,
        /// Image length.
        len: usize,
        /// RAM base.
        base: u64,
        /// RAM end.
        end: u64,
    },
}

/// Data access width in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Width {
    Byte = 1,
    Half = 2,
    Word = 4,
    Double = 8,
}

impl Width {
    /// Access size in bytes.
    #[must_use]
    pub const fn bytes(self) -> u64 {
        self as u64
    }

    /// Byte-enable mask as reported in execution traces.
    #[must_use]
    pub const fn mask(self) -> u8 {
        match self {
            Self::Byte => 0x01,
            Self::Half => 0x03,
            Self::Word => 0x0F,
            Self::Double => 0xFF,
        }
    }

    /// Mask covering the low `bytes()` bytes of a value.
    #[must_use]
    pub const fn value_mask(self) -> u64 {
        match self {
            Self::Double => u64::MAX,
            other => (1 << (other.bytes() * 8)) - 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Region {
    base: u64,
    bytes: Vec<u8>,
}

impl Region {
    fn offset(&self, addr: u64, len: u64) -> Option<usize> {
        let offset = addr.checked_sub(self.base)?;
        let end = offset.checked_add(len)?;
        if end > self.bytes.len() as u64 {
            return None;
        }
        usize::try_from(offset).ok()
    }

    fn read(&self, addr: u64, width: Width) -> Option<u64> {
        let offset = self.offset(addr, width.bytes())?;
        let mut raw = [0u8; 8];
        let len = width.bytes() as usize;
        raw[..len].copy_from_slice(&self.bytes[offset..offset + len]);
        Some(u64::from_le_bytes(raw))
    }

    fn write(&mut self, addr: u64, width: Width, value: u64) -> Option<()> {
        let offset = self.offset(addr, width.bytes())?;
        let len = width.bytes() as usize;
        self.bytes[offset..offset + len].copy_from_slice(&value.to_le_bytes()[..len]);
        Some(())
    }
}

/// Machine timer registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clint {
    /// Free-running timer, advanced once per platform tick.
    pub mtime: u64,
    /// Timer compare value; the timer interrupt is pending while
    /// `mtime >= mtimecmp`.
    pub mtimecmp: u64,
}

impl Default for Clint {
    fn default() -> Self {
        Self {
            mtime: 0,
            mtimecmp: u64::MAX,
        }
    }
}

impl Clint {
    /// `true` while the timer interrupt is pending.
    #[must_use]
    pub const fn timer_pending(&self) -> bool {
        self.mtime >= self.mtimecmp
    }

    fn register(&mut self, offset: u64) -> Option<&mut u64> {
        match offset & !7 {
            MTIMECMP_OFFSET => Some(&mut self.mtimecmp),
            MTIME_OFFSET => Some(&mut self.mtime),
            _ => None,
        }
    }
}

/// System bus for one hart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bus {
    rom: Option<Region>,
    ram: Region,
    clint: Option<Clint>,
    misaligned: bool,
}

impl Bus {
    /// Builds the map for `platform`. ROM and CLINT exist only when the
    /// platform boots through a ROM.
    #[must_use]
    pub fn new(platform: &PlatformConfig, rom: Option<Vec<u8>>) -> Self {
        let ram_len = usize::try_from(platform.ram_size).unwrap_or(usize::MAX);
        Self {
            rom: rom.map(|bytes| Region {
                base: ROM_BASE,
                bytes,
            }),
            ram: Region {
                base: platform.ram_base,
                bytes: vec![0; ram_len],
            },
            clint: platform.boot_rom.then(Clint::default),
            misaligned: platform.enable_misaligned,
        }
    }

    /// Copies `image` into RAM at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::OutOfRange`] when the image would leave RAM.
    pub fn load_image(&mut self, addr: u64, image: &[u8]) -> Result<(), ImageError> {
        let out_of_range = || ImageError::OutOfRange {
            addr,
            len: image.len(),
            base: self.ram.base,
            end: self.ram.base + self.ram.bytes.len() as u64,
        };
        let offset = self
            .ram
            .offset(addr, image.len() as u64)
            .ok_or_else(out_of_range)?;
        self.ram.bytes[offset..offset + image.len()].copy_from_slice(image);
        Ok(())
    }

    /// Zeroes RAM and restarts the timer.
    pub fn clear(&mut self) {
        self.ram.bytes.fill(0);
        if let Some(clint) = &mut self.clint {
            *clint = Clint::default();
        }
    }

    /// Timer state, when the platform has a CLINT.
    #[must_use]
    pub const fn clint(&self) -> Option<&Clint> {
        self.clint.as_ref()
    }

    /// Advances `mtime` by one.
    pub fn tick_timer(&mut self) {
        if let Some(clint) = &mut self.clint {
            clint.mtime = clint.mtime.wrapping_add(1);
        }
    }

    /// Fetches a 32-bit instruction word.
    ///
    /// # Errors
    ///
    /// Returns [`Exception::InstructionAccessFault`] outside ROM and RAM.
    pub fn fetch(&self, addr: u64) -> Result<u32, Exception> {
        self.rom
            .iter()
            .chain(std::iter::once(&self.ram))
            .find_map(|region| region.read(addr, Width::Word))
            .map(|word| word as u32)
            .ok_or(Exception::InstructionAccessFault)
    }

    /// Reads `width` bytes at `addr`, zero-extended.
    ///
    /// # Errors
    ///
    /// Returns [`Exception::LoadAddressMisaligned`] or
    /// [`Exception::LoadAccessFault`].
    pub fn load(&mut self, addr: u64, width: Width) -> Result<u64, Exception> {
        if !self.misaligned && addr % width.bytes() != 0 {
            return Err(Exception::LoadAddressMisaligned);
        }
        if let Some(value) = self.ram.read(addr, width) {
            return Ok(value);
        }
        if let Some(value) = self.rom.as_ref().and_then(|rom| rom.read(addr, width)) {
            return Ok(value);
        }
        self.clint_access(addr, width, None)
            .ok_or(Exception::LoadAccessFault)
    }

    /// Writes the low `width` bytes of `value` at `addr`. ROM is read-only.
    ///
    /// # Errors
    ///
    /// Returns [`Exception::StoreAddressMisaligned`] or
    /// [`Exception::StoreAccessFault`].
    pub fn store(&mut self, addr: u64, width: Width, value: u64) -> Result<(), Exception> {
        if !self.misaligned && addr % width.bytes() != 0 {
            return Err(Exception::StoreAddressMisaligned);
        }
        if self.ram.write(addr, width, value).is_some() {
            return Ok(());
        }
        self.clint_access(addr, width, Some(value))
            .map(|_| ())
            .ok_or(Exception::StoreAccessFault)
    }

    fn clint_access(&mut self, addr: u64, width: Width, write: Option<u64>) -> Option<u64> {
        let clint = self.clint.as_mut()?;
        let offset = addr.checked_sub(CLINT_BASE)?;
        if offset >= CLINT_SIZE {
            return None;
        }
        let shift = (offset & 7) * 8;
        if shift + width.bytes() * 8 > 64 {
            return None;
        }
        let mask = width.value_mask() << shift;
        let register = clint.register(offset)?;
        if let Some(value) = write {
            *register = (*register & !mask) | ((value << shift) & mask);
        }
        Some((*register & mask) >> shift)
    }
}

impl MemoryReader for Bus {
    fn read_byte(&self, addr: u64) -> u8 {
        self.ram
            .read(addr, Width::Byte)
            .or_else(|| self.rom.as_ref().and_then(|rom| rom.read(addr, Width::Byte)))
            .map_or(0, |value| value as u8)
    }
}

#[cfg(test)]
mod tests {
    use driver_core::{MemoryReader, PlatformConfig};
    use rstest::rstest;

    use super::{Bus, ImageError, Width, CLINT_BASE, ROM_BASE};
    use crate::trap::Exception;

    fn small_platform() -> PlatformConfig {
        PlatformConfig {
            ram_size: 0x1000,
            ..PlatformConfig::default()
        }
    }

    #[test]
    fn ram_is_little_endian() {
        let mut bus = Bus::new(&small_platform(), None);
        bus.store(0x8000_0000, Width::Double, 0x1122_3344_5566_7788)
            .expect("aligned store");
        assert_eq!(bus.load(0x8000_0000, Width::Byte), Ok(0x88));
        assert_eq!(bus.load(0x8000_0004, Width::Word), Ok(0x1122_3344));
        assert_eq!(bus.read_byte(0x8000_0007), 0x11);
    }

    #[rstest]
    #[case(Width::Half, 0x8000_0001)]
    #[case(Width::Word, 0x8000_0002)]
    #[case(Width::Double, 0x8000_0004)]
    fn misaligned_access_traps_unless_enabled(#[case] width: Width, #[case] addr: u64) {
        let mut bus = Bus::new(&small_platform(), None);
        assert_eq!(bus.load(addr, width), Err(Exception::LoadAddressMisaligned));
        assert_eq!(
            bus.store(addr, width, 0),
            Err(Exception::StoreAddressMisaligned)
        );

        let permissive = PlatformConfig {
            enable_misaligned: true,
            ..small_platform()
        };
        let mut bus = Bus::new(&permissive, None);
        bus.store(addr, width, u64::MAX).expect("misaligned store");
        assert_eq!(bus.load(addr, Width::Byte), Ok(0xFF));
    }

    #[test]
    fn unmapped_and_rom_writes_fault() {
        let mut bus = Bus::new(&small_platform(), Some(vec![0x13, 0, 0, 0]));
        assert_eq!(bus.fetch(ROM_BASE), Ok(0x13));
        assert_eq!(
            bus.store(ROM_BASE, Width::Word, 0),
            Err(Exception::StoreAccessFault)
        );
        assert_eq!(bus.load(0x10, Width::Byte), Err(Exception::LoadAccessFault));
        assert_eq!(bus.fetch(0x10), Err(Exception::InstructionAccessFault));
    }

    #[test]
    fn clint_exposes_timer_registers() {
        let mut bus = Bus::new(&small_platform(), None);
        bus.store(CLINT_BASE + 0x4000, Width::Double, 2)
            .expect("mtimecmp write");
        bus.tick_timer();
        bus.tick_timer();
        assert_eq!(bus.load(CLINT_BASE + 0xBFF8, Width::Word), Ok(2));
        assert!(bus.clint().expect("clint present").timer_pending());
    }

    #[test]
    fn images_must_fit_in_ram() {
        let mut bus = Bus::new(&small_platform(), None);
        bus.load_image(0x8000_0FFC, &[1, 2, 3, 4]).expect("fits");
        assert!(matches!(
            bus.load_image(0x8000_0FFE, &[1, 2, 3, 4]),
            Err(ImageError::OutOfRange { .. })
        ));
    }
}
