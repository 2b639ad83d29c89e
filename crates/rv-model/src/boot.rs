//! Boot ROM contents.

use crate::memory::ROM_BASE;

/// Size the ROM image is padded to.
pub const ROM_SIZE: usize = 0x1000;

/// Address of the device-tree slot handed to the program in `a1`.
pub const DTB_ADDRESS: u64 = ROM_BASE + 0x20;

/// Builds the reset vector: `a0 = mhartid`, `a1 = DTB_ADDRESS`, then a jump
/// to `entry`, which is stored as a doubleword after the code.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn reset_vector(entry: u64) -> Vec<u8> {
    let words: [u32; 8] = [
        0x0000_0297,              // auipc t0, 0
        0x0002_8593 + (32 << 20), // addi a1, t0, 32
        0xF140_2573,              // csrr a0, mhartid
        0x0182_B283,              // ld t0, 24(t0)
        0x0002_8067,              // jr t0
        0,
        entry as u32,
        (entry >> 32) as u32,
    ];
    let mut rom: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    rom.resize(ROM_SIZE, 0);
    rom
}
