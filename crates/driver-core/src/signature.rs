//! Test-signature output: a memory range dumped as one hex word per line.

use std::fs;
use std::io;
use std::path::Path;

use crate::MemoryReader;

/// Half-open address range `[start, end)` of the signature region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureRange {
    /// First byte.
    pub start: u64,
    /// One past the last byte.
    pub end: u64,
}

impl SignatureRange {
    /// `true` when the range is non-empty.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.start < self.end
    }
}

/// Renders the range as 4-byte words, most-significant byte first, one per
/// line. Returns `None` for an empty or inverted range.
#[must_use]
pub fn render_signature(range: SignatureRange, memory: &dyn MemoryReader) -> Option<String> {
    if !range.is_valid() {
        return None;
    }
    let words = (range.start..range.end).step_by(4).map(|addr| {
        let bytes = [0, 1, 2, 3].map(|offset| memory.read_byte(addr.wrapping_add(offset)));
        format!("{:08x}\n", u32::from_le_bytes(bytes))
    });
    Some(words.collect())
}

/// Writes the signature file. An invalid range is reported and leaves the
/// file untouched; the return value says whether a file was written.
///
/// # Errors
///
/// Propagates file-system errors.
pub fn write_signature(
    path: &Path,
    range: SignatureRange,
    memory: &dyn MemoryReader,
) -> io::Result<bool> {
    let Some(text) = render_signature(range, memory) else {
        tracing::warn!(
            "invalid signature region [{:#x}, {:#x}), not writing {}",
            range.start,
            range.end,
            path.display()
        );
        return Ok(false);
    };
    fs::write(path, text)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{render_signature, write_signature, SignatureRange};
    use crate::MemoryReader;

    struct Sparse(BTreeMap<u64, u8>);

    impl Sparse {
        fn with(base: u64, bytes: &[u8]) -> Self {
            Self(
                bytes
                    .iter()
                    .enumerate()
                    .map(|(i, &b)| (base + i as u64, b))
                    .collect(),
            )
        }
    }

    impl MemoryReader for Sparse {
        fn read_byte(&self, addr: u64) -> u8 {
            self.0.get(&addr).copied().unwrap_or(0)
        }
    }

    #[test]
    fn words_are_printed_most_significant_byte_first() {
        let memory = Sparse::with(0x1000, &[0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE, 0xBA, 0xBE]);
        let text = render_signature(
            SignatureRange {
                start: 0x1000,
                end: 0x1008,
            },
            &memory,
        )
        .expect("valid range");
        assert_eq!(text, "efbeadde\nbebafeca\n");
    }

    #[test]
    fn partial_trailing_word_is_printed_whole() {
        let memory = Sparse::with(0x20, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let text = render_signature(
            SignatureRange {
                start: 0x20,
                end: 0x25,
            },
            &memory,
        )
        .expect("valid range");
        assert_eq!(text, "44332211\n00006655\n");
    }

    #[test]
    fn inverted_range_writes_no_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("sig.txt");
        let memory = Sparse::with(0, &[]);
        let range = SignatureRange {
            start: 0x2000,
            end: 0x2000,
        };
        assert!(!write_signature(&path, range, &memory).expect("no io error"));
        assert!(!path.exists());
    }

    #[test]
    fn valid_range_is_written() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("sig.txt");
        let memory = Sparse::with(0x10, &[1, 2, 3, 4]);
        let range = SignatureRange {
            start: 0x10,
            end: 0x14,
        };
        assert!(write_signature(&path, range, &memory).expect("written"));
        assert_eq!(
            std::fs::read_to_string(&path).expect("readable"),
            "04030201\n"
        );
    }
}
