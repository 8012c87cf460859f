use core::fmt::{Display, Formatter, Result};

/// Human readable byte count for log output, e.g. `4823 B`, `16 KiB` or `130 MiB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(u64);

impl From<u64> for ByteSize {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<usize> for ByteSize {
    fn from(value: usize) -> Self {
        Self(value as u64)
    }
}

impl Display for ByteSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self.0 {
            b if b < 10 * 1024 => write!(f, "{b} B"),
            kb if kb < 10 * 1024u64.pow(2) => write!(f, "{} KiB", kb >> 10),
            mb if mb < 10 * 1024u64.pow(3) => write!(f, "{} MiB", mb >> 20),
            gb => write!(f, "{} GiB", gb >> 30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ByteSize;

    #[test]
    fn units() {
        assert_eq!(format!("{}", ByteSize::from(4823u64)), "4823 B");
        assert_eq!(format!("{}", ByteSize::from(0x4000usize)), "16 KiB");
        assert_eq!(format!("{}", ByteSize::from(130u64 << 20)), "130 MiB");
        assert_eq!(format!("{}", ByteSize::from(12u64 << 30)), "12 GiB");
    }
}
