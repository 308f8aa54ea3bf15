//! Transport access locks

use core::ops::{BitAnd, BitOr, Not};

/// Access rights on a transport: any combination of `READ` and `WRITE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportLock(u8);

impl TransportLock {
    /// No access
    pub const NONE: Self = Self(0);
    /// Read access
    pub const READ: Self = Self(1);
    /// Write access
    pub const WRITE: Self = Self(2);
    /// Read and write access
    pub const READ_WRITE: Self = Self(3);

    /// Raw bits
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether no bit is set
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set in `self`
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether `self` and `other` share a bit
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// String form: `""`, `"r"`, `"w"` or `"rw"`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self.0 & 0x03 {
            1 => "r",
            2 => "w",
            3 => "rw",
            _ => "",
        }
    }
}

impl BitOr for TransportLock {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for TransportLock {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for TransportLock {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::READ_WRITE.0)
    }
}

/// A parsed access string such as `"rw"` or `"r?"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Access {
    /// Requested lock bits
    pub lock: TransportLock,
    /// `?` marker: only succeed if playback already started
    pub weak: bool,
}

impl Access {
    /// Parse an access string. `r` requests read, `w` requests write and `?`
    /// marks a weak request; other characters are ignored.
    #[must_use]
    pub fn parse(access: &str) -> Self {
        let mut lock = TransportLock::NONE;
        let mut weak = false;
        for c in access.chars() {
            match c {
                'r' => lock = lock | TransportLock::READ,
                'w' => lock = lock | TransportLock::WRITE,
                '?' => weak = true,
                _ => {}
            }
        }
        Self { lock, weak }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_strings() {
        assert_eq!(TransportLock::NONE.as_str(), "");
        assert_eq!(TransportLock::READ.as_str(), "r");
        assert_eq!(TransportLock::WRITE.as_str(), "w");
        assert_eq!(TransportLock::READ_WRITE.as_str(), "rw");
    }

    #[test]
    fn test_lock_algebra() {
        let rw = TransportLock::READ | TransportLock::WRITE;
        assert_eq!(rw, TransportLock::READ_WRITE);
        assert!(rw.contains(TransportLock::READ));
        assert!(!TransportLock::READ.contains(rw));
        assert!(rw.intersects(TransportLock::WRITE));
        assert!(!TransportLock::READ.intersects(TransportLock::WRITE));
        assert_eq!(rw & !TransportLock::READ, TransportLock::WRITE);
        assert_eq!(!TransportLock::NONE, TransportLock::READ_WRITE);
    }

    #[test]
    fn test_access_parse() {
        assert_eq!(
            Access::parse("rw"),
            Access {
                lock: TransportLock::READ_WRITE,
                weak: false
            }
        );
        assert_eq!(Access::parse("wr").lock, TransportLock::READ_WRITE);
        assert_eq!(Access::parse("r?").lock, TransportLock::READ);
        assert!(Access::parse("r?").weak);
        assert!(Access::parse("").lock.is_empty());
        assert!(Access::parse("x").lock.is_empty());
    }
}
