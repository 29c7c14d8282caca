//! Storage kinds for variables.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Where a variable lives. A flag set combined with `|` across all use
/// sites; it only ever grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StorageKind(u8);

impl StorageKind {
    /// Plain local slot of the declaring function
    pub const LOCAL: StorageKind = StorageKind(0);
    /// Field of the declaring scope's closure frame
    pub const HOISTED: StorageKind = StorageKind(1);
    /// Frame field holding an independently allocated cell
    pub const BOXED: StorageKind = StorageKind(2);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: StorageKind) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_local(self) -> bool {
        self.0 == 0
    }

    /// Lives in a frame. Boxed storage is always hoisted too.
    pub fn is_hoisted(self) -> bool {
        self.0 != 0
    }

    pub fn is_boxed(self) -> bool {
        self.contains(StorageKind::BOXED)
    }
}

impl BitOr for StorageKind {
    type Output = StorageKind;

    fn bitor(self, rhs: StorageKind) -> StorageKind {
        StorageKind(self.0 | rhs.0)
    }
}

impl BitOrAssign for StorageKind {
    fn bitor_assign(&mut self, rhs: StorageKind) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.contains(StorageKind::HOISTED), self.is_boxed()) {
            (_, true) => write!(f, "boxed"),
            (true, false) => write!(f, "hoisted"),
            (false, false) => write!(f, "local"),
        }
    }
}
