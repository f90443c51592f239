//! IEEE 1149.1 device identification codes.
use core::fmt;

use serde::Serialize;

/// A 32-bit IDCODE: stepping (bits 31-28), part number (27-12), manufacturer (11-1) and a
/// fixed 1 in bit 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct IdCode(u32);

impl IdCode {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Keep the low 32 bits of a wider register read
    pub fn from_register(value: u64) -> Self {
        Self((value & 0xffff_ffff) as u32)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Stepping field as 4 binary digits, the key of a `STEPPINGS` table
    pub fn stepping(self) -> String {
        format!("{:04b}", self.0 >> 28)
    }

    /// Part number field as 16 binary digits, the key of a `PARTS` table
    pub fn part(self) -> String {
        format!("{:016b}", (self.0 >> 12) & 0xffff)
    }

    /// Manufacturer field as 11 binary digits, the key of the `MANUFACTURERS` table
    pub fn manufacturer(self) -> String {
        format!("{:011b}", (self.0 >> 1) & 0x7ff)
    }
}

impl fmt::Display for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
