//! Fixed-width boundary-scan vectors.
//!
//! A register snapshot can be written down in two orders.  `LogicalVector` indexes bits by their
//! position in the boundary-scan register, so element 0 is cell 0.  `TransportVector` is the form
//! exchanged with a `JtagDriver`: the same bits written most-significant first, which is the
//! logical order reversed.  The only way between the two is `into_transport` / `into_logical`, so
//! every algorithm works in logical order and the reversal happens once at the driver boundary.
use core::fmt;
use core::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VectorError {
    #[error("bit index {index} out of range for a {len}-bit vector")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("vector lengths differ: {left} bits vs {right} bits")]
    LengthMismatch { left: usize, right: usize },
    #[error("invalid bit character {0:?}, expected '0' or '1'")]
    InvalidBit(char),
}

fn parse_bits(s: &str) -> Result<Vec<bool>, VectorError> {
    s.chars()
        .map(|c| match c {
            '0' => Ok(false),
            '1' => Ok(true),
            other => Err(VectorError::InvalidBit(other)),
        })
        .collect()
}

fn write_bits(f: &mut fmt::Formatter<'_>, bits: &[bool]) -> fmt::Result {
    for bit in bits {
        f.write_str(if *bit { "1" } else { "0" })?;
    }
    Ok(())
}

/// Register bits indexed by boundary-scan cell number.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LogicalVector {
    bits: Vec<bool>,
}

impl LogicalVector {
    pub fn new(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    /// A vector of `len` bits, all set to `value`
    pub fn filled(len: usize, value: bool) -> Self {
        Self { bits: vec![value; len] }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).copied()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Return a copy of this vector with bit `index` set to `value`
    pub fn set_bit(mut self, index: usize, value: bool) -> Result<Self, VectorError> {
        self.set(index, value)?;
        Ok(self)
    }

    /// Set bit `index` in place
    pub fn set(&mut self, index: usize, value: bool) -> Result<(), VectorError> {
        let len = self.bits.len();
        match self.bits.get_mut(index) {
            Some(bit) => {
                *bit = value;
                Ok(())
            }
            None => Err(VectorError::IndexOutOfRange { index, len }),
        }
    }

    pub fn into_transport(mut self) -> TransportVector {
        self.bits.reverse();
        TransportVector { bits: self.bits }
    }
}

impl fmt::Display for LogicalVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_bits(f, &self.bits)
    }
}

impl FromStr for LogicalVector {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bits(s).map(Self::new)
    }
}

/// Register bits in the order the driver exchanges them: highest cell first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TransportVector {
    bits: Vec<bool>,
}

impl TransportVector {
    pub fn new(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Return a copy with the bit for cell `index` set to `value`.  `index` is a cell number, so
    /// it counts from the end of the transport order.
    pub fn set_bit(mut self, index: usize, value: bool) -> Result<Self, VectorError> {
        let len = self.bits.len();
        if index >= len {
            return Err(VectorError::IndexOutOfRange { index, len });
        }
        self.bits[len - 1 - index] = value;
        Ok(self)
    }

    pub fn into_logical(mut self) -> LogicalVector {
        self.bits.reverse();
        LogicalVector { bits: self.bits }
    }

    /// The bits in the order they are clocked into TDI: cell 0 first.  This is how a driver
    /// serializes the vector onto the wire, not a change of representation.
    pub fn shift_order(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().rev().copied()
    }

    /// Rebuild a vector from bits received from TDO, cell 0 first
    pub fn from_shift_order(bits: &[bool]) -> Self {
        Self {
            bits: bits.iter().rev().copied().collect(),
        }
    }
}

impl fmt::Display for TransportVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_bits(f, &self.bits)
    }
}

impl FromStr for TransportVector {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bits(s).map(Self::new)
    }
}

/// Pack bits LSB-first into bytes, the layout every `Cable` shifts.
pub fn bits_to_bytes(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; (bits.len() + 7) / 8];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Unpack the first `len` bits of an LSB-first byte buffer.  Missing bytes read as zero.
pub fn bytes_to_bits(bytes: &[u8], len: usize) -> Vec<bool> {
    (0..len)
        .map(|i| bytes.get(i / 8).map_or(false, |b| (b >> (i % 8)) & 1 == 1))
        .collect()
}
