//! A convenience wrapper for JTAG scan chains with multiple TAPs present.  `Taps` keeps an
//! instruction and a pending data register for every TAP, so each one can be given its own
//! instruction and data while the rest sit in BYPASS.  Shifts always go through the whole chain.
//!
//! TAP 0 is the one nearest TDI.  Bits travel from TDI towards TDO, so the TAP nearest TDO is
//! shifted first.
use thiserror::Error;

use crate::cable::{Cable, CableError};
use crate::statemachine::{JtagSM, JtagState, Register};
use crate::vector::{bits_to_bytes, bytes_to_bits};

// A chain with more instruction bits than this is treated as floating TDO
const MAX_IR_BITS: usize = 4096;

#[derive(Debug, Error)]
pub enum TapError {
    #[error(transparent)]
    Cable(#[from] CableError),
    #[error("no TAP {tap} in a chain of {len}")]
    NoSuchTap { tap: usize, len: usize },
    #[error("TAP {tap} has a {expected}-bit instruction register, got {actual} bits")]
    IrLength { tap: usize, expected: usize, actual: usize },
    #[error("the chain is empty")]
    NoTaps,
    #[error("no end of the instruction registers after {0} bits; is TDO connected?")]
    Runaway(usize),
}

struct Tap {
    irlen: usize,
    ir: Vec<bool>,
    dr_in: Vec<bool>,
    dr_out: Vec<bool>,
}

impl Tap {
    fn bypassed(irlen: usize) -> Self {
        Self {
            irlen,
            ir: vec![true; irlen],
            dr_in: vec![false],
            dr_out: Vec::new(),
        }
    }
}

pub struct Taps<T> {
    pub sm: JtagSM<T>,
    taps: Vec<Tap>,
}

/// Pack bits for `read_write_reg`: the byte buffer and the count of bits used in its last byte
fn pack(bits: &[bool]) -> (Vec<u8>, u8) {
    let last = match bits.len() % 8 {
        0 => 8,
        n => n as u8,
    };
    (bits_to_bytes(bits), last)
}

impl<T, U> Taps<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create an object using an existing `JtagSM` object
    pub fn new(sm: JtagSM<T>) -> Self {
        Self {
            sm,
            taps: Vec::new(),
        }
    }

    /// Add a TAP on the TDO side of the chain with the given instruction register length.  It
    /// starts in BYPASS.
    pub fn add_tap(&mut self, irlen: usize) {
        self.taps.push(Tap::bypassed(irlen));
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    pub fn irlen(&self, tap: usize) -> Result<usize, TapError> {
        self.tap(tap).map(|t| t.irlen)
    }

    fn tap(&self, tap: usize) -> Result<&Tap, TapError> {
        let len = self.taps.len();
        self.taps.get(tap).ok_or(TapError::NoSuchTap { tap, len })
    }

    fn tap_mut(&mut self, tap: usize) -> Result<&mut Tap, TapError> {
        let len = self.taps.len();
        self.taps.get_mut(tap).ok_or(TapError::NoSuchTap { tap, len })
    }

    /// Attempt to autodetect the number of TAPs on the scan chain and the instruction register
    /// length for each.  Returns the IDCODE of every TAP, TAP 0 first, with 0 for TAPs that come
    /// up in BYPASS.
    pub fn detect(&mut self) -> Result<Vec<u32>, TapError> {
        self.taps = Vec::new();
        self.sm.mode_reset()?;

        // Every IR captures 1 in its lowest bit followed by zeros.  Once the captured values are
        // through, the ones we shift in come out and two ones in a row end the chain.
        let mut count: i32 = -1;
        let mut irlen = vec![];
        let mut seen = 0;
        loop {
            if seen > MAX_IR_BITS {
                return Err(TapError::Runaway(seen));
            }
            seen += 1;
            let bit = self.sm.read_reg(Register::Instruction, 1)?;
            if bit.first().map_or(false, |b| b & 1 != 0) {
                if count > 0 {
                    tracing::debug!(irlen = count + 1, "found instruction register");
                    irlen.push(count as usize + 1)
                }
                if count == 0 {
                    break;
                }
                count = 0;
            } else {
                count += 1;
            }
        }

        self.sm.mode_reset()?;
        let mut ids = vec![];
        for _ in 0..irlen.len() {
            let bit = self.sm.read_reg(Register::Data, 1)?;
            if bit.first().map_or(true, |b| b & 1 == 0) {
                tracing::warn!("TAP without an IDCODE register");
                ids.push(0);
            } else {
                let bits = bytes_to_bits(&self.sm.read_reg(Register::Data, 31)?, 31);
                let idcode = bits
                    .iter()
                    .rev()
                    .fold(0u32, |acc, b| (acc << 1) | u32::from(*b));
                // Add back the one we read
                ids.push((idcode << 1) | 1);
            }
        }
        self.sm.mode_reset()?;

        irlen.reverse();
        ids.reverse();

        for (i, (len, id)) in irlen.iter().zip(&ids).enumerate() {
            tracing::info!(tap = i, irlen = len, idcode = format_args!("{id:#010x}"), "adding tap");
            self.add_tap(*len);
        }
        Ok(ids)
    }

    /// Load `ir`, first bit shifted first, as the next instruction for `tap`.  Nothing is shifted
    /// until `shift_ir`.
    pub fn set_instruction(&mut self, tap: usize, ir: &[bool]) -> Result<(), TapError> {
        let t = self.tap_mut(tap)?;
        if ir.len() != t.irlen {
            return Err(TapError::IrLength {
                tap,
                expected: t.irlen,
                actual: ir.len(),
            });
        }
        t.ir = ir.to_vec();
        Ok(())
    }

    /// Put `tap` back into BYPASS
    pub fn bypass(&mut self, tap: usize) -> Result<(), TapError> {
        let t = self.tap_mut(tap)?;
        *t = Tap::bypassed(t.irlen);
        Ok(())
    }

    /// Load the data `tap` receives on the next `shift_dr`, first bit shifted first.  The length
    /// must match the register its instruction selects.
    pub fn load_dr(&mut self, tap: usize, dr: Vec<bool>) -> Result<(), TapError> {
        self.tap_mut(tap)?.dr_in = dr;
        Ok(())
    }

    pub fn dr_in(&self, tap: usize) -> Result<&[bool], TapError> {
        self.tap(tap).map(|t| t.dr_in.as_slice())
    }

    /// What `tap` captured during the last `shift_dr`
    pub fn dr_out(&self, tap: usize) -> Result<&[bool], TapError> {
        self.tap(tap).map(|t| t.dr_out.as_slice())
    }

    fn shift(&mut self, reg: Register) -> Result<Vec<bool>, TapError> {
        if self.taps.is_empty() {
            return Err(TapError::NoTaps);
        }
        let bits: Vec<bool> = self
            .taps
            .iter()
            .rev()
            .flat_map(|t| match reg {
                Register::Instruction => t.ir.iter(),
                Register::Data => t.dr_in.iter(),
            })
            .copied()
            .collect();
        let (data, last) = pack(&bits);
        let out = self.sm.read_write_reg(reg, &data, last, true)?;
        self.sm.change_mode(JtagState::Idle)?;
        Ok(bytes_to_bits(&out, bits.len()))
    }

    /// Shift every TAP's instruction through the chain and update it
    pub fn shift_ir(&mut self) -> Result<(), TapError> {
        self.shift(Register::Instruction).map(|_| ())
    }

    /// Shift every TAP's pending data through the chain, keeping what each one captured
    pub fn shift_dr(&mut self) -> Result<(), TapError> {
        let out = self.shift(Register::Data)?;
        let mut rest = out.as_slice();
        for t in self.taps.iter_mut().rev() {
            let (mine, tail) = rest.split_at(t.dr_in.len().min(rest.len()));
            t.dr_out = mine.to_vec();
            rest = tail;
        }
        Ok(())
    }

    /// Reset the chain.  Every TAP comes back in BYPASS.
    pub fn reset(&mut self) -> Result<(), TapError> {
        self.sm.mode_reset()?;
        for t in &mut self.taps {
            *t = Tap::bypassed(t.irlen);
        }
        Ok(())
    }
}
