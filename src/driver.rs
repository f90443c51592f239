//! The operations a walking session needs from a JTAG chain, and their implementation over
//! `Taps`.
//!
//! Parts are numbered the way urJTAG numbers them: part 0 is the device nearest TDO.  Every part
//! keeps its own instruction and one pending input buffer per data register, so selecting a
//! different part or instruction never loses what was pushed before.
use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::cable::Cable;
use crate::idcode::IdCode;
use crate::part::{PartDescription, BOUNDARY_REGISTER};
use crate::statemachine::JtagSM;
use crate::taps::{TapError, Taps};
use crate::vector::TransportVector;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Cable(#[from] TapError),
    #[error("no part {position} on the chain")]
    NotFound { position: usize },
    #[error("no devices detected on the chain")]
    DetectFailed,
    #[error("no part selected")]
    NoPartSelected,
    #[error("no part description attached to part {position}")]
    NoPartAttached { position: usize },
    #[error("part has no instruction {0:?}")]
    UnknownInstruction(String),
    #[error("part has no data register {0:?}")]
    UnknownRegister(String),
    #[error("no instruction set on part {position}")]
    NoInstruction { position: usize },
    #[error("part {position} has a {actual}-bit instruction register, its description says {expected}")]
    IrLength { position: usize, expected: usize, actual: usize },
    #[error("data register is {expected} bits, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

pub trait JtagDriver {
    /// Number of parts on the chain
    fn chain_length(&self) -> usize;

    fn read_idcode(&mut self, position: usize) -> Result<IdCode, DriverError>;

    /// Give the driver the instruction and register layout of the part at `position`
    fn attach_part(&mut self, position: usize, part: PartDescription) -> Result<(), DriverError>;

    /// Make `position` the part the following calls act on
    fn select_part(&mut self, position: usize) -> Result<(), DriverError>;

    /// Load the named instruction into the selected part and shift the instruction registers.
    /// Other parts keep the instruction they had.
    fn set_instruction(&mut self, name: &str) -> Result<(), DriverError>;

    /// Replace the pending input of the selected part's active data register
    fn push_dr(&mut self, vector: TransportVector) -> Result<(), DriverError>;

    /// Shift the data registers of the whole chain
    fn shift_dr(&mut self) -> Result<(), DriverError>;

    /// What the selected part's active data register captured during the last `shift_dr`
    fn read_dr(&mut self) -> Result<TransportVector, DriverError>;

    /// The pending input of the selected part's active data register
    fn dr_in(&mut self) -> Result<TransportVector, DriverError>;

    fn reset(&mut self) -> Result<(), DriverError>;
}

struct AttachedPart {
    description: PartDescription,
    instruction: Option<String>,
    /// Pending input per data register, cell 0 first
    dr_in: BTreeMap<String, Vec<bool>>,
}

impl AttachedPart {
    fn new(description: PartDescription) -> Self {
        Self {
            description,
            instruction: None,
            dr_in: BTreeMap::new(),
        }
    }

    fn register(&self, position: usize) -> Result<&str, DriverError> {
        let name = self
            .instruction
            .as_deref()
            .ok_or(DriverError::NoInstruction { position })?;
        self.description
            .instructions
            .get(name)
            .map(|i| i.register.as_str())
            .ok_or_else(|| DriverError::UnknownInstruction(name.to_string()))
    }

    fn register_length(&self, register: &str) -> Result<usize, DriverError> {
        match self.description.registers.get(register) {
            Some(len) => Ok(*len),
            None if register == BOUNDARY_REGISTER => Ok(self.description.boundary_length()),
            None => Err(DriverError::UnknownRegister(register.to_string())),
        }
    }

    /// The pending buffer for `register`, created from the safe values for the boundary register
    /// and zeros for anything else
    fn buffer(&mut self, register: &str) -> Result<&mut Vec<bool>, DriverError> {
        if !self.dr_in.contains_key(register) {
            let initial = if register == BOUNDARY_REGISTER {
                self.description.safe_vector()
            } else {
                vec![false; self.register_length(register)?]
            };
            self.dr_in.insert(register.to_string(), initial);
        }
        self.dr_in
            .get_mut(register)
            .ok_or_else(|| DriverError::UnknownRegister(register.to_string()))
    }
}

/// A detected scan chain driven through a `Cable`
pub struct ScanChain<T> {
    taps: Taps<T>,
    idcodes: Vec<IdCode>,
    parts: Vec<Option<AttachedPart>>,
    selected: Option<usize>,
}

impl<T, U> ScanChain<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Detect the chain behind `sm`
    pub fn connect(sm: JtagSM<T>) -> Result<Self, DriverError> {
        let mut taps = Taps::new(sm);
        let ids = taps.detect()?;
        if ids.is_empty() {
            return Err(DriverError::DetectFailed);
        }
        // taps count from TDI, parts from TDO
        let idcodes: Vec<IdCode> = ids.iter().rev().map(|id| IdCode::new(*id)).collect();
        info!(parts = idcodes.len(), "chain detected");
        for (position, id) in idcodes.iter().enumerate() {
            info!(position, idcode = %id, "part");
        }
        let parts = idcodes.iter().map(|_| None).collect();

        Ok(Self {
            taps,
            idcodes,
            parts,
            selected: None,
        })
    }

    fn tap_index(&self, position: usize) -> Result<usize, DriverError> {
        if position < self.idcodes.len() {
            Ok(self.idcodes.len() - 1 - position)
        } else {
            Err(DriverError::NotFound { position })
        }
    }

    fn selected(&self) -> Result<usize, DriverError> {
        self.selected.ok_or(DriverError::NoPartSelected)
    }

    fn attached(&mut self, position: usize) -> Result<&mut AttachedPart, DriverError> {
        self.parts
            .get_mut(position)
            .and_then(Option::as_mut)
            .ok_or(DriverError::NoPartAttached { position })
    }
}

impl<T, U> JtagDriver for ScanChain<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    fn chain_length(&self) -> usize {
        self.idcodes.len()
    }

    fn read_idcode(&mut self, position: usize) -> Result<IdCode, DriverError> {
        self.idcodes
            .get(position)
            .copied()
            .ok_or(DriverError::NotFound { position })
    }

    fn attach_part(&mut self, position: usize, part: PartDescription) -> Result<(), DriverError> {
        let tap = self.tap_index(position)?;
        let actual = self.taps.irlen(tap)?;
        if let Some(expected) = part.instruction_length {
            if expected != actual {
                return Err(DriverError::IrLength { position, expected, actual });
            }
        }
        self.parts[position] = Some(AttachedPart::new(part));
        Ok(())
    }

    fn select_part(&mut self, position: usize) -> Result<(), DriverError> {
        self.tap_index(position)?;
        self.selected = Some(position);
        Ok(())
    }

    fn set_instruction(&mut self, name: &str) -> Result<(), DriverError> {
        let position = self.selected()?;
        let tap = self.tap_index(position)?;
        let part = self.attached(position)?;
        let opcode = part
            .description
            .instructions
            .get(name)
            .ok_or_else(|| DriverError::UnknownInstruction(name.to_string()))?
            .shift_bits();
        part.instruction = Some(name.to_string());
        let register = part.register(position)?.to_string();
        let pending = part.buffer(&register)?.clone();

        debug!(position, instruction = name, register = %register, "set instruction");
        self.taps.set_instruction(tap, &opcode)?;
        self.taps.load_dr(tap, pending)?;
        self.taps.shift_ir()?;
        Ok(())
    }

    fn push_dr(&mut self, vector: TransportVector) -> Result<(), DriverError> {
        let position = self.selected()?;
        let tap = self.tap_index(position)?;
        let part = self.attached(position)?;
        let register = part.register(position)?.to_string();
        let buffer = part.buffer(&register)?;
        if buffer.len() != vector.len() {
            return Err(DriverError::LengthMismatch {
                expected: buffer.len(),
                actual: vector.len(),
            });
        }
        *buffer = vector.shift_order().collect();
        let pending = buffer.clone();
        self.taps.load_dr(tap, pending)?;
        Ok(())
    }

    fn shift_dr(&mut self) -> Result<(), DriverError> {
        self.taps.shift_dr()?;
        Ok(())
    }

    fn read_dr(&mut self) -> Result<TransportVector, DriverError> {
        let position = self.selected()?;
        let tap = self.tap_index(position)?;
        let part = self.attached(position)?;
        let register = part.register(position)?.to_string();
        let len = part.register_length(&register)?;
        let captured = self.taps.dr_out(tap)?;
        if captured.len() == len {
            Ok(TransportVector::from_shift_order(captured))
        } else {
            // nothing captured through this register yet
            Ok(TransportVector::new(vec![false; len]))
        }
    }

    fn dr_in(&mut self) -> Result<TransportVector, DriverError> {
        let position = self.selected()?;
        let part = self.attached(position)?;
        let register = part.register(position)?.to_string();
        let buffer = part.buffer(&register)?;
        Ok(TransportVector::from_shift_order(buffer))
    }

    fn reset(&mut self) -> Result<(), DriverError> {
        self.taps.reset()?;
        for part in self.parts.iter_mut().flatten() {
            part.instruction = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taps::tests::{SimChain, SimTap};

    // Both parts use a 4-bit IR where 0000 selects the boundary register.  SimTap's own
    // convention agrees for EXTEST; SAMPLE is 0000 too so the simulated capture is visible.
    const PART: &str = "\
register BSR 5
register BR 1
instruction length 4
instruction EXTEST 0000 BSR
instruction SAMPLE/PRELOAD 0000 BSR
instruction BYPASS 1111 BR
bit 4 C 0 *
bit 3 O 1 P3 4 1 Z
bit 2 O 0 P2
bit 1 I X IN1
bit 0 I X IN0
";

    fn sim() -> SimChain {
        // tap 0 is nearest TDI, so it is part 1
        SimChain::new(vec![
            SimTap::new(4, 0x1000_0001, vec![true, true, false, false, false]),
            SimTap::new(4, 0x2000_0001, vec![false, true, false, true, false]),
        ])
    }

    fn chain(sim: &mut SimChain) -> ScanChain<&mut SimChain> {
        let sm = JtagSM::new(sim).unwrap();
        let mut chain = ScanChain::connect(sm).unwrap();
        let part = PartDescription::parse(PART).unwrap();
        chain.attach_part(0, part.clone()).unwrap();
        chain.attach_part(1, part).unwrap();
        chain
    }

    #[test]
    fn positions_count_from_tdo() {
        let mut sim = sim();
        let mut chain = chain(&mut sim);
        assert_eq!(chain.chain_length(), 2);
        assert_eq!(chain.read_idcode(0).unwrap(), IdCode::new(0x2000_0001));
        assert_eq!(chain.read_idcode(1).unwrap(), IdCode::new(0x1000_0001));
        assert!(matches!(
            chain.read_idcode(2),
            Err(DriverError::NotFound { position: 2 })
        ));
    }

    #[test]
    fn dr_in_starts_at_safe_values() {
        let mut sim = sim();
        let mut chain = chain(&mut sim);
        chain.select_part(0).unwrap();
        chain.set_instruction("EXTEST").unwrap();
        // cells 4..0: C=0, P3=1, P2=0, IN1=X, IN0=X
        assert_eq!(chain.dr_in().unwrap().to_string(), "01000");
    }

    #[test]
    fn push_shift_read() {
        let mut sim = sim();
        {
            let mut chain = chain(&mut sim);
            chain.select_part(0).unwrap();
            chain.set_instruction("EXTEST").unwrap();
            chain.push_dr("10110".parse().unwrap()).unwrap();
            chain.shift_dr().unwrap();
            assert_eq!(chain.dr_in().unwrap().to_string(), "10110");
            // tap 1 captures cells 0..4 = 0,1,0,1,0
            assert_eq!(chain.read_dr().unwrap().to_string(), "01010");
        }
        // cell 0 first
        assert_eq!(sim.taps[1].driven, vec![false, true, true, false, true]);
    }

    #[test]
    fn other_part_keeps_its_instruction() {
        let mut sim = sim();
        {
            let mut chain = chain(&mut sim);
            chain.select_part(0).unwrap();
            chain.set_instruction("EXTEST").unwrap();
            chain.push_dr("11111".parse().unwrap()).unwrap();
            chain.select_part(1).unwrap();
            chain.set_instruction("SAMPLE/PRELOAD").unwrap();
            chain.shift_dr().unwrap();
            assert_eq!(chain.read_dr().unwrap().to_string(), "00011");
        }
        assert_eq!(sim.taps[1].driven, vec![true; 5]);
    }

    #[test]
    fn errors() {
        let mut sim = sim();
        let mut chain = chain(&mut sim);
        assert!(matches!(chain.set_instruction("EXTEST"), Err(DriverError::NoPartSelected)));
        chain.select_part(1).unwrap();
        assert!(matches!(
            chain.set_instruction("INTEST"),
            Err(DriverError::UnknownInstruction(name)) if name == "INTEST"
        ));
        assert!(matches!(chain.dr_in(), Err(DriverError::NoInstruction { position: 1 })));
        chain.set_instruction("EXTEST").unwrap();
        assert!(matches!(
            chain.push_dr("101".parse().unwrap()),
            Err(DriverError::LengthMismatch { expected: 5, actual: 3 })
        ));
        assert!(matches!(chain.select_part(5), Err(DriverError::NotFound { position: 5 })));

        let wrong = PartDescription::parse("instruction length 8\n").unwrap();
        assert!(matches!(
            chain.attach_part(0, wrong),
            Err(DriverError::IrLength { position: 0, expected: 8, actual: 4 })
        ));
    }
}
