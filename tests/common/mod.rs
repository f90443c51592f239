//! A simulated board for session tests: parts on a chain, wires between their pins, pull-ups on
//! every input nothing drives.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;

use jtag_walk::cable::CableError;
use jtag_walk::driver::{DriverError, JtagDriver};
use jtag_walk::idcode::IdCode;
use jtag_walk::part::{PartDescription, BOUNDARY_REGISTER};
use jtag_walk::pinmap::Direction;
use jtag_walk::taps::TapError;
use jtag_walk::vector::TransportVector;

pub const FPGA_ID: u32 = 0x020b10dd;
pub const CPLD_ID: u32 = 0x06e5e093;

// Drivers in bit order: IO3 (2), IO2 (4, enabled by cell 3 = 1), LED1 (5), LED0 (6, enabled by
// cell 7 = 0).  Cell 0 is an output with no pin and never walks.
pub const FPGA: &str = "\
register BSR 8
register BR 1
instruction length 4
instruction EXTEST 0000 BSR
instruction SAMPLE/PRELOAD 0001 BSR
instruction BYPASS 1111 BR
bit 7 C 1 *
bit 6 O 0 LED0 7 1 Z
bit 5 O 0 LED1
bit 4 B X IO2 3 0 Z
bit 3 C 0 *
bit 2 O 0 IO3
bit 1 I X CLK
bit 0 O 0 *
";

pub const CPLD: &str = "\
register BSR 6
register BR 1
instruction length 4
instruction EXTEST 0000 BSR
instruction SAMPLE/PRELOAD 0001 BSR
instruction BYPASS 1111 BR
bit 5 I X IN_A
bit 4 I X IN_B
bit 3 I X IN_C
bit 2 I X IN_D
bit 1 B X IN_E 0 1 Z
bit 0 C 1 *
";

/// Write a urJTAG data directory holding both part files
pub fn database(base: &Path) {
    database_with(base, FPGA, CPLD);
}

/// Same tree, with other part file contents
pub fn database_with(base: &Path, fpga_text: &str, cpld_text: &str) {
    let fpga = IdCode::new(FPGA_ID);
    let cpld = IdCode::new(CPLD_ID);
    std::fs::write(
        base.join("MANUFACTURERS"),
        format!(
            "# test vendors\n{}\taltera\t\tAltera\n{}\txilinx\t\tXilinx\n",
            fpga.manufacturer(),
            cpld.manufacturer()
        ),
    )
    .unwrap();

    for (vendor, part, file, id, text) in [
        ("altera", "ep2c20", "fpga", fpga, fpga_text),
        ("xilinx", "xc2c64", "cpld", cpld, cpld_text),
    ] {
        let dir = base.join(vendor).join(part);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(base.join(vendor).join("PARTS"), format!("{}\t{part}\n", id.part())).unwrap();
        std::fs::write(dir.join("STEPPINGS"), format!("{}\t{file}\t0\n", id.stepping())).unwrap();
        std::fs::write(dir.join(file), text).unwrap();
    }
}

struct SimPart {
    idcode: u32,
    description: Option<PartDescription>,
    instruction: Option<String>,
    /// cell 0 first
    pending: Vec<bool>,
    captured: Vec<bool>,
}

pub struct SimBoard {
    parts: Vec<SimPart>,
    /// (part, pin) driving (part, pin)
    wires: Vec<((usize, String), (usize, String))>,
    selected: Option<usize>,
    pub shifts: usize,
    pub resets: usize,
    /// Fail the n-th `shift_dr`, counting from 1
    pub fail_at_shift: Option<usize>,
}

impl SimBoard {
    pub fn new(idcodes: &[u32]) -> Self {
        Self {
            parts: idcodes
                .iter()
                .map(|id| SimPart {
                    idcode: *id,
                    description: None,
                    instruction: None,
                    pending: Vec::new(),
                    captured: Vec::new(),
                })
                .collect(),
            wires: Vec::new(),
            selected: None,
            shifts: 0,
            resets: 0,
            fail_at_shift: None,
        }
    }

    pub fn wire(mut self, from: (usize, &str), to: (usize, &str)) -> Self {
        self.wires
            .push(((from.0, from.1.to_string()), (to.0, to.1.to_string())));
        self
    }

    fn selected(&mut self) -> Result<(usize, &mut SimPart), DriverError> {
        let position = self.selected.ok_or(DriverError::NoPartSelected)?;
        Ok((position, &mut self.parts[position]))
    }

    /// Level of every enabled output pin of parts in EXTEST
    fn driven_pins(&self) -> HashMap<(usize, String), bool> {
        let mut levels = HashMap::new();
        for (position, part) in self.parts.iter().enumerate() {
            let Some(description) = &part.description else { continue };
            if part.instruction.as_deref() != Some("EXTEST") {
                continue;
            }
            for cell in &description.bits {
                if !cell.direction.drives() || cell.pin_name == "*" {
                    continue;
                }
                let enabled = match cell.enable() {
                    Some((control, enable)) => part.pending.get(control) == Some(&enable),
                    None => true,
                };
                if let (true, Some(level)) = (enabled, part.pending.get(cell.bit_index)) {
                    levels.insert((position, cell.pin_name.clone()), *level);
                }
            }
        }
        levels
    }

    fn input_level(&self, levels: &HashMap<(usize, String), bool>, position: usize, pin: &str) -> bool {
        let mut sources = self
            .wires
            .iter()
            .filter(|(_, to)| to.0 == position && to.1 == pin)
            .filter_map(|(from, _)| levels.get(from).copied())
            .peekable();
        if sources.peek().is_none() {
            // pulled up
            return true;
        }
        sources.all(|level| level)
    }
}

impl JtagDriver for SimBoard {
    fn chain_length(&self) -> usize {
        self.parts.len()
    }

    fn read_idcode(&mut self, position: usize) -> Result<IdCode, DriverError> {
        self.parts
            .get(position)
            .map(|p| IdCode::new(p.idcode))
            .ok_or(DriverError::NotFound { position })
    }

    fn attach_part(&mut self, position: usize, part: PartDescription) -> Result<(), DriverError> {
        let slot = self
            .parts
            .get_mut(position)
            .ok_or(DriverError::NotFound { position })?;
        slot.pending = part.safe_vector();
        slot.description = Some(part);
        Ok(())
    }

    fn select_part(&mut self, position: usize) -> Result<(), DriverError> {
        if position >= self.parts.len() {
            return Err(DriverError::NotFound { position });
        }
        self.selected = Some(position);
        Ok(())
    }

    fn set_instruction(&mut self, name: &str) -> Result<(), DriverError> {
        let (position, part) = self.selected()?;
        let description = part
            .description
            .as_ref()
            .ok_or(DriverError::NoPartAttached { position })?;
        let instruction = description
            .instructions
            .get(name)
            .ok_or_else(|| DriverError::UnknownInstruction(name.to_string()))?;
        let length = if instruction.register == BOUNDARY_REGISTER {
            description.boundary_length()
        } else {
            *description
                .registers
                .get(&instruction.register)
                .ok_or_else(|| DriverError::UnknownRegister(instruction.register.clone()))?
        };
        if part.pending.len() != length {
            part.pending = if instruction.register == BOUNDARY_REGISTER {
                description.safe_vector()
            } else {
                vec![false; length]
            };
            part.captured.clear();
        }
        part.instruction = Some(name.to_string());
        Ok(())
    }

    fn push_dr(&mut self, vector: TransportVector) -> Result<(), DriverError> {
        let (_, part) = self.selected()?;
        if vector.len() != part.pending.len() {
            return Err(DriverError::LengthMismatch {
                expected: part.pending.len(),
                actual: vector.len(),
            });
        }
        part.pending = vector.shift_order().collect();
        Ok(())
    }

    fn shift_dr(&mut self) -> Result<(), DriverError> {
        self.shifts += 1;
        if self.fail_at_shift == Some(self.shifts) {
            return Err(DriverError::Cable(TapError::Cable(CableError::Adapter(
                "cable unplugged".into(),
            ))));
        }

        let levels = self.driven_pins();
        let mut captures = Vec::new();
        for (position, part) in self.parts.iter().enumerate() {
            let Some(description) = &part.description else {
                captures.push(None);
                continue;
            };
            if part.instruction.is_none() {
                captures.push(None);
                continue;
            }
            let mut captured = vec![false; part.pending.len()];
            for cell in &description.bits {
                let input = matches!(cell.direction, Direction::Input | Direction::Bidirectional);
                if !input || cell.pin_name == "*" {
                    continue;
                }
                if let Some(slot) = captured.get_mut(cell.bit_index) {
                    *slot = self.input_level(&levels, position, &cell.pin_name);
                }
            }
            captures.push(Some(captured));
        }
        for (part, captured) in self.parts.iter_mut().zip(captures) {
            if let Some(captured) = captured {
                part.captured = captured;
            }
        }
        Ok(())
    }

    fn read_dr(&mut self) -> Result<TransportVector, DriverError> {
        let (_, part) = self.selected()?;
        if part.captured.is_empty() {
            return Ok(TransportVector::new(vec![false; part.pending.len()]));
        }
        Ok(TransportVector::from_shift_order(&part.captured))
    }

    fn dr_in(&mut self) -> Result<TransportVector, DriverError> {
        let (_, part) = self.selected()?;
        Ok(TransportVector::from_shift_order(&part.pending))
    }

    fn reset(&mut self) -> Result<(), DriverError> {
        self.resets += 1;
        for part in &mut self.parts {
            part.instruction = None;
        }
        Ok(())
    }
}
