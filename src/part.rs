//! Reader for urJTAG-style part description files.
//!
//! These are the files a BSDL converter produces, one per device stepping:
//!
//! ```text
//! register BSR 240
//! register BR 1
//! instruction length 8
//! instruction EXTEST 00000000 BSR
//! instruction SAMPLE/PRELOAD 00000001 BSR
//! bit 239 C 1 *
//! bit 238 B X IO_A3 239 1 Z
//! ```
//!
//! `register` and `instruction` lines tell the driver how to select a data register; `bit` lines
//! become the device's `PinMap`.  Anything else is ignored.
use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::pinmap::{Direction, PinDescriptor, PinMap, PinMapError};

/// Name of the boundary-scan register in part files
pub const BOUNDARY_REGISTER: &str = "BSR";

#[derive(Debug, Error)]
pub enum PartError {
    #[error("cannot read part file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Opcode as written in the file, most significant bit first
    pub opcode: String,
    /// Data register the instruction selects
    pub register: String,
}

impl Instruction {
    /// Opcode bits in the order they are shifted into the IR: least significant first
    pub fn shift_bits(&self) -> Vec<bool> {
        self.opcode.chars().rev().map(|c| c == '1').collect()
    }
}

/// A `bit` line with a cell type other than I, O, B or C, such as urJTAG's `X` for internal
/// cells.  It never becomes a pin but its safe value still goes into the initial register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtherCell {
    pub bit_index: usize,
    pub code: String,
    pub safe_value: Option<bool>,
}

enum BitLine {
    Pin(PinDescriptor),
    Other(OtherCell),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartDescription {
    pub instruction_length: Option<usize>,
    pub registers: BTreeMap<String, usize>,
    pub instructions: BTreeMap<String, Instruction>,
    /// Every `bit` line with a known cell type, unfiltered
    pub bits: Vec<PinDescriptor>,
    pub other_cells: Vec<OtherCell>,
}

fn syntax(line: usize, reason: impl Into<String>) -> PartError {
    PartError::Syntax {
        line,
        reason: reason.into(),
    }
}

fn parse_index(field: &str, line: usize, what: &str) -> Result<usize, PartError> {
    field
        .parse()
        .map_err(|_| syntax(line, format!("{what} {field:?} is not a number")))
}

fn parse_level(field: &str, line: usize, what: &str) -> Result<bool, PartError> {
    match field {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(syntax(line, format!("{what} {field:?} is not 0 or 1"))),
    }
}

fn parse_bit(fields: &[&str], line: usize) -> Result<BitLine, PartError> {
    if fields.len() < 5 {
        return Err(syntax(line, "bit line needs index, type, safe value and pin name"));
    }
    let bit_index = parse_index(fields[1], line, "bit index")?;
    let safe_value = match fields[3] {
        "X" | "x" | "?" => None,
        other => Some(parse_level(other, line, "safe value")?),
    };
    let Some(direction) = Direction::from_code(fields[2]) else {
        return Ok(BitLine::Other(OtherCell {
            bit_index,
            code: fields[2].to_string(),
            safe_value,
        }));
    };
    let control_bit = fields
        .get(5)
        .map(|f| parse_index(f, line, "control bit"))
        .transpose()?;
    let disable_value = fields
        .get(6)
        .map(|f| parse_level(f, line, "disable value"))
        .transpose()?;

    Ok(BitLine::Pin(PinDescriptor {
        bit_index,
        direction,
        safe_value,
        pin_name: fields[4].to_string(),
        control_bit,
        disable_value,
        disable_state: fields.get(7).map(|s| s.to_string()),
    }))
}

impl PartDescription {
    pub fn parse(text: &str) -> Result<Self, PartError> {
        let mut part = PartDescription::default();

        for (n, raw) in text.lines().enumerate() {
            let line = n + 1;
            let fields: Vec<&str> = raw.split_whitespace().collect();
            match fields.as_slice() {
                ["bit", ..] => match parse_bit(&fields, line)? {
                    BitLine::Pin(pin) => part.bits.push(pin),
                    BitLine::Other(cell) => {
                        debug!(line, bit = cell.bit_index, code = %cell.code, "cell is not a pin, dropped");
                        part.other_cells.push(cell);
                    }
                },
                ["register", name, len, ..] => {
                    let len = parse_index(len, line, "register length")?;
                    part.registers.insert(name.to_string(), len);
                }
                ["instruction", "length", len, ..] => {
                    part.instruction_length = Some(parse_index(len, line, "instruction length")?);
                }
                ["instruction", name, opcode, register, ..] => {
                    if !opcode.chars().all(|c| c == '0' || c == '1') {
                        return Err(syntax(line, format!("opcode {opcode:?} is not binary")));
                    }
                    part.instructions.insert(
                        name.to_string(),
                        Instruction {
                            opcode: opcode.to_string(),
                            register: register.to_string(),
                        },
                    );
                }
                _ => {}
            }
        }

        debug!(
            bits = part.bits.len(),
            instructions = part.instructions.len(),
            "parsed part description"
        );
        Ok(part)
    }

    pub fn load(path: &Path) -> Result<Self, PartError> {
        let text = std::fs::read_to_string(path).map_err(|source| PartError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Length of the boundary-scan register: the `BSR` register line if there is one, otherwise
    /// one past the highest `bit` line.
    pub fn boundary_length(&self) -> usize {
        self.registers
            .get(BOUNDARY_REGISTER)
            .copied()
            .unwrap_or_else(|| {
                self.bits
                    .iter()
                    .map(|b| b.bit_index)
                    .chain(self.other_cells.iter().map(|c| c.bit_index))
                    .map(|i| i + 1)
                    .max()
                    .unwrap_or(0)
            })
    }

    pub fn pin_map(&self) -> Result<PinMap, PinMapError> {
        PinMap::from_records(self.bits.iter().cloned(), self.boundary_length())
    }

    /// Initial boundary register contents: every cell at its safe value, don't-care as 0.
    /// Returned cell 0 first.
    pub fn safe_vector(&self) -> Vec<bool> {
        let mut bits = vec![false; self.boundary_length()];
        let cells = self
            .bits
            .iter()
            .map(|b| (b.bit_index, b.safe_value))
            .chain(self.other_cells.iter().map(|c| (c.bit_index, c.safe_value)));
        for (index, safe) in cells {
            if let (Some(slot), Some(true)) = (bits.get_mut(index), safe) {
                *slot = true;
            }
        }
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PART: &str = "\
# generated from BSDL
signal IO_A3 1
register BSR 6
register BR 1
instruction length 4
instruction EXTEST 0000 BSR
instruction SAMPLE/PRELOAD 0001 BSR
instruction BYPASS 1111 BR
bit 5 C 1 *
bit 4 B X IO_A3 5 1 Z
bit 3 I X IO_A2
bit 2 O 0 * 5 1 Z
bit 1 O 1 LED0 0 0 WEAK1
bit 0 C 0 *
";

    #[test]
    fn parses_registers_and_instructions() {
        let part = PartDescription::parse(PART).unwrap();
        assert_eq!(part.instruction_length, Some(4));
        assert_eq!(part.boundary_length(), 6);
        assert_eq!(part.registers.get("BR"), Some(&1));
        let sample = &part.instructions["SAMPLE/PRELOAD"];
        assert_eq!(sample.register, "BSR");
        assert_eq!(sample.shift_bits(), vec![true, false, false, false]);
    }

    #[test]
    fn parses_bit_lines() {
        let part = PartDescription::parse(PART).unwrap();
        assert_eq!(part.bits.len(), 6);
        let io = part.bits.iter().find(|b| b.bit_index == 4).unwrap();
        assert_eq!(io.direction, Direction::Bidirectional);
        assert_eq!(io.safe_value, None);
        assert_eq!(io.enable(), Some((5, false)));
        assert_eq!(io.disable_state.as_deref(), Some("Z"));
        let input = part.bits.iter().find(|b| b.bit_index == 3).unwrap();
        assert_eq!(input.control_bit, None);
    }

    #[test]
    fn pin_map_applies_filter() {
        let map = PartDescription::parse(PART).unwrap().pin_map().unwrap();
        let kept: Vec<usize> = map.iter().map(|p| p.bit_index).collect();
        assert_eq!(kept, vec![0, 1, 3, 4, 5]);
    }

    #[test]
    fn safe_vector_follows_safe_values() {
        let part = PartDescription::parse(PART).unwrap();
        assert_eq!(
            part.safe_vector(),
            vec![false, true, false, false, false, true]
        );
    }

    #[test]
    fn length_falls_back_to_highest_bit() {
        let part = PartDescription::parse("bit 9 I X PIN9\nbit 2 I X PIN2\n").unwrap();
        assert_eq!(part.boundary_length(), 10);
    }

    #[test]
    fn reports_line_of_bad_field() {
        let err = PartDescription::parse("register BSR 2\nbit one O 0 PIN\n").unwrap_err();
        assert!(matches!(err, PartError::Syntax { line: 2, .. }));
        let err = PartDescription::parse("bit 1 X 2 *\n").unwrap_err();
        assert!(matches!(err, PartError::Syntax { line: 1, .. }));
    }

    #[test]
    fn internal_cells_are_not_pins() {
        let part = PartDescription::parse("register BSR 3\nbit 2 X 1 *\nbit 1 X 0 *\nbit 0 O 0 P0\n").unwrap();
        assert_eq!(part.bits.len(), 1);
        assert_eq!(part.other_cells.len(), 2);
        assert_eq!(part.other_cells[0].code, "X");
        // the internal cell's safe value still lands in the register
        assert_eq!(part.safe_vector(), vec![false, false, true]);

        let map = part.pin_map().unwrap();
        let kept: Vec<usize> = map.iter().map(|p| p.bit_index).collect();
        assert_eq!(kept, vec![0]);
    }
}
