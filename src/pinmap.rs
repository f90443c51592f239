//! Per-device table of boundary-scan cells.
//!
//! A `PinMap` is built once from the `bit` records of a part file and never changes afterwards.
//! It answers two questions for the rest of the crate: which cells drive a physical pin (and how
//! to enable them), and which pin a changed register bit belongs to.
use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Input,
    Output,
    Bidirectional,
    Control,
}

impl Direction {
    /// Decode the single-letter cell type used in part files
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "I" => Some(Direction::Input),
            "O" => Some(Direction::Output),
            "B" => Some(Direction::Bidirectional),
            "C" => Some(Direction::Control),
            _ => None,
        }
    }

    /// Output and bidirectional cells can drive a pin
    pub fn drives(self) -> bool {
        matches!(self, Direction::Output | Direction::Bidirectional)
    }
}

/// One boundary-scan cell
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PinDescriptor {
    pub bit_index: usize,
    pub direction: Direction,
    /// `None` when the part file says "don't care"
    pub safe_value: Option<bool>,
    /// `*` for cells with no external pin
    pub pin_name: String,
    pub control_bit: Option<usize>,
    /// Value of `control_bit` that disables this pin
    pub disable_value: Option<bool>,
    pub disable_state: Option<String>,
}

impl PinDescriptor {
    /// The control cell and the value that enables this pin, when both are known
    pub fn enable(&self) -> Option<(usize, bool)> {
        match (self.control_bit, self.disable_value) {
            (Some(control), Some(disable)) => Some((control, !disable)),
            _ => None,
        }
    }

    pub fn is_gated(&self) -> bool {
        self.direction.drives() && self.disable_value.is_some()
    }

    pub fn has_pin(&self) -> bool {
        self.pin_name != "*"
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PinMapError {
    #[error("cell {bit} is outside the {width}-bit boundary register")]
    BitOutOfRange { bit: usize, width: usize },
    #[error("cell {bit} is gated by cell {control_bit}, outside the {width}-bit boundary register")]
    ControlBitOutOfRange {
        bit: usize,
        control_bit: usize,
        width: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PinMap {
    width: usize,
    pins: BTreeMap<usize, PinDescriptor>,
}

impl PinMap {
    /// Whether a raw record belongs in a pin map.  Pin cells are kept only when they have a name;
    /// control cells are kept only when they have none.  The asymmetry is inherited from the part
    /// file tooling and kept on purpose.
    pub fn keeps(record: &PinDescriptor) -> bool {
        match record.direction {
            Direction::Output | Direction::Input | Direction::Bidirectional => record.has_pin(),
            Direction::Control => !record.has_pin(),
        }
    }

    /// Build the map for a `width`-bit boundary register.  Records that `keeps` rejects are
    /// dropped; a later record for the same cell replaces an earlier one.
    pub fn from_records<I>(records: I, width: usize) -> Result<Self, PinMapError>
    where
        I: IntoIterator<Item = PinDescriptor>,
    {
        let mut pins = BTreeMap::new();
        for record in records {
            if !Self::keeps(&record) {
                debug!(
                    bit = record.bit_index,
                    direction = ?record.direction,
                    pin = %record.pin_name,
                    "cell dropped from pin map"
                );
                continue;
            }
            if record.bit_index >= width {
                return Err(PinMapError::BitOutOfRange {
                    bit: record.bit_index,
                    width,
                });
            }
            if let Some(control_bit) = record.control_bit {
                if control_bit >= width {
                    return Err(PinMapError::ControlBitOutOfRange {
                        bit: record.bit_index,
                        control_bit,
                        width,
                    });
                }
            }
            pins.insert(record.bit_index, record);
        }
        Ok(Self { width, pins })
    }

    /// Length of the boundary register the map describes
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn get(&self, bit: usize) -> Option<&PinDescriptor> {
        self.pins.get(&bit)
    }

    /// Name of the external pin on cell `bit`.  `None` for unmapped cells and for control cells.
    pub fn pin_name(&self, bit: usize) -> Option<&str> {
        self.pins
            .get(&bit)
            .filter(|p| p.has_pin())
            .map(|p| p.pin_name.as_str())
    }

    /// All cells in ascending bit order
    pub fn iter(&self) -> impl Iterator<Item = &PinDescriptor> {
        self.pins.values()
    }

    /// Output and bidirectional cells in ascending bit order
    pub fn drivers(&self) -> impl Iterator<Item = &PinDescriptor> {
        self.pins.values().filter(|p| p.direction.drives())
    }
}
