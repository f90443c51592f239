//! Change detection between two snapshots of the same boundary register.
use core::fmt;

use serde::Serialize;

use crate::pinmap::PinMap;
use crate::vector::{LogicalVector, VectorError};
use crate::walk::Level;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Transition {
    Rising,
    Falling,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Rising => f.write_str("0 -> 1"),
            Transition::Falling => f.write_str("1 -> 0"),
        }
    }
}

/// A single bit that differs between two snapshots
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub bit_index: usize,
    pub old_value: bool,
    pub new_value: bool,
    /// `None` when the cell is not in the pin map
    pub pin_name: Option<String>,
}

impl ChangeRecord {
    pub fn transition(&self) -> Transition {
        if self.old_value {
            Transition::Falling
        } else {
            Transition::Rising
        }
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bit {}: {}", self.bit_index, self.transition())?;
        if let Some(name) = &self.pin_name {
            write!(f, " ({name})")?;
        }
        Ok(())
    }
}

/// A transition credited to a named pin during a walk
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attribution {
    pub pin_name: String,
    pub transition: Transition,
}

/// Every bit where `old` and `new` differ, ascending
pub fn diff(
    old: &LogicalVector,
    new: &LogicalVector,
    pin_map: &PinMap,
) -> Result<Vec<ChangeRecord>, VectorError> {
    if old.len() != new.len() {
        return Err(VectorError::LengthMismatch {
            left: old.len(),
            right: new.len(),
        });
    }
    Ok(old
        .as_slice()
        .iter()
        .zip(new.as_slice())
        .enumerate()
        .filter(|(_, (o, n))| o != n)
        .map(|(bit_index, (&old_value, &new_value))| ChangeRecord {
            bit_index,
            old_value,
            new_value,
            pin_name: pin_map.pin_name(bit_index).map(str::to_string),
        })
        .collect())
}

/// Keep the named changes that move away from the walk's rest value.  During walking zeros only
/// cells leaving 1 count, during walking ones only cells leaving 0.
pub fn attribute(records: &[ChangeRecord], level: Level) -> Vec<Attribution> {
    records
        .iter()
        .filter(|r| r.old_value == level.rest())
        .filter_map(|r| {
            r.pin_name.as_ref().map(|name| Attribution {
                pin_name: name.clone(),
                transition: r.transition(),
            })
        })
        .collect()
}
