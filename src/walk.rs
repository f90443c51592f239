//! Walking-zeros / walking-ones pattern generation.
//!
//! A walk first parks every driving cell at the opposite of the walk level (the baseline), then
//! moves one cell at a time to the walk level.  Gated cells have their control cell forced to the
//! enable value in every vector, so the pin is actually driven.
use core::fmt;

use serde::Serialize;

use crate::pinmap::{PinDescriptor, PinMap};
use crate::vector::{LogicalVector, TransportVector, VectorError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Level {
    /// Walking zeros: pins rest at 1 and are pulled to 0 one at a time
    Zero,
    /// Walking ones: pins rest at 0 and are raised to 1 one at a time
    One,
}

impl Level {
    pub fn bit(self) -> bool {
        matches!(self, Level::One)
    }

    /// Value every other driver holds while one pin walks
    pub fn rest(self) -> bool {
        !self.bit()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Zero => f.write_str("walking zeros"),
            Level::One => f.write_str("walking ones"),
        }
    }
}

/// One element of a walk: the cell being moved and the full register to apply
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalkStep {
    pub bit_index: usize,
    pub pin_name: String,
    pub vector: LogicalVector,
}

fn drive(vector: &mut LogicalVector, pin: &PinDescriptor, value: bool) -> Result<(), VectorError> {
    vector.set(pin.bit_index, value)?;
    if let Some((control, enable)) = pin.enable() {
        vector.set(control, enable)?;
    }
    Ok(())
}

/// Build the register that parks every driver at `level.rest()`, starting from the device's
/// live register contents.
pub fn baseline_vector(
    pin_map: &PinMap,
    live: &TransportVector,
    level: Level,
) -> Result<TransportVector, VectorError> {
    if live.len() != pin_map.width() {
        return Err(VectorError::LengthMismatch {
            left: live.len(),
            right: pin_map.width(),
        });
    }
    let mut vector = live.clone().into_logical();
    for pin in pin_map.drivers() {
        drive(&mut vector, pin, level.rest())?;
    }
    Ok(vector.into_transport())
}

/// One step per driving cell, ascending by bit index.  Each step is `baseline` with only that
/// cell (and its control cell) changed.
pub fn walk_steps(
    pin_map: &PinMap,
    baseline: &LogicalVector,
    level: Level,
) -> Result<Vec<WalkStep>, VectorError> {
    pin_map
        .drivers()
        .map(|pin| {
            let mut vector = baseline.clone();
            drive(&mut vector, pin, level.bit())?;
            Ok(WalkStep {
                bit_index: pin.bit_index,
                pin_name: pin.pin_name.clone(),
                vector,
            })
        })
        .collect()
}

/// The vectors of `walk_steps`, ready for the driver
pub fn per_pin_vectors(
    pin_map: &PinMap,
    baseline: &LogicalVector,
    level: Level,
) -> Result<Vec<TransportVector>, VectorError> {
    Ok(walk_steps(pin_map, baseline, level)?
        .into_iter()
        .map(|step| step.vector.into_transport())
        .collect())
}
