use std::path::PathBuf;

use thiserror::Error;

use crate::database::DatabaseError;
use crate::driver::DriverError;
use crate::idcode::IdCode;
use crate::part::PartError;
use crate::pinmap::PinMapError;
use crate::vector::VectorError;

/// Everything that can stop a walking session
#[derive(Debug, Error)]
pub enum WalkError {
    #[error(transparent)]
    Part(#[from] PartError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("{alias}: {source}")]
    PinMap {
        alias: String,
        #[source]
        source: PinMapError,
    },
    #[error("{alias}: no part file for IDCODE {idcode} ({key} not listed in {})", table.display())]
    PartNotFound {
        alias: String,
        idcode: IdCode,
        table: PathBuf,
        key: String,
    },
    #[error("{alias}: {instruction} selects a {found}-bit register, the pin map has {expected} cells")]
    RegisterWidth {
        alias: String,
        instruction: String,
        expected: usize,
        found: usize,
    },
    #[error("cannot identify part {position}: {source}")]
    DeviceNotFound {
        position: usize,
        #[source]
        source: DriverError,
    },
    #[error("{context}: {source}")]
    Hardware {
        context: String,
        #[source]
        source: DriverError,
    },
    #[error("internal vector error: {0}")]
    Vector(#[from] VectorError),
}

impl WalkError {
    /// True for problems with the setup (files, database, chain positions) rather than a failure
    /// while walking
    pub fn is_configuration(&self) -> bool {
        !matches!(self, WalkError::Hardware { .. } | WalkError::Vector(_))
    }
}

/// Attach `context` to a driver failure
pub(crate) trait HardwareContext<T> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T, WalkError>;
}

impl<T> HardwareContext<T> for Result<T, DriverError> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T, WalkError> {
        self.map_err(|source| WalkError::Hardware {
            context: context(),
            source,
        })
    }
}
