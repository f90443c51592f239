//! Part-file lookup in a urJTAG data directory.
//!
//! The directory is a three level tree keyed by IDCODE fields:
//!
//! ```text
//! <base>/MANUFACTURERS                  manufacturer bits -> <mfr>
//! <base>/<mfr>/PARTS                    part bits         -> <part>
//! <base>/<mfr>/<part>/STEPPINGS         stepping bits     -> part file name
//! ```
//!
//! Each table line holds the key and the name separated by tabs; `#` starts a comment.
use core::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::idcode::IdCode;

pub const DEFAULT_DATABASE: &str = "/usr/local/share/urjtag";

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("cannot read lookup table {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PartLocation {
    pub manufacturer: String,
    pub part: String,
    pub stepping: String,
    /// The part description file
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Found(PartLocation),
    /// `key` has no line in `table`
    NotFound { table: PathBuf, key: String },
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Found(loc) => write!(f, "{}", loc.path.display()),
            Resolution::NotFound { table, key } => {
                write!(f, "{key} not listed in {}", table.display())
            }
        }
    }
}

/// The name `key` maps to in a lookup table's text
fn find_entry(text: &str, key: &str) -> Option<String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .find_map(|line| {
            let mut fields = line.split('\t').map(str::trim).filter(|f| !f.is_empty());
            match (fields.next(), fields.next()) {
                (Some(k), Some(name)) if k == key => Some(name.to_string()),
                _ => None,
            }
        })
}

#[derive(Clone, Debug)]
pub struct PartDatabase {
    base: PathBuf,
}

impl Default for PartDatabase {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE)
    }
}

impl PartDatabase {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn lookup(&self, table: &Path, key: &str) -> Result<Option<String>, DatabaseError> {
        let text = std::fs::read_to_string(table).map_err(|source| DatabaseError::Unreadable {
            path: table.display().to_string(),
            source,
        })?;
        let name = find_entry(&text, key);
        debug!(table = %table.display(), key, ?name, "lookup");
        Ok(name)
    }

    /// Find the part file describing the device with `id`
    pub fn resolve(&self, id: IdCode) -> Result<Resolution, DatabaseError> {
        let table = self.base.join("MANUFACTURERS");
        let key = id.manufacturer();
        let Some(manufacturer) = self.lookup(&table, &key)? else {
            return Ok(Resolution::NotFound { table, key });
        };

        let dir = self.base.join(&manufacturer);
        let table = dir.join("PARTS");
        let key = id.part();
        let Some(part) = self.lookup(&table, &key)? else {
            return Ok(Resolution::NotFound { table, key });
        };

        let dir = dir.join(&part);
        let table = dir.join("STEPPINGS");
        let key = id.stepping();
        let Some(stepping) = self.lookup(&table, &key)? else {
            return Ok(Resolution::NotFound { table, key });
        };

        Ok(Resolution::Found(PartLocation {
            path: dir.join(&stepping),
            manufacturer,
            part,
            stepping,
        }))
    }
}
