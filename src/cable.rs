//! Implementations for different JTAG hardware adapters live here.  Hardware adapters should
//! implement the `Cable` trait.
use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod gpio;
#[cfg(feature = "ftdi")]
pub mod mpsse;
#[cfg(feature = "ftdi")]
pub mod usbblaster;

#[derive(Debug, Error)]
pub enum CableError {
    #[error("adapter error: {0}")]
    Adapter(String),
    #[error("no data to shift")]
    Empty,
    #[error("{0} bits requested from the last byte, expected 1 to 8")]
    BadBitCount(u8),
}

impl CableError {
    pub(crate) fn adapter(err: impl fmt::Debug) -> Self {
        CableError::Adapter(format!("{err:?}"))
    }
}

pub trait Cable {
    /// Clock out a series of TMS values to change the state of the JTAG chain.  Each element of
    /// `tms` determines the value of the TMS line, zero for low and any other value for high.
    /// `tdi` controls the state of the TDI line during mode changes.
    fn change_mode(&mut self, tms: &[usize], tdi: bool) -> Result<(), CableError>;

    /// Shift `data` out on TDI, LSB of the first byte first, while capturing TDO.  `bits` is the
    /// number of bits to send from the last byte.  Should be called with state = ShiftIR or
    /// ShiftDR.  State won't change unless `pause_after` is true, in which case it will be
    /// PauseIR or PauseDR on exit.
    fn read_write_data(
        &mut self,
        data: &[u8],
        bits: u8,
        pause_after: bool,
    ) -> Result<Vec<u8>, CableError>;

    /// Shift in `bits` bits from TDO while clocking out all ones.
    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        if bits == 0 {
            return Ok(Vec::new());
        }
        let ones = vec![0xff; (bits + 7) / 8];
        let last = match bits % 8 {
            0 => 8,
            n => n as u8,
        };
        self.read_write_data(&ones, last, false)
    }

    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError> {
        self.read_write_data(data, bits, pause_after).map(|_| ())
    }
}

/// Check the `data`/`bits` pair every adapter receives and return the total bit count
pub(crate) fn shift_length(data: &[u8], bits: u8) -> Result<usize, CableError> {
    if data.is_empty() {
        return Err(CableError::Empty);
    }
    if bits == 0 || bits > 8 {
        return Err(CableError::BadBitCount(bits));
    }
    Ok((data.len() - 1) * 8 + bits as usize)
}

/// Adapters the command line knows how to open
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CableKind {
    /// Digilent JTAG-HS class adapter (FT232H, 0403:6014)
    DigilentHs1,
    /// Altera USB-Blaster (09fb:6001)
    UsbBlaster,
    /// FT245 based USB-Blaster clones (16c0:06ad)
    UsbBlasterClone,
    /// FT2232-based "jtagkey" designs such as the Bus Blaster
    Jtagkey,
}

impl fmt::Display for CableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CableKind::DigilentHs1 => f.write_str("digilent-hs1"),
            CableKind::UsbBlaster => f.write_str("usb-blaster"),
            CableKind::UsbBlasterClone => f.write_str("usb-blaster-clone"),
            CableKind::Jtagkey => f.write_str("jtagkey"),
        }
    }
}

/// Open the adapter named by `kind`.  `clock` is the TCK frequency in hertz for adapters that
/// can set it.
#[cfg(feature = "ftdi")]
pub fn open(kind: CableKind, clock: u32) -> Result<Box<dyn Cable>, CableError> {
    tracing::info!(cable = %kind, clock, "opening cable");
    let cable: Box<dyn Cable> = match kind {
        CableKind::DigilentHs1 => Box::new(mpsse::DigilentHs1::new(clock)?),
        CableKind::UsbBlaster => Box::new(usbblaster::UsbBlaster::altera()?),
        CableKind::UsbBlasterClone => Box::new(usbblaster::UsbBlaster::clone_adapter()?),
        CableKind::Jtagkey => Box::new(mpsse::JtagKey::new(clock, true)?),
    };
    Ok(cable)
}
