//! This crate finds which pins of one JTAG part are wired to which pins of another.  It drives
//! the outputs of one part through its boundary-scan register (EXTEST), one pin at a time, first
//! with walking zeros and then with walking ones, and watches which inputs of a second part
//! follow (SAMPLE/PRELOAD).  A pin that is seen to follow in both walks is connected.
//!
//! The crate is layered.  At the bottom, the `Cable` trait shifts bits through a hardware
//! adapter: FTDI MPSSE cables like the Digilent HS1 and "jtagkey" designs, the Altera
//! USB-Blaster, or plain GPIO pins.  `JtagSM` keeps track of the TAP state and gets to any state
//! with the fewest TMS clocks.  `Taps` models a chain of several TAPs, each with its own
//! instruction and data, the rest sitting in BYPASS.
//!
//! `ScanChain` puts that behind the `JtagDriver` trait, which is all a walking session needs:
//! select a part, set an instruction by name, push and read data registers.  Part descriptions
//! come from urJTAG-style part files found through the IDCODE (`database`, `part`).
//!
//! The walking engine itself is hardware independent: `walk` builds the vectors, `diff` finds the
//! bits that moved, `classify` turns a session into one verdict per driven pin, and `session`
//! runs it all against any `JtagDriver`.
//!
//! # Example
//! ```no_run
//! use jtag_walk::cable::mpsse::DigilentHs1;
//! use jtag_walk::database::PartDatabase;
//! use jtag_walk::driver::ScanChain;
//! use jtag_walk::session::{NoPause, SessionContext, SessionOutcome};
//! use jtag_walk::statemachine::JtagSM;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cable = DigilentHs1::new(1 << 20)?;
//! let jtag = JtagSM::new(Box::new(cable))?;
//! let chain = ScanChain::connect(jtag)?;
//!
//! let database = PartDatabase::default();
//! let mut session = SessionContext::setup(chain, &database, (0, "fpga"), (1, "cpld"))?;
//! if let SessionOutcome::Completed(report) = session.run(&mut NoPause)? {
//!     print!("{report}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod cable;
pub mod classify;
pub mod config;
pub mod database;
pub mod diff;
pub mod driver;
pub mod error;
pub mod idcode;
pub mod part;
pub mod pinmap;
pub mod session;
pub mod statemachine;
pub mod taps;
pub mod vector;
pub mod walk;

pub use error::WalkError;
