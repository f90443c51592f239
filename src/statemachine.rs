//! This provides a higher-level interface than the `Cable` trait.  Specifically, it keeps track of
//! the state of the JTAG state machine, and allows setting the state to any desired state.
//! `JtagSM` will get to that state by the most efficient path, based on the current state.
use std::collections::VecDeque;

use crate::cable::{Cable, CableError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    Data,
    Instruction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

impl JtagState {
    /// The state reached from `self` after one TCK with the given TMS level
    pub fn next(self, tms: bool) -> JtagState {
        use JtagState::*;
        let (low, high) = match self {
            Reset => (Idle, Reset),
            Idle => (Idle, SelectDR),
            SelectDR => (CaptureDR, SelectIR),
            CaptureDR => (ShiftDR, Exit1DR),
            ShiftDR => (ShiftDR, Exit1DR),
            Exit1DR => (PauseDR, UpdateDR),
            PauseDR => (PauseDR, Exit2DR),
            Exit2DR => (ShiftDR, UpdateDR),
            UpdateDR => (Idle, SelectDR),
            SelectIR => (CaptureIR, Reset),
            CaptureIR => (ShiftIR, Exit1IR),
            ShiftIR => (ShiftIR, Exit1IR),
            Exit1IR => (PauseIR, UpdateIR),
            PauseIR => (PauseIR, Exit2IR),
            Exit2IR => (ShiftIR, UpdateIR),
            UpdateIR => (Idle, SelectDR),
        };
        if tms {
            high
        } else {
            low
        }
    }

    fn shift_state(reg: Register) -> JtagState {
        match reg {
            Register::Data => JtagState::ShiftDR,
            Register::Instruction => JtagState::ShiftIR,
        }
    }

    fn pause_state(reg: Register) -> JtagState {
        match reg {
            Register::Data => JtagState::PauseDR,
            Register::Instruction => JtagState::PauseIR,
        }
    }
}

/// Shortest TMS sequence from `from` to `to`.  Empty when they are the same state.
pub fn get_path(from: JtagState, to: JtagState) -> Vec<usize> {
    // breadth first over the 16 states, remembering how each was first reached
    let mut prev: [Option<(JtagState, usize)>; 16] = [None; 16];
    let mut seen = [false; 16];
    let mut queue = VecDeque::from([from]);
    seen[from as usize] = true;

    while let Some(state) = queue.pop_front() {
        if state == to {
            break;
        }
        for tms in [0, 1] {
            let next = state.next(tms != 0);
            if !seen[next as usize] {
                seen[next as usize] = true;
                prev[next as usize] = Some((state, tms));
                queue.push_back(next);
            }
        }
    }

    let mut path = Vec::new();
    let mut at = to;
    while let Some((state, tms)) = prev[at as usize] {
        path.push(tms);
        at = state;
    }
    path.reverse();
    path
}

pub struct JtagSM<T> {
    pub cable: T,
    state: JtagState,
}

impl<T, U> JtagSM<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create a JTAG state machine using an existing `Cable`.  The chain is reset on the way.
    pub fn new(cable: T) -> Result<Self, CableError> {
        let mut sm = Self {
            cable,
            state: JtagState::Reset,
        };
        sm.mode_reset()?;
        Ok(sm)
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    /// Reset the scan chain by driving TMS high for 5 clocks
    pub fn mode_reset(&mut self) -> Result<(), CableError> {
        self.cable.change_mode(&[1, 1, 1, 1, 1], true)?;
        self.state = JtagState::Reset;
        Ok(())
    }

    /// Use TMS to get into `state` by the most efficient path
    pub fn change_mode(&mut self, state: JtagState) -> Result<(), CableError> {
        if self.state == state {
            return Ok(());
        }

        let path = get_path(self.state, state);
        tracing::trace!(from = ?self.state, to = ?state, ?path, "tap state change");
        self.cable.change_mode(&path, true)?;
        self.state = state;
        Ok(())
    }

    /// Read `bits` from either the instruction or data register
    pub fn read_reg(&mut self, reg: Register, bits: usize) -> Result<Vec<u8>, CableError> {
        self.change_mode(JtagState::shift_state(reg))?;
        self.cable.read_data(bits)
    }

    /// Write `data` into either the instruction or data register.  `bits` indicates how many bits
    /// of the last byte should be written (8 indicates that the entire byte should be written).
    /// The mode will either be ShiftIR / ShiftDR if `pause_after` is false, or PauseIR / PauseDR
    /// if `pause_after` is true.  This allows for setting the register with multiple calls to
    /// `write_reg`, which may be more convenient than manual bit-shifting.
    pub fn write_reg(&mut self, reg: Register, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError> {
        self.read_write_reg(reg, data, bits, pause_after).map(|_| ())
    }

    /// Like `write_reg`, but returns the bits that were shifted out during writing.
    pub fn read_write_reg(&mut self, reg: Register, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        self.change_mode(JtagState::shift_state(reg))?;
        let data = self.cable.read_write_data(data, bits, pause_after)?;
        if pause_after {
            self.state = JtagState::pause_state(reg);
        }
        Ok(data)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const STATES: [JtagState; 16] = [
        JtagState::Reset,
        JtagState::Idle,
        JtagState::SelectDR,
        JtagState::CaptureDR,
        JtagState::ShiftDR,
        JtagState::Exit1DR,
        JtagState::PauseDR,
        JtagState::Exit2DR,
        JtagState::UpdateDR,
        JtagState::SelectIR,
        JtagState::CaptureIR,
        JtagState::ShiftIR,
        JtagState::Exit1IR,
        JtagState::PauseIR,
        JtagState::Exit2IR,
        JtagState::UpdateIR,
    ];

    /// Records every TMS sequence and echoes shifted data back
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub modes: Vec<Vec<usize>>,
        pub shifts: Vec<(Vec<u8>, u8, bool)>,
    }

    impl Cable for Recorder {
        fn change_mode(&mut self, tms: &[usize], _tdi: bool) -> Result<(), CableError> {
            self.modes.push(tms.to_vec());
            Ok(())
        }

        fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
            self.shifts.push((data.to_vec(), bits, pause_after));
            Ok(data.to_vec())
        }
    }

    #[test]
    fn every_state_reachable_from_every_state() {
        for from in STATES {
            for to in STATES {
                let path = get_path(from, to);
                let end = path.iter().fold(from, |s, tms| s.next(*tms != 0));
                assert_eq!(end, to, "{from:?} -> {to:?} via {path:?}");
                assert!(path.len() <= 7);
            }
        }
    }

    #[test]
    fn known_shortest_paths() {
        assert_eq!(get_path(JtagState::Reset, JtagState::ShiftDR), vec![0, 1, 0, 0]);
        assert_eq!(get_path(JtagState::Reset, JtagState::ShiftIR), vec![0, 1, 1, 0, 0]);
        assert_eq!(get_path(JtagState::PauseDR, JtagState::Idle), vec![1, 1, 0]);
        assert!(get_path(JtagState::Idle, JtagState::Idle).is_empty());
        // five ones from anywhere
        assert_eq!(get_path(JtagState::ShiftDR, JtagState::Reset), vec![1, 1, 1, 1, 1]);
    }

    #[test]
    fn new_resets_and_tracks_pause() {
        let mut cable = Recorder::default();
        let mut sm = JtagSM::new(&mut cable).unwrap();
        assert_eq!(sm.state(), JtagState::Reset);

        sm.read_write_reg(Register::Data, &[0x5a], 8, true).unwrap();
        assert_eq!(sm.state(), JtagState::PauseDR);
        sm.change_mode(JtagState::Idle).unwrap();
        sm.change_mode(JtagState::Idle).unwrap();
        drop(sm);

        assert_eq!(
            cable.modes,
            vec![vec![1, 1, 1, 1, 1], vec![0, 1, 0, 0], vec![1, 1, 0]]
        );
        assert_eq!(cable.shifts, vec![(vec![0x5a], 8, true)]);
    }

    #[test]
    fn read_without_pause_stays_in_shift() {
        let mut cable = Recorder::default();
        let mut sm = JtagSM::new(&mut cable).unwrap();
        let out = sm.read_reg(Register::Instruction, 4).unwrap();
        assert_eq!(out, vec![0xff]);
        assert_eq!(sm.state(), JtagState::ShiftIR);
    }
}
