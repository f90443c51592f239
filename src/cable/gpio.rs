//! Bit-banged JTAG over four GPIO lines, for boards where the tester drives the chain directly.
use embedded_hal::{delay::DelayNs, digital::{InputPin, OutputPin, PinState}};

use crate::cable::{shift_length, Cable, CableError};
use crate::vector::{bits_to_bytes, bytes_to_bits};

pub struct Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    half_period: u32,
    delay: Delay,
    clock: Clk,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms
}

impl<Clk, Tdi, Tdo, Tms, Delay> Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    pub fn new(freq_khz: u32, clock: Clk, tdi: Tdi, tdo: Tdo, tms: Tms, delay: Delay) -> Gpio<Clk, Tdi, Tdo, Tms, Delay> {
        let period_ns = 1_000_000 / freq_khz.max(1);
        let half_period = period_ns / 2;
        Gpio { half_period, clock, tdi, tdo, tms, delay }
    }

    /// One TCK period with the given TMS and TDI levels.  TDO is sampled on the rising edge.
    fn clock_bit(&mut self, tms: bool, tdi: bool) -> Result<bool, CableError> {
        self.tms.set_state(PinState::from(tms)).map_err(CableError::adapter)?;
        self.tdi.set_state(PinState::from(tdi)).map_err(CableError::adapter)?;

        self.clock.set_high().map_err(CableError::adapter)?;
        let tdo = self.tdo.is_high().map_err(CableError::adapter)?;

        self.delay.delay_ns(self.half_period);
        self.clock.set_low().map_err(CableError::adapter)?;
        self.delay.delay_ns(self.half_period);
        Ok(tdo)
    }
}

impl<Clk, Tdi, Tdo, Tms, Delay> Cable for Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    fn change_mode(&mut self, tms: &[usize], tdi: bool) -> Result<(), CableError> {
        // clock starts low
        for d in tms {
            self.clock_bit(*d != 0, tdi)?;
        }
        Ok(())
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        let total = shift_length(data, bits)?;
        let out = bytes_to_bits(data, total);

        let mut received = Vec::with_capacity(total);
        for (i, tdi) in out.iter().enumerate() {
            // The last bit leaves the shift state when we're supposed to pause after
            let last = i + 1 == total;
            received.push(self.clock_bit(last && pause_after, *tdi)?);
        }

        if pause_after {
            // Exit1 -> Pause
            let last_tdi = out.last().copied().unwrap_or(true);
            self.clock_bit(false, last_tdi)?;
        }
        self.tms.set_low().map_err(CableError::adapter)?;

        Ok(bits_to_bytes(&received))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::{Cell, RefCell};
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Wire(Rc<Cell<bool>>);

    impl ErrorType for Wire {
        type Error = Infallible;
    }

    impl OutputPin for Wire {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.set(true);
            Ok(())
        }
    }

    impl InputPin for Wire {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0.get())
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0.get())
        }
    }

    /// A clock line that records the TMS level at every rising edge
    struct Tck {
        tms: Wire,
        edges: Rc<RefCell<Vec<bool>>>,
    }

    impl ErrorType for Tck {
        type Error = Infallible;
    }

    impl OutputPin for Tck {
        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.edges.borrow_mut().push(self.tms.0.get());
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn loopback() -> (Gpio<Tck, Wire, Wire, Wire, NoDelay>, Rc<RefCell<Vec<bool>>>) {
        // TDO is wired straight back to TDI
        let tdi = Wire::default();
        let tms = Wire::default();
        let edges = Rc::new(RefCell::new(Vec::new()));
        let tck = Tck { tms: tms.clone(), edges: edges.clone() };
        (Gpio::new(1000, tck, tdi.clone(), tdi, tms, NoDelay), edges)
    }

    #[test]
    fn loopback_returns_what_was_sent() {
        let (mut gpio, _) = loopback();
        let out = gpio.read_write_data(&[0xa5, 0x3c, 0x05], 3, false).unwrap();
        assert_eq!(out, vec![0xa5, 0x3c, 0x05]);
    }

    #[test]
    fn pause_after_raises_tms_on_last_bit_only() {
        let (mut gpio, edges) = loopback();
        gpio.read_write_data(&[0x0f], 4, true).unwrap();
        // four data bits, the last with TMS high, then one TMS-low clock into Pause
        assert_eq!(*edges.borrow(), vec![false, false, false, true, false]);
    }

    #[test]
    fn change_mode_follows_tms_sequence() {
        let (mut gpio, edges) = loopback();
        gpio.change_mode(&[1, 1, 0, 1], true).unwrap();
        assert_eq!(*edges.borrow(), vec![true, true, false, true]);
    }
}
