//! Implement the `Cable` trait for FTDI MPSSE adapters: Digilent JTAG-HS style FT232H cables
//! and "jtagkey" compatible FT2232H designs like the Bus Blaster
use crate::cable::{shift_length, Cable, CableError};
use crate::vector::{bits_to_bytes, bytes_to_bits};

use std::time::Duration;

use libftd2xx::{Ft232h, Ft2232h, Ftdi, FtdiCommon, FtdiMpsse, MpsseCmdBuilder, MpsseCmdExecutor};
use ftdi_mpsse::{ClockTMS, ClockTMSOut};
use libftd2xx::{ClockBits, ClockData};

pub struct Mpsse<T> {
    ft: T,
}

impl<T: FtdiMpsse + MpsseCmdExecutor> Mpsse<T>
    where <T as MpsseCmdExecutor>::Error: std::fmt::Debug
{
    pub fn new(mut ft: T, clock: u32) -> Result<Self, CableError>
    {
        ft.initialize_mpsse_default().map_err(CableError::adapter)?;
        ft.set_clock(clock).map_err(CableError::adapter)?;

        let builder = MpsseCmdBuilder::new()
            .disable_3phase_data_clocking()
            .disable_adaptive_data_clocking();
        ft.send(builder.as_slice()).map_err(CableError::adapter)?;

        Ok(Self {
            ft,
        })
    }
}

impl<T: FtdiMpsse + MpsseCmdExecutor> Cable for Mpsse<T>
    where <T as MpsseCmdExecutor>::Error: std::fmt::Debug
{
    fn change_mode(&mut self, tms: &[usize], tdi: bool) -> Result<(), CableError> {
        let mut count = 0;
        let mut buf = 0;
        let mut builder = MpsseCmdBuilder::new();

        // clock_tms_out takes at most 7 TMS bits per command
        for x in tms {
            if *x != 0 {
                buf |= 1 << count;
            }
            count += 1;

            if count == 7 {
                builder = builder.clock_tms_out(ClockTMSOut::NegEdge, buf, tdi, count);
                count = 0;
                buf = 0;
            }
        }
        if count > 0 {
            builder = builder.clock_tms_out(ClockTMSOut::NegEdge, buf, tdi, count);
        }
        self.ft.send(builder.as_slice()).map_err(CableError::adapter)
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        let total = shift_length(data, bits)?;

        // Everything but the final bit goes out as data; the final bit rides on a TMS clock so
        // the TAP can leave the shift state on it.
        let full = (total - 1) / 8;
        let rem = ((total - 1) % 8) as u8;
        let partial = data[full];
        let last_bit = (partial >> rem) & 1 != 0;

        let mut builder = MpsseCmdBuilder::new();
        if full > 0 {
            builder = builder.clock_data(ClockData::LsbPosIn, &data[..full]);
        }
        if rem > 0 {
            builder = builder.clock_bits(ClockBits::LsbPosIn, partial, rem);
        }
        let tms = if pause_after { 1 } else { 0 };
        builder = builder.clock_tms(ClockTMS::NegTMSPosTDO, tms, last_bit, 1);
        if pause_after {
            // Exit1 -> Pause
            builder = builder.clock_tms_out(ClockTMSOut::NegEdge, 0, last_bit, 1);
        }
        builder = builder.send_immediate();

        let mut recv = vec![0u8; full + usize::from(rem > 0) + 1];
        self.ft.xfer(builder.as_slice(), &mut recv).map_err(CableError::adapter)?;

        let mut received = bytes_to_bits(&recv[..full], full * 8);
        if rem > 0 {
            // clock_bits shifts in from the top of the byte
            let top = recv[full] >> (8 - rem);
            received.extend(bytes_to_bits(&[top], rem as usize));
        }
        received.push(recv[recv.len() - 1] & 0x80 != 0);
        Ok(bits_to_bytes(&received))
    }
}

// Lower pins
const PIN_TCK: u8 = 1;
const PIN_TDI: u8 = 1 << 1;
//const PIN_TDO: u8 = 1 << 2;
const PIN_TMS: u8 = 1 << 3;
const PIN_N_OE: u8 = 1 << 4;
const LOWER_OUTPUT_PINS: u8 = PIN_TCK | PIN_TDI | PIN_TMS | PIN_N_OE;

// Upper pins
const PIN_N_TRST: u8 = 1;
const PIN_N_SRST: u8 = 1 << 1;
const PIN_N_TRST_OE: u8 = 1 << 2;
const PIN_N_SRST_OE: u8 = 1 << 3;
const UPPER_OUTPUT_PINS: u8 = PIN_N_TRST | PIN_N_SRST | PIN_N_TRST_OE | PIN_N_SRST_OE;

const DIGILENT_VID: u16 = 0x0403;
const DIGILENT_PID: u16 = 0x6014;

/// Digilent JTAG-HS class cable built on a single-channel FT232H
pub struct DigilentHs1 {
    ft: Mpsse<Ft232h>,
}

impl DigilentHs1 {
    /// Open the first FT232H with the Digilent vendor/product IDs.  `clock` controls the speed
    /// of TCK in hertz.
    pub fn new(clock: u32) -> Result<Self, CableError> {
        libftd2xx::set_vid_pid(DIGILENT_VID, DIGILENT_PID).map_err(CableError::adapter)?;
        let ft = Ftdi::new().map_err(CableError::adapter)?;
        let ft = Ft232h::try_from(ft).map_err(CableError::adapter)?;
        let mut ft = Mpsse::new(ft, clock)?;
        ft.ft.set_latency_timer(Duration::from_millis(1)).map_err(CableError::adapter)?;

        let builder = MpsseCmdBuilder::new()
            .set_gpio_lower(PIN_TMS, PIN_TCK | PIN_TDI | PIN_TMS);
        ft.ft.send(builder.as_slice()).map_err(CableError::adapter)?;

        Ok(DigilentHs1 {
            ft,
        })
    }
}

impl Cable for DigilentHs1 {
    fn change_mode(&mut self, tms: &[usize], tdi: bool) -> Result<(), CableError> {
        self.ft.change_mode(tms, tdi)
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        self.ft.read_write_data(data, bits, pause_after)
    }
}

pub struct JtagKey {
    ft: Mpsse<Ft2232h>,
}

impl JtagKey {
    /// Create a new JtagKey.  FT2232-based adapters like JtagKey have both an "A" interface and a
    /// "B" interface.  `primary` controls which to use. `clock` controls the speed of TCLK in hertz.
    pub fn new(clock: u32, primary: bool) -> Result<Self, CableError> {
        let description = if primary {
            "Dual RS232-HS A"
        } else {
            "Dual RS232-HS B"
        };
        let ft = Ftdi::with_description(description).map_err(CableError::adapter)?;
        let ft = Ft2232h::try_from(ft).map_err(CableError::adapter)?;
        let mut ft = Mpsse::new(ft, clock)?;
        ft.ft.set_latency_timer(Duration::from_millis(0)).map_err(CableError::adapter)?;
        ft.ft.set_gpio_upper(PIN_N_TRST | PIN_N_SRST, UPPER_OUTPUT_PINS).map_err(CableError::adapter)?;

        let builder = MpsseCmdBuilder::new()
            .set_gpio_lower(PIN_TMS, LOWER_OUTPUT_PINS);
        ft.ft.send(builder.as_slice()).map_err(CableError::adapter)?;

        Ok(JtagKey {
            ft,
        })
    }
}

impl Cable for JtagKey {
    fn change_mode(&mut self, tms: &[usize], tdi: bool) -> Result<(), CableError> {
        self.ft.change_mode(tms, tdi)
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        self.ft.read_write_data(data, bits, pause_after)
    }
}
