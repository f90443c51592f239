//! Implement the `Cable` trait for Altera USB Blaster and clones
use crate::cable::{shift_length, Cable, CableError};
use crate::vector::{bits_to_bytes, bytes_to_bits};

use libftd2xx::{Ftdi, FtdiCommon};

// Bit-bang mode output byte
const TCK: u8 = 1;
const TMS: u8 = 1 << 1;
const TDI: u8 = 1 << 4;
const READ_CMD: u8 = 1 << 6;
// nCE, nCS and the LED stay high
const OTHERS: u8 = (1 << 2) | (1 << 3) | (1 << 5);

// Every read command returns one byte with TDO in bit 0
const TDO: u8 = 1;

pub struct UsbBlaster {
    ft: Ftdi,
}

impl UsbBlaster {
    /// Open a genuine Altera USB-Blaster
    pub fn altera() -> Result<Self, CableError> {
        Self::open(0x09fb, 0x6001, "USB-Blaster")
    }

    /// Open one of the common FT245 based clones
    pub fn clone_adapter() -> Result<Self, CableError> {
        Self::open(0x16c0, 0x06ad, "USB-JTAG-IF")
    }

    fn open(vid: u16, pid: u16, description: &str) -> Result<Self, CableError> {
        libftd2xx::set_vid_pid(vid, pid).map_err(CableError::adapter)?;
        let mut ft = Ftdi::with_description(description).map_err(CableError::adapter)?;
        ft.purge_all().map_err(CableError::adapter)?;
        tracing::debug!(vid, pid, description, "usb-blaster opened");

        Ok(Self {
            ft,
        })
    }
}

fn clock(buf: &mut Vec<u8>, tms: bool, tdi: bool, read: bool) {
    let mut byte = OTHERS;
    if tms {
        byte |= TMS;
    }
    if tdi {
        byte |= TDI;
    }
    buf.push(byte);
    byte |= TCK;
    if read {
        byte |= READ_CMD;
    }
    buf.push(byte);
}

/// Build the bit-bang byte stream for a shift of `out`.  Every data bit asks for a TDO sample.
fn encode_shift(out: &[bool], pause_after: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(out.len() * 2 + 3);
    for (i, tdi) in out.iter().enumerate() {
        let last = i + 1 == out.len();
        clock(&mut buf, last && pause_after, *tdi, true);
    }
    if pause_after {
        // Exit1 -> Pause
        let tdi = out.last().copied().unwrap_or(true);
        clock(&mut buf, false, tdi, false);
    }
    // leave TCK low
    buf.push(OTHERS);
    buf
}

fn decode_shift(recv: &[u8]) -> Vec<u8> {
    let bits: Vec<bool> = recv.iter().map(|x| x & TDO != 0).collect();
    bits_to_bytes(&bits)
}

impl Cable for UsbBlaster {
    fn change_mode(&mut self, tms: &[usize], tdi: bool) -> Result<(), CableError> {
        let mut buf = vec![];
        for x in tms {
            clock(&mut buf, *x != 0, tdi, false);
        }
        buf.push(OTHERS | if tdi { TDI } else { 0 });
        self.ft.write_all(&buf).map_err(CableError::adapter)
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        let total = shift_length(data, bits)?;
        let out = bytes_to_bits(data, total);
        let buf = encode_shift(&out, pause_after);

        let mut recv = vec![0; total];
        self.ft.write_all(&buf).map_err(CableError::adapter)?;
        self.ft.read_all(&mut recv).map_err(CableError::adapter)?;
        Ok(decode_shift(&recv))
    }
}
