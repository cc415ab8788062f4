//! Outbound wire format: banner, result lines, diagnostics and the frame
//! packet header.
use core::fmt::{self, Write};

use heapless::String;

use crate::measure::{Capacitance, CapacitanceError, Resistance};
use crate::FRAME_SYNC;

/// Sent once after boot
pub const BANNER: &[u8] = b"READY\r\n";

/// Large enough for the longest line any of these functions produce
pub type ReportLine = String<64>;

/// Reported instead of a capacitance when the measurement failed
pub const CAPACITANCE_FAILED: f32 = -1.0;

pub fn frame_header(len: u8) -> [u8; 2] {
    [FRAME_SYNC, len]
}

/// `R_GND:<ohms>`
pub fn resistance(r: &Resistance) -> Result<ReportLine, fmt::Error> {
    let mut line = ReportLine::new();
    write!(line, "R_GND:{}\r\n", r.ohms)?;
    Ok(line)
}

/// `C_uF:<µF with 3 decimals>`, failures read as -1.000
pub fn capacitance(c: &Result<Capacitance, CapacitanceError>) -> Result<ReportLine, fmt::Error> {
    let uf = match c {
        Ok(c) => c.microfarads,
        Err(_) => CAPACITANCE_FAILED,
    };
    let mut line = ReportLine::new();
    write!(line, "C_uF:{:.3}\r\n", uf)?;
    Ok(line)
}

pub fn resistance_debug(r: &Resistance) -> Result<ReportLine, fmt::Error> {
    let mut line = ReportLine::new();
    write!(
        line,
        "DBG_R: mv={}, Rraw={}, Rcal={}\r\n",
        r.millivolts, r.raw_ohms as i32, r.ohms
    )?;
    Ok(line)
}

pub fn capacitance_debug(c: &Result<Capacitance, CapacitanceError>) -> Result<ReportLine, fmt::Error> {
    let mut line = ReportLine::new();
    match c {
        Ok(c) => write!(
            line,
            "DBG_C: dt={} us, C={:.3} uF\r\n",
            c.ramp.to_micros(),
            c.microfarads
        )?,
        Err(_) => line.push_str("DBG_C: timeout or bad dt\r\n").map_err(|_| fmt::Error)?,
    }
    Ok(line)
}
