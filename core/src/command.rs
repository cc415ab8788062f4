//! Serial command line protocol.
//!
//! Lines are `token(,token)*` terminated by `\r` or `\n`. Tokens are
//! matched by prefix and applied left to right; anything unrecognised is
//! skipped so that a newer host can talk to an older instrument.
use core::fmt;

use heapless::Vec;

use crate::drivers::Probe;
use crate::frequency::clamp_frequency;
use crate::wavetable::WaveMode;
use crate::CMD_BUF_LEN;

/// Longest line that is kept, longer lines are truncated
pub const LINE_CAPACITY: usize = CMD_BUF_LEN - 1;

pub type Line = Vec<u8, LINE_CAPACITY>;

/// Accumulates received bytes into lines
#[derive(Default)]
pub struct LineBuffer {
    buf: Line,
    dropped: usize,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            dropped: 0,
        }
    }

    /// Add one received byte, returning the completed line when `byte` is
    /// a terminator. Empty lines are swallowed.
    pub fn feed(&mut self, byte: u8) -> Option<Line> {
        match byte {
            b'\r' | b'\n' => {
                if self.dropped > 0 {
                    debug!("Line overflow, dropped {} bytes", self.dropped);
                    self.dropped = 0;
                }
                if self.buf.is_empty() {
                    None
                } else {
                    Some(core::mem::take(&mut self.buf))
                }
            }
            _ => {
                if self.buf.push(byte).is_err() {
                    self.dropped += 1;
                }
                None
            }
        }
    }

    pub fn pending(&self) -> &[u8] {
        &self.buf
    }
}

/// One recognised token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Already clamped to the supported range
    Frequency(u32),
    /// Percent, already clamped to 0..=100
    Amplitude(u8),
    Wave(WaveMode),
    Enable(bool),
    Measure(Probe),
}

impl Command {
    pub fn parse(token: &[u8]) -> Option<Self> {
        if let Some(arg) = token.strip_prefix(b"FREQ:") {
            // Negative values wrap around and end up clamped to the maximum
            Some(Command::Frequency(clamp_frequency(atoi(arg) as u32)))
        } else if let Some(arg) = token.strip_prefix(b"AMP:") {
            Some(Command::Amplitude(atoi(arg).clamp(0, 100) as u8))
        } else if let Some(arg) = token.strip_prefix(b"WAVE:") {
            WaveMode::from_name(arg).map(Command::Wave)
        } else if let Some(arg) = token.strip_prefix(b"EN:") {
            Some(Command::Enable(atoi(arg) != 0))
        } else if let Some(arg) = token.strip_prefix(b"MEAS:") {
            match arg {
                b"R" => Some(Command::Measure(Probe::Resistance)),
                b"C" => Some(Command::Measure(Probe::Capacitance)),
                _ => None,
            }
        } else {
            None
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Frequency(hz) => write!(f, "FREQ:{}", hz),
            Command::Amplitude(percent) => write!(f, "AMP:{}", percent),
            Command::Wave(mode) => write!(f, "WAVE:{}", mode.name()),
            Command::Enable(on) => write!(f, "EN:{}", *on as u8),
            Command::Measure(Probe::Resistance) => f.write_str("MEAS:R"),
            Command::Measure(Probe::Capacitance) => f.write_str("MEAS:C"),
        }
    }
}

/// The recognised commands of a line, in order
pub fn commands(line: &[u8]) -> impl Iterator<Item = Command> + '_ {
    line.split(|&b| b == b',')
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            let command = Command::parse(token);
            if command.is_none() {
                trace!("Ignoring token {=[u8]:a}", token);
            }
            command
        })
}

/// Write `commands` as one terminated line, the way a host sends them
pub fn encode_line<W: fmt::Write>(out: &mut W, commands: &[Command]) -> fmt::Result {
    for (i, command) in commands.iter().enumerate() {
        if i > 0 {
            out.write_char(',')?;
        }
        write!(out, "{}", command)?;
    }
    out.write_str("\r\n")
}

/// Decimal prefix of `text` after optional whitespace and sign. Text
/// without digits reads as 0 and out of range values saturate.
pub fn atoi(text: &[u8]) -> i32 {
    let mut bytes = text
        .iter()
        .copied()
        .skip_while(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r'))
        .peekable();

    let negative = match bytes.peek() {
        Some(b'-') => {
            bytes.next();
            true
        }
        Some(b'+') => {
            bytes.next();
            false
        }
        _ => false,
    };

    let magnitude = bytes
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| (acc * 10 + (d - b'0') as i64).min(i32::MAX as i64 + 1));

    let value = if negative { -magnitude } else { magnitude };
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
