//! Host side of the serial link.
//!
//! The instrument interleaves ASCII lines with binary frame packets on one
//! stream. [`Decoder`] splits them apart again and [`Response`] makes sense
//! of the text lines.
use heapless::{String, Vec};

use crate::scope::Frame;
use crate::{FRAME_SAMPLES, FRAME_SYNC};

/// Text beyond this is dropped
pub const MAX_LINE: usize = 128;

pub type TextLine = String<MAX_LINE>;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Line(TextLine),
    Frame(Frame),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    /// Sync byte seen, length next
    Length,
    Data,
}

pub struct Decoder {
    state: State,
    line: TextLine,
    frame: Vec<u8, FRAME_SAMPLES>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub const fn new() -> Self {
        Self {
            state: State::Idle,
            line: String::new(),
            frame: Vec::new(),
        }
    }

    pub fn feed(&mut self, byte: u8) -> Option<Event> {
        match self.state {
            State::Idle => match byte {
                FRAME_SYNC => {
                    self.state = State::Length;
                    None
                }
                b'\r' | b'\n' => {
                    if self.line.is_empty() {
                        None
                    } else {
                        Some(Event::Line(core::mem::take(&mut self.line)))
                    }
                }
                32..=126 => {
                    // Full line buffer drops the rest of the line
                    let _ = self.line.push(byte as char);
                    None
                }
                _ => None,
            },
            State::Length => {
                if byte as usize == FRAME_SAMPLES {
                    self.frame.clear();
                    self.state = State::Data;
                } else {
                    self.state = State::Idle;
                }
                None
            }
            State::Data => {
                // Cannot fail, the state changes when the frame is full
                let _ = self.frame.push(byte);
                if self.frame.is_full() {
                    self.state = State::Idle;
                    let mut frame = [0; FRAME_SAMPLES];
                    frame.copy_from_slice(&self.frame);
                    Some(Event::Frame(frame))
                } else {
                    None
                }
            }
        }
    }
}

/// Meaning of one text line from the instrument
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Response<'a> {
    Ready,
    Resistance(i32),
    Capacitance(f32),
    /// The instrument reported a negative capacitance, which it only does
    /// when the measurement failed
    CapacitanceFailed,
    Debug(&'a str),
    Other(&'a str),
}

impl<'a> Response<'a> {
    pub fn parse(line: &'a str) -> Self {
        if let Some(value) = line.strip_prefix("R_GND:") {
            match value.trim().parse() {
                Ok(ohms) => Response::Resistance(ohms),
                Err(_) => Response::Other(line),
            }
        } else if let Some(value) = line.strip_prefix("C_uF:") {
            match value.trim().parse::<f32>() {
                Ok(uf) if uf < 0.0 => Response::CapacitanceFailed,
                Ok(uf) => Response::Capacitance(uf),
                Err(_) => Response::Other(line),
            }
        } else if line.starts_with("READY") {
            Response::Ready
        } else if line.starts_with("DBG_") {
            Response::Debug(line)
        } else {
            Response::Other(line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(decoder: &mut Decoder, bytes: &[u8]) -> std::vec::Vec<Event> {
        bytes.iter().filter_map(|&b| decoder.feed(b)).collect()
    }

    fn line(text: &str) -> Event {
        Event::Line(TextLine::try_from(text).unwrap())
    }

    #[test]
    fn lines_and_frames() {
        let mut stream = b"READY\r\n".to_vec();
        stream.extend([0xAA, 252]);
        stream.extend((0..252).map(|i| i as u8));
        stream.extend(b"R_GND:120\r\n");

        let mut decoder = Decoder::new();
        let events = decode(&mut decoder, &stream);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], line("READY"));
        match &events[1] {
            Event::Frame(frame) => {
                assert_eq!(frame[0], 0);
                assert_eq!(frame[251], 251);
            }
            other => panic!("expected a frame, got {:?}", other),
        }
        assert_eq!(events[2], line("R_GND:120"));
    }

    #[test]
    fn frame_may_contain_sync_and_newlines() {
        let mut stream = std::vec![0xAA, 252];
        stream.extend(core::iter::repeat(0xAA).take(126));
        stream.extend(core::iter::repeat(b'\n').take(126));
        stream.extend(b"EN\n");

        let mut decoder = Decoder::new();
        let events = decode(&mut decoder, &stream);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::Frame(f) if f[125] == 0xAA && f[126] == b'\n'));
        assert_eq!(events[1], line("EN"));
    }

    #[test]
    fn wrong_length_is_dropped() {
        let mut stream = std::vec![0xAA, 100];
        stream.extend(b"C_uF:1.500\r\n");

        let mut decoder = Decoder::new();
        let events = decode(&mut decoder, &stream);
        // The length byte is lost, the text that follows is not
        assert_eq!(events, [line("C_uF:1.500")]);
    }

    #[test]
    fn non_printable_filtered() {
        let mut decoder = Decoder::new();
        let events = decode(&mut decoder, b"\x01RE\x7fADY\x00\r\n\r\n");
        assert_eq!(events, [line("READY")]);
    }

    #[test]
    fn long_lines_truncated() {
        let mut stream = std::vec![b'x'; MAX_LINE + 20];
        stream.push(b'\n');
        let mut decoder = Decoder::new();
        match &decode(&mut decoder, &stream)[..] {
            [Event::Line(l)] => assert_eq!(l.len(), MAX_LINE),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn responses() {
        assert_eq!(Response::parse("READY"), Response::Ready);
        assert_eq!(Response::parse("R_GND:16425"), Response::Resistance(16425));
        assert_eq!(Response::parse("R_GND:x"), Response::Other("R_GND:x"));
        assert_eq!(Response::parse("C_uF:672.000"), Response::Capacitance(672.0));
        assert_eq!(Response::parse("C_uF:-1.000"), Response::CapacitanceFailed);
        assert_eq!(
            Response::parse("DBG_C: timeout or bad dt"),
            Response::Debug("DBG_C: timeout or bad dt")
        );
        assert_eq!(Response::parse("hello"), Response::Other("hello"));
    }
}
