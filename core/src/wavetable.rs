//! Base waveform tables and amplitude scaling.
use crate::LUT_SIZE;
use core::f32::consts::{PI, TAU};

/// One waveform period, indexed by phase
pub type WaveTable = [u8; LUT_SIZE];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaveMode {
    #[default]
    Sine,
    Triangle,
    Square,
}

impl WaveMode {
    /// Parse the protocol name of a waveform
    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"SINE" => Some(WaveMode::Sine),
            b"TRI" => Some(WaveMode::Triangle),
            b"SQR" => Some(WaveMode::Square),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            WaveMode::Sine => "SINE",
            WaveMode::Triangle => "TRI",
            WaveMode::Square => "SQR",
        }
    }
}

/// The three full-scale tables, built once at startup
#[derive(Clone, Debug, PartialEq)]
pub struct BaseTables {
    sine: WaveTable,
    triangle: WaveTable,
    square: WaveTable,
}

impl BaseTables {
    pub fn build() -> Self {
        Self {
            sine: sine(),
            triangle: triangle(),
            square: square(),
        }
    }

    pub fn get(&self, mode: WaveMode) -> &WaveTable {
        match mode {
            WaveMode::Sine => &self.sine,
            WaveMode::Triangle => &self.triangle,
            WaveMode::Square => &self.square,
        }
    }
}

/// Fifth order odd polynomial for sin(x). Good to a few percent in
/// [-π/2, π/2], noticeably off towards ±π.
pub fn sin_approx(mut x: f32) -> f32 {
    while x > PI {
        x -= TAU;
    }
    while x < -PI {
        x += TAU;
    }
    let x2 = x * x;
    let x3 = x * x2;
    let x5 = x3 * x2;
    x - x3 / 6.0 + x5 / 120.0
}

fn sine() -> WaveTable {
    let mut table = [0; LUT_SIZE];
    for (i, v) in table.iter_mut().enumerate() {
        let t = TAU * i as f32 / LUT_SIZE as f32;
        let s = (128.0 + 127.0 * sin_approx(t)) as i16;
        *v = s.clamp(0, 255) as u8;
    }
    table
}

fn triangle() -> WaveTable {
    const HALF: usize = LUT_SIZE / 2;
    let mut table = [0; LUT_SIZE];
    for i in 0..HALF {
        let rise = (255 * i / (HALF - 1)) as u8;
        table[i] = rise;
        table[HALF + i] = 255 - rise;
    }
    table
}

fn square() -> WaveTable {
    let mut table = [0; LUT_SIZE];
    table[LUT_SIZE / 2..].fill(255);
    table
}

/// Scale a base table to `percent` of full scale, rounding to nearest.
/// Percentages above 100 are treated as 100.
pub fn scaled(base: &WaveTable, percent: u8) -> WaveTable {
    let percent = percent.min(100) as u16;
    let mut table = [0; LUT_SIZE];
    for (out, &b) in table.iter_mut().zip(base.iter()) {
        *out = ((b as u16 * percent + 50) / 100).min(255) as u8;
    }
    table
}
