#![cfg_attr(not(test), no_std)]

//! Signal path of the lab station: a table-driven waveform generator, a
//! decimating scope sampler, an RC meter and the line-based serial protocol
//! that ties them together.
//!
//! Nothing in here touches a register. Peripherals are reached through the
//! traits in [`drivers`], the firmware crate provides the STM32 side and the
//! tests provide simulations.

// Must come first so the logging macros are visible to every other module
#[macro_use]
mod fmt;

pub mod analysis;
pub mod command;
pub mod config;
pub mod drivers;
pub mod foreground;
pub mod frequency;
pub mod measure;
pub mod monitor;
pub mod poll;
pub mod report;
pub mod scope;
pub mod synth;
pub mod wavetable;

/// Samples per waveform period
pub const LUT_SIZE: usize = 64;

/// Samples per scope frame. Also the length byte of a frame packet, so it
/// has to fit in a u8.
pub const FRAME_SAMPLES: usize = 252;

/// Keep one ADC reading out of every DECIM_FACTOR
pub const DECIM_FACTOR: u8 = 2;

/// 12-bit ADC readings are compressed to 8 bits by this shift
pub const ADC_TO_8BIT_SHIFT: u8 = 4;

/// Command line storage, one byte of which is reserved. The usable line
/// length is one less.
pub const CMD_BUF_LEN: usize = 64;

/// First byte of every binary frame packet
pub const FRAME_SYNC: u8 = 0xAA;

pub const FREQ_MIN_HZ: u32 = 1;
pub const FREQ_MAX_HZ: u32 = 3000;
pub const DEFAULT_FREQUENCY_HZ: u32 = 1000;

const _: () = assert!(FRAME_SAMPLES <= u8::MAX as usize);
const _: () = assert!(LUT_SIZE <= u8::MAX as usize);
