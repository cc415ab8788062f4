//! Interfaces to the peripherals the signal path drives.
//!
//! Register level bring-up is somebody else's problem: the firmware crate
//! implements these for the board, tests implement them as simulations.

/// Waveform output DAC
pub trait WaveDac {
    fn write(&mut self, code: u8);
}

/// Timer that paces the waveform, one table step per period
pub trait WaveTimer {
    fn stop(&mut self);
    fn reset_counter(&mut self);
    /// Counter reload value, the timer period is `reload + 1` input clocks
    fn set_reload(&mut self, reload: u16);
    fn start(&mut self);
    /// Read-and-clear of the interrupt status, must run once per interrupt
    fn acknowledge(&mut self);
}

/// The hardware the timer interrupt owns. The foreground reaches it through
/// a lock to reprogram the period or force the output to zero.
pub struct WaveOutput<T, D> {
    pub timer: T,
    pub dac: D,
}

/// Free-running ADC used by the RC meter
pub trait SenseAdc {
    /// Wait for the end of the conversion in progress and return it
    fn read_fresh(&mut self) -> u16;
    /// Most recent completed conversion, without waiting
    fn latest(&mut self) -> u16;
    fn to_millivolts(&self, counts: u16) -> i32;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    Source,
    Sink,
}

/// Programmable constant-current source
pub trait CurrentSource {
    fn set_polarity(&mut self, polarity: Polarity);
    /// Output current in source steps, 0 switches the source off
    fn set_code(&mut self, code: u8);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MuxChannel {
    Resistance,
    Capacitance,
}

/// Analog multiplexer in front of the sense ADC and the current source
pub trait AnalogMux {
    fn select(&mut self, channel: MuxChannel);
}

/// The two measurement terminals
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Probe {
    Resistance,
    Capacitance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Drive {
    /// Digital buffers off, pin only seen by the analog path
    AnalogHiZ,
    /// Driven hard to 0V
    StrongLow,
}

pub trait ProbePins {
    fn set_drive(&mut self, probe: Probe, drive: Drive);
}

/// Byte level UART
pub trait SerialPort {
    /// Next received byte, if one is waiting
    fn read_byte(&mut self) -> Option<u8>;
    /// Queue bytes for transmit, blocking until they are accepted
    fn write_all(&mut self, bytes: &[u8]);
}
