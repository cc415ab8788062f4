//! Instrument configuration.
//!
//! The gains and source currents are empirical fits from one particular
//! bench setup, so they live here as values rather than being derived.

/// Resistance procedure settings
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResistanceConfig {
    /// Current source code while measuring
    pub source_code: u8,
    /// Effective source current at `source_code`, in amps
    pub source_current_a: f32,
    /// Maps the raw V/I value to ohms
    pub cal_gain: f32,
    /// Settle time between switching on the source and sampling
    pub settle_ms: u32,
}

/// Capacitance procedure settings
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapacitanceConfig {
    /// Current source code while charging
    pub source_code: u8,
    /// Current per source code step, in amps
    pub source_lsb_a: f32,
    /// How long the probe is held at 0V before charging
    pub discharge_ms: u32,
    /// Pause after releasing the probe to high impedance
    pub release_us: u32,
    /// ADC polling interval while charging
    pub sample_us: u32,
    /// Lower timing threshold
    pub start_mv: i32,
    /// Upper timing threshold
    pub end_mv: i32,
    /// Limit for each of the two threshold waits
    pub timeout_ms: u32,
    /// Fudge factor applied to the computed capacitance
    pub cal_gain: f32,
}

impl CapacitanceConfig {
    /// Charging current in amps
    pub fn source_current_a(&self) -> f32 {
        self.source_code as f32 * self.source_lsb_a
    }

    /// Threshold window in volts
    pub fn window_v(&self) -> f32 {
        (self.end_mv - self.start_mv) as f32 / 1000.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Input clock of the waveform step timer
    pub timer_clock_hz: u32,
    pub resistance: ResistanceConfig,
    pub capacitance: CapacitanceConfig,
}

impl Config {
    pub const DEFAULT: Config = Config {
        timer_clock_hz: 1_000_000,
        resistance: ResistanceConfig {
            source_code: 50,
            source_current_a: 0.000414,
            // 3.3k reads ~50 raw, 10k reads ~150 raw
            cal_gain: 68.0,
            settle_ms: 20,
        },
        capacitance: CapacitanceConfig {
            source_code: 12,
            source_lsb_a: 8e-6,
            discharge_ms: 50,
            release_us: 50,
            sample_us: 10,
            // The probe node never gets much above 15mV because of internal
            // loading, so time the small-signal region
            start_mv: 2,
            end_mv: 10,
            timeout_ms: 500,
            cal_gain: 0.014,
        },
    };
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}
