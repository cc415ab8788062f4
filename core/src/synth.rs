//! Table driven waveform synthesizer.
//!
//! [`Synthesizer`] is the half the timer interrupt sees: the active table,
//! the phase cursor and the enable flag. [`WaveformControl`] is the
//! foreground half: it owns the base tables and the settings, and pushes a
//! freshly scaled table into the synthesizer whenever they change. Table
//! rebuilds never happen in interrupt context.
use crate::drivers::{WaveDac, WaveTimer};
use crate::frequency::{self, TimerSetting};
use crate::wavetable::{self, BaseTables, WaveMode, WaveTable};
use crate::{DEFAULT_FREQUENCY_HZ, LUT_SIZE};
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

pub struct Synthesizer {
    active: [AtomicU8; LUT_SIZE],
    // Only ever written by on_tick()
    phase: AtomicU8,
    enabled: AtomicBool,
    // Set by the foreground on disable, consumed by the next tick
    phase_reset: AtomicBool,
}

impl Synthesizer {
    pub const fn new() -> Self {
        Self {
            active: [const { AtomicU8::new(0) }; LUT_SIZE],
            phase: AtomicU8::new(0),
            enabled: AtomicBool::new(false),
            phase_reset: AtomicBool::new(false),
        }
    }

    /// Timer interrupt entry point. Emits one sample and steps the phase.
    pub fn on_tick<T: WaveTimer, D: WaveDac>(&self, timer: &mut T, dac: &mut D) {
        timer.acknowledge();

        if self.phase_reset.swap(false, Ordering::Acquire) {
            self.phase.store(0, Ordering::Relaxed);
        }

        if !self.enabled.load(Ordering::Acquire) {
            dac.write(0);
            return;
        }

        let phase = self.phase.load(Ordering::Relaxed) as usize % LUT_SIZE;
        dac.write(self.active[phase].load(Ordering::Relaxed));
        self.phase.store(((phase + 1) % LUT_SIZE) as u8, Ordering::Relaxed);
    }

    pub fn phase(&self) -> u8 {
        self.phase.load(Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Copy of the table currently being played
    pub fn active_table(&self) -> WaveTable {
        let mut table = [0; LUT_SIZE];
        for (t, a) in table.iter_mut().zip(self.active.iter()) {
            *t = a.load(Ordering::Relaxed);
        }
        table
    }

    // Each entry is stored on its own, so a tick that lands mid-update
    // plays one period mixing old and new entries.
    fn load_table(&self, table: &WaveTable) {
        for (a, &t) in self.active.iter().zip(table.iter()) {
            a.store(t, Ordering::Relaxed);
        }
    }

    fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        self.phase_reset.store(true, Ordering::Release);
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the waveform generator state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaveState {
    pub mode: WaveMode,
    pub amplitude_percent: u8,
    pub enabled: bool,
    pub phase: u8,
    pub frequency_hz: u32,
}

pub struct WaveformControl<'a> {
    synth: &'a Synthesizer,
    tables: BaseTables,
    mode: WaveMode,
    amplitude_percent: u8,
    frequency_hz: u32,
    timer_clock_hz: u32,
}

impl<'a> WaveformControl<'a> {
    /// Builds the base tables and loads a full scale sine. The output stays
    /// disabled and the timer is left alone until
    /// [`set_frequency`](Self::set_frequency).
    pub fn new(synth: &'a Synthesizer, timer_clock_hz: u32) -> Self {
        let control = Self {
            synth,
            tables: BaseTables::build(),
            mode: WaveMode::Sine,
            amplitude_percent: 100,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            timer_clock_hz,
        };
        control.rebuild();
        control
    }

    pub fn set_mode(&mut self, mode: WaveMode) {
        self.mode = mode;
        self.rebuild();
    }

    pub fn set_amplitude(&mut self, percent: u8) {
        self.amplitude_percent = percent.min(100);
        self.rebuild();
    }

    pub fn enable(&mut self) {
        self.synth.enable();
    }

    /// Stop the output. The DAC is zeroed right away, the phase goes back to
    /// 0 on the next tick.
    pub fn disable<D: WaveDac>(&mut self, dac: &mut D) {
        self.synth.disable();
        dac.write(0);
    }

    pub fn set_frequency<T: WaveTimer>(&mut self, timer: &mut T, hz: u32) -> TimerSetting {
        let setting = TimerSetting::for_frequency(hz, self.timer_clock_hz);
        frequency::program(timer, &setting);
        self.frequency_hz = setting.frequency_hz;
        setting
    }

    pub fn state(&self) -> WaveState {
        WaveState {
            mode: self.mode,
            amplitude_percent: self.amplitude_percent,
            enabled: self.synth.is_enabled(),
            phase: self.synth.phase(),
            frequency_hz: self.frequency_hz,
        }
    }

    fn rebuild(&self) {
        let table = wavetable::scaled(self.tables.get(self.mode), self.amplitude_percent);
        self.synth.load_table(&table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Dac(std::vec::Vec<u8>);

    impl WaveDac for Dac {
        fn write(&mut self, code: u8) {
            self.0.push(code);
        }
    }

    #[derive(Default)]
    struct Timer {
        acks: usize,
        reload: u16,
    }

    impl WaveTimer for Timer {
        fn stop(&mut self) {}
        fn reset_counter(&mut self) {}
        fn set_reload(&mut self, reload: u16) {
            self.reload = reload;
        }
        fn start(&mut self) {}
        fn acknowledge(&mut self) {
            self.acks += 1;
        }
    }

    #[test]
    fn initial_state() {
        let synth = Synthesizer::new();
        let control = WaveformControl::new(&synth, 1_000_000);
        assert_eq!(
            control.state(),
            WaveState {
                mode: WaveMode::Sine,
                amplitude_percent: 100,
                enabled: false,
                phase: 0,
                frequency_hz: 1000,
            }
        );
        assert_eq!(synth.active_table(), *BaseTables::build().get(WaveMode::Sine));
    }

    #[test]
    fn disabled_ticks_emit_zero_and_hold_phase() {
        let synth = Synthesizer::new();
        let _control = WaveformControl::new(&synth, 1_000_000);
        let (mut timer, mut dac) = (Timer::default(), Dac::default());
        for _ in 0..5 {
            synth.on_tick(&mut timer, &mut dac);
        }
        assert_eq!(dac.0, [0; 5]);
        assert_eq!(synth.phase(), 0);
        assert_eq!(timer.acks, 5);
    }

    #[test]
    fn enabled_ticks_walk_the_table_and_wrap() {
        let synth = Synthesizer::new();
        let mut control = WaveformControl::new(&synth, 1_000_000);
        control.set_mode(WaveMode::Triangle);
        control.enable();

        let (mut timer, mut dac) = (Timer::default(), Dac::default());
        for _ in 0..LUT_SIZE + 3 {
            synth.on_tick(&mut timer, &mut dac);
        }
        let table = synth.active_table();
        assert_eq!(dac.0[..LUT_SIZE], table);
        assert_eq!(dac.0[LUT_SIZE..], table[..3]);
        assert_eq!(synth.phase(), 3);
        assert_eq!(timer.acks, LUT_SIZE + 3);
    }

    #[test]
    fn disable_zeroes_dac_and_resets_phase_on_next_tick() {
        let synth = Synthesizer::new();
        let mut control = WaveformControl::new(&synth, 1_000_000);
        control.set_mode(WaveMode::Square);
        control.enable();

        let (mut timer, mut dac) = (Timer::default(), Dac::default());
        for _ in 0..40 {
            synth.on_tick(&mut timer, &mut dac);
        }
        assert_eq!(synth.phase(), 40);

        dac.0.clear();
        control.disable(&mut dac);
        assert_eq!(dac.0, [0]);
        synth.on_tick(&mut timer, &mut dac);
        assert_eq!(dac.0, [0, 0]);
        assert_eq!(synth.phase(), 0);
        assert!(!control.state().enabled);

        control.enable();
        synth.on_tick(&mut timer, &mut dac);
        assert_eq!(dac.0[2], 0); // square starts low
        assert_eq!(synth.phase(), 1);
    }

    #[test]
    fn disable_then_enable_before_a_tick_restarts_at_zero() {
        let synth = Synthesizer::new();
        let mut control = WaveformControl::new(&synth, 1_000_000);
        control.enable();
        let (mut timer, mut dac) = (Timer::default(), Dac::default());
        for _ in 0..10 {
            synth.on_tick(&mut timer, &mut dac);
        }
        control.disable(&mut dac);
        control.enable();
        dac.0.clear();
        synth.on_tick(&mut timer, &mut dac);
        assert_eq!(dac.0, [synth.active_table()[0]]);
        assert_eq!(synth.phase(), 1);
    }

    #[test]
    fn amplitude_rescales_active_table() {
        let synth = Synthesizer::new();
        let mut control = WaveformControl::new(&synth, 1_000_000);
        control.set_mode(WaveMode::Square);
        control.set_amplitude(50);
        let table = synth.active_table();
        assert!(table[..32].iter().all(|&v| v == 0));
        assert!(table[32..].iter().all(|&v| v == 128));

        control.set_amplitude(200);
        assert_eq!(control.state().amplitude_percent, 100);
        assert!(synth.active_table()[32..].iter().all(|&v| v == 255));
    }

    #[test]
    fn frequency_programs_timer() {
        let synth = Synthesizer::new();
        let mut control = WaveformControl::new(&synth, 1_000_000);
        let mut timer = Timer::default();
        let setting = control.set_frequency(&mut timer, 5000);
        assert_eq!(setting.frequency_hz, 3000);
        assert_eq!(timer.reload, setting.reload);
        assert_eq!(control.state().frequency_hz, 3000);
    }
}
