//! Output frequency to waveform timer period.
//!
//! The synthesizer moves one table step per timer period, so the output
//! frequency is `clock / (LUT_SIZE * (reload + 1))`.
use crate::drivers::WaveTimer;
use crate::{FREQ_MAX_HZ, FREQ_MIN_HZ, LUT_SIZE};

/// A timer programming derived from a requested frequency
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerSetting {
    /// Requested frequency after clamping
    pub frequency_hz: u32,
    /// Timer reload value, period is `reload + 1` clocks
    pub reload: u16,
}

pub fn clamp_frequency(hz: u32) -> u32 {
    hz.clamp(FREQ_MIN_HZ, FREQ_MAX_HZ)
}

impl TimerSetting {
    /// Pick the timer period whose output frequency lands closest to `hz`
    pub fn for_frequency(hz: u32, timer_clock_hz: u32) -> Self {
        let frequency_hz = clamp_frequency(hz);
        let rate = (frequency_hz as u64 * LUT_SIZE as u64).max(1);
        let clock = timer_clock_hz as u64;

        let lo = (clock / rate).clamp(1, u16::MAX as u64);
        let hi = (lo + 1).min(u16::MAX as u64);

        // Frequency error of period p is |clock - rate*p| / (LUT_SIZE*p), so
        // compare the two candidates by cross multiplying
        let err_lo = clock.abs_diff(rate * lo) * hi;
        let err_hi = clock.abs_diff(rate * hi) * lo;
        let period = if err_hi < err_lo { hi } else { lo };

        TimerSetting {
            frequency_hz,
            reload: (period - 1) as u16,
        }
    }

    /// Frequency the waveform actually comes out at
    pub fn output_hz(&self, timer_clock_hz: u32) -> f32 {
        timer_clock_hz as f32 / (LUT_SIZE as f32 * (self.reload as f32 + 1.0))
    }
}

/// Stop the timer, load the new period and start it again from zero
pub fn program<T: WaveTimer>(timer: &mut T, setting: &TimerSetting) {
    timer.stop();
    timer.reset_counter();
    timer.set_reload(setting.reload);
    timer.start();
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOCK: u32 = 1_000_000;

    fn error(f: u32, reload: u32) -> f64 {
        let out = CLOCK as f64 / (LUT_SIZE as f64 * (reload as f64 + 1.0));
        (out - f as f64).abs()
    }

    #[test]
    fn whole_range_is_closest_achievable() {
        for f in FREQ_MIN_HZ..=FREQ_MAX_HZ {
            let s = TimerSetting::for_frequency(f, CLOCK);
            assert_eq!(s.frequency_hz, f);
            let r = s.reload as u32;
            let e = error(f, r);
            if r > 0 {
                assert!(e <= error(f, r - 1), "f={f} reload={r}");
            }
            if r < u16::MAX as u32 {
                assert!(e <= error(f, r + 1), "f={f} reload={r}");
            }
        }
    }

    #[test]
    fn known_settings() {
        // 1Hz: 1e6 / 64 = 15625 clocks exactly
        assert_eq!(TimerSetting::for_frequency(1, CLOCK).reload, 15624);
        // 1kHz: 15.625 clocks, 16 is closer in frequency than 15
        assert_eq!(TimerSetting::for_frequency(1000, CLOCK).reload, 15);
        // 3kHz: 5.2 clocks
        assert_eq!(TimerSetting::for_frequency(3000, CLOCK).reload, 4);
        // 638Hz: 24.49 clocks rounds to 24, but a period of 25 (625.0Hz)
        // lands closer in frequency than 24 (651.0Hz)
        assert_eq!(TimerSetting::for_frequency(638, CLOCK).reload, 24);
    }

    #[test]
    fn out_of_range_requests_are_clamped() {
        let zero = TimerSetting::for_frequency(0, CLOCK);
        assert_eq!(zero.frequency_hz, 1);
        assert_eq!(zero, TimerSetting::for_frequency(1, CLOCK));

        let huge = TimerSetting::for_frequency(u32::MAX, CLOCK);
        assert_eq!(huge.frequency_hz, 3000);
        assert_eq!(huge, TimerSetting::for_frequency(3000, CLOCK));
    }

    #[test]
    fn period_limits_hold_for_odd_clocks() {
        // Slow clock: period would be 0 clocks without the floor
        let slow = TimerSetting::for_frequency(3000, 1_000);
        assert_eq!(slow.reload, 0);
        // Fast clock: period would overflow 16 bits without the ceiling
        let fast = TimerSetting::for_frequency(1, 100_000_000);
        assert_eq!(fast.reload, u16::MAX - 1);
    }

    #[test]
    fn output_frequency_matches_formula() {
        let s = TimerSetting::for_frequency(500, CLOCK);
        let expected = CLOCK as f32 / (64.0 * (s.reload as f32 + 1.0));
        assert_eq!(s.output_hz(CLOCK), expected);
        assert!((s.output_hz(CLOCK) - 500.0).abs() < 10.0);
    }

    #[derive(Default)]
    struct LoggedTimer {
        log: std::vec::Vec<&'static str>,
        reload: Option<u16>,
    }

    impl WaveTimer for LoggedTimer {
        fn stop(&mut self) {
            self.log.push("stop");
        }
        fn reset_counter(&mut self) {
            self.log.push("reset");
        }
        fn set_reload(&mut self, reload: u16) {
            self.log.push("reload");
            self.reload = Some(reload);
        }
        fn start(&mut self) {
            self.log.push("start");
        }
        fn acknowledge(&mut self) {
            self.log.push("ack");
        }
    }

    #[test]
    fn program_sequence() {
        let mut timer = LoggedTimer::default();
        program(&mut timer, &TimerSetting::for_frequency(1000, CLOCK));
        assert_eq!(timer.log, ["stop", "reset", "reload", "start"]);
        assert_eq!(timer.reload, Some(15));
    }
}
